use std::time::{Duration, Instant};

use crate::alarm::engine::{AlarmEngine, EngineError};
use crate::alarm::format::floor_to_minute;
use crate::alarm::list::{AlarmList, AlarmRow};
use crate::alarm::model::{AlarmFields, AlarmRecord, Cookie};
use crate::alarm::toggle::ToggleDebouncer;
use crate::service::scheduler::AlarmScheduler;
use crate::service::settings::SettingsStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub text: String,
}

impl Notice {
    fn info(text: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Info,
            text: text.into(),
        }
    }

    fn error(text: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Error,
            text: text.into(),
        }
    }
}

/// Application state shared by every UI callback: the engine, the displayed
/// rows, the pending toggle and the modal flag.
pub struct AlarmController<S, K> {
    engine: AlarmEngine<S, K>,
    list: AlarmList,
    debouncer: ToggleDebouncer,
    modal_open: bool,
    selected: Option<Cookie>,
    notice: Option<Notice>,
}

impl<S: AlarmScheduler, K: SettingsStore> AlarmController<S, K> {
    pub fn new(engine: AlarmEngine<S, K>) -> Self {
        Self::with_debouncer(engine, ToggleDebouncer::default())
    }

    pub fn with_debouncer(engine: AlarmEngine<S, K>, debouncer: ToggleDebouncer) -> Self {
        Self {
            engine,
            list: AlarmList::new(),
            debouncer,
            modal_open: false,
            selected: None,
            notice: None,
        }
    }

    pub fn engine(&self) -> &AlarmEngine<S, K> {
        &self.engine
    }

    pub fn rows(&self) -> &[AlarmRow] {
        self.list.all()
    }

    pub fn selected(&self) -> Option<Cookie> {
        self.selected
    }

    pub fn select(&mut self, cookie: Cookie) {
        if self.list.get(cookie).is_some() {
            self.selected = Some(cookie);
        }
    }

    pub fn take_notice(&mut self) -> Option<Notice> {
        self.notice.take()
    }

    /// Rebuilds the rows from the scheduler. On failure the previous rows stay.
    pub fn refresh(&mut self) -> Result<(), EngineError> {
        let rows = match self.engine.reconcile() {
            Ok(rows) => rows,
            Err(err) => {
                self.notice = Some(Notice::error(format!("Unable to load alarms: {err}")));
                return Err(err);
            }
        };
        self.list.clear();
        for (cookie, record) in rows {
            self.list.insert(cookie, record);
        }
        if self
            .selected
            .is_some_and(|cookie| self.list.get(cookie).is_none())
        {
            self.selected = None;
        }
        Ok(())
    }

    pub fn load(&self, cookie: Cookie) -> Result<AlarmRecord, EngineError> {
        self.engine.load(cookie)
    }

    /// `now` is floored to the minute, so the current minute is still valid.
    pub fn add(&mut self, fields: &AlarmFields, now: i64) -> Result<Cookie, EngineError> {
        match self.engine.create(fields, floor_to_minute(now)) {
            Ok(committed) => {
                self.list.insert(committed.cookie, committed.record);
                self.selected = Some(committed.cookie);
                self.notice = Some(Notice::info("Added alarm"));
                Ok(committed.cookie)
            }
            Err(err) => Err(self.report(err)),
        }
    }

    pub fn edit(
        &mut self,
        old: Cookie,
        fields: &AlarmFields,
        now: i64,
    ) -> Result<Cookie, EngineError> {
        match self.engine.edit(old, fields, floor_to_minute(now)) {
            Ok(committed) => {
                self.list.replace(old, committed.cookie, committed.record);
                self.selected = Some(committed.cookie);
                self.notice = Some(Notice::info("Updated alarm"));
                Ok(committed.cookie)
            }
            Err(err) => Err(self.report(err)),
        }
    }

    /// Deletes the alarm and moves the selection to the following row, or to
    /// the last row when the removed one was at the end.
    pub fn remove(&mut self, cookie: Cookie) -> Result<(), EngineError> {
        if let Err(err) = self.engine.delete(cookie) {
            return Err(self.report(err));
        }
        let index = self.list.position(cookie);
        self.list.remove(cookie);
        if self.selected == Some(cookie) || self.selected.is_none() {
            let rows = self.list.all();
            self.selected = index
                .and_then(|index| rows.get(index))
                .or_else(|| rows.last())
                .map(|row| row.cookie);
        }
        self.notice = Some(Notice::info("Removed alarm"));
        Ok(())
    }

    /// Records a toggle to run after the debounce delay. Refused while another
    /// row's toggle is pending or when the row is gone.
    pub fn request_toggle(&mut self, cookie: Cookie, enabled: bool, now: Instant) -> bool {
        if self.list.get(cookie).is_none() {
            return false;
        }
        self.debouncer.request(cookie, enabled, now)
    }

    /// Checkbox state for a row: the pending request wins over the stored one.
    pub fn displayed_enabled(&self, cookie: Cookie) -> Option<bool> {
        match self.debouncer.pending() {
            Some(pending) if pending.cookie == cookie => Some(pending.enabled),
            _ => self.list.get(cookie).map(AlarmRow::is_enabled),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.debouncer.is_busy()
    }

    pub fn time_until_toggle(&self, now: Instant) -> Option<Duration> {
        self.debouncer.time_until_due(now)
    }

    /// Runs the pending toggle once it is due. Returns true when a toggle ran,
    /// whatever its outcome.
    pub fn poll(&mut self, now: Instant) -> bool {
        let Some(pending) = self.debouncer.take_due(now) else {
            return false;
        };
        if self.list.get(pending.cookie).is_none() {
            tracing::warn!(cookie = %pending.cookie, "toggled_alarm_no_longer_listed");
            return true;
        }
        match self.engine.set_enabled(pending.cookie, pending.enabled) {
            Ok(committed) => {
                self.list
                    .replace(pending.cookie, committed.cookie, committed.record);
                if self.selected == Some(pending.cookie) {
                    self.selected = Some(committed.cookie);
                }
                let text = if pending.enabled {
                    "Enabled alarm"
                } else {
                    "Disabled alarm"
                };
                self.notice = Some(Notice::info(text));
            }
            Err(err) => {
                self.report(err);
            }
        }
        true
    }

    pub fn open_modal(&mut self) {
        self.modal_open = true;
    }

    pub fn close_modal(&mut self) {
        self.modal_open = false;
    }

    pub fn is_modal_open(&self) -> bool {
        self.modal_open
    }

    /// Focus regained or a resync signal arrived. Skipped while a dialog is
    /// open; returns whether a refresh ran.
    pub fn on_external_change(&mut self) -> bool {
        if self.modal_open {
            tracing::debug!("refresh_skipped_modal_open");
            return false;
        }
        if let Err(err) = self.refresh() {
            tracing::warn!(error = %err, "external_refresh_failed");
        }
        true
    }

    fn report(&mut self, err: EngineError) -> EngineError {
        if !err.is_validation() {
            self.notice = Some(Notice::error(err.to_string()));
        }
        if matches!(err, EngineError::StaleEntry { .. })
            && let Err(refresh_err) = self.refresh()
        {
            tracing::warn!(error = %refresh_err, "refresh_after_stale_entry_failed");
        }
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::model::{AlarmSound, AppIdentity, Recurrence};
    use crate::alarm::toggle::TOGGLE_DEBOUNCE;
    use crate::service::scheduler::MemoryScheduler;
    use crate::service::settings::MemorySettings;

    const NOW: i64 = 1_800_000_000;

    fn controller() -> AlarmController<MemoryScheduler, MemorySettings> {
        AlarmController::new(AlarmEngine::new(
            MemoryScheduler::new(),
            MemorySettings::new(),
            AppIdentity::default(),
        ))
    }

    fn fields(offset: i64, message: &str) -> AlarmFields {
        AlarmFields {
            trigger_time: NOW + offset,
            recurrence: Recurrence::Once,
            sound: AlarmSound::Alarm1,
            message: message.to_string(),
        }
    }

    fn messages(controller: &AlarmController<MemoryScheduler, MemorySettings>) -> Vec<String> {
        controller
            .rows()
            .iter()
            .map(|row| row.record.message.clone())
            .collect()
    }

    #[test]
    fn add_inserts_row_and_selects_it() {
        let mut controller = controller();
        let cookie = controller.add(&fields(60, "a"), NOW).expect("add");
        assert_eq!(controller.selected(), Some(cookie));
        assert_eq!(messages(&controller), vec!["a"]);
        assert_eq!(
            controller.take_notice().map(|notice| notice.text),
            Some("Added alarm".to_string())
        );
    }

    #[test]
    fn current_minute_is_still_accepted() {
        let mut controller = controller();
        let minute = floor_to_minute(NOW);
        let now = minute + 42;
        let mut at_minute = fields(0, "now");
        at_minute.trigger_time = minute;
        assert!(controller.add(&at_minute, now).is_ok());
    }

    #[test]
    fn validation_failure_sets_no_notice() {
        let mut controller = controller();
        let err = controller.add(&fields(-3_600, "late"), NOW).expect_err("past");
        assert!(err.is_validation());
        assert!(controller.take_notice().is_none());
        assert!(controller.rows().is_empty());
    }

    #[test]
    fn edit_replaces_row_under_new_cookie() {
        let mut controller = controller();
        let old = controller.add(&fields(60, "a"), NOW).expect("add");
        let new = controller.edit(old, &fields(120, "b"), NOW).expect("edit");
        assert_ne!(old, new);
        assert_eq!(controller.rows().len(), 1);
        assert_eq!(controller.rows()[0].cookie, new);
        assert_eq!(controller.selected(), Some(new));
    }

    #[test]
    fn remove_selects_next_row_then_last() {
        let mut controller = controller();
        let first = controller.add(&fields(60, "a"), NOW).expect("add");
        let second = controller.add(&fields(120, "b"), NOW).expect("add");
        let third = controller.add(&fields(180, "c"), NOW).expect("add");

        controller.select(first);
        controller.remove(first).expect("remove");
        assert_eq!(controller.selected(), Some(second));

        controller.select(third);
        controller.remove(third).expect("remove");
        assert_eq!(controller.selected(), Some(second));

        controller.remove(second).expect("remove");
        assert_eq!(controller.selected(), None);
        assert!(controller.rows().is_empty());
    }

    #[test]
    fn toggle_is_deferred_and_shown_optimistically() {
        let mut controller = controller();
        let cookie = controller.add(&fields(60, "a"), NOW).expect("add");
        let start = Instant::now();

        assert!(controller.request_toggle(cookie, false, start));
        assert_eq!(controller.displayed_enabled(cookie), Some(false));
        assert!(controller.is_busy());
        assert!(!controller.poll(start));
        assert_eq!(controller.rows()[0].cookie, cookie);

        assert!(controller.poll(start + TOGGLE_DEBOUNCE));
        assert!(!controller.is_busy());
        let row = &controller.rows()[0];
        assert_ne!(row.cookie, cookie);
        assert!(!row.is_enabled());
        assert_eq!(
            controller.take_notice().map(|notice| notice.text),
            Some("Disabled alarm".to_string())
        );
    }

    #[test]
    fn other_rows_cannot_toggle_while_one_is_pending() {
        let mut controller = controller();
        let a = controller.add(&fields(60, "a"), NOW).expect("add");
        let b = controller.add(&fields(120, "b"), NOW).expect("add");
        let start = Instant::now();
        assert!(controller.request_toggle(a, false, start));
        assert!(!controller.request_toggle(b, false, start));
    }

    #[test]
    fn failed_toggle_leaves_row_in_previous_state() {
        let mut controller = AlarmController::new(AlarmEngine::new(
            MemoryScheduler::new(),
            MemorySettings::new(),
            AppIdentity::default(),
        ));
        let cookie = controller.add(&fields(60, "a"), NOW).expect("add");
        controller.take_notice();
        controller.engine.scheduler_mut().fail_next_add(6);

        let start = Instant::now();
        controller.request_toggle(cookie, false, start);
        assert!(controller.poll(start + TOGGLE_DEBOUNCE));
        assert!(!controller.is_busy());
        assert_eq!(controller.displayed_enabled(cookie), Some(true));
        let notice = controller.take_notice().expect("error notice");
        assert_eq!(notice.kind, NoticeKind::Error);
        assert!(notice.text.contains("error code: 6"));
    }

    #[test]
    fn toggle_for_row_removed_meanwhile_is_dropped() {
        let mut controller = controller();
        let cookie = controller.add(&fields(60, "a"), NOW).expect("add");
        let start = Instant::now();
        controller.request_toggle(cookie, false, start);
        controller.remove(cookie).expect("remove");
        assert!(controller.poll(start + TOGGLE_DEBOUNCE));
        assert!(controller.rows().is_empty());
        assert!(controller.engine().scheduler().is_empty());
    }

    #[test]
    fn external_change_refreshes_only_without_modal() {
        let mut controller = controller();
        controller.add(&fields(60, "a"), NOW).expect("add");
        controller.list.clear();

        controller.open_modal();
        assert!(!controller.on_external_change());
        assert!(controller.rows().is_empty());

        controller.close_modal();
        assert!(controller.on_external_change());
        assert_eq!(messages(&controller), vec!["a"]);
    }

    #[test]
    fn refresh_orders_rows_by_cookie() {
        let mut controller = controller();
        controller.add(&fields(900, "late"), NOW).expect("add");
        controller.add(&fields(60, "early"), NOW).expect("add");
        controller.refresh().expect("refresh");
        assert_eq!(messages(&controller), vec!["late", "early"]);
    }
}
