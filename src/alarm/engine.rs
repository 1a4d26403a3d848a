use thiserror::Error;

use crate::alarm::disabled::DisabledTimeStore;
use crate::alarm::model::{
    AlarmEvent, AlarmFields, AlarmRecord, AlarmSound, AlarmState, AppIdentity, Cookie,
    DISABLED_SENTINEL, EventFlags, Recurrence, TIME_MAX, escape_message, unescape_message,
};
use crate::service::scheduler::{AlarmScheduler, SchedulerError};
use crate::service::settings::{SettingsError, SettingsStore};

pub const ALARM_ICON: &str = "qgn_list_hclk_alarm";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvalidTime {
    #[error("Cannot set alarm for time in the past")]
    InPast,
    #[error("Cannot set alarm at the end of time!")]
    Sentinel,
    #[error("Cannot set alarm beyond the scheduler's time range")]
    OutOfRange,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    InvalidTime(#[from] InvalidTime),
    #[error("failed to {action} alarm, error code: {}", .source.code())]
    Scheduler {
        action: &'static str,
        #[source]
        source: SchedulerError,
    },
    #[error("alarm {0} no longer exists")]
    NotFound(Cookie),
    #[error("original time of disabled alarm {0} is missing")]
    MissingOriginalTime(Cookie),
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error("alarm saved as {new} but old entry {old} could not be removed, error code: {code}")]
    StaleEntry { old: Cookie, new: Cookie, code: i32 },
}

impl EngineError {
    pub fn is_validation(&self) -> bool {
        matches!(self, EngineError::InvalidTime(_))
    }
}

/// Result of a committed create, edit or toggle: the cookie now representing
/// the alarm and its resolved record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Committed {
    pub cookie: Cookie,
    pub record: AlarmRecord,
}

/// Keeps the scheduler's entries and the disabled-time side table in step.
///
/// Entries are never modified in place. Every change adds the replacement entry
/// first and deletes the old one only once the add has succeeded, so a failure
/// can leave a duplicate behind but never loses the alarm.
pub struct AlarmEngine<S, K> {
    scheduler: S,
    disabled: DisabledTimeStore<K>,
    identity: AppIdentity,
}

pub fn validate_trigger_time(time: i64, now: i64) -> Result<(), InvalidTime> {
    if time < now {
        Err(InvalidTime::InPast)
    } else if time == DISABLED_SENTINEL {
        Err(InvalidTime::Sentinel)
    } else if time > TIME_MAX {
        Err(InvalidTime::OutOfRange)
    } else {
        Ok(())
    }
}

fn encode_state(state: AlarmState) -> (i64, EventFlags) {
    match state {
        AlarmState::Enabled { trigger_time } => (trigger_time, EventFlags::ARMED),
        AlarmState::Disabled { .. } => (DISABLED_SENTINEL, EventFlags::NONE),
    }
}

fn record_from_event(event: &AlarmEvent, state: AlarmState) -> AlarmRecord {
    AlarmRecord {
        state,
        recurrence: Recurrence::from_interval(event.recurrence),
        snoozed_minutes: event.snoozed,
        message: unescape_message(&event.message),
        sound: AlarmSound::from_uri(&event.sound),
    }
}

fn scheduler_error(action: &'static str) -> impl FnOnce(SchedulerError) -> EngineError {
    move |source| {
        tracing::error!(action, code = source.code(), error = %source, "scheduler_call_failed");
        EngineError::Scheduler { action, source }
    }
}

impl<S: AlarmScheduler, K: SettingsStore> AlarmEngine<S, K> {
    pub fn new(scheduler: S, settings: K, identity: AppIdentity) -> Self {
        Self {
            scheduler,
            disabled: DisabledTimeStore::new(settings),
            identity,
        }
    }

    pub fn identity(&self) -> &AppIdentity {
        &self.identity
    }

    #[cfg(test)]
    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    #[cfg(test)]
    pub fn disabled_times(&self) -> &DisabledTimeStore<K> {
        &self.disabled
    }

    #[cfg(test)]
    pub(crate) fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    pub fn create(&mut self, fields: &AlarmFields, now: i64) -> Result<Committed, EngineError> {
        validate_trigger_time(fields.trigger_time, now)?;
        let state = AlarmState::Enabled {
            trigger_time: fields.trigger_time,
        };
        let event = self.build_event(fields, state);
        let cookie = self.scheduler.add(&event).map_err(scheduler_error("add"))?;
        tracing::info!(cookie = %cookie, time = fields.trigger_time, "alarm_created");
        Ok(Committed {
            cookie,
            record: record_from_event(&event, state),
        })
    }

    /// Resolved record for `cookie`; disabled alarms report their true time.
    pub fn load(&self, cookie: Cookie) -> Result<AlarmRecord, EngineError> {
        let event = self.fetch(cookie)?;
        self.decode(cookie, &event)
    }

    /// Replaces the alarm behind `old` with `fields`. A disabled alarm stays
    /// disabled and its side-table entry moves to the new cookie.
    pub fn edit(
        &mut self,
        old: Cookie,
        fields: &AlarmFields,
        now: i64,
    ) -> Result<Committed, EngineError> {
        let current = self.load(old)?;
        validate_trigger_time(fields.trigger_time, now)?;

        let state = current.state.with_time(fields.trigger_time);
        let event = self.build_event(fields, state);
        let (cookie, stale) = match self.replace_entry(old, &event) {
            Ok(cookie) => (cookie, None),
            Err(err @ EngineError::StaleEntry { new, .. }) => (new, Some(err)),
            Err(err) => return Err(err),
        };
        if !current.is_enabled() {
            self.disabled.put(cookie, fields.trigger_time)?;
            if stale.is_none() {
                self.disabled.remove(old)?;
            }
        }
        if let Some(err) = stale {
            return Err(err);
        }
        tracing::info!(old = %old, cookie = %cookie, time = fields.trigger_time, "alarm_updated");
        Ok(Committed {
            cookie,
            record: record_from_event(&event, state),
        })
    }

    /// Enables or disables the alarm behind `cookie`. Disabling folds any
    /// snooze into the remembered time; asking for the current state is a
    /// no-op that keeps the cookie.
    pub fn set_enabled(&mut self, cookie: Cookie, enabled: bool) -> Result<Committed, EngineError> {
        let mut event = self.fetch(cookie)?;
        let currently_disabled = event.alarm_time == DISABLED_SENTINEL;
        if enabled != currently_disabled {
            let record = self.decode(cookie, &event)?;
            return Ok(Committed { cookie, record });
        }

        if enabled {
            let original_time = self
                .disabled
                .get(cookie)?
                .ok_or(EngineError::MissingOriginalTime(cookie))?;
            event.alarm_time = original_time;
            event.flags = EventFlags::ARMED;
            let new_cookie = self.replace_entry(cookie, &event)?;
            self.disabled.remove(cookie)?;
            tracing::info!(old = %cookie, cookie = %new_cookie, time = original_time, "alarm_enabled");
            Ok(Committed {
                cookie: new_cookie,
                record: record_from_event(
                    &event,
                    AlarmState::Enabled {
                        trigger_time: original_time,
                    },
                ),
            })
        } else {
            let original_time = event
                .alarm_time
                .saturating_add(i64::from(event.snoozed) * 60);
            event.alarm_time = DISABLED_SENTINEL;
            event.flags = EventFlags::NONE;
            event.snoozed = 0;
            let (new_cookie, stale) = match self.replace_entry(cookie, &event) {
                Ok(new_cookie) => (new_cookie, None),
                Err(err @ EngineError::StaleEntry { new, .. }) => (new, Some(err)),
                Err(err) => return Err(err),
            };
            // The dormant entry needs its time even when the old one lingers.
            if let Err(err) = self.disabled.put(new_cookie, original_time) {
                tracing::error!(
                    cookie = %new_cookie,
                    error = %err,
                    "disabled_time_not_saved"
                );
                return Err(err.into());
            }
            if let Some(err) = stale {
                return Err(err);
            }
            tracing::info!(old = %cookie, cookie = %new_cookie, time = original_time, "alarm_disabled");
            Ok(Committed {
                cookie: new_cookie,
                record: record_from_event(&event, AlarmState::Disabled { original_time }),
            })
        }
    }

    pub fn delete(&mut self, cookie: Cookie) -> Result<(), EngineError> {
        match self.scheduler.delete(cookie) {
            Ok(()) => {}
            Err(SchedulerError::NotFound(_)) => {
                tracing::warn!(cookie = %cookie, "alarm_already_removed");
            }
            Err(source) => return Err(scheduler_error("delete")(source)),
        }
        self.disabled.remove(cookie)?;
        tracing::info!(cookie = %cookie, "alarm_deleted");
        Ok(())
    }

    /// All of this application's alarms in ascending cookie order. Disabled
    /// entries whose original time is gone are deleted instead of returned.
    pub fn reconcile(&mut self) -> Result<Vec<(Cookie, AlarmRecord)>, EngineError> {
        let mut cookies = self
            .scheduler
            .query(0, TIME_MAX)
            .map_err(scheduler_error("query"))?;
        cookies.sort_unstable();
        cookies.dedup();

        let mut rows = Vec::with_capacity(cookies.len());
        for cookie in cookies {
            let event = match self.scheduler.get(cookie) {
                Ok(Some(event)) => event,
                Ok(None) => continue,
                Err(err) => {
                    tracing::warn!(cookie = %cookie, error = %err, "alarm_read_failed");
                    continue;
                }
            };
            if event.identity != self.identity {
                continue;
            }
            match self.decode(cookie, &event) {
                Ok(record) => rows.push((cookie, record)),
                Err(EngineError::MissingOriginalTime(_)) => {
                    tracing::warn!(cookie = %cookie, "removing_orphaned_disabled_alarm");
                    if let Err(err) = self.scheduler.delete(cookie) {
                        tracing::warn!(cookie = %cookie, error = %err, "orphan_delete_failed");
                    }
                }
                Err(err) => {
                    tracing::warn!(cookie = %cookie, error = %err, "alarm_skipped");
                }
            }
        }
        tracing::debug!(count = rows.len(), "alarms_reconciled");
        Ok(rows)
    }

    fn fetch(&self, cookie: Cookie) -> Result<AlarmEvent, EngineError> {
        self.scheduler
            .get(cookie)
            .map_err(scheduler_error("read"))?
            .ok_or(EngineError::NotFound(cookie))
    }

    fn decode(&self, cookie: Cookie, event: &AlarmEvent) -> Result<AlarmRecord, EngineError> {
        let state = if event.alarm_time == DISABLED_SENTINEL {
            let original_time = self
                .disabled
                .get(cookie)?
                .ok_or(EngineError::MissingOriginalTime(cookie))?;
            AlarmState::Disabled { original_time }
        } else {
            AlarmState::Enabled {
                trigger_time: event.alarm_time,
            }
        };
        Ok(record_from_event(event, state))
    }

    fn build_event(&self, fields: &AlarmFields, state: AlarmState) -> AlarmEvent {
        let (alarm_time, flags) = encode_state(state);
        AlarmEvent {
            alarm_time,
            recurrence: fields.recurrence.interval_minutes(),
            recurrence_count: fields.recurrence.repeat_count(),
            snoozed: 0,
            flags,
            title: self.identity.title.clone(),
            message: escape_message(&fields.message),
            sound: fields.sound.uri().to_string(),
            icon: ALARM_ICON.to_string(),
            identity: self.identity.clone(),
        }
    }

    /// Adds `event` and only then deletes `old`. A failed add leaves `old`
    /// untouched; a failed delete leaves both entries live.
    fn replace_entry(&mut self, old: Cookie, event: &AlarmEvent) -> Result<Cookie, EngineError> {
        let cookie = self.scheduler.add(event).map_err(scheduler_error("add"))?;
        match self.scheduler.delete(old) {
            Ok(()) => Ok(cookie),
            Err(SchedulerError::NotFound(_)) => {
                tracing::warn!(old = %old, cookie = %cookie, "replaced_alarm_already_removed");
                Ok(cookie)
            }
            Err(err) => {
                tracing::error!(old = %old, cookie = %cookie, error = %err, "stale_alarm_entry");
                Err(EngineError::StaleEntry {
                    old,
                    new: cookie,
                    code: err.code(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::scheduler::MemoryScheduler;
    use crate::service::settings::MemorySettings;

    const NOW: i64 = 1_800_000_000;

    type TestEngine = AlarmEngine<MemoryScheduler, MemorySettings>;

    fn engine() -> TestEngine {
        AlarmEngine::new(
            MemoryScheduler::new(),
            MemorySettings::new(),
            AppIdentity::default(),
        )
    }

    fn fields(trigger_time: i64, message: &str) -> AlarmFields {
        AlarmFields {
            trigger_time,
            recurrence: Recurrence::Once,
            sound: AlarmSound::Alarm1,
            message: message.to_string(),
        }
    }

    fn has_disabled_entry(engine: &TestEngine, cookie: Cookie) -> bool {
        engine
            .disabled_times()
            .settings()
            .contains(&DisabledTimeStore::<MemorySettings>::key(cookie))
    }

    #[test]
    fn create_then_reconcile_returns_matching_row() {
        let mut engine = engine();
        let message = "wake up; bring keys \\ phone";
        let created = engine
            .create(
                &AlarmFields {
                    trigger_time: NOW + 3_600,
                    recurrence: Recurrence::Weekly,
                    sound: AlarmSound::Alarm3,
                    message: message.to_string(),
                },
                NOW,
            )
            .expect("create");

        let rows = engine.reconcile().expect("reconcile");
        assert_eq!(rows.len(), 1);
        let (cookie, record) = &rows[0];
        assert_eq!(*cookie, created.cookie);
        assert_eq!(record, &created.record);
        assert_eq!(record.trigger_time(), NOW + 3_600);
        assert_eq!(record.recurrence, Some(Recurrence::Weekly));
        assert_eq!(record.sound, Some(AlarmSound::Alarm3));
        assert_eq!(record.message, message);
        assert!(record.is_enabled());
    }

    #[test]
    fn created_entry_is_armed_and_escaped() {
        let mut engine = engine();
        let created = engine.create(&fields(NOW + 60, "a;b"), NOW).expect("create");
        let event = engine
            .scheduler()
            .get(created.cookie)
            .expect("get")
            .expect("present");
        assert_eq!(event.flags, EventFlags::ARMED);
        assert_eq!(event.message, "a\\;b");
        assert_eq!(event.recurrence_count, 0);
        assert_eq!(event.identity, AppIdentity::default());
    }

    #[test]
    fn create_rejects_past_and_sentinel_times_without_mutation() {
        let mut engine = engine();
        let before = engine.reconcile().expect("reconcile");

        let past = engine.create(&fields(NOW - 1, "late"), NOW).expect_err("past");
        assert!(matches!(past, EngineError::InvalidTime(InvalidTime::InPast)));
        assert!(past.is_validation());

        let sentinel = engine
            .create(&fields(DISABLED_SENTINEL, "never"), NOW)
            .expect_err("sentinel");
        assert!(matches!(
            sentinel,
            EngineError::InvalidTime(InvalidTime::Sentinel)
        ));

        assert_eq!(engine.reconcile().expect("reconcile"), before);
        assert!(engine.scheduler().is_empty());
        assert!(engine.disabled_times().settings().is_empty());
    }

    #[test]
    fn create_accepts_exactly_now() {
        let mut engine = engine();
        assert!(engine.create(&fields(NOW, "now"), NOW).is_ok());
    }

    #[test]
    fn create_surfaces_scheduler_error_code() {
        let mut engine = engine();
        engine.scheduler.fail_next_add(17);
        let err = engine.create(&fields(NOW + 60, "x"), NOW).expect_err("add fails");
        assert!(err.to_string().contains("error code: 17"));
        assert!(engine.scheduler().is_empty());
    }

    #[test]
    fn disable_then_enable_restores_original_time() {
        let mut engine = engine();
        let created = engine.create(&fields(NOW + 3_600, "wake up"), NOW).expect("create");
        let h1 = created.cookie;

        let disabled = engine.set_enabled(h1, false).expect("disable");
        let h2 = disabled.cookie;
        assert_ne!(h1, h2);
        assert!(!disabled.record.is_enabled());
        assert!(engine.scheduler().get(h1).expect("get").is_none());
        let dormant = engine.scheduler().get(h2).expect("get").expect("present");
        assert_eq!(dormant.alarm_time, DISABLED_SENTINEL);
        assert_eq!(dormant.flags, EventFlags::NONE);
        assert_eq!(engine.disabled_times().get(h2).expect("get"), Some(NOW + 3_600));

        let enabled = engine.set_enabled(h2, true).expect("enable");
        let h3 = enabled.cookie;
        assert!(h3 > h2);
        let live = engine.scheduler().get(h3).expect("get").expect("present");
        assert_eq!(live.alarm_time, NOW + 3_600);
        assert_eq!(live.flags, EventFlags::ARMED);
        assert!(!has_disabled_entry(&engine, h2));
        assert!(!has_disabled_entry(&engine, h3));
        assert!(engine.disabled_times().settings().is_empty());

        let rows = engine.reconcile().expect("reconcile");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0, h3);
        assert_eq!(rows[0].1.trigger_time(), NOW + 3_600);
        assert_eq!(rows[0].1.message, "wake up");
    }

    #[test]
    fn disabling_a_snoozed_alarm_folds_snooze_into_original_time() {
        let mut engine = engine();
        let created = engine.create(&fields(NOW + 600, "nap"), NOW).expect("create");
        let mut snoozed = engine
            .scheduler()
            .get(created.cookie)
            .expect("get")
            .expect("present");
        snoozed.snoozed = 9;
        engine.scheduler.delete(created.cookie).expect("delete");
        let cookie = engine.scheduler.add(&snoozed).expect("add");

        let disabled = engine.set_enabled(cookie, false).expect("disable");
        let expected = NOW + 600 + 9 * 60;
        assert_eq!(
            engine.disabled_times().get(disabled.cookie).expect("get"),
            Some(expected)
        );
        assert_eq!(disabled.record.snoozed_minutes, 0);

        let enabled = engine.set_enabled(disabled.cookie, true).expect("enable");
        assert_eq!(enabled.record.trigger_time(), expected);
        assert_eq!(enabled.record.snoozed_minutes, 0);
        let live = engine
            .scheduler()
            .get(enabled.cookie)
            .expect("get")
            .expect("present");
        assert_eq!(live.alarm_time, expected);
        assert_eq!(live.snoozed, 0);
    }

    #[test]
    fn set_enabled_to_current_state_keeps_cookie() {
        let mut engine = engine();
        let created = engine.create(&fields(NOW + 60, "x"), NOW).expect("create");
        let same = engine.set_enabled(created.cookie, true).expect("noop");
        assert_eq!(same.cookie, created.cookie);

        let disabled = engine.set_enabled(created.cookie, false).expect("disable");
        let again = engine.set_enabled(disabled.cookie, false).expect("noop");
        assert_eq!(again.cookie, disabled.cookie);
        assert_eq!(engine.scheduler().len(), 1);
    }

    #[test]
    fn failed_add_during_toggle_changes_nothing() {
        let mut engine = engine();
        let created = engine.create(&fields(NOW + 60, "x"), NOW).expect("create");
        engine.scheduler.fail_next_add(5);
        let err = engine.set_enabled(created.cookie, false).expect_err("add fails");
        assert!(matches!(err, EngineError::Scheduler { action: "add", .. }));

        let rows = engine.reconcile().expect("reconcile");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0, created.cookie);
        assert!(rows[0].1.is_enabled());
        assert!(engine.disabled_times().settings().is_empty());
    }

    #[test]
    fn failed_delete_after_add_reports_stale_entry() {
        let mut engine = engine();
        let created = engine.create(&fields(NOW + 60, "x"), NOW).expect("create");
        engine.scheduler.fail_next_delete(8);
        let err = engine
            .edit(created.cookie, &fields(NOW + 120, "y"), NOW)
            .expect_err("delete fails");
        let (old, new, code) = match err {
            EngineError::StaleEntry { old, new, code } => (old, new, code),
            other => panic!("expected stale entry, got {other:?}"),
        };
        assert_eq!(old, created.cookie);
        assert_eq!(code, 8);

        let rows = engine.reconcile().expect("reconcile");
        let cookies: Vec<Cookie> = rows.iter().map(|(cookie, _)| *cookie).collect();
        assert_eq!(cookies, vec![old, new]);
    }

    #[test]
    fn stale_entry_while_disabling_keeps_both_rows() {
        let mut engine = engine();
        let created = engine.create(&fields(NOW + 60, "x"), NOW).expect("create");
        engine.scheduler.fail_next_delete(8);
        let err = engine
            .set_enabled(created.cookie, false)
            .expect_err("delete fails");
        let (old, new) = match err {
            EngineError::StaleEntry { old, new, code: 8 } => (old, new),
            other => panic!("expected stale entry, got {other:?}"),
        };
        assert_eq!(old, created.cookie);
        assert_eq!(engine.disabled_times().get(new).expect("get"), Some(NOW + 60));

        let rows = engine.reconcile().expect("reconcile");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], (old, created.record));
        assert_eq!(rows[1].0, new);
        assert_eq!(
            rows[1].1.state,
            AlarmState::Disabled {
                original_time: NOW + 60
            }
        );
    }

    #[test]
    fn stale_entry_while_editing_disabled_alarm_keeps_both_rows() {
        let mut engine = engine();
        let created = engine.create(&fields(NOW + 60, "x"), NOW).expect("create");
        let disabled = engine.set_enabled(created.cookie, false).expect("disable");
        engine.scheduler.fail_next_delete(4);
        let err = engine
            .edit(disabled.cookie, &fields(NOW + 900, "y"), NOW)
            .expect_err("delete fails");
        let new = match err {
            EngineError::StaleEntry { new, code: 4, .. } => new,
            other => panic!("expected stale entry, got {other:?}"),
        };

        let rows = engine.reconcile().expect("reconcile");
        let states: Vec<(Cookie, AlarmState)> =
            rows.iter().map(|(cookie, record)| (*cookie, record.state)).collect();
        assert_eq!(
            states,
            vec![
                (
                    disabled.cookie,
                    AlarmState::Disabled {
                        original_time: NOW + 60
                    }
                ),
                (
                    new,
                    AlarmState::Disabled {
                        original_time: NOW + 900
                    }
                ),
            ]
        );
    }

    #[test]
    fn enabling_without_original_time_aborts() {
        let mut engine = engine();
        let created = engine.create(&fields(NOW + 60, "x"), NOW).expect("create");
        let disabled = engine.set_enabled(created.cookie, false).expect("disable");
        engine
            .disabled
            .remove(disabled.cookie)
            .expect("drop side table entry");

        let err = engine.set_enabled(disabled.cookie, true).expect_err("missing");
        assert!(matches!(err, EngineError::MissingOriginalTime(c) if c == disabled.cookie));
        let event = engine
            .scheduler()
            .get(disabled.cookie)
            .expect("get")
            .expect("still present");
        assert_eq!(event.alarm_time, DISABLED_SENTINEL);
        assert_eq!(engine.scheduler().len(), 1);
    }

    #[test]
    fn edit_always_changes_cookie() {
        let mut engine = engine();
        let created = engine.create(&fields(NOW + 60, "same"), NOW).expect("create");
        let edited = engine
            .edit(created.cookie, &fields(NOW + 60, "same"), NOW)
            .expect("edit");
        assert_ne!(edited.cookie, created.cookie);

        let rows = engine.reconcile().expect("reconcile");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0, edited.cookie);
    }

    #[test]
    fn edit_updates_fields() {
        let mut engine = engine();
        let created = engine.create(&fields(NOW + 60, "old"), NOW).expect("create");
        let edited = engine
            .edit(
                created.cookie,
                &AlarmFields {
                    trigger_time: NOW + 7_200,
                    recurrence: Recurrence::Daily,
                    sound: AlarmSound::Silent,
                    message: "new".to_string(),
                },
                NOW,
            )
            .expect("edit");

        let rows = engine.reconcile().expect("reconcile");
        assert!(rows.iter().all(|(cookie, _)| *cookie != created.cookie));
        assert_eq!(rows, vec![(edited.cookie, edited.record.clone())]);
        assert_eq!(edited.record.trigger_time(), NOW + 7_200);
        assert_eq!(edited.record.recurrence, Some(Recurrence::Daily));
        assert_eq!(edited.record.sound, Some(AlarmSound::Silent));
        assert_eq!(edited.record.message, "new");
    }

    #[test]
    fn edit_of_disabled_alarm_stays_disabled() {
        let mut engine = engine();
        let created = engine.create(&fields(NOW + 60, "x"), NOW).expect("create");
        let disabled = engine.set_enabled(created.cookie, false).expect("disable");

        let edited = engine
            .edit(disabled.cookie, &fields(NOW + 900, "y"), NOW)
            .expect("edit");
        assert!(!edited.record.is_enabled());
        assert!(!has_disabled_entry(&engine, disabled.cookie));
        assert_eq!(
            engine.disabled_times().get(edited.cookie).expect("get"),
            Some(NOW + 900)
        );
        let event = engine
            .scheduler()
            .get(edited.cookie)
            .expect("get")
            .expect("present");
        assert_eq!(event.alarm_time, DISABLED_SENTINEL);
        assert_eq!(event.flags, EventFlags::NONE);
    }

    #[test]
    fn failed_add_during_edit_leaves_old_alarm() {
        let mut engine = engine();
        let created = engine.create(&fields(NOW + 60, "keep"), NOW).expect("create");
        engine.scheduler.fail_next_add(3);
        assert!(
            engine
                .edit(created.cookie, &fields(NOW + 120, "lost"), NOW)
                .is_err()
        );
        let rows = engine.reconcile().expect("reconcile");
        assert_eq!(rows, vec![(created.cookie, created.record)]);
    }

    #[test]
    fn edit_rejects_invalid_time_without_mutation() {
        let mut engine = engine();
        let created = engine.create(&fields(NOW + 60, "x"), NOW).expect("create");
        let err = engine
            .edit(created.cookie, &fields(NOW - 60, "x"), NOW)
            .expect_err("past");
        assert!(err.is_validation());
        assert_eq!(engine.scheduler().len(), 1);
        assert!(engine.scheduler().get(created.cookie).expect("get").is_some());
    }

    #[test]
    fn delete_enabled_alarm_leaves_no_settings_entry() {
        let mut engine = engine();
        let created = engine.create(&fields(NOW + 60, "x"), NOW).expect("create");
        engine.delete(created.cookie).expect("delete");
        assert!(engine.reconcile().expect("reconcile").is_empty());
        assert!(engine.disabled_times().settings().is_empty());
    }

    #[test]
    fn delete_disabled_alarm_removes_settings_entry() {
        let mut engine = engine();
        let created = engine.create(&fields(NOW + 60, "x"), NOW).expect("create");
        let disabled = engine.set_enabled(created.cookie, false).expect("disable");
        assert!(has_disabled_entry(&engine, disabled.cookie));

        engine.delete(disabled.cookie).expect("delete");
        assert!(engine.scheduler().is_empty());
        assert!(!has_disabled_entry(&engine, disabled.cookie));
    }

    #[test]
    fn delete_of_missing_entry_still_clears_settings() {
        let mut engine = engine();
        let cookie = Cookie::new(44).expect("cookie");
        engine.disabled.put(cookie, NOW).expect("put");
        engine.delete(cookie).expect("delete");
        assert!(!has_disabled_entry(&engine, cookie));
    }

    #[test]
    fn reconcile_removes_orphaned_disabled_entries() {
        let mut engine = engine();
        let keep = engine.create(&fields(NOW + 60, "keep"), NOW).expect("create");
        let orphan = engine.create(&fields(NOW + 120, "orphan"), NOW).expect("create");
        let orphan = engine.set_enabled(orphan.cookie, false).expect("disable");
        engine.disabled.remove(orphan.cookie).expect("remove");

        let rows = engine.reconcile().expect("reconcile");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0, keep.cookie);
        assert!(engine.scheduler().get(orphan.cookie).expect("get").is_none());
    }

    #[test]
    fn reconcile_skips_other_applications() {
        let mut engine = engine();
        let mine = engine.create(&fields(NOW + 60, "mine"), NOW).expect("create");
        let mut foreign = engine
            .scheduler()
            .get(mine.cookie)
            .expect("get")
            .expect("present");
        foreign.identity.title = "calendar".to_string();
        foreign.identity.service = "org.example.calendar".to_string();
        let foreign_cookie = engine.scheduler.add(&foreign).expect("add");

        let rows = engine.reconcile().expect("reconcile");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0, mine.cookie);
        assert!(engine.scheduler().get(foreign_cookie).expect("get").is_some());
    }

    #[test]
    fn reconcile_rows_are_strictly_ascending_by_cookie() {
        let mut engine = engine();
        let late = engine.create(&fields(NOW + 9_000, "late"), NOW).expect("create");
        let early = engine.create(&fields(NOW + 60, "early"), NOW).expect("create");
        let disabled = engine.set_enabled(late.cookie, false).expect("disable");

        let rows = engine.reconcile().expect("reconcile");
        let cookies: Vec<Cookie> = rows.iter().map(|(cookie, _)| *cookie).collect();
        assert_eq!(cookies, vec![early.cookie, disabled.cookie]);
        assert!(cookies.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn load_resolves_disabled_time() {
        let mut engine = engine();
        let created = engine.create(&fields(NOW + 300, "x"), NOW).expect("create");
        let disabled = engine.set_enabled(created.cookie, false).expect("disable");
        let record = engine.load(disabled.cookie).expect("load");
        assert_eq!(
            record.state,
            AlarmState::Disabled {
                original_time: NOW + 300
            }
        );
        assert!(matches!(
            engine.load(created.cookie),
            Err(EngineError::NotFound(_))
        ));
    }
}
