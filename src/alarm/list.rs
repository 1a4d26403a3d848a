use crate::alarm::format::{format_display, next_trigger_time};
use crate::alarm::model::{AlarmRecord, Cookie};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmRow {
    pub cookie: Cookie,
    pub record: AlarmRecord,
}

impl AlarmRow {
    pub fn time_text(&self) -> String {
        next_trigger_time(&self.record)
            .map(|time| format_display(&time, true))
            .unwrap_or_else(|| "--:--".to_string())
    }

    pub fn is_enabled(&self) -> bool {
        self.record.is_enabled()
    }

    pub fn repeat_text(&self) -> &'static str {
        self.record.repeat_label()
    }

    pub fn snooze_marker(&self) -> &'static str {
        self.record.snooze_marker()
    }
}

/// Rows in ascending cookie order. Holds no alarm logic of its own; it only
/// absorbs the cookie churn caused by edits and toggles.
#[derive(Debug, Clone, Default)]
pub struct AlarmList {
    rows: Vec<AlarmRow>,
}

impl AlarmList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, cookie: Cookie, record: AlarmRecord) {
        let index = self
            .rows
            .iter()
            .position(|row| row.cookie >= cookie)
            .unwrap_or(self.rows.len());
        if self.rows.get(index).is_some_and(|row| row.cookie == cookie) {
            self.rows[index].record = record;
        } else {
            self.rows.insert(index, AlarmRow { cookie, record });
        }
    }

    pub fn remove(&mut self, cookie: Cookie) -> Option<AlarmRow> {
        let index = self.position(cookie)?;
        Some(self.rows.remove(index))
    }

    pub fn replace(&mut self, old: Cookie, new: Cookie, record: AlarmRecord) {
        self.remove(old);
        self.insert(new, record);
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }

    pub fn all(&self) -> &[AlarmRow] {
        &self.rows
    }

    pub fn get(&self, cookie: Cookie) -> Option<&AlarmRow> {
        self.rows.iter().find(|row| row.cookie == cookie)
    }

    pub fn position(&self, cookie: Cookie) -> Option<usize> {
        self.rows.iter().position(|row| row.cookie == cookie)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
