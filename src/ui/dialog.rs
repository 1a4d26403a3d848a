use chrono::{DateTime, Local, NaiveDate, TimeZone, Timelike};
use thiserror::Error;

use crate::alarm::format::{default_new_alarm_time, local_timestamp, next_trigger_time};
use crate::alarm::model::{AlarmFields, AlarmRecord, AlarmSound, Cookie, Recurrence};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormError {
    #[error("date must be written as YYYY-MM-DD")]
    InvalidDate,
    #[error("hour must be 0-23 and minute 0-59")]
    InvalidTime,
    #[error("that time does not exist on this day")]
    NonexistentLocalTime,
}

/// Field values behind the add/edit dialog. `editing` is the cookie of the
/// alarm being changed, `None` for a new one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmForm {
    pub editing: Option<Cookie>,
    pub date_text: String,
    pub hour: u32,
    pub minute: u32,
    pub recurrence: Recurrence,
    pub sound: AlarmSound,
    pub message: String,
    pub error: Option<String>,
}

impl AlarmForm {
    pub fn for_new(now: i64) -> Self {
        let at = Local
            .timestamp_opt(default_new_alarm_time(now), 0)
            .single()
            .unwrap_or_else(Local::now);
        Self::at_time(None, &at, Recurrence::default(), AlarmSound::default(), "")
    }

    /// Pre-fills from an existing alarm at its next effective trigger time.
    pub fn from_record(cookie: Cookie, record: &AlarmRecord) -> Self {
        let at = next_trigger_time(record).unwrap_or_else(Local::now);
        Self::at_time(
            Some(cookie),
            &at,
            record.recurrence.unwrap_or_default(),
            record.sound.unwrap_or_default(),
            &record.message,
        )
    }

    fn at_time<Tz: TimeZone>(
        editing: Option<Cookie>,
        at: &DateTime<Tz>,
        recurrence: Recurrence,
        sound: AlarmSound,
        message: &str,
    ) -> Self {
        Self {
            editing,
            date_text: at.date_naive().format("%Y-%m-%d").to_string(),
            hour: at.hour(),
            minute: at.minute(),
            recurrence,
            sound,
            message: message.to_string(),
            error: None,
        }
    }

    pub fn title(&self) -> &'static str {
        if self.editing.is_some() {
            "Edit alarm"
        } else {
            "New alarm"
        }
    }

    pub fn to_fields(&self) -> Result<AlarmFields, FormError> {
        let trigger_time = self.trigger_time_with(local_timestamp)?;
        Ok(AlarmFields {
            trigger_time,
            recurrence: self.recurrence,
            sound: self.sound,
            message: self.message.clone(),
        })
    }

    fn trigger_time_with(
        &self,
        to_timestamp: impl Fn(NaiveDate, u32, u32) -> Option<i64>,
    ) -> Result<i64, FormError> {
        let date = NaiveDate::parse_from_str(self.date_text.trim(), "%Y-%m-%d")
            .map_err(|_| FormError::InvalidDate)?;
        if self.hour > 23 || self.minute > 59 {
            return Err(FormError::InvalidTime);
        }
        to_timestamp(date, self.hour, self.minute).ok_or(FormError::NonexistentLocalTime)
    }
}
