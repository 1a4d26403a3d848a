use chrono::{DateTime, Datelike, Local, LocalResult, NaiveDate, NaiveTime, TimeZone, Timelike};

use crate::alarm::model::{AlarmRecord, TIME_MAX};

/// Seconds added to "now" when pre-filling the new alarm dialog.
pub const NEW_ALARM_OFFSET_SECS: i64 = 60 * 60;

const WEEKDAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];
const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Renders `07:30 AM  Mon Jan 5, 2026`. Hour 0 shows as 12 and hours past noon
/// are shifted and marked PM; hour 12 keeps the AM marker.
pub fn format_display<Tz: TimeZone>(time: &DateTime<Tz>, with_weekday: bool) -> String {
    let (hour, meridiem) = match time.hour() {
        0 => (12, "AM"),
        hour if hour > 12 => (hour - 12, "PM"),
        hour => (hour, "AM"),
    };
    let mut text = format!("{hour:02}:{:02} {meridiem}  ", time.minute());
    if with_weekday {
        let weekday = WEEKDAYS[time.weekday().num_days_from_sunday() as usize];
        text.push_str(weekday);
        text.push(' ');
    }
    text.push_str(&format!(
        "{} {}, {}",
        MONTHS[time.month0() as usize],
        time.day(),
        time.year()
    ));
    text
}

/// Wall-clock time at which the alarm will next go off. Snooze is added on top
/// of the stored trigger time, so the original schedule stays recoverable.
pub fn next_trigger_time(record: &AlarmRecord) -> Option<DateTime<Local>> {
    next_trigger_time_in_tz(record, &Local)
}

pub(crate) fn next_trigger_time_in_tz<Tz: TimeZone>(
    record: &AlarmRecord,
    timezone: &Tz,
) -> Option<DateTime<Tz>> {
    let seconds = record
        .trigger_time()
        .saturating_add(i64::from(record.snoozed_minutes) * 60);
    timezone.timestamp_opt(seconds, 0).single()
}

/// Default trigger time for a new alarm, saturating at the scheduler's maximum.
pub fn default_new_alarm_time(now: i64) -> i64 {
    if TIME_MAX - now < NEW_ALARM_OFFSET_SECS {
        TIME_MAX
    } else {
        now + NEW_ALARM_OFFSET_SECS
    }
}

/// Drops the seconds of a timestamp; alarms have minute granularity.
pub fn floor_to_minute(time: i64) -> i64 {
    time.div_euclid(60) * 60
}

/// Converts a local calendar date and wall time to a timestamp. Ambiguous
/// local times take the earlier instant; times skipped by a DST jump give
/// `None`.
pub fn local_timestamp(date: NaiveDate, hour: u32, minute: u32) -> Option<i64> {
    local_timestamp_in_tz(&Local, date, hour, minute)
}

pub(crate) fn local_timestamp_in_tz<Tz: TimeZone>(
    timezone: &Tz,
    date: NaiveDate,
    hour: u32,
    minute: u32,
) -> Option<i64> {
    let time = NaiveTime::from_hms_opt(hour, minute, 0)?;
    match timezone.from_local_datetime(&date.and_time(time)) {
        LocalResult::Single(dt) => Some(dt.timestamp()),
        LocalResult::Ambiguous(first, _second) => Some(first.timestamp()),
        LocalResult::None => None,
    }
}
