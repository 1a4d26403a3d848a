use std::fmt;

use serde::{Deserialize, Serialize};

/// Scheduler timestamps are 32-bit seconds since the epoch.
pub const TIME_MAX: i64 = i32::MAX as i64;

/// Trigger time of a dormant entry. `TIME_MAX` itself makes the scheduler hand
/// back a negative cookie, so the marker sits a little below it.
pub const DISABLED_SENTINEL: i64 = TIME_MAX - 200;

pub const REPEAT_FOREVER: i32 = -1;

/// Opaque handle assigned by the scheduler to one live trigger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cookie(i64);

impl Cookie {
    /// Returns `None` for zero and negative values, which the scheduler uses to
    /// signal failure.
    pub fn new(raw: i64) -> Option<Self> {
        (raw > 0).then_some(Self(raw))
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Recurrence {
    #[default]
    Once,
    Daily,
    Weekly,
}

impl Recurrence {
    pub const ALL: [Recurrence; 3] = [Recurrence::Once, Recurrence::Daily, Recurrence::Weekly];

    pub fn interval_minutes(self) -> u32 {
        match self {
            Recurrence::Once => 0,
            Recurrence::Daily => 60 * 24,
            Recurrence::Weekly => 60 * 24 * 7,
        }
    }

    pub fn repeat_count(self) -> i32 {
        match self {
            Recurrence::Once => 0,
            Recurrence::Daily | Recurrence::Weekly => REPEAT_FOREVER,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Recurrence::Once => "Once",
            Recurrence::Daily => "Daily",
            Recurrence::Weekly => "Weekly",
        }
    }

    pub fn from_interval(minutes: u32) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|recurrence| recurrence.interval_minutes() == minutes)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AlarmSound {
    #[default]
    Alarm1,
    Alarm2,
    Alarm3,
    Silent,
}

impl AlarmSound {
    pub const ALL: [AlarmSound; 4] = [
        AlarmSound::Alarm1,
        AlarmSound::Alarm2,
        AlarmSound::Alarm3,
        AlarmSound::Silent,
    ];

    pub fn uri(self) -> &'static str {
        match self {
            AlarmSound::Alarm1 => "file:///usr/share/sounds/ui-clock_alarm.mp3",
            AlarmSound::Alarm2 => "file:///usr/share/sounds/ui-clock_alarm2.mp3",
            AlarmSound::Alarm3 => "file:///usr/share/sounds/ui-clock_alarm3.mp3",
            AlarmSound::Silent => "file:///usr/share/sounds/pocketalarm_silent.mp3",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AlarmSound::Alarm1 => "Alarm 1",
            AlarmSound::Alarm2 => "Alarm 2",
            AlarmSound::Alarm3 => "Alarm 3",
            AlarmSound::Silent => "None",
        }
    }

    pub fn from_uri(uri: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|sound| sound.uri() == uri)
    }
}

/// Trigger flags understood by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventFlags(u32);

impl EventFlags {
    pub const NONE: EventFlags = EventFlags(0);
    pub const BOOT: EventFlags = EventFlags(1 << 0);
    pub const ACTDEAD: EventFlags = EventFlags(1 << 1);
    pub const SHOW_ICON: EventFlags = EventFlags(1 << 2);
    pub const RUN_DELAYED: EventFlags = EventFlags(1 << 3);

    /// Flags carried by every enabled alarm.
    pub const ARMED: EventFlags = EventFlags(
        Self::BOOT.0 | Self::ACTDEAD.0 | Self::SHOW_ICON.0 | Self::RUN_DELAYED.0,
    );
}

/// Application identity stamped on every entry. The scheduler delivers fired
/// triggers to `path/event`, and scans keep only entries carrying this tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppIdentity {
    pub title: String,
    pub service: String,
    pub path: String,
    pub interface: String,
    pub event: String,
}

impl AppIdentity {
    pub fn delivery_route(&self) -> String {
        format!("{}/{}", self.path.trim_end_matches('/'), self.event)
    }
}

impl Default for AppIdentity {
    fn default() -> Self {
        Self {
            title: "pocketalarm".to_string(),
            service: "org.pocketalarm".to_string(),
            path: "/org/pocketalarm".to_string(),
            interface: "org.pocketalarm".to_string(),
            event: "alarm_triggered".to_string(),
        }
    }
}

/// One entry as the scheduler stores it. `message` is escaped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmEvent {
    pub alarm_time: i64,
    pub recurrence: u32,
    pub recurrence_count: i32,
    #[serde(default)]
    pub snoozed: u32,
    pub flags: EventFlags,
    pub title: String,
    pub message: String,
    pub sound: String,
    pub icon: String,
    pub identity: AppIdentity,
}

/// Enabled/disabled as a first-class value. The scheduler only ever sees the
/// sentinel encoding of `Disabled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmState {
    Enabled { trigger_time: i64 },
    Disabled { original_time: i64 },
}

impl AlarmState {
    pub fn time(self) -> i64 {
        match self {
            AlarmState::Enabled { trigger_time } => trigger_time,
            AlarmState::Disabled { original_time } => original_time,
        }
    }

    pub fn is_enabled(self) -> bool {
        matches!(self, AlarmState::Enabled { .. })
    }

    pub fn with_time(self, time: i64) -> Self {
        match self {
            AlarmState::Enabled { .. } => AlarmState::Enabled { trigger_time: time },
            AlarmState::Disabled { .. } => AlarmState::Disabled {
                original_time: time,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmRecord {
    pub state: AlarmState,
    /// `None` when the entry carries an interval this app never writes.
    pub recurrence: Option<Recurrence>,
    pub snoozed_minutes: u32,
    pub message: String,
    pub sound: Option<AlarmSound>,
}

impl AlarmRecord {
    pub fn trigger_time(&self) -> i64 {
        self.state.time()
    }

    pub fn is_enabled(&self) -> bool {
        self.state.is_enabled()
    }

    pub fn repeat_label(&self) -> &'static str {
        self.recurrence.map(Recurrence::label).unwrap_or("Other")
    }

    pub fn snooze_marker(&self) -> &'static str {
        if self.snoozed_minutes > 0 { "S" } else { " " }
    }
}

/// User-editable fields of a new or edited alarm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmFields {
    pub trigger_time: i64,
    pub recurrence: Recurrence,
    pub sound: AlarmSound,
    pub message: String,
}

pub fn escape_message(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            ';' => escaped.push_str("\\;"),
            '\n' => escaped.push_str("\\n"),
            other => escaped.push(other),
        }
    }
    escaped
}

pub fn unescape_message(escaped: &str) -> String {
    let mut raw = String::with_capacity(escaped.len());
    let mut chars = escaped.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            raw.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => raw.push('\n'),
            Some(next) => raw.push(next),
            None => raw.push('\\'),
        }
    }
    raw
}
