use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::alarm::model::{AlarmEvent, Cookie};

pub const ERROR_INVALID_ARGS: i32 = 1;
pub const ERROR_NOT_FOUND: i32 = 2;
pub const ERROR_STORAGE: i32 = 3;
pub const ERROR_COOKIE_EXHAUSTED: i32 = 4;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("scheduler rejected the request (error code {code})")]
    Rejected { code: i32 },
    #[error("no alarm entry for cookie {0}")]
    NotFound(Cookie),
    #[error("alarm queue {path}: {message}")]
    Storage { path: PathBuf, message: String },
}

impl SchedulerError {
    /// Numeric code shown to the user, mirroring the scheduler's last-error
    /// query.
    pub fn code(&self) -> i32 {
        match self {
            SchedulerError::Rejected { code } => *code,
            SchedulerError::NotFound(_) => ERROR_NOT_FOUND,
            SchedulerError::Storage { .. } => ERROR_STORAGE,
        }
    }
}

/// The external service that owns alarm triggers. Entries are never updated in
/// place: every change is an `add` of a fresh entry plus a `delete`.
pub trait AlarmScheduler {
    fn add(&mut self, event: &AlarmEvent) -> Result<Cookie, SchedulerError>;
    fn delete(&mut self, cookie: Cookie) -> Result<(), SchedulerError>;
    fn get(&self, cookie: Cookie) -> Result<Option<AlarmEvent>, SchedulerError>;
    /// Cookies of entries whose trigger time lies in `[start, end)`.
    fn query(&self, start: i64, end: i64) -> Result<Vec<Cookie>, SchedulerError>;
}

#[derive(Debug, Clone, Default)]
struct Queue {
    next_cookie: i64,
    events: BTreeMap<Cookie, AlarmEvent>,
}

impl Queue {
    fn add(&mut self, event: &AlarmEvent) -> Result<Cookie, SchedulerError> {
        if event.title.is_empty() || event.alarm_time < 0 {
            return Err(SchedulerError::Rejected {
                code: ERROR_INVALID_ARGS,
            });
        }
        let raw = self.next_cookie.max(1);
        let cookie = Cookie::new(raw).ok_or(SchedulerError::Rejected {
            code: ERROR_COOKIE_EXHAUSTED,
        })?;
        self.next_cookie = raw.checked_add(1).ok_or(SchedulerError::Rejected {
            code: ERROR_COOKIE_EXHAUSTED,
        })?;
        self.events.insert(cookie, event.clone());
        Ok(cookie)
    }

    fn delete(&mut self, cookie: Cookie) -> Result<(), SchedulerError> {
        self.events
            .remove(&cookie)
            .map(|_| ())
            .ok_or(SchedulerError::NotFound(cookie))
    }

    fn query(&self, start: i64, end: i64) -> Vec<Cookie> {
        self.events
            .iter()
            .filter(|(_, event)| event.alarm_time >= start && event.alarm_time < end)
            .map(|(cookie, _)| *cookie)
            .collect()
    }
}

/// Scheduler kept in process memory. Used by tests and as a scratch backend.
#[derive(Debug, Clone, Default)]
pub struct MemoryScheduler {
    queue: Queue,
    fail_next_add: Option<i32>,
    fail_next_delete: Option<i32>,
}

impl MemoryScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `add` fail with `code`.
    #[cfg(test)]
    pub fn fail_next_add(&mut self, code: i32) {
        self.fail_next_add = Some(code);
    }

    /// Makes the next `delete` fail with `code`.
    #[cfg(test)]
    pub fn fail_next_delete(&mut self, code: i32) {
        self.fail_next_delete = Some(code);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.queue.events.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.queue.events.is_empty()
    }
}

impl AlarmScheduler for MemoryScheduler {
    fn add(&mut self, event: &AlarmEvent) -> Result<Cookie, SchedulerError> {
        if let Some(code) = self.fail_next_add.take() {
            return Err(SchedulerError::Rejected { code });
        }
        self.queue.add(event)
    }

    fn delete(&mut self, cookie: Cookie) -> Result<(), SchedulerError> {
        if let Some(code) = self.fail_next_delete.take() {
            return Err(SchedulerError::Rejected { code });
        }
        self.queue.delete(cookie)
    }

    fn get(&self, cookie: Cookie) -> Result<Option<AlarmEvent>, SchedulerError> {
        Ok(self.queue.events.get(&cookie).cloned())
    }

    fn query(&self, start: i64, end: i64) -> Result<Vec<Cookie>, SchedulerError> {
        Ok(self.queue.query(start, end))
    }
}

/// Scheduler queue stored as JSON. The file is re-read on every call so that
/// changes made by other processes are picked up.
#[derive(Debug, Clone)]
pub struct FileScheduler {
    path: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct QueueFile {
    version: u32,
    next_cookie: i64,
    events: Vec<QueueEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct QueueEntry {
    cookie: Cookie,
    #[serde(flatten)]
    event: AlarmEvent,
}

impl FileScheduler {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn storage_error(&self, message: impl Into<String>) -> SchedulerError {
        SchedulerError::Storage {
            path: self.path.clone(),
            message: message.into(),
        }
    }

    fn load(&self) -> Result<Queue, SchedulerError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Queue::default()),
            Err(err) => return Err(self.storage_error(format!("unable to read: {err}"))),
        };
        let raw = serde_json::from_str::<QueueFile>(&content).map_err(|err| {
            self.storage_error(format!(
                "invalid JSON at line {}, column {}: {err}",
                err.line(),
                err.column()
            ))
        })?;
        if raw.version != 1 {
            return Err(self.storage_error(format!(
                "unsupported queue version {}; expected version 1",
                raw.version
            )));
        }

        let mut queue = Queue {
            next_cookie: raw.next_cookie,
            events: BTreeMap::new(),
        };
        for entry in raw.events {
            if queue.events.insert(entry.cookie, entry.event).is_some() {
                return Err(self.storage_error(format!("duplicate cookie {}", entry.cookie)));
            }
        }
        let highest = queue.events.keys().next_back().map(|cookie| cookie.get());
        if let Some(highest) = highest {
            queue.next_cookie = queue.next_cookie.max(highest.saturating_add(1));
        }
        Ok(queue)
    }

    fn save(&self, queue: &Queue) -> Result<(), SchedulerError> {
        let payload = QueueFile {
            version: 1,
            next_cookie: queue.next_cookie,
            events: queue
                .events
                .iter()
                .map(|(cookie, event)| QueueEntry {
                    cookie: *cookie,
                    event: event.clone(),
                })
                .collect(),
        };
        let text = serde_json::to_string_pretty(&payload)
            .map_err(|err| self.storage_error(format!("unable to encode: {err}")))?;
        fs::write(&self.path, format!("{text}\n"))
            .map_err(|err| self.storage_error(format!("unable to write: {err}")))
    }
}

impl AlarmScheduler for FileScheduler {
    fn add(&mut self, event: &AlarmEvent) -> Result<Cookie, SchedulerError> {
        let mut queue = self.load()?;
        let cookie = queue.add(event)?;
        self.save(&queue)?;
        Ok(cookie)
    }

    fn delete(&mut self, cookie: Cookie) -> Result<(), SchedulerError> {
        let mut queue = self.load()?;
        queue.delete(cookie)?;
        self.save(&queue)
    }

    fn get(&self, cookie: Cookie) -> Result<Option<AlarmEvent>, SchedulerError> {
        Ok(self.load()?.events.remove(&cookie))
    }

    fn query(&self, start: i64, end: i64) -> Result<Vec<Cookie>, SchedulerError> {
        Ok(self.load()?.query(start, end))
    }
}
