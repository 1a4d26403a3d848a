use crate::alarm::model::Cookie;
use crate::service::settings::{SettingsError, SettingsStore};

pub const SETTINGS_NAMESPACE: &str = "/apps/pocketalarm/";

/// Original trigger times of disabled alarms, keyed by the cookie of the
/// dormant scheduler entry.
///
/// The backing store reads unset keys as 0, so a stored 0 is reported as
/// absent. An original time of exactly the epoch cannot be represented; it can
/// never be produced either, because new alarms must lie in the future.
pub struct DisabledTimeStore<K> {
    settings: K,
}

impl<K: SettingsStore> DisabledTimeStore<K> {
    pub fn new(settings: K) -> Self {
        Self { settings }
    }

    pub fn key(cookie: Cookie) -> String {
        format!("{SETTINGS_NAMESPACE}{cookie}")
    }

    pub fn put(&mut self, cookie: Cookie, original_time: i64) -> Result<(), SettingsError> {
        self.settings.set_int(&Self::key(cookie), original_time)
    }

    pub fn get(&self, cookie: Cookie) -> Result<Option<i64>, SettingsError> {
        let value = self.settings.get_int(&Self::key(cookie))?;
        Ok((value != 0).then_some(value))
    }

    pub fn remove(&mut self, cookie: Cookie) -> Result<(), SettingsError> {
        self.settings.unset(&Self::key(cookie))
    }

    #[cfg(test)]
    pub fn settings(&self) -> &K {
        &self.settings
    }
}
