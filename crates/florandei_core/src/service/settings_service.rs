//! Settings use-case service.
//!
//! # Invariants
//! - Reads never fail: absent or undecodable values yield the caller's default.
//! - `take_first_run` returns `true` at most once per database.

use crate::repo::settings_repo::SettingsRepository;
use crate::service::ServiceError;
use log::warn;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Setting key tracking whether the welcome message was shown.
pub const FIRST_TIME_KEY: &str = "firstTime";

pub struct SettingsService<R: SettingsRepository> {
    repo: R,
}

impl<R: SettingsRepository> SettingsService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Reads a setting, falling back to `default` when absent or unreadable.
    pub fn get_setting_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        match self.repo.get_setting_value(key) {
            Ok(Some(value)) => match serde_json::from_value(value) {
                Ok(decoded) => decoded,
                Err(err) => {
                    warn!(
                        "event=setting_read module=service status=error key={} error_code=decode_failed error={}",
                        key, err
                    );
                    default
                }
            },
            Ok(None) => default,
            Err(err) => {
                warn!(
                    "event=setting_read module=service status=error key={} error_code=repo_failed error={}",
                    key, err
                );
                default
            }
        }
    }

    pub fn save_setting<T: Serialize>(&self, key: &str, value: &T) -> Result<(), ServiceError> {
        let encoded =
            serde_json::to_value(value).map_err(|err| ServiceError::InvalidSetting(err.to_string()))?;
        self.repo.save_setting_value(key, &encoded)?;
        Ok(())
    }

    /// Returns `true` on the first call for a fresh database, then `false`.
    pub fn take_first_run(&self) -> bool {
        let first_time = self.get_setting_or(FIRST_TIME_KEY, true);
        if first_time {
            if let Err(err) = self.save_setting(FIRST_TIME_KEY, &false) {
                warn!(
                    "event=first_run_mark module=service status=error error={}",
                    err
                );
            }
        }
        first_time
    }
}
