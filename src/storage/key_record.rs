// src/storage/key_record.rs

use crate::utils::mask_key;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::fmt;
use std::time::{Duration, Instant};

/// Observable health of a key at a given instant.
///
/// Only `Disabled` is stored; the other states are derived from timestamps by
/// [`KeyRecord::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStatus {
    Active,
    RateLimited,
    ErrorCooldown,
    Disabled,
}

impl fmt::Display for KeyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::RateLimited => write!(f, "rate_limited"),
            Self::ErrorCooldown => write!(f, "error_cooldown"),
            Self::Disabled => write!(f, "disabled"),
        }
    }
}

/// Position of a key in the registry, in configuration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyId(pub(crate) usize);

impl KeyId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Health and usage state of one credential.
///
/// Fields are only written by [`crate::core::HealthTracker`].
#[derive(Debug, Clone)]
pub struct KeyRecord {
    pub(crate) id: KeyId,
    pub(crate) name: String,
    pub(crate) credential: SecretString,
    pub(crate) masked: String,
    pub(crate) disabled: bool,
    pub(crate) consecutive_errors: u32,
    pub(crate) total_requests: u64,
    pub(crate) total_successes: u64,
    pub(crate) total_errors: u64,
    pub(crate) rate_limit_hits: u64,
    pub(crate) rate_limit_until: Option<Instant>,
    pub(crate) cooldown_until: Option<Instant>,
    pub(crate) last_used_at: Option<Instant>,
    pub(crate) last_error: Option<String>,
}

impl KeyRecord {
    pub fn new(id: KeyId, name: impl Into<String>, credential: SecretString) -> Self {
        let masked = mask_key(credential.expose_secret());
        Self {
            id,
            name: name.into(),
            credential,
            masked,
            disabled: false,
            consecutive_errors: 0,
            total_requests: 0,
            total_successes: 0,
            total_errors: 0,
            rate_limit_hits: 0,
            rate_limit_until: None,
            cooldown_until: None,
            last_used_at: None,
            last_error: None,
        }
    }

    /// Derives the status at `now`. Precedence: Disabled, RateLimited, ErrorCooldown, Active.
    pub fn status(&self, now: Instant) -> KeyStatus {
        if self.disabled {
            KeyStatus::Disabled
        } else if self.rate_limit_until.is_some_and(|until| now < until) {
            KeyStatus::RateLimited
        } else if self.cooldown_until.is_some_and(|until| now < until) {
            KeyStatus::ErrorCooldown
        } else {
            KeyStatus::Active
        }
    }

    /// Time until the key reads Active again. Zero when Active or Disabled.
    pub fn recovery_in(&self, now: Instant) -> Duration {
        if self.disabled {
            return Duration::ZERO;
        }
        [self.rate_limit_until, self.cooldown_until]
            .into_iter()
            .flatten()
            .map(|until| until.saturating_duration_since(now))
            .max()
            .unwrap_or(Duration::ZERO)
    }

    pub fn id(&self) -> KeyId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn credential(&self) -> &SecretString {
        &self.credential
    }

    /// Masked credential suffix, safe to log.
    pub fn masked(&self) -> &str {
        &self.masked
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests
    }

    pub fn total_successes(&self) -> u64 {
        self.total_successes
    }

    pub fn total_errors(&self) -> u64 {
        self.total_errors
    }

    pub fn rate_limit_hits(&self) -> u64 {
        self.rate_limit_hits
    }

    pub fn rate_limit_until(&self) -> Option<Instant> {
        self.rate_limit_until
    }

    pub fn cooldown_until(&self) -> Option<Instant> {
        self.cooldown_until
    }

    pub fn last_used_at(&self) -> Option<Instant> {
        self.last_used_at
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub(crate) fn view(&self, now: Instant) -> KeyView {
        KeyView {
            id: self.id,
            status: self.status(now),
            total_requests: self.total_requests,
            last_used_at: self.last_used_at,
        }
    }
}

/// The few fields key selection needs, copied out under the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyView {
    pub id: KeyId,
    pub status: KeyStatus,
    pub total_requests: u64,
    pub last_used_at: Option<Instant>,
}
