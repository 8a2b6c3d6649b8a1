// src/monitoring/key_health.rs

use crate::storage::{KeyRecord, KeyStatus};
use serde::Serialize;
use std::time::Instant;

/// Per-key row of a [`super::StatusReport`]. Never carries the credential itself.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyReport {
    pub name: String,
    pub masked_key: String,
    pub status: KeyStatus,
    pub available: bool,
    pub total_requests: u64,
    pub total_successes: u64,
    pub total_errors: u64,
    pub consecutive_errors: u32,
    pub rate_limit_hits: u64,
    /// Successes over dispatched requests, 0.0 when the key was never used.
    pub success_rate: f64,
    pub last_error: Option<String>,
    /// Seconds until the key reads Active again; 0 when Active or Disabled.
    pub recovery_in_secs: u64,
}

impl KeyReport {
    pub fn from_record(record: &KeyRecord, now: Instant) -> Self {
        let status = record.status(now);
        let success_rate = if record.total_requests() > 0 {
            record.total_successes() as f64 / record.total_requests() as f64
        } else {
            0.0
        };

        Self {
            name: record.name().to_string(),
            masked_key: record.masked().to_string(),
            status,
            available: status == KeyStatus::Active,
            total_requests: record.total_requests(),
            total_successes: record.total_successes(),
            total_errors: record.total_errors(),
            consecutive_errors: record.consecutive_errors(),
            rate_limit_hits: record.rate_limit_hits(),
            success_rate,
            last_error: record.last_error().map(str::to_string),
            // Round up so a key still cooling down never reports 0.
            recovery_in_secs: record.recovery_in(now).as_millis().div_ceil(1000) as u64,
        }
    }
}
