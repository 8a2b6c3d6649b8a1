// src/storage/memory.rs

use crate::config::ApiKeyConfig;
use crate::error::{AppError, Result};
use crate::storage::{KeyId, KeyRecord, KeyView};
use parking_lot::Mutex;
use std::time::Instant;
use tracing::{info, trace};

/// Process-lifetime set of key records, one lock per record.
///
/// Records are created once from configuration and never removed. Locks are held only
/// for field copies and updates, never across I/O.
#[derive(Debug)]
pub struct KeyRegistry {
    records: Vec<Mutex<KeyRecord>>,
}

impl KeyRegistry {
    pub fn new(keys: &[ApiKeyConfig]) -> Self {
        let records: Vec<_> = keys
            .iter()
            .enumerate()
            .map(|(index, key)| {
                Mutex::new(KeyRecord::new(
                    KeyId(index),
                    key.name.clone(),
                    key.api_key.clone(),
                ))
            })
            .collect();

        info!(keys.count = records.len(), "Key registry initialized");
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = KeyId> {
        (0..self.records.len()).map(KeyId)
    }

    /// Looks a key up by its configured name.
    pub fn find(&self, name: &str) -> Option<KeyId> {
        self.records
            .iter()
            .position(|record| record.lock().name == name)
            .map(KeyId)
    }

    fn slot(&self, id: KeyId) -> Result<&Mutex<KeyRecord>> {
        self.records.get(id.0).ok_or_else(|| AppError::KeyNotFound {
            name: id.to_string(),
        })
    }

    /// Runs `f` against the record under its lock.
    pub fn read<R>(&self, id: KeyId, f: impl FnOnce(&KeyRecord) -> R) -> Result<R> {
        let guard = self.slot(id)?.lock();
        Ok(f(&guard))
    }

    pub(crate) fn update<R>(&self, id: KeyId, f: impl FnOnce(&mut KeyRecord) -> R) -> Result<R> {
        let mut guard = self.slot(id)?.lock();
        Ok(f(&mut guard))
    }

    /// Copy of one record.
    pub fn record(&self, id: KeyId) -> Result<KeyRecord> {
        self.read(id, Clone::clone)
    }

    /// Copies of every record, in configuration order.
    pub fn records(&self) -> Vec<KeyRecord> {
        self.records.iter().map(|r| r.lock().clone()).collect()
    }

    /// Selection snapshot; each record is locked only while its view is copied.
    pub fn views(&self, now: Instant) -> Vec<KeyView> {
        trace!("KeyRegistry::views: copying selection snapshot");
        self.records.iter().map(|r| r.lock().view(now)).collect()
    }
}
