use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::anyhow;

use super::model::{Consumed, PasteRecord};
use super::{RecordStore, StoreError, StoreResult};

#[derive(Default)]
struct Tables {
    pastes: HashMap<String, PasteRecord>,
    short_ids: HashMap<String, String>,
}

impl Tables {
    fn remove(&mut self, id: &str) -> Option<PasteRecord> {
        let record = self.pastes.remove(id)?;
        if self.short_ids.get(&record.short_id).is_some_and(|owner| owner == id) {
            self.short_ids.remove(&record.short_id);
        }
        Some(record)
    }
}

/// Non-durable store for ephemeral deployments. Everything lives behind one
/// mutex, so each method is a single critical section.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored pastes, expired ones included.
    pub fn len(&self) -> usize {
        self.inner.lock().map(|t| t.pastes.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Tables>> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Backend(anyhow!("memory store lock poisoned")))
    }
}

impl RecordStore for MemoryStore {
    fn insert(&self, record: &PasteRecord) -> StoreResult<()> {
        let mut t = self.lock()?;
        if t.pastes.contains_key(&record.id) || t.short_ids.contains_key(&record.short_id) {
            return Err(StoreError::DuplicateKey);
        }
        t.short_ids.insert(record.short_id.clone(), record.id.clone());
        t.pastes.insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn get_by_id(&self, id: &str) -> StoreResult<Option<PasteRecord>> {
        Ok(self.lock()?.pastes.get(id).cloned())
    }

    fn id_for_short_id(&self, short_id: &str) -> StoreResult<Option<String>> {
        Ok(self.lock()?.short_ids.get(short_id).cloned())
    }

    fn delete_by_id(&self, id: &str) -> StoreResult<()> {
        self.lock()?.remove(id).map(|_| ()).ok_or(StoreError::NotFound)
    }

    fn increment_views(&self, id: &str) -> StoreResult<()> {
        let mut t = self.lock()?;
        let record = t.pastes.get_mut(id).ok_or(StoreError::NotFound)?;
        record.views += 1;
        Ok(())
    }

    fn consume(&self, id: &str, now: i64) -> StoreResult<Consumed> {
        let mut t = self.lock()?;
        let Some(record) = t.pastes.get_mut(id) else {
            return Ok(Consumed::Missing);
        };
        if record.is_expired(now) {
            return Ok(Consumed::Expired);
        }
        if record.is_first_burn_read() {
            return Ok(t.remove(id).map_or(Consumed::Missing, Consumed::Burned));
        }
        let read = record.clone();
        record.views += 1;
        Ok(Consumed::Viewed(read))
    }

    fn prune_expired(&self, now: i64) -> StoreResult<Vec<String>> {
        let mut t = self.lock()?;
        let ids: Vec<String> = t
            .pastes
            .values()
            .filter(|r| r.is_expired(now))
            .map(|r| r.id.clone())
            .collect();
        for id in &ids {
            t.remove(id);
        }
        Ok(ids)
    }
}
