use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use redb::{Database, ReadableTable, Table, TableDefinition};
use tracing::{debug, info};

use super::model::{Consumed, PasteRecord};
use super::{RecordStore, StoreError, StoreResult};

const PASTES: TableDefinition<&str, &[u8]> = TableDefinition::new("pastes");
const SHORT_IDS: TableDefinition<&str, &str> = TableDefinition::new("short_ids");

/// Thread-safe handle to the redb store.
///
/// redb admits one write transaction at a time, so every read-modify-write
/// below is atomic with respect to concurrent callers.
#[derive(Clone)]
pub struct Store {
    db: Arc<Database>,
}

impl Store {
    /// Open (or create) the database at `path`.
    ///
    /// Everything else goes through `RecordStore`; the private helpers below
    /// speak `anyhow` and the trait impl maps their outcomes to `StoreError`.
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path).context("open redb database")?;

        // Ensure all tables exist.
        let write_txn = db.begin_write()?;
        write_txn.open_table(PASTES)?;
        write_txn.open_table(SHORT_IDS)?;
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Insert a new paste. Returns false, writing nothing, if the id or short id is taken.
    fn put(&self, record: &PasteRecord) -> Result<bool> {
        let bytes = encode(record)?;

        let write_txn = self.db.begin_write()?;
        let inserted = {
            let mut pastes = write_txn.open_table(PASTES)?;
            let mut short_ids = write_txn.open_table(SHORT_IDS)?;

            let taken = pastes.get(record.id.as_str())?.is_some()
                || short_ids.get(record.short_id.as_str())?.is_some();
            if !taken {
                pastes.insert(record.id.as_str(), bytes.as_slice())?;
                short_ids.insert(record.short_id.as_str(), record.id.as_str())?;
            }
            !taken
        };
        if inserted {
            write_txn.commit()?;
            debug!(id = %record.id, short_id = %record.short_id, "stored paste");
        } else {
            write_txn.abort()?;
        }
        Ok(inserted)
    }

    /// Fetch a paste without counting a view.
    fn get(&self, id: &str) -> Result<Option<PasteRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PASTES)?;
        let raw_bytes: Option<Vec<u8>> = table.get(id)?.map(|guard| guard.value().to_vec());
        raw_bytes.as_deref().map(decode).transpose()
    }

    fn lookup_short_id(&self, short_id: &str) -> Result<Option<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SHORT_IDS)?;
        let id = table.get(short_id)?.map(|guard| guard.value().to_owned());
        Ok(id)
    }

    /// Delete a paste and its short id. Returns true if it existed.
    fn delete(&self, id: &str) -> Result<bool> {
        let write_txn = self.db.begin_write()?;
        let existed = {
            let mut pastes = write_txn.open_table(PASTES)?;
            let mut short_ids = write_txn.open_table(SHORT_IDS)?;
            remove_paste(&mut pastes, &mut short_ids, id)?
        };
        write_txn.commit()?;
        Ok(existed)
    }

    /// Add one view. Returns false if the paste does not exist.
    fn bump_views(&self, id: &str) -> Result<bool> {
        let write_txn = self.db.begin_write()?;
        let found = {
            let mut pastes = write_txn.open_table(PASTES)?;
            let raw_bytes: Option<Vec<u8>> =
                pastes.get(id)?.map(|guard| guard.value().to_vec());
            match raw_bytes {
                None => false,
                Some(bytes) => {
                    let mut record = decode(&bytes)?;
                    record.views += 1;
                    let updated = encode(&record)?;
                    pastes.insert(id, updated.as_slice())?;
                    true
                }
            }
        };
        write_txn.commit()?;
        Ok(found)
    }

    /// Read a paste and apply its read effect inside one write transaction.
    fn take(&self, id: &str, now: i64) -> Result<Consumed> {
        let write_txn = self.db.begin_write()?;
        let outcome = {
            let mut pastes = write_txn.open_table(PASTES)?;
            let mut short_ids = write_txn.open_table(SHORT_IDS)?;

            // Clone the bytes so the AccessGuard is dropped before any mutation.
            let raw_bytes: Option<Vec<u8>> =
                pastes.get(id)?.map(|guard| guard.value().to_vec());

            match raw_bytes {
                None => Consumed::Missing,
                Some(bytes) => {
                    let mut record = decode(&bytes)?;
                    if record.is_expired(now) {
                        Consumed::Expired
                    } else if record.is_first_burn_read() {
                        remove_paste(&mut pastes, &mut short_ids, id)?;
                        debug!(id = %id, "burned after first read");
                        Consumed::Burned(record)
                    } else {
                        let read = record.clone();
                        record.views += 1;
                        let updated = encode(&record)?;
                        pastes.insert(id, updated.as_slice())?;
                        Consumed::Viewed(read)
                    }
                }
            }
        };
        write_txn.commit()?;
        Ok(outcome)
    }

    /// Remove all expired pastes. Returns their ids.
    fn prune(&self, now: i64) -> Result<Vec<String>> {
        let write_txn = self.db.begin_write()?;
        let expired_ids = {
            let mut pastes = write_txn.open_table(PASTES)?;
            let mut short_ids = write_txn.open_table(SHORT_IDS)?;

            let mut ids = Vec::new();
            for item in pastes.iter()? {
                let (k, v) = item?;
                if decode(v.value())?.is_expired(now) {
                    ids.push(k.value().to_owned());
                }
            }
            for id in &ids {
                remove_paste(&mut pastes, &mut short_ids, id)?;
            }
            ids
        };
        write_txn.commit()?;

        if !expired_ids.is_empty() {
            info!(removed = expired_ids.len(), "pruned expired pastes");
        }
        Ok(expired_ids)
    }
}

impl RecordStore for Store {
    fn insert(&self, record: &PasteRecord) -> StoreResult<()> {
        if self.put(record)? {
            Ok(())
        } else {
            Err(StoreError::DuplicateKey)
        }
    }

    fn get_by_id(&self, id: &str) -> StoreResult<Option<PasteRecord>> {
        Ok(self.get(id)?)
    }

    fn id_for_short_id(&self, short_id: &str) -> StoreResult<Option<String>> {
        Ok(self.lookup_short_id(short_id)?)
    }

    fn delete_by_id(&self, id: &str) -> StoreResult<()> {
        if self.delete(id)? {
            Ok(())
        } else {
            Err(StoreError::NotFound)
        }
    }

    fn increment_views(&self, id: &str) -> StoreResult<()> {
        if self.bump_views(id)? {
            Ok(())
        } else {
            Err(StoreError::NotFound)
        }
    }

    fn consume(&self, id: &str, now: i64) -> StoreResult<Consumed> {
        Ok(self.take(id, now)?)
    }

    fn prune_expired(&self, now: i64) -> StoreResult<Vec<String>> {
        Ok(self.prune(now)?)
    }
}

/// Remove a paste row and the short id pointing at it. Returns true if the row existed.
fn remove_paste(
    pastes: &mut Table<'_, &'static str, &'static [u8]>,
    short_ids: &mut Table<'_, &'static str, &'static str>,
    id: &str,
) -> Result<bool> {
    let raw_bytes: Option<Vec<u8>> = pastes.remove(id)?.map(|guard| guard.value().to_vec());
    let Some(bytes) = raw_bytes else {
        return Ok(false);
    };
    let record = decode(&bytes)?;
    let owned = short_ids
        .get(record.short_id.as_str())?
        .is_some_and(|guard| guard.value() == id);
    if owned {
        short_ids.remove(record.short_id.as_str())?;
    }
    Ok(true)
}

fn encode(record: &PasteRecord) -> Result<Vec<u8>> {
    bincode::serde::encode_to_vec(record, bincode::config::standard())
        .context("bincode encode paste")
}

fn decode(bytes: &[u8]) -> Result<PasteRecord> {
    let (record, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .context("bincode decode paste")?;
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_store() -> (Store, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = Store::open(&dir.path().join("test.db")).unwrap();
        (store, dir)
    }

    fn record(id: &str, short_id: &str, burn: bool, expires_at: Option<i64>) -> PasteRecord {
        PasteRecord {
            id: id.into(),
            short_id: short_id.into(),
            encrypted_content: "AQID".into(),
            iv: "c2FsdA".into(),
            has_password: false,
            password_iv: None,
            salt: None,
            burn_after_reading: burn,
            views: 0,
            expires_at,
            created_at: 1000,
        }
    }

    #[test]
    fn insert_get_delete() {
        let (s, _dir) = make_store();
        let r = record("a1", "Short01", false, None);
        s.insert(&r).unwrap();
        assert_eq!(s.get_by_id("a1").unwrap(), Some(r));
        assert_eq!(s.id_for_short_id("Short01").unwrap().as_deref(), Some("a1"));

        s.delete_by_id("a1").unwrap();
        assert_eq!(s.get_by_id("a1").unwrap(), None);
        assert_eq!(s.id_for_short_id("Short01").unwrap(), None);
        assert!(matches!(s.delete_by_id("a1"), Err(StoreError::NotFound)));
    }

    #[test]
    fn insert_rejects_duplicate_id_and_short_id() {
        let (s, _dir) = make_store();
        s.insert(&record("a1", "Short01", false, None)).unwrap();
        assert!(matches!(
            s.insert(&record("a1", "Short02", false, None)),
            Err(StoreError::DuplicateKey)
        ));
        assert!(matches!(
            s.insert(&record("a2", "Short01", false, None)),
            Err(StoreError::DuplicateKey)
        ));
        // Rejected inserts leave nothing behind.
        assert_eq!(s.id_for_short_id("Short02").unwrap(), None);
        assert_eq!(s.get_by_id("a2").unwrap(), None);
    }

    #[test]
    fn increment_views_persists() {
        let (s, _dir) = make_store();
        s.insert(&record("a1", "Short01", false, None)).unwrap();
        s.increment_views("a1").unwrap();
        s.increment_views("a1").unwrap();
        assert_eq!(s.get_by_id("a1").unwrap().unwrap().views, 2);
        assert!(matches!(s.increment_views("nope"), Err(StoreError::NotFound)));
    }

    #[test]
    fn consume_burns_on_first_read() {
        let (s, _dir) = make_store();
        let r = record("b1", "Burn001", true, None);
        s.insert(&r).unwrap();
        assert_eq!(s.consume("b1", 1000).unwrap(), Consumed::Burned(r));
        assert_eq!(s.consume("b1", 1000).unwrap(), Consumed::Missing);
        assert_eq!(s.id_for_short_id("Burn001").unwrap(), None);
    }

    #[test]
    fn consume_counts_views() {
        let (s, _dir) = make_store();
        s.insert(&record("v1", "View001", false, None)).unwrap();
        for expected in 0..3 {
            match s.consume("v1", 1000).unwrap() {
                Consumed::Viewed(r) => assert_eq!(r.views, expected),
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(s.get_by_id("v1").unwrap().unwrap().views, 3);
    }

    #[test]
    fn consume_reports_expired_without_mutating() {
        let (s, _dir) = make_store();
        s.insert(&record("e1", "Expd001", true, Some(2000))).unwrap();
        assert_eq!(s.consume("e1", 2000).unwrap(), Consumed::Expired);
        let r = s.get_by_id("e1").unwrap().unwrap();
        assert_eq!(r.views, 0);
    }

    #[test]
    fn prune_removes_only_expired() {
        let (s, _dir) = make_store();
        s.insert(&record("live", "Live001", false, Some(5000))).unwrap();
        s.insert(&record("dead", "Dead001", false, Some(1500))).unwrap();
        s.insert(&record("forever", "Ever001", false, None)).unwrap();

        assert_eq!(s.prune_expired(2000).unwrap(), vec!["dead".to_string()]);
        assert!(s.get_by_id("live").unwrap().is_some());
        assert!(s.get_by_id("forever").unwrap().is_some());
        assert_eq!(s.id_for_short_id("Dead001").unwrap(), None);
        assert!(s.prune_expired(2000).unwrap().is_empty());
    }

    #[test]
    fn records_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        {
            let s = Store::open(&path).unwrap();
            s.insert(&record("p1", "Persist", false, None)).unwrap();
        }
        let s = Store::open(&path).unwrap();
        assert_eq!(s.id_for_short_id("Persist").unwrap().as_deref(), Some("p1"));
    }
}
