pub mod db;
pub mod memory;
pub mod model;

pub use db::Store;
pub use memory::MemoryStore;
pub use model::{Consumed, PasteRecord};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// `id` or `short_id` is already taken.
    #[error("duplicate key")]
    DuplicateKey,
    #[error("record not found")]
    NotFound,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Keyed paste storage.
///
/// Every method is a single transaction against the backend. `consume` is the
/// only read path that may release content, and it decides between delete and
/// increment under the same lock or transaction it fetched the record with.
pub trait RecordStore: Send + Sync + 'static {
    /// Insert a new record. Fails with `DuplicateKey` if its id or short id exists.
    fn insert(&self, record: &PasteRecord) -> StoreResult<()>;

    /// Fetch a record without touching its view counter.
    fn get_by_id(&self, id: &str) -> StoreResult<Option<PasteRecord>>;

    /// Resolve a short id to its internal id. Never counts as a read.
    fn id_for_short_id(&self, short_id: &str) -> StoreResult<Option<String>>;

    fn delete_by_id(&self, id: &str) -> StoreResult<()>;

    fn increment_views(&self, id: &str) -> StoreResult<()>;

    /// Atomically read a record and apply its read effect.
    ///
    /// Expired records are reported but left in place for the caller to delete.
    fn consume(&self, id: &str, now: i64) -> StoreResult<Consumed>;

    /// Remove every record expired at `now`. Returns the removed ids.
    fn prune_expired(&self, now: i64) -> StoreResult<Vec<String>>;
}
