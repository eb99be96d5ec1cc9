use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::{rngs::StdRng, RngCore, SeedableRng};
use serde::Serialize;
use tokio::time;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::PasteError;
use crate::ids::{generate_paste_id, generate_short_id, MAX_SHORT_ID_ATTEMPTS};
use crate::store::{Consumed, PasteRecord, RecordStore, StoreError};

/// Upper bound on `encrypted_content`, measured as received.
pub const MAX_CONTENT_BYTES: usize = 100 * 1024;

/// Fixed expiry choices offered to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiresIn {
    OneHour,
    FourHours,
    OneDay,
    SevenDays,
}

impl ExpiresIn {
    pub fn as_secs(self) -> i64 {
        match self {
            Self::OneHour => 60 * 60,
            Self::FourHours => 4 * 60 * 60,
            Self::OneDay => 24 * 60 * 60,
            Self::SevenDays => 7 * 24 * 60 * 60,
        }
    }
}

impl FromStr for ExpiresIn {
    type Err = PasteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1h" => Ok(Self::OneHour),
            "4h" => Ok(Self::FourHours),
            "1d" => Ok(Self::OneDay),
            "7d" => Ok(Self::SevenDays),
            other => Err(PasteError::InvalidRequest(format!(
                "expiresIn must be one of 1h, 4h, 1d, 7d (got {other:?})"
            ))),
        }
    }
}

/// A creation request as it arrives from a client. Nothing is validated yet.
#[derive(Debug, Clone, Default)]
pub struct NewPaste {
    pub encrypted_content: Option<String>,
    pub iv: Option<String>,
    pub password_iv: Option<String>,
    pub salt: Option<String>,
    pub has_password: bool,
    pub burn_after_reading: bool,
    pub expires_in: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Created {
    pub id: String,
    pub short_id: String,
}

/// What a successful retrieval hands back. Never includes the view counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PasteBody {
    pub encrypted_content: String,
    pub iv: String,
    pub password_iv: Option<String>,
    pub salt: Option<String>,
    pub has_password: bool,
    pub burn_after_reading: bool,
}

impl From<PasteRecord> for PasteBody {
    fn from(r: PasteRecord) -> Self {
        Self {
            encrypted_content: r.encrypted_content,
            iv: r.iv,
            password_iv: r.password_iv,
            salt: r.salt,
            has_password: r.has_password,
            burn_after_reading: r.burn_after_reading,
        }
    }
}

/// Creation and retrieval of pastes on top of a `RecordStore`.
#[derive(Clone)]
pub struct Pastes {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    rng: Arc<Mutex<Box<dyn RngCore + Send>>>,
}

impl Pastes {
    /// Production wiring: system clock, entropy-seeded RNG.
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self::with_parts(store, Arc::new(SystemClock), StdRng::from_entropy())
    }

    pub fn with_parts(
        store: Arc<dyn RecordStore>,
        clock: Arc<dyn Clock>,
        rng: impl RngCore + Send + 'static,
    ) -> Self {
        let rng: Box<dyn RngCore + Send> = Box::new(rng);
        Self {
            store,
            clock,
            rng: Arc::new(Mutex::new(rng)),
        }
    }

    /// Validate and persist a new paste under a fresh short id.
    pub fn create(&self, req: NewPaste) -> Result<Created, PasteError> {
        let encrypted_content = req
            .encrypted_content
            .filter(|s| !s.is_empty())
            .ok_or_else(|| PasteError::InvalidRequest("encryptedContent is required".into()))?;
        let iv = req
            .iv
            .filter(|s| !s.is_empty())
            .ok_or_else(|| PasteError::InvalidRequest("iv is required".into()))?;
        if encrypted_content.len() > MAX_CONTENT_BYTES {
            return Err(PasteError::PayloadTooLarge);
        }

        let password_iv = req.password_iv.filter(|s| !s.is_empty());
        let salt = req.salt.filter(|s| !s.is_empty());
        match (req.has_password, password_iv.is_some(), salt.is_some()) {
            (true, true, true) | (false, false, false) => {}
            (true, _, _) => {
                return Err(PasteError::InvalidRequest(
                    "passwordIv and salt are required when hasPassword is set".into(),
                ))
            }
            (false, _, _) => {
                return Err(PasteError::InvalidRequest(
                    "passwordIv and salt are only allowed when hasPassword is set".into(),
                ))
            }
        }

        let expires_in = req
            .expires_in
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(ExpiresIn::from_str)
            .transpose()?;

        let now = self.clock.now();
        let mut record = PasteRecord {
            id: String::new(),
            short_id: String::new(),
            encrypted_content,
            iv,
            has_password: req.has_password,
            password_iv,
            salt,
            burn_after_reading: req.burn_after_reading,
            views: 0,
            expires_at: expires_in.map(|e| now + e.as_secs()),
            created_at: now,
        };

        for attempt in 1..=MAX_SHORT_ID_ATTEMPTS {
            let (short_id, id) = {
                let mut rng = self
                    .rng
                    .lock()
                    .map_err(|_| PasteError::Storage(anyhow::anyhow!("id rng lock poisoned")))?;
                (generate_short_id(&mut **rng), generate_paste_id(&mut **rng))
            };
            // The lookup is an optimisation; insert is the real uniqueness guard.
            if self.store.id_for_short_id(&short_id)?.is_some() {
                debug!(attempt, "short id collision on lookup");
                continue;
            }

            record.id = id;
            record.short_id = short_id;
            match self.store.insert(&record) {
                Ok(()) => {
                    info!(
                        id = %record.id,
                        short_id = %record.short_id,
                        burn_after_reading = record.burn_after_reading,
                        has_password = record.has_password,
                        expires_at = ?record.expires_at,
                        "audit: paste.create"
                    );
                    return Ok(Created {
                        id: record.id,
                        short_id: record.short_id,
                    });
                }
                Err(StoreError::DuplicateKey) => {
                    debug!(attempt, "short id collision on insert");
                }
                Err(e) => return Err(e.into()),
            }
        }

        warn!(
            attempts = MAX_SHORT_ID_ATTEMPTS,
            "short id space exhausted; check the store and the randomness source"
        );
        Err(PasteError::IdentifierExhausted)
    }

    /// Map a short id to its paste id. Does not count as a read.
    pub fn resolve_short_id(&self, short_id: &str) -> Result<String, PasteError> {
        self.store
            .id_for_short_id(short_id)?
            .ok_or(PasteError::NotFound)
    }

    /// Return a paste's ciphertext and apply its read effect.
    ///
    /// Burn-after-reading pastes are deleted by the same store operation that
    /// hands back their content, so at most one caller ever sees it.
    pub fn retrieve(&self, id: &str) -> Result<PasteBody, PasteError> {
        match self.store.consume(id, self.clock.now())? {
            Consumed::Missing => Err(PasteError::NotFound),
            Consumed::Expired => {
                match self.store.delete_by_id(id) {
                    Ok(()) | Err(StoreError::NotFound) => {}
                    Err(e) => warn!(id = %id, error = %e, "failed to delete expired paste"),
                }
                info!(id = %id, "audit: paste.expired");
                Err(PasteError::Expired)
            }
            Consumed::Burned(record) => {
                info!(id = %id, "audit: paste.burn");
                Ok(record.into())
            }
            Consumed::Viewed(record) => {
                debug!(id = %id, views = record.views + 1, "audit: paste.read");
                Ok(record.into())
            }
        }
    }

    /// Delete every expired paste now. Returns how many were removed.
    pub fn prune(&self) -> Result<usize, PasteError> {
        let removed = self.store.prune_expired(self.clock.now())?;
        Ok(removed.len())
    }

    /// Spawn a background Tokio task that calls `prune()` every `interval`.
    pub fn spawn_sweep(self, interval: Duration) {
        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.tick().await; // skip first immediate tick
            loop {
                ticker.tick().await;
                if let Err(e) = self.prune() {
                    warn!(error = %e, "background sweep error");
                }
            }
        });
    }
}
