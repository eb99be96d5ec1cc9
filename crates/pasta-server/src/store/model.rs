use serde::{Deserialize, Serialize};

/// Stored as bincode-encoded bytes.
/// `encrypted_content`, `iv`, `password_iv` and `salt` are opaque client-side
/// ciphertext material; the server never decodes them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasteRecord {
    pub id: String,
    pub short_id: String,
    pub encrypted_content: String,
    pub iv: String,
    pub has_password: bool,
    pub password_iv: Option<String>,
    pub salt: Option<String>,
    pub burn_after_reading: bool,
    /// Non-destructive reads so far.
    pub views: u64,
    /// Unix seconds. `None` means the paste never expires.
    pub expires_at: Option<i64>,
    pub created_at: i64,
}

impl PasteRecord {
    /// Expired once `now` reaches `expires_at`.
    pub fn is_expired(&self, now: i64) -> bool {
        matches!(self.expires_at, Some(exp) if now >= exp)
    }

    /// True when the next read of this record must also destroy it.
    pub fn is_first_burn_read(&self) -> bool {
        self.burn_after_reading && self.views == 0
    }
}

/// Outcome of a single atomic read against the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Consumed {
    /// No record under that id.
    Missing,
    /// Record exists but is past `expires_at`. Nothing was mutated.
    Expired,
    /// First read of a burn-after-reading record; the record is gone.
    Burned(PasteRecord),
    /// Ordinary read; `views` was incremented. Carries the record as read.
    Viewed(PasteRecord),
}
