use rand::Rng;

/// Alphabet for public short ids.
pub const SHORT_ID_ALPHABET: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Length of every short id.
pub const SHORT_ID_LEN: usize = 7;

/// How many candidates creation may burn through before giving up.
pub const MAX_SHORT_ID_ATTEMPTS: usize = 10;

/// Generate a short id: 7 characters, each drawn uniformly from `SHORT_ID_ALPHABET`.
///
/// Not a secret. Confidentiality of a paste lives in the client-held key.
pub fn generate_short_id<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..SHORT_ID_LEN)
        .map(|_| SHORT_ID_ALPHABET[rng.gen_range(0..SHORT_ID_ALPHABET.len())] as char)
        .collect()
}

/// Generate an internal paste id: 128 random bits, 32 hex chars.
pub fn generate_paste_id<R: Rng + ?Sized>(rng: &mut R) -> String {
    let bytes: [u8; 16] = rng.gen();
    hex::encode(bytes)
}
