//! Random opaque tokens and their storable digests.
//!
//! Reset and session tokens are 256-bit random values rendered as URL-safe
//! base64. The raw value is handed out exactly once (reset link or cookie);
//! the database only ever sees the SHA-256 digest, which doubles as the O(1)
//! lookup key. A fast hash is fine here: unlike passwords these values are
//! already high-entropy, so there is nothing for an offline attacker to grind.

use anyhow::{Context, Result};
use base64::Engine;
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};

const TOKEN_BYTES: usize = 32;

/// A freshly minted token: the raw value for the caller, the digest for storage.
pub struct MintedToken {
    pub plaintext: String,
    pub digest: Vec<u8>,
}

/// Mint a new random token.
pub fn mint() -> Result<MintedToken> {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate token")?;
    let plaintext = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes);
    let digest = digest(&plaintext);
    Ok(MintedToken { plaintext, digest })
}

/// Recompute the storable digest of a raw token value.
pub fn digest(plaintext: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(plaintext.as_bytes());
    hasher.finalize().to_vec()
}

/// Check a raw token against a stored digest.
pub fn matches(plaintext: &str, stored: &[u8]) -> bool {
    digest(plaintext) == stored
}
