//! Server-side session issuance and verification.
//!
//! Sessions are opaque references into a session table (not self-verifying
//! tokens): revocation is an immediate delete, at the cost of a store lookup
//! per verification. The raw token goes to the caller once; the store keeps
//! only its digest. Multiple concurrent sessions per account are allowed.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use super::token;
use crate::store::{Account, AccountStore};

const DEFAULT_SESSION_TTL_SECONDS: i64 = 12 * 60 * 60;
const INSERT_RETRIES: usize = 3;

#[derive(Clone, Copy, Debug)]
pub struct SessionConfig {
    ttl_seconds: i64,
}

impl SessionConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_ttl_seconds(mut self, seconds: i64) -> Self {
        self.ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn ttl_seconds(&self) -> i64 {
        self.ttl_seconds
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// A freshly issued session: raw token for the transport layer (cookie or
/// bearer header) plus its expiry.
#[derive(Clone, Debug)]
pub struct IssuedSession {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug)]
pub enum SessionVerification {
    Active(Account),
    Expired,
    Invalid,
}

pub struct SessionIssuer {
    store: Arc<dyn AccountStore>,
    ttl: Duration,
}

impl SessionIssuer {
    #[must_use]
    pub fn new(store: Arc<dyn AccountStore>, config: &SessionConfig) -> Self {
        Self {
            store,
            ttl: Duration::seconds(config.ttl_seconds()),
        }
    }

    /// Mint a session token for the account and store its digest.
    ///
    /// # Errors
    /// Returns an error if no unique token could be stored.
    pub async fn issue(&self, account_id: Uuid) -> Result<IssuedSession> {
        let expires_at = Utc::now() + self.ttl;
        // Digest collisions are vanishingly rare but the store treats the
        // digest as a key, so retry with a fresh token rather than fail.
        let mut last_err = None;
        for _ in 0..INSERT_RETRIES {
            let minted = token::mint()?;
            match self
                .store
                .insert_session(account_id, &minted.digest, expires_at)
                .await
            {
                Ok(()) => {
                    return Ok(IssuedSession {
                        token: minted.plaintext,
                        expires_at,
                    })
                }
                Err(err) => last_err = Some(err),
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow!("failed to store a unique session token")))
    }

    /// Resolve a raw session token to its account.
    ///
    /// Expired sessions are deleted on sight and reported as `Expired`;
    /// unknown digests are `Invalid`.
    ///
    /// # Errors
    /// Returns an error if the store fails.
    pub async fn verify(&self, raw_token: &str) -> Result<SessionVerification> {
        let digest = token::digest(raw_token);
        let Some(record) = self.store.lookup_session(&digest).await? else {
            return Ok(SessionVerification::Invalid);
        };
        if record.expires_at <= Utc::now() {
            self.store.delete_session(&digest).await?;
            return Ok(SessionVerification::Expired);
        }
        Ok(SessionVerification::Active(record.account))
    }

    /// Revoke a session immediately. Idempotent.
    ///
    /// # Errors
    /// Returns an error if the store fails.
    pub async fn revoke(&self, raw_token: &str) -> Result<()> {
        let digest = token::digest(raw_token);
        self.store.delete_session(&digest).await
    }
}
