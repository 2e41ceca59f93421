//! Password-reset token lifecycle.
//!
//! Per account the token moves through `NoToken -> Live -> {Consumed,
//! Expired}`. Issuing overwrites any prior token (at most one live token per
//! account), validation never consumes, and consumption happens as a single
//! atomic store operation together with the secret update. The compensating
//! rollback after a failed delivery is [`ResetTokenLifecycle::revoke`].

use anyhow::Result;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use super::token;
use crate::store::{Account, AccountStore, ConsumeOutcome};

const DEFAULT_RESET_TTL_SECONDS: i64 = 60 * 60;

#[derive(Clone, Copy, Debug)]
pub struct ResetConfig {
    ttl_seconds: i64,
}

impl ResetConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            ttl_seconds: DEFAULT_RESET_TTL_SECONDS,
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

impl Default for ResetConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of checking a submitted reset token without consuming it.
#[derive(Debug)]
pub enum ResetValidation {
    Live(Account),
    Expired,
    NotFound,
}

/// Result of consuming a reset token while applying the new secret digest.
#[derive(Debug)]
pub enum ResetCompletion {
    Completed(Account),
    Expired,
    NotFound,
}

pub struct ResetTokenLifecycle {
    store: Arc<dyn AccountStore>,
    ttl: Duration,
}

impl ResetTokenLifecycle {
    #[must_use]
    pub fn new(store: Arc<dyn AccountStore>, config: &ResetConfig) -> Self {
        Self {
            store,
            ttl: Duration::seconds(config.ttl_seconds()),
        }
    }

    /// Issue a fresh token for the account, invalidating any prior one.
    ///
    /// Returns the plaintext for out-of-band delivery, or `None` when the
    /// account no longer exists. The plaintext is never stored.
    ///
    /// # Errors
    /// Returns an error if token generation or the store fails.
    pub async fn issue(&self, account_id: Uuid) -> Result<Option<String>> {
        let minted = token::mint()?;
        let expires_at = Utc::now() + self.ttl;
        let stored = self
            .store
            .put_reset_token(account_id, &minted.digest, expires_at)
            .await?;
        if stored {
            Ok(Some(minted.plaintext))
        } else {
            Ok(None)
        }
    }

    /// Roll the account back to the no-token state.
    ///
    /// Required compensating action when the notifier fails after `issue`: a
    /// token nobody received must not stay guessable in the store.
    ///
    /// # Errors
    /// Returns an error if the store fails.
    pub async fn revoke(&self, account_id: Uuid) -> Result<()> {
        self.store.clear_reset_token(account_id).await
    }

    /// Check a submitted token. Does not consume it.
    ///
    /// # Errors
    /// Returns an error if the store fails.
    pub async fn validate(&self, plaintext: &str) -> Result<ResetValidation> {
        let digest = token::digest(plaintext);
        let Some((account, expires_at)) = self.store.find_by_reset_digest(&digest).await? else {
            return Ok(ResetValidation::NotFound);
        };
        if expires_at <= Utc::now() {
            // Logged distinctly from not-found; callers merge both into one
            // generic user-facing failure.
            debug!(account_id = %account.id, "reset token digest matched but expired");
            return Ok(ResetValidation::Expired);
        }
        Ok(ResetValidation::Live(account))
    }

    /// Consume the token and install the new secret digest atomically.
    ///
    /// The store clears the token fields in the same operation that updates
    /// the digest, so a token can never survive a successful reset and a
    /// second concurrent complete observes not-found.
    ///
    /// # Errors
    /// Returns an error if the store fails.
    pub async fn complete(
        &self,
        plaintext: &str,
        new_secret_digest: &str,
    ) -> Result<ResetCompletion> {
        let digest = token::digest(plaintext);
        let outcome = self
            .store
            .consume_reset_token(&digest, new_secret_digest, Utc::now())
            .await?;
        Ok(match outcome {
            ConsumeOutcome::Consumed(account) => ResetCompletion::Completed(account),
            ConsumeOutcome::Expired => {
                debug!("reset completion hit an expired token");
                ResetCompletion::Expired
            }
            ConsumeOutcome::NotFound => ResetCompletion::NotFound,
        })
    }
}
