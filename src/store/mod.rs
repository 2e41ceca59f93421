//! Account record store seam.
//!
//! The store is the single source of truth and owns every atomic
//! read-modify-write the core relies on: email uniqueness at insert, the
//! overwrite semantics of reset-token issuance, and the single-winner
//! consume of a reset token. Application code never does check-then-act
//! against this trait.
//!
//! Two implementations ship: [`memory::MemoryStore`] (tests, dev mode) and
//! [`postgres::PgStore`] (production, schema in `sql/schema.sql`).

pub mod memory;
pub mod postgres;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::assets::StoredAsset;

/// Account role. Role changes go through an authorization-checked admin
/// route; nothing in the credential core mutates it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Standard,
    Admin,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Admin => "admin",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "standard" => Some(Self::Standard),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

/// A stored account. `email` is already normalized (trimmed, lowercased) and
/// unique across the store; `secret_digest` is an Argon2id PHC string, never
/// the plaintext.
#[derive(Clone, Debug)]
pub struct Account {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub secret_digest: String,
    pub role: Role,
    pub avatar: Option<StoredAsset>,
    pub created_at: DateTime<Utc>,
}

/// Fields required to create an account. The id and timestamps are assigned
/// by the store.
#[derive(Clone, Debug)]
pub struct NewAccount {
    pub name: String,
    pub email: String,
    pub secret_digest: String,
    pub avatar: Option<StoredAsset>,
}

/// Outcome of an insert attempt (uniqueness is enforced by the store, so a
/// duplicate email is an outcome, not an error).
#[derive(Debug)]
pub enum InsertOutcome {
    Created(Account),
    Conflict,
}

/// Outcome of the atomic reset-token consume.
#[derive(Debug)]
pub enum ConsumeOutcome {
    /// Token matched and was live; the new digest is in place and the token
    /// fields are cleared. Carries the updated account.
    Consumed(Account),
    /// Digest matched but the expiry had passed.
    Expired,
    /// No record carries this digest (never issued, already consumed, or
    /// overwritten by a newer token).
    NotFound,
}

/// An active or expired session row joined with its account.
#[derive(Clone, Debug)]
pub struct SessionRecord {
    pub account: Account,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Cheap liveness probe for the health endpoint.
    async fn ping(&self) -> Result<()>;

    /// Insert a new account. Must enforce email uniqueness atomically; two
    /// concurrent inserts with the same email yield exactly one `Created`.
    async fn insert(&self, account: NewAccount) -> Result<InsertOutcome>;

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>>;

    async fn list(&self) -> Result<Vec<Account>>;

    /// Update name/avatar. Returns `false` if the account does not exist.
    async fn update_profile(
        &self,
        id: Uuid,
        name: &str,
        avatar: Option<StoredAsset>,
    ) -> Result<bool>;

    async fn set_role(&self, id: Uuid, role: Role) -> Result<bool>;

    async fn delete(&self, id: Uuid) -> Result<bool>;

    /// Replace the secret digest (password change).
    async fn set_secret_digest(&self, id: Uuid, digest: &str) -> Result<bool>;

    /// Store a reset-token digest and expiry on the account, overwriting any
    /// prior token. The old token becomes unreachable. Returns `false` if the
    /// account does not exist.
    async fn put_reset_token(
        &self,
        id: Uuid,
        token_digest: &[u8],
        expires_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Clear reset-token fields (rollback after a failed delivery, or cleanup).
    async fn clear_reset_token(&self, id: Uuid) -> Result<()>;

    /// Find the account holding this token digest, live or expired, together
    /// with the stored expiry.
    async fn find_by_reset_digest(
        &self,
        token_digest: &[u8],
    ) -> Result<Option<(Account, DateTime<Utc>)>>;

    /// Atomically: if a record holds this digest with expiry after `now`, set
    /// the new secret digest and clear the token fields in one step. Under
    /// concurrent calls exactly one caller observes `Consumed`.
    async fn consume_reset_token(
        &self,
        token_digest: &[u8],
        new_secret_digest: &str,
        now: DateTime<Utc>,
    ) -> Result<ConsumeOutcome>;

    /// Store a session digest. Digests are unique; a collision is an error
    /// the caller retries with a fresh token.
    async fn insert_session(
        &self,
        account_id: Uuid,
        session_digest: &[u8],
        expires_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Look up a session by digest, expired or not. Expiry classification is
    /// the session issuer's job.
    async fn lookup_session(&self, session_digest: &[u8]) -> Result<Option<SessionRecord>>;

    /// Delete a session. Idempotent; deleting a missing session is fine.
    async fn delete_session(&self, session_digest: &[u8]) -> Result<()>;
}
