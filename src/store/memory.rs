//! In-memory store for tests and storage-less dev mode.
//!
//! A single mutex guards all state, which makes every trait method an atomic
//! read-modify-write for free. Not intended for production use.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    Account, AccountStore, ConsumeOutcome, InsertOutcome, NewAccount, Role, SessionRecord,
};
use crate::assets::StoredAsset;

#[derive(Clone)]
struct ResetRow {
    token_digest: Vec<u8>,
    expires_at: DateTime<Utc>,
}

#[derive(Clone)]
struct AccountRow {
    account: Account,
    reset: Option<ResetRow>,
}

#[derive(Default)]
struct Inner {
    accounts: HashMap<Uuid, AccountRow>,
    email_index: HashMap<String, Uuid>,
    sessions: HashMap<Vec<u8>, (Uuid, DateTime<Utc>)>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn insert(&self, account: NewAccount) -> Result<InsertOutcome> {
        let mut inner = self.inner.lock().await;
        if inner.email_index.contains_key(&account.email) {
            return Ok(InsertOutcome::Conflict);
        }
        let id = Uuid::new_v4();
        let stored = Account {
            id,
            name: account.name,
            email: account.email.clone(),
            secret_digest: account.secret_digest,
            role: Role::Standard,
            avatar: account.avatar,
            created_at: Utc::now(),
        };
        inner.email_index.insert(account.email, id);
        inner.accounts.insert(
            id,
            AccountRow {
                account: stored.clone(),
                reset: None,
            },
        );
        Ok(InsertOutcome::Created(stored))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>> {
        let inner = self.inner.lock().await;
        let id = inner.email_index.get(email);
        Ok(id.and_then(|id| inner.accounts.get(id).map(|row| row.account.clone())))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>> {
        let inner = self.inner.lock().await;
        Ok(inner.accounts.get(&id).map(|row| row.account.clone()))
    }

    async fn list(&self) -> Result<Vec<Account>> {
        let inner = self.inner.lock().await;
        let mut accounts: Vec<Account> =
            inner.accounts.values().map(|row| row.account.clone()).collect();
        accounts.sort_by_key(|account| account.created_at);
        Ok(accounts)
    }

    async fn update_profile(
        &self,
        id: Uuid,
        name: &str,
        avatar: Option<StoredAsset>,
    ) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        let Some(row) = inner.accounts.get_mut(&id) else {
            return Ok(false);
        };
        row.account.name = name.to_string();
        if let Some(avatar) = avatar {
            row.account.avatar = Some(avatar);
        }
        Ok(true)
    }

    async fn set_role(&self, id: Uuid, role: Role) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        let Some(row) = inner.accounts.get_mut(&id) else {
            return Ok(false);
        };
        row.account.role = role;
        Ok(true)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        let Some(row) = inner.accounts.remove(&id) else {
            return Ok(false);
        };
        inner.email_index.remove(&row.account.email);
        inner.sessions.retain(|_, (account_id, _)| *account_id != id);
        Ok(true)
    }

    async fn set_secret_digest(&self, id: Uuid, digest: &str) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        let Some(row) = inner.accounts.get_mut(&id) else {
            return Ok(false);
        };
        row.account.secret_digest = digest.to_string();
        Ok(true)
    }

    async fn put_reset_token(
        &self,
        id: Uuid,
        token_digest: &[u8],
        expires_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        let Some(row) = inner.accounts.get_mut(&id) else {
            return Ok(false);
        };
        // Overwrite: any prior token digest becomes unreachable.
        row.reset = Some(ResetRow {
            token_digest: token_digest.to_vec(),
            expires_at,
        });
        Ok(true)
    }

    async fn clear_reset_token(&self, id: Uuid) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if let Some(row) = inner.accounts.get_mut(&id) {
            row.reset = None;
        }
        Ok(())
    }

    async fn find_by_reset_digest(
        &self,
        token_digest: &[u8],
    ) -> Result<Option<(Account, DateTime<Utc>)>> {
        let inner = self.inner.lock().await;
        for row in inner.accounts.values() {
            if let Some(reset) = &row.reset {
                if reset.token_digest == token_digest {
                    return Ok(Some((row.account.clone(), reset.expires_at)));
                }
            }
        }
        Ok(None)
    }

    async fn consume_reset_token(
        &self,
        token_digest: &[u8],
        new_secret_digest: &str,
        now: DateTime<Utc>,
    ) -> Result<ConsumeOutcome> {
        let mut inner = self.inner.lock().await;
        let mut matched: Option<(Uuid, DateTime<Utc>)> = None;
        for row in inner.accounts.values() {
            if let Some(reset) = &row.reset {
                if reset.token_digest == token_digest {
                    matched = Some((row.account.id, reset.expires_at));
                    break;
                }
            }
        }
        let Some((id, expires_at)) = matched else {
            return Ok(ConsumeOutcome::NotFound);
        };
        if expires_at <= now {
            return Ok(ConsumeOutcome::Expired);
        }
        let Some(row) = inner.accounts.get_mut(&id) else {
            return Ok(ConsumeOutcome::NotFound);
        };
        row.account.secret_digest = new_secret_digest.to_string();
        row.reset = None;
        Ok(ConsumeOutcome::Consumed(row.account.clone()))
    }

    async fn insert_session(
        &self,
        account_id: Uuid,
        session_digest: &[u8],
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner
            .sessions
            .insert(session_digest.to_vec(), (account_id, expires_at));
        Ok(())
    }

    async fn lookup_session(&self, session_digest: &[u8]) -> Result<Option<SessionRecord>> {
        let inner = self.inner.lock().await;
        let Some((account_id, expires_at)) = inner.sessions.get(session_digest) else {
            return Ok(None);
        };
        let Some(row) = inner.accounts.get(account_id) else {
            return Ok(None);
        };
        Ok(Some(SessionRecord {
            account: row.account.clone(),
            expires_at: *expires_at,
        }))
    }

    async fn delete_session(&self, session_digest: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.sessions.remove(session_digest);
        Ok(())
    }
}
