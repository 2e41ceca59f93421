//! Postgres-backed account store.
//!
//! Uniqueness and reset-token consumption lean on the database: a unique
//! index on `email` turns duplicate registrations into a `23505` outcome, and
//! `consume_reset_token` is a single conditional `UPDATE`, so concurrent
//! completes leave exactly one winner. Schema lives in `sql/schema.sql`.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::{
    Account, AccountStore, ConsumeOutcome, InsertOutcome, NewAccount, Role, SessionRecord,
};
use crate::assets::StoredAsset;

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

const ACCOUNT_COLUMNS: &str = "id, name, email, secret_digest, role, \
     avatar_asset_id, avatar_url, created_at";

fn account_from_row(row: &PgRow) -> Result<Account> {
    let role: String = row.get("role");
    let role = Role::parse(&role).ok_or_else(|| anyhow!("unknown role in store: {role}"))?;
    let avatar_asset_id: Option<String> = row.get("avatar_asset_id");
    let avatar_url: Option<String> = row.get("avatar_url");
    let avatar = match (avatar_asset_id, avatar_url) {
        (Some(asset_id), Some(url)) => Some(StoredAsset { asset_id, url }),
        _ => None,
    };
    Ok(Account {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        secret_digest: row.get("secret_digest"),
        role,
        avatar,
        created_at: row.get("created_at"),
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

#[async_trait]
impl AccountStore for PgStore {
    async fn ping(&self) -> Result<()> {
        let span = tracing::info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("Failed to ping database")?;
        Ok(())
    }

    async fn insert(&self, account: NewAccount) -> Result<InsertOutcome> {
        let query = format!(
            "INSERT INTO accounts (name, email, secret_digest, avatar_asset_id, avatar_url) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {ACCOUNT_COLUMNS}"
        );
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = %query
        );
        let (avatar_asset_id, avatar_url) = match &account.avatar {
            Some(avatar) => (Some(avatar.asset_id.clone()), Some(avatar.url.clone())),
            None => (None, None),
        };
        let row = sqlx::query(&query)
            .bind(&account.name)
            .bind(&account.email)
            .bind(&account.secret_digest)
            .bind(avatar_asset_id)
            .bind(avatar_url)
            .fetch_one(&self.pool)
            .instrument(span)
            .await;

        match row {
            Ok(row) => Ok(InsertOutcome::Created(account_from_row(&row)?)),
            Err(err) if is_unique_violation(&err) => Ok(InsertOutcome::Conflict),
            Err(err) => Err(err).context("failed to insert account"),
        }
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE email = $1");
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = %query
        );
        let row = sqlx::query(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup account by email")?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1");
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = %query
        );
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup account by id")?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn list(&self) -> Result<Vec<Account>> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY created_at ASC");
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = %query
        );
        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to list accounts")?;
        rows.iter().map(account_from_row).collect()
    }

    async fn update_profile(
        &self,
        id: Uuid,
        name: &str,
        avatar: Option<StoredAsset>,
    ) -> Result<bool> {
        let query = r"
            UPDATE accounts
            SET name = $2,
                avatar_asset_id = COALESCE($3, avatar_asset_id),
                avatar_url = COALESCE($4, avatar_url),
                updated_at = NOW()
            WHERE id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let (avatar_asset_id, avatar_url) = match &avatar {
            Some(avatar) => (Some(avatar.asset_id.clone()), Some(avatar.url.clone())),
            None => (None, None),
        };
        let result = sqlx::query(query)
            .bind(id)
            .bind(name)
            .bind(avatar_asset_id)
            .bind(avatar_url)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to update profile")?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_role(&self, id: Uuid, role: Role) -> Result<bool> {
        let query = "UPDATE accounts SET role = $2, updated_at = NOW() WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(id)
            .bind(role.as_str())
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to update role")?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        // Sessions go with the account via ON DELETE CASCADE.
        let query = "DELETE FROM accounts WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to delete account")?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_secret_digest(&self, id: Uuid, digest: &str) -> Result<bool> {
        let query = "UPDATE accounts SET secret_digest = $2, updated_at = NOW() WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(id)
            .bind(digest)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to update secret digest")?;
        Ok(result.rows_affected() > 0)
    }

    async fn put_reset_token(
        &self,
        id: Uuid,
        token_digest: &[u8],
        expires_at: DateTime<Utc>,
    ) -> Result<bool> {
        // Plain overwrite: issuing a new token invalidates the old one.
        let query = r"
            UPDATE accounts
            SET reset_token_hash = $2,
                reset_token_expires_at = $3,
                updated_at = NOW()
            WHERE id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(id)
            .bind(token_digest)
            .bind(expires_at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to store reset token")?;
        Ok(result.rows_affected() > 0)
    }

    async fn clear_reset_token(&self, id: Uuid) -> Result<()> {
        let query = r"
            UPDATE accounts
            SET reset_token_hash = NULL,
                reset_token_expires_at = NULL,
                updated_at = NOW()
            WHERE id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to clear reset token")?;
        Ok(())
    }

    async fn find_by_reset_digest(
        &self,
        token_digest: &[u8],
    ) -> Result<Option<(Account, DateTime<Utc>)>> {
        let query = format!(
            "SELECT {ACCOUNT_COLUMNS}, reset_token_expires_at \
             FROM accounts WHERE reset_token_hash = $1"
        );
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = %query
        );
        let row = sqlx::query(&query)
            .bind(token_digest)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup reset token")?;
        let Some(row) = row else {
            return Ok(None);
        };
        let expires_at: DateTime<Utc> = row.get("reset_token_expires_at");
        Ok(Some((account_from_row(&row)?, expires_at)))
    }

    async fn consume_reset_token(
        &self,
        token_digest: &[u8],
        new_secret_digest: &str,
        now: DateTime<Utc>,
    ) -> Result<ConsumeOutcome> {
        // One conditional UPDATE: the digest must match AND still be live.
        // Concurrent completes race on this row; the loser matches nothing.
        let query = format!(
            "UPDATE accounts \
             SET secret_digest = $2, \
                 reset_token_hash = NULL, \
                 reset_token_expires_at = NULL, \
                 updated_at = NOW() \
             WHERE reset_token_hash = $1 \
               AND reset_token_expires_at > $3 \
             RETURNING {ACCOUNT_COLUMNS}"
        );
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = %query
        );
        let row = sqlx::query(&query)
            .bind(token_digest)
            .bind(new_secret_digest)
            .bind(now)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to consume reset token")?;

        if let Some(row) = row {
            return Ok(ConsumeOutcome::Consumed(account_from_row(&row)?));
        }

        // Distinguish a stale-but-present digest from a missing one for
        // diagnostics; both map to the same user-facing failure.
        let query = "SELECT 1 FROM accounts WHERE reset_token_hash = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(token_digest)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to classify reset token")?;
        if row.is_some() {
            Ok(ConsumeOutcome::Expired)
        } else {
            Ok(ConsumeOutcome::NotFound)
        }
    }

    async fn insert_session(
        &self,
        account_id: Uuid,
        session_digest: &[u8],
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let query = r"
            INSERT INTO account_sessions (account_id, session_hash, expires_at)
            VALUES ($1, $2, $3)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(account_id)
            .bind(session_digest)
            .bind(expires_at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to insert session")?;
        Ok(())
    }

    async fn lookup_session(&self, session_digest: &[u8]) -> Result<Option<SessionRecord>> {
        // Qualified columns: both tables carry a created_at.
        let query = format!(
            "SELECT {columns}, account_sessions.expires_at AS session_expires_at \
             FROM account_sessions \
             JOIN accounts ON accounts.id = account_sessions.account_id \
             WHERE account_sessions.session_hash = $1",
            columns = "accounts.id, accounts.name, accounts.email, accounts.secret_digest, \
                       accounts.role, accounts.avatar_asset_id, accounts.avatar_url, \
                       accounts.created_at"
        );
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = %query
        );
        let row = sqlx::query(&query)
            .bind(session_digest)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup session")?;
        let Some(row) = row else {
            return Ok(None);
        };
        let expires_at: DateTime<Utc> = row.get("session_expires_at");
        Ok(Some(SessionRecord {
            account: account_from_row(&row)?,
            expires_at,
        }))
    }

    async fn delete_session(&self, session_digest: &[u8]) -> Result<()> {
        // Logout is idempotent; it's fine if no rows are deleted.
        let query = "DELETE FROM account_sessions WHERE session_hash = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(session_digest)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to delete session")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::is_unique_violation;
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::borrow::Cow;
    use std::error::Error as StdError;
    use std::fmt;

    #[derive(Debug)]
    struct TestDbError {
        code: Option<&'static str>,
    }

    impl fmt::Display for TestDbError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "test database error")
        }
    }

    impl StdError for TestDbError {}

    impl DatabaseError for TestDbError {
        fn message(&self) -> &'static str {
            "test database error"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            self.code.map(Cow::Borrowed)
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::UniqueViolation
        }
    }

    #[test]
    fn is_unique_violation_matches_sqlstate() {
        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("23505"),
        }));
        assert!(is_unique_violation(&err));

        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("99999"),
        }));
        assert!(!is_unique_violation(&err));

        let err = sqlx::Error::RowNotFound;
        assert!(!is_unique_violation(&err));
    }
}
