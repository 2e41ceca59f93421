//! Credential orchestration: registration, login, password change, reset.
//!
//! This is the only surface the HTTP layer talks to. Every operation takes an
//! explicit request struct, validates it as a whole before touching state,
//! and returns either a success payload or an [`AuthFailure`].

use anyhow::Context;
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    error::{AuthFailure, AuthResult},
    hasher::{HasherConfig, SecretHasher},
    reset::{ResetCompletion, ResetConfig, ResetTokenLifecycle},
    session::{IssuedSession, SessionConfig, SessionIssuer},
};
use crate::assets::BlobStore;
use crate::notify::Notifier;
use crate::store::{Account, AccountStore, InsertOutcome, NewAccount, Role};

const DEFAULT_FRONTEND_BASE_URL: &str = "http://localhost:3000";

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    hasher: HasherConfig,
    reset: ResetConfig,
    session: SessionConfig,
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            frontend_base_url: DEFAULT_FRONTEND_BASE_URL.to_string(),
            hasher: HasherConfig::new(),
            reset: ResetConfig::new(),
            session: SessionConfig::new(),
        }
    }

    #[must_use]
    pub fn with_frontend_base_url(mut self, url: String) -> Self {
        self.frontend_base_url = url;
        self
    }

    #[must_use]
    pub fn with_hasher(mut self, hasher: HasherConfig) -> Self {
        self.hasher = hasher;
        self
    }

    #[must_use]
    pub fn with_reset(mut self, reset: ResetConfig) -> Self {
        self.reset = reset;
        self
    }

    #[must_use]
    pub fn with_session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    #[must_use]
    pub fn session_ttl_seconds(&self) -> i64 {
        self.session.ttl_seconds()
    }

    /// Only mark cookies secure when the frontend is served over HTTPS.
    #[must_use]
    pub fn session_cookie_secure(&self) -> bool {
        self.frontend_base_url.starts_with("https://")
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Success payload for operations that end in a logged-in account.
#[derive(Debug)]
pub struct Authenticated {
    pub account: Account,
    pub session: IssuedSession,
}

#[derive(Debug)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub secret: SecretString,
    /// Opaque avatar payload handed to the blob store (e.g. a data URL).
    pub avatar: String,
}

#[derive(Debug)]
pub struct LoginRequest {
    pub email: String,
    pub secret: SecretString,
}

#[derive(Debug)]
pub struct ChangePasswordRequest {
    pub account_id: Uuid,
    pub current_secret: SecretString,
    pub new_secret: SecretString,
}

#[derive(Debug)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_secret: SecretString,
    pub confirm_secret: SecretString,
}

#[derive(Debug)]
pub struct UpdateProfileRequest {
    pub account_id: Uuid,
    pub name: String,
    pub avatar: Option<String>,
}

pub struct CredentialService {
    store: Arc<dyn AccountStore>,
    notifier: Arc<dyn Notifier>,
    blobs: Arc<dyn BlobStore>,
    hasher: SecretHasher,
    reset: ResetTokenLifecycle,
    sessions: SessionIssuer,
    config: AuthConfig,
}

impl CredentialService {
    /// # Errors
    /// Returns an error if the hasher rejects the configured cost parameters.
    pub fn new(
        config: AuthConfig,
        store: Arc<dyn AccountStore>,
        notifier: Arc<dyn Notifier>,
        blobs: Arc<dyn BlobStore>,
    ) -> anyhow::Result<Self> {
        let hasher = SecretHasher::new(&config.hasher)?;
        let reset = ResetTokenLifecycle::new(store.clone(), &config.reset);
        let sessions = SessionIssuer::new(store.clone(), &config.session);
        Ok(Self {
            store,
            notifier,
            blobs,
            hasher,
            reset,
            sessions,
            config,
        })
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionIssuer {
        &self.sessions
    }

    /// Liveness of the backing store, for the health endpoint.
    pub async fn store_ping(&self) -> anyhow::Result<()> {
        self.store.ping().await
    }

    /// Create an account and log it in.
    pub async fn register(&self, request: RegisterRequest) -> AuthResult<Authenticated> {
        let name = request.name.trim().to_string();
        let email = normalize_email(&request.email);
        let mut missing = Vec::new();
        if name.is_empty() {
            missing.push("name");
        }
        if email.is_empty() {
            missing.push("email");
        }
        if request.secret.expose_secret().is_empty() {
            missing.push("password");
        }
        if request.avatar.trim().is_empty() {
            missing.push("avatar");
        }
        if !missing.is_empty() {
            return Err(AuthFailure::Validation(missing));
        }
        if !valid_email(&email) {
            return Err(AuthFailure::Validation(vec!["email"]));
        }

        // The avatar is uploaded before the record exists; an insert failure
        // below orphans the blob (known gap, not compensated).
        let avatar = self
            .blobs
            .upload(request.avatar.as_bytes())
            .await
            .context("avatar upload failed")?;

        let secret_digest = self.hasher.hash(&request.secret)?;
        let outcome = self
            .store
            .insert(NewAccount {
                name,
                email,
                secret_digest,
                avatar: Some(avatar),
            })
            .await?;
        let account = match outcome {
            InsertOutcome::Created(account) => account,
            InsertOutcome::Conflict => return Err(AuthFailure::Conflict),
        };
        info!(account_id = %account.id, "account registered");

        let session = self.sessions.issue(account.id).await?;
        Ok(Authenticated { account, session })
    }

    /// Authenticate an email/password pair.
    ///
    /// Unknown email and wrong password return the same failure, and the
    /// unknown-email path still pays for a hash verification so the two are
    /// not separable by timing either.
    pub async fn login(&self, request: LoginRequest) -> AuthResult<Authenticated> {
        let email = normalize_email(&request.email);
        if email.is_empty() || request.secret.expose_secret().is_empty() {
            return Err(AuthFailure::Validation(vec!["email", "password"]));
        }

        let Some(account) = self.store.find_by_email(&email).await? else {
            self.hasher.verify_dummy(&request.secret);
            return Err(AuthFailure::InvalidCredentials);
        };
        if !self.hasher.verify(&request.secret, &account.secret_digest)? {
            return Err(AuthFailure::InvalidCredentials);
        }

        let session = self.sessions.issue(account.id).await?;
        Ok(Authenticated { account, session })
    }

    /// Revoke the caller's session. Idempotent.
    pub async fn logout(&self, raw_token: &str) -> AuthResult<()> {
        self.sessions.revoke(raw_token).await?;
        Ok(())
    }

    /// Issue a reset token and mail the reset link.
    ///
    /// If the notifier fails, the freshly issued token is rolled back before
    /// the failure is reported: a token nobody received must not linger.
    pub async fn forgot_password(&self, email: &str) -> AuthResult<()> {
        let email = normalize_email(email);
        if email.is_empty() {
            return Err(AuthFailure::Validation(vec!["email"]));
        }
        let Some(account) = self.store.find_by_email(&email).await? else {
            return Err(AuthFailure::NotFound);
        };

        let Some(plaintext) = self.reset.issue(account.id).await? else {
            return Err(AuthFailure::NotFound);
        };

        let reset_url = build_reset_url(self.config.frontend_base_url(), &plaintext);
        let body = format!(
            "Here is your password reset link:\n\n{reset_url}\n\n\
             If you did not request this email, please ignore it."
        );
        if let Err(err) = self
            .notifier
            .send(&account.email, "Password recovery", &body)
            .await
        {
            warn!(account_id = %account.id, "reset mail delivery failed, rolling token back");
            self.reset.revoke(account.id).await?;
            return Err(AuthFailure::Upstream(err));
        }
        Ok(())
    }

    /// Complete a reset: consume the token, install the new password, log in.
    pub async fn reset_password(&self, request: ResetPasswordRequest) -> AuthResult<Authenticated> {
        if request.token.trim().is_empty() {
            return Err(AuthFailure::Validation(vec!["token"]));
        }
        if request.new_secret.expose_secret().is_empty() {
            return Err(AuthFailure::Validation(vec!["password"]));
        }
        // Confirmation mismatch fails before any state is touched.
        if request.new_secret.expose_secret() != request.confirm_secret.expose_secret() {
            return Err(AuthFailure::Validation(vec!["confirm_password"]));
        }

        let new_digest = self.hasher.hash(&request.new_secret)?;
        let account = match self.reset.complete(request.token.trim(), &new_digest).await? {
            ResetCompletion::Completed(account) => account,
            // Merged for the caller; the lifecycle logs which one it was.
            ResetCompletion::Expired | ResetCompletion::NotFound => {
                return Err(AuthFailure::TokenInvalid)
            }
        };
        info!(account_id = %account.id, "password reset completed");

        let session = self.sessions.issue(account.id).await?;
        Ok(Authenticated { account, session })
    }

    /// Change the password of an authenticated account.
    ///
    /// New/confirm equality is the caller's precondition and is not
    /// re-checked here.
    pub async fn change_password(
        &self,
        request: ChangePasswordRequest,
    ) -> AuthResult<Authenticated> {
        if request.new_secret.expose_secret().is_empty() {
            return Err(AuthFailure::Validation(vec!["password"]));
        }
        let Some(account) = self.store.find_by_id(request.account_id).await? else {
            return Err(AuthFailure::NotFound);
        };
        if !self
            .hasher
            .verify(&request.current_secret, &account.secret_digest)?
        {
            return Err(AuthFailure::InvalidCredentials);
        }

        let digest = self.hasher.hash(&request.new_secret)?;
        if !self.store.set_secret_digest(account.id, &digest).await? {
            return Err(AuthFailure::NotFound);
        }

        let session = self.sessions.issue(account.id).await?;
        Ok(Authenticated { account, session })
    }

    /// Current account details.
    pub async fn get_account(&self, id: Uuid) -> AuthResult<Account> {
        match self.store.find_by_id(id).await? {
            Some(account) => Ok(account),
            None => Err(AuthFailure::NotFound),
        }
    }

    /// Update name/avatar. Replacing the avatar deletes the old blob first.
    pub async fn update_profile(&self, request: UpdateProfileRequest) -> AuthResult<Account> {
        let name = request.name.trim().to_string();
        if name.is_empty() {
            return Err(AuthFailure::Validation(vec!["name"]));
        }
        let Some(account) = self.store.find_by_id(request.account_id).await? else {
            return Err(AuthFailure::NotFound);
        };

        let mut new_avatar = None;
        if let Some(payload) = &request.avatar {
            if payload.trim().is_empty() {
                return Err(AuthFailure::Validation(vec!["avatar"]));
            }
            if let Some(old) = &account.avatar {
                self.blobs
                    .delete(&old.asset_id)
                    .await
                    .context("old avatar delete failed")?;
            }
            let uploaded = self
                .blobs
                .upload(payload.as_bytes())
                .await
                .context("avatar upload failed")?;
            new_avatar = Some(uploaded);
        }

        if !self
            .store
            .update_profile(account.id, &name, new_avatar)
            .await?
        {
            return Err(AuthFailure::NotFound);
        }
        self.get_account(account.id).await
    }

    /// Admin: all accounts.
    pub async fn list_accounts(&self) -> AuthResult<Vec<Account>> {
        Ok(self.store.list().await?)
    }

    /// Admin: change an account's role.
    pub async fn update_role(&self, id: Uuid, role: Role) -> AuthResult<Account> {
        if !self.store.set_role(id, role).await? {
            return Err(AuthFailure::NotFound);
        }
        self.get_account(id).await
    }

    /// Admin: delete an account and its sessions.
    pub async fn delete_account(&self, id: Uuid) -> AuthResult<()> {
        if !self.store.delete(id).await? {
            return Err(AuthFailure::NotFound);
        }
        info!(account_id = %id, "account deleted");
        Ok(())
    }
}

/// Normalize an email for lookup/uniqueness checks.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
pub fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

/// Build the frontend reset link included in outbound emails.
fn build_reset_url(frontend_base_url: &str, token: &str) -> String {
    let base = frontend_base_url.trim_end_matches('/');
    format!("{base}/password/reset/{token}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::NullBlobStore;
    use crate::notify::testing::{FailingNotifier, RecordingNotifier};
    use crate::notify::Notifier;

    fn test_config() -> AuthConfig {
        AuthConfig::new()
            .with_frontend_base_url("https://accounts.example".to_string())
            .with_hasher(HasherConfig::fast_insecure())
    }

    fn service_with(notifier: Arc<dyn Notifier>) -> CredentialService {
        let store = Arc::new(crate::store::memory::MemoryStore::new());
        CredentialService::new(
            test_config(),
            store,
            notifier,
            Arc::new(NullBlobStore::default()),
        )
        .expect("build service")
    }

    fn secret(value: &str) -> SecretString {
        SecretString::from(value.to_string())
    }

    fn register_request(email: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            name: "Alice".to_string(),
            email: email.to_string(),
            secret: secret(password),
            avatar: "data:image/png;base64,AAAA".to_string(),
        }
    }

    #[tokio::test]
    async fn register_then_login_round_trips() {
        let service = service_with(Arc::new(RecordingNotifier::default()));
        let registered = service
            .register(register_request("a@x.com", "secretA"))
            .await
            .expect("register");
        assert_eq!(registered.account.email, "a@x.com");
        assert_eq!(registered.account.role, Role::Standard);
        assert!(registered.account.avatar.is_some());

        let logged_in = service
            .login(LoginRequest {
                email: "A@X.com ".to_string(),
                secret: secret("secretA"),
            })
            .await
            .expect("login");
        assert_eq!(logged_in.account.id, registered.account.id);
    }

    #[tokio::test]
    async fn duplicate_email_registration_conflicts() {
        let service = service_with(Arc::new(RecordingNotifier::default()));
        service
            .register(register_request("a@x.com", "secretA"))
            .await
            .expect("register");
        let second = service
            .register(register_request("A@x.com", "secretB"))
            .await;
        assert!(matches!(second, Err(AuthFailure::Conflict)));
    }

    #[tokio::test]
    async fn missing_fields_are_rejected_as_a_whole() {
        let service = service_with(Arc::new(RecordingNotifier::default()));
        let result = service
            .register(RegisterRequest {
                name: " ".to_string(),
                email: String::new(),
                secret: secret("x"),
                avatar: String::new(),
            })
            .await;
        match result {
            Err(AuthFailure::Validation(fields)) => {
                assert_eq!(fields, vec!["name", "email", "avatar"]);
            }
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn login_failures_are_indistinguishable() {
        let service = service_with(Arc::new(RecordingNotifier::default()));
        service
            .register(register_request("a@x.com", "secretA"))
            .await
            .expect("register");

        let wrong_password = service
            .login(LoginRequest {
                email: "a@x.com".to_string(),
                secret: secret("wrong"),
            })
            .await;
        let missing_account = service
            .login(LoginRequest {
                email: "missing@x.com".to_string(),
                secret: secret("anything"),
            })
            .await;
        assert!(matches!(wrong_password, Err(AuthFailure::InvalidCredentials)));
        assert!(matches!(missing_account, Err(AuthFailure::InvalidCredentials)));
    }

    #[tokio::test]
    async fn forgot_then_reset_switches_the_password() {
        let notifier = Arc::new(RecordingNotifier::default());
        let service = service_with(notifier.clone());
        service
            .register(register_request("a@x.com", "secretA"))
            .await
            .expect("register");

        service.forgot_password("a@x.com").await.expect("forgot");
        let token = token_from_mail(&notifier);

        service
            .reset_password(ResetPasswordRequest {
                token,
                new_secret: secret("newSecret"),
                confirm_secret: secret("newSecret"),
            })
            .await
            .expect("reset");

        assert!(service
            .login(LoginRequest {
                email: "a@x.com".to_string(),
                secret: secret("newSecret"),
            })
            .await
            .is_ok());
        assert!(matches!(
            service
                .login(LoginRequest {
                    email: "a@x.com".to_string(),
                    secret: secret("secretA"),
                })
                .await,
            Err(AuthFailure::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn second_issue_invalidates_the_first_reset_token() {
        let notifier = Arc::new(RecordingNotifier::default());
        let service = service_with(notifier.clone());
        service
            .register(register_request("a@x.com", "secretA"))
            .await
            .expect("register");

        service.forgot_password("a@x.com").await.expect("forgot");
        let first = token_from_mail(&notifier);
        service.forgot_password("a@x.com").await.expect("forgot");

        let result = service
            .reset_password(ResetPasswordRequest {
                token: first,
                new_secret: secret("newSecret"),
                confirm_secret: secret("newSecret"),
            })
            .await;
        assert!(matches!(result, Err(AuthFailure::TokenInvalid)));
    }

    #[tokio::test]
    async fn reset_token_is_single_use() {
        let notifier = Arc::new(RecordingNotifier::default());
        let service = service_with(notifier.clone());
        service
            .register(register_request("a@x.com", "secretA"))
            .await
            .expect("register");
        service.forgot_password("a@x.com").await.expect("forgot");
        let token = token_from_mail(&notifier);

        service
            .reset_password(ResetPasswordRequest {
                token: token.clone(),
                new_secret: secret("newSecret"),
                confirm_secret: secret("newSecret"),
            })
            .await
            .expect("first reset");
        let again = service
            .reset_password(ResetPasswordRequest {
                token,
                new_secret: secret("otherSecret"),
                confirm_secret: secret("otherSecret"),
            })
            .await;
        assert!(matches!(again, Err(AuthFailure::TokenInvalid)));
    }

    #[tokio::test]
    async fn confirm_mismatch_fails_before_consuming_the_token() {
        let notifier = Arc::new(RecordingNotifier::default());
        let service = service_with(notifier.clone());
        service
            .register(register_request("a@x.com", "secretA"))
            .await
            .expect("register");
        service.forgot_password("a@x.com").await.expect("forgot");
        let token = token_from_mail(&notifier);

        let mismatch = service
            .reset_password(ResetPasswordRequest {
                token: token.clone(),
                new_secret: secret("newSecret"),
                confirm_secret: secret("different"),
            })
            .await;
        assert!(matches!(mismatch, Err(AuthFailure::Validation(_))));

        // The token survived the failed attempt and still works.
        assert!(service
            .reset_password(ResetPasswordRequest {
                token,
                new_secret: secret("newSecret"),
                confirm_secret: secret("newSecret"),
            })
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn notifier_failure_rolls_the_token_back() {
        let service = service_with(Arc::new(FailingNotifier));
        service
            .register(register_request("a@x.com", "secretA"))
            .await
            .expect("register");

        let result = service.forgot_password("a@x.com").await;
        assert!(matches!(result, Err(AuthFailure::Upstream(_))));

        // No token is left behind for anyone to guess: any candidate fails.
        let guess = service
            .reset_password(ResetPasswordRequest {
                token: "guessed".to_string(),
                new_secret: secret("x"),
                confirm_secret: secret("x"),
            })
            .await;
        assert!(matches!(guess, Err(AuthFailure::TokenInvalid)));
    }

    #[tokio::test]
    async fn forgot_password_for_unknown_email_is_not_found() {
        let service = service_with(Arc::new(RecordingNotifier::default()));
        let result = service.forgot_password("missing@x.com").await;
        assert!(matches!(result, Err(AuthFailure::NotFound)));
    }

    #[tokio::test]
    async fn change_password_requires_the_current_one() {
        let service = service_with(Arc::new(RecordingNotifier::default()));
        let registered = service
            .register(register_request("a@x.com", "secretA"))
            .await
            .expect("register");

        let wrong = service
            .change_password(ChangePasswordRequest {
                account_id: registered.account.id,
                current_secret: secret("nope"),
                new_secret: secret("newSecret"),
            })
            .await;
        assert!(matches!(wrong, Err(AuthFailure::InvalidCredentials)));

        service
            .change_password(ChangePasswordRequest {
                account_id: registered.account.id,
                current_secret: secret("secretA"),
                new_secret: secret("newSecret"),
            })
            .await
            .expect("change password");
        assert!(service
            .login(LoginRequest {
                email: "a@x.com".to_string(),
                secret: secret("newSecret"),
            })
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn admin_role_and_delete_flow() {
        let service = service_with(Arc::new(RecordingNotifier::default()));
        let registered = service
            .register(register_request("a@x.com", "secretA"))
            .await
            .expect("register");

        let promoted = service
            .update_role(registered.account.id, Role::Admin)
            .await
            .expect("promote");
        assert_eq!(promoted.role, Role::Admin);

        service
            .delete_account(registered.account.id)
            .await
            .expect("delete");
        assert!(matches!(
            service.get_account(registered.account.id).await,
            Err(AuthFailure::NotFound)
        ));
        assert!(matches!(
            service.delete_account(registered.account.id).await,
            Err(AuthFailure::NotFound)
        ));
    }

    #[tokio::test]
    async fn update_profile_replaces_the_avatar() {
        let service = service_with(Arc::new(RecordingNotifier::default()));
        let registered = service
            .register(register_request("a@x.com", "secretA"))
            .await
            .expect("register");
        let old_avatar = registered.account.avatar.clone().expect("avatar set");

        let updated = service
            .update_profile(UpdateProfileRequest {
                account_id: registered.account.id,
                name: "Alice B".to_string(),
                avatar: Some("data:image/png;base64,BBBB".to_string()),
            })
            .await
            .expect("update profile");
        assert_eq!(updated.name, "Alice B");
        assert_ne!(updated.avatar.expect("avatar"), old_avatar);
    }

    fn token_from_mail(notifier: &RecordingNotifier) -> String {
        let sent = notifier.sent.lock().expect("notifier mutex");
        let (_, _, body) = sent.last().expect("a mail was sent");
        let url = body
            .lines()
            .find(|line| line.contains("/password/reset/"))
            .expect("reset link in body");
        url.rsplit('/').next().expect("token segment").to_string()
    }

    #[test]
    fn email_validation_matches_basic_format() {
        assert!(valid_email("a@example.com"));
        assert!(!valid_email("not-an-email"));
        assert!(!valid_email("missing-domain@"));
        assert_eq!(normalize_email(" Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn reset_url_trims_trailing_slash() {
        let url = build_reset_url("https://accounts.example/", "tok");
        assert_eq!(url, "https://accounts.example/password/reset/tok");
    }
}
