//! End-to-end credential lifecycle over the in-memory store.

use std::sync::Arc;

use secrecy::SecretString;

use konto::assets::NullBlobStore;
use konto::auth::{
    hasher::HasherConfig,
    reset::ResetConfig,
    service::{LoginRequest, RegisterRequest, ResetPasswordRequest},
    AuthConfig, AuthFailure, CredentialService, SessionVerification,
};
use konto::notify::testing::{FailingNotifier, RecordingNotifier};
use konto::notify::Notifier;
use konto::store::memory::MemoryStore;

fn build_service(notifier: Arc<dyn Notifier>, reset: ResetConfig) -> Arc<CredentialService> {
    let config = AuthConfig::new()
        .with_frontend_base_url("https://accounts.example".to_string())
        .with_hasher(HasherConfig::fast_insecure())
        .with_reset(reset);
    Arc::new(
        CredentialService::new(
            config,
            Arc::new(MemoryStore::new()),
            notifier,
            Arc::new(NullBlobStore::default()),
        )
        .expect("build service"),
    )
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

fn login_request(email: &str, password: &str) -> LoginRequest {
    LoginRequest {
        email: email.to_string(),
        secret: secret(password),
    }
}

fn reset_request(token: &str, password: &str) -> ResetPasswordRequest {
    ResetPasswordRequest {
        token: token.to_string(),
        new_secret: secret(password),
        confirm_secret: secret(password),
    }
}

fn last_token(notifier: &RecordingNotifier) -> String {
    let sent = notifier.sent.lock().expect("notifier mutex");
    let (_, _, body) = sent.last().expect("a mail was sent");
    body.lines()
        .find(|line| line.contains("/password/reset/"))
        .expect("reset link in body")
        .rsplit('/')
        .next()
        .expect("token segment")
        .to_string()
}

#[tokio::test]
async fn full_recovery_flow_ends_logged_in_with_the_new_password() {
    let notifier = Arc::new(RecordingNotifier::default());
    let service = build_service(notifier.clone(), ResetConfig::new());

    service
        .register(register_request("alice@example.com", "originalpw"))
        .await
        .expect("register");

    service
        .forgot_password("alice@example.com")
        .await
        .expect("forgot");
    let token = last_token(&notifier);

    let authenticated = service
        .reset_password(reset_request(&token, "replacementpw"))
        .await
        .expect("reset");

    // Reset logs the caller in right away.
    let verified = service
        .sessions()
        .verify(&authenticated.session.token)
        .await
        .expect("verify");
    assert!(matches!(verified, SessionVerification::Active(_)));

    assert!(service
        .login(login_request("alice@example.com", "replacementpw"))
        .await
        .is_ok());
    assert!(matches!(
        service
            .login(login_request("alice@example.com", "originalpw"))
            .await,
        Err(AuthFailure::InvalidCredentials)
    ));
}

#[tokio::test]
async fn concurrent_registrations_with_one_email_produce_one_account() {
    let service = build_service(Arc::new(RecordingNotifier::default()), ResetConfig::new());

    let mut joins = Vec::new();
    for i in 0..8 {
        let service = service.clone();
        joins.push(tokio::spawn(async move {
            service
                .register(register_request("race@example.com", &format!("password{i}")))
                .await
        }));
    }

    let mut created = 0;
    let mut conflicts = 0;
    for join in joins {
        match join.await.expect("task") {
            Ok(_) => created += 1,
            Err(AuthFailure::Conflict) => conflicts += 1,
            Err(other) => panic!("unexpected failure: {other:?}"),
        }
    }
    assert_eq!(created, 1);
    assert_eq!(conflicts, 7);
}

#[tokio::test]
async fn concurrent_resets_with_one_token_have_a_single_winner() {
    let notifier = Arc::new(RecordingNotifier::default());
    let service = build_service(notifier.clone(), ResetConfig::new());

    service
        .register(register_request("alice@example.com", "originalpw"))
        .await
        .expect("register");
    service
        .forgot_password("alice@example.com")
        .await
        .expect("forgot");
    let token = last_token(&notifier);

    let mut joins = Vec::new();
    for i in 0..4 {
        let service = service.clone();
        let token = token.clone();
        joins.push(tokio::spawn(async move {
            service
                .reset_password(reset_request(&token, &format!("candidate{i}")))
                .await
        }));
    }

    let mut completed = 0;
    let mut rejected = 0;
    for join in joins {
        match join.await.expect("task") {
            Ok(_) => completed += 1,
            Err(AuthFailure::TokenInvalid) => rejected += 1,
            Err(other) => panic!("unexpected failure: {other:?}"),
        }
    }
    assert_eq!(completed, 1);
    assert_eq!(rejected, 3);
}

#[tokio::test]
async fn expired_reset_token_is_rejected() {
    let notifier = Arc::new(RecordingNotifier::default());
    // Negative TTL: issued tokens are already past their expiry.
    let service = build_service(
        notifier.clone(),
        ResetConfig::new().with_ttl_seconds(-1),
    );

    service
        .register(register_request("alice@example.com", "originalpw"))
        .await
        .expect("register");
    service
        .forgot_password("alice@example.com")
        .await
        .expect("forgot");
    let token = last_token(&notifier);

    let result = service.reset_password(reset_request(&token, "newpw")).await;
    assert!(matches!(result, Err(AuthFailure::TokenInvalid)));
}

#[tokio::test]
async fn undelivered_reset_token_cannot_be_used() {
    let service = build_service(Arc::new(FailingNotifier), ResetConfig::new());

    service
        .register(register_request("alice@example.com", "originalpw"))
        .await
        .expect("register");

    let result = service.forgot_password("alice@example.com").await;
    assert!(matches!(result, Err(AuthFailure::Upstream(_))));

    // Password unchanged and no lingering token state.
    assert!(service
        .login(login_request("alice@example.com", "originalpw"))
        .await
        .is_ok());
}

#[tokio::test]
async fn logout_revokes_only_the_presented_session() {
    let service = build_service(Arc::new(RecordingNotifier::default()), ResetConfig::new());

    service
        .register(register_request("alice@example.com", "originalpw"))
        .await
        .expect("register");

    let first = service
        .login(login_request("alice@example.com", "originalpw"))
        .await
        .expect("first login");
    let second = service
        .login(login_request("alice@example.com", "originalpw"))
        .await
        .expect("second login");
    assert_ne!(first.session.token, second.session.token);

    service.logout(&first.session.token).await.expect("logout");

    let revoked = service
        .sessions()
        .verify(&first.session.token)
        .await
        .expect("verify revoked");
    assert!(matches!(revoked, SessionVerification::Invalid));

    let surviving = service
        .sessions()
        .verify(&second.session.token)
        .await
        .expect("verify surviving");
    assert!(matches!(surviving, SessionVerification::Active(_)));

    // Logging out twice is fine.
    service
        .logout(&first.session.token)
        .await
        .expect("repeat logout");
}
