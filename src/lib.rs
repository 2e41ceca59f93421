//! # Konto (user account service)
//!
//! `konto` is the credential and session lifecycle core of a user-account
//! service. It authenticates submitted passwords against stored Argon2id
//! digests, issues and validates short-lived password-reset tokens, and mints
//! opaque session tokens on successful authentication.
//!
//! ## Credentials
//!
//! Plaintext passwords are never persisted or logged; the database only stores
//! a salted Argon2id digest. Reset and session tokens are random 256-bit
//! values handed to the caller exactly once, with only a SHA-256 digest kept
//! server-side for lookup.
//!
//! ## Sessions
//!
//! Sessions are opaque references into a server-side session table, so logout
//! revokes immediately. Multiple concurrent sessions per account are allowed.
//!
//! ## Collaborators
//!
//! Storage ([`store::AccountStore`]), outbound mail ([`notify::Notifier`]) and
//! avatar hosting ([`assets::BlobStore`]) are trait seams; the service ships
//! with a Postgres store, a logging notifier, and a content-addressed blob
//! stub for local development and tests.

pub mod api;
pub mod assets;
pub mod auth;
pub mod cli;
pub mod notify;
pub mod store;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
