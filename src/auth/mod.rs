//! Credential and session lifecycle core.
//!
//! Leaf modules first: [`hasher`] (slow password digests), [`token`] (random
//! opaque tokens and their storable digests), [`reset`] (password-reset token
//! state machine), [`session`] (server-side session issuance). [`service`]
//! orchestrates them against the store, notifier and blob-store seams and is
//! the only entry point the HTTP layer talks to.

pub mod error;
pub mod hasher;
pub mod reset;
pub mod service;
pub mod session;
pub mod token;

pub use error::{AuthFailure, AuthResult};
pub use service::{AuthConfig, Authenticated, CredentialService};
pub use session::{IssuedSession, SessionVerification};
