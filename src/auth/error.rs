//! Caller-facing failure taxonomy for credential operations.
//!
//! Every orchestration call returns either a success payload or one of these
//! variants. The HTTP layer maps variants to status codes; the messages here
//! are deliberately generic so responses never reveal which internal check
//! failed (wrong email vs. wrong password, missing vs. expired token).

use std::fmt;

/// Discriminated failure for every credential operation.
#[derive(Debug)]
pub enum AuthFailure {
    /// Missing or malformed input; carries the offending field names.
    Validation(Vec<&'static str>),
    /// An account with the normalized email already exists.
    Conflict,
    /// Wrong email or wrong password. Deliberately indistinguishable.
    InvalidCredentials,
    /// Reset token not found or expired. Merged in the user-facing message;
    /// the internal distinction is logged where the token is checked.
    TokenInvalid,
    /// Referenced account (or session) does not exist.
    NotFound,
    /// Store, notifier or blob-store error. The cause stays in diagnostics
    /// and never reaches the response body.
    Upstream(anyhow::Error),
}

pub type AuthResult<T> = Result<T, AuthFailure>;

impl fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(fields) => write!(f, "Missing or invalid fields: {}", fields.join(", ")),
            Self::Conflict => write!(f, "An account with this email already exists"),
            Self::InvalidCredentials => write!(f, "Invalid credentials"),
            Self::TokenInvalid => write!(f, "Token is invalid or has expired"),
            Self::NotFound => write!(f, "Not found"),
            Self::Upstream(_) => write!(f, "Request failed"),
        }
    }
}

impl From<anyhow::Error> for AuthFailure {
    fn from(err: anyhow::Error) -> Self {
        Self::Upstream(err)
    }
}
