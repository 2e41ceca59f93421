//! Slow, salted password hashing.
//!
//! Passwords get Argon2id with a per-digest random salt embedded in the PHC
//! string, so verification is self-contained and the comparison runs in
//! constant time inside the `argon2` crate. Cost parameters come from an
//! explicit [`HasherConfig`] passed at construction; there is no module-level
//! state.

use anyhow::{anyhow, Context, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use secrecy::{ExposeSecret, SecretString};

const DEFAULT_MEMORY_KIB: u32 = 19 * 1024;
const DEFAULT_ITERATIONS: u32 = 2;
const DEFAULT_PARALLELISM: u32 = 1;

#[derive(Clone, Copy, Debug)]
pub struct HasherConfig {
    memory_kib: u32,
    iterations: u32,
    parallelism: u32,
}

impl HasherConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            memory_kib: DEFAULT_MEMORY_KIB,
            iterations: DEFAULT_ITERATIONS,
            parallelism: DEFAULT_PARALLELISM,
        }
    }

    #[must_use]
    pub fn with_memory_kib(mut self, memory_kib: u32) -> Self {
        self.memory_kib = memory_kib;
        self
    }

    #[must_use]
    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }

    #[must_use]
    pub fn with_parallelism(mut self, parallelism: u32) -> Self {
        self.parallelism = parallelism;
        self
    }

    /// Cheap parameters for tests, where hashing cost is noise.
    #[must_use]
    pub fn fast_insecure() -> Self {
        Self {
            memory_kib: 8,
            iterations: 1,
            parallelism: 1,
        }
    }
}

impl Default for HasherConfig {
    fn default() -> Self {
        Self::new()
    }
}

pub struct SecretHasher {
    argon2: Argon2<'static>,
    // Digest of a throwaway secret, verified against when the account does
    // not exist so the missing-account path costs the same as a mismatch.
    dummy_digest: String,
}

impl SecretHasher {
    /// # Errors
    /// Returns an error if the cost parameters are out of range.
    pub fn new(config: &HasherConfig) -> Result<Self> {
        let params = Params::new(
            config.memory_kib,
            config.iterations,
            config.parallelism,
            None,
        )
        .map_err(|err| anyhow!("invalid argon2 parameters: {err}"))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let salt = SaltString::generate(&mut OsRng);
        let dummy_digest = argon2
            .hash_password(b"konto-dummy-credential", &salt)
            .map_err(|err| anyhow!("failed to hash dummy credential: {err}"))?
            .to_string();

        Ok(Self {
            argon2,
            dummy_digest,
        })
    }

    /// Hash a password into a self-contained PHC string.
    ///
    /// # Errors
    /// Returns an error if hashing fails.
    pub fn hash(&self, secret: &SecretString) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let digest = self
            .argon2
            .hash_password(secret.expose_secret().as_bytes(), &salt)
            .map_err(|err| anyhow!("failed to hash password: {err}"))?;
        Ok(digest.to_string())
    }

    /// Verify a password against a stored digest.
    ///
    /// `Ok(false)` means the password does not match. A digest that cannot be
    /// parsed (a corrupted record) is an error, not a mismatch.
    ///
    /// # Errors
    /// Returns an error if the stored digest is malformed.
    pub fn verify(&self, secret: &SecretString, digest: &str) -> Result<bool> {
        let parsed = PasswordHash::new(digest)
            .map_err(|err| anyhow!("malformed password digest: {err}"))
            .context("stored credential record is corrupted")?;
        match self
            .argon2
            .verify_password(secret.expose_secret().as_bytes(), &parsed)
        {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(err) => Err(anyhow!("failed to verify password: {err}")),
        }
    }

    /// Burn the same amount of work as a real verification.
    ///
    /// Used on the login path when no account matches the email, so response
    /// timing does not reveal whether the account exists.
    pub fn verify_dummy(&self, secret: &SecretString) {
        let _ = self.verify(secret, &self.dummy_digest);
    }
}
