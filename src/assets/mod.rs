//! Avatar/blob hosting seam.
//!
//! The service only needs an identifier/URL pair back from an upload and an
//! idempotent-ish delete. Failures surface as request failures; nothing here
//! is retried.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

/// Handle returned by a blob store: stable id for later deletion, public URL
/// for display.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StoredAsset {
    pub asset_id: String,
    pub url: String,
}

#[derive(Debug)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Upload an opaque payload and return its handle.
    async fn upload(&self, payload: &[u8]) -> Result<StoredAsset>;

    /// Delete a previously uploaded blob.
    async fn delete(&self, asset_id: &str) -> Result<DeleteOutcome>;
}

/// Content-addressed stub for local development and tests.
///
/// Derives the asset id from the payload digest and never stores bytes.
#[derive(Clone, Debug)]
pub struct NullBlobStore {
    base_url: String,
}

impl NullBlobStore {
    #[must_use]
    pub fn new(base_url: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl Default for NullBlobStore {
    fn default() -> Self {
        Self::new("https://assets.invalid/avatars".to_string())
    }
}

#[async_trait]
impl BlobStore for NullBlobStore {
    async fn upload(&self, payload: &[u8]) -> Result<StoredAsset> {
        let mut hasher = Sha256::new();
        hasher.update(payload);
        let digest = hasher.finalize();
        // First 16 hex chars are plenty for a dev-only identifier.
        let asset_id: String = digest.iter().take(8).map(|b| format!("{b:02x}")).collect();
        let url = format!("{}/{asset_id}", self.base_url);
        Ok(StoredAsset { asset_id, url })
    }

    async fn delete(&self, _asset_id: &str) -> Result<DeleteOutcome> {
        Ok(DeleteOutcome::Deleted)
    }
}
