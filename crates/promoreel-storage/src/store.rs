//! Asset store abstraction.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::client::{R2Client, R2Config};
use crate::error::StorageResult;
use crate::local::LocalAssetStore;

/// Durable home for uploaded and rendered assets.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Upload a file and return its public reference.
    async fn put_file(&self, path: &Path, key: &str, content_type: &str) -> StorageResult<String>;

    /// Upload bytes and return their public reference.
    async fn put_bytes(&self, data: Vec<u8>, key: &str, content_type: &str) -> StorageResult<String>;

    /// Download a reference to `dest`. References this store produced are
    /// read back directly; anything else is fetched over HTTP.
    async fn fetch(&self, reference: &str, dest: &Path) -> StorageResult<()>;
}

/// R2 when fully configured, otherwise the local filesystem fallback.
pub async fn store_from_env(local: LocalAssetStore) -> StorageResult<Arc<dyn AssetStore>> {
    match R2Config::from_env() {
        Ok(config) => {
            let client = R2Client::new(config).await?;
            info!("Using R2 asset storage");
            Ok(Arc::new(client))
        }
        Err(e) => {
            warn!(
                reason = %e,
                root = %local.root().display(),
                "R2 not configured, storing assets on the local filesystem"
            );
            Ok(Arc::new(local))
        }
    }
}
