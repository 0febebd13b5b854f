//! Local filesystem asset store.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};
use crate::fetch::MediaFetcher;
use crate::keys::validate_key;
use crate::store::AssetStore;

/// URL path prefix the API serves local assets under.
pub const LOCAL_PREFIX: &str = "/local_storage/";

/// Stores assets under a root directory and hands out
/// `{public_base}/local_storage/{key}` references.
#[derive(Debug, Clone)]
pub struct LocalAssetStore {
    root: PathBuf,
    public_base_url: String,
    fetcher: MediaFetcher,
}

impl LocalAssetStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> StorageResult<Self> {
        Ok(Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
            fetcher: MediaFetcher::new(Duration::from_secs(120))?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn public_url(&self, key: &str) -> String {
        format!("{}{}{}", self.public_base_url, LOCAL_PREFIX, key)
    }

    /// Map a reference produced by this store back to its key.
    pub fn key_for(&self, reference: &str) -> Option<String> {
        let path = reference
            .strip_prefix(&self.public_base_url)
            .unwrap_or(reference);
        path.strip_prefix(LOCAL_PREFIX).map(str::to_string)
    }

    fn path_for(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl AssetStore for LocalAssetStore {
    async fn put_file(&self, path: &Path, key: &str, _content_type: &str) -> StorageResult<String> {
        let dest = self.path_for(key)?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(path, &dest)
            .await
            .map_err(|e| StorageError::upload_failed(format!("{}: {}", path.display(), e)))?;
        info!("Stored {} at {}", path.display(), dest.display());
        Ok(self.public_url(key))
    }

    async fn put_bytes(&self, data: Vec<u8>, key: &str, _content_type: &str) -> StorageResult<String> {
        let dest = self.path_for(key)?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        debug!("Writing {} bytes to {}", data.len(), dest.display());
        tokio::fs::write(&dest, data).await?;
        Ok(self.public_url(key))
    }

    async fn fetch(&self, reference: &str, dest: &Path) -> StorageResult<()> {
        match self.key_for(reference) {
            Some(key) => {
                let source = self.path_for(&key)?;
                if !source.is_file() {
                    return Err(StorageError::not_found(key));
                }
                if let Some(parent) = dest.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::copy(&source, dest).await?;
            }
            None => {
                self.fetcher.download(reference, dest).await?;
            }
        }
        Ok(())
    }
}
