//! R2 client implementation.

use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use metrics::histogram;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};
use crate::fetch::MediaFetcher;
use crate::keys::validate_key;
use crate::store::AssetStore;

pub const UPLOAD_DURATION_SECONDS: &str = "promoreel_upload_duration_seconds";

/// Configuration for R2 client.
#[derive(Debug, Clone)]
pub struct R2Config {
    /// R2 endpoint URL (S3 API endpoint)
    pub endpoint_url: String,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Bucket name
    pub bucket_name: String,
    /// Region (usually "auto" for R2)
    pub region: String,
    /// Public base URL objects are served from (custom domain or r2.dev)
    pub public_url: Option<String>,
}

impl R2Config {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self {
            endpoint_url: std::env::var("R2_ENDPOINT_URL")
                .map_err(|_| StorageError::config_error("R2_ENDPOINT_URL not set"))?,
            access_key_id: std::env::var("R2_ACCESS_KEY_ID")
                .map_err(|_| StorageError::config_error("R2_ACCESS_KEY_ID not set"))?,
            secret_access_key: std::env::var("R2_SECRET_ACCESS_KEY")
                .map_err(|_| StorageError::config_error("R2_SECRET_ACCESS_KEY not set"))?,
            bucket_name: std::env::var("R2_BUCKET_NAME")
                .map_err(|_| StorageError::config_error("R2_BUCKET_NAME not set"))?,
            region: std::env::var("R2_REGION").unwrap_or_else(|_| "auto".to_string()),
            public_url: std::env::var("R2_PUBLIC_URL")
                .ok()
                .filter(|s| !s.trim().is_empty()),
        })
    }

    /// Base URL object keys are appended to.
    pub fn public_base(&self) -> String {
        match &self.public_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!(
                "{}/{}",
                self.endpoint_url.trim_end_matches('/'),
                self.bucket_name
            ),
        }
    }
}

/// Cloudflare R2 storage client.
#[derive(Clone)]
pub struct R2Client {
    client: Client,
    bucket: String,
    public_base: String,
    fetcher: MediaFetcher,
}

impl R2Client {
    /// Create a new R2 client from configuration.
    pub async fn new(config: R2Config) -> StorageResult<Self> {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "r2",
        );

        let public_base = config.public_base();
        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(sdk_config),
            bucket: config.bucket_name,
            public_base,
            fetcher: MediaFetcher::new(Duration::from_secs(120))?,
        })
    }

    /// Create from environment variables.
    pub async fn from_env() -> StorageResult<Self> {
        let config = R2Config::from_env()?;
        Self::new(config).await
    }

    pub fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base, key)
    }

    /// Map a public reference back to its object key.
    pub fn key_for(&self, reference: &str) -> Option<String> {
        reference
            .strip_prefix(&self.public_base)
            .and_then(|rest| rest.strip_prefix('/'))
            .map(str::to_string)
    }

    /// Upload a file to R2.
    pub async fn upload_file(
        &self,
        path: impl AsRef<Path>,
        key: &str,
        content_type: &str,
    ) -> StorageResult<()> {
        let path = path.as_ref();
        validate_key(key)?;
        debug!("Uploading {} to {}", path.display(), key);
        let started = Instant::now();

        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        histogram!(UPLOAD_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
        info!("Uploaded {} to {}", path.display(), key);
        Ok(())
    }

    /// Upload bytes to R2.
    pub async fn upload_bytes(
        &self,
        data: Vec<u8>,
        key: &str,
        content_type: &str,
    ) -> StorageResult<()> {
        validate_key(key)?;
        debug!("Uploading {} bytes to {}", data.len(), key);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        Ok(())
    }

    /// Download object as bytes.
    pub async fn download_bytes(&self, key: &str) -> StorageResult<Vec<u8>> {
        debug!("Downloading {}", key);

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.to_string().contains("NoSuchKey") {
                    StorageError::not_found(key)
                } else {
                    StorageError::DownloadFailed(e.to_string())
                }
            })?;

        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::DownloadFailed(e.to_string()))?
            .into_bytes()
            .to_vec();

        Ok(bytes)
    }

    /// Download object to a file.
    pub async fn download_file(&self, key: &str, path: impl AsRef<Path>) -> StorageResult<()> {
        let path = path.as_ref();
        debug!("Downloading {} to {}", key, path.display());

        let bytes = self.download_bytes(key).await?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                StorageError::DownloadFailed(format!("Failed to create directory: {}", e))
            })?;
        }

        tokio::fs::write(path, bytes)
            .await
            .map_err(|e| StorageError::DownloadFailed(format!("Failed to write file: {}", e)))?;

        info!("Downloaded {} to {}", key, path.display());
        Ok(())
    }
}

#[async_trait]
impl AssetStore for R2Client {
    async fn put_file(&self, path: &Path, key: &str, content_type: &str) -> StorageResult<String> {
        self.upload_file(path, key, content_type).await?;
        Ok(self.public_url(key))
    }

    async fn put_bytes(&self, data: Vec<u8>, key: &str, content_type: &str) -> StorageResult<String> {
        self.upload_bytes(data, key, content_type).await?;
        Ok(self.public_url(key))
    }

    async fn fetch(&self, reference: &str, dest: &Path) -> StorageResult<()> {
        match self.key_for(reference) {
            Some(key) => self.download_file(&key, dest).await,
            None => self.fetcher.download(reference, dest).await.map(|_| ()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(public_url: Option<&str>) -> R2Config {
        R2Config {
            endpoint_url: "https://acct.r2.cloudflarestorage.com/".into(),
            access_key_id: "ak".into(),
            secret_access_key: "sk".into(),
            bucket_name: "promoreel".into(),
            region: "auto".into(),
            public_url: public_url.map(str::to_string),
        }
    }

    #[test]
    fn test_public_base() {
        assert_eq!(
            config(None).public_base(),
            "https://acct.r2.cloudflarestorage.com/promoreel"
        );
        assert_eq!(
            config(Some("https://media.promoreel.app/")).public_base(),
            "https://media.promoreel.app"
        );
    }

    #[tokio::test]
    async fn test_public_url_maps_back_to_key() {
        let client = R2Client::new(config(Some("https://media.promoreel.app"))).await.unwrap();
        let url = client.public_url("videos/u/j/16x9.mp4");
        assert_eq!(url, "https://media.promoreel.app/videos/u/j/16x9.mp4");
        assert_eq!(client.key_for(&url).as_deref(), Some("videos/u/j/16x9.mp4"));
        assert_eq!(client.key_for("https://elsewhere/clip.mp4"), None);
    }
}
