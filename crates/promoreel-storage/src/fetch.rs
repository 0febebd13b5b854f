//! HTTP download of generated media into local scratch space.

use std::path::Path;
use std::time::{Duration, Instant};

use metrics::histogram;
use reqwest::{Client, StatusCode};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::{StorageError, StorageResult};

pub const DOWNLOAD_DURATION_SECONDS: &str = "promoreel_download_duration_seconds";

/// Downloads remote media with bounded retries.
#[derive(Debug, Clone)]
pub struct MediaFetcher {
    http: Client,
    max_attempts: u32,
    base_delay: Duration,
}

impl MediaFetcher {
    pub fn new(timeout: Duration) -> StorageResult<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        })
    }

    pub fn with_retries(mut self, max_attempts: u32, base_delay: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.base_delay = base_delay;
        self
    }

    /// Copy `reference` to `dest`. Non-HTTP references are local paths.
    pub async fn download(&self, reference: &str, dest: &Path) -> StorageResult<u64> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        if !(reference.starts_with("http://") || reference.starts_with("https://")) {
            let source = reference.strip_prefix("file://").unwrap_or(reference);
            if !Path::new(source).is_file() {
                return Err(StorageError::not_found(source));
            }
            return Ok(tokio::fs::copy(source, dest).await?);
        }

        let started = Instant::now();
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.download_once(reference, dest).await {
                Ok(bytes) => {
                    histogram!(DOWNLOAD_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
                    debug!(url = reference, bytes, attempt, "Downloaded media");
                    return Ok(bytes);
                }
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.base_delay * 2u32.pow(attempt - 1);
                    warn!(
                        url = reference,
                        attempt,
                        error = %e,
                        "Download failed, retrying in {:?}",
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn download_once(&self, url: &str, dest: &Path) -> StorageResult<u64> {
        let response = self.http.get(url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(StorageError::not_found(url));
        }
        let mut response = response.error_for_status()?;

        let mut file = tokio::fs::File::create(dest).await?;
        let mut total = 0u64;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            total += chunk.len() as u64;
        }
        file.flush().await?;

        if total == 0 {
            return Err(StorageError::download_failed(format!("{} returned an empty body", url)));
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher() -> MediaFetcher {
        MediaFetcher::new(Duration::from_secs(5))
            .unwrap()
            .with_retries(3, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/clip.mp4"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/clip.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 64]))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("nested/clip.mp4");
        let bytes = fetcher()
            .download(&format!("{}/clip.mp4", server.uri()), &dest)
            .await
            .unwrap();
        assert_eq!(bytes, 64);
        assert_eq!(std::fs::read(&dest).unwrap().len(), 64);
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let result = fetcher()
            .download(&format!("{}/gone.mp4", server.uri()), &dir.path().join("x.mp4"))
            .await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_local_reference_is_copied() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("voice.mp3");
        std::fs::write(&source, b"mp3").unwrap();

        let dest = dir.path().join("out/voice.mp3");
        fetcher()
            .download(source.to_str().unwrap(), &dest)
            .await
            .unwrap();
        assert_eq!(std::fs::read(dest).unwrap(), b"mp3");
    }
}
