//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use promoreel_models::Dimensions;
use promoreel_providers::ProviderConfig;
use promoreel_queue::QueueConfig;

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn env_secs(key: &str, default: Duration) -> Duration {
    env_parse(key).map(Duration::from_secs).unwrap_or(default)
}

/// Worker pool and pipeline configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent jobs
    pub max_concurrent_jobs: usize,
    /// Maximum (shot, ratio) clips generated in parallel within a job
    pub max_clip_parallel: usize,
    /// Root for per-job scratch directories
    pub work_dir: PathBuf,
    /// Output frame for ratios with no built-in or job-supplied size
    pub default_dimensions: Dimensions,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// How often the worker should scan for orphaned pending jobs
    pub claim_interval: Duration,
    /// Minimum idle time before a pending job can be claimed (crash recovery)
    pub claim_min_idle: Duration,
    /// Expiry of the per-job execution lock
    pub lock_ttl: Duration,
    /// Interval for refreshing the execution lock while a job runs
    pub lock_refresh_interval: Duration,
    /// FFmpeg per-invocation timeout in seconds
    pub ffmpeg_timeout_secs: u64,
    /// Retries for a job commit before the stage gives up
    pub commit_retries: u32,
    /// First delay between commit retries, doubled each attempt
    pub commit_retry_delay: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            max_clip_parallel: 1,
            work_dir: std::env::temp_dir().join("promoreel"),
            default_dimensions: Dimensions {
                width: 1920,
                height: 1080,
            },
            shutdown_timeout: Duration::from_secs(60),
            claim_interval: Duration::from_secs(30),
            claim_min_idle: Duration::from_secs(900),
            lock_ttl: Duration::from_secs(120),
            lock_refresh_interval: Duration::from_secs(30),
            ffmpeg_timeout_secs: 600,
            commit_retries: 3,
            commit_retry_delay: Duration::from_millis(200),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_jobs: env_parse("WORKER_MAX_CONCURRENT_JOBS")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_concurrent_jobs),
            max_clip_parallel: env_parse("WORKER_MAX_CLIP_PARALLEL")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_clip_parallel),
            work_dir: std::env::var("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            default_dimensions: Dimensions {
                width: env_parse("WORKER_DEFAULT_WIDTH").unwrap_or(defaults.default_dimensions.width),
                height: env_parse("WORKER_DEFAULT_HEIGHT")
                    .unwrap_or(defaults.default_dimensions.height),
            },
            shutdown_timeout: env_secs("WORKER_SHUTDOWN_TIMEOUT", defaults.shutdown_timeout),
            claim_interval: env_secs("WORKER_CLAIM_INTERVAL_SECS", defaults.claim_interval),
            claim_min_idle: env_secs("WORKER_CLAIM_MIN_IDLE_SECS", defaults.claim_min_idle),
            lock_ttl: env_secs("WORKER_LOCK_TTL_SECS", defaults.lock_ttl),
            lock_refresh_interval: env_secs(
                "WORKER_LOCK_REFRESH_SECS",
                defaults.lock_refresh_interval,
            ),
            ffmpeg_timeout_secs: env_parse("WORKER_FFMPEG_TIMEOUT_SECS")
                .unwrap_or(defaults.ffmpeg_timeout_secs),
            commit_retries: env_parse("WORKER_COMMIT_RETRIES").unwrap_or(defaults.commit_retries),
            commit_retry_delay: env_parse("WORKER_COMMIT_RETRY_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.commit_retry_delay),
        }
    }
}

/// Local asset storage used when R2 is not configured.
#[derive(Debug, Clone)]
pub struct LocalStorageConfig {
    pub root: PathBuf,
    /// Base URL the API serves `/local_storage/` from
    pub public_base_url: String,
}

impl Default for LocalStorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("local_storage"),
            public_base_url: "http://localhost:8000".to_string(),
        }
    }
}

impl LocalStorageConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            root: std::env::var("LOCAL_STORAGE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.root),
            public_base_url: std::env::var("PUBLIC_BASE_URL").unwrap_or(defaults.public_base_url),
        }
    }
}

/// Everything the worker binary needs, built once at startup.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub worker: WorkerConfig,
    pub queue: QueueConfig,
    pub providers: ProviderConfig,
    pub local_storage: LocalStorageConfig,
    /// Serve Prometheus metrics on this port when set
    pub metrics_port: Option<u16>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            worker: WorkerConfig::from_env(),
            queue: QueueConfig::from_env(),
            providers: ProviderConfig::from_env(),
            local_storage: LocalStorageConfig::from_env(),
            metrics_port: env_parse("METRICS_PORT"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.max_clip_parallel, 1);
        assert_eq!(config.default_dimensions, Dimensions { width: 1920, height: 1080 });
        assert!(config.lock_refresh_interval < config.lock_ttl);
    }
}
