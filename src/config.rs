//! Runtime configuration for the Archive, Fetcher, and Scraper (§10.3).
//!
//! Grounded on `tor_dirmgr::config` for the overall "one config struct per
//! component, assembled into a top-level `Config`" shape, and on
//! `tor_dirmgr::retry::DownloadSchedule` for the retry/parallelism knobs
//! used by the Fetcher.

use std::num::{NonZeroU32, NonZeroU8};
use std::path::PathBuf;
use std::time::Duration;

/// Default cap on simultaneously open archive file descriptors (§4.3).
pub const DEFAULT_ARCHIVE_FD_LIMIT: usize = 128;

/// Default cap on simultaneously outstanding HTTP requests (§4.4).
pub const DEFAULT_HTTP_CONCURRENCY: usize = 9;

/// Default per-request timeout (§4.4).
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum digests per server/extra-info descriptor batch (§4.4).
pub const MAX_FINGERPRINTS: usize = 96;

/// Maximum hashes per microdescriptor batch (§4.4).
pub const MAX_MICRODESCRIPTOR_HASHES: usize = 92;

/// How many endpoints a single logical request may try before giving up
/// (§4.4's "configured attempt budget").
pub const DEFAULT_ATTEMPT_BUDGET: usize = 20;

/// How many times, and how eagerly, the Fetcher should retry a request
/// across endpoints before giving up.
///
/// Mirrors `tor_dirmgr::retry::DownloadSchedule`: a small struct of
/// `NonZero` counts plus a base delay, rather than a generic backoff
/// policy trait, since the spec only ever calls for one retry shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadSchedule {
    /// Maximum endpoints to try for a single request (§4.4's attempt
    /// budget).
    attempts: NonZeroU32,
    /// Delay before the first retry; later retries back off linearly from
    /// this base.
    initial_delay: Duration,
    /// How many requests for distinct batches may be in flight at once.
    parallelism: NonZeroU8,
}

impl Default for DownloadSchedule {
    fn default() -> Self {
        DownloadSchedule {
            attempts: NonZeroU32::new(DEFAULT_ATTEMPT_BUDGET as u32).expect("nonzero constant"),
            initial_delay: Duration::from_millis(500),
            parallelism: NonZeroU8::new(DEFAULT_HTTP_CONCURRENCY as u8).expect("nonzero constant"),
        }
    }
}

impl DownloadSchedule {
    /// Construct a schedule with explicit attempt budget, initial delay,
    /// and parallelism.
    pub fn new(attempts: NonZeroU32, initial_delay: Duration, parallelism: NonZeroU8) -> Self {
        DownloadSchedule {
            attempts,
            initial_delay,
            parallelism,
        }
    }

    /// The attempt budget: how many endpoints a single request may try.
    pub fn n_attempts(&self) -> u32 {
        self.attempts.get()
    }

    /// How many batches may be downloaded in parallel.
    pub fn parallelism(&self) -> u8 {
        self.parallelism.get()
    }

    /// The delay to wait before the `attempt`th retry (0-indexed),
    /// increasing linearly.
    pub fn delay_before_attempt(&self, attempt: u32) -> Duration {
        self.initial_delay * attempt.max(1)
    }
}

/// Configuration for the [`crate::archive::Archive`] component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveConfig {
    /// The filesystem root documents are stored under.
    pub root: PathBuf,
    /// Maximum simultaneously open file descriptors.
    pub fd_limit: usize,
}

impl ArchiveConfig {
    /// Build a config rooted at `root`, with the default FD limit.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        ArchiveConfig {
            root: root.into(),
            fd_limit: DEFAULT_ARCHIVE_FD_LIMIT,
        }
    }

    /// Override the FD limit.
    pub fn with_fd_limit(mut self, fd_limit: usize) -> Self {
        self.fd_limit = fd_limit;
        self
    }
}

/// Which endpoints the Fetcher directs requests to (§4.4's
/// `ENDPOINT_MODE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointMode {
    /// Directory caches discovered from the latest consensus.
    Client,
    /// The hard-coded directory authorities.
    DirectoryCache,
    /// A single local testing cache at `127.0.0.1:9030`.
    Testing,
}

/// Configuration for the [`crate::fetch::Fetcher`] component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchConfig {
    /// Which endpoint pool to draw from.
    pub endpoint_mode: EndpointMode,
    /// Retry/parallelism schedule.
    pub schedule: DownloadSchedule,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Cap on simultaneously outstanding HTTP requests.
    pub http_concurrency: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        FetchConfig {
            endpoint_mode: EndpointMode::Client,
            schedule: DownloadSchedule::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            http_concurrency: DEFAULT_HTTP_CONCURRENCY,
        }
    }
}

/// Top-level configuration, assembled from the per-component configs.
#[derive(Debug, Clone)]
pub struct Config {
    /// Archive settings.
    pub archive: ArchiveConfig,
    /// Fetcher settings.
    pub fetch: FetchConfig,
}

impl Config {
    /// Build a config with the given archive root and default fetch
    /// settings.
    pub fn new(archive_root: impl Into<PathBuf>) -> Self {
        Config {
            archive: ArchiveConfig::new(archive_root),
            fetch: FetchConfig::default(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn download_schedule_defaults() {
        let sched = DownloadSchedule::default();
        assert_eq!(sched.n_attempts(), 20);
        assert_eq!(sched.parallelism(), 9);
    }

    #[test]
    fn delay_scales_with_attempt() {
        let sched = DownloadSchedule::default();
        assert_eq!(sched.delay_before_attempt(0), Duration::from_millis(500));
        assert_eq!(sched.delay_before_attempt(2), Duration::from_millis(1000));
    }

    #[test]
    fn archive_config_builder() {
        let cfg = ArchiveConfig::new("/tmp/archive").with_fd_limit(256);
        assert_eq!(cfg.fd_limit, 256);
        assert_eq!(cfg.root, PathBuf::from("/tmp/archive"));
    }

    #[test]
    fn config_defaults_to_client_mode() {
        let cfg = Config::new("/tmp/archive");
        assert_eq!(cfg.fetch.endpoint_mode, EndpointMode::Client);
    }
}
