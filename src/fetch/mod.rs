//! The Fetcher component (§4.4): a concurrency-bounded, multi-endpoint HTTP
//! client speaking the directory protocol's query paths.
//!
//! Grounded on `bushel.downloader.DirectoryDownloader` for the public
//! contract (consensus/vote/descriptor getters, a `BoundedSemaphore` around
//! concurrency, endpoint-mode switching) and on `arti_hyper`'s use of plain
//! `hyper`+`tokio` (rather than a Tor circuit) for the transport, since
//! directory documents are themselves fetched over ordinary HTTP here.

pub mod err;
pub mod request;
pub mod response;

use std::sync::{Arc, Mutex};

use rand::seq::SliceRandom;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::authority::{default_authorities, Authority};
use crate::config::{EndpointMode, FetchConfig};
use request::ConsensusFlavor;

pub use err::{Error, RequestError, Result};

/// A resolved, addressable endpoint the Fetcher can issue requests against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchEndpoint {
    /// A human-readable label (authority nickname, or the bare address for
    /// consensus-discovered caches).
    pub label: String,
    /// The host to connect to.
    pub host: String,
    /// The port to connect to.
    pub port: u16,
    /// Whether this endpoint is known to cache extra-info descriptors
    /// (§4.4: "extra-info endpoints are restricted to caches that
    /// advertise caching extra-info"). Authorities always do; for a
    /// consensus-discovered cache this is approximated from the relay's
    /// `V2Dir` flag, the only signal a consensus itself carries.
    pub supports_extra_info: bool,
}

impl From<&Authority> for FetchEndpoint {
    fn from(a: &Authority) -> Self {
        let addr = a.endpoint.addr();
        FetchEndpoint {
            label: a.name.to_string(),
            host: addr.ip().to_string(),
            port: addr.port(),
            supports_extra_info: true,
        }
    }
}

/// The Fetcher: an asynchronous, concurrency-limited, multi-endpoint HTTP
/// client for directory-protocol documents.
pub struct Fetcher {
    config: FetchConfig,
    client: response::HttpClient,
    http_semaphore: Arc<Semaphore>,
    endpoint_mode: Mutex<EndpointMode>,
    /// Directory caches discovered from the most recently fetched
    /// consensus; used only in `EndpointMode::Client`. Replaced wholesale
    /// under a single-writer discipline during consensus refresh (§5).
    discovered_caches: Mutex<Vec<FetchEndpoint>>,
}

impl Fetcher {
    /// Construct a new Fetcher with the given configuration.
    pub fn new(config: FetchConfig) -> Self {
        Fetcher {
            http_semaphore: Arc::new(Semaphore::new(config.http_concurrency)),
            endpoint_mode: Mutex::new(config.endpoint_mode),
            discovered_caches: Mutex::new(Vec::new()),
            client: response::build_client(),
            config,
        }
    }

    /// Pin this Fetcher to a single, caller-chosen endpoint, bypassing the
    /// usual authority/consensus-discovered pools.
    ///
    /// Gated behind the `testing` feature: this exists so integration tests
    /// (`tests/`) can point a Fetcher at a mock HTTP server bound to an
    /// ephemeral port, which `EndpointMode::Testing`'s hard-coded
    /// `127.0.0.1:9030` cannot express.
    #[cfg(any(test, feature = "testing"))]
    pub fn set_fixed_endpoint(&self, host: &str, port: u16) {
        *self.endpoint_mode.lock().expect("lock poisoned") = EndpointMode::Client;
        *self.discovered_caches.lock().expect("lock poisoned") = vec![FetchEndpoint {
            label: "fixed-test-endpoint".to_string(),
            host: host.to_string(),
            port,
            supports_extra_info: true,
        }];
    }

    /// Switch endpoint-selection modes, clearing any state tied to the
    /// previous mode's endpoint pool (§4.4: "switching modes clears
    /// per-endpoint request history").
    pub fn set_endpoint_mode(&self, mode: EndpointMode) {
        *self.endpoint_mode.lock().expect("lock poisoned") = mode;
        self.discovered_caches
            .lock()
            .expect("lock poisoned")
            .clear();
    }

    /// Record the directory caches discovered from a freshly fetched
    /// consensus, for use in `EndpointMode::Client`.
    pub fn set_discovered_caches(&self, caches: Vec<FetchEndpoint>) {
        *self.discovered_caches.lock().expect("lock poisoned") = caches;
    }

    /// The endpoint pool for the current mode, shuffled (§4.4, §9). When
    /// `extra_info_only` is set and the mode is `Client`, the pool is
    /// narrowed to caches that advertise caching extra-info.
    fn endpoint_pool(&self, extra_info_only: bool) -> Vec<FetchEndpoint> {
        let mode = *self.endpoint_mode.lock().expect("lock poisoned");
        let mut pool = match mode {
            EndpointMode::DirectoryCache => default_authorities()
                .iter()
                .map(FetchEndpoint::from)
                .collect(),
            EndpointMode::Testing => vec![FetchEndpoint {
                label: "testing".to_string(),
                host: "127.0.0.1".to_string(),
                port: 9030,
                supports_extra_info: true,
            }],
            EndpointMode::Client => {
                let discovered = self.discovered_caches.lock().expect("lock poisoned");
                let candidates: Vec<FetchEndpoint> = if discovered.is_empty() {
                    default_authorities()
                        .iter()
                        .map(FetchEndpoint::from)
                        .collect()
                } else {
                    discovered.clone()
                };
                if extra_info_only {
                    let restricted: Vec<FetchEndpoint> = candidates
                        .iter()
                        .filter(|e| e.supports_extra_info)
                        .cloned()
                        .collect();
                    if restricted.is_empty() {
                        default_authorities().iter().map(FetchEndpoint::from).collect()
                    } else {
                        restricted
                    }
                } else {
                    candidates
                }
            }
        };
        pool.shuffle(&mut rand::thread_rng());
        pool
    }

    /// Try `path` against each endpoint in a shuffled pool until one
    /// succeeds, the pool is exhausted, or the attempt budget is reached
    /// (§4.4's retry/failover rule). Acquires the HTTP concurrency
    /// semaphore for the duration of each individual attempt.
    ///
    /// `extra_info_only` narrows the pool to endpoints known to cache
    /// extra-info descriptors in `EndpointMode::Client` (§4.4); other modes
    /// are unaffected since authorities and the testing cache always serve
    /// everything.
    async fn fetch_with_failover(&self, path: &str, extra_info_only: bool) -> Result<Vec<u8>> {
        let pool = self.endpoint_pool(extra_info_only);
        self.fetch_from_pool(pool, path).await
    }

    /// Shared retry/semaphore loop: try `path` against each endpoint in
    /// `pool`, in order, until one succeeds, the pool is exhausted, or the
    /// attempt budget is reached. [`fetch_with_failover`](Self::fetch_with_failover)
    /// calls this with a shuffled, mode-selected pool; [`vote_from`](Self::vote_from)
    /// calls it with a single caller-chosen endpoint so the budget/semaphore
    /// handling doesn't have to be duplicated.
    async fn fetch_from_pool(&self, pool: Vec<FetchEndpoint>, path: &str) -> Result<Vec<u8>> {
        if pool.is_empty() {
            return Err(Error::NoEndpoints);
        }
        let budget = self.config.schedule.n_attempts() as usize;
        let mut last_error = None;
        let mut attempts = 0;

        for endpoint in pool.into_iter().take(budget) {
            attempts += 1;
            let _permit = self
                .http_semaphore
                .acquire()
                .await
                .expect("http semaphore is never closed");
            let uri = response::build_uri(&endpoint.host, endpoint.port, path);
            debug!(endpoint = %endpoint.label, %path, "requesting");
            match response::get(&self.client, uri, self.config.request_timeout).await {
                Ok(body) => return Ok(body),
                Err(e) => {
                    warn!(endpoint = %endpoint.label, error = %e, "attempt failed, trying next endpoint");
                    last_error = Some(e);
                }
            }
        }

        Err(Error::RequestFailed {
            attempts,
            last: last_error,
        })
    }

    /// Fetch the current consensus of the given flavor, or `None` if every
    /// endpoint failed (§7: surfaced as a soft failure at this level, not an
    /// `Err`, matching the other getters' `doc | nil` contract).
    pub async fn consensus(&self, flavor: ConsensusFlavor) -> Option<Vec<u8>> {
        let path = request::consensus_path(flavor);
        match self.fetch_with_failover(&path, false).await {
            Ok(body) => Some(body),
            Err(e) => {
                info!(error = %e, "consensus fetch failed on every endpoint");
                None
            }
        }
    }

    /// Fetch a vote by digest.
    pub async fn vote(&self, digest: &str) -> Option<Vec<u8>> {
        let path = request::vote_path(digest);
        match self.fetch_with_failover(&path, false).await {
            Ok(body) => Some(body),
            Err(e) => {
                info!(error = %e, "vote fetch failed on every endpoint");
                None
            }
        }
    }

    /// Fetch `authority`'s own current vote directly from its own directory
    /// port, rather than from the shuffled pool `vote` draws from (§4.6's
    /// "enumerating authorities directly" initial mode: the caller doesn't
    /// know the vote's digest yet, only which authority to ask).
    pub async fn vote_from(&self, authority: &Authority) -> Option<Vec<u8>> {
        let path = request::vote_path("authority");
        let pool = vec![FetchEndpoint::from(authority)];
        match self.fetch_from_pool(pool, &path).await {
            Ok(body) => Some(body),
            Err(e) => {
                info!(authority = %authority.name, error = %e, "own-vote fetch failed");
                None
            }
        }
    }

    /// Fetch server descriptors by digest, batching at `MAX_FINGERPRINTS`
    /// and issuing each batch as an independent concurrent request (§4.4).
    /// Digests that fail on every endpoint are simply absent from the
    /// result (a soft failure, per §4.4/§7).
    pub async fn server_descriptors(&self, digests: &[String]) -> Vec<Vec<u8>> {
        self.batched_fetch(
            digests,
            request::descriptor_batches,
            request::server_descriptors_path,
            false,
        )
        .await
    }

    /// Fetch extra-info descriptors by digest. In `EndpointMode::Client`
    /// this is restricted to caches known to advertise caching extra-info
    /// (§4.4).
    pub async fn extra_info_descriptors(&self, digests: &[String]) -> Vec<Vec<u8>> {
        self.batched_fetch(
            digests,
            request::descriptor_batches,
            request::extra_info_path,
            true,
        )
        .await
    }

    /// Fetch microdescriptors by hex SHA-256 hash.
    ///
    /// `hashes` are hex, matching every other digest this crate passes
    /// around; [`request::microdescriptors_path`] re-encodes them as
    /// unpadded base-64 for the actual wire request.
    pub async fn microdescriptors(&self, hashes: &[String]) -> Vec<Vec<u8>> {
        self.batched_fetch(
            hashes,
            request::microdescriptor_batches,
            request::microdescriptors_path,
            false,
        )
        .await
    }

    async fn batched_fetch<'a, B>(
        &self,
        digests: &'a [String],
        batch_fn: impl Fn(&'a [String]) -> B,
        path_fn: impl Fn(&[String]) -> String,
        extra_info_only: bool,
    ) -> Vec<Vec<u8>>
    where
        B: Iterator<Item = &'a [String]>,
    {
        let batches: Vec<&[String]> = batch_fn(digests).collect();
        let futures = batches.into_iter().map(|batch| {
            let path = path_fn(batch);
            async move {
                match self.fetch_with_failover(&path, extra_info_only).await {
                    Ok(body) => Some(body),
                    Err(e) => {
                        info!(error = %e, batch_size = batch.len(), "batch failed on every endpoint");
                        None
                    }
                }
            }
        });
        futures::future::join_all(futures)
            .await
            .into_iter()
            .flatten()
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fetch_endpoint_from_authority() {
        let auths = default_authorities();
        let fe = FetchEndpoint::from(&auths[0]);
        assert_eq!(fe.label, "moria1");
    }

    #[tokio::test]
    async fn set_endpoint_mode_clears_discovered_caches() {
        let fetcher = Fetcher::new(FetchConfig::default());
        fetcher.set_discovered_caches(vec![FetchEndpoint {
            label: "x".into(),
            host: "1.2.3.4".into(),
            port: 80,
            supports_extra_info: false,
        }]);
        fetcher.set_endpoint_mode(EndpointMode::DirectoryCache);
        assert!(fetcher.discovered_caches.lock().unwrap().is_empty());
    }

    #[test]
    fn endpoint_pool_testing_mode_is_localhost() {
        let mut config = FetchConfig::default();
        config.endpoint_mode = EndpointMode::Testing;
        let fetcher = Fetcher::new(config);
        let pool = fetcher.endpoint_pool(false);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool[0].host, "127.0.0.1");
    }

    #[test]
    fn endpoint_pool_directory_cache_mode_has_nine_authorities() {
        let mut config = FetchConfig::default();
        config.endpoint_mode = EndpointMode::DirectoryCache;
        let fetcher = Fetcher::new(config);
        assert_eq!(fetcher.endpoint_pool(false).len(), 9);
    }

    #[test]
    fn client_mode_extra_info_falls_back_without_capable_caches() {
        let fetcher = Fetcher::new(FetchConfig::default());
        fetcher.set_discovered_caches(vec![FetchEndpoint {
            label: "plain-cache".into(),
            host: "1.2.3.4".into(),
            port: 9030,
            supports_extra_info: false,
        }]);
        // No discovered cache advertises extra-info, so the pool falls
        // back to the authorities rather than going empty (§4.4).
        let pool = fetcher.endpoint_pool(true);
        assert_eq!(pool.len(), 9);
    }

    #[test]
    fn client_mode_extra_info_prefers_capable_caches() {
        let fetcher = Fetcher::new(FetchConfig::default());
        fetcher.set_discovered_caches(vec![
            FetchEndpoint {
                label: "plain-cache".into(),
                host: "1.2.3.4".into(),
                port: 9030,
                supports_extra_info: false,
            },
            FetchEndpoint {
                label: "full-cache".into(),
                host: "5.6.7.8".into(),
                port: 9030,
                supports_extra_info: true,
            },
        ]);
        let pool = fetcher.endpoint_pool(true);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool[0].label, "full-cache");
    }
}
