//! The Cache component (§4.5): a read-through layer over
//! `{memory, Archive, Fetcher}` with inflight-request coalescing.
//!
//! Grounded on `bushel.cache.DirectoryCache` for the three-tier lookup order
//! (memory dict → archive → downloader → store-and-memoize) and on §9's
//! design note for "an inflight map `(kind, digest) -> future` returns the
//! same future to concurrent callers; settle once, broadcast result" — built
//! here with `futures::future::Shared`, the same coalescing primitive
//! `tor_dirmgr::shared_ref` reaches for when multiple callers need to await
//! one underlying resource.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use futures::future::Shared;
use futures::FutureExt;
use time::OffsetDateTime;
use tracing::trace;

use crate::archive::Archive;
use crate::authority::Authority;
use crate::doc::{DocKind, PathMeta};
use crate::fetch::request::ConsensusFlavor;
use crate::fetch::Fetcher;

type SharedDoc = Shared<Pin<Box<dyn Future<Output = Option<Arc<Vec<u8>>>> + Send>>>;

/// A memory+inflight key: document kind plus digest (or, for
/// non-digest-keyed kinds like consensuses, a synthetic key built from the
/// caller).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Key {
    kind: DocKind,
    digest: String,
}

/// The read-through cache.
pub struct Cache {
    archive: Archive,
    fetcher: Arc<Fetcher>,
    memory: Mutex<HashMap<Key, Arc<Vec<u8>>>>,
    inflight: Mutex<HashMap<Key, SharedDoc>>,
}

impl Cache {
    /// Build a new cache over the given archive and fetcher.
    pub fn new(archive: Archive, fetcher: Arc<Fetcher>) -> Self {
        Cache {
            archive,
            fetcher,
            memory: Mutex::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// The underlying fetcher, exposed so the Scraper can update the
    /// consensus-discovered endpoint pool (§4.4's `Client` mode) without the
    /// Cache needing to know anything about consensus parsing itself.
    pub fn fetcher(&self) -> &Arc<Fetcher> {
        &self.fetcher
    }

    /// Clear the in-memory tier. Called between crawl cycles (§3's
    /// "Lifetimes": "The memory cache is cleared between cycles").
    pub fn clear_memory(&self) {
        self.memory.lock().expect("lock poisoned").clear();
    }

    fn memory_get(&self, key: &Key) -> Option<Arc<Vec<u8>>> {
        self.memory.lock().expect("lock poisoned").get(key).cloned()
    }

    fn memory_put(&self, key: Key, value: Arc<Vec<u8>>) {
        self.memory.lock().expect("lock poisoned").insert(key, value);
    }

    /// Fetch the current consensus of the given flavor through the cache.
    ///
    /// Consensuses are not digest-keyed by the caller (there is exactly one
    /// "current" consensus per flavor), so the memory/inflight key is
    /// synthesized from the flavor and `valid_after`.
    pub async fn consensus(
        &self,
        flavor: ConsensusFlavor,
        valid_after: OffsetDateTime,
    ) -> Option<Arc<Vec<u8>>> {
        let kind = match flavor {
            ConsensusFlavor::Ns => DocKind::RelayConsensusNs,
            ConsensusFlavor::Microdesc => DocKind::RelayConsensusMicrodesc,
        };
        let key = Key {
            kind,
            digest: valid_after.unix_timestamp().to_string(),
        };
        let meta = match flavor {
            ConsensusFlavor::Ns => PathMeta::ConsensusNs { valid_after },
            ConsensusFlavor::Microdesc => PathMeta::ConsensusMicrodesc { valid_after },
        };
        self.get_or_fetch(key, meta, move |fetcher| {
            Box::pin(async move { fetcher.consensus(flavor).await })
        })
        .await
    }

    /// Fetch a vote through the cache, resolving the `"*"` digest wildcard
    /// against the archive only (the Fetcher has no equivalent of a
    /// filesystem glob; a wildcard vote request always means "whatever is
    /// already archived").
    pub async fn vote(
        &self,
        v3ident: &str,
        digest: &str,
        valid_after: OffsetDateTime,
    ) -> Option<Arc<Vec<u8>>> {
        let key = Key {
            kind: DocKind::Vote,
            digest: format!("{v3ident}:{digest}:{}", valid_after.unix_timestamp()),
        };
        if let Some(hit) = self.memory_get(&key) {
            trace!(?key, "vote memory hit");
            return Some(hit);
        }
        if digest == "*" {
            let raw = self
                .archive
                .get_vote(valid_after, v3ident, "*")
                .await
                .ok()
                .flatten()?;
            let arc = Arc::new(raw);
            self.memory_put(key, arc.clone());
            return Some(arc);
        }
        let meta = PathMeta::Vote {
            valid_after,
            v3ident: v3ident.to_string(),
            digest: digest.to_string(),
        };
        let digest_owned = digest.to_string();
        self.get_or_fetch(key, meta, move |fetcher| {
            let digest = digest_owned.clone();
            Box::pin(async move { fetcher.vote(&digest).await })
        })
        .await
    }

    /// Fetch `authority`'s own current vote directly from its endpoint
    /// (§4.6's "enumerating authorities directly" initial mode), rather than
    /// through the digest-keyed [`vote`](Self::vote) wildcard, which never
    /// reaches the Fetcher.
    ///
    /// The digest isn't known until the vote is in hand, so this can't reuse
    /// [`get_or_fetch`](Self::get_or_fetch)'s fixed-`PathMeta` contract: a
    /// network fetch here computes the vote's real digest from its signed
    /// portion and archives/memoizes under that digest, exactly as a
    /// digest-keyed fetch would. Unlike `get_or_fetch`, concurrent calls for
    /// the same authority don't coalesce onto one inflight future — the
    /// Scraper only calls this once per authority per cycle, so the
    /// duplicate-fetch risk that would justify the extra bookkeeping doesn't
    /// arise here.
    pub async fn own_vote(
        &self,
        authority: &Authority,
        valid_after: OffsetDateTime,
    ) -> Option<Arc<Vec<u8>>> {
        let key = Key {
            kind: DocKind::Vote,
            digest: format!("{}:own:{}", authority.v3ident, valid_after.unix_timestamp()),
        };
        if let Some(hit) = self.memory_get(&key) {
            trace!(?key, "own vote memory hit");
            return Some(hit);
        }
        if let Ok(Some(raw)) = self.archive.get_vote(valid_after, authority.v3ident, "*").await {
            let arc = Arc::new(raw);
            self.memory_put(key, arc.clone());
            return Some(arc);
        }

        let raw = self.fetcher.vote_from(authority).await?;
        let digest = crate::digest::vote_digest(&raw)?;
        let meta = PathMeta::Vote {
            valid_after,
            v3ident: authority.v3ident.to_string(),
            digest: digest.clone(),
        };
        let doc = crate::doc::Document {
            kind: DocKind::Vote,
            raw: raw.clone(),
            time: valid_after,
            digest: digest.clone(),
            refs: vec![],
        };
        let _ = self.archive.store(&doc, &meta).await;
        let arc = Arc::new(raw);
        self.memory_put(key, arc.clone());
        Some(arc)
    }

    /// Fetch server descriptors through the cache, partitioning `digests`
    /// across memory, archive, and fetcher tiers (§4.5's multi-digest rule).
    pub async fn server_descriptors(
        &self,
        digests: &[String],
        published_hint: OffsetDateTime,
    ) -> Vec<Arc<Vec<u8>>> {
        self.multi_get(
            DocKind::RelayServerDescriptor,
            digests,
            published_hint,
            |fetcher, missing| {
                let missing = missing.to_vec();
                Box::pin(async move { fetcher.server_descriptors(&missing).await })
            },
        )
        .await
    }

    /// Fetch extra-info descriptors through the cache.
    pub async fn extra_info_descriptors(
        &self,
        digests: &[String],
        published_hint: OffsetDateTime,
    ) -> Vec<Arc<Vec<u8>>> {
        self.multi_get(
            DocKind::RelayExtraInfoDescriptor,
            digests,
            published_hint,
            |fetcher, missing| {
                let missing = missing.to_vec();
                Box::pin(async move { fetcher.extra_info_descriptors(&missing).await })
            },
        )
        .await
    }

    /// Fetch microdescriptors through the cache, keyed by hex SHA-256 hash
    /// (as stored in the archive and memory tiers; the Fetcher re-encodes to
    /// base-64 only for the wire request).
    pub async fn microdescriptors(
        &self,
        hashes: &[String],
        valid_after: OffsetDateTime,
    ) -> Vec<Arc<Vec<u8>>> {
        self.multi_get(
            DocKind::RelayMicrodescriptor,
            hashes,
            valid_after,
            |fetcher, missing| {
                let missing = missing.to_vec();
                Box::pin(async move { fetcher.microdescriptors(&missing).await })
            },
        )
        .await
    }

    /// Single-document read-through: memory, then archive, then fetcher,
    /// storing and memoizing on a fetch (§4.5, steps 1-3). Concurrent calls
    /// for the same `key` coalesce onto one inflight future (§4.5's
    /// invariant, §9's design note).
    async fn get_or_fetch(
        &self,
        key: Key,
        meta: PathMeta,
        fetch: impl FnOnce(Arc<Fetcher>) -> Pin<Box<dyn Future<Output = Option<Vec<u8>>> + Send>>
            + Send
            + 'static,
    ) -> Option<Arc<Vec<u8>>> {
        if let Some(hit) = self.memory_get(&key) {
            trace!(?key, "memory hit");
            return hit.into();
        }

        let shared = {
            let mut inflight = self.inflight.lock().expect("lock poisoned");
            if let Some(existing) = inflight.get(&key) {
                existing.clone()
            } else {
                let archive = self.archive.clone();
                let fetcher = self.fetcher.clone();
                let meta_for_archive = meta.clone();
                let meta_for_store = meta.clone();
                let fut: Pin<Box<dyn Future<Output = Option<Arc<Vec<u8>>>> + Send>> =
                    Box::pin(async move {
                        if let Ok(Some(raw)) = archive.get_raw(&meta_for_archive).await {
                            return Some(Arc::new(raw));
                        }
                        let raw = fetch(fetcher).await?;
                        let doc = crate::doc::Document {
                            kind: meta_for_store.kind_hint(),
                            raw: raw.clone(),
                            time: OffsetDateTime::UNIX_EPOCH,
                            digest: String::new(),
                            refs: vec![],
                        };
                        let _ = archive.store(&doc, &meta_for_store).await;
                        Some(Arc::new(raw))
                    });
                let shared = fut.shared();
                inflight.insert(key.clone(), shared.clone());
                shared
            }
        };

        let result = shared.await;
        self.inflight.lock().expect("lock poisoned").remove(&key);
        if let Some(ref value) = result {
            self.memory_put(key, value.clone());
        }
        result
    }

    async fn multi_get(
        &self,
        kind: DocKind,
        digests: &[String],
        time_hint: OffsetDateTime,
        fetch_missing: impl FnOnce(
            Arc<Fetcher>,
            &[String],
        ) -> Pin<Box<dyn Future<Output = Vec<Vec<u8>>> + Send>>,
    ) -> Vec<Arc<Vec<u8>>> {
        let mut found = Vec::new();
        let mut still_missing = Vec::new();

        for digest in digests {
            let key = Key {
                kind,
                digest: digest.clone(),
            };
            match self.memory_get(&key) {
                Some(v) => found.push(v),
                None => still_missing.push(digest.clone()),
            }
        }
        if still_missing.is_empty() {
            return found;
        }

        let mut from_archive = Vec::new();
        let mut remaining = Vec::new();
        for digest in still_missing {
            let meta = self.descriptor_meta(kind, &digest, time_hint);
            match self.archive.get_raw(&meta).await {
                Ok(Some(raw)) => {
                    let key = Key {
                        kind,
                        digest: digest.clone(),
                    };
                    let arc = Arc::new(raw);
                    self.memory_put(key, arc.clone());
                    from_archive.push(arc);
                }
                _ => remaining.push(digest),
            }
        }
        found.extend(from_archive);
        if remaining.is_empty() {
            return found;
        }

        let fetched = fetch_missing(self.fetcher.clone(), &remaining).await;
        for raw in fetched {
            let digest = if kind == DocKind::RelayMicrodescriptor {
                crate::digest::sha256_hex_lower(&raw)
            } else {
                crate::digest::sha1_hex_lower(&raw)
            };
            let meta = self.descriptor_meta(kind, &digest, time_hint);
            let doc = crate::doc::Document {
                kind,
                raw: raw.clone(),
                time: time_hint,
                digest: digest.clone(),
                refs: vec![],
            };
            let _ = self.archive.store(&doc, &meta).await;
            let arc = Arc::new(raw);
            self.memory_put(
                Key {
                    kind,
                    digest: digest.clone(),
                },
                arc.clone(),
            );
            found.push(arc);
        }
        found
    }

    fn descriptor_meta(&self, kind: DocKind, digest: &str, published: OffsetDateTime) -> PathMeta {
        if kind == DocKind::RelayMicrodescriptor {
            PathMeta::Microdescriptor {
                valid_after: published,
                digest: digest.to_string(),
            }
        } else {
            PathMeta::Descriptor {
                kind,
                published,
                digest: digest.to_string(),
            }
        }
    }
}

impl PathMeta {
    /// A best-effort [`DocKind`] to use when storing a document whose exact
    /// kind isn't separately tracked by the caller (consensus/vote fetches
    /// go through [`Cache::get_or_fetch`], which only has a [`PathMeta`] to
    /// work with).
    fn kind_hint(&self) -> DocKind {
        match self {
            PathMeta::Descriptor { kind, .. } => *kind,
            PathMeta::ConsensusNs { .. } => DocKind::RelayConsensusNs,
            PathMeta::ConsensusMicrodesc { .. } => DocKind::RelayConsensusMicrodesc,
            PathMeta::Microdescriptor { .. } => DocKind::RelayMicrodescriptor,
            PathMeta::Vote { .. } => DocKind::Vote,
            PathMeta::DetachedSignature { .. } => DocKind::DetachedSignature,
            PathMeta::BridgeStatus { .. } => DocKind::BridgeStatus,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::{ArchiveConfig, FetchConfig};

    fn test_cache(dir: &tempfile::TempDir) -> Cache {
        let archive = Archive::new(&ArchiveConfig::new(dir.path()));
        let fetcher = Arc::new(Fetcher::new(FetchConfig::default()));
        Cache::new(archive, fetcher)
    }

    #[tokio::test]
    async fn memory_miss_falls_through_to_archive_miss_then_none() {
        let dir = tempfile::tempdir().unwrap();
        let cache = test_cache(&dir);
        // With no fetcher reachable in a unit test environment, a
        // consensus request for a never-archived time should resolve to
        // None rather than panicking.
        let valid_after = time::macros::datetime!(2018-11-19 15:00:00 UTC);
        let result = cache.consensus(ConsensusFlavor::Ns, valid_after).await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn archive_hit_is_served_without_fetcher() {
        let dir = tempfile::tempdir().unwrap();
        let cache = test_cache(&dir);
        let valid_after = time::macros::datetime!(2018-11-19 15:00:00 UTC);
        let meta = PathMeta::ConsensusNs { valid_after };
        let doc = crate::doc::Document {
            kind: DocKind::RelayConsensusNs,
            raw: b"network-status-version 3\n".to_vec(),
            time: valid_after,
            digest: String::new(),
            refs: vec![],
        };
        cache.archive.store(&doc, &meta).await.unwrap();

        let result = cache.consensus(ConsensusFlavor::Ns, valid_after).await;
        assert_eq!(result.unwrap().as_slice(), doc.raw.as_slice());
    }

    #[tokio::test]
    async fn memoizes_after_archive_hit() {
        let dir = tempfile::tempdir().unwrap();
        let cache = test_cache(&dir);
        let valid_after = time::macros::datetime!(2018-11-19 15:00:00 UTC);
        let meta = PathMeta::ConsensusNs { valid_after };
        let doc = crate::doc::Document {
            kind: DocKind::RelayConsensusNs,
            raw: b"network-status-version 3\n".to_vec(),
            time: valid_after,
            digest: String::new(),
            refs: vec![],
        };
        cache.archive.store(&doc, &meta).await.unwrap();

        let first = cache.consensus(ConsensusFlavor::Ns, valid_after).await;
        let key = Key {
            kind: DocKind::RelayConsensusNs,
            digest: valid_after.unix_timestamp().to_string(),
        };
        assert!(cache.memory_get(&key).is_some());
        let second = cache.consensus(ConsensusFlavor::Ns, valid_after).await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn own_vote_is_served_from_archive_without_touching_the_network() {
        let dir = tempfile::tempdir().unwrap();
        let cache = test_cache(&dir);
        let authority = &crate::authority::default_authorities()[0];
        let valid_after = time::macros::datetime!(2018-11-19 15:00:00 UTC);
        let meta = PathMeta::Vote {
            valid_after,
            v3ident: authority.v3ident.to_string(),
            digest: "ABCD".to_string(),
        };
        let doc = crate::doc::Document {
            kind: DocKind::Vote,
            raw: b"network-status-version 3\nvote-status vote\n".to_vec(),
            time: valid_after,
            digest: "ABCD".to_string(),
            refs: vec![],
        };
        cache.archive.store(&doc, &meta).await.unwrap();

        let result = cache.own_vote(authority, valid_after).await;
        assert_eq!(result.unwrap().as_slice(), doc.raw.as_slice());
    }
}
