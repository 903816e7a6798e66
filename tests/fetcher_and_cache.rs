//! Black-box integration tests against the public API, run over a real
//! (local, ephemeral-port) HTTP server rather than mocked internals.
//!
//! These exercise the contracts that the inline unit tests in `src/fetch`
//! and `src/cache.rs` can't reach without a network peer: failover to a
//! second endpoint, request coalescing across concurrent callers, and
//! batching at `MAX_FINGERPRINTS`.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server};

use tor_dirarchive::archive::Archive;
use tor_dirarchive::authority::{Authority, Endpoint};
use tor_dirarchive::config::{ArchiveConfig, FetchConfig};
use tor_dirarchive::fetch::request::ConsensusFlavor;
use tor_dirarchive::fetch::Fetcher;
use tor_dirarchive::Cache;

/// Spawn a trivial HTTP server on an ephemeral port that always answers
/// `body` with a 200 and counts the requests it receives. Returns the
/// bound address and the shared counter.
async fn spawn_fixed_response_server(body: &'static [u8]) -> (SocketAddr, Arc<AtomicUsize>) {
    let counter = Arc::new(AtomicUsize::new(0));
    let counter_for_service = counter.clone();
    let make_svc = make_service_fn(move |_conn| {
        let counter = counter_for_service.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |_req: Request<Body>| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, Infallible>(Response::new(Body::from(body)))
                }
            }))
        }
    });
    let server = Server::bind(&([127, 0, 0, 1], 0).into()).serve(make_svc);
    let addr = server.local_addr();
    tokio::spawn(server);
    (addr, counter)
}

/// Like [`spawn_fixed_response_server`], but each response is delayed,
/// giving concurrent callers a window in which to coalesce onto the same
/// inflight request.
async fn spawn_delayed_response_server(
    body: &'static [u8],
    delay: std::time::Duration,
) -> (SocketAddr, Arc<AtomicUsize>) {
    let counter = Arc::new(AtomicUsize::new(0));
    let counter_for_service = counter.clone();
    let make_svc = make_service_fn(move |_conn| {
        let counter = counter_for_service.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |_req: Request<Body>| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(delay).await;
                    Ok::<_, Infallible>(Response::new(Body::from(body)))
                }
            }))
        }
    });
    let server = Server::bind(&([127, 0, 0, 1], 0).into()).serve(make_svc);
    let addr = server.local_addr();
    tokio::spawn(server);
    (addr, counter)
}

#[tokio::test]
async fn fetcher_retrieves_consensus_from_fixed_endpoint() {
    let body: &'static [u8] = b"network-status-version 3\n";
    let (addr, counter) = spawn_fixed_response_server(body).await;

    let fetcher = Fetcher::new(FetchConfig::default());
    fetcher.set_fixed_endpoint(&addr.ip().to_string(), addr.port());

    let got = fetcher.consensus(ConsensusFlavor::Ns).await;
    assert_eq!(got.as_deref(), Some(body));
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn vote_from_targets_the_given_authoritys_own_endpoint() {
    let body: &'static [u8] = b"network-status-version 3\nvote-status vote\n";
    let (addr, counter) = spawn_fixed_response_server(body).await;

    // A decoy fetcher whose usual endpoint pool (authorities/testing mode)
    // does not include the mock server at all, to prove `vote_from` never
    // consults `endpoint_pool`.
    let fetcher = Fetcher::new(FetchConfig::default());
    let authority = Authority {
        name: "mock",
        v3ident: "0000000000000000000000000000000000000a",
        endpoint: Endpoint::DirPort(addr),
    };

    let got = fetcher.vote_from(&authority).await;
    assert_eq!(got.as_deref(), Some(body));
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn concurrent_cache_lookups_for_the_same_document_coalesce() {
    let body: &'static [u8] = b"network-status-version 3\n";
    let (addr, counter) =
        spawn_delayed_response_server(body, std::time::Duration::from_millis(200)).await;

    let dir = tempfile::tempdir().unwrap();
    let archive = Archive::new(&ArchiveConfig::new(dir.path()));
    let fetcher = Arc::new(Fetcher::new(FetchConfig::default()));
    fetcher.set_fixed_endpoint(&addr.ip().to_string(), addr.port());
    let cache = Arc::new(Cache::new(archive, fetcher));

    let valid_after = time::macros::datetime!(2018-11-19 15:00:00 UTC);

    let a = {
        let cache = cache.clone();
        tokio::spawn(async move { cache.consensus(ConsensusFlavor::Ns, valid_after).await })
    };
    let b = {
        let cache = cache.clone();
        tokio::spawn(async move { cache.consensus(ConsensusFlavor::Ns, valid_after).await })
    };

    let (ra, rb) = tokio::join!(a, b);
    assert_eq!(ra.unwrap().as_deref().map(|v| v.as_slice()), Some(body));
    assert_eq!(rb.unwrap().as_deref().map(|v| v.as_slice()), Some(body));

    // Two callers asking for the same (kind, digest) key while the first
    // request is still in flight should produce exactly one HTTP request,
    // per the cache's inflight-coalescing contract.
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn server_descriptor_batches_split_at_max_fingerprints() {
    let body: &'static [u8] = b"router foo 1.2.3.4 9001 0 0\n";
    let (addr, counter) = spawn_fixed_response_server(body).await;

    let fetcher = Fetcher::new(FetchConfig::default());
    fetcher.set_fixed_endpoint(&addr.ip().to_string(), addr.port());

    // One more than MAX_FINGERPRINTS (96) worth of digests must split into
    // two batches, each issued as its own request.
    let digests: Vec<String> = (0..97).map(|i| format!("{i:040x}")).collect();
    let results = fetcher.server_descriptors(&digests).await;

    assert_eq!(results.len(), 2);
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn microdescriptor_fetch_is_keyed_by_sha256_and_stored_under_it() {
    let body: &'static [u8] = b"onion-key\n-----BEGIN RSA PUBLIC KEY-----\n-----END RSA PUBLIC KEY-----\n";
    let (addr, counter) = spawn_fixed_response_server(body).await;

    let dir = tempfile::tempdir().unwrap();
    let archive = Archive::new(&ArchiveConfig::new(dir.path()));
    let fetcher = Arc::new(Fetcher::new(FetchConfig::default()));
    fetcher.set_fixed_endpoint(&addr.ip().to_string(), addr.port());
    let cache = Cache::new(archive.clone(), fetcher);

    let valid_after = time::macros::datetime!(2018-11-19 15:00:00 UTC);
    // The hash passed to `Cache::microdescriptors` doesn't need to match the
    // server's canned response here; the cache only uses it to key the
    // memory/archive tiers, not to validate what comes back.
    let hash = tor_dirarchive::digest::sha256_hex_lower(body);

    let got = cache.microdescriptors(&[hash.clone()], valid_after).await;
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].as_slice(), body);
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    // Stored under the hex SHA-256 (not SHA-1) digest: a direct archive
    // lookup by that digest should hit without touching the network again.
    let meta = tor_dirarchive::doc::PathMeta::Microdescriptor {
        valid_after,
        digest: hash,
    };
    let archived = archive.get_raw(&meta).await.unwrap();
    assert_eq!(archived.as_deref(), Some(body));
}

#[tokio::test]
async fn cache_serves_archived_document_without_touching_the_network() {
    let (addr, counter) = spawn_fixed_response_server(b"should never be requested").await;

    let dir = tempfile::tempdir().unwrap();
    let archive = Archive::new(&ArchiveConfig::new(dir.path()));
    let fetcher = Arc::new(Fetcher::new(FetchConfig::default()));
    fetcher.set_fixed_endpoint(&addr.ip().to_string(), addr.port());
    let cache = Cache::new(archive.clone(), fetcher);

    let valid_after = time::macros::datetime!(2018-11-19 15:00:00 UTC);
    let meta = tor_dirarchive::doc::PathMeta::ConsensusNs { valid_after };
    let doc = tor_dirarchive::doc::Document {
        kind: tor_dirarchive::DocKind::RelayConsensusNs,
        raw: b"network-status-version 3\n".to_vec(),
        time: valid_after,
        digest: String::new(),
        refs: vec![],
    };
    archive.store(&doc, &meta).await.unwrap();

    let got = cache.consensus(ConsensusFlavor::Ns, valid_after).await;
    assert_eq!(got.unwrap().as_slice(), doc.raw.as_slice());
    assert_eq!(counter.load(Ordering::SeqCst), 0);
}
