//! The Scraper component (§4.6): the top-level orchestrator that discovers
//! the current consensuses and votes, then fans out through the Cache to
//! every descriptor and microdescriptor they reference.
//!
//! Grounded on `bushel.scraper.DirectoryScraper._recurse_consensus_references`
//! for the fan-out shape (collect wanted digests, bulk-request, then walk
//! the results for a further round of references) and on
//! `tor_dirmgr`'s separation of "what a cycle does" (`bootstrap.rs`/
//! `state.rs`) from the lower-level Cache/Fetcher/Archive plumbing.

use std::collections::HashSet;
use std::sync::Arc;

use base64ct::{Base64, Encoding};
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::authority::default_authorities;
use crate::cache::Cache;
use crate::fetch::request::ConsensusFlavor;
use crate::fetch::FetchEndpoint;
use crate::parse::{self, Forgiveness};

/// The result of one crawl cycle: everything the Scraper managed to
/// resolve, by category.
#[derive(Debug, Default)]
pub struct CycleReport {
    /// Whether the `ns`-flavored consensus was obtained.
    pub ns_consensus: bool,
    /// Whether the `microdesc`-flavored consensus was obtained.
    pub microdesc_consensus: bool,
    /// How many votes were obtained, out of how many authorities queried.
    pub votes: (usize, usize),
    /// How many server descriptors were resolved, out of how many were
    /// referenced.
    pub server_descriptors: (usize, usize),
    /// How many extra-info descriptors were resolved, out of how many were
    /// referenced.
    pub extra_info_descriptors: (usize, usize),
    /// How many microdescriptors were resolved, out of how many were
    /// referenced.
    pub microdescriptors: (usize, usize),
}

/// The orchestrator driving one or more crawl cycles.
pub struct Scraper {
    cache: Arc<Cache>,
}

impl Scraper {
    /// Build a scraper over the given cache.
    pub fn new(cache: Arc<Cache>) -> Self {
        Scraper { cache }
    }

    /// Run one complete crawl cycle (§4.6's six steps), returning a summary
    /// of what was resolved. `valid_after` pins the cycle to a specific
    /// consensus period; in production this is normally "now", rounded to
    /// the nearest period boundary by the caller.
    pub async fn run_cycle(&self, valid_after: OffsetDateTime) -> CycleReport {
        let mut report = CycleReport::default();

        let ns_consensus = self.cache.consensus(ConsensusFlavor::Ns, valid_after).await;
        report.ns_consensus = ns_consensus.is_some();

        // Populate the Fetcher's `Client`-mode endpoint pool from the
        // directory caches this consensus names, per §4.4.
        if let Some(raw) = &ns_consensus {
            let caches = extract_directory_caches(raw);
            if !caches.is_empty() {
                self.cache.fetcher().set_discovered_caches(caches);
            }
        }

        let microdesc_consensus = self
            .cache
            .consensus(ConsensusFlavor::Microdesc, valid_after)
            .await;
        report.microdesc_consensus = microdesc_consensus.is_some();

        // §4.6 step 2's "initial mode": enumerate authorities directly and
        // ask each one for its own current vote, rather than following
        // vote-digest references out of the consensus (no consensus flavor
        // this crate fetches carries a `dir-source`/vote-digest pointer to
        // follow; see DESIGN.md's Open Question on this).
        let authorities = default_authorities();
        let mut votes_obtained = 0;
        let mut votes: Vec<Arc<Vec<u8>>> = Vec::new();
        for authority in &authorities {
            let vote = self.cache.own_vote(authority, valid_after).await;
            if let Some(raw) = vote {
                votes_obtained += 1;
                votes.push(raw);
            }
        }
        report.votes = (votes_obtained, authorities.len());

        // Union referenced server-descriptor digests across the consensus
        // and every vote obtained above (spec's "union the set of referenced
        // server-descriptor digests across all statuses, deduplicated").
        let mut server_digests = ns_consensus
            .as_ref()
            .map(|raw| extract_server_descriptor_digests(raw))
            .unwrap_or_default();
        for vote in &votes {
            server_digests.extend(extract_server_descriptor_digests(vote));
        }
        let wanted_server = server_digests.len();
        let server_descriptors = if server_digests.is_empty() {
            Vec::new()
        } else {
            let digests: Vec<String> = server_digests.into_iter().collect();
            self.cache
                .server_descriptors(&digests, valid_after)
                .await
        };
        report.server_descriptors = (server_descriptors.len(), wanted_server);

        let extra_info_digests: HashSet<String> = server_descriptors
            .iter()
            .flat_map(|raw| extract_extra_info_digest(raw))
            .collect();
        let wanted_extra_info = extra_info_digests.len();
        let extra_info_descriptors = if extra_info_digests.is_empty() {
            Vec::new()
        } else {
            let digests: Vec<String> = extra_info_digests.into_iter().collect();
            self.cache
                .extra_info_descriptors(&digests, valid_after)
                .await
        };
        report.extra_info_descriptors = (extra_info_descriptors.len(), wanted_extra_info);

        let microdesc_hashes = microdesc_consensus
            .as_ref()
            .map(|raw| extract_microdescriptor_hashes(raw))
            .unwrap_or_default();
        let wanted_micro = microdesc_hashes.len();
        let microdescriptors = if microdesc_hashes.is_empty() {
            Vec::new()
        } else {
            let hashes: Vec<String> = microdesc_hashes.into_iter().collect();
            self.cache.microdescriptors(&hashes, valid_after).await
        };
        report.microdescriptors = (microdescriptors.len(), wanted_micro);

        info!(
            ns = report.ns_consensus,
            microdesc = report.microdesc_consensus,
            votes = ?report.votes,
            server_descriptors = ?report.server_descriptors,
            extra_info_descriptors = ?report.extra_info_descriptors,
            microdescriptors = ?report.microdescriptors,
            "crawl cycle complete"
        );
        report
    }
}

/// Decode a dir-spec base-64 identity/digest field (no padding) to lower-hex.
fn base64_field_to_hex(field: &str) -> Option<String> {
    let mut padded = field.to_string();
    while padded.len() % 4 != 0 {
        padded.push('=');
    }
    Base64::decode_vec(&padded).ok().map(hex::encode)
}

/// Extract server-descriptor digests from `r` lines in an `ns`-flavored
/// consensus (dir-spec.txt §3.4.1: `r nickname identity digest
/// publication IP ORPort DirPort`, digest in field 2, base-64-encoded).
fn extract_server_descriptor_digests(raw: &[u8]) -> HashSet<String> {
    extract_from_items(raw, "r", 2, base64_field_to_hex)
}

/// Extract microdescriptor hashes from `m` lines in a `microdesc`-flavored
/// consensus (dir-spec.txt §3.4.1 microdesc appendix: `m base64-hash`,
/// base-64 of a SHA-256 digest).
fn extract_microdescriptor_hashes(raw: &[u8]) -> HashSet<String> {
    extract_from_items(raw, "m", 0, base64_field_to_hex)
}

/// Extract the directory caches named by an `ns`-flavored consensus's `r`/`s`
/// line pairs: relays carrying the `V2Dir` flag with a nonzero `DirPort`
/// (dir-spec.txt §3.4.1). Used to populate `Fetcher`'s `Client`-mode
/// endpoint pool (§4.4).
///
/// A relay's `V2Dir` flag is also used as this crate's proxy for "caches
/// extra-info" (§4.4), since a consensus carries no dedicated flag for that
/// and the `bushel` original derives it the same way from the cache's
/// reachability rather than inspecting its descriptor.
fn extract_directory_caches(raw: &[u8]) -> Vec<FetchEndpoint> {
    let text = match std::str::from_utf8(raw) {
        Ok(t) => t,
        Err(_) => return Vec::new(),
    };
    let items = match parse::items(text, Forgiveness::lenient()) {
        Ok(items) => items,
        Err(e) => {
            warn!(error = %e, "failed to parse consensus for cache discovery");
            return Vec::new();
        }
    };

    let mut caches = Vec::new();
    let mut pending: Option<(String, String, u16)> = None;
    for item in &items {
        match item.keyword.as_str() {
            "r" => {
                pending = None;
                // `r nickname identity digest publication-date publication-time IP ORPort DirPort`
                if let (Some(nickname), Some(ip), Some(dirport_str)) =
                    (item.arg(0), item.arg(5), item.arg(7))
                {
                    if let Ok(dirport) = dirport_str.parse::<u16>() {
                        if dirport != 0 {
                            pending = Some((nickname.to_string(), ip.to_string(), dirport));
                        }
                    }
                }
            }
            "s" => {
                if let Some((label, host, port)) = pending.take() {
                    if item.arguments.iter().any(|flag| flag == "V2Dir") {
                        caches.push(FetchEndpoint {
                            label,
                            host,
                            port,
                            supports_extra_info: true,
                        });
                    }
                }
            }
            _ => {}
        }
    }
    caches
}

/// Extract the extra-info digest from a server descriptor's
/// `extra-info-digest` line (dir-spec.txt §2.1.2: first argument is
/// already lower-hex SHA-1).
fn extract_extra_info_digest(raw: &[u8]) -> Option<String> {
    let text = std::str::from_utf8(raw).ok()?;
    let items = parse::items(text, Forgiveness::lenient()).ok()?;
    items
        .iter()
        .find(|i| i.keyword == "extra-info-digest")
        .and_then(|i| i.arg(0))
        .map(|s| s.to_ascii_lowercase())
}

fn extract_from_items(
    raw: &[u8],
    keyword: &str,
    arg_index: usize,
    decode: impl Fn(&str) -> Option<String>,
) -> HashSet<String> {
    let text = match std::str::from_utf8(raw) {
        Ok(t) => t,
        Err(_) => {
            warn!("document was not valid UTF-8; skipping reference extraction");
            return HashSet::new();
        }
    };
    let items = match parse::items(text, Forgiveness::lenient()) {
        Ok(items) => items,
        Err(e) => {
            warn!(error = %e, "failed to parse document for reference extraction");
            return HashSet::new();
        }
    };
    items
        .iter()
        .filter(|i| i.keyword == keyword)
        .filter_map(|i| i.arg(arg_index))
        .filter_map(decode)
        .collect()
}
