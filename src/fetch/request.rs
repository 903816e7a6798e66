//! Directory-protocol query-path construction and digest batching (§4.4).
//!
//! Grounded on `bushel.downloader.resource_url` for the path shapes and on
//! `tor_dirclient::request::ConsensusRequest`/`Requestable` for expressing
//! each request kind as a small typed struct rather than formatting ad hoc
//! strings at call sites.

use crate::config::{MAX_FINGERPRINTS, MAX_MICRODESCRIPTOR_HASHES};

/// Split `digests` into chunks of at most `batch_size`, preserving order.
///
/// Used to implement §4.4's batching rule: `ceil(N / MAX_FINGERPRINTS)`
/// requests for a set of N digests.
pub fn batches<'a, T>(items: &'a [T], batch_size: usize) -> impl Iterator<Item = &'a [T]> {
    items.chunks(batch_size.max(1))
}

/// Split digests for server/extra-info descriptor requests, batching at
/// [`MAX_FINGERPRINTS`].
pub fn descriptor_batches(digests: &[String]) -> impl Iterator<Item = &[String]> {
    batches(digests, MAX_FINGERPRINTS)
}

/// Split hashes for microdescriptor requests, batching at
/// [`MAX_MICRODESCRIPTOR_HASHES`].
pub fn microdescriptor_batches(hashes: &[String]) -> impl Iterator<Item = &[String]> {
    batches(hashes, MAX_MICRODESCRIPTOR_HASHES)
}

/// Which consensus flavor to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsensusFlavor {
    /// The `ns` (classic router-status-entry) consensus.
    Ns,
    /// The `microdesc` consensus.
    Microdesc,
}

/// Build the query path for `GET /tor/status-vote/current/consensus[-microdesc]`.
pub fn consensus_path(flavor: ConsensusFlavor) -> String {
    match flavor {
        ConsensusFlavor::Ns => "/tor/status-vote/current/consensus".to_string(),
        ConsensusFlavor::Microdesc => "/tor/status-vote/current/consensus-microdesc".to_string(),
    }
}

/// Build the query path for a vote, by digest or `"authority"` for an
/// authority's own current vote.
pub fn vote_path(digest_or_authority: &str) -> String {
    if digest_or_authority == "authority" {
        "/tor/status-vote/current/authority".to_string()
    } else {
        format!("/tor/status-vote/current/d/{digest_or_authority}")
    }
}

/// Build `/tor/server/d/<D1>+<D2>+...`, sorting digests lexicographically
/// (§4.4, §8 scenario 5).
pub fn server_descriptors_path(digests: &[String]) -> String {
    joined_path("/tor/server/d/", digests, "+")
}

/// Build `/tor/extra/d/<D1>+<D2>+...`.
pub fn extra_info_path(digests: &[String]) -> String {
    joined_path("/tor/extra/d/", digests, "+")
}

/// Build `/tor/micro/d/<H1>-<H2>-...` (hyphen-separated base-64 hashes).
///
/// `hashes` are the lower-case hex SHA-256 digests used everywhere else in
/// this crate (§3); this is the one boundary that re-encodes them as
/// unpadded base-64 for the wire, per dir-spec.txt's microdescriptor query
/// format. A hash that somehow isn't valid hex is passed through verbatim
/// rather than dropped, so a caller's bug surfaces as a failed request
/// instead of a silently shrunk batch.
pub fn microdescriptors_path(hashes: &[String]) -> String {
    let encoded: Vec<String> = hashes
        .iter()
        .map(|h| crate::digest::hex_to_base64_unpadded(h).unwrap_or_else(|| h.clone()))
        .collect();
    joined_path("/tor/micro/d/", &encoded, "-")
}

fn joined_path(prefix: &str, items: &[String], sep: &str) -> String {
    let mut sorted: Vec<&str> = items.iter().map(|s| s.as_str()).collect();
    sorted.sort_unstable();
    format!("{prefix}{}", sorted.join(sep))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn scenario_5_server_descriptors_are_sorted() {
        let digests = vec!["B389".to_string(), "A94A".to_string()];
        assert_eq!(server_descriptors_path(&digests), "/tor/server/d/A94A+B389");
    }

    #[test]
    fn consensus_paths() {
        assert_eq!(
            consensus_path(ConsensusFlavor::Ns),
            "/tor/status-vote/current/consensus"
        );
        assert_eq!(
            consensus_path(ConsensusFlavor::Microdesc),
            "/tor/status-vote/current/consensus-microdesc"
        );
    }

    #[test]
    fn vote_paths() {
        assert_eq!(vote_path("ABCD"), "/tor/status-vote/current/d/ABCD");
        assert_eq!(
            vote_path("authority"),
            "/tor/status-vote/current/authority"
        );
    }

    #[test]
    fn batching_splits_at_max_fingerprints() {
        let digests: Vec<String> = (0..250).map(|i| format!("{i:040}")).collect();
        let batched: Vec<_> = descriptor_batches(&digests).collect();
        assert_eq!(batched.len(), 3); // ceil(250 / 96) == 3
        assert_eq!(batched[0].len(), 96);
        assert_eq!(batched[2].len(), 250 - 96 * 2);
    }

    #[test]
    fn empty_batches_yields_nothing() {
        let digests: Vec<String> = vec![];
        assert_eq!(descriptor_batches(&digests).count(), 0);
    }

    #[test]
    fn microdescriptors_path_reencodes_hex_as_base64() {
        // sha256("abc") as hex, from `crate::digest`'s known test vector.
        let hex_digest =
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad".to_string();
        let path = microdescriptors_path(&[hex_digest]);
        assert!(path.starts_with("/tor/micro/d/"));
        assert!(!path.contains("ba7816bf"), "path should carry base-64, not hex: {path}");
        assert!(!path.contains('='), "microdescriptor hashes are unpadded base-64");
    }

    #[test]
    fn microdescriptors_path_passes_through_invalid_hex_unchanged() {
        let path = microdescriptors_path(&["not-hex".to_string()]);
        assert_eq!(path, "/tor/micro/d/not-hex");
    }
}
