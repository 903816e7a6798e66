//! Pure functions mapping `(document kind, metadata)` to an archive-relative
//! path.
//!
//! Every function here is total and deterministic: the same metadata always
//! produces the same path, and no filesystem access occurs. This mirrors the
//! CollecTor file structure protocol's path-building helpers, which this
//! module reproduces bit-exactly (see [`crate::doc::DocKind`] for the closed
//! set of kinds this covers).

use std::fmt;

use time::OffsetDateTime;

/// An error produced by a [`PathFn`](self) when it is asked to build a path
/// from metadata that cannot possibly be valid.
///
/// This is a programming error (§7's `BadArgument`): callers are expected to
/// have already validated digests and fingerprints before reaching here.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// A hex digest or fingerprint did not have the expected length or
    /// contained non-hex characters.
    #[error("bad hex digest {0:?}: expected {1} hex characters")]
    BadHexDigest(String, usize),
}

/// Result alias for this module.
pub type Result<T> = std::result::Result<T, Error>;

/// Validate that `s` is exactly `len` ASCII hex characters.
fn check_hex(s: &str, len: usize) -> Result<()> {
    if s.len() == len && s.bytes().all(|b| b.is_ascii_hexdigit()) {
        Ok(())
    } else {
        Err(Error::BadHexDigest(s.to_owned(), len))
    }
}

/// `relay-descriptors` / `bridge-descriptors` top-level subdirectories, as
/// named in §6's path table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subdirectory {
    /// `relay-descriptors`
    RelayDescriptors,
    /// `bridge-descriptors`
    BridgeDescriptors,
}

impl Subdirectory {
    fn as_str(self) -> &'static str {
        match self {
            Subdirectory::RelayDescriptors => "relay-descriptors",
            Subdirectory::BridgeDescriptors => "bridge-descriptors",
        }
    }
}

impl fmt::Display for Subdirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The marker directory used under a [`Subdirectory`], e.g. `server-descriptor`,
/// `consensus`, `vote`, `statuses`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    /// `server-descriptor`
    ServerDescriptor,
    /// `extra-info`
    ExtraInfo,
    /// `consensus`
    Consensus,
    /// `microdesc`
    Microdesc,
    /// `vote`
    Vote,
    /// `statuses` (bridge statuses; see §9's open question on `statuses` vs
    /// `status` -- this crate fixes `statuses`).
    Statuses,
}

impl Marker {
    fn as_str(self) -> &'static str {
        match self {
            Marker::ServerDescriptor => "server-descriptor",
            Marker::ExtraInfo => "extra-info",
            Marker::Consensus => "consensus",
            Marker::Microdesc => "microdesc",
            Marker::Vote => "vote",
            Marker::Statuses => "statuses",
        }
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build the `YYYY/MM/d0/d1` substructure used under the descriptor-by-digest
/// layout (§6), sharding on the first two hex characters of `digest`.
///
/// `digest` is case-folded to lower-case, per §4.1 ("SHA-1 lower for sharded
/// descriptor paths").
///
/// Corresponds to `collector_521_substructure` in the CollecTor filesystem
/// protocol.
fn descriptor_substructure(published: OffsetDateTime, digest: &str) -> Result<String> {
    check_hex(digest, 40).or_else(|_| check_hex(digest, 64))?;
    let digest = digest.to_ascii_lowercase();
    Ok(format!(
        "{:04}/{:02}/{}/{}",
        published.year(),
        u8::from(published.month()),
        &digest[0..1],
        &digest[1..2],
    ))
}

/// Build a path for a server or extra-info descriptor (relay or bridge).
///
/// ```
/// use time::macros::datetime;
/// use tor_dirarchive::path::{descriptor_path, Subdirectory, Marker};
///
/// let p = descriptor_path(
///     Subdirectory::RelayDescriptors,
///     Marker::ServerDescriptor,
///     datetime!(2018-11-19 15:01:02 UTC),
///     "a94a07b201598d847105ae5fcd5bc3ab10124389",
/// ).unwrap();
/// assert_eq!(p, "relay-descriptors/server-descriptor/2018/11/a/9/a94a07b201598d847105ae5fcd5bc3ab10124389");
/// ```
pub fn descriptor_path(
    subdirectory: Subdirectory,
    marker: Marker,
    published: OffsetDateTime,
    digest: &str,
) -> Result<String> {
    let sub = descriptor_substructure(published, digest)?;
    Ok(format!(
        "{subdirectory}/{marker}/{sub}/{}",
        digest.to_ascii_lowercase()
    ))
}

/// Build the `YYYY-MM-DD-HH-MM-SS` timestamp stem used in consensus and vote
/// filenames.
fn timestamp_stem(t: OffsetDateTime) -> String {
    format!(
        "{:04}-{:02}-{:02}-{:02}-{:02}-{:02}",
        t.year(),
        u8::from(t.month()),
        t.day(),
        t.hour(),
        t.minute(),
        t.second(),
    )
}

/// Build a path for an `ns`-flavored relay consensus.
///
/// ```
/// use time::macros::datetime;
/// use tor_dirarchive::path::consensus_path;
/// let p = consensus_path(datetime!(2018-11-19 15:00:00 UTC));
/// assert_eq!(p, "relay-descriptors/consensus/2018/11/19/2018-11-19-15-00-00-consensus");
/// ```
pub fn consensus_path(valid_after: OffsetDateTime) -> String {
    format!(
        "relay-descriptors/consensus/{:04}/{:02}/{:02}/{}-consensus",
        valid_after.year(),
        u8::from(valid_after.month()),
        valid_after.day(),
        timestamp_stem(valid_after),
    )
}

/// Build a path for a `microdesc`-flavored relay consensus.
pub fn microdesc_consensus_path(valid_after: OffsetDateTime) -> String {
    format!(
        "relay-descriptors/microdesc/{:04}/{:02}/consensus-microdesc/{:02}/{}-consensus-microdesc",
        valid_after.year(),
        u8::from(valid_after.month()),
        valid_after.day(),
        timestamp_stem(valid_after),
    )
}

/// Build a path for a microdescriptor, keyed by lower-case hex SHA-256.
pub fn microdescriptor_path(valid_after: OffsetDateTime, digest: &str) -> Result<String> {
    check_hex(digest, 64)?;
    let digest = digest.to_ascii_lowercase();
    Ok(format!(
        "relay-descriptors/microdesc/{:04}/{:02}/micro/{}/{}/{}",
        valid_after.year(),
        u8::from(valid_after.month()),
        &digest[0..1],
        &digest[1..2],
        digest,
    ))
}

/// Build a path for a network-status vote.
///
/// Both `v3ident` and `digest` are upper-cased inside the filename,
/// regardless of how they were passed in (§8 scenario 3).
///
/// ```
/// use time::macros::datetime;
/// use tor_dirarchive::path::vote_path;
/// let p = vote_path(
///     datetime!(2018-11-19 15:00:00 UTC),
///     "d586d18309ded4cd6d57c18fdb97efa96d330566",
///     "663b503182575d242b9d8a67334365ff8ecb53bb",
/// ).unwrap();
/// assert_eq!(
///     p,
///     "relay-descriptors/vote/2018/11/19/2018-11-19-15-00-00-vote-D586D18309DED4CD6D57C18FDB97EFA96D330566-663B503182575D242B9D8A67334365FF8ECB53BB"
/// );
/// ```
pub fn vote_path(valid_after: OffsetDateTime, v3ident: &str, digest: &str) -> Result<String> {
    check_hex(v3ident, 40)?;
    check_hex(digest, 40)?;
    Ok(format!(
        "relay-descriptors/vote/{:04}/{:02}/{:02}/{}-vote-{}-{}",
        valid_after.year(),
        u8::from(valid_after.month()),
        valid_after.day(),
        timestamp_stem(valid_after),
        v3ident.to_ascii_uppercase(),
        digest.to_ascii_uppercase(),
    ))
}

/// Build a glob pattern matching any vote filed under `valid_after` and
/// `v3ident`, for any digest. Used by [`crate::archive::Archive::get_vote`]
/// when the caller passes the digest wildcard `"*"` (§4.3, §9).
pub fn vote_glob(valid_after: OffsetDateTime, v3ident: &str) -> Result<String> {
    check_hex(v3ident, 40)?;
    Ok(format!(
        "relay-descriptors/vote/{:04}/{:02}/{:02}/{}-vote-{}-*",
        valid_after.year(),
        u8::from(valid_after.month()),
        valid_after.day(),
        timestamp_stem(valid_after),
        v3ident.to_ascii_uppercase(),
    ))
}

/// Build a path for a detached signature document.
///
/// The distilled spec never assigns `DetachedSignature` its own path scheme
/// (see `SPEC_FULL.md` §10.5); this crate files it alongside votes, keyed by
/// valid-after time only (a document carries no v3ident or inherent digest
/// of its own before it is parsed).
pub fn detached_signature_path(valid_after: OffsetDateTime, digest: &str) -> Result<String> {
    check_hex(digest, 40)?;
    Ok(format!(
        "relay-descriptors/vote/{:04}/{:02}/{:02}/{}-vote-{}",
        valid_after.year(),
        u8::from(valid_after.month()),
        valid_after.day(),
        timestamp_stem(valid_after),
        digest.to_ascii_uppercase(),
    ))
}

/// Build a path for a bridge status.
///
/// ```
/// use time::macros::datetime;
/// use tor_dirarchive::path::bridge_status_path;
/// let p = bridge_status_path(
///     datetime!(2018-11-19 15:00:00 UTC),
///     "ba44a889e64b93faa2b114e02c2a279a8555c533",
/// ).unwrap();
/// assert_eq!(p, "bridge-descriptors/statuses/2018/11/19/20181119-150000-BA44A889E64B93FAA2B114E02C2A279A8555C533");
/// ```
pub fn bridge_status_path(valid_after: OffsetDateTime, fingerprint: &str) -> Result<String> {
    check_hex(fingerprint, 40)?;
    Ok(format!(
        "bridge-descriptors/statuses/{:04}/{:02}/{:02}/{:04}{:02}{:02}-{:02}{:02}{:02}-{}",
        valid_after.year(),
        u8::from(valid_after.month()),
        valid_after.day(),
        valid_after.year(),
        u8::from(valid_after.month()),
        valid_after.day(),
        valid_after.hour(),
        valid_after.minute(),
        valid_after.second(),
        fingerprint.to_ascii_uppercase(),
    ))
}

#[cfg(test)]
mod test {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn scenario_1_server_descriptor() {
        let p = descriptor_path(
            Subdirectory::RelayDescriptors,
            Marker::ServerDescriptor,
            datetime!(2018-11-19 15:01:02 UTC),
            "a94a07b201598d847105ae5fcd5bc3ab10124389",
        )
        .unwrap();
        assert_eq!(
            p,
            "relay-descriptors/server-descriptor/2018/11/a/9/a94a07b201598d847105ae5fcd5bc3ab10124389"
        );
    }

    #[test]
    fn scenario_1_uppercase_digest_is_folded() {
        let p = descriptor_path(
            Subdirectory::RelayDescriptors,
            Marker::ServerDescriptor,
            datetime!(2018-11-19 15:01:02 UTC),
            "A94A07B201598D847105AE5FCD5BC3AB10124389",
        )
        .unwrap();
        assert!(p.ends_with("a94a07b201598d847105ae5fcd5bc3ab10124389"));
    }

    #[test]
    fn scenario_2_consensus() {
        assert_eq!(
            consensus_path(datetime!(2018-11-19 15:00:00 UTC)),
            "relay-descriptors/consensus/2018/11/19/2018-11-19-15-00-00-consensus"
        );
    }

    #[test]
    fn scenario_3_vote_case_fixed() {
        let p = vote_path(
            datetime!(2018-11-19 15:00:00 UTC),
            "d586d18309ded4cd6d57c18fdb97efa96d330566",
            "663b503182575d242b9d8a67334365ff8ecb53bb",
        )
        .unwrap();
        assert_eq!(
            p,
            "relay-descriptors/vote/2018/11/19/2018-11-19-15-00-00-vote-D586D18309DED4CD6D57C18FDB97EFA96D330566-663B503182575D242B9D8A67334365FF8ECB53BB"
        );
    }

    #[test]
    fn scenario_4_bridge_status() {
        let p = bridge_status_path(
            datetime!(2018-11-19 15:00:00 UTC),
            "ba44a889e64b93faa2b114e02c2a279a8555c533",
        )
        .unwrap();
        assert_eq!(
            p,
            "bridge-descriptors/statuses/2018/11/19/20181119-150000-BA44A889E64B93FAA2B114E02C2A279A8555C533"
        );
    }

    #[test]
    fn microdesc_consensus_path_scenario() {
        assert_eq!(
            microdesc_consensus_path(datetime!(2018-11-19 15:00:00 UTC)),
            "relay-descriptors/microdesc/2018/11/consensus-microdesc/19/2018-11-19-15-00-00-consensus-microdesc"
        );
    }

    #[test]
    fn microdescriptor_path_shards_on_sha256() {
        let digest = "00d91cf96321fbd536dd07e297a5e1b7e6961ddd10facdd719716e351453168";
        let p = microdescriptor_path(datetime!(2018-11-19 15:00:00 UTC), digest).unwrap();
        assert_eq!(
            p,
            format!("relay-descriptors/microdesc/2018/11/micro/0/0/{digest}")
        );
    }

    #[test]
    fn path_is_pure_and_deterministic() {
        let a = consensus_path(datetime!(2018-11-19 15:00:00 UTC));
        let b = consensus_path(datetime!(2018-11-19 15:00:00 UTC));
        assert_eq!(a, b);
    }

    #[test]
    fn bad_digest_length_rejected() {
        let err = descriptor_path(
            Subdirectory::RelayDescriptors,
            Marker::ServerDescriptor,
            datetime!(2018-11-19 15:01:02 UTC),
            "not-hex",
        )
        .unwrap_err();
        assert!(matches!(err, Error::BadHexDigest(_, _)));
    }

    #[test]
    fn vote_glob_pattern() {
        let g = vote_glob(
            datetime!(2018-11-19 15:00:00 UTC),
            "d586d18309ded4cd6d57c18fdb97efa96d330566",
        )
        .unwrap();
        assert_eq!(
            g,
            "relay-descriptors/vote/2018/11/19/2018-11-19-15-00-00-vote-D586D18309DED4CD6D57C18FDB97EFA96D330566-*"
        );
    }
}
