//! Digest helpers used to key archived documents.
//!
//! Server and extra-info descriptors are keyed by lower-case hex SHA-1 over
//! their raw bytes; votes by upper-case hex SHA-1 over the signed portion
//! only (everything up to and including the first `"\ndirectory-signature "`);
//! microdescriptors by lower-case hex SHA-256.

use base64ct::{Base64Unpadded, Encoding};
use sha1::{Digest as _, Sha1};
use sha2::Sha256;

/// Marker for the marker string that ends a vote's signed portion.
const VOTE_SIGNED_PORTION_END: &str = "\ndirectory-signature ";

/// Return the lower-case hex SHA-1 digest of `raw`.
///
/// Used for server descriptors, extra-info descriptors, and as the
/// intermediate form for vote digests before case-folding.
pub fn sha1_hex_lower(raw: &[u8]) -> String {
    hex::encode(Sha1::digest(raw))
}

/// Return the upper-case hex SHA-1 digest of `raw`.
pub fn sha1_hex_upper(raw: &[u8]) -> String {
    sha1_hex_lower(raw).to_ascii_uppercase()
}

/// Return the lower-case hex SHA-256 digest of `raw`.
///
/// Used for microdescriptors.
pub fn sha256_hex_lower(raw: &[u8]) -> String {
    hex::encode(Sha256::digest(raw))
}

/// Re-encode a lower- or upper-case hex digest as unpadded base-64.
///
/// Every document kind is keyed by hex throughout this crate (Archive,
/// Cache, Scraper); the one place that needs base-64 is the wire format for
/// microdescriptor queries (`/tor/micro/d/<H1>-<H2>-…`), so the conversion
/// happens at that boundary rather than threading a second representation
/// through everything upstream of it. Returns `None` if `hex_digest` is not
/// valid hex.
pub fn hex_to_base64_unpadded(hex_digest: &str) -> Option<String> {
    let bytes = hex::decode(hex_digest).ok()?;
    Some(Base64Unpadded::encode_string(&bytes))
}

/// Compute a vote's digest.
///
/// A vote's digest is the upper-case hex SHA-1 of the document's bytes up to
/// and including the first occurrence of `"\ndirectory-signature "`: this is
/// the "signed portion" that an authority actually signs, and it is what
/// every other authority and archive references when pointing at this vote.
///
/// Returns `None` if `raw` does not contain the marker (the document is not
/// a well-formed vote).
pub fn vote_digest(raw: &[u8]) -> Option<String> {
    let signed_portion = signed_portion(raw)?;
    Some(sha1_hex_upper(signed_portion))
}

/// Return the prefix of `raw` that is covered by a vote's or consensus's
/// signature: everything up to and including the first
/// `"\ndirectory-signature "` line marker.
pub fn signed_portion(raw: &[u8]) -> Option<&[u8]> {
    let marker = VOTE_SIGNED_PORTION_END.as_bytes();
    let pos = find_subslice(raw, marker)?;
    Some(&raw[..pos + marker.len()])
}

/// Naive substring search over bytes; directory documents are small enough
/// (tens of kilobytes) that this need not be clever.
fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn sha1_known_vector() {
        // echo -n "abc" | sha1sum
        assert_eq!(
            sha1_hex_lower(b"abc"),
            "a9993e364706816aba3e25717850c26c9cd0d89"
        );
        assert_eq!(
            sha1_hex_upper(b"abc"),
            "A9993E364706816ABA3E25717850C26C9CD0D89"
        );
    }

    #[test]
    fn sha256_known_vector() {
        assert_eq!(
            sha256_hex_lower(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn vote_digest_covers_signed_portion_only() {
        // The marker is a newline followed by "directory-signature ".
        let mut doc = b"network-status-version 3\nvote-status vote\n".to_vec();
        doc.push(b'\n');
        doc.extend_from_slice(b"directory-signature ");
        doc.extend_from_slice(b"rest-of-the-document-that-is-not-signed");

        let signed = signed_portion(&doc).expect("marker present");
        assert!(signed.ends_with(b"directory-signature "));
        assert!(!signed.ends_with(b"rest-of-the-document-that-is-not-signed"));

        let digest = vote_digest(&doc).unwrap();
        assert_eq!(digest, digest.to_ascii_uppercase());
        assert_eq!(digest.len(), 40);
    }

    #[test]
    fn vote_digest_missing_marker() {
        assert_eq!(vote_digest(b"not a vote"), None);
    }

    #[test]
    fn hex_to_base64_unpadded_round_trips_known_vector() {
        let hex_digest = sha256_hex_lower(b"abc");
        let b64 = hex_to_base64_unpadded(&hex_digest).unwrap();
        assert!(!b64.contains('='));
        assert_eq!(
            Base64Unpadded::decode_vec(&b64).unwrap(),
            hex::decode(&hex_digest).unwrap()
        );
    }

    #[test]
    fn hex_to_base64_unpadded_rejects_non_hex() {
        assert_eq!(hex_to_base64_unpadded("not hex"), None);
    }
}
