//! The closed set of directory document kinds, and the container type used
//! to carry a document (raw bytes + metadata + references) through the
//! Cache and Scraper.
//!
//! This plays the role that `tor_netdoc::doc` plays in the teacher crate:
//! a tagged variant with per-kind behavior resolved by matching on the tag,
//! rather than a trait-object inheritance hierarchy (§9's design note on
//! "dynamic dispatch on document type").

use time::OffsetDateTime;

use crate::path;

/// The closed set of document kinds this crate knows how to archive and
/// fetch (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum DocKind {
    /// A relay network-status consensus, `ns` flavor.
    RelayConsensusNs,
    /// A relay network-status consensus, `microdesc` flavor.
    RelayConsensusMicrodesc,
    /// An authority's network-status vote.
    Vote,
    /// A bridge authority's network status.
    BridgeStatus,
    /// A relay server descriptor.
    RelayServerDescriptor,
    /// A relay extra-info descriptor.
    RelayExtraInfoDescriptor,
    /// A relay microdescriptor.
    RelayMicrodescriptor,
    /// A bridge server descriptor.
    BridgeServerDescriptor,
    /// A bridge extra-info descriptor.
    BridgeExtraInfoDescriptor,
    /// A detached signature document.
    DetachedSignature,
    /// A relay bandwidth-measurement file.
    BandwidthFile,
}

impl DocKind {
    /// The `@type <name> <major>.<minor>` annotation line prepended to every
    /// stored file (§6). Returns `None` for kinds that are parsed but never
    /// archived (see `SPEC_FULL.md` §10.5 on `BandwidthFile`).
    pub fn type_annotation(self) -> Option<&'static str> {
        use DocKind::*;
        Some(match self {
            RelayServerDescriptor => "server-descriptor 1.0",
            BridgeServerDescriptor => "bridge-server-descriptor 1.2",
            RelayExtraInfoDescriptor => "extra-info 1.0",
            BridgeExtraInfoDescriptor => "bridge-extra-info 1.3",
            RelayMicrodescriptor => "microdescriptor 1.0",
            RelayConsensusNs => "network-status-consensus-3 1.0",
            RelayConsensusMicrodesc => "network-status-microdesc-consensus-3 1.0",
            Vote => "network-status-vote-3 1.0",
            BridgeStatus => "bridge-network-status 1.2",
            DetachedSignature => "detached-signature 1.0",
            BandwidthFile => return None,
        })
    }

    /// True if this kind is shardable by digest under `YYYY/MM/d0/d1`
    /// (server/extra-info descriptors and microdescriptors), false if it is
    /// filed by date under `YYYY/MM/DD` (consensuses, votes, statuses).
    pub fn is_digest_sharded(self) -> bool {
        use DocKind::*;
        matches!(
            self,
            RelayServerDescriptor
                | RelayExtraInfoDescriptor
                | RelayMicrodescriptor
                | BridgeServerDescriptor
                | BridgeExtraInfoDescriptor
        )
    }
}

/// Metadata needed to compute an archive path for a document, without
/// requiring the document to already be parsed.
///
/// This is intentionally a flat enum of cases rather than one struct with
/// optional fields, so that [`crate::path`] functions are called with
/// exactly the arguments each path scheme needs (§4.1: "pure, total
/// functions").
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PathMeta {
    /// Server or extra-info descriptor: keyed by publication time and
    /// SHA-1 digest.
    Descriptor {
        /// Which kind of descriptor this is.
        kind: DocKind,
        /// The descriptor's publication time.
        published: OffsetDateTime,
        /// Lower- or upper-case hex SHA-1 digest; case is normalized by
        /// [`crate::path`].
        digest: String,
    },
    /// `ns`-flavored relay consensus: keyed by valid-after time.
    ConsensusNs {
        /// The consensus's valid-after time.
        valid_after: OffsetDateTime,
    },
    /// `microdesc`-flavored relay consensus: keyed by valid-after time.
    ConsensusMicrodesc {
        /// The consensus's valid-after time.
        valid_after: OffsetDateTime,
    },
    /// Microdescriptor: keyed by the microdesc consensus's valid-after time
    /// hint and a SHA-256 digest.
    Microdescriptor {
        /// A valid-after time hint under which to look for this
        /// microdescriptor (microdescriptors are not self-dated).
        valid_after: OffsetDateTime,
        /// Lower- or upper-case hex SHA-256 digest.
        digest: String,
    },
    /// Vote: keyed by valid-after time, the voting authority's v3ident, and
    /// the vote's own digest.
    Vote {
        /// The vote's valid-after time.
        valid_after: OffsetDateTime,
        /// The voting authority's 40-hex-digit v3ident.
        v3ident: String,
        /// The vote's own digest, or `"*"` to match any digest filed for
        /// this authority and time (§4.3, §9).
        digest: String,
    },
    /// Detached signature: keyed by valid-after time and digest.
    DetachedSignature {
        /// The valid-after time of the consensus this signature covers.
        valid_after: OffsetDateTime,
        /// The digest under which this signature document is filed.
        digest: String,
    },
    /// Bridge status: keyed by valid-after time and the bridge authority's
    /// fingerprint.
    BridgeStatus {
        /// The status's valid-after time.
        valid_after: OffsetDateTime,
        /// The bridge authority's 40-hex-digit fingerprint.
        fingerprint: String,
    },
}

impl PathMeta {
    /// Compute the archive-relative path for this metadata, per §4.1/§6.
    pub fn path(&self) -> path::Result<String> {
        use path::{Marker, Subdirectory};
        match self {
            PathMeta::Descriptor {
                kind,
                published,
                digest,
            } => {
                let (subdir, marker) = match kind {
                    DocKind::RelayServerDescriptor => {
                        (Subdirectory::RelayDescriptors, Marker::ServerDescriptor)
                    }
                    DocKind::RelayExtraInfoDescriptor => {
                        (Subdirectory::RelayDescriptors, Marker::ExtraInfo)
                    }
                    DocKind::BridgeServerDescriptor => {
                        (Subdirectory::BridgeDescriptors, Marker::ServerDescriptor)
                    }
                    DocKind::BridgeExtraInfoDescriptor => {
                        (Subdirectory::BridgeDescriptors, Marker::ExtraInfo)
                    }
                    other => {
                        return Err(path::Error::BadHexDigest(
                            format!("{other:?} is not a descriptor kind"),
                            0,
                        ))
                    }
                };
                path::descriptor_path(subdir, marker, *published, digest)
            }
            PathMeta::ConsensusNs { valid_after } => Ok(path::consensus_path(*valid_after)),
            PathMeta::ConsensusMicrodesc { valid_after } => {
                Ok(path::microdesc_consensus_path(*valid_after))
            }
            PathMeta::Microdescriptor {
                valid_after,
                digest,
            } => path::microdescriptor_path(*valid_after, digest),
            PathMeta::Vote {
                valid_after,
                v3ident,
                digest,
            } => path::vote_path(*valid_after, v3ident, digest),
            PathMeta::DetachedSignature {
                valid_after,
                digest,
            } => path::detached_signature_path(*valid_after, digest),
            PathMeta::BridgeStatus {
                valid_after,
                fingerprint,
            } => path::bridge_status_path(*valid_after, fingerprint),
        }
    }
}

/// A reference from one document to another, discovered while parsing.
///
/// The Scraper follows these to fan out from a consensus to every descriptor
/// it names (§4.6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocRef {
    /// The kind of document being referenced.
    pub kind: DocKind,
    /// The digest (or fingerprint) of the referenced document.
    pub digest: String,
    /// A time hint used to locate the referenced document in the archive.
    pub time_hint: OffsetDateTime,
}

/// A document that has been retrieved (from memory, archive, or network)
/// and, where applicable, parsed.
///
/// The raw bytes are authoritative for storage and digesting (§3); the
/// parsed view and references are derived from them by [`crate::parse`].
#[derive(Debug, Clone)]
pub struct Document {
    /// What kind of document this is.
    pub kind: DocKind,
    /// The verbatim bytes of the document, as they will be archived
    /// (without the `@type` annotation line).
    pub raw: Vec<u8>,
    /// The document's publication or validity timestamp.
    pub time: OffsetDateTime,
    /// This document's own digest (how other documents would reference it).
    pub digest: String,
    /// References to other documents discovered while parsing.
    pub refs: Vec<DocRef>,
}

impl Document {
    /// Build the `@type ... \n` + raw-bytes content that gets written to the
    /// archive (§3, §6).
    pub fn annotated_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.raw.len() + 32);
        if let Some(annotation) = self.kind.type_annotation() {
            out.extend_from_slice(b"@type ");
            out.extend_from_slice(annotation.as_bytes());
            out.push(b'\n');
        }
        out.extend_from_slice(&self.raw);
        out
    }
}
