//! Parser for the binary Ed25519 certificate format embedded in
//! `ed25519-cert` objects (router descriptors, microdescriptors, and
//! consensus `dir-source` lines), tor-spec's cert-spec format.
//!
//! Grounded on `bushel.documents.directory.DirectoryCertificate`'s byte
//! layout, rewritten as a fallible parser (rather than a class whose
//! `parse()` method can leave fields unset) and verified using
//! `ed25519-dalek` in place of the original's `nacl.signing.VerifyKey`.

use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use time::OffsetDateTime;

/// The certificate extension type that carries the Ed25519 signing key used
/// to verify the certificate, per cert-spec.txt.
const SIGNED_WITH_ED25519_KEY_EXTENSION: u8 = 4;

const HEADER_LEN: usize = 40;
const SIGNATURE_LEN: usize = 64;

/// Errors produced while parsing or verifying a certificate.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The certificate was shorter than the fixed 40-byte header.
    #[error("certificate too short: {len} bytes, need at least {HEADER_LEN}")]
    TooShort {
        /// The certificate's actual length.
        len: usize,
    },
    /// An extension's declared length ran past the end of the buffer.
    #[error("extension {index} claims length {claimed} but only {available} bytes remain")]
    TruncatedExtension {
        /// Which extension, by index, was truncated.
        index: usize,
        /// The extension's declared length.
        claimed: usize,
        /// How many bytes actually remained.
        available: usize,
    },
    /// After parsing every extension, the remaining bytes were not exactly
    /// a 64-byte signature.
    #[error("{remaining} bytes remain after extensions, expected exactly {SIGNATURE_LEN}")]
    BadSignatureLength {
        /// How many bytes remained.
        remaining: usize,
    },
    /// No extension carried a signing key, and none was supplied explicitly.
    #[error("no signed-with-ed25519-key extension present and no verifying key given")]
    NoVerifyingKey,
    /// The supplied or embedded key bytes were not a valid Ed25519 public
    /// key.
    #[error("malformed ed25519 verifying key")]
    BadVerifyingKey,
    /// Signature verification failed.
    #[error("signature verification failed")]
    BadSignature,
}

/// Result alias for this module.
pub type Result<T> = std::result::Result<T, Error>;

/// A single certificate extension: its type, flags, and payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extension {
    /// The extension type (cert-spec.txt §2.2). Type 4 is
    /// "signed-with-ed25519-key".
    pub ext_type: u8,
    /// Per-extension flag bits.
    pub flags: u8,
    /// The extension's payload.
    pub data: Vec<u8>,
}

/// A parsed Ed25519 certificate (cert-spec.txt).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    /// The raw bytes this certificate was parsed from, retained so that
    /// [`Certificate::verify`] can check the signature over exactly the
    /// bytes that were signed.
    raw: Vec<u8>,
    /// The certificate format version; currently always 1.
    pub version: u8,
    /// What kind of key this certificate certifies.
    pub cert_type: u8,
    /// The certificate's expiration time, to hour granularity.
    pub expiration_date: OffsetDateTime,
    /// The type of the certified key.
    pub cert_key_type: u8,
    /// The 32-byte certified key or its digest.
    pub certified_key: [u8; 32],
    /// The certificate's extensions, in file order.
    pub extensions: Vec<Extension>,
    /// The trailing 64-byte Ed25519 signature.
    pub signature: [u8; 64],
}

impl Certificate {
    /// Parse a certificate from its binary encoding.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_LEN {
            return Err(Error::TooShort { len: data.len() });
        }
        let version = data[0];
        let cert_type = data[1];
        let expiration_hours = u32::from_be_bytes([data[2], data[3], data[4], data[5]]);
        let expiration_date =
            OffsetDateTime::from_unix_timestamp(i64::from(expiration_hours) * 3600)
                .unwrap_or(OffsetDateTime::UNIX_EPOCH);
        let cert_key_type = data[6];
        let mut certified_key = [0u8; 32];
        certified_key.copy_from_slice(&data[7..39]);
        let n_extensions = data[39];

        let mut extensions = Vec::with_capacity(n_extensions as usize);
        let mut index = HEADER_LEN;
        for ext_index in 0..n_extensions as usize {
            if data.len() < index + 4 {
                return Err(Error::TruncatedExtension {
                    index: ext_index,
                    claimed: 0,
                    available: data.len().saturating_sub(index),
                });
            }
            let length = u16::from_be_bytes([data[index], data[index + 1]]) as usize;
            let ext_type = data[index + 2];
            let flags = data[index + 3];
            let body_start = index + 4;
            let body_end = body_start + length;
            if data.len() < body_end {
                return Err(Error::TruncatedExtension {
                    index: ext_index,
                    claimed: length,
                    available: data.len().saturating_sub(body_start),
                });
            }
            extensions.push(Extension {
                ext_type,
                flags,
                data: data[body_start..body_end].to_vec(),
            });
            index = body_end;
        }

        let remaining = data.len() - index;
        if remaining != SIGNATURE_LEN {
            return Err(Error::BadSignatureLength { remaining });
        }
        let mut signature = [0u8; 64];
        signature.copy_from_slice(&data[index..]);

        Ok(Certificate {
            raw: data.to_vec(),
            version,
            cert_type,
            expiration_date,
            cert_key_type,
            certified_key,
            extensions,
            signature,
        })
    }

    /// The embedded signing key, from the `signed-with-ed25519-key`
    /// extension, if present.
    pub fn embedded_verifying_key(&self) -> Option<&[u8]> {
        self.extensions
            .iter()
            .find(|e| e.ext_type == SIGNED_WITH_ED25519_KEY_EXTENSION)
            .map(|e| e.data.as_slice())
    }

    /// Verify the certificate's signature.
    ///
    /// If `verify_key` is `None`, the key is taken from the embedded
    /// `signed-with-ed25519-key` extension (§cert-spec.txt 2.2). Returns
    /// `Ok(())` on a valid signature.
    pub fn verify(&self, verify_key: Option<&[u8]>) -> Result<()> {
        let key_bytes = verify_key
            .or_else(|| self.embedded_verifying_key())
            .ok_or(Error::NoVerifyingKey)?;
        let key_array: [u8; 32] = key_bytes.try_into().map_err(|_| Error::BadVerifyingKey)?;
        let key = VerifyingKey::from_bytes(&key_array).map_err(|_| Error::BadVerifyingKey)?;
        let signed_portion = &self.raw[..self.raw.len() - SIGNATURE_LEN];
        let sig = Signature::from_bytes(&self.signature);
        key.verify(signed_portion, &sig)
            .map_err(|_| Error::BadSignature)
    }
}
