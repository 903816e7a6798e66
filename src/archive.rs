//! The content-addressed filesystem archive (§4.3).
//!
//! Grounded on `bushel.archive.DirectoryArchive` for the store/get contract
//! (compute a path, create parent directories, write the annotated content;
//! read back and tolerate `FileNotFoundError`) and on the bounded-fd
//! discipline `tor_dirmgr` applies around its own persistence layer: every
//! open file handle is acquired through a `tokio::sync::Semaphore` permit
//! that is released on every exit path, including early returns from `?`.
//!
//! The digest-indexed symlink tree that some revisions of the original
//! implement (`digest_path_for`) is intentionally not reproduced here; see
//! `SPEC_FULL.md` §10.5 and §9's open questions.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use glob::glob;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Semaphore;
use tracing::{debug, trace, warn};

use crate::config::ArchiveConfig;
use crate::doc::{Document, PathMeta};
use crate::parse::Forgiveness;
use crate::path;

/// Errors produced by [`Archive`] operations.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The metadata supplied could not be turned into a path at all (§7's
    /// `BadArgument`).
    #[error("cannot build an archive path: {0}")]
    BadArgument(#[from] path::Error),
    /// A disk I/O error other than "not found" (§7's `Disk`).
    #[error("archive I/O error at {path}: {source}")]
    Io {
        /// The path the operation was acting on.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Result alias for this module.
pub type Result<T> = std::result::Result<T, Error>;

/// The content-addressed filesystem archive.
///
/// Cheap to clone: the semaphore is reference-counted, so every clone shares
/// the same file-descriptor budget.
#[derive(Clone)]
pub struct Archive {
    root: PathBuf,
    fd_semaphore: Arc<Semaphore>,
}

impl Archive {
    /// Open an archive rooted at the configured directory. Does not create
    /// the root itself; the caller is expected to have provisioned it.
    pub fn new(config: &ArchiveConfig) -> Self {
        Archive {
            root: config.root.clone(),
            fd_semaphore: Arc::new(Semaphore::new(config.fd_limit)),
        }
    }

    /// The path a document with the given metadata would be stored at,
    /// relative to the archive root (§4.3's `PathFor`). Does not touch the
    /// filesystem.
    pub fn path_for(&self, meta: &PathMeta) -> Result<PathBuf> {
        Ok(self.root.join(meta.path()?))
    }

    /// Write `doc` to its canonical path, creating parent directories as
    /// needed. Overwrites an existing file at that path, if any (paths are
    /// content-addressed, so this is idempotent in practice).
    pub async fn store(&self, doc: &Document, meta: &PathMeta) -> Result<PathBuf> {
        let path = self.path_for(meta)?;
        let _permit = self
            .fd_semaphore
            .acquire()
            .await
            .expect("fd semaphore is never closed");

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| Error::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let tmp_path = tmp_path_for(&path);
        let mut file = tokio::fs::File::create(&tmp_path)
            .await
            .map_err(|source| Error::Io {
                path: tmp_path.clone(),
                source,
            })?;
        file.write_all(&doc.annotated_bytes())
            .await
            .map_err(|source| Error::Io {
                path: tmp_path.clone(),
                source,
            })?;
        file.flush().await.map_err(|source| Error::Io {
            path: tmp_path.clone(),
            source,
        })?;
        drop(file);
        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(|source| Error::Io {
                path: path.clone(),
                source,
            })?;

        debug!(path = %path.display(), "stored document");
        Ok(path)
    }

    /// Read back the raw bytes stored at `meta`'s path, with the leading
    /// `@type ...` annotation line stripped. Returns `Ok(None)` for a
    /// missing file (§7's `NotFound`); returns `Err` for any other I/O
    /// error.
    pub async fn get_raw(&self, meta: &PathMeta) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(meta)?;
        self.read_stripped(&path).await
    }

    /// Resolve the wildcard digest `"*"` in a [`PathMeta::Vote`] lookup by
    /// globbing for any vote filed under the same valid-after time and
    /// v3ident, returning the lexicographically first match (§9's open
    /// question: "this specification... return[s] the first
    /// lexicographically").
    pub async fn get_vote(
        &self,
        valid_after: time::OffsetDateTime,
        v3ident: &str,
        digest_or_wildcard: &str,
    ) -> Result<Option<Vec<u8>>> {
        if digest_or_wildcard != "*" {
            let meta = PathMeta::Vote {
                valid_after,
                v3ident: v3ident.to_string(),
                digest: digest_or_wildcard.to_string(),
            };
            return self.get_raw(&meta).await;
        }

        let pattern = path::vote_glob(valid_after, v3ident)?;
        let full_pattern = self.root.join(&pattern);
        let full_pattern_str = full_pattern.to_string_lossy().into_owned();

        let _permit = self
            .fd_semaphore
            .acquire()
            .await
            .expect("fd semaphore is never closed");
        let mut matches: Vec<PathBuf> = glob(&full_pattern_str)
            .map_err(|_| Error::BadArgument(path::Error::BadHexDigest(pattern.clone(), 40)))?
            .filter_map(|r| r.ok())
            .collect();
        matches.sort();
        drop(_permit);

        match matches.first() {
            Some(path) => self.read_stripped(path).await,
            None => Ok(None),
        }
    }

    async fn read_stripped(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        let _permit = self
            .fd_semaphore
            .acquire()
            .await
            .expect("fd semaphore is never closed");
        let mut file = match tokio::fs::File::open(path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                trace!(path = %path.display(), "not found in archive");
                return Ok(None);
            }
            Err(source) => {
                return Err(Error::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let mut contents = Vec::new();
        file.read_to_end(&mut contents)
            .await
            .map_err(|source| Error::Io {
                path: path.to_path_buf(),
                source,
            })?;

        Ok(Some(strip_annotation(contents)))
    }
}

/// Strip a leading `@type ...\n` annotation line, if present. A truncated
/// file missing the trailing newline after `@type` is treated as having no
/// annotation rather than as an error: §7 treats truncated files as missing
/// data, not fatal errors, and the caller sees this as ordinary raw bytes
/// that will simply fail to parse.
fn strip_annotation(contents: Vec<u8>) -> Vec<u8> {
    if contents.starts_with(b"@type ") {
        if let Some(nl) = contents.iter().position(|&b| b == b'\n') {
            return contents[nl + 1..].to_vec();
        }
    }
    contents
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

/// Used by callers who want to log a forgiveness-aware parse without
/// importing [`crate::parse`] themselves.
pub const DEFAULT_FORGIVENESS: Forgiveness = Forgiveness {
    allow_trailing_whitespace: false,
};
