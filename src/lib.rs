// @@ begin lint list maintained by maint/add_warning @@
#![warn(missing_docs)]
#![warn(noop_method_call)]
#![warn(unreachable_pub)]
#![warn(clippy::all)]
#![deny(clippy::await_holding_lock)]
#![deny(clippy::cast_lossless)]
#![deny(clippy::checked_conversions)]
#![deny(clippy::exhaustive_enums)]
#![deny(clippy::exhaustive_structs)]
#![deny(clippy::fallible_impl_from)]
#![warn(clippy::needless_borrow)]
#![deny(clippy::print_stderr)]
#![deny(clippy::print_stdout)]
#![deny(clippy::unchecked_duration_subtraction)]
//! <!-- @@ end lint list maintained by maint/add_warning @@ -->
//!
//! A crawler and content-addressed archive for Tor directory-protocol
//! documents: consensuses, votes, server descriptors, extra-info
//! descriptors, microdescriptors, and bridge statuses.
//!
//! This crate implements the three tightly coupled subsystems that do the
//! actual crawling and archiving:
//!
//!   - [`fetch`] — an asynchronous, concurrency-limited, multi-endpoint HTTP
//!     client that retrieves documents from directory servers, with
//!     per-endpoint retry/failover.
//!   - [`archive`] — a content-addressed filesystem store with a bit-exact
//!     path layout compatible with the CollecTor archival tree.
//!   - [`scraper`] — the fan-out orchestrator that, starting from a
//!     network-status document, recursively resolves every descriptor it
//!     references through a read-through [`cache`] (memory → archive →
//!     fetcher).
//!
//! The remaining modules are the plumbing those three subsystems share:
//! [`doc`] (the closed set of document kinds), [`path`] (pure path-building
//! functions), [`parse`] (the directory-document tokenizer/itemizer and the
//! bandwidth-file state machine), [`cert`] (the embedded Ed25519
//! certificate format), [`digest`] (the hashing conventions documents are
//! keyed by), [`authority`] (the well-known directory authorities), and
//! [`config`] (the knobs every component above is built from).
//!
//! Out of scope, by design: a command-line front end, mirror-freshness
//! monitoring, a consensus viewer, and any participation in the consensus
//! protocol itself (voting, signing, relaying, or re-serving documents).
//! Those are external collaborators, not part of this crate.

pub mod archive;
pub mod authority;
pub mod cache;
pub mod cert;
pub mod config;
pub mod digest;
pub mod doc;
pub mod fetch;
pub mod parse;
pub mod path;
pub mod scraper;

pub use archive::Archive;
pub use cache::Cache;
pub use config::Config;
pub use doc::{DocKind, Document};
pub use fetch::Fetcher;
pub use scraper::{CycleReport, Scraper};
