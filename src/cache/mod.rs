//! Persistent artifact cache
//!
//! Content-addressed directory cache for server builds and extracted mods.
//! Entries are immutable once promoted and reused across container restarts.
//!
//! # Entry Lifecycle
//!
//! | State | Location | Description |
//! |-------|----------|-------------|
//! | Miss | none | No entry, populate will run |
//! | Staging | `.staging-*` | Populate in progress or crashed, never read |
//! | Complete | `<key>` | Promoted by rename, immutable |
//!
//! Invalidation is external: delete the entry directory to force a rebuild.

pub mod key;
pub mod store;

pub use key::{fingerprint_files, ArtifactKind, CacheKey};
pub use store::{CacheStatus, PathCache};
