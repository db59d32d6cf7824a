//! Link extraction, short-link resolution and classification.
//!
//! The extractor scans free-form chat text against an ordered rule table and
//! yields at most one working link; the classifier maps a resolved link to a
//! [`classify::ContentKind`] that selects an acquisition backend.

/// Content kind classification
pub mod classify;
/// Rule-table extraction and short-link resolution
pub mod extract;

pub use classify::{classify, ContentKind};
pub use extract::{extract_link, ExtractedLink, LinkCategory, LinkResolver, ResolveError};
