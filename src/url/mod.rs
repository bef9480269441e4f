//! URL handling module for Ripple
//!
//! This module provides URL canonicalization (the dedup key of the crawl)
//! and host extraction (the politeness key).

mod domain;
mod normalize;

pub use domain::extract_host;
pub use normalize::{canonicalize, normalize_url};
