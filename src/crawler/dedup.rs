//! Dedup index for URLs and content
//!
//! Both sets are sharded (`DashSet`), so claims for different keys rarely
//! contend and there is no global lock. Entries are never evicted during a
//! run.

use dashmap::DashSet;
use sha2::{Digest, Sha256};
use std::fmt;
use url::Url;

/// 128-bit SHA-256 prefix of a canonical URL or of content bytes
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 16]);

impl Fingerprint {
    /// Fingerprints arbitrary bytes
    ///
    /// # Arguments
    ///
    /// * `bytes` - Content to hash, typically a response body
    ///
    /// # Returns
    ///
    /// The first 16 bytes of the SHA-256 digest of `bytes`
    pub fn of(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        let mut prefix = [0u8; 16];
        prefix.copy_from_slice(&digest[..16]);
        Self(prefix)
    }

    /// Fingerprints a URL by its serialized form
    ///
    /// Callers pass canonical URLs, so two spellings of the same resource
    /// map to one fingerprint.
    pub fn of_url(url: &Url) -> Self {
        Self::of(url.as_str().as_bytes())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", hex::encode(self.0))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Shared record of every URL and document body seen in a run
#[derive(Debug, Default)]
pub struct DedupIndex {
    urls: DashSet<Fingerprint>,
    content: DashSet<Fingerprint>,
}

impl DedupIndex {
    /// Creates an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims a canonical URL
    ///
    /// Returns true only for the first caller; every later claim of the same
    /// URL, concurrent or not, returns false.
    pub fn try_claim(&self, url: &Url) -> bool {
        self.urls.insert(Fingerprint::of_url(url))
    }

    /// Records a document body
    ///
    /// Returns true if no identical body was seen before.
    pub fn mark_content_seen(&self, bytes: &[u8]) -> bool {
        self.content.insert(Fingerprint::of(bytes))
    }

    /// Checks whether a URL has been claimed, without claiming it
    ///
    /// # Arguments
    ///
    /// * `url` - Canonical URL to look up
    ///
    /// # Returns
    ///
    /// * `true` - Some task already claimed `url`
    /// * `false` - `url` has not been seen in this run
    pub fn contains(&self, url: &Url) -> bool {
        self.urls.contains(&Fingerprint::of_url(url))
    }

    /// Number of distinct URLs claimed so far
    pub fn url_count(&self) -> usize {
        self.urls.len()
    }

    /// Number of distinct bodies seen so far
    pub fn content_count(&self) -> usize {
        self.content.len()
    }
}
