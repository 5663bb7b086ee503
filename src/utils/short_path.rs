//! Short path derivation and syntax checks.
//!
//! Short paths are derived from the target URL itself: SHA-256 digest,
//! URL-safe base64, alphanumeric characters only, truncated to a fixed
//! length and prefixed with `/`. No allocator or counter is involved, so
//! re-reconciling the same URL always lands on the same path.

use base64::Engine as _;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::LazyLock;

/// Default number of characters after the leading `/`.
pub const DEFAULT_SHORT_PATH_LENGTH: usize = 3;

/// Largest configurable short path length.
pub const MAX_SHORT_PATH_LENGTH: usize = 32;

static SHORT_PATH_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/[A-Za-z0-9]+$").expect("short path pattern is valid"));

/// Deterministic target URL → short path generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShortPathGenerator {
    length: usize,
}

impl ShortPathGenerator {
    /// Creates a generator producing `length` characters after the `/`.
    ///
    /// The length is clamped to `1..=MAX_SHORT_PATH_LENGTH`.
    pub fn new(length: usize) -> Self {
        Self {
            length: length.clamp(1, MAX_SHORT_PATH_LENGTH),
        }
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// Derives the short path for a target URL.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let generator = ShortPathGenerator::new(3);
    /// let path = generator.generate("https://example.com/a");
    /// assert_eq!(path.len(), 4);
    /// assert_eq!(path, generator.generate("https://example.com/a"));
    /// ```
    pub fn generate(&self, target_url: &str) -> String {
        let encoded = encoded_digest(target_url);
        let end = self.length.min(encoded.len());
        format!("/{}", &encoded[..end])
    }

    /// Yields the configured-length path first, then progressively longer
    /// prefixes of the same digest.
    ///
    /// Used to step around a path already taken by a different target URL.
    pub fn candidates(&self, target_url: &str) -> impl Iterator<Item = String> {
        let encoded = encoded_digest(target_url);
        let start = self.length.min(encoded.len());
        (start..=encoded.len()).map(move |end| format!("/{}", &encoded[..end]))
    }
}

impl Default for ShortPathGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_SHORT_PATH_LENGTH)
    }
}

/// Returns true if `path` has short path syntax (`/` followed by ASCII
/// letters and digits).
pub fn is_short_path(path: &str) -> bool {
    SHORT_PATH_PATTERN.is_match(path)
}

fn encoded_digest(target_url: &str) -> String {
    let digest = Sha256::digest(target_url.as_bytes());
    base64::engine::general_purpose::URL_SAFE_NO_PAD
        .encode(digest)
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect()
}
