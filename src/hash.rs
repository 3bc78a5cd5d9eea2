//! Deterministic hashing utilities and the content digest type.
//!
//! This module provides deterministic hashing functions that produce consistent
//! results across processes, platforms, and runs. Unlike `std::collections::hash_map::DefaultHasher`,
//! which uses a random seed for security, these hashers use fixed algorithms.
//! That matters here because peers exchange [`ContentDigest`] vectors to verify
//! they loaded the same data: if different peers seeded their hashers
//! differently, identical data would produce different digests and every
//! integrity check would report a false mismatch.
//!
//! # Usage
//!
//! ```
//! use garrison_lockstep::hash::{fnv1a_hash, DigestBuilder};
//!
//! // Hash any hashable value deterministically
//! let h = fnv1a_hash(&"balance.json");
//! assert_eq!(h, fnv1a_hash(&"balance.json"));
//!
//! // Fold loaded data categories into a content digest
//! let mut builder = DigestBuilder::new();
//! builder.add_category("units", b"unit stat tables...");
//! builder.add_category("research", b"research tree...");
//! let digest = builder.finish();
//! assert_eq!(digest, {
//!     let mut again = DigestBuilder::new();
//!     again.add_category("units", b"unit stat tables...");
//!     again.add_category("research", b"research tree...");
//!     again.finish()
//! });
//! ```
//!
//! # Algorithm
//!
//! This module uses FNV-1a (Fowler-Noll-Vo hash function, variant 1a), which is:
//! - Fast and simple
//! - Deterministic (no random seed)
//! - Good distribution for typical inputs
//! - Widely used and well-tested
//!
//! Note: FNV-1a is NOT cryptographically secure. The integrity handshake
//! detects accidental divergence (wrong mods, corrupted downloads), not
//! adversaries with control over their own binary.

use std::hash::{Hash, Hasher};

/// FNV-1a 64-bit offset basis constant.
const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;

/// FNV-1a 64-bit prime constant.
const FNV_PRIME: u64 = 0x0100_0000_01b3;

/// Number of `u32` words in a [`ContentDigest`].
pub const CONTENT_DIGEST_WORDS: usize = 16;

/// A deterministic hasher using the FNV-1a algorithm.
///
/// This hasher produces consistent results across processes, platforms, and
/// runs, making it suitable for digests that remote peers must agree on.
#[derive(Debug, Clone)]
pub struct DeterministicHasher {
    state: u64,
}

impl DeterministicHasher {
    /// Creates a new `DeterministicHasher` with the standard FNV-1a offset basis.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: FNV_OFFSET_BASIS,
        }
    }
}

impl Default for DeterministicHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher for DeterministicHasher {
    #[inline]
    fn finish(&self) -> u64 {
        self.state
    }

    #[inline]
    fn write(&mut self, bytes: &[u8]) {
        // FNV-1a algorithm: for each byte, XOR then multiply
        for &byte in bytes {
            self.state ^= u64::from(byte);
            self.state = self.state.wrapping_mul(FNV_PRIME);
        }
    }
}

/// Computes a deterministic FNV-1a hash of the given value.
///
/// # Example
///
/// ```
/// use garrison_lockstep::hash::fnv1a_hash;
///
/// let hash = fnv1a_hash(&42u32);
/// assert_eq!(hash, fnv1a_hash(&42u32));
/// assert_ne!(hash, fnv1a_hash(&43u32));
/// ```
#[inline]
pub fn fnv1a_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DeterministicHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// A fixed-width vector of hash words describing the data a peer has loaded.
///
/// Both data-integrity phases exchange this type: clients report their digest
/// once everyone has joined, and the host compares it word for word against
/// its own. The digest is word-granular rather than a single hash so a
/// mismatch can be attributed to the first differing data category when
/// logging.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize,
)]
pub struct ContentDigest(pub [u32; CONTENT_DIGEST_WORDS]);

impl ContentDigest {
    /// Creates a digest from raw words.
    #[inline]
    #[must_use]
    pub const fn new(words: [u32; CONTENT_DIGEST_WORDS]) -> Self {
        Self(words)
    }

    /// The all-zero digest, used before any data has been folded in.
    #[inline]
    #[must_use]
    pub const fn zeroed() -> Self {
        Self([0; CONTENT_DIGEST_WORDS])
    }

    /// Returns the underlying words.
    #[inline]
    #[must_use]
    pub const fn words(&self) -> &[u32; CONTENT_DIGEST_WORDS] {
        &self.0
    }

    /// Returns the index of the first word that differs from `other`, if any.
    ///
    /// Used by the host when reporting which data category diverged.
    #[must_use]
    pub fn first_difference(&self, other: &ContentDigest) -> Option<usize> {
        self.0
            .iter()
            .zip(other.0.iter())
            .position(|(a, b)| a != b)
    }
}

/// Incrementally folds labeled data categories into a [`ContentDigest`].
///
/// Categories are assigned to digest words round-robin in the order they are
/// added, and each word chains its previous value, so both the content and the
/// order of categories affect the result.
#[derive(Debug, Clone)]
pub struct DigestBuilder {
    words: [u32; CONTENT_DIGEST_WORDS],
    next: usize,
}

impl DigestBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            words: [0; CONTENT_DIGEST_WORDS],
            next: 0,
        }
    }

    /// Folds one named data category into the digest.
    pub fn add_category(&mut self, label: &str, bytes: &[u8]) {
        let mut hasher = DeterministicHasher::new();
        hasher.write(&self.words[self.next].to_le_bytes());
        hasher.write(label.as_bytes());
        hasher.write(bytes);
        let folded = hasher.finish();
        self.words[self.next] = (folded as u32) ^ ((folded >> 32) as u32);
        self.next = (self.next + 1) % CONTENT_DIGEST_WORDS;
    }

    /// Finishes the digest.
    #[must_use]
    pub const fn finish(&self) -> ContentDigest {
        ContentDigest(self.words)
    }
}

impl Default for DigestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic_hasher_consistency() {
        let hash1 = fnv1a_hash(&42u32);
        let hash2 = fnv1a_hash(&42u32);
        assert_eq!(hash1, hash2);
    }

    #[test]
    fn test_deterministic_hasher_different_values() {
        let hash1 = fnv1a_hash(&42u32);
        let hash2 = fnv1a_hash(&43u32);
        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_deterministic_hasher_empty() {
        // Empty write should still produce offset basis
        let hasher = DeterministicHasher::new();
        assert_eq!(hasher.finish(), FNV_OFFSET_BASIS);
    }

    #[test]
    fn test_known_fnv1a_values() {
        // Test against known FNV-1a values for verification
        // FNV-1a("") = offset basis = 0xcbf29ce484222325
        let mut hasher = DeterministicHasher::new();
        hasher.write(b"");
        assert_eq!(hasher.finish(), 0xcbf2_9ce4_8422_2325);

        // FNV-1a("a") = 0xaf63dc4c8601ec8c
        let mut hasher = DeterministicHasher::new();
        hasher.write(b"a");
        assert_eq!(hasher.finish(), 0xaf63_dc4c_8601_ec8c);

        // FNV-1a("foobar") = 0x85944171f73967e8
        let mut hasher = DeterministicHasher::new();
        hasher.write(b"foobar");
        assert_eq!(hasher.finish(), 0x8594_4171_f739_67e8);
    }

    #[test]
    fn digest_builder_is_deterministic() {
        let mut a = DigestBuilder::new();
        a.add_category("units", b"alpha");
        a.add_category("maps", b"beta");
        let mut b = DigestBuilder::new();
        b.add_category("units", b"alpha");
        b.add_category("maps", b"beta");
        assert_eq!(a.finish(), b.finish());
    }

    #[test]
    fn digest_builder_is_order_sensitive() {
        let mut a = DigestBuilder::new();
        a.add_category("units", b"alpha");
        a.add_category("units", b"beta");
        let mut b = DigestBuilder::new();
        b.add_category("units", b"beta");
        b.add_category("units", b"alpha");
        assert_ne!(a.finish(), b.finish());
    }

    #[test]
    fn digest_first_difference_reports_lowest_index() {
        let mut words = [7u32; CONTENT_DIGEST_WORDS];
        let reference = ContentDigest::new(words);
        words[4] = 8;
        words[9] = 9;
        let altered = ContentDigest::new(words);
        assert_eq!(reference.first_difference(&altered), Some(4));
        assert_eq!(reference.first_difference(&reference), None);
    }

    #[test]
    fn digest_wraps_past_word_count() {
        // More categories than words must still terminate and produce
        // different digests for different content in the wrapped slots.
        let mut a = DigestBuilder::new();
        let mut b = DigestBuilder::new();
        for i in 0..(CONTENT_DIGEST_WORDS + 3) {
            a.add_category("cat", &[i as u8]);
            b.add_category("cat", &[i as u8]);
        }
        b.add_category("cat", b"extra");
        assert_ne!(a.finish(), b.finish());
    }
}
