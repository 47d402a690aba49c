//! BLAKE3 content hashing (§4.10) used for graph/weight digests and the
//! kernel shader cache key.

use std::fmt;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    pub fn of(bytes: &[u8]) -> Self {
        Self(*blake3::hash(bytes).as_bytes())
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Combine several pieces without concatenating them into one buffer
    /// (used for cache keys built from heterogeneous parts, e.g.
    /// `kernel_name` + `bits`).
    pub fn of_parts(parts: &[&[u8]]) -> Self {
        let mut hasher = blake3::Hasher::new();
        for part in parts {
            hasher.update(part);
        }
        Self(*hasher.finalize().as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        blake3::Hash::from(self.0).to_hex().to_string()
    }

    /// Parse a 64-char hex digest back into a `ContentHash`, e.g. a
    /// `CycleRuntime::proof()` string received from a peer. Returns `None`
    /// on malformed input rather than panicking — callers treat that the
    /// same as any other chain-of-custody mismatch.
    pub fn from_hex(hex: &str) -> Option<Self> {
        blake3::Hash::from_hex(hex).ok().map(|h| Self(*h.as_bytes()))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_bytes_hash_identically() {
        assert_eq!(ContentHash::of(b"abc"), ContentHash::of(b"abc"));
    }

    #[test]
    fn different_bytes_hash_differently() {
        assert_ne!(ContentHash::of(b"abc"), ContentHash::of(b"abd"));
    }

    #[test]
    fn of_parts_matches_concatenation() {
        let concat = ContentHash::of(b"abcdef");
        let parts = ContentHash::of_parts(&[b"abc", b"def"]);
        assert_eq!(concat, parts);
    }

    #[test]
    fn hex_round_trips_through_display() {
        let h = ContentHash::of(b"hello");
        assert_eq!(h.to_hex(), format!("{}", h));
        assert_eq!(h.to_hex().len(), 64);
    }

    #[test]
    fn from_hex_round_trips() {
        let h = ContentHash::of(b"hello");
        assert_eq!(ContentHash::from_hex(&h.to_hex()), Some(h));
    }

    #[test]
    fn from_hex_rejects_malformed_input() {
        assert_eq!(ContentHash::from_hex("not-hex"), None);
        assert_eq!(ContentHash::from_hex("ab"), None);
    }
}
