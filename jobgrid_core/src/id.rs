//! Job identifiers derived from BLAKE3 digests.
//!
//! A [`JobId`] is the BLAKE3-256 digest of a state point's canonical byte
//! encoding. The digest algorithm and the canonical encoding together form a
//! versioned on-disk compatibility contract (see [`FORMAT_VERSION`]): change
//! either and every existing job id on disk becomes unreachable, so any change
//! is a breaking format bump, never a silent swap.

use crate::error::{Error, Result};
use std::fmt;
use std::io::Read;
use std::path::Path;

/// Digest size in bytes (BLAKE3 produces 256-bit hashes).
pub const ID_SIZE: usize = 32;

/// On-disk format version covering the canonical encoding and the digest
/// algorithm. Stored as the leading byte of every canonical encoding and in
/// the persisted cache header.
pub const FORMAT_VERSION: u32 = 1;

/// A content-derived job identifier: a 32-byte BLAKE3 digest.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId([u8; ID_SIZE]);

impl JobId {
    /// Create a JobId from raw digest bytes.
    pub fn from_bytes(bytes: [u8; ID_SIZE]) -> Self {
        JobId(bytes)
    }

    /// Create a JobId from a hex string (64 hex characters).
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        if hex_str.len() != ID_SIZE * 2 {
            return Err(Error::invalid_id(format!(
                "Expected {} hex characters, got {}",
                ID_SIZE * 2,
                hex_str.len()
            )));
        }

        let bytes = hex::decode(hex_str)
            .map_err(|e| Error::invalid_id(format!("Invalid hex: {}", e)))?;

        let mut id = [0u8; ID_SIZE];
        id.copy_from_slice(&bytes);
        Ok(JobId(id))
    }

    /// Convert to hex string (64 characters).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Get the raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; ID_SIZE] {
        &self.0
    }

    /// Hash canonical bytes into a JobId.
    pub fn hash_bytes(data: &[u8]) -> Self {
        let hash = blake3::hash(data);
        JobId(*hash.as_bytes())
    }

    /// Hash data from a reader.
    pub fn hash_reader<R: Read>(mut reader: R) -> Result<Self> {
        let mut hasher = blake3::Hasher::new();
        std::io::copy(&mut reader, &mut hasher)?;
        let hash = hasher.finalize();
        Ok(JobId(*hash.as_bytes()))
    }

    /// Hash a file's content. Used by sync to compare user files.
    pub fn hash_file(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::hash_reader(file)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JobId({})", self.to_hex())
    }
}

impl serde::Serialize for JobId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> serde::Deserialize<'de> for JobId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        JobId::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_bytes_length() {
        let id = JobId::hash_bytes(b"");
        assert_eq!(id.to_hex().len(), 64);
    }

    #[test]
    fn test_from_hex_roundtrip() {
        let original = JobId::hash_bytes(b"test data");
        let hex = original.to_hex();
        let parsed = JobId::from_hex(&hex).unwrap();
        assert_eq!(original, parsed);
    }

    #[test]
    fn test_from_hex_invalid_length() {
        assert!(JobId::from_hex("abcd").is_err());
        assert!(JobId::from_hex("").is_err());
    }

    #[test]
    fn test_from_hex_invalid_chars() {
        let invalid = "z".repeat(64);
        assert!(JobId::from_hex(&invalid).is_err());
    }

    #[test]
    fn test_hash_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, b"file content").unwrap();

        let from_file = JobId::hash_file(&path).unwrap();
        let from_bytes = JobId::hash_bytes(b"file content");
        assert_eq!(from_file, from_bytes);
    }

    #[test]
    fn test_serde_roundtrip() {
        let id = JobId::hash_bytes(b"serde");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.to_hex()));
        let back: JobId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }

    // Property-based tests
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            max_shrink_iters: 10000,
            ..ProptestConfig::default()
        })]

        /// Hashing the same bytes always produces the same id.
        #[test]
        fn prop_hash_deterministic(data: Vec<u8>) {
            let id1 = JobId::hash_bytes(&data);
            let id2 = JobId::hash_bytes(&data);
            prop_assert_eq!(id1, id2);
        }

        /// Hex encoding is bijective.
        #[test]
        fn prop_hex_roundtrip(bytes in prop::array::uniform32(any::<u8>())) {
            let id = JobId::from_bytes(bytes);
            let parsed = JobId::from_hex(&id.to_hex())?;
            prop_assert_eq!(id, parsed);
        }

        /// Invalid hex lengths always fail.
        #[test]
        fn prop_invalid_hex_length_fails(
            s in "[0-9a-f]{0,63}|[0-9a-f]{65,128}"
        ) {
            prop_assert!(JobId::from_hex(&s).is_err());
        }
    }
}
