//! Content hashing for bundle caching and deterministic capture checks.
//!
//! Produces SHA-256 digests of template sources and of captured frame
//! sequences, so identical inputs can be recognised across jobs and runs.

use sha2::{Digest, Sha256};

use crate::frame::Frame;

/// A content hash digest (SHA-256, 32 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash {
    bytes: [u8; 32],
}

impl ContentHash {
    /// Create from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self { bytes }
    }

    /// Get the hash as a hex string.
    pub fn to_hex(&self) -> String {
        self.bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Hash a template (or any text) source.
pub fn hash_source(source: &str) -> ContentHash {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    finish(hasher)
}

/// Incremental hash over a frame sequence, fed one frame at a time.
#[derive(Clone, Default)]
pub struct FrameSequenceHasher {
    hasher: Sha256,
    frames: u64,
}

impl std::fmt::Debug for FrameSequenceHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSequenceHasher")
            .field("frames", &self.frames)
            .finish_non_exhaustive()
    }
}

impl FrameSequenceHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, frame: &Frame) {
        // Index and timestamp are part of the digest so a reordered or
        // retimed sequence with the same images hashes differently.
        self.hasher.update(frame.index.to_le_bytes());
        self.hasher.update(frame.timestamp_ms.to_le_bytes());
        self.hasher.update((frame.image.len() as u64).to_le_bytes());
        self.hasher.update(&frame.image);
        self.frames += 1;
    }

    pub fn finish(self) -> ContentHash {
        let mut hasher = self.hasher;
        hasher.update(self.frames.to_le_bytes());
        finish(hasher)
    }
}

fn finish(hasher: Sha256) -> ContentHash {
    let result = hasher.finalize();
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&result);
    ContentHash::from_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sequence_hash(images: &[&[u8]]) -> ContentHash {
        let mut hasher = FrameSequenceHasher::new();
        for (i, img) in images.iter().enumerate() {
            hasher.update(&Frame::png(i as u64, i as u64 * 40, img.to_vec()));
        }
        hasher.finish()
    }

    #[test]
    fn test_hash_source_deterministic() {
        assert_eq!(hash_source("<div>{{title}}</div>"), hash_source("<div>{{title}}</div>"));
        assert_ne!(hash_source("<div>{{title}}</div>"), hash_source("<div>{{name}}</div>"));
    }

    #[test]
    fn test_hash_sequence_deterministic() {
        assert_eq!(
            sequence_hash(&[b"red", b"green", b"blue"]),
            sequence_hash(&[b"red", b"green", b"blue"])
        );
    }

    #[test]
    fn test_hash_sequence_order_matters() {
        assert_ne!(sequence_hash(&[b"red", b"green"]), sequence_hash(&[b"green", b"red"]));
    }

    #[test]
    fn test_hash_hex_format() {
        let hex = hash_source("x").to_hex();
        assert_eq!(hex.len(), 64); // SHA-256 = 64 hex chars
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(format!("{}", hash_source("x")), hex);
    }
}
