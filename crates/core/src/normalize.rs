//! Payload normalization and content hashing.
//!
//! Fetched bytes pass through here exactly once before they are persisted.
//! Normalization is a pure function: identical input always yields the same
//! payload and the same content hash.

use crate::error::NormalizeError;
use sha2::{Digest, Sha256};

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// A validated payload together with its integrity digest.
#[derive(Debug, Clone)]
pub struct Normalized {
    pub payload: Vec<u8>,
    /// Lowercase hex SHA-256 of `payload`.
    pub content_hash: String,
}

/// Canonicalize raw fetched bytes and compute their content hash.
///
/// Canonicalization strips a leading UTF-8 BOM so that byte-identical
/// documents hash identically regardless of how the origin served them.
///
/// Minimum-validity policy:
/// - an empty payload (before or after BOM stripping) is rejected
/// - a payload consisting solely of NUL bytes is rejected, since that is
///   the signature of a truncated or zero-filled transfer
pub fn normalize(raw: &[u8]) -> Result<Normalized, NormalizeError> {
    let body = raw.strip_prefix(UTF8_BOM).unwrap_or(raw);

    if body.is_empty() {
        return Err(NormalizeError::Empty);
    }
    if body.iter().all(|b| *b == 0) {
        return Err(NormalizeError::Malformed("payload is all NUL bytes".to_string()));
    }

    Ok(Normalized { payload: body.to_vec(), content_hash: compute_content_hash(body) })
}

/// Compute the lowercase hex SHA-256 digest of a payload.
pub fn compute_content_hash(payload: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_deterministic() {
        let a = normalize(b"hello world").unwrap();
        let b = normalize(b"hello world").unwrap();
        assert_eq!(a.content_hash, b.content_hash);
        assert_eq!(a.payload, b.payload);
    }

    #[test]
    fn test_normalize_strips_bom() {
        let with_bom = [UTF8_BOM, b"content".as_slice()].concat();
        let stripped = normalize(&with_bom).unwrap();
        let plain = normalize(b"content").unwrap();
        assert_eq!(stripped.payload, plain.payload);
        assert_eq!(stripped.content_hash, plain.content_hash);
    }

    #[test]
    fn test_normalize_rejects_empty() {
        assert!(matches!(normalize(b""), Err(NormalizeError::Empty)));
    }

    #[test]
    fn test_normalize_rejects_bom_only() {
        assert!(matches!(normalize(UTF8_BOM), Err(NormalizeError::Empty)));
    }

    #[test]
    fn test_normalize_rejects_all_nul() {
        assert!(matches!(normalize(&[0u8; 64]), Err(NormalizeError::Malformed(_))));
    }

    #[test]
    fn test_hash_format() {
        let hash = compute_content_hash(b"abc");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_hash_matches_payload() {
        let normalized = normalize(b"payload bytes").unwrap();
        assert_eq!(normalized.content_hash, compute_content_hash(&normalized.payload));
    }
}
