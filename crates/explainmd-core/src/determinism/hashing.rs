//! Deterministic hashing utilities for explainmd.
//!
//! All hashes are:
//! - sha256
//! - computed over UTF-8 bytes of a canonical rendering
//! - hex-encoded lowercase
//!
//! There are no implicit defaults and no alternative algorithms; callers that
//! need a hash go through these helpers so the discipline stays auditable.

use sha2::{Digest, Sha256};

/// Hash raw bytes and return the lowercase hex digest.
pub fn hash_bytes_hex(bytes: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(bytes);
    hex::encode(h.finalize())
}

/// Hash a UTF-8 string.
pub fn hash_str_hex(s: &str) -> String {
    hash_bytes_hex(s.as_bytes())
}

/// Truncated digest used for parent-id suffixes: the first 16 hex characters
/// of the sha256 of the input.
pub fn short_hash_hex16(s: &str) -> String {
    hash_str_hex(s)[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable() {
        assert_eq!(hash_str_hex("abc"), hash_str_hex("abc"));
        assert_eq!(
            hash_str_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn short_hash_is_prefix() {
        let full = hash_str_hex("0:0:a,b");
        assert_eq!(short_hash_hex16("0:0:a,b"), full[..16]);
        assert_eq!(short_hash_hex16("x").len(), 16);
    }
}
