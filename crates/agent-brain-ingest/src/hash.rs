//! Content hashing for change detection

use sha2::{Digest, Sha256};

/// SHA-256 hex digest of file content
///
/// Used both for the dedupe ledger (`source_path -> hash`) and for
/// deriving the project instance id.
pub fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex_string(&hasher.finalize())
}

/// SHA-256 hex digest of arbitrary bytes
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex_string(&hasher.finalize())
}

fn hex_string(digest: &[u8]) -> String {
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(out, "{byte:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashing_is_deterministic() {
        assert_eq!(hash_content("hello"), hash_content("hello"));
        assert_ne!(hash_content("hello"), hash_content("hello "));
        assert_eq!(hash_content("hello").len(), 64);
    }
}
