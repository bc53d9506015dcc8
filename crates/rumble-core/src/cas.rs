//! Content-addressed blob store.

use std::collections::HashMap;
use std::fmt::Write as _;

use sha2::{Digest, Sha256};

/// Prefix every key carries; the remainder is the lower-hex digest.
pub const HASH_PREFIX: &str = "sha256:";

/// Session-lifetime map from `sha256:<hex>` keys to payload bytes.
/// Insertion is idempotent and entries are never evicted.
#[derive(Debug, Default)]
pub struct ContentStore {
    blobs: HashMap<String, Vec<u8>>,
}

impl ContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent insert. The producer computed `hash` at ingest time; the
    /// store does not re-verify it.
    pub fn put(&mut self, hash: &str, bytes: Vec<u8>) {
        self.blobs.entry(hash.to_string()).or_insert(bytes);
    }

    pub fn has(&self, hash: &str) -> bool {
        self.blobs.contains_key(hash)
    }

    pub fn get(&self, hash: &str) -> Option<&[u8]> {
        self.blobs.get(hash).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    /// Key for `bytes`: `"sha256:" + hex(sha256(bytes))`.
    pub fn hash_of(bytes: &[u8]) -> String {
        let digest = Sha256::digest(bytes);
        let mut key = String::with_capacity(HASH_PREFIX.len() + digest.len() * 2);
        key.push_str(HASH_PREFIX);
        for byte in digest {
            let _ = write!(&mut key, "{byte:02x}");
        }
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_of_matches_sha256_test_vectors() {
        assert_eq!(
            ContentStore::hash_of(b""),
            "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            ContentStore::hash_of(b"abc"),
            "sha256:ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn put_get_roundtrip() {
        let mut store = ContentStore::new();
        let payload = b"sprite sheet bytes".to_vec();
        let key = ContentStore::hash_of(&payload);
        assert!(!store.has(&key));
        store.put(&key, payload.clone());
        assert!(store.has(&key));
        assert_eq!(store.get(&key), Some(payload.as_slice()));
    }

    #[test]
    fn put_is_idempotent() {
        let mut store = ContentStore::new();
        store.put("sha256:00", b"first".to_vec());
        store.put("sha256:00", b"second".to_vec());
        assert_eq!(store.get("sha256:00"), Some(b"first".as_slice()));
        assert_eq!(store.len(), 1);
    }
}
