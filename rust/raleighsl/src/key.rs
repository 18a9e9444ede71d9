// raleighsl: flat key plugin
// Content-addressed 32-byte keys derived with SHA-256, ordered by memcmp.

use crate::plugins::{KeyPlugin, PlugInfo, PlugKind};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use uuid::Uuid;

pub const FLAT_KEY_UUID: Uuid = Uuid::from_bytes([
    0x6a, 0x91, 0x0e, 0x2d, 0x7c, 0x44, 0x4d, 0x15, 0xb2, 0x8e, 0x09, 0xd6, 0x5f, 0x23, 0x71,
    0x08,
]);

pub struct FlatKey {
    info: PlugInfo,
}

impl FlatKey {
    pub fn new() -> Self {
        Self {
            info: PlugInfo {
                uuid: FLAT_KEY_UUID,
                label: "key-flat",
                description: "Flat Key",
                kind: PlugKind::Key,
            },
        }
    }
}

impl Default for FlatKey {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyPlugin for FlatKey {
    fn info(&self) -> &PlugInfo {
        &self.info
    }

    fn derive(&self, name: &[u8]) -> [u8; 32] {
        Sha256::digest(name).into()
    }

    fn compare(&self, a: &[u8; 32], b: &[u8; 32]) -> Ordering {
        a.cmp(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_is_stable_and_distinct() {
        let key = FlatKey::new();
        assert_eq!(key.derive(b"hits"), key.derive(b"hits"));
        assert_ne!(key.derive(b"hits"), key.derive(b"miss"));
    }

    #[test]
    fn test_compare_is_memcmp() {
        let key = FlatKey::new();
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        a[0] = 1;
        b[0] = 2;
        assert_eq!(key.compare(&a, &b), Ordering::Less);
        assert_eq!(key.compare(&b, &a), Ordering::Greater);
        assert_eq!(key.compare(&a, &a), Ordering::Equal);
    }
}
