// src/utils/crypto.rs

use sha2::{Digest, Sha256};

const VISIBLE_SUFFIX: usize = 4;

/// Masks a credential down to its last four characters.
///
/// Credentials of four characters or fewer are masked completely.
pub fn mask_key(key: &str) -> String {
    let count = key.chars().count();
    if count <= VISIBLE_SUFFIX {
        return "****".to_string();
    }
    let suffix: String = key.chars().skip(count - VISIBLE_SUFFIX).collect();
    format!("****{suffix}")
}

/// Maps a workload id onto `0..slots` using the first eight bytes of its SHA-256 digest.
///
/// Stable across processes and platforms, unlike `std`'s randomly seeded hasher.
pub fn workload_slot(workload_id: &str, slots: usize) -> Option<usize> {
    if slots == 0 {
        return None;
    }
    let digest = Sha256::digest(workload_id.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    let value = u64::from_be_bytes(prefix);
    Some((value % slots as u64) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_key_keeps_only_suffix() {
        assert_eq!(mask_key("gsk_1234567890abcdef"), "****cdef");
        assert_eq!(mask_key("abcd"), "****");
        assert_eq!(mask_key(""), "****");
    }

    #[test]
    fn test_mask_key_is_char_boundary_safe() {
        assert_eq!(mask_key("ключ-секрет"), "****крет");
    }

    #[test]
    fn test_workload_slot_is_deterministic_and_bounded() {
        let first = workload_slot("topic-42", 4).unwrap();
        for _ in 0..10 {
            assert_eq!(workload_slot("topic-42", 4), Some(first));
        }
        assert!(first < 4);
        assert_eq!(workload_slot("topic-42", 0), None);
        assert_eq!(workload_slot("anything", 1), Some(0));
    }
}
