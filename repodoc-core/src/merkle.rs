//! Merkle root over a repository's documentation set.
//!
//! Leaves are `(file_path, content_hash)` pairs. They are sorted by path before
//! hashing so the root does not depend on the order rows come back in.

use sha2::{Digest, Sha256};

/// Hash of one documented file
pub fn leaf_hash(path: &str, content_hash: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(path.as_bytes());
    // Separator keeps ("ab", "c") and ("a", "bc") apart
    hasher.update([0u8]);
    hasher.update(content_hash.as_bytes());
    hasher.finalize().into()
}

fn node_hash(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// Hex root hash, or `None` for an empty set.
///
/// An odd node at any level is paired with itself.
pub fn merkle_root(leaves: &[(String, String)]) -> Option<String> {
    if leaves.is_empty() {
        return None;
    }

    let mut sorted: Vec<&(String, String)> = leaves.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

    let mut level: Vec<[u8; 32]> = sorted
        .iter()
        .map(|(path, hash)| leaf_hash(path, hash))
        .collect();

    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| {
                let left = &pair[0];
                let right = pair.get(1).unwrap_or(left);
                node_hash(left, right)
            })
            .collect();
    }

    level.first().map(hex::encode)
}
