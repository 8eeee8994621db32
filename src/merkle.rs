use sha2::{Digest, Sha256};
use std::sync::OnceLock;

/// Root over an aggregate's event hashes. Odd nodes pair with themselves,
/// so the root is stable as the stream grows one event at a time.
pub fn compute_merkle_root(hashes: &[String]) -> String {
    if hashes.is_empty() {
        return empty_root();
    }

    let mut layer: Vec<String> = hashes.to_vec();

    while layer.len() > 1 {
        let mut next = Vec::new();
        for chunk in layer.chunks(2) {
            let combined = if chunk.len() == 1 {
                format!("{}{}", chunk[0], chunk[0])
            } else {
                format!("{}{}", chunk[0], chunk[1])
            };
            let digest = Sha256::digest(combined.as_bytes());
            next.push(hex::encode(digest));
        }
        layer = next;
    }

    layer.first().cloned().unwrap_or_else(empty_root)
}

pub fn empty_root() -> String {
    static EMPTY: OnceLock<String> = OnceLock::new();
    EMPTY
        .get_or_init(|| hex::encode(Sha256::digest(&[])))
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_empty_root() {
        assert_eq!(compute_merkle_root(&[]), empty_root());
    }

    #[test]
    fn root_is_deterministic() {
        let hashes = vec!["a1".to_string(), "b2".to_string(), "c3".to_string()];
        assert_eq!(compute_merkle_root(&hashes), compute_merkle_root(&hashes));
    }

    #[test]
    fn root_changes_when_any_leaf_changes() {
        let original = vec!["a1".to_string(), "b2".to_string()];
        let tampered = vec!["a1".to_string(), "b9".to_string()];
        assert_ne!(compute_merkle_root(&original), compute_merkle_root(&tampered));
    }
}
