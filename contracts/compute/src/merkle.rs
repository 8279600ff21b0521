//! Canonical-ordering merkle proof verification (spec.md §4.4 step (v)): "at
//! each level, concatenate `min(cur, sib) ∥ max(cur, sib)` lexicographically
//! before hashing" so a proof cannot be replayed with siblings swapped
//! (spec.md §8 S6 "Merkle proof malleability").
use sha2::{Digest, Sha256};

fn hash_pair(a: &[u8; 32], b: &[u8; 32]) -> [u8; 32] {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let mut hasher = Sha256::new();
    hasher.update(lo);
    hasher.update(hi);
    hasher.finalize().into()
}

/// Folds `leaf` up through `proof` (one sibling hash per level) using
/// canonical sibling ordering and compares the result against `root`.
pub fn verify(leaf: &[u8; 32], proof: &[[u8; 32]], root: &[u8; 32]) -> bool {
    let mut current = *leaf;
    for sibling in proof {
        current = hash_pair(&current, sibling);
    }
    &current == root
}

/// `sha256(data)`, used to derive the leaf from a `resultHash` byte string
/// of arbitrary length before folding it into the proof.
pub fn leaf_hash(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_tree(leaves: &[[u8; 32]]) -> (Vec<[u8; 32]>, [u8; 32]) {
        // Builds a proof for leaves[0] against a tree over all `leaves`,
        // always pairing with its immediate sibling (a balanced 2^n tree).
        assert_eq!(leaves.len(), 4, "test helper assumes exactly 4 leaves");
        let h01 = hash_pair(&leaves[0], &leaves[1]);
        let h23 = hash_pair(&leaves[2], &leaves[3]);
        let root = hash_pair(&h01, &h23);
        (vec![leaves[1], h23], root)
    }

    #[test]
    fn valid_canonical_proof_verifies() {
        let leaves: Vec<[u8; 32]> = (0u8..4).map(|i| leaf_hash(&[i])).collect();
        let (proof, root) = build_tree(&leaves);
        assert!(verify(&leaves[0], &proof, &root));
    }

    #[test]
    fn tampered_leaf_fails() {
        let leaves: Vec<[u8; 32]> = (0u8..4).map(|i| leaf_hash(&[i])).collect();
        let (proof, root) = build_tree(&leaves);
        let wrong_leaf = leaf_hash(&[99]);
        assert!(!verify(&wrong_leaf, &proof, &root));
    }

    /// S6: a proof with one sibling pair's concatenation order reversed
    /// must fail. Since `hash_pair` always re-sorts its own inputs, the only
    /// way to actually observe "reversed order" breaking verification is to
    /// build the expected root with a non-canonical (unsorted) concatenation
    /// and check the canonical verifier rejects it.
    #[test]
    fn non_canonical_root_is_rejected_by_canonical_verifier() {
        let leaves: Vec<[u8; 32]> = (0u8..4).map(|i| leaf_hash(&[i])).collect();
        let (proof, _) = build_tree(&leaves);

        // Build a malleable root using raw (unsorted) concatenation instead
        // of the canonical min/max rule.
        let mut hasher = Sha256::new();
        hasher.update(leaves[1]); // sibling first, then `current` - reversed order
        hasher.update(leaves[0]);
        let h01_malleable: [u8; 32] = hasher.finalize().into();
        let mut hasher = Sha256::new();
        hasher.update(h01_malleable);
        hasher.update(proof[1]);
        let malleable_root: [u8; 32] = hasher.finalize().into();

        assert!(!verify(&leaves[0], &proof, &malleable_root));
    }
}
