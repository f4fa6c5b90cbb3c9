//! Consistent hashing ring used to shard keys across backend nodes.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

/// Maps a sharding key to a node name.
///
/// Implementations must be pure: the same key always yields the same
/// node for an unchanged ring.
pub trait HashRing: Send + Sync {
    fn node(&self, key: &str) -> &str;
}

/// Ketama-style ring.
///
/// Each node owns `weight` virtual points on a u64 circle. A key lands on
/// the first point clockwise from its own position.
#[derive(Debug, Clone)]
pub struct Ketama {
    /// Ring position -> index into `names`.
    points: BTreeMap<u64, usize>,
    names: Vec<String>,
}

impl Ketama {
    /// Build a ring over `names`, `weight` points per node.
    ///
    /// Names are sorted first so placement does not depend on
    /// configuration order.
    pub fn new<I, S>(names: I, weight: u16) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: Vec<String> = names.into_iter().map(Into::into).collect();
        names.sort();
        names.dedup();

        let weight = weight.max(1);
        let mut points = BTreeMap::new();
        for (idx, name) in names.iter().enumerate() {
            for i in 0..weight {
                // Position collision: later node wins.
                points.insert(position(format!("{name}-{i}").as_bytes()), idx);
            }
        }

        Self { points, names }
    }

    pub fn node_count(&self) -> usize {
        self.names.len()
    }

    pub fn point_count(&self) -> usize {
        self.points.len()
    }
}

impl HashRing for Ketama {
    fn node(&self, key: &str) -> &str {
        let pos = position(key.as_bytes());
        let idx = self
            .points
            .range(pos..)
            .next()
            .or_else(|| self.points.iter().next())
            .map(|(_, idx)| *idx);

        match idx {
            Some(idx) => self.names[idx].as_str(),
            None => "",
        }
    }
}

/// First 8 bytes of SHA-256, little-endian.
fn position(input: &[u8]) -> u64 {
    let digest = Sha256::digest(input);
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("node{i}")).collect()
    }

    #[test]
    fn empty_ring_returns_empty_name() {
        let ring = Ketama::new(Vec::<String>::new(), 255);
        assert_eq!(ring.node("anything"), "");
        assert_eq!(ring.point_count(), 0);
    }

    #[test]
    fn point_count_matches_weight() {
        let ring = Ketama::new(names(3), 100);
        assert_eq!(ring.node_count(), 3);
        assert_eq!(ring.point_count(), 300);
    }

    #[test]
    fn single_node_owns_everything() {
        let ring = Ketama::new(["only"], 255);
        for i in 0..100 {
            assert_eq!(ring.node(&format!("user-{i}")), "only");
        }
    }

    #[test]
    fn placement_ignores_configuration_order() {
        let a = Ketama::new(["node1", "node2", "node3"], 255);
        let b = Ketama::new(["node3", "node1", "node2"], 255);
        for i in 0..500 {
            let key = format!("sub-{i}");
            assert_eq!(a.node(&key), b.node(&key));
        }
    }

    #[test]
    fn distribution_is_balanced() {
        let ring = Ketama::new(names(4), 255);
        let mut counts = std::collections::HashMap::new();
        for i in 0..10_000 {
            *counts.entry(ring.node(&format!("key-{i}"))).or_insert(0usize) += 1;
        }
        assert_eq!(counts.len(), 4);
        for (node, count) in counts {
            // Expected 2500 each.
            assert!(
                (1500..=3500).contains(&count),
                "{node} got {count} of 10000 keys"
            );
        }
    }

    #[test]
    fn adding_a_node_moves_few_keys() {
        let before = Ketama::new(names(4), 255);
        let after = Ketama::new(names(5), 255);

        let total = 10_000;
        let moved = (0..total)
            .map(|i| format!("key-{i}"))
            .filter(|k| before.node(k) != after.node(k))
            .count();

        // Ideal is total / 5; anything under half proves the ring is consistent.
        assert!(moved < total / 2, "moved {moved} of {total}");
        // Every moved key must have gone to the new node.
        for i in 0..total {
            let key = format!("key-{i}");
            if before.node(&key) != after.node(&key) {
                assert_eq!(after.node(&key), "node5");
            }
        }
    }
}
