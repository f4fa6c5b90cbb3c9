/// NodeRouter: resolves a sharding key to one configured node.
///
/// Pure lookup over a ring built once at startup. With a single node
/// the ring is skipped entirely.
use std::collections::BTreeSet;

use crate::error::StorageError;
use crate::ring::{HashRing, Ketama};

/// Virtual points per node when no weight is configured.
pub const DEFAULT_RING_WEIGHT: u16 = 255;

pub struct NodeRouter {
    nodes: BTreeSet<String>,
    ring: Box<dyn HashRing>,
}

impl NodeRouter {
    /// Router over a Ketama ring of `names`.
    pub fn new<I, S>(names: I, weight: u16) -> Result<Self, StorageError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let nodes: BTreeSet<String> = names.into_iter().map(Into::into).collect();
        let ring = Ketama::new(nodes.iter().cloned(), weight);
        Self::with_ring(nodes, Box::new(ring))
    }

    /// Router over a caller-supplied ring.
    pub fn with_ring<I, S>(names: I, ring: Box<dyn HashRing>) -> Result<Self, StorageError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let nodes: BTreeSet<String> = names.into_iter().map(Into::into).collect();
        if nodes.is_empty() {
            return Err(StorageError::Config("at least one node is required".into()));
        }
        Ok(Self { nodes, ring })
    }

    /// Node that owns `key`.
    pub fn resolve(&self, key: &str) -> Result<&str, StorageError> {
        if self.nodes.len() == 1 {
            if let Some(only) = self.nodes.iter().next() {
                return Ok(only.as_str());
            }
        }

        let node = self.ring.node(key);
        match self.nodes.get(node) {
            Some(name) => Ok(name.as_str()),
            None => {
                tracing::warn!("key {key:?} resolved to unconfigured node {node:?}");
                Err(StorageError::UnknownNode {
                    node: node.to_string(),
                })
            }
        }
    }

    /// Configured node names, sorted.
    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(String::as_str)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Ring that always answers with a fixed name.
    struct FixedRing(&'static str);

    impl HashRing for FixedRing {
        fn node(&self, _key: &str) -> &str {
            self.0
        }
    }

    #[test]
    fn empty_node_set_is_config_error() {
        let err = NodeRouter::new(Vec::<String>::new(), 255).err().unwrap();
        assert!(matches!(err, StorageError::Config(_)));
    }

    #[test]
    fn single_node_bypasses_ring() {
        // A ring that would fail resolution proves it is never consulted.
        let router = NodeRouter::with_ring(["alpha"], Box::new(FixedRing("ghost"))).unwrap();
        assert_eq!(router.resolve("user-1").unwrap(), "alpha");
        assert_eq!(router.resolve("").unwrap(), "alpha");
    }

    #[test]
    fn single_node_matches_ring() {
        let router = NodeRouter::new(["alpha"], DEFAULT_RING_WEIGHT).unwrap();
        let ring = Ketama::new(["alpha"], DEFAULT_RING_WEIGHT);
        for i in 0..50 {
            let key = format!("k{i}");
            assert_eq!(router.resolve(&key).unwrap(), ring.node(&key));
        }
    }

    #[test]
    fn resolves_to_configured_nodes() {
        let router = NodeRouter::new(["node1", "node2", "node3"], DEFAULT_RING_WEIGHT).unwrap();
        let nodes: Vec<&str> = router.nodes().collect();
        for i in 0..200 {
            let node = router.resolve(&format!("sub-{i}")).unwrap();
            assert!(nodes.contains(&node));
        }
    }

    #[test]
    fn misbehaving_ring_reports_unknown_node() {
        let router =
            NodeRouter::with_ring(["node1", "node2"], Box::new(FixedRing("node9"))).unwrap();
        let err = router.resolve("user-1").unwrap_err();
        assert!(matches!(err, StorageError::UnknownNode { node } if node == "node9"));
    }

    #[test]
    fn duplicate_names_collapse() {
        let router = NodeRouter::new(["a", "a", "b"], DEFAULT_RING_WEIGHT).unwrap();
        assert_eq!(router.node_count(), 2);
    }
}
