//! Test fixtures and helpers.
//!
//! Common setup code for multi-node scenario tests.

use std::time::Duration;

use roundsync_core::Name;

use crate::fabric::{FabricConfig, SimFabric};

/// A ready-made sync group on a simulated fabric.
pub struct TestGroup {
    /// The fabric the group runs on.
    pub fabric: SimFabric,
    /// Indices of the group's nodes, in creation order.
    pub nodes: Vec<usize>,
}

impl TestGroup {
    /// Spin up `count` nodes under `/node/<letter>` prefixes.
    pub fn new(count: usize) -> Self {
        Self::with_config(count, FabricConfig::default())
    }

    /// Spin up `count` nodes with explicit fabric knobs.
    pub fn with_config(count: usize, config: FabricConfig) -> Self {
        assert!(count <= 26, "one letter per node");
        let mut fabric = SimFabric::with_config("/sync/group", config);
        let nodes = (0..count)
            .map(|i| {
                let letter = (b'a' + i as u8) as char;
                fabric.add_node(&format!("/node/{letter}"))
            })
            .collect();
        Self { fabric, nodes }
    }

    /// Run the group forward by `millis` milliseconds.
    pub fn run_ms(&mut self, millis: u64) {
        self.fabric.run_for(Duration::from_millis(millis));
    }

    /// The session name of node `index`.
    pub fn session(&self, index: usize) -> Name {
        self.fabric.logic(self.nodes[index]).session_name().clone()
    }

    /// True when every node holds the same state with the same digest.
    pub fn converged(&self) -> bool {
        let first = self.fabric.logic(self.nodes[0]);
        self.nodes.iter().skip(1).all(|&node| {
            let logic = self.fabric.logic(node);
            logic.state() == first.state() && logic.root_digest() == first.root_digest()
        })
    }

    /// Panic with a state dump unless the group converged.
    pub fn assert_converged(&self) {
        if !self.converged() {
            for &node in &self.nodes {
                let logic = self.fabric.logic(node);
                eprintln!(
                    "node {} state: {:?} (round {})",
                    logic.user_prefix(),
                    logic.state(),
                    logic.current_round()
                );
            }
            panic!("sync group did not converge");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_setup() {
        let group = TestGroup::new(3);
        assert_eq!(group.nodes.len(), 3);
        assert!(group.converged(), "empty nodes are trivially converged");
        assert_ne!(group.session(0), group.session(1));
    }
}
