//! # roundsync testkit
//!
//! Test infrastructure for the roundsync protocol:
//!
//! - [`SimFabric`] - a deterministic in-process named-data fabric running
//!   any number of protocol nodes against a virtual clock, with partition
//!   injection
//! - [`TestGroup`] - ready-made multi-node groups with convergence
//!   assertions
//! - [`generators`] - proptest strategies for names, states, and payloads

pub mod fabric;
pub mod fixtures;
pub mod generators;

pub use fabric::{FabricConfig, SimFabric};
pub use fixtures::TestGroup;
