//! Integration tests for the Ferry bridge.

pub mod bridge_tests;
pub mod node_tests;
pub mod queue_tests;
