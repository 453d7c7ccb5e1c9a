//! Performance analyzer.
//!
//! Joins per-node container CPU measurements from the broker with the
//! cluster workload tree and derives relative per-node performance
//! advisories. The analyzer only reports; updating node performance
//! labels stays an operator action.

pub mod consumer;
pub mod perf;
pub mod workload;
