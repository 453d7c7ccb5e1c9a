//! Scheduler plugins for heterogeneous clusters.
//!
//! Three plugins cover the three heterogeneities the scheduler is aware of:
//!
//! - `Hicev1` narrows pods to nodes whose CPU architecture can run every
//!   container image, and substitutes per-arch image names at bind time.
//! - `Hicev2` filters and scores nodes by single-thread performance,
//!   rescaling CPU requests authored against a reference node.
//! - `MHice` sequences and places pods of a microservice graph to keep
//!   chatty services close to each other.
//!
//! The orchestrator host owns the scheduling queue and calls the hooks;
//! this crate only implements them.

pub mod cycle_state;
pub mod graph;
pub mod models;
pub mod plugins;
pub mod snapshot;
pub mod topology;
