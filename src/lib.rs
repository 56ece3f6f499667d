//! Traceroute measurements from many origin networks through RIPE Atlas, and analysis of
//! the autonomous systems those paths have in common.

pub mod allocation;
pub mod analyzer;
pub mod asn;
pub mod atlas;
pub mod error;
pub mod orchestrator;
pub mod report;
pub mod target;
pub mod types;

pub use error::{Error, Result};
