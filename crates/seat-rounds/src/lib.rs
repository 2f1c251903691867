//! Multi-round admission seat allocation.
//!
//! Candidates are ranked by a precomputed merit score and offered seats from a
//! reserved-category quota table, round after round, while honoring the
//! decisions each candidate recorded after the previous round.

pub mod allocation;
pub mod config;
pub mod error;
pub mod import;
pub mod telemetry;
