//! Data module for datapulse.
//!
//! Holds the simulated datasets in memory and applies live ticks.

mod models;
mod random;
mod seed;
mod store;

pub use models::*;
pub use random::*;
pub use seed::*;
pub use store::*;
