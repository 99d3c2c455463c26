//! View module: filter pipeline and open-view registry.

mod filter;
mod session;

pub use filter::*;
pub use session::*;
