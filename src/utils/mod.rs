//! Utils Module - Shared Helpers
//!
//! Report cache, chain constants, and evaluation statistics.

pub mod cache;
pub mod constants;
pub mod telemetry;

pub use cache::*;
pub use constants::*;
pub use telemetry::*;
