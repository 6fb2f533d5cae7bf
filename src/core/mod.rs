//! Core Module - Risk Checks & Aggregation
//!
//! Symbol hygiene, bytecode heuristics, honeypot simulation, peg deviation,
//! composite scoring, and the aggregator that ties them together.

pub mod aggregator;
pub mod heuristics;
pub mod honeypot;
pub mod peg;
pub mod risk_score;
pub mod sanitizer;

pub use aggregator::*;
pub use heuristics::*;
pub use honeypot::*;
pub use peg::*;
pub use risk_score::*;
pub use sanitizer::*;
