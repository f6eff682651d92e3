//! Sequential three-leg order execution.

pub mod engine;
pub mod lot_size;

pub use engine::ExecutionEngine;
pub use lot_size::{format_quantity, step_precision};
