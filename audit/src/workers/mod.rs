//! The pipeline's worker tasks.

mod consumer;
mod persist;

pub use consumer::*;
pub use persist::*;
