//! Concurrency primitives shared by the pipeline workers.

mod shutdown;

pub use shutdown::*;
