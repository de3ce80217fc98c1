//! Durable checkpoint storage for the resumable stream position.

mod base;
mod memory;
mod postgres;

pub use base::*;
pub use memory::*;
pub use postgres::*;
