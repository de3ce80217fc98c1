mod alerts;
mod analyzer;
mod base;
mod connection;
mod pipeline;
mod targets;

pub use alerts::*;
pub use analyzer::*;
pub use base::*;
pub use connection::*;
pub use pipeline::*;
pub use targets::*;
