//! Core data types for the audit pipeline.

mod alert;
mod event;
mod position;
mod record;
mod risk;
mod value;

pub use alert::*;
pub use event::*;
pub use position::*;
pub use record::*;
pub use risk::*;
pub use value::*;
