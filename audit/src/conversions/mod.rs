//! Conversions between source-typed values and their stored representation.

mod value;

pub use value::*;
