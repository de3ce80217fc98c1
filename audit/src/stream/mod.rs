//! Attachment to the source database's ordered change stream.

mod memory;
mod source;

pub use memory::*;
pub use source::*;
