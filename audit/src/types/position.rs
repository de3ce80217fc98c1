//! Stream positions within the ordered change stream.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A durable position within the change stream.
///
/// Positions order first by segment name, then by byte offset within the
/// segment. Segment names carry a monotonically increasing numeric suffix,
/// so lexicographic comparison of equal-length names matches rotation order.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct StreamPosition {
    /// Name of the stream segment, e.g. `binlog.000042`.
    pub segment: String,
    /// Byte offset within the segment.
    pub offset: u64,
}

impl StreamPosition {
    pub fn new(segment: impl Into<String>, offset: u64) -> Self {
        Self {
            segment: segment.into(),
            offset,
        }
    }
}

impl PartialEq for StreamPosition {
    fn eq(&self, other: &Self) -> bool {
        self.segment == other.segment && self.offset == other.offset
    }
}

impl PartialOrd for StreamPosition {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for StreamPosition {
    fn cmp(&self, other: &Self) -> Ordering {
        self.segment
            .cmp(&other.segment)
            .then(self.offset.cmp(&other.offset))
    }
}

impl fmt::Display for StreamPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.segment, self.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positions_order_by_segment_then_offset() {
        let a = StreamPosition::new("binlog.000001", 500);
        let b = StreamPosition::new("binlog.000001", 900);
        let c = StreamPosition::new("binlog.000002", 4);

        assert!(a < b);
        assert!(b < c);
        assert!(a < c);
    }

    #[test]
    fn test_position_display() {
        let position = StreamPosition::new("binlog.000042", 1337);
        assert_eq!(position.to_string(), "binlog.000042:1337");
    }
}
