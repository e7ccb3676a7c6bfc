pub mod packetizer;
pub mod segment_item;

pub use packetizer::{Packetizer, TrackKind};
pub use segment_item::SegmentItem;
