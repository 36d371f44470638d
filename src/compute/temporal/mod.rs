//! Temporal indexing and time-based algorithms.
//!
//! - `interval_tree`: centred interval tree for point and range queries
//! - `overlap`: sweep-line detection of multi-instance overlap windows
//! - `sequence`: ordered multi-object sequence matching

pub mod interval_tree;
pub mod overlap;
pub mod sequence;

pub use interval_tree::{Interval, IntervalTree};
pub use overlap::{OverlapWindow, find_overlaps};
pub use sequence::{SequenceChain, find_sequences};
