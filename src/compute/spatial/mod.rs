//! Spatial indexing over normalized frame coordinates.

pub mod quadtree;

pub use quadtree::{Quadrant, QuadrantFit, SpatialIndex};
