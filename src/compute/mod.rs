//! Compute layer for indexing and query algorithms.
//!
//! This module separates computation from storage and caching concerns.
//! It provides:
//! - Temporal indexing, overlap detection and sequence matching
//! - Spatial indexing of detection boxes
//! - Input validation shared by the engine and the indices
//!
//! Everything here is independent of where detections come from.

pub mod spatial;
pub mod temporal;
pub mod validation;
