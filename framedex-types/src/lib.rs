//! # framedex-types
//!
//! Core data types for the framedex video detection query engine.
//!
//! - **Detections**: `Detection`, `FrameObservation`, `DetectionMatch`
//! - **Regions**: `BoundingBox`, `AreaPreset`, `Area`
//!
//! All types are serializable with Serde; boxes are built on top of the
//! `geo` crate's `Rect`.
//!
//! ## Examples
//!
//! ```rust
//! use framedex_types::bbox::{AreaPreset, BoundingBox};
//!
//! let person = BoundingBox::around_point(0.2, 0.2, 0.01);
//! assert!(AreaPreset::TopLeft.bbox().intersects(&person));
//! ```

pub mod bbox;
pub mod detection;
