//! Spatiotemporal indexing and query engine for video object detections.
//!
//! Detections (an object seen in a video over a time range, with per-frame
//! positions) are indexed by time in a centred interval tree and by position
//! in one quadtree per video. Queries ask which detections of some objects
//! fall in a region or time range, where several instances of an object are
//! visible at once, or where objects appear in a given order. Results are
//! cached and handed back as pages, cursor pages or a JSON stream.
//!
//! ```rust
//! use framedex::prelude::*;
//! use serde_json::json;
//!
//! let engine = EngineBuilder::new()
//!     .detections(vec![
//!         Detection::new("c1", "street", "car", 0.0, 8.0)
//!             .with_frames(vec![FrameObservation::new(0.0, 0.2, 0.3)]),
//!         Detection::new("c2", "street", "car", 5.0, 9.0)
//!             .with_frames(vec![FrameObservation::new(5.0, 0.8, 0.7)]),
//!     ])
//!     .build()?;
//!
//! let top_left = engine.execute_json(&json!({"objects": "car", "area": "top-left"}))?;
//! assert_eq!(top_left.len(), 1);
//!
//! let together = engine.execute_json(&json!({"objects": ["car"], "count": 2}))?;
//! assert_eq!(together.len(), 1);
//! # Ok::<(), framedex::FramedexError>(())
//! ```

pub mod builder;
pub mod cache;
pub mod compute;
pub mod config;
pub mod engine;
pub mod error;
pub mod pagination;
pub mod storage;

pub use builder::EngineBuilder;
pub use cache::{CacheStats, QueryCache};
pub use config::EngineConfig;
pub use engine::{
    EngineStats, OverlapMatch, QueryEngine, QueryKind, QueryRequest, QueryResult, ResultItem,
    SequenceMatch,
};
pub use error::{FramedexError, Result};
pub use pagination::{CursorPage, Page, PageInfo, PageLinks, paginate};
pub use storage::{DetectionFilter, DetectionStore, MemoryStore};

pub use compute::spatial::SpatialIndex;
pub use compute::temporal::{Interval, IntervalTree, OverlapWindow, find_overlaps};

pub use framedex_types::bbox::{Area, AreaPreset, BoundingBox};
pub use framedex_types::detection::{Detection, DetectionMatch, FrameObservation};

pub use geo::Rect;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports
pub mod prelude {

    pub use crate::{EngineBuilder, EngineConfig, FramedexError, QueryEngine, Result};

    pub use crate::{QueryKind, QueryRequest, QueryResult, ResultItem};

    pub use crate::{Area, AreaPreset, BoundingBox, Detection, FrameObservation};

    pub use crate::{DetectionStore, MemoryStore};

    pub use crate::{Page, paginate};

    pub use tokio_util::sync::CancellationToken;
}
