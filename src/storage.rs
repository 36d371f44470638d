//! Boundary to the external detection store.
//!
//! The engine holds no durable state. Indices are rebuilt from whatever
//! implements [`DetectionStore`]; `MemoryStore` is the in-process version
//! used by tests, benches and embedders that already have detections loaded.

use crate::error::{FramedexError, Result};
use framedex_types::detection::Detection;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Predicate for counting detections in the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionFilter {
    /// Empty means every object.
    #[serde(default)]
    pub object_names: Vec<String>,
    #[serde(default)]
    pub video_id: Option<String>,
    #[serde(default)]
    pub start_time: Option<f64>,
    #[serde(default)]
    pub end_time: Option<f64>,
}

impl DetectionFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_objects<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.object_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_video(mut self, video_id: impl Into<String>) -> Self {
        self.video_id = Some(video_id.into());
        self
    }

    pub fn with_time_range(mut self, start_time: f64, end_time: f64) -> Self {
        self.start_time = Some(start_time);
        self.end_time = Some(end_time);
        self
    }

    /// Closed-interval overlap on time, exact match on names and video.
    pub fn matches(&self, detection: &Detection) -> bool {
        if !self.object_names.is_empty()
            && !self.object_names.iter().any(|n| *n == detection.object_name)
        {
            return false;
        }
        if let Some(video) = &self.video_id
            && *video != detection.video_id
        {
            return false;
        }
        if let Some(start) = self.start_time
            && detection.end_time < start
        {
            return false;
        }
        if let Some(end) = self.end_time
            && detection.start_time > end
        {
            return false;
        }
        true
    }
}

/// Source of detections the indices are built from.
pub trait DetectionStore: Send + Sync {
    /// Detections of the given objects, optionally limited to one video.
    /// An empty `object_names` slice selects every object.
    fn list_detections(
        &self,
        object_names: &[String],
        video_id: Option<&str>,
    ) -> Result<Vec<Detection>>;

    /// Number of detections matching `filter`.
    fn count_detections(&self, filter: &DetectionFilter) -> Result<usize>;
}

/// Detections held in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    detections: RwLock<Vec<Detection>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_detections(detections: Vec<Detection>) -> Self {
        Self {
            detections: RwLock::new(detections),
        }
    }

    /// Add a detection. Ids must be unique.
    pub fn add(&self, detection: Detection) -> Result<()> {
        let mut detections = self.detections.write();
        if detections.iter().any(|d| d.id == detection.id) {
            return Err(FramedexError::InvalidInput(format!(
                "Duplicate detection id '{}'",
                detection.id
            )));
        }
        detections.push(detection);
        Ok(())
    }

    pub fn extend(&self, detections: impl IntoIterator<Item = Detection>) -> Result<()> {
        for detection in detections {
            self.add(detection)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.detections.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.read().is_empty()
    }
}

impl DetectionStore for MemoryStore {
    fn list_detections(
        &self,
        object_names: &[String],
        video_id: Option<&str>,
    ) -> Result<Vec<Detection>> {
        let filter = DetectionFilter {
            object_names: object_names.to_vec(),
            video_id: video_id.map(str::to_string),
            ..Default::default()
        };
        Ok(self
            .detections
            .read()
            .iter()
            .filter(|d| filter.matches(d))
            .cloned()
            .collect())
    }

    fn count_detections(&self, filter: &DetectionFilter) -> Result<usize> {
        Ok(self
            .detections
            .read()
            .iter()
            .filter(|d| filter.matches(d))
            .count())
    }
}
