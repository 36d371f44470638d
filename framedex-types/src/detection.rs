use serde::{Deserialize, Serialize};

/// A single positioned sighting of an object inside a detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameObservation {
    /// Seconds from the start of the video.
    pub timestamp: f64,
    /// Position in normalized `[0,1]` frame coordinates.
    pub relative_position: (f64, f64),
}

impl FrameObservation {
    pub fn new(timestamp: f64, x: f64, y: f64) -> Self {
        Self {
            timestamp,
            relative_position: (x, y),
        }
    }

    pub fn x(&self) -> f64 {
        self.relative_position.0
    }

    pub fn y(&self) -> f64 {
        self.relative_position.1
    }
}

/// One detected object instance in one video.
///
/// Detections are produced by an ingestion pipeline and are immutable from
/// the point of view of the query engine.
///
/// # Examples
///
/// ```
/// use framedex_types::detection::{Detection, FrameObservation};
///
/// let det = Detection::new("det-1", "video-a", "person", 2.0, 4.5)
///     .with_frames(vec![FrameObservation::new(2.0, 0.25, 0.75)]);
/// assert_eq!(det.duration(), 2.5);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub id: String,
    pub video_id: String,
    pub object_name: String,
    pub start_time: f64,
    pub end_time: f64,
    #[serde(default)]
    pub frames: Vec<FrameObservation>,
}

impl Detection {
    pub fn new(
        id: impl Into<String>,
        video_id: impl Into<String>,
        object_name: impl Into<String>,
        start_time: f64,
        end_time: f64,
    ) -> Self {
        Self {
            id: id.into(),
            video_id: video_id.into(),
            object_name: object_name.into(),
            start_time,
            end_time,
            frames: Vec::new(),
        }
    }

    pub fn with_frames(mut self, frames: Vec<FrameObservation>) -> Self {
        self.frames = frames;
        self
    }

    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }

    /// Check whether the detection is active at `t` (inclusive bounds).
    pub fn is_active_at(&self, t: f64) -> bool {
        self.start_time <= t && t <= self.end_time
    }
}

/// Compact view of a detection returned by queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionMatch {
    pub id: String,
    pub video_id: String,
    pub object_name: String,
    pub start_time: f64,
    pub end_time: f64,
}

impl From<&Detection> for DetectionMatch {
    fn from(det: &Detection) -> Self {
        Self {
            id: det.id.clone(),
            video_id: det.video_id.clone(),
            object_name: det.object_name.clone(),
            start_time: det.start_time,
            end_time: det.end_time,
        }
    }
}
