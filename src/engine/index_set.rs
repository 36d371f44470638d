//! The pair of indices built from one generation of detections.

use crate::compute::spatial::SpatialIndex;
use crate::compute::temporal::{Interval, IntervalTree};
use crate::compute::validation::validate_detection;
use crate::config::EngineConfig;
use crate::engine::request::QueryRequest;
use crate::error::{FramedexError, Result};
use framedex_types::bbox::BoundingBox;
use framedex_types::detection::Detection;
use rustc_hash::{FxHashMap, FxHashSet};
use std::cmp::Ordering;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Temporal and spatial indices over a set of detections.
///
/// Every frame of a detection becomes one box in the spatial index, so a
/// detection matches an area if any of its frames does. Detections without
/// frames never match an area predicate.
#[derive(Debug)]
pub struct IndexSet {
    temporal: IntervalTree<Arc<Detection>>,
    spatial: SpatialIndex,
    by_id: FxHashMap<String, Arc<Detection>>,
    by_object: FxHashMap<String, Vec<Arc<Detection>>>,
    box_half_width: f64,
}

impl IndexSet {
    pub fn empty(config: &EngineConfig) -> Self {
        Self {
            temporal: IntervalTree::new(),
            spatial: SpatialIndex::new(config.spatial_max_objects, config.spatial_max_levels),
            by_id: FxHashMap::default(),
            by_object: FxHashMap::default(),
            box_half_width: config.box_half_width,
        }
    }

    /// Validate and index `detections`. Fails on the first invalid or
    /// duplicate detection.
    pub fn build(detections: Vec<Detection>, config: &EngineConfig) -> Result<Self> {
        let mut set = Self::empty(config);
        let mut intervals = Vec::with_capacity(detections.len());

        for detection in detections {
            let detection = set.register(detection)?;
            intervals.push(Interval::new(
                detection.start_time,
                detection.end_time,
                detection,
            )?);
        }
        set.temporal = IntervalTree::build(intervals);

        log::debug!(
            "Built index set: {} detections, {} videos, {} boxes, interval depth {}",
            set.len(),
            set.spatial.video_count(),
            set.spatial.len(),
            set.temporal.depth()
        );
        Ok(set)
    }

    /// Add one detection without rebuilding.
    pub fn insert(&mut self, detection: Detection) -> Result<()> {
        let detection = self.register(detection)?;
        self.temporal.insert(Interval::new(
            detection.start_time,
            detection.end_time,
            detection,
        )?);
        Ok(())
    }

    /// Validate, add to the id/object maps and the spatial index.
    fn register(&mut self, detection: Detection) -> Result<Arc<Detection>> {
        validate_detection(&detection)?;
        if self.by_id.contains_key(&detection.id) {
            return Err(FramedexError::InvalidInput(format!(
                "Duplicate detection id '{}'",
                detection.id
            )));
        }

        for frame in &detection.frames {
            let bbox = BoundingBox::around_point(frame.x(), frame.y(), self.box_half_width);
            self.spatial
                .insert(&detection.video_id, detection.id.clone(), bbox)?;
        }

        let detection = Arc::new(detection);
        self.by_id.insert(detection.id.clone(), detection.clone());
        self.by_object
            .entry(detection.object_name.clone())
            .or_default()
            .push(detection.clone());
        Ok(detection)
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Detection>> {
        self.by_id.get(id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn video_count(&self) -> usize {
        self.by_id
            .values()
            .map(|d| d.video_id.as_str())
            .collect::<FxHashSet<_>>()
            .len()
    }

    pub fn box_count(&self) -> usize {
        self.spatial.len()
    }

    pub fn interval_depth(&self) -> usize {
        self.temporal.depth()
    }

    /// Detections matching the request's object, video, time and area
    /// predicates, ordered by `(video_id, start_time, id)`.
    pub fn candidates(
        &self,
        request: &QueryRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<Arc<Detection>>> {
        let wanted: FxHashSet<&str> = request.objects.iter().map(String::as_str).collect();
        let in_video = |video_id: &str| {
            request
                .video_id
                .as_deref()
                .is_none_or(|video| video == video_id)
        };

        let mut found: Vec<Arc<Detection>> = match request.time_range() {
            Some((start, end)) => self
                .temporal
                .query_interval_cancellable(start, end, cancel)?
                .into_iter()
                .map(|iv| &iv.payload)
                .filter(|d| wanted.contains(d.object_name.as_str()) && in_video(&d.video_id))
                .cloned()
                .collect(),
            None => wanted
                .iter()
                .filter_map(|name| self.by_object.get(*name))
                .flatten()
                .filter(|d| in_video(&d.video_id))
                .cloned()
                .collect(),
        };

        if let Some(area) = &request.area {
            let area = area.bbox();
            let mut hits_by_video: FxHashMap<String, FxHashSet<String>> = FxHashMap::default();
            let mut kept = Vec::with_capacity(found.len());
            for detection in found {
                if !hits_by_video.contains_key(&detection.video_id) {
                    let hits = self
                        .spatial
                        .query_cancellable(&detection.video_id, &area, cancel)?
                        .into_iter()
                        .map(str::to_string)
                        .collect();
                    hits_by_video.insert(detection.video_id.clone(), hits);
                }
                if hits_by_video
                    .get(&detection.video_id)
                    .is_some_and(|hits| hits.contains(&detection.id))
                {
                    kept.push(detection);
                }
            }
            found = kept;
        }

        found.sort_by(|a, b| compare_detections(a, b));
        Ok(found)
    }
}

pub(crate) fn compare_detections(a: &Detection, b: &Detection) -> Ordering {
    a.video_id
        .cmp(&b.video_id)
        .then(a.start_time.total_cmp(&b.start_time))
        .then_with(|| a.id.cmp(&b.id))
}
