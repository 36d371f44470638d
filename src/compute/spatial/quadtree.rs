//! Per-video quadtree over normalized bounding boxes.
//!
//! Each video gets its own tree over the unit square. A node keeps up to
//! `max_objects` boxes before splitting into four quadrants, down to
//! `max_levels`. A box moves into a child only if it fits entirely inside
//! that child's quadrant; boxes straddling a midline stay at the node.
//! Queries use the tree only to prune, then filter candidates by exact
//! rectangle intersection.

use crate::error::{FramedexError, Result};
use framedex_types::bbox::BoundingBox;
use rustc_hash::{FxHashMap, FxHashSet};
use tokio_util::sync::CancellationToken;

pub const DEFAULT_MAX_OBJECTS: usize = 10;
pub const DEFAULT_MAX_LEVELS: usize = 4;

/// Child quadrants of a node. "Top" is smaller `y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quadrant {
    TopRight,
    TopLeft,
    BottomLeft,
    BottomRight,
}

impl Quadrant {
    fn index(self) -> usize {
        match self {
            Quadrant::TopRight => 0,
            Quadrant::TopLeft => 1,
            Quadrant::BottomLeft => 2,
            Quadrant::BottomRight => 3,
        }
    }
}

/// Where a box belongs relative to a node's quadrants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuadrantFit {
    /// Spans a midline; stays at the current node.
    NoFit,
    /// Lies strictly inside one child quadrant.
    Child(Quadrant),
}

impl QuadrantFit {
    /// Classify `bbox` against the midlines of `bounds`.
    pub fn of(bounds: &BoundingBox, bbox: &BoundingBox) -> Self {
        let mid_x = bounds.min_x() + bounds.width() / 2.0;
        let mid_y = bounds.min_y() + bounds.height() / 2.0;

        let top = bbox.max_y() < mid_y;
        let bottom = bbox.min_y() > mid_y;
        let left = bbox.max_x() < mid_x;
        let right = bbox.min_x() > mid_x;

        match (left, right, top, bottom) {
            (true, _, true, _) => QuadrantFit::Child(Quadrant::TopLeft),
            (_, true, true, _) => QuadrantFit::Child(Quadrant::TopRight),
            (true, _, _, true) => QuadrantFit::Child(Quadrant::BottomLeft),
            (_, true, _, true) => QuadrantFit::Child(Quadrant::BottomRight),
            _ => QuadrantFit::NoFit,
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    object_id: String,
    bbox: BoundingBox,
}

#[derive(Debug)]
struct QuadNode {
    bounds: BoundingBox,
    level: usize,
    entries: Vec<Entry>,
    children: Option<Box<[QuadNode; 4]>>,
}

impl QuadNode {
    fn new(bounds: BoundingBox, level: usize) -> Self {
        Self {
            bounds,
            level,
            entries: Vec::new(),
            children: None,
        }
    }

    fn split(&mut self) {
        let b = self.bounds;
        let mid_x = b.min_x() + b.width() / 2.0;
        let mid_y = b.min_y() + b.height() / 2.0;
        let level = self.level + 1;

        // Ordered to match `Quadrant::index`.
        self.children = Some(Box::new([
            QuadNode::new(BoundingBox::new(mid_x, b.min_y(), b.max_x(), mid_y), level),
            QuadNode::new(BoundingBox::new(b.min_x(), b.min_y(), mid_x, mid_y), level),
            QuadNode::new(BoundingBox::new(b.min_x(), mid_y, mid_x, b.max_y()), level),
            QuadNode::new(BoundingBox::new(mid_x, mid_y, b.max_x(), b.max_y()), level),
        ]));
    }

    fn insert(&mut self, entry: Entry, max_objects: usize, max_levels: usize) {
        let bounds = self.bounds;

        if let Some(children) = self.children.as_mut()
            && let QuadrantFit::Child(q) = QuadrantFit::of(&bounds, &entry.bbox)
        {
            children[q.index()].insert(entry, max_objects, max_levels);
            return;
        }

        self.entries.push(entry);

        if self.entries.len() > max_objects && self.level < max_levels {
            if self.children.is_none() {
                self.split();
            }
            let Some(children) = self.children.as_mut() else {
                return;
            };

            let pending = std::mem::take(&mut self.entries);
            for entry in pending {
                match QuadrantFit::of(&bounds, &entry.bbox) {
                    QuadrantFit::Child(q) => {
                        children[q.index()].insert(entry, max_objects, max_levels)
                    }
                    QuadrantFit::NoFit => self.entries.push(entry),
                }
            }
        }
    }

    /// Push every entry that could intersect `area`. Returns false if
    /// `stop` fired.
    fn collect<'a>(
        &'a self,
        area: &BoundingBox,
        out: &mut Vec<&'a Entry>,
        stop: &dyn Fn() -> bool,
    ) -> bool {
        if stop() {
            return false;
        }

        out.extend(self.entries.iter());

        let Some(children) = self.children.as_ref() else {
            return true;
        };

        match QuadrantFit::of(&self.bounds, area) {
            QuadrantFit::Child(q) => children[q.index()].collect(area, out, stop),
            QuadrantFit::NoFit => children.iter().all(|child| child.collect(area, out, stop)),
        }
    }

    fn depth(&self) -> usize {
        1 + self
            .children
            .as_ref()
            .map_or(0, |c| c.iter().map(|n| n.depth()).max().unwrap_or(0))
    }
}

/// Spatial index with one quadtree per video.
///
/// # Examples
///
/// ```
/// use framedex::compute::spatial::SpatialIndex;
/// use framedex_types::bbox::{AreaPreset, BoundingBox};
///
/// let mut index = SpatialIndex::default();
/// index.insert("video-1", "det-1", BoundingBox::around_point(0.1, 0.1, 0.01))?;
/// index.insert("video-1", "det-2", BoundingBox::around_point(0.9, 0.9, 0.01))?;
///
/// assert_eq!(index.query("video-1", &AreaPreset::TopLeft.bbox()), vec!["det-1"]);
/// assert!(index.query("video-2", &BoundingBox::unit()).is_empty());
/// # Ok::<(), framedex::FramedexError>(())
/// ```
#[derive(Debug)]
pub struct SpatialIndex {
    roots: FxHashMap<String, QuadNode>,
    max_objects: usize,
    max_levels: usize,
    len: usize,
}

impl SpatialIndex {
    pub fn new(max_objects: usize, max_levels: usize) -> Self {
        Self {
            roots: FxHashMap::default(),
            max_objects: max_objects.max(1),
            max_levels,
            len: 0,
        }
    }

    /// Add one box under `video_id`. Boxes must lie inside the unit square.
    pub fn insert(
        &mut self,
        video_id: &str,
        object_id: impl Into<String>,
        bbox: BoundingBox,
    ) -> Result<()> {
        if !bbox.is_normalized() {
            return Err(FramedexError::InvalidInput(format!(
                "Bounding box {:?} is outside the unit square",
                bbox.to_corners()
            )));
        }

        let entry = Entry {
            object_id: object_id.into(),
            bbox,
        };

        let root = self
            .roots
            .entry(video_id.to_string())
            .or_insert_with(|| QuadNode::new(BoundingBox::unit(), 0));
        root.insert(entry, self.max_objects, self.max_levels);
        self.len += 1;
        Ok(())
    }

    /// Ids of objects with at least one box intersecting `area`, each
    /// reported once, in discovery order. Unknown videos yield nothing.
    pub fn query(&self, video_id: &str, area: &BoundingBox) -> Vec<&str> {
        self.query_until(video_id, area, &|| false)
            .unwrap_or_default()
    }

    pub fn query_cancellable(
        &self,
        video_id: &str,
        area: &BoundingBox,
        cancel: &CancellationToken,
    ) -> Result<Vec<&str>> {
        self.query_until(video_id, area, &|| cancel.is_cancelled())
            .ok_or(FramedexError::Cancelled)
    }

    fn query_until(
        &self,
        video_id: &str,
        area: &BoundingBox,
        stop: &dyn Fn() -> bool,
    ) -> Option<Vec<&str>> {
        let Some(root) = self.roots.get(video_id) else {
            return Some(Vec::new());
        };

        let mut candidates = Vec::new();
        if !root.collect(area, &mut candidates, stop) {
            return None;
        }

        let mut seen = FxHashSet::default();
        Some(
            candidates
                .into_iter()
                .filter(|entry| entry.bbox.intersects(area))
                .map(|entry| entry.object_id.as_str())
                .filter(|id| seen.insert(*id))
                .collect(),
        )
    }

    pub fn videos(&self) -> impl Iterator<Item = &str> {
        self.roots.keys().map(String::as_str)
    }

    pub fn video_count(&self) -> usize {
        self.roots.len()
    }

    /// Number of boxes stored across all videos.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Height of a video's tree; 0 if the video is unknown.
    pub fn depth(&self, video_id: &str) -> usize {
        self.roots.get(video_id).map_or(0, QuadNode::depth)
    }

    pub fn clear(&mut self) {
        self.roots.clear();
        self.len = 0;
    }
}

impl Default for SpatialIndex {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_OBJECTS, DEFAULT_MAX_LEVELS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use framedex_types::bbox::AreaPreset;

    fn grid_boxes(n: usize) -> Vec<(String, BoundingBox)> {
        (0..n)
            .map(|i| {
                let x = ((i * 37) % 100) as f64 / 100.0;
                let y = ((i * 61) % 100) as f64 / 100.0;
                let half = 0.005 + (i % 7) as f64 * 0.02;
                (format!("obj{}", i), BoundingBox::around_point(x, y, half))
            })
            .collect()
    }

    fn sorted(ids: Vec<&str>) -> Vec<String> {
        let mut ids: Vec<String> = ids.into_iter().map(String::from).collect();
        ids.sort();
        ids
    }

    #[test]
    fn test_quadrant_fit() {
        let unit = BoundingBox::unit();
        assert_eq!(
            QuadrantFit::of(&unit, &BoundingBox::new(0.1, 0.1, 0.2, 0.2)),
            QuadrantFit::Child(Quadrant::TopLeft)
        );
        assert_eq!(
            QuadrantFit::of(&unit, &BoundingBox::new(0.6, 0.1, 0.7, 0.2)),
            QuadrantFit::Child(Quadrant::TopRight)
        );
        assert_eq!(
            QuadrantFit::of(&unit, &BoundingBox::new(0.1, 0.6, 0.2, 0.7)),
            QuadrantFit::Child(Quadrant::BottomLeft)
        );
        assert_eq!(
            QuadrantFit::of(&unit, &BoundingBox::new(0.6, 0.6, 0.7, 0.7)),
            QuadrantFit::Child(Quadrant::BottomRight)
        );
        assert_eq!(
            QuadrantFit::of(&unit, &BoundingBox::new(0.4, 0.1, 0.6, 0.2)),
            QuadrantFit::NoFit
        );
        // Touching the midline counts as spanning it.
        assert_eq!(
            QuadrantFit::of(&unit, &BoundingBox::new(0.1, 0.1, 0.5, 0.2)),
            QuadrantFit::NoFit
        );
    }

    #[test]
    fn test_full_square_returns_everything() {
        let mut index = SpatialIndex::default();
        let boxes = grid_boxes(500);
        for (id, bbox) in &boxes {
            index.insert("v", id.clone(), *bbox).unwrap();
        }
        assert_eq!(index.len(), 500);
        assert!(index.depth("v") > 1);
        assert_eq!(index.query("v", &BoundingBox::unit()).len(), 500);
    }

    #[test]
    fn test_query_matches_brute_force() {
        let mut index = SpatialIndex::new(4, 6);
        let boxes = grid_boxes(400);
        for (id, bbox) in &boxes {
            index.insert("v", id.clone(), *bbox).unwrap();
        }

        let mut areas: Vec<BoundingBox> = AreaPreset::ALL.iter().map(|p| p.bbox()).collect();
        areas.push(BoundingBox::new(0.12, 0.3, 0.13, 0.31));
        areas.push(BoundingBox::new(0.5, 0.5, 0.5, 0.5));
        areas.push(BoundingBox::new(0.0, 0.0, 0.26, 0.9));

        for area in areas {
            let mut expected: Vec<String> = boxes
                .iter()
                .filter(|(_, b)| b.intersects(&area))
                .map(|(id, _)| id.clone())
                .collect();
            expected.sort();
            assert_eq!(sorted(index.query("v", &area)), expected, "{:?}", area);
        }
    }

    #[test]
    fn test_videos_are_isolated() {
        let mut index = SpatialIndex::default();
        index
            .insert("a", "x", BoundingBox::around_point(0.5, 0.5, 0.01))
            .unwrap();
        assert!(index.query("b", &BoundingBox::unit()).is_empty());
        assert_eq!(index.video_count(), 1);
        assert_eq!(index.depth("b"), 0);
    }

    #[test]
    fn test_duplicate_ids_reported_once() {
        let mut index = SpatialIndex::default();
        for i in 0..30 {
            let t = i as f64 / 30.0;
            index
                .insert("v", "walker", BoundingBox::around_point(t, t, 0.01))
                .unwrap();
        }
        assert_eq!(index.query("v", &BoundingBox::unit()), vec!["walker"]);
    }

    #[test]
    fn test_spanning_boxes_stay_at_parent() {
        let mut index = SpatialIndex::new(1, 4);
        for i in 0..5 {
            index
                .insert("v", format!("wide{}", i), BoundingBox::new(0.1, 0.1, 0.9, 0.9))
                .unwrap();
        }
        // Nothing fits a quadrant, so the tree splits once but children stay empty.
        assert_eq!(index.depth("v"), 2);
        assert_eq!(index.query("v", &AreaPreset::TopLeft.bbox()).len(), 5);
    }

    #[test]
    fn test_rejects_boxes_outside_unit_square() {
        let mut index = SpatialIndex::default();
        assert!(
            index
                .insert("v", "bad", BoundingBox::new(0.5, 0.5, 1.5, 0.9))
                .is_err()
        );
        assert!(index.is_empty());
    }

    #[test]
    fn test_cancelled_query() {
        let mut index = SpatialIndex::default();
        index
            .insert("v", "a", BoundingBox::around_point(0.5, 0.5, 0.01))
            .unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(
            index.query_cancellable("v", &BoundingBox::unit(), &cancel),
            Err(FramedexError::Cancelled)
        ));
    }
}
