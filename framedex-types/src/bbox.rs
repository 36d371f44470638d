use geo::Rect;
use serde::{Deserialize, Serialize};

/// Default half-width used when expanding a detection point into a box.
pub const DEFAULT_HALF_WIDTH: f64 = 0.01;

/// An axis-aligned box in normalized `[0,1]` video coordinates.
///
/// Stored as a `geo::Rect`; exposed as `(x, y, width, height)` where `(x, y)`
/// is the top-left corner (y grows downwards, as in frame coordinates).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// The underlying geometric rectangle
    pub rect: Rect,
}

impl BoundingBox {
    /// Create a box from its corner coordinates.
    ///
    /// # Examples
    ///
    /// ```
    /// use framedex_types::bbox::BoundingBox;
    ///
    /// let bbox = BoundingBox::new(0.0, 0.0, 0.5, 0.5);
    /// assert_eq!(bbox.width(), 0.5);
    /// ```
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            rect: Rect::new(
                geo::coord! { x: min_x, y: min_y },
                geo::coord! { x: max_x, y: max_y },
            ),
        }
    }

    /// Create a box from its top-left corner and size.
    pub fn from_xywh(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self::new(x, y, x + width, y + height)
    }

    /// The whole frame.
    pub fn unit() -> Self {
        Self::new(0.0, 0.0, 1.0, 1.0)
    }

    /// Expand a point into a small box clamped to the unit square.
    ///
    /// The result always has a positive area as long as the point lies in
    /// `[0,1]²` and `half_width > 0`.
    ///
    /// ```
    /// use framedex_types::bbox::BoundingBox;
    ///
    /// let bbox = BoundingBox::around_point(1.0, 0.5, 0.01);
    /// assert!((bbox.x() - 0.99).abs() < 1e-12);
    /// assert!(bbox.max_x() <= 1.0);
    /// ```
    pub fn around_point(x: f64, y: f64, half_width: f64) -> Self {
        let min_x = (x - half_width).max(0.0);
        let min_y = (y - half_width).max(0.0);
        let max_x = (x + half_width).min(1.0);
        let max_y = (y + half_width).min(1.0);
        Self::new(min_x, min_y, max_x, max_y)
    }

    pub fn x(&self) -> f64 {
        self.rect.min().x
    }

    pub fn y(&self) -> f64 {
        self.rect.min().y
    }

    pub fn min_x(&self) -> f64 {
        self.rect.min().x
    }

    pub fn min_y(&self) -> f64 {
        self.rect.min().y
    }

    pub fn max_x(&self) -> f64 {
        self.rect.max().x
    }

    pub fn max_y(&self) -> f64 {
        self.rect.max().y
    }

    pub fn width(&self) -> f64 {
        self.max_x() - self.min_x()
    }

    pub fn height(&self) -> f64 {
        self.max_y() - self.min_y()
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// Closed-rectangle intersection: touching edges count as intersecting.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        !(self.max_x() < other.min_x()
            || self.min_x() > other.max_x()
            || self.max_y() < other.min_y()
            || self.min_y() > other.max_y())
    }

    /// Check if `other` lies entirely inside this box.
    pub fn contains(&self, other: &BoundingBox) -> bool {
        other.min_x() >= self.min_x()
            && other.max_x() <= self.max_x()
            && other.min_y() >= self.min_y()
            && other.max_y() <= self.max_y()
    }

    /// Check that every coordinate is finite and inside `[0,1]`.
    pub fn is_normalized(&self) -> bool {
        [self.min_x(), self.min_y(), self.max_x(), self.max_y()]
            .iter()
            .all(|v| v.is_finite() && (0.0..=1.0).contains(v))
    }

    /// Corner form `[x1, y1, x2, y2]`.
    pub fn to_corners(&self) -> [f64; 4] {
        [self.min_x(), self.min_y(), self.max_x(), self.max_y()]
    }
}

/// Named query regions of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AreaPreset {
    TopHalf,
    BottomHalf,
    LeftHalf,
    RightHalf,
    TopThird,
    MiddleThirdHorizontal,
    BottomThird,
    LeftThird,
    MiddleThirdVertical,
    RightThird,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl AreaPreset {
    pub const ALL: [AreaPreset; 14] = [
        AreaPreset::TopHalf,
        AreaPreset::BottomHalf,
        AreaPreset::LeftHalf,
        AreaPreset::RightHalf,
        AreaPreset::TopThird,
        AreaPreset::MiddleThirdHorizontal,
        AreaPreset::BottomThird,
        AreaPreset::LeftThird,
        AreaPreset::MiddleThirdVertical,
        AreaPreset::RightThird,
        AreaPreset::TopLeft,
        AreaPreset::TopRight,
        AreaPreset::BottomLeft,
        AreaPreset::BottomRight,
    ];

    /// Look up a preset by its kebab-case name.
    ///
    /// ```
    /// use framedex_types::bbox::AreaPreset;
    ///
    /// assert_eq!(AreaPreset::from_name("top-left"), Some(AreaPreset::TopLeft));
    /// assert_eq!(AreaPreset::from_name("centre"), None);
    /// ```
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|preset| preset.name() == name)
    }

    pub fn name(&self) -> &'static str {
        match self {
            AreaPreset::TopHalf => "top-half",
            AreaPreset::BottomHalf => "bottom-half",
            AreaPreset::LeftHalf => "left-half",
            AreaPreset::RightHalf => "right-half",
            AreaPreset::TopThird => "top-third",
            AreaPreset::MiddleThirdHorizontal => "middle-third-horizontal",
            AreaPreset::BottomThird => "bottom-third",
            AreaPreset::LeftThird => "left-third",
            AreaPreset::MiddleThirdVertical => "middle-third-vertical",
            AreaPreset::RightThird => "right-third",
            AreaPreset::TopLeft => "top-left",
            AreaPreset::TopRight => "top-right",
            AreaPreset::BottomLeft => "bottom-left",
            AreaPreset::BottomRight => "bottom-right",
        }
    }

    /// Corner coordinates `[x1, y1, x2, y2]`.
    pub fn corners(&self) -> [f64; 4] {
        const THIRD: f64 = 1.0 / 3.0;
        const TWO_THIRDS: f64 = 2.0 / 3.0;
        match self {
            AreaPreset::TopHalf => [0.0, 0.0, 1.0, 0.5],
            AreaPreset::BottomHalf => [0.0, 0.5, 1.0, 1.0],
            AreaPreset::LeftHalf => [0.0, 0.0, 0.5, 1.0],
            AreaPreset::RightHalf => [0.5, 0.0, 1.0, 1.0],
            AreaPreset::TopThird => [0.0, 0.0, 1.0, THIRD],
            AreaPreset::MiddleThirdHorizontal => [0.0, THIRD, 1.0, TWO_THIRDS],
            AreaPreset::BottomThird => [0.0, TWO_THIRDS, 1.0, 1.0],
            AreaPreset::LeftThird => [0.0, 0.0, THIRD, 1.0],
            AreaPreset::MiddleThirdVertical => [THIRD, 0.0, TWO_THIRDS, 1.0],
            AreaPreset::RightThird => [TWO_THIRDS, 0.0, 1.0, 1.0],
            AreaPreset::TopLeft => [0.0, 0.0, 0.5, 0.5],
            AreaPreset::TopRight => [0.5, 0.0, 1.0, 0.5],
            AreaPreset::BottomLeft => [0.0, 0.5, 0.5, 1.0],
            AreaPreset::BottomRight => [0.5, 0.5, 1.0, 1.0],
        }
    }

    pub fn bbox(&self) -> BoundingBox {
        let [x1, y1, x2, y2] = self.corners();
        BoundingBox::new(x1, y1, x2, y2)
    }
}

/// A query region: either a named preset or explicit corners.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Area {
    Preset(AreaPreset),
    Custom(BoundingBox),
}

impl Area {
    pub fn bbox(&self) -> BoundingBox {
        match self {
            Area::Preset(preset) => preset.bbox(),
            Area::Custom(bbox) => *bbox,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_around_point_clamps_to_unit_square() {
        let corner = BoundingBox::around_point(0.0, 0.0, 0.01);
        assert_eq!(corner.x(), 0.0);
        assert_eq!(corner.y(), 0.0);
        assert!(corner.area() > 0.0);
        assert!(corner.is_normalized());

        let far = BoundingBox::around_point(1.0, 1.0, 0.05);
        assert!(far.max_x() <= 1.0 && far.max_y() <= 1.0);
        assert!(far.area() > 0.0);
    }

    #[test]
    fn test_intersection_is_closed() {
        let left = BoundingBox::new(0.0, 0.0, 0.5, 0.5);
        let touching = BoundingBox::new(0.5, 0.0, 1.0, 0.5);
        let apart = BoundingBox::new(0.6, 0.6, 0.9, 0.9);
        assert!(left.intersects(&touching));
        assert!(!left.intersects(&apart));
    }

    #[test]
    fn test_preset_names_round_trip() {
        for preset in AreaPreset::ALL {
            assert_eq!(AreaPreset::from_name(preset.name()), Some(preset));
            assert!(preset.bbox().is_normalized());
        }
    }

    #[test]
    fn test_preset_thirds() {
        let middle = AreaPreset::MiddleThirdVertical.corners();
        assert!((middle[0] - 1.0 / 3.0).abs() < f64::EPSILON);
        assert!((middle[2] - 2.0 / 3.0).abs() < f64::EPSILON);
        assert_eq!(middle[1], 0.0);
        assert_eq!(middle[3], 1.0);
    }
}
