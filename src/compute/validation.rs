//! Validation for times, normalized coordinates and query regions.

use crate::error::{FramedexError, Result};
use framedex_types::bbox::{Area, AreaPreset, BoundingBox};
use framedex_types::detection::Detection;
use serde_json::Value;

/// Validates a time range in seconds.
///
/// # Examples
///
/// ```
/// use framedex::compute::validation::validate_interval;
///
/// assert!(validate_interval(1.0, 1.0).is_ok());
/// assert!(validate_interval(2.0, 1.0).is_err());
/// assert!(validate_interval(f64::NAN, 1.0).is_err());
/// ```
pub fn validate_interval(start: f64, end: f64) -> Result<()> {
    if !start.is_finite() {
        return Err(FramedexError::InvalidInput(format!(
            "Start time must be finite, got: {}",
            start
        )));
    }

    if !end.is_finite() {
        return Err(FramedexError::InvalidInput(format!(
            "End time must be finite, got: {}",
            end
        )));
    }

    if start > end {
        return Err(FramedexError::InvalidInput(format!(
            "Start time ({}) must be <= end time ({})",
            start, end
        )));
    }

    Ok(())
}

/// Validates a point in normalized frame coordinates.
///
/// ```
/// use framedex::compute::validation::validate_normalized_point;
///
/// assert!(validate_normalized_point(0.0, 1.0).is_ok());
/// assert!(validate_normalized_point(1.2, 0.5).is_err());
/// ```
pub fn validate_normalized_point(x: f64, y: f64) -> Result<()> {
    for (axis, v) in [("x", x), ("y", y)] {
        if !v.is_finite() {
            return Err(FramedexError::InvalidInput(format!(
                "Coordinate {} must be finite, got: {}",
                axis, v
            )));
        }
        if !(0.0..=1.0).contains(&v) {
            return Err(FramedexError::InvalidInput(format!(
                "Coordinate {} out of range [0.0, 1.0]: {}",
                axis, v
            )));
        }
    }
    Ok(())
}

/// Validates explicit area corners `[x1, y1, x2, y2]`.
///
/// Degenerate areas (`x1 == x2`) are allowed; inverted ones are not.
pub fn validate_area_corners(x1: f64, y1: f64, x2: f64, y2: f64) -> Result<BoundingBox> {
    validate_normalized_point(x1, y1)?;
    validate_normalized_point(x2, y2)?;

    if x1 > x2 {
        return Err(FramedexError::InvalidInput(format!(
            "x1 ({}) must be <= x2 ({})",
            x1, x2
        )));
    }
    if y1 > y2 {
        return Err(FramedexError::InvalidInput(format!(
            "y1 ({}) must be <= y2 ({})",
            y1, y2
        )));
    }

    Ok(BoundingBox::new(x1, y1, x2, y2))
}

/// Parses a query area from either a preset name or a four-number array.
///
/// ```
/// use framedex::compute::validation::parse_area;
/// use serde_json::json;
///
/// assert!(parse_area(&json!("top-left")).is_ok());
/// assert!(parse_area(&json!([0.1, 0.1, 0.4, 0.4])).is_ok());
/// assert!(parse_area(&json!("somewhere")).is_err());
/// assert!(parse_area(&json!([0.1, 0.1, 0.4])).is_err());
/// ```
pub fn parse_area(value: &Value) -> Result<Area> {
    match value {
        Value::String(name) => AreaPreset::from_name(name.trim())
            .map(Area::Preset)
            .ok_or_else(|| FramedexError::InvalidInput(format!("Unknown area name: '{}'", name))),
        Value::Array(items) => {
            if items.len() != 4 {
                return Err(FramedexError::InvalidInput(format!(
                    "Area must have exactly 4 coordinates, got {}",
                    items.len()
                )));
            }
            let mut coords = [0.0; 4];
            for (idx, item) in items.iter().enumerate() {
                coords[idx] = item.as_f64().ok_or_else(|| {
                    FramedexError::InvalidInput(format!(
                        "Area coordinate at index {} is not a number: {}",
                        idx, item
                    ))
                })?;
            }
            let [x1, y1, x2, y2] = coords;
            validate_area_corners(x1, y1, x2, y2).map(Area::Custom)
        }
        other => Err(FramedexError::InvalidInput(format!(
            "Area must be a name or an array of 4 numbers, got: {}",
            other
        ))),
    }
}

/// Validates a required simultaneous instance count.
pub fn validate_count(count: usize) -> Result<()> {
    if count < 2 {
        return Err(FramedexError::InvalidInput(format!(
            "Count must be at least 2, got: {}",
            count
        )));
    }
    Ok(())
}

/// Validates a detection before it enters an index.
pub fn validate_detection(detection: &Detection) -> Result<()> {
    if detection.id.is_empty() {
        return Err(FramedexError::InvalidInput(
            "Detection id cannot be empty".into(),
        ));
    }
    if detection.video_id.is_empty() {
        return Err(FramedexError::InvalidInput(format!(
            "Detection '{}' has an empty video id",
            detection.id
        )));
    }

    validate_interval(detection.start_time, detection.end_time).map_err(|e| {
        FramedexError::InvalidInput(format!("Detection '{}': {}", detection.id, e))
    })?;

    for (idx, frame) in detection.frames.iter().enumerate() {
        validate_normalized_point(frame.x(), frame.y()).map_err(|e| {
            FramedexError::InvalidInput(format!(
                "Detection '{}' frame at index {}: {}",
                detection.id, idx, e
            ))
        })?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use framedex_types::detection::FrameObservation;
    use serde_json::json;

    #[test]
    fn test_validate_interval() {
        assert!(validate_interval(0.0, 10.0).is_ok());
        assert!(validate_interval(5.0, 5.0).is_ok());

        assert!(validate_interval(10.0, 0.0).is_err());
        assert!(validate_interval(f64::INFINITY, 1.0).is_err());
        assert!(validate_interval(0.0, f64::NAN).is_err());
    }

    #[test]
    fn test_parse_area_presets() {
        let area = parse_area(&json!("bottom-right")).unwrap();
        assert_eq!(area.bbox().to_corners(), [0.5, 0.5, 1.0, 1.0]);

        let area = parse_area(&json!(" top-half ")).unwrap();
        assert_eq!(area, Area::Preset(AreaPreset::TopHalf));
    }

    #[test]
    fn test_parse_area_rejects_malformed() {
        assert!(parse_area(&json!("middle")).is_err());
        assert!(parse_area(&json!([0.5, 0.5, 0.1, 0.9])).is_err());
        assert!(parse_area(&json!([0.0, 0.0, 1.5, 1.0])).is_err());
        assert!(parse_area(&json!([0.0, "0", 1.0, 1.0])).is_err());
        assert!(parse_area(&json!({"x1": 0.0})).is_err());
        assert!(parse_area(&json!(null)).is_err());
    }

    #[test]
    fn test_validate_count() {
        assert!(validate_count(2).is_ok());
        assert!(validate_count(1).is_err());
        assert!(validate_count(0).is_err());
    }

    #[test]
    fn test_validate_detection() {
        let ok = Detection::new("d1", "v1", "cat", 1.0, 2.0)
            .with_frames(vec![FrameObservation::new(1.0, 0.5, 0.5)]);
        assert!(validate_detection(&ok).is_ok());

        let inverted = Detection::new("d2", "v1", "cat", 3.0, 2.0);
        assert!(validate_detection(&inverted).is_err());

        let off_frame = Detection::new("d3", "v1", "cat", 1.0, 2.0)
            .with_frames(vec![FrameObservation::new(1.0, 1.5, 0.5)]);
        assert!(validate_detection(&off_frame).is_err());

        let no_video = Detection::new("d4", "", "cat", 1.0, 2.0);
        assert!(validate_detection(&no_video).is_err());
    }
}
