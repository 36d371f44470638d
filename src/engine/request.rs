//! Typed parsing of query predicates.
//!
//! Callers hand the engine a JSON object. Every field is checked here once,
//! so the query paths only ever see well-formed requests.

use crate::compute::validation::{
    parse_area, validate_area_corners, validate_count, validate_interval,
};
use crate::error::{FramedexError, Result};
use framedex_types::bbox::Area;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

const KNOWN_FIELDS: [&str; 8] = [
    "objects",
    "area",
    "start_time",
    "end_time",
    "count",
    "ordered",
    "max_gap",
    "video_id",
];

/// What a request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    /// Matching detections.
    Detections,
    /// Windows with at least `count` simultaneous instances of one object.
    Overlaps,
    /// Detections of the requested objects appearing in order.
    Sequences,
}

impl QueryKind {
    /// Cache namespace for this kind of query.
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::Detections => "detections",
            QueryKind::Overlaps => "overlaps",
            QueryKind::Sequences => "sequences",
        }
    }
}

/// A validated query predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub objects: Vec<String>,
    pub area: Option<Area>,
    pub start_time: Option<f64>,
    pub end_time: Option<f64>,
    pub count: Option<usize>,
    pub ordered: bool,
    pub max_gap: Option<f64>,
    pub video_id: Option<String>,
}

impl QueryRequest {
    /// Detections of the given objects with no further restriction.
    pub fn objects<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            objects: names.into_iter().map(Into::into).collect(),
            area: None,
            start_time: None,
            end_time: None,
            count: None,
            ordered: false,
            max_gap: None,
            video_id: None,
        }
    }

    pub fn with_area(mut self, area: Area) -> Self {
        self.area = Some(area);
        self
    }

    pub fn with_time_range(mut self, start_time: f64, end_time: f64) -> Self {
        self.start_time = Some(start_time);
        self.end_time = Some(end_time);
        self
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    pub fn with_video(mut self, video_id: impl Into<String>) -> Self {
        self.video_id = Some(video_id.into());
        self
    }

    pub fn in_order(mut self, max_gap: Option<f64>) -> Self {
        self.ordered = true;
        self.max_gap = max_gap;
        self
    }

    /// Parse and validate a request object.
    ///
    /// `objects` may be a single string, which is treated as a one-element
    /// list. Anything else that is not a non-empty array of non-empty strings
    /// is rejected.
    ///
    /// # Examples
    ///
    /// ```
    /// use framedex::engine::request::{QueryKind, QueryRequest};
    /// use serde_json::json;
    ///
    /// let req = QueryRequest::from_json(&json!({"objects": "person", "count": 3}))?;
    /// assert_eq!(req.objects, vec!["person"]);
    /// assert_eq!(req.kind(), QueryKind::Overlaps);
    ///
    /// assert!(QueryRequest::from_json(&json!({"objects": 7})).is_err());
    /// assert!(QueryRequest::from_json(&json!({"objects": ["car"], "count": 1})).is_err());
    /// # Ok::<(), framedex::FramedexError>(())
    /// ```
    pub fn from_json(value: &Value) -> Result<Self> {
        let fields = value.as_object().ok_or_else(|| {
            FramedexError::InvalidInput(format!("Query must be a JSON object, got: {}", value))
        })?;

        if let Some(unknown) = fields.keys().find(|k| !KNOWN_FIELDS.contains(&k.as_str())) {
            return Err(FramedexError::InvalidInput(format!(
                "Unknown query field: '{}'",
                unknown
            )));
        }

        let request = Self {
            objects: parse_objects(fields.get("objects"))?,
            area: match present(fields, "area") {
                Some(v) => Some(parse_area(v)?),
                None => None,
            },
            start_time: parse_number(fields, "start_time")?,
            end_time: parse_number(fields, "end_time")?,
            count: parse_count(fields)?,
            ordered: match present(fields, "ordered") {
                Some(Value::Bool(b)) => *b,
                Some(other) => {
                    return Err(FramedexError::InvalidInput(format!(
                        "Field 'ordered' must be a boolean, got: {}",
                        other
                    )));
                }
                None => false,
            },
            max_gap: parse_number(fields, "max_gap")?,
            video_id: match present(fields, "video_id") {
                Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
                Some(other) => {
                    return Err(FramedexError::InvalidInput(format!(
                        "Field 'video_id' must be a non-empty string, got: {}",
                        other
                    )));
                }
                None => None,
            },
        };

        request.validate()?;
        Ok(request)
    }

    /// Check cross-field constraints. Builder-made requests go through this
    /// before execution as well.
    pub fn validate(&self) -> Result<()> {
        if self.objects.is_empty() {
            return Err(FramedexError::InvalidInput(
                "At least one object name is required".into(),
            ));
        }
        if let Some(name) = self.objects.iter().find(|n| n.trim().is_empty()) {
            return Err(FramedexError::InvalidInput(format!(
                "Object names cannot be empty, got: '{}'",
                name
            )));
        }

        if let Some(area) = &self.area {
            let [x1, y1, x2, y2] = area.bbox().to_corners();
            validate_area_corners(x1, y1, x2, y2)?;
        }

        if let (Some(start), Some(end)) = (self.start_time, self.end_time) {
            validate_interval(start, end)?;
        }
        for (name, value) in [("start_time", self.start_time), ("end_time", self.end_time)] {
            if let Some(v) = value
                && !v.is_finite()
            {
                return Err(FramedexError::InvalidInput(format!(
                    "Field '{}' must be finite, got: {}",
                    name, v
                )));
            }
        }

        if let Some(count) = self.count {
            validate_count(count)?;
            if self.ordered {
                return Err(FramedexError::InvalidInput(
                    "A query cannot ask for both 'count' and 'ordered'".into(),
                ));
            }
        }

        if let Some(gap) = self.max_gap {
            if !self.ordered {
                return Err(FramedexError::InvalidInput(
                    "Field 'max_gap' only applies to ordered queries".into(),
                ));
            }
            if !gap.is_finite() || gap < 0.0 {
                return Err(FramedexError::InvalidInput(format!(
                    "Field 'max_gap' must be a non-negative number, got: {}",
                    gap
                )));
            }
        }

        Ok(())
    }

    pub fn kind(&self) -> QueryKind {
        if self.count.is_some() {
            QueryKind::Overlaps
        } else if self.ordered {
            QueryKind::Sequences
        } else {
            QueryKind::Detections
        }
    }

    /// The time range to scan, open ends widened to infinity.
    pub fn time_range(&self) -> Option<(f64, f64)> {
        match (self.start_time, self.end_time) {
            (None, None) => None,
            (start, end) => Some((
                start.unwrap_or(f64::NEG_INFINITY),
                end.unwrap_or(f64::INFINITY),
            )),
        }
    }

    /// Parameters as a JSON object for cache keying. Presets are expanded
    /// to corners so a preset and its explicit rectangle share an entry.
    /// Object order is kept since it matters for ordered queries.
    pub fn cache_params(&self) -> Value {
        json!({
            "objects": self.objects,
            "area": self.area.map(|a| a.bbox().to_corners()),
            "start_time": self.start_time,
            "end_time": self.end_time,
            "count": self.count,
            "max_gap": self.max_gap,
            "video_id": self.video_id,
        })
    }
}

/// A field that is present and not null.
fn present<'a>(fields: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    fields.get(name).filter(|v| !v.is_null())
}

fn parse_objects(value: Option<&Value>) -> Result<Vec<String>> {
    match value {
        Some(Value::String(name)) => Ok(vec![name.clone()]),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(idx, item)| match item {
                Value::String(name) => Ok(name.clone()),
                other => Err(FramedexError::InvalidInput(format!(
                    "Object at index {} must be a string, got: {}",
                    idx, other
                ))),
            })
            .collect(),
        Some(other) => Err(FramedexError::InvalidInput(format!(
            "Field 'objects' must be a string or an array of strings, got: {}",
            other
        ))),
        None => Err(FramedexError::InvalidInput(
            "Field 'objects' is required".into(),
        )),
    }
}

fn parse_number(fields: &Map<String, Value>, name: &str) -> Result<Option<f64>> {
    match present(fields, name) {
        Some(v) => v.as_f64().map(Some).ok_or_else(|| {
            FramedexError::InvalidInput(format!("Field '{}' must be a number, got: {}", name, v))
        }),
        None => Ok(None),
    }
}

fn parse_count(fields: &Map<String, Value>) -> Result<Option<usize>> {
    match present(fields, "count") {
        Some(v) => {
            let count = v.as_u64().ok_or_else(|| {
                FramedexError::InvalidInput(format!(
                    "Field 'count' must be a non-negative integer, got: {}",
                    v
                ))
            })?;
            Ok(Some(count as usize))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use framedex_types::bbox::AreaPreset;

    fn invalid(value: Value) -> bool {
        matches!(
            QueryRequest::from_json(&value),
            Err(FramedexError::InvalidInput(_))
        )
    }

    #[test]
    fn test_objects_shapes() {
        let req = QueryRequest::from_json(&json!({"objects": "car"})).unwrap();
        assert_eq!(req.objects, vec!["car"]);

        let req = QueryRequest::from_json(&json!({"objects": ["car", "person"]})).unwrap();
        assert_eq!(req.objects, vec!["car", "person"]);
        assert_eq!(req.kind(), QueryKind::Detections);

        assert!(invalid(json!({})));
        assert!(invalid(json!({"objects": []})));
        assert!(invalid(json!({"objects": [""]})));
        assert!(invalid(json!({"objects": ["car", 3]})));
        assert!(invalid(json!({"objects": {"name": "car"}})));
        assert!(invalid(json!(["car"])));
    }

    #[test]
    fn test_area_parsing() {
        let req = QueryRequest::from_json(&json!({"objects": "dog", "area": "top-left"})).unwrap();
        assert_eq!(req.area, Some(Area::Preset(AreaPreset::TopLeft)));

        let req = QueryRequest::from_json(&json!({"objects": "dog", "area": null})).unwrap();
        assert!(req.area.is_none());

        assert!(invalid(json!({"objects": "dog", "area": "middle"})));
        assert!(invalid(json!({"objects": "dog", "area": [0.5, 0.5, 0.1, 0.9]})));
        assert!(invalid(json!({"objects": "dog", "area": [0.0, 0.0, 1.0, 1.5]})));
    }

    #[test]
    fn test_count_and_time_validation() {
        assert!(invalid(json!({"objects": "dog", "count": 1})));
        assert!(invalid(json!({"objects": "dog", "count": 2.5})));
        assert!(invalid(json!({"objects": "dog", "count": -3})));
        assert!(invalid(json!({"objects": "dog", "start_time": 5, "end_time": 1})));
        assert!(invalid(json!({"objects": "dog", "start_time": "soon"})));

        let req =
            QueryRequest::from_json(&json!({"objects": "dog", "start_time": 2})).unwrap();
        assert_eq!(req.time_range(), Some((2.0, f64::INFINITY)));
    }

    #[test]
    fn test_mode_conflicts() {
        let req = QueryRequest::from_json(&json!({
            "objects": ["door", "person"], "ordered": true, "max_gap": 30
        }))
        .unwrap();
        assert_eq!(req.kind(), QueryKind::Sequences);
        assert_eq!(req.max_gap, Some(30.0));

        assert!(invalid(json!({"objects": "dog", "ordered": true, "count": 2})));
        assert!(invalid(json!({"objects": "dog", "max_gap": 3})));
        assert!(invalid(json!({"objects": "dog", "ordered": "yes"})));
        assert!(invalid(json!({"objects": "dog", "colour": "red"})));
    }

    #[test]
    fn test_cache_params_normalize_area() {
        let preset = QueryRequest::from_json(&json!({"objects": "cat", "area": "top-half"})).unwrap();
        let explicit =
            QueryRequest::from_json(&json!({"objects": "cat", "area": [0, 0, 1, 0.5]})).unwrap();
        assert_eq!(preset.cache_params(), explicit.cache_params());
    }

    #[test]
    fn test_builder_requests_validate() {
        let req = QueryRequest::objects(["car"]).with_count(3);
        assert!(req.validate().is_ok());
        assert!(QueryRequest::objects(["car"]).with_count(0).validate().is_err());
        assert!(QueryRequest::objects(Vec::<String>::new()).validate().is_err());
    }

    #[test]
    fn test_builder_area_is_validated() {
        use framedex_types::bbox::BoundingBox;

        let outside = QueryRequest::objects(["car"])
            .with_area(Area::Custom(BoundingBox::new(0.5, 0.5, 1.5, 1.2)));
        assert!(matches!(outside.validate(), Err(FramedexError::InvalidInput(_))));

        let negative = QueryRequest::objects(["car"])
            .with_area(Area::Custom(BoundingBox::new(-0.2, 0.0, 0.3, 0.3)));
        assert!(negative.validate().is_err());

        let inside = QueryRequest::objects(["car"])
            .with_area(Area::Custom(BoundingBox::new(0.1, 0.1, 0.5, 0.5)));
        assert!(inside.validate().is_ok());
        let preset = QueryRequest::objects(["car"]).with_area(Area::Preset(AreaPreset::BottomRight));
        assert!(preset.validate().is_ok());
    }
}
