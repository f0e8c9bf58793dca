//! Detection records produced by the OCR collaborator
//!
//! Raw records arrive in either of the two shapes OCR engines commonly emit and
//! are validated into [`Detection`]s before any other stage sees them.

use crate::error::ScanError;
use serde::{Deserialize, Serialize};

/// Minimum number of polygon points a detection box must carry
pub const MIN_POLYGON_POINTS: usize = 4;

/// A 2-D point, serialized as `[x, y]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<[f64; 2]> for Point {
    fn from([x, y]: [f64; 2]) -> Self {
        Self { x, y }
    }
}

impl From<Point> for [f64; 2] {
    fn from(p: Point) -> Self {
        [p.x, p.y]
    }
}

/// Axis-aligned extents of a polygon
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extents {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl Extents {
    /// Extents of a non-empty point set
    pub fn of(points: &[Point]) -> Option<Self> {
        let first = points.first()?;
        let init = Self {
            x_min: first.x,
            x_max: first.x,
            y_min: first.y,
            y_max: first.y,
        };
        Some(points.iter().skip(1).fold(init, |acc, p| Self {
            x_min: acc.x_min.min(p.x),
            x_max: acc.x_max.max(p.x),
            y_min: acc.y_min.min(p.y),
            y_max: acc.y_max.max(p.y),
        }))
    }

    pub fn union(&self, other: &Extents) -> Self {
        Self {
            x_min: self.x_min.min(other.x_min),
            x_max: self.x_max.max(other.x_max),
            y_min: self.y_min.min(other.y_min),
            y_max: self.y_max.max(other.y_max),
        }
    }

    /// Clockwise rectangle starting at the top-left corner
    pub fn to_polygon(&self) -> Vec<Point> {
        vec![
            Point::new(self.x_min, self.y_min),
            Point::new(self.x_max, self.y_min),
            Point::new(self.x_max, self.y_max),
            Point::new(self.x_min, self.y_max),
        ]
    }
}

/// A detection as received on the wire.
///
/// Accepts both `{"bbox": .., "text": .., "confidence": ..}` and the positional
/// `[bbox, text, confidence]` triple. Anything else is kept as `Malformed` so
/// one bad record is rejected during validation instead of failing the whole
/// document.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RawDetection {
    Record {
        bbox: Vec<Point>,
        #[serde(default)]
        text: String,
        confidence: f32,
    },
    Tuple(Vec<Point>, String, f32),
    Malformed(serde_json::Value),
}

/// Shape of the record form, used to explain why a record did not fit
#[derive(Deserialize)]
#[allow(dead_code)]
struct RecordShape {
    bbox: Vec<Point>,
    #[serde(default)]
    text: String,
    confidence: f32,
}

type TupleShape = (Vec<Point>, String, f32);

/// Human-readable reason a value matches neither accepted shape
fn shape_error(value: serde_json::Value) -> String {
    let err = match value {
        serde_json::Value::Object(_) => serde_json::from_value::<RecordShape>(value).err(),
        serde_json::Value::Array(_) => serde_json::from_value::<TupleShape>(value).err(),
        other => {
            return format!(
                "expected an object or a [bbox, text, confidence] array, got {}",
                json_kind(&other)
            )
        }
    };
    match err {
        Some(e) => format!("unexpected record shape: {}", e),
        None => "unexpected record shape".to_string(),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

impl RawDetection {
    #[cfg(test)]
    pub fn new(bbox: Vec<Point>, text: impl Into<String>, confidence: f32) -> Self {
        Self::Record {
            bbox,
            text: text.into(),
            confidence,
        }
    }

    fn into_parts(self) -> Result<(Vec<Point>, String, f32), String> {
        match self {
            Self::Record {
                bbox,
                text,
                confidence,
            } => Ok((bbox, text, confidence)),
            Self::Tuple(bbox, text, confidence) => Ok((bbox, text, confidence)),
            Self::Malformed(value) => Err(shape_error(value)),
        }
    }
}

/// A validated detection; immutable once built
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    bbox: Vec<Point>,
    extents: Extents,
    text: String,
    confidence: f32,
}

impl Detection {
    /// Validate a raw record. `index` is its position in the input and only
    /// used for error reporting.
    pub fn from_raw(index: usize, raw: RawDetection) -> Result<Self, ScanError> {
        let malformed = |reason: String| ScanError::MalformedDetection { index, reason };
        let (bbox, text, confidence) = raw.into_parts().map_err(&malformed)?;

        if bbox.len() < MIN_POLYGON_POINTS {
            return Err(malformed(format!(
                "polygon has {} points, need at least {}",
                bbox.len(),
                MIN_POLYGON_POINTS
            )));
        }
        if bbox.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(malformed("polygon has non-finite coordinates".to_string()));
        }
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(malformed(format!(
                "confidence {} is outside [0, 1]",
                confidence
            )));
        }

        // Non-empty by the length check above
        let extents = Extents::of(&bbox)
            .ok_or_else(|| malformed("polygon is empty".to_string()))?;

        Ok(Self {
            bbox,
            extents,
            text,
            confidence,
        })
    }

    pub fn bbox(&self) -> &[Point] {
        &self.bbox
    }

    pub fn extents(&self) -> &Extents {
        &self.extents
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    /// Same geometry and confidence with replacement text
    pub fn with_text(self, text: String) -> Self {
        Self { text, ..self }
    }
}
