//! Typed view of one chart annotation record.
//!
//! Only the sections the translator touches are modelled; every other key is
//! kept in the flattened `extra` maps so records round-trip without loss.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::error::AnnotationError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotationRecord {
    pub general_figure_info: FigureInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub models: Option<Vec<ModelEntry>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FigureInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<TextField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legend: Option<Legend>,
    pub x_axis: Axis,
    pub y_axis: Axis,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextField {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Legend {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<LegendItem>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegendItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<TextField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Entry of the top-level `models` list; `name` mirrors a legend label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Axis {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<TextField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub major_labels: Option<ValueSeries>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<ValueSeries>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Tick values of an axis, optionally paired with one box per value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueSeries {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<FieldValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bboxes: Option<Vec<BoundingBox>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Box corners are kept as the JSON numbers they were read from, so integer
/// coordinates are written back as integers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: Number,
    pub y: Number,
    pub w: Number,
    pub h: Number,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Result<Self, AnnotationError> {
        let invalid = || AnnotationError::InvalidBox { x, y, w, h };
        let number = |value: f64| Number::from_f64(value).ok_or_else(invalid);
        Ok(Self {
            x: number(x)?,
            y: number(y)?,
            w: number(w)?,
            h: number(h)?,
        })
    }

    pub fn x(&self) -> f64 {
        coordinate(&self.x)
    }

    pub fn y(&self) -> f64 {
        coordinate(&self.y)
    }

    pub fn w(&self) -> f64 {
        coordinate(&self.w)
    }

    pub fn h(&self) -> f64 {
        coordinate(&self.h)
    }

    pub fn validate(&self) -> Result<(), AnnotationError> {
        let (x, y, w, h) = (self.x(), self.y(), self.w(), self.h());
        let finite = [x, y, w, h].iter().all(|value| value.is_finite());
        if !finite || w < 0.0 || h < 0.0 {
            return Err(AnnotationError::InvalidBox { x, y, w, h });
        }
        Ok(())
    }

    pub fn is_horizontal(&self) -> bool {
        self.w() > self.h()
    }
}

fn coordinate(value: &Number) -> f64 {
    value.as_f64().unwrap_or(f64::NAN)
}

/// A series value. Translation turns numeric strings into `Number`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(Number),
    Text(String),
    Null,
}

impl FieldValue {
    /// Numeric form of a parsed string. `None` for values JSON cannot hold.
    pub fn from_f64(value: f64) -> Option<Self> {
        Number::from_f64(value).map(FieldValue::Number)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text.as_str()),
            _ => None,
        }
    }

    /// String form used when the value is drawn or stored in a text field.
    pub fn into_text(self) -> String {
        match self {
            FieldValue::Text(text) => text,
            FieldValue::Number(value) => value.to_string(),
            FieldValue::Null => String::new(),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}
