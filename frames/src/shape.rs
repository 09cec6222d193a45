//! Typed shape attributes carried inside Shape Records.
//!
//! The replication core treats a [`Shape`] as an opaque payload: it is
//! serialized to JSON, carried as bytes, and handed back to the scene graph
//! untouched. Only scene-graph adapters look inside.

use serde::{Deserialize, Serialize};

/// Discriminant of a [`Shape`], useful when a scene graph needs to know
/// whether an in-place update is possible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
    Rect,
    Ellipse,
    Line,
    Arrow,
    Path,
    Text,
}

/// A point in scene coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Placement shared by every shape kind.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    /// Left edge of the bounding box in scene coordinates.
    pub left: f64,
    /// Top edge of the bounding box in scene coordinates.
    pub top: f64,
    #[serde(default = "unit_scale")]
    pub scale_x: f64,
    #[serde(default = "unit_scale")]
    pub scale_y: f64,
    /// Clockwise rotation in degrees around the bounding-box center.
    #[serde(default)]
    pub angle: f64,
}

fn unit_scale() -> f64 {
    1.0
}

impl Default for Transform {
    fn default() -> Self {
        Self { left: 0.0, top: 0.0, scale_x: 1.0, scale_y: 1.0, angle: 0.0 }
    }
}

impl Transform {
    #[must_use]
    pub fn at(left: f64, top: f64) -> Self {
        Self { left, top, ..Self::default() }
    }
}

/// Paint shared by every shape kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Style {
    /// Fill color as a CSS color string; `None` means transparent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<String>,
    /// Stroke color as a CSS color string.
    pub stroke: String,
    /// Stroke width in scene units.
    pub stroke_width: f64,
}

impl Default for Style {
    fn default() -> Self {
        Self { fill: None, stroke: "#000000".into(), stroke_width: 2.0 }
    }
}

/// Rectangle or ellipse inscribed in a `width` x `height` box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxShape {
    #[serde(flatten)]
    pub transform: Transform,
    #[serde(flatten)]
    pub style: Style,
    pub width: f64,
    pub height: f64,
}

/// Straight segment (optionally with an arrowhead at `to`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineShape {
    #[serde(flatten)]
    pub transform: Transform,
    #[serde(flatten)]
    pub style: Style,
    pub from: Point,
    pub to: Point,
}

/// Freehand stroke (pen, marker, highlighter).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathShape {
    #[serde(flatten)]
    pub transform: Transform,
    #[serde(flatten)]
    pub style: Style,
    pub points: Vec<Point>,
    /// Stroke opacity in `0.0..=1.0`; highlighters use a low value.
    #[serde(default = "full_opacity")]
    pub opacity: f64,
}

fn full_opacity() -> f64 {
    1.0
}

/// Text label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextShape {
    #[serde(flatten)]
    pub transform: Transform,
    #[serde(flatten)]
    pub style: Style,
    pub text: String,
    pub font_size: f64,
}

/// Drawable shape state, keyed by shape type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Shape {
    Rect(BoxShape),
    Ellipse(BoxShape),
    Line(LineShape),
    Arrow(LineShape),
    Path(PathShape),
    Text(TextShape),
}

impl Shape {
    #[must_use]
    pub fn kind(&self) -> ShapeKind {
        match self {
            Self::Rect(_) => ShapeKind::Rect,
            Self::Ellipse(_) => ShapeKind::Ellipse,
            Self::Line(_) => ShapeKind::Line,
            Self::Arrow(_) => ShapeKind::Arrow,
            Self::Path(_) => ShapeKind::Path,
            Self::Text(_) => ShapeKind::Text,
        }
    }

    #[must_use]
    pub fn transform(&self) -> &Transform {
        match self {
            Self::Rect(s) | Self::Ellipse(s) => &s.transform,
            Self::Line(s) | Self::Arrow(s) => &s.transform,
            Self::Path(s) => &s.transform,
            Self::Text(s) => &s.transform,
        }
    }

    pub fn transform_mut(&mut self) -> &mut Transform {
        match self {
            Self::Rect(s) | Self::Ellipse(s) => &mut s.transform,
            Self::Line(s) | Self::Arrow(s) => &mut s.transform,
            Self::Path(s) => &mut s.transform,
            Self::Text(s) => &mut s.transform,
        }
    }

    #[must_use]
    pub fn style(&self) -> &Style {
        match self {
            Self::Rect(s) | Self::Ellipse(s) => &s.style,
            Self::Line(s) | Self::Arrow(s) => &s.style,
            Self::Path(s) => &s.style,
            Self::Text(s) => &s.style,
        }
    }

    pub fn style_mut(&mut self) -> &mut Style {
        match self {
            Self::Rect(s) | Self::Ellipse(s) => &mut s.style,
            Self::Line(s) | Self::Arrow(s) => &mut s.style,
            Self::Path(s) => &mut s.style,
            Self::Text(s) => &mut s.style,
        }
    }

    /// Shorthand for an axis-aligned rectangle with default style.
    #[must_use]
    pub fn rect(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self::Rect(BoxShape { transform: Transform::at(left, top), style: Style::default(), width, height })
    }

    /// Serialize to the JSON attribute payload carried on the wire.
    ///
    /// # Errors
    ///
    /// Returns an error only if a string field cannot be encoded, which
    /// `serde_json` never does for these types in practice.
    pub fn to_attributes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Parse the JSON attribute payload carried on the wire.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed JSON or an unknown `type`.
    pub fn from_attributes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
#[path = "shape_test.rs"]
mod tests;
