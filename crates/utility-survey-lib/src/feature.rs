//! Survey feature data model
//!
//! Features are produced once by an external format parser and are read-only afterwards.
//! Attribute bags are modelled as maps from key to a tagged [`Scalar`] so that presence and
//! emptiness are explicit instead of relying on truthiness.

use crate::profile;
use geo::{Coord, Rect};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// A surveyed position in the dataset's coordinate reference system
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Coordinate {
    pub x: f64,
    pub y: f64,
    /// Height, when the survey recorded one
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub z: Option<f64>,
}

impl Coordinate {
    /// Create a 2D coordinate
    #[inline]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y, z: None }
    }

    /// Create a 3D coordinate
    #[inline]
    pub const fn with_z(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z: Some(z) }
    }

    /// Planar part of the coordinate
    #[inline]
    pub fn xy(&self) -> Coord<f64> {
        Coord {
            x: self.x,
            y: self.y,
        }
    }

    /// 2D Euclidean distance, ignoring z
    #[inline]
    pub fn distance_2d(&self, other: &Coordinate) -> f64 {
        let delta = other.xy() - self.xy();
        delta.x.hypot(delta.y)
    }
}

/// A single attribute value
///
/// Deserialization accepts any JSON value: arrays and objects are kept as their compact
/// JSON text so that one unusual key never rejects a whole dataset.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum Scalar {
    Number(f64),
    Text(String),
    Bool(bool),
    Null,
}

impl Scalar {
    /// Whether the value counts as absent: null, blank text or a non-finite number
    pub fn is_empty(&self) -> bool {
        match self {
            Scalar::Null => true,
            Scalar::Text(text) => text.trim().is_empty(),
            Scalar::Number(value) => !value.is_finite(),
            Scalar::Bool(_) => false,
        }
    }

    /// Numeric reading of the value, accepting numeric text such as `"600"`
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Number(value) if value.is_finite() => Some(*value),
            Scalar::Text(text) => text.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
            _ => None,
        }
    }

    /// Text form used for value comparisons
    pub fn normalized(&self) -> String {
        crate::utils::normalize_scalar(self)
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => f.write_str("null"),
            _ => f.write_str(&self.normalized()),
        }
    }
}

#[cfg(feature = "serde")]
impl<'de> Deserialize<'de> for Scalar {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ScalarVisitor)
    }
}

#[cfg(feature = "serde")]
struct ScalarVisitor;

#[cfg(feature = "serde")]
impl<'de> serde::de::Visitor<'de> for ScalarVisitor {
    type Value = Scalar;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an attribute value")
    }

    fn visit_bool<E: serde::de::Error>(self, value: bool) -> Result<Scalar, E> {
        Ok(Scalar::Bool(value))
    }

    fn visit_i64<E: serde::de::Error>(self, value: i64) -> Result<Scalar, E> {
        Ok(Scalar::Number(value as f64))
    }

    fn visit_u64<E: serde::de::Error>(self, value: u64) -> Result<Scalar, E> {
        Ok(Scalar::Number(value as f64))
    }

    fn visit_f64<E: serde::de::Error>(self, value: f64) -> Result<Scalar, E> {
        Ok(Scalar::Number(value))
    }

    fn visit_str<E: serde::de::Error>(self, value: &str) -> Result<Scalar, E> {
        Ok(Scalar::Text(value.to_string()))
    }

    fn visit_string<E: serde::de::Error>(self, value: String) -> Result<Scalar, E> {
        Ok(Scalar::Text(value))
    }

    fn visit_unit<E: serde::de::Error>(self) -> Result<Scalar, E> {
        Ok(Scalar::Null)
    }

    fn visit_none<E: serde::de::Error>(self) -> Result<Scalar, E> {
        Ok(Scalar::Null)
    }

    fn visit_some<D: serde::Deserializer<'de>>(self, deserializer: D) -> Result<Scalar, D::Error> {
        deserializer.deserialize_any(self)
    }

    fn visit_seq<A: serde::de::SeqAccess<'de>>(self, seq: A) -> Result<Scalar, A::Error> {
        let value =
            serde_json::Value::deserialize(serde::de::value::SeqAccessDeserializer::new(seq))?;
        Ok(Scalar::Text(value.to_string()))
    }

    fn visit_map<A: serde::de::MapAccess<'de>>(self, map: A) -> Result<Scalar, A::Error> {
        let value =
            serde_json::Value::deserialize(serde::de::value::MapAccessDeserializer::new(map))?;
        Ok(Scalar::Text(value.to_string()))
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Text(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Number(value)
    }
}

/// Attribute bag of a feature
pub type Attributes = HashMap<String, Scalar>;

/// A point feature such as a chamber, a lid or a valve
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct PointFeature {
    pub id: String,
    pub geometry: Coordinate,
    #[cfg_attr(feature = "serde", serde(default))]
    pub attributes: Attributes,
    pub type_code: String,
}

/// A line feature such as a pipe
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct LineFeature {
    pub id: String,
    /// Vertices in survey order
    pub geometry: Vec<Coordinate>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub attributes: Attributes,
    pub type_code: String,
}

impl PointFeature {
    pub fn new(id: impl Into<String>, type_code: impl Into<String>, geometry: Coordinate) -> Self {
        Self {
            id: id.into(),
            geometry,
            attributes: Attributes::new(),
            type_code: type_code.into(),
        }
    }

    /// Builder-style attribute setter
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

impl LineFeature {
    pub fn new(
        id: impl Into<String>,
        type_code: impl Into<String>,
        geometry: Vec<Coordinate>,
    ) -> Self {
        Self {
            id: id.into(),
            geometry,
            attributes: Attributes::new(),
            type_code: type_code.into(),
        }
    }

    /// Builder-style attribute setter
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// 2D length of the centerline
    #[inline]
    pub fn length(&self) -> f64 {
        profile::polyline_length(&self.geometry)
    }
}

/// Which collection a feature belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum FeatureKind {
    Point,
    Line,
}

/// Borrowed view over either kind of feature
#[derive(Debug, Clone, Copy)]
pub enum FeatureRef<'a> {
    Point(&'a PointFeature),
    Line(&'a LineFeature),
}

impl<'a> FeatureRef<'a> {
    pub fn id(&self) -> &'a str {
        match self {
            FeatureRef::Point(point) => &point.id,
            FeatureRef::Line(line) => &line.id,
        }
    }

    pub fn type_code(&self) -> &'a str {
        match self {
            FeatureRef::Point(point) => &point.type_code,
            FeatureRef::Line(line) => &line.type_code,
        }
    }

    pub fn attributes(&self) -> &'a Attributes {
        match self {
            FeatureRef::Point(point) => &point.attributes,
            FeatureRef::Line(line) => &line.attributes,
        }
    }

    pub fn kind(&self) -> FeatureKind {
        match self {
            FeatureRef::Point(_) => FeatureKind::Point,
            FeatureRef::Line(_) => FeatureKind::Line,
        }
    }

    /// Look up a single attribute
    #[inline]
    pub fn attribute(&self, key: &str) -> Option<&'a Scalar> {
        self.attributes().get(key)
    }
}

/// Dataset header as written by the survey parser
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DatasetHeader {
    /// EPSG code of the coordinate reference system
    #[cfg_attr(feature = "serde", serde(rename = "COSYS_EPSG"))]
    pub cosys_epsg: u32,
    /// Remaining header keys, kept for reporting
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub extra: BTreeMap<String, Scalar>,
}

/// A parsed survey dataset
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Dataset {
    pub header: DatasetHeader,
    #[cfg_attr(feature = "serde", serde(default))]
    pub points: Vec<PointFeature>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub lines: Vec<LineFeature>,
}

/// Summary information about a dataset
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct DatasetInfo {
    pub epsg: u32,
    pub point_count: usize,
    pub line_count: usize,
    /// Summed 2D length of all lines
    pub total_line_length: f64,
    /// 2D extent of every coordinate (None if the dataset is empty)
    pub bounding_box: Option<Rect<f64>>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl Dataset {
    pub fn new(epsg: u32, points: Vec<PointFeature>, lines: Vec<LineFeature>) -> Self {
        Self {
            header: DatasetHeader {
                cosys_epsg: epsg,
                extra: BTreeMap::new(),
            },
            points,
            lines,
        }
    }

    /// Read a dataset from its JSON representation
    #[cfg(feature = "serde")]
    pub fn from_json_reader<R: std::io::Read>(reader: R) -> crate::Result<Self> {
        Ok(serde_json::from_reader(reader)?)
    }

    /// Read a dataset from a JSON file
    #[cfg(feature = "serde")]
    pub fn load<P: AsRef<std::path::Path>>(path: P) -> crate::Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        Self::from_json_reader(std::io::BufReader::new(file))
    }

    /// EPSG code of the dataset's coordinate reference system
    #[inline]
    pub fn epsg(&self) -> u32 {
        self.header.cosys_epsg
    }

    /// Iterate over all features, points first
    pub fn features(&self) -> impl Iterator<Item = FeatureRef<'_>> {
        self.points
            .iter()
            .map(FeatureRef::Point)
            .chain(self.lines.iter().map(FeatureRef::Line))
    }

    /// Compute summary information
    pub fn info(&self) -> DatasetInfo {
        DatasetInfo {
            epsg: self.epsg(),
            point_count: self.points.len(),
            line_count: self.lines.len(),
            total_line_length: self.lines.iter().map(LineFeature::length).sum(),
            bounding_box: self.bounding_box(),
        }
    }

    /// 2D extent of every point and line vertex
    pub fn bounding_box(&self) -> Option<Rect<f64>> {
        let mut coords = self
            .points
            .iter()
            .map(|point| &point.geometry)
            .chain(self.lines.iter().flat_map(|line| line.geometry.iter()))
            .filter(|c| c.x.is_finite() && c.y.is_finite());

        let first = coords.next()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for c in coords {
            min_x = min_x.min(c.x);
            min_y = min_y.min(c.y);
            max_x = max_x.max(c.x);
            max_y = max_y.max(c.y);
        }

        Some(Rect::new(
            Coord { x: min_x, y: min_y },
            Coord { x: max_x, y: max_y },
        ))
    }
}
