//! Feature classes and the geodatabase boundary.
//!
//! The pipeline only talks to a [`Geodatabase`]; [`FileGeodatabase`] stores each feature
//! class as a GeoJSON document so runs work without a proprietary GIS runtime.

mod fields;
mod file;
mod spatial_ref;

pub use fields::sanitize_field_name;
pub use file::FileGeodatabase;
pub use spatial_ref::SpatialReference;

use std::fmt::Debug;
use std::path::PathBuf;

use geo::{Coord, LineString, MultiPolygon, Point, Polygon};
use serde::{Deserialize, Serialize};

/// Attribute values keyed by field name.
pub type Attributes = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, thiserror::Error)]
pub enum GisError {
    #[error("geodatabase not found at {0}")]
    GeodatabaseNotFound(PathBuf),
    #[error("feature class '{0}' not found in geodatabase")]
    FeatureClassNotFound(String),
    #[error("'{0}' is not a valid feature class name")]
    InvalidName(String),
    #[error("feature class '{class}' has no field '{field}'")]
    FieldNotFound { class: String, field: String },
    #[error("feature class '{class}' holds {found} geometry, expected {expected}")]
    GeometryMismatch {
        class: String,
        expected: GeometryType,
        found: GeometryType,
    },
    #[error("spatial reference mismatch: '{left}' is {left_sr}, '{right}' is {right_sr}")]
    SpatialReferenceMismatch {
        left: String,
        left_sr: SpatialReference,
        right: String,
        right_sr: SpatialReference,
    },
    #[error("unsupported spatial reference WKID {0}")]
    UnsupportedSpatialReference(u32),
    #[error("map '{0}' not found in project")]
    MapNotFound(String),
    #[error("layout '{0}' not found in project")]
    LayoutNotFound(String),
    #[error("layer '{layer}' not found in map '{map}'")]
    LayerNotFound { map: String, layer: String },
    #[error("text element '{element}' not found in layout '{layout}'")]
    ElementNotFound { layout: String, element: String },
    #[error("invalid definition query on layer '{layer}': {reason}")]
    InvalidQuery { layer: String, reason: String },
    #[error("invalid renderer for layer '{layer}': {reason}")]
    InvalidRenderer { layer: String, reason: String },
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    #[error("feature class '{name}' is unreadable: {reason}")]
    Corrupt { name: String, reason: String },
    #[error("map project {path} is unreadable: {reason}")]
    Project { path: PathBuf, reason: String },
    #[error("failed to render layout to {path}: {reason}")]
    Pdf { path: PathBuf, reason: String },
    #[error("geodatabase io error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeometryType {
    Point,
    Polygon,
}

impl std::fmt::Display for GeometryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Point => f.write_str("point"),
            Self::Polygon => f.write_str("polygon"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Integer,
    Double,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

impl Field {
    pub fn text(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: FieldType::Text,
        }
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: FieldType::Integer,
        }
    }
}

/// Polygons are always held as multipolygons so single and multi-part inputs share one path.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point(Point<f64>),
    Polygon(MultiPolygon<f64>),
}

impl Geometry {
    pub fn geometry_type(&self) -> GeometryType {
        match self {
            Self::Point(_) => GeometryType::Point,
            Self::Polygon(_) => GeometryType::Polygon,
        }
    }

    /// Returns a copy with every coordinate passed through `f`.
    pub fn map_coords(&self, mut f: impl FnMut(f64, f64) -> (f64, f64)) -> Geometry {
        match self {
            Self::Point(point) => {
                let (x, y) = f(point.x(), point.y());
                Self::Point(Point::new(x, y))
            }
            Self::Polygon(polygons) => Self::Polygon(MultiPolygon::new(
                polygons
                    .iter()
                    .map(|polygon| {
                        let exterior = map_ring(polygon.exterior(), &mut f);
                        let interiors = polygon
                            .interiors()
                            .iter()
                            .map(|ring| map_ring(ring, &mut f))
                            .collect();
                        Polygon::new(exterior, interiors)
                    })
                    .collect(),
            )),
        }
    }
}

fn map_ring(
    ring: &LineString<f64>,
    f: &mut impl FnMut(f64, f64) -> (f64, f64),
) -> LineString<f64> {
    ring.coords()
        .map(|coord| {
            let (x, y) = f(coord.x, coord.y);
            Coord { x, y }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub geometry: Geometry,
    pub attributes: Attributes,
}

impl Feature {
    pub fn new(geometry: Geometry, attributes: Attributes) -> Self {
        Self {
            geometry,
            attributes,
        }
    }

    /// Looks up an attribute, falling back to a case-insensitive match like GIS field names.
    pub fn attribute(&self, field: &str) -> Option<&serde_json::Value> {
        self.attributes.get(field).or_else(|| {
            self.attributes
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(field))
                .map(|(_, value)| value)
        })
    }
}

/// A named set of features sharing geometry type, spatial reference, and field schema.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureClass {
    pub name: String,
    pub geometry_type: GeometryType,
    pub spatial_reference: SpatialReference,
    pub fields: Vec<Field>,
    pub features: Vec<Feature>,
}

impl FeatureClass {
    pub fn new(
        name: impl Into<String>,
        geometry_type: GeometryType,
        spatial_reference: SpatialReference,
        fields: Vec<Field>,
    ) -> Self {
        Self {
            name: name.into(),
            geometry_type,
            spatial_reference,
            fields,
            features: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields
            .iter()
            .find(|field| field.name == name)
            .or_else(|| {
                self.fields
                    .iter()
                    .find(|field| field.name.eq_ignore_ascii_case(name))
            })
    }

    pub fn require_field(&self, name: &str) -> Result<&Field, GisError> {
        self.field(name).ok_or_else(|| GisError::FieldNotFound {
            class: self.name.clone(),
            field: name.to_string(),
        })
    }

    pub fn require_geometry(&self, expected: GeometryType) -> Result<(), GisError> {
        if self.geometry_type == expected {
            Ok(())
        } else {
            Err(GisError::GeometryMismatch {
                class: self.name.clone(),
                expected,
                found: self.geometry_type,
            })
        }
    }

    /// Adds a feature, rejecting geometry that does not match the class.
    pub fn insert(&mut self, feature: Feature) -> Result<(), GisError> {
        let found = feature.geometry.geometry_type();
        if found != self.geometry_type {
            return Err(GisError::GeometryMismatch {
                class: self.name.clone(),
                expected: self.geometry_type,
                found,
            });
        }
        self.features.push(feature);
        Ok(())
    }

    /// Adds `field` unless a field with the same name already exists.
    pub fn ensure_field(&mut self, field: Field) {
        if self.field(&field.name).is_none() {
            self.fields.push(field);
        }
    }
}

/// Storage for feature classes.
///
/// `write` replaces the whole feature class. Implementations that cannot write a class
/// as one unit may leave a partially written class behind when a write fails; callers
/// report the failure and never assume a rollback happened.
pub trait Geodatabase: Debug {
    fn read(&self, name: &str) -> Result<FeatureClass, GisError>;
    fn write(&self, class: &FeatureClass) -> Result<(), GisError>;
    fn exists(&self, name: &str) -> bool;
}

impl<G: Geodatabase + ?Sized> Geodatabase for &G {
    fn read(&self, name: &str) -> Result<FeatureClass, GisError> {
        (**self).read(name)
    }

    fn write(&self, class: &FeatureClass) -> Result<(), GisError> {
        (**self).write(class)
    }

    fn exists(&self, name: &str) -> bool {
        (**self).exists(name)
    }
}
