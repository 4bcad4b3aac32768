use std::path::{Path, PathBuf};

use geo::{LineString, MultiPolygon, Point, Polygon};
use geojson::{FeatureCollection, GeoJson, Value};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use super::fields::is_valid_class_name;
use super::{
    Feature, FeatureClass, Field, FieldType, Geodatabase, Geometry, GeometryType, GisError,
    SpatialReference,
};
use crate::fs::write_atomically;

const SCHEMA_MEMBER: &str = "wnv:schema";
const EXTENSION: &str = "geojson";

/// Directory of GeoJSON feature collections, one file per feature class.
///
/// Schema details GeoJSON cannot carry (geometry type, field types, spatial reference) are
/// kept in a foreign member. Plain GeoJSON files dropped into the directory are readable
/// too: their schema is inferred and they are assumed to be WGS 84.
#[derive(Debug, Clone)]
pub struct FileGeodatabase {
    root: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct SchemaMember {
    geometry_type: GeometryType,
    spatial_reference: SpatialReference,
    fields: Vec<Field>,
}

impl FileGeodatabase {
    /// Opens an existing geodatabase directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, GisError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(GisError::GeodatabaseNotFound(root));
        }
        Ok(Self { root })
    }

    /// Opens the directory, creating it first when missing.
    pub fn create(root: impl Into<PathBuf>) -> Result<Self, GisError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|source| GisError::Io {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, GisError> {
        if !is_valid_class_name(name) {
            return Err(GisError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(format!("{name}.{EXTENSION}")))
    }
}

impl Geodatabase for FileGeodatabase {
    fn read(&self, name: &str) -> Result<FeatureClass, GisError> {
        let path = self.path_for(name)?;
        if !path.is_file() {
            return Err(GisError::FeatureClassNotFound(name.to_string()));
        }
        let text = std::fs::read_to_string(&path).map_err(|source| GisError::Io {
            path: path.clone(),
            source,
        })?;
        let corrupt = |reason: String| GisError::Corrupt {
            name: name.to_string(),
            reason,
        };

        let collection = match text.parse::<GeoJson>() {
            Ok(GeoJson::FeatureCollection(collection)) => collection,
            Ok(_) => return Err(corrupt("expected a FeatureCollection".to_string())),
            Err(err) => return Err(corrupt(err.to_string())),
        };

        decode_collection(name, collection)
    }

    fn write(&self, class: &FeatureClass) -> Result<(), GisError> {
        let path = self.path_for(&class.name)?;
        let collection = encode_collection(class)?;
        let bytes = serde_json::to_vec_pretty(&collection).map_err(|err| GisError::Corrupt {
            name: class.name.clone(),
            reason: err.to_string(),
        })?;

        write_atomically(&path, &bytes).map_err(|source| GisError::Io {
            path: path.clone(),
            source,
        })?;
        debug!(
            class = %class.name,
            features = class.len(),
            path = %path.display(),
            "feature class written"
        );
        Ok(())
    }

    fn exists(&self, name: &str) -> bool {
        self.path_for(name)
            .map(|path| path.is_file())
            .unwrap_or(false)
    }
}

fn encode_collection(class: &FeatureClass) -> Result<FeatureCollection, GisError> {
    let schema = SchemaMember {
        geometry_type: class.geometry_type,
        spatial_reference: class.spatial_reference,
        fields: class.fields.clone(),
    };
    let schema = serde_json::to_value(&schema).map_err(|err| GisError::Corrupt {
        name: class.name.clone(),
        reason: err.to_string(),
    })?;

    let mut members = serde_json::Map::new();
    members.insert("name".to_string(), json!(class.name));
    members.insert(SCHEMA_MEMBER.to_string(), schema);

    let features = class
        .features
        .iter()
        .map(|feature| geojson::Feature {
            bbox: None,
            geometry: Some(geojson::Geometry::new(encode_geometry(&feature.geometry))),
            id: None,
            properties: Some(feature.attributes.clone()),
            foreign_members: None,
        })
        .collect();

    Ok(FeatureCollection {
        bbox: None,
        features,
        foreign_members: Some(members),
    })
}

fn decode_collection(name: &str, collection: FeatureCollection) -> Result<FeatureClass, GisError> {
    let corrupt = |reason: String| GisError::Corrupt {
        name: name.to_string(),
        reason,
    };

    let schema = collection
        .foreign_members
        .as_ref()
        .and_then(|members| members.get(SCHEMA_MEMBER))
        .map(|value| serde_json::from_value::<SchemaMember>(value.clone()))
        .transpose()
        .map_err(|err| corrupt(format!("invalid schema member: {err}")))?;

    let mut features = Vec::with_capacity(collection.features.len());
    for (index, feature) in collection.features.into_iter().enumerate() {
        let Some(geometry) = feature.geometry else {
            return Err(corrupt(format!("feature {index} has no geometry")));
        };
        let geometry = decode_geometry(&geometry.value)
            .map_err(|reason| corrupt(format!("feature {index}: {reason}")))?;
        features.push(Feature::new(geometry, feature.properties.unwrap_or_default()));
    }

    let schema = match schema {
        Some(schema) => schema,
        None => infer_schema(&features).ok_or_else(|| {
            corrupt("empty collection without a schema member".to_string())
        })?,
    };

    let mut class = FeatureClass::new(
        name,
        schema.geometry_type,
        schema.spatial_reference,
        schema.fields,
    );
    for feature in features {
        class.insert(feature)?;
    }
    Ok(class)
}

fn infer_schema(features: &[Feature]) -> Option<SchemaMember> {
    let geometry_type = features.first()?.geometry.geometry_type();
    let mut fields: Vec<Field> = Vec::new();

    for feature in features {
        for (name, value) in &feature.attributes {
            if fields.iter().any(|field| &field.name == name) {
                continue;
            }
            let field_type = match value {
                serde_json::Value::Number(number) if number.is_i64() || number.is_u64() => {
                    FieldType::Integer
                }
                serde_json::Value::Number(_) => FieldType::Double,
                _ => FieldType::Text,
            };
            fields.push(Field {
                name: name.clone(),
                field_type,
            });
        }
    }

    Some(SchemaMember {
        geometry_type,
        spatial_reference: SpatialReference::Wgs84,
        fields,
    })
}

fn encode_geometry(geometry: &Geometry) -> Value {
    match geometry {
        Geometry::Point(point) => Value::Point(vec![point.x(), point.y()]),
        Geometry::Polygon(polygons) => Value::MultiPolygon(
            polygons
                .iter()
                .map(|polygon| {
                    std::iter::once(polygon.exterior())
                        .chain(polygon.interiors())
                        .map(|ring| ring.coords().map(|c| vec![c.x, c.y]).collect())
                        .collect()
                })
                .collect(),
        ),
    }
}

fn decode_geometry(value: &Value) -> Result<Geometry, String> {
    match value {
        Value::Point(position) => {
            let (x, y) = decode_position(position)?;
            Ok(Geometry::Point(Point::new(x, y)))
        }
        Value::Polygon(rings) => Ok(Geometry::Polygon(MultiPolygon::new(vec![decode_polygon(
            rings,
        )?]))),
        Value::MultiPolygon(polygons) => polygons
            .iter()
            .map(|rings| decode_polygon(rings))
            .collect::<Result<Vec<_>, _>>()
            .map(|polygons| Geometry::Polygon(MultiPolygon::new(polygons))),
        _ => Err("unsupported geometry, expected Point, Polygon or MultiPolygon".to_string()),
    }
}

fn decode_polygon(rings: &[Vec<Vec<f64>>]) -> Result<Polygon<f64>, String> {
    let mut decoded = rings.iter().map(|ring| decode_ring(ring));
    let exterior = decoded
        .next()
        .ok_or_else(|| "polygon without an exterior ring".to_string())??;
    let interiors = decoded.collect::<Result<Vec<_>, _>>()?;
    Ok(Polygon::new(exterior, interiors))
}

fn decode_ring(ring: &[Vec<f64>]) -> Result<LineString<f64>, String> {
    ring.iter()
        .map(|position| decode_position(position))
        .collect::<Result<Vec<_>, _>>()
        .map(LineString::from)
}

fn decode_position(position: &[f64]) -> Result<(f64, f64), String> {
    match position {
        [x, y, ..] if x.is_finite() && y.is_finite() => Ok((*x, *y)),
        _ => Err(format!("invalid position {position:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gdb::Attributes;

    fn sample_points() -> FeatureClass {
        let mut class = FeatureClass::new(
            "Opt_Out_Address_Points",
            GeometryType::Point,
            SpatialReference::Wgs84,
            vec![Field::text("Street_Address")],
        );
        let mut attributes = Attributes::new();
        attributes.insert("Street_Address".to_string(), json!("1777 Broadway"));
        class
            .insert(Feature::new(
                Geometry::Point(Point::new(-105.2797, 40.0149)),
                attributes,
            ))
            .expect("point inserts");
        class
    }

    #[test]
    fn write_then_read_preserves_schema_and_features() {
        let dir = tempfile::tempdir().expect("temp dir");
        let gdb = FileGeodatabase::open(dir.path()).expect("gdb opens");
        let class = sample_points();

        gdb.write(&class).expect("write succeeds");
        assert!(gdb.exists("Opt_Out_Address_Points"));

        let loaded = gdb.read("Opt_Out_Address_Points").expect("read succeeds");
        assert_eq!(loaded, class);
    }

    #[test]
    fn plain_geojson_polygons_get_an_inferred_schema() {
        let dir = tempfile::tempdir().expect("temp dir");
        let gdb = FileGeodatabase::open(dir.path()).expect("gdb opens");
        let raw = r#"{
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": {"ZONE": "North", "RISK": 3},
                "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,1],[0,0]]]}
            }]
        }"#;
        std::fs::write(dir.path().join("High_Risk_Intersect.geojson"), raw).expect("seed");

        let class = gdb.read("High_Risk_Intersect").expect("read inferred");
        assert_eq!(class.geometry_type, GeometryType::Polygon);
        assert_eq!(class.spatial_reference, SpatialReference::Wgs84);
        assert_eq!(
            class.field("RISK").map(|field| field.field_type),
            Some(FieldType::Integer)
        );
        assert_eq!(class.len(), 1);
    }

    #[test]
    fn missing_class_and_bad_names_are_reported() {
        let dir = tempfile::tempdir().expect("temp dir");
        let gdb = FileGeodatabase::open(dir.path()).expect("gdb opens");

        match gdb.read("Nope") {
            Err(GisError::FeatureClassNotFound(name)) => assert_eq!(name, "Nope"),
            other => panic!("expected missing class, got {other:?}"),
        }
        assert!(matches!(
            gdb.read("../etc/passwd"),
            Err(GisError::InvalidName(_))
        ));
        assert!(!gdb.exists("../etc/passwd"));
    }

    #[test]
    fn open_requires_existing_directory() {
        let dir = tempfile::tempdir().expect("temp dir");
        let missing = dir.path().join("wnv.gdb");
        assert!(matches!(
            FileGeodatabase::open(&missing),
            Err(GisError::GeodatabaseNotFound(_))
        ));
        FileGeodatabase::create(&missing).expect("create makes the directory");
        assert!(missing.is_dir());
    }
}
