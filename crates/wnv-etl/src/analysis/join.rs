use geo::{Intersects, MultiPolygon};
use serde_json::json;

use super::require_same_reference;
use crate::gdb::{Feature, FeatureClass, Field, Geometry, GeometryType, GisError};

pub const JOIN_COUNT_FIELD: &str = "Join_Count";

/// Counts the `join` polygons touching each `target` feature into a `Join_Count` field.
///
/// With `keep_common` only targets with at least one match are written, which is how the
/// address layer is reduced to addresses inside the spray selection.
pub fn spatial_join(
    target: &FeatureClass,
    join: &FeatureClass,
    keep_common: bool,
    output: &str,
) -> Result<FeatureClass, GisError> {
    join.require_geometry(GeometryType::Polygon)?;
    require_same_reference(target, join)?;

    let polygons: Vec<&MultiPolygon<f64>> = join
        .features
        .iter()
        .filter_map(|feature| match &feature.geometry {
            Geometry::Polygon(polygon) => Some(polygon),
            Geometry::Point(_) => None,
        })
        .collect();

    let mut result = FeatureClass::new(
        output,
        target.geometry_type,
        target.spatial_reference,
        target.fields.clone(),
    );
    result.ensure_field(Field::integer(JOIN_COUNT_FIELD));
    let count_field = result
        .field(JOIN_COUNT_FIELD)
        .map(|field| field.name.clone())
        .unwrap_or_else(|| JOIN_COUNT_FIELD.to_string());

    for feature in &target.features {
        let count = polygons
            .iter()
            .filter(|polygon| match &feature.geometry {
                Geometry::Point(point) => polygon.intersects(point),
                Geometry::Polygon(other) => polygon.intersects(other),
            })
            .count();
        if keep_common && count == 0 {
            continue;
        }

        let mut attributes = feature.attributes.clone();
        attributes.insert(count_field.clone(), json!(count));
        result.insert(Feature::new(feature.geometry.clone(), attributes))?;
    }

    Ok(result)
}
