use geo::{Area, BooleanOps, MultiPolygon};
use tracing::debug;

use super::require_same_reference;
use crate::gdb::{Feature, FeatureClass, Geometry, GeometryType, GisError};

/// Removes the area covered by `eraser` from every feature of `input`.
///
/// Features left with no area are dropped; the others keep their attributes.
pub fn erase(
    input: &FeatureClass,
    eraser: &FeatureClass,
    output: &str,
) -> Result<FeatureClass, GisError> {
    input.require_geometry(GeometryType::Polygon)?;
    eraser.require_geometry(GeometryType::Polygon)?;
    require_same_reference(input, eraser)?;

    let mask = eraser
        .features
        .iter()
        .filter_map(|feature| match &feature.geometry {
            Geometry::Polygon(polygon) => Some(polygon),
            Geometry::Point(_) => None,
        })
        .fold(MultiPolygon::new(Vec::new()), |acc, polygon| {
            acc.union(polygon)
        });

    let mut result = FeatureClass::new(
        output,
        GeometryType::Polygon,
        input.spatial_reference,
        input.fields.clone(),
    );
    let mut dropped = 0usize;
    for feature in &input.features {
        let Geometry::Polygon(polygon) = &feature.geometry else {
            continue;
        };
        let remainder = if mask.0.is_empty() {
            polygon.clone()
        } else {
            polygon.difference(&mask)
        };
        if remainder.0.is_empty() || remainder.unsigned_area() == 0.0 {
            dropped += 1;
            continue;
        }
        result.insert(Feature::new(
            Geometry::Polygon(remainder),
            feature.attributes.clone(),
        ))?;
    }

    debug!(
        input = %input.name,
        eraser = %eraser.name,
        kept = result.len(),
        dropped,
        "erase finished"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gdb::{Attributes, Field, SpatialReference};
    use geo::polygon;
    use serde_json::json;

    fn class(name: &str, squares: &[(f64, f64, f64)]) -> FeatureClass {
        let mut class = FeatureClass::new(
            name,
            GeometryType::Polygon,
            SpatialReference::Wgs84,
            vec![Field::text("ZONE")],
        );
        for (index, (x, y, size)) in squares.iter().copied().enumerate() {
            let square = polygon![
                (x: x, y: y),
                (x: x + size, y: y),
                (x: x + size, y: y + size),
                (x: x, y: y + size),
                (x: x, y: y),
            ];
            let mut attributes = Attributes::new();
            attributes.insert("ZONE".to_string(), json!(format!("{name}-{index}")));
            class
                .insert(Feature::new(
                    Geometry::Polygon(MultiPolygon::new(vec![square])),
                    attributes,
                ))
                .expect("insert");
        }
        class
    }

    fn area(feature: &Feature) -> f64 {
        match &feature.geometry {
            Geometry::Polygon(polygon) => polygon.unsigned_area(),
            Geometry::Point(_) => 0.0,
        }
    }

    #[test]
    fn subtracts_union_of_eraser_polygons() {
        let risk = class("High_Risk_Intersect", &[(0.0, 0.0, 4.0)]);
        let buffers = class("Avoid_Buffer", &[(0.0, 0.0, 1.0), (0.5, 0.0, 1.0)]);

        let result = erase(&risk, &buffers, "Final_Selection").expect("erase");
        assert_eq!(result.len(), 1);
        assert!((area(&result.features[0]) - (16.0 - 1.5)).abs() < 1e-9);
        assert_eq!(
            result.features[0].attribute("ZONE"),
            Some(&json!("High_Risk_Intersect-0"))
        );
    }

    #[test]
    fn fully_covered_features_are_dropped() {
        let risk = class("High_Risk_Intersect", &[(0.0, 0.0, 1.0), (10.0, 10.0, 1.0)]);
        let buffers = class("Avoid_Buffer", &[(-1.0, -1.0, 3.0)]);

        let result = erase(&risk, &buffers, "Final_Selection").expect("erase");
        assert_eq!(result.len(), 1);
        assert_eq!(
            result.features[0].attribute("ZONE"),
            Some(&json!("High_Risk_Intersect-1"))
        );
    }

    #[test]
    fn empty_eraser_keeps_input() {
        let risk = class("High_Risk_Intersect", &[(0.0, 0.0, 1.0)]);
        let buffers = class("Avoid_Buffer", &[]);
        let result = erase(&risk, &buffers, "Final_Selection").expect("erase");
        assert_eq!(result.features, risk.features);
    }

    #[test]
    fn spatial_references_must_match() {
        let risk = class("High_Risk_Intersect", &[(0.0, 0.0, 1.0)]);
        let mut buffers = class("Avoid_Buffer", &[(0.0, 0.0, 1.0)]);
        buffers.spatial_reference = SpatialReference::WebMercator;
        let err = erase(&risk, &buffers, "Final_Selection").expect_err("mismatch");
        assert!(err.to_string().contains("EPSG:3857"));
    }
}
