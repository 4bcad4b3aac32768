use std::f64::consts::TAU;

use geo::{Coord, LineString, MultiPolygon, Polygon};

use crate::gdb::{Feature, FeatureClass, Geometry, GeometryType, GisError};

pub const BUFFER_SEGMENTS: usize = 32;

const METERS_PER_FOOT: f64 = 0.3048;
const METERS_PER_DEGREE: f64 = 111_320.0;

/// Buffers every point by `distance_feet`, keeping attributes and the point's spatial
/// reference.
///
/// Circles are built in longitude/latitude with a local equirectangular scale, which is
/// accurate to well under a percent at the few-thousand-foot distances used here.
pub fn buffer_points(
    points: &FeatureClass,
    distance_feet: f64,
    output: &str,
) -> Result<FeatureClass, GisError> {
    points.require_geometry(GeometryType::Point)?;
    if !distance_feet.is_finite() || distance_feet <= 0.0 {
        return Err(GisError::InvalidParameter {
            name: "buffer_distance_feet",
            reason: format!("must be a positive number, got {distance_feet}"),
        });
    }

    let spatial_reference = points.spatial_reference;
    let meters = distance_feet * METERS_PER_FOOT;
    let mut buffers = FeatureClass::new(
        output,
        GeometryType::Polygon,
        spatial_reference,
        points.fields.clone(),
    );

    for feature in &points.features {
        let Geometry::Point(point) = &feature.geometry else {
            continue;
        };
        let (lon, lat) = spatial_reference.unproject(point.x(), point.y());
        let ring: LineString<f64> = circle(lon, lat, meters)
            .into_iter()
            .map(|(lon, lat)| {
                let (x, y) = spatial_reference.project(lon, lat);
                Coord { x, y }
            })
            .collect();
        let polygon = MultiPolygon::new(vec![Polygon::new(ring, Vec::new())]);
        buffers.insert(Feature::new(
            Geometry::Polygon(polygon),
            feature.attributes.clone(),
        ))?;
    }

    Ok(buffers)
}

/// Closed counter-clockwise ring around (`lon`, `lat`).
fn circle(lon: f64, lat: f64, meters: f64) -> Vec<(f64, f64)> {
    let dy = meters / METERS_PER_DEGREE;
    let dx = meters / (METERS_PER_DEGREE * lat.to_radians().cos().max(1e-6));

    let mut ring: Vec<(f64, f64)> = (0..BUFFER_SEGMENTS)
        .map(|step| {
            let angle = TAU * step as f64 / BUFFER_SEGMENTS as f64;
            (lon + dx * angle.cos(), lat + dy * angle.sin())
        })
        .collect();
    ring.push(ring[0]);
    ring
}
