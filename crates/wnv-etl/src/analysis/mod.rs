//! Geoprocessing used to derive the spray target list.

mod buffer;
mod join;
mod overlay;

pub use buffer::{buffer_points, BUFFER_SEGMENTS};
pub use join::{spatial_join, JOIN_COUNT_FIELD};
pub use overlay::erase;

use crate::gdb::{Feature, FeatureClass, GisError, SpatialReference};

/// Copy of `class` with every coordinate moved into `target`.
pub fn reproject(class: &FeatureClass, target: SpatialReference) -> FeatureClass {
    if class.spatial_reference == target {
        return class.clone();
    }
    let source = class.spatial_reference;
    FeatureClass {
        name: class.name.clone(),
        geometry_type: class.geometry_type,
        spatial_reference: target,
        fields: class.fields.clone(),
        features: class
            .features
            .iter()
            .map(|feature| {
                Feature::new(
                    feature
                        .geometry
                        .map_coords(|x, y| source.transform_to(target, x, y)),
                    feature.attributes.clone(),
                )
            })
            .collect(),
    }
}

pub(crate) fn require_same_reference(
    left: &FeatureClass,
    right: &FeatureClass,
) -> Result<(), GisError> {
    if left.spatial_reference == right.spatial_reference {
        return Ok(());
    }
    Err(GisError::SpatialReferenceMismatch {
        left: left.name.clone(),
        left_sr: left.spatial_reference,
        right: right.name.clone(),
        right_sr: right.spatial_reference,
    })
}
