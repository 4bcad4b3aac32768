use std::path::Path;

use tracing::{debug, info};

use super::pdf::{render_layout, PdfLayer, MAX_RESOLUTION, MIN_RESOLUTION};
use super::project::{Layer, MapDocument, MapProject};
use super::query::DefinitionQuery;
use super::renderer::{Renderer, Symbol};
use super::MapService;
use crate::fs::write_atomically;
use crate::gdb::{FeatureClass, Geodatabase, GisError, SpatialReference};

/// [`MapService`] over a [`MapProject`] whose layers read from a [`Geodatabase`].
#[derive(Debug)]
pub struct ProjectMapService<G> {
    project: MapProject,
    map_index: usize,
    layout_index: usize,
    gdb: G,
}

impl<G: Geodatabase> ProjectMapService<G> {
    pub fn new(project: MapProject, map: &str, layout: &str, gdb: G) -> Result<Self, GisError> {
        let map_index = project.map_index(map)?;
        let layout_index = project.layout_index(layout)?;
        let framed = &project.layouts[layout_index].map;
        if framed != map {
            return Err(GisError::InvalidParameter {
                name: "layout",
                reason: format!("layout '{layout}' frames map '{framed}', not '{map}'"),
            });
        }
        Ok(Self {
            project,
            map_index,
            layout_index,
            gdb,
        })
    }

    pub fn open(path: &Path, map: &str, layout: &str, gdb: G) -> Result<Self, GisError> {
        let project = MapProject::load(path)?;
        Self::new(project, map, layout, gdb)
    }

    pub fn map(&self) -> &MapDocument {
        &self.project.maps[self.map_index]
    }

    fn map_mut(&mut self) -> &mut MapDocument {
        &mut self.project.maps[self.map_index]
    }

    pub fn layer(&self, name: &str) -> Result<&Layer, GisError> {
        let map = self.map();
        map.layers
            .iter()
            .find(|layer| layer.name == name)
            .ok_or_else(|| GisError::LayerNotFound {
                map: map.name.clone(),
                layer: name.to_string(),
            })
    }

    fn layer_mut(&mut self, name: &str) -> Result<&mut Layer, GisError> {
        let map = &mut self.project.maps[self.map_index];
        let map_name = map.name.clone();
        map.layers
            .iter_mut()
            .find(|layer| layer.name == name)
            .ok_or(GisError::LayerNotFound {
                map: map_name,
                layer: name.to_string(),
            })
    }

    fn layer_source(&self, name: &str) -> Result<FeatureClass, GisError> {
        let layer = self.layer(name)?;
        self.gdb.read(layer.source())
    }

    fn prepare_layer(
        &self,
        layer: &Layer,
        target: SpatialReference,
    ) -> Result<PdfLayer, GisError> {
        let class = self.gdb.read(layer.source())?;
        let query = layer
            .definition_query
            .as_deref()
            .map(|text| parse_query(&layer.name, text, &class))
            .transpose()?;
        let fallback = Symbol::default();

        let features = class
            .features
            .iter()
            .filter(|feature| query.as_ref().map_or(true, |query| query.matches(feature)))
            .map(|feature| {
                let symbol = layer
                    .renderer
                    .as_ref()
                    .map_or(&fallback, |renderer| renderer.symbol_for(feature))
                    .clone();
                let geometry = feature
                    .geometry
                    .map_coords(|x, y| class.spatial_reference.transform_to(target, x, y));
                (geometry, symbol)
            })
            .collect();

        Ok(PdfLayer {
            transparency: layer.renderer.as_ref().map_or(0, |r| r.transparency),
            features,
        })
    }
}

fn parse_query(layer: &str, text: &str, class: &FeatureClass) -> Result<DefinitionQuery, GisError> {
    let query = DefinitionQuery::parse(text).map_err(|reason| GisError::InvalidQuery {
        layer: layer.to_string(),
        reason,
    })?;
    for field in query.fields() {
        class.require_field(field)?;
    }
    Ok(query)
}

impl<G: Geodatabase> MapService for ProjectMapService<G> {
    fn add_layer(&mut self, feature_class: &str) -> Result<bool, GisError> {
        if self.map().layers.iter().any(|layer| layer.name == feature_class) {
            debug!(layer = feature_class, "layer already in map");
            return Ok(false);
        }
        if !self.gdb.exists(feature_class) {
            return Err(GisError::FeatureClassNotFound(feature_class.to_string()));
        }
        self.map_mut().layers.insert(0, Layer::new(feature_class));
        info!(layer = feature_class, "layer added to map");
        Ok(true)
    }

    fn set_subtitle(&mut self, element: &str, text: &str) -> Result<(), GisError> {
        let layout = &mut self.project.layouts[self.layout_index];
        let layout_name = layout.name.clone();
        let target = layout
            .elements
            .iter_mut()
            .find(|candidate| candidate.name == element)
            .ok_or(GisError::ElementNotFound {
                layout: layout_name,
                element: element.to_string(),
            })?;
        target.text = text.to_string();
        Ok(())
    }

    fn set_spatial_reference(
        &mut self,
        spatial_reference: SpatialReference,
    ) -> Result<(), GisError> {
        self.map_mut().spatial_reference = spatial_reference;
        Ok(())
    }

    fn apply_renderer(&mut self, layer: &str, renderer: &Renderer) -> Result<(), GisError> {
        let class = self.layer_source(layer)?;
        renderer.validate(layer, &class)?;
        self.layer_mut(layer)?.renderer = Some(renderer.clone());
        Ok(())
    }

    fn apply_filter(&mut self, layer: &str, query: &str) -> Result<(), GisError> {
        let query = query.trim();
        if query.is_empty() {
            self.layer_mut(layer)?.definition_query = None;
            return Ok(());
        }
        let class = self.layer_source(layer)?;
        let parsed = parse_query(layer, query, &class)?;
        self.layer_mut(layer)?.definition_query = Some(parsed.as_str().to_string());
        Ok(())
    }

    fn export_pdf(&self, path: &Path, resolution: u32) -> Result<(), GisError> {
        if !(MIN_RESOLUTION..=MAX_RESOLUTION).contains(&resolution) {
            return Err(GisError::InvalidParameter {
                name: "resolution",
                reason: format!(
                    "{resolution} dpi is outside {MIN_RESOLUTION}-{MAX_RESOLUTION}"
                ),
            });
        }

        let map = self.map();
        let layers = map
            .layers
            .iter()
            .filter(|layer| layer.visible)
            .map(|layer| self.prepare_layer(layer, map.spatial_reference))
            .collect::<Result<Vec<_>, _>>()?;

        let layout = &self.project.layouts[self.layout_index];
        let pdf_error = |reason: String| GisError::Pdf {
            path: path.to_path_buf(),
            reason,
        };
        let bytes = render_layout(
            layout,
            &layers,
            map.spatial_reference.minimum_extent(),
            resolution,
        )
        .map_err(pdf_error)?;
        write_atomically(path, &bytes).map_err(|err| pdf_error(err.to_string()))?;

        info!(
            path = %path.display(),
            layout = %layout.name,
            layers = layers.len(),
            bytes = bytes.len(),
            "layout exported"
        );
        Ok(())
    }
}
