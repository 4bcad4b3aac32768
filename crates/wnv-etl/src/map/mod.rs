//! Map presentation: the [`MapService`] boundary and a project-file implementation.

mod pdf;
mod project;
mod query;
mod renderer;
mod service;

pub use pdf::{MAX_RESOLUTION, MIN_RESOLUTION};
pub use project::{Frame, Layer, Layout, MapDocument, MapProject, Page, TextElement};
pub use query::DefinitionQuery;
pub use renderer::{Color, Renderer, RendererKind, Shape, Symbol, ValueClass};
pub use service::ProjectMapService;

use std::fmt::Debug;
use std::path::Path;

use crate::gdb::{GisError, SpatialReference};

/// The map and layout operations the finalizer needs.
///
/// Every setter is idempotent. Errors name the map, layout, layer, element or field that
/// could not be resolved.
pub trait MapService: Debug {
    /// Adds a layer backed by `feature_class` at the top of the map. Returns `false` when
    /// a layer of that name is already present.
    fn add_layer(&mut self, feature_class: &str) -> Result<bool, GisError>;
    fn set_subtitle(&mut self, element: &str, text: &str) -> Result<(), GisError>;
    fn set_spatial_reference(&mut self, spatial_reference: SpatialReference)
        -> Result<(), GisError>;
    fn apply_renderer(&mut self, layer: &str, renderer: &Renderer) -> Result<(), GisError>;
    /// Sets the layer's definition query. An empty query removes the filter.
    fn apply_filter(&mut self, layer: &str, query: &str) -> Result<(), GisError>;
    /// Writes the layout as a vector PDF. `resolution` (dpi) sets the device pixel grid
    /// that geometry is snapped to and the thinnest stroke drawn, and is recorded in the
    /// document info as `ExportResolution`.
    fn export_pdf(&self, path: &Path, resolution: u32) -> Result<(), GisError>;
}
