use std::path::Path;

use serde::{Deserialize, Serialize};

use super::renderer::Renderer;
use crate::gdb::{GisError, SpatialReference};

/// A map project: maps with ordered layers, and page layouts that frame one map each.
///
/// The project file is read once per run; changes made through a
/// [`MapService`](super::MapService) live only in memory and are applied to the export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapProject {
    pub maps: Vec<MapDocument>,
    #[serde(default)]
    pub layouts: Vec<Layout>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapDocument {
    pub name: String,
    #[serde(default)]
    pub spatial_reference: SpatialReference,
    /// Drawing order is top first.
    #[serde(default)]
    pub layers: Vec<Layer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub name: String,
    /// Feature class backing the layer; defaults to the layer name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renderer: Option<Renderer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition_query: Option<String>,
    #[serde(default = "visible_by_default")]
    pub visible: bool,
}

fn visible_by_default() -> bool {
    true
}

impl Layer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            feature_class: None,
            renderer: None,
            definition_query: None,
            visible: true,
        }
    }

    pub fn source(&self) -> &str {
        self.feature_class.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layout {
    pub name: String,
    pub map: String,
    #[serde(default)]
    pub page: Page,
    pub map_frame: Frame,
    #[serde(default)]
    pub elements: Vec<TextElement>,
}

/// Page size in points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub width: f64,
    pub height: f64,
}

impl Default for Page {
    fn default() -> Self {
        // US letter, landscape
        Self {
            width: 792.0,
            height: 612.0,
        }
    }
}

/// Rectangle in page points, origin at the bottom-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextElement {
    pub name: String,
    #[serde(default)]
    pub text: String,
    pub x: f64,
    pub y: f64,
    #[serde(default = "default_font_size")]
    pub size: f64,
    #[serde(default)]
    pub bold: bool,
}

fn default_font_size() -> f64 {
    12.0
}

impl MapProject {
    pub fn load(path: &Path) -> Result<Self, GisError> {
        let text = std::fs::read_to_string(path).map_err(|source| GisError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let project = Self::from_yaml_str(&text).map_err(|reason| GisError::Project {
            path: path.to_path_buf(),
            reason,
        })?;
        Ok(project)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, String> {
        let project: Self = serde_yml::from_str(text).map_err(|err| err.to_string())?;
        project.check()?;
        Ok(project)
    }

    fn check(&self) -> Result<(), String> {
        if self.maps.is_empty() {
            return Err("project defines no maps".to_string());
        }
        for layout in &self.layouts {
            if !self.maps.iter().any(|map| map.name == layout.map) {
                return Err(format!(
                    "layout '{}' frames unknown map '{}'",
                    layout.name, layout.map
                ));
            }
            let frame = layout.map_frame;
            let fits = frame.width > 0.0
                && frame.height > 0.0
                && frame.x >= 0.0
                && frame.y >= 0.0
                && frame.x + frame.width <= layout.page.width
                && frame.y + frame.height <= layout.page.height;
            if !fits {
                return Err(format!(
                    "map frame of layout '{}' does not fit its page",
                    layout.name
                ));
            }
        }
        Ok(())
    }

    pub(crate) fn map_index(&self, name: &str) -> Result<usize, GisError> {
        self.maps
            .iter()
            .position(|map| map.name == name)
            .ok_or_else(|| GisError::MapNotFound(name.to_string()))
    }

    pub(crate) fn layout_index(&self, name: &str) -> Result<usize, GisError> {
        self.layouts
            .iter()
            .position(|layout| layout.name == name)
            .ok_or_else(|| GisError::LayoutNotFound(name.to_string()))
    }
}

#[cfg(test)]
pub(crate) const SAMPLE_PROJECT: &str = r##"
maps:
  - name: Map
    spatial_reference: 4326
    layers:
      - name: Target_addresses
      - name: Final_Selection
        renderer:
          type: simple
          symbol: { color: "#FF0000" }
          transparency: 50
      - name: Basemap
        visible: false
layouts:
  - name: Layout
    map: Map
    map_frame: { x: 36, y: 72, width: 720, height: 468 }
    elements:
      - name: Title
        text: West Nile Virus Spray Zones
        x: 36
        y: 560
        size: 20
        bold: true
      - name: Subtitle
        x: 36
        y: 545
"##;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_project_parses_with_defaults() {
        let project = MapProject::from_yaml_str(SAMPLE_PROJECT).expect("project parses");
        let map = &project.maps[0];
        assert_eq!(map.spatial_reference, SpatialReference::Wgs84);
        assert_eq!(map.layers[0].source(), "Target_addresses");
        assert!(map.layers[0].visible);
        assert!(!map.layers[2].visible);
        assert_eq!(
            map.layers[1].renderer.as_ref().map(|r| r.transparency),
            Some(50)
        );

        let layout = &project.layouts[0];
        assert_eq!(layout.page, Page::default());
        assert_eq!(layout.elements[1].size, 12.0);
        assert_eq!(layout.elements[1].text, "");
    }

    #[test]
    fn layouts_must_reference_known_maps_and_fit_the_page() {
        let unknown = SAMPLE_PROJECT.replace("map: Map", "map: Overview");
        let err = MapProject::from_yaml_str(&unknown).expect_err("unknown map");
        assert!(err.contains("Overview"));

        let oversized = SAMPLE_PROJECT.replace("width: 720", "width: 900");
        assert!(MapProject::from_yaml_str(&oversized).is_err());
    }

    #[test]
    fn lookups_name_missing_resources() {
        let project = MapProject::from_yaml_str(SAMPLE_PROJECT).expect("project parses");
        assert!(matches!(
            project.map_index("Overview"),
            Err(GisError::MapNotFound(name)) if name == "Overview"
        ));
        assert!(matches!(
            project.layout_index("Poster"),
            Err(GisError::LayoutNotFound(_))
        ));
    }

    #[test]
    fn unsupported_wkid_is_rejected() {
        let project = SAMPLE_PROJECT.replace("spatial_reference: 4326", "spatial_reference: 2876");
        let err = MapProject::from_yaml_str(&project).expect_err("bad wkid");
        assert!(err.contains("2876"), "{err}");
    }

    #[test]
    fn shipped_map_project_parses() {
        let project =
            MapProject::from_yaml_str(include_str!("../../../../config/wnvoutbreak_map.yaml"))
                .expect("shipped project parses");
        let layout = project.layout_index("Layout").map(|index| &project.layouts[index]);
        let layout = layout.expect("layout present");
        assert!(layout.elements.iter().any(|element| element.name == "Subtitle"));
        assert_eq!(project.maps[0].layers[0].name, "High_Risk_Intersect");
    }
}
