use std::path::PathBuf;

use tracing::info;

use crate::gdb::{GisError, SpatialReference};
use crate::map::{Color, MapService, Renderer, Shape, Symbol};

pub const DEFAULT_RESOLUTION: u32 = 300;

/// Renderer assignment for one layer.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerStyle {
    pub layer: String,
    pub renderer: Renderer,
}

impl LayerStyle {
    pub fn new(layer: impl Into<String>, renderer: Renderer) -> Self {
        Self {
            layer: layer.into(),
            renderer,
        }
    }
}

/// Everything applied to the map before export.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizePlan {
    /// Feature classes added to the map when it has no layer of that name.
    pub add_layers: Vec<String>,
    pub subtitle_element: String,
    pub subtitle: String,
    pub spatial_reference: SpatialReference,
    pub styles: Vec<LayerStyle>,
    pub target_layer: String,
    pub definition_query: String,
    pub output: PathBuf,
    pub resolution: u32,
}

impl FinalizePlan {
    /// The standard West Nile map: opt-out points in green, the spray selection in red at
    /// half transparency and only addresses inside the selection shown.
    pub fn standard(subtitle: impl Into<String>, output: impl Into<PathBuf>) -> Self {
        let points = Renderer::simple(
            Symbol::new(Shape::Circle, Color::rgb(0, 168, 132), 8.0).with_outline(Color::BLACK),
        );
        let selection = Renderer::simple(
            Symbol::new(Shape::Square, Color::RED, 8.0).with_outline(Color::BLACK),
        )
        .with_transparency(50);
        Self {
            add_layers: vec![
                "Opt_Out_Address_Points".to_string(),
                "Final_Selection".to_string(),
                "Target_addresses".to_string(),
            ],
            subtitle_element: "Subtitle".to_string(),
            subtitle: subtitle.into(),
            spatial_reference: SpatialReference::WebMercator,
            styles: vec![
                LayerStyle::new("Opt_Out_Address_Points", points),
                LayerStyle::new("Final_Selection", selection),
            ],
            target_layer: "Target_addresses".to_string(),
            definition_query: "Join_Count = 1".to_string(),
            output: output.into(),
            resolution: DEFAULT_RESOLUTION,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizeSummary {
    pub layers_added: usize,
    pub path: PathBuf,
    pub resolution: u32,
}

/// Applies a [`FinalizePlan`] through a [`MapService`] and exports the layout.
#[derive(Debug, Default)]
pub struct MapFinalizer;

impl MapFinalizer {
    pub fn run(
        service: &mut dyn MapService,
        plan: &FinalizePlan,
    ) -> Result<FinalizeSummary, GisError> {
        info!(subtitle = %plan.subtitle, "finalizing map");

        let mut layers_added = 0;
        for feature_class in &plan.add_layers {
            if service.add_layer(feature_class)? {
                layers_added += 1;
            }
        }

        service.set_subtitle(&plan.subtitle_element, &plan.subtitle)?;
        service.set_spatial_reference(plan.spatial_reference)?;
        for style in &plan.styles {
            service.apply_renderer(&style.layer, &style.renderer)?;
        }
        service.apply_filter(&plan.target_layer, &plan.definition_query)?;
        service.export_pdf(&plan.output, plan.resolution)?;

        info!(
            path = %plan.output.display(),
            resolution = plan.resolution,
            layers_added,
            "map exported"
        );
        Ok(FinalizeSummary {
            layers_added,
            path: plan.output.clone(),
            resolution: plan.resolution,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::RendererKind;
    use std::path::Path;

    #[derive(Debug, Default)]
    struct RecordingMap {
        calls: Vec<String>,
        existing: Vec<String>,
        fail_on: Option<&'static str>,
    }

    impl RecordingMap {
        fn record(&mut self, call: String) -> Result<(), GisError> {
            if self.fail_on.is_some_and(|prefix| call.starts_with(prefix)) {
                return Err(GisError::ElementNotFound {
                    layout: "Layout".to_string(),
                    element: call,
                });
            }
            self.calls.push(call);
            Ok(())
        }
    }

    impl MapService for RecordingMap {
        fn add_layer(&mut self, feature_class: &str) -> Result<bool, GisError> {
            self.record(format!("add_layer {feature_class}"))?;
            Ok(!self.existing.iter().any(|name| name == feature_class))
        }

        fn set_subtitle(&mut self, element: &str, text: &str) -> Result<(), GisError> {
            self.record(format!("set_subtitle {element}={text}"))
        }

        fn set_spatial_reference(
            &mut self,
            spatial_reference: SpatialReference,
        ) -> Result<(), GisError> {
            self.record(format!("set_spatial_reference {spatial_reference}"))
        }

        fn apply_renderer(&mut self, layer: &str, renderer: &Renderer) -> Result<(), GisError> {
            self.record(format!("apply_renderer {layer} t={}", renderer.transparency))
        }

        fn apply_filter(&mut self, layer: &str, query: &str) -> Result<(), GisError> {
            self.record(format!("apply_filter {layer}: {query}"))
        }

        fn export_pdf(&self, path: &Path, resolution: u32) -> Result<(), GisError> {
            assert_eq!(path, Path::new("West_Nile_Map.pdf"));
            assert_eq!(resolution, DEFAULT_RESOLUTION);
            Ok(())
        }
    }

    #[test]
    fn applies_every_step_in_order() {
        let mut map = RecordingMap {
            existing: vec!["Final_Selection".to_string()],
            ..RecordingMap::default()
        };
        let plan = FinalizePlan::standard("Zone 4 - July 12", "West_Nile_Map.pdf");

        let summary = MapFinalizer::run(&mut map, &plan).expect("finalize succeeds");
        assert_eq!(summary.layers_added, 2);
        assert_eq!(
            map.calls,
            vec![
                "add_layer Opt_Out_Address_Points",
                "add_layer Final_Selection",
                "add_layer Target_addresses",
                "set_subtitle Subtitle=Zone 4 - July 12",
                "set_spatial_reference EPSG:3857",
                "apply_renderer Opt_Out_Address_Points t=0",
                "apply_renderer Final_Selection t=50",
                "apply_filter Target_addresses: Join_Count = 1",
            ]
        );
    }

    #[test]
    fn first_failure_stops_the_export() {
        let mut map = RecordingMap {
            fail_on: Some("apply_renderer"),
            ..RecordingMap::default()
        };
        let plan = FinalizePlan::standard("Zone 4", "West_Nile_Map.pdf");
        let err = MapFinalizer::run(&mut map, &plan).expect_err("renderer fails");
        assert!(err.to_string().contains("apply_renderer Opt_Out_Address_Points"));
        assert!(!map.calls.iter().any(|call| call.starts_with("apply_filter")));
    }

    #[test]
    fn selection_is_red_with_black_outline_at_half_transparency() {
        let plan = FinalizePlan::standard("Zone 4", "West_Nile_Map.pdf");
        let selection = plan
            .styles
            .iter()
            .find(|style| style.layer == "Final_Selection")
            .expect("selection style");
        assert_eq!(selection.renderer.transparency, 50);
        match &selection.renderer.kind {
            RendererKind::Simple { symbol } => {
                assert_eq!(symbol.color, Color::RED);
                assert_eq!(symbol.outline, Some(Color::BLACK));
            }
            other => panic!("unexpected renderer {other:?}"),
        }
    }
}
