//! Vector PDF output for a layout.
//!
//! Output is deterministic for identical inputs: no timestamps or document IDs are
//! written and object numbering follows drawing order.

use std::collections::BTreeSet;

use geo::{BoundingRect, Coord, LineString, Rect};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, Stream, StringFormat};

use super::project::{Frame, Layout};
use super::renderer::{Color, Shape, Symbol};
use crate::gdb::Geometry;

pub const MIN_RESOLUTION: u32 = 72;
pub const MAX_RESOLUTION: u32 = 2400;

/// Cubic Bezier control distance for a quarter circle.
const KAPPA: f64 = 0.552_284_749_8;
const EXTENT_MARGIN: f64 = 0.05;
/// Symbol outline width in points, never thinner than one device pixel.
const OUTLINE_WIDTH: f64 = 0.75;

/// One layer ready to draw: geometry already in map units with its resolved symbol.
#[derive(Debug)]
pub(crate) struct PdfLayer {
    pub transparency: u8,
    pub features: Vec<(Geometry, Symbol)>,
}

struct Viewport {
    frame: Frame,
    center: Coord<f64>,
    scale: f64,
    /// Size of one device pixel in points at the export resolution.
    pixel: f64,
}

impl Viewport {
    fn fit(frame: Frame, layers: &[PdfLayer], minimum_extent: f64, resolution: u32) -> Self {
        let extent = layers
            .iter()
            .flat_map(|layer| layer.features.iter())
            .filter_map(|(geometry, _)| bounds(geometry))
            .reduce(|acc, rect| {
                Rect::new(
                    Coord {
                        x: acc.min().x.min(rect.min().x),
                        y: acc.min().y.min(rect.min().y),
                    },
                    Coord {
                        x: acc.max().x.max(rect.max().x),
                        y: acc.max().y.max(rect.max().y),
                    },
                )
            })
            .unwrap_or_else(|| Rect::new(Coord { x: 0.0, y: 0.0 }, Coord { x: 0.0, y: 0.0 }));

        let width = (extent.width() * (1.0 + 2.0 * EXTENT_MARGIN)).max(minimum_extent);
        let height = (extent.height() * (1.0 + 2.0 * EXTENT_MARGIN)).max(minimum_extent);
        let scale = (frame.width / width).min(frame.height / height);

        Self {
            frame,
            center: extent.center(),
            scale,
            pixel: 72.0 / f64::from(resolution.max(1)),
        }
    }

    /// Map units to page points, snapped to the device pixel grid.
    fn to_page(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.snap(self.frame.x + self.frame.width / 2.0 + (x - self.center.x) * self.scale),
            self.snap(self.frame.y + self.frame.height / 2.0 + (y - self.center.y) * self.scale),
        )
    }

    fn snap(&self, value: f64) -> f64 {
        (value / self.pixel).round() * self.pixel
    }
}

fn bounds(geometry: &Geometry) -> Option<Rect<f64>> {
    match geometry {
        Geometry::Point(point) => Some(Rect::new(point.0, point.0)),
        Geometry::Polygon(polygon) => polygon.bounding_rect(),
    }
}

fn real(value: f64) -> Object {
    Object::Real(value as f32)
}

fn op(operator: &str, operands: Vec<Object>) -> Operation {
    Operation::new(operator, operands)
}

fn color_operands(color: Color) -> Vec<Object> {
    color.unit().into_iter().map(Object::Real).collect()
}

fn opacity_name(transparency: u8) -> String {
    format!("GS{transparency}")
}

/// Text as a WinAnsi literal; characters outside Latin-1 become `?`.
fn pdf_text(text: &str) -> Object {
    let bytes = text
        .chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect();
    Object::String(bytes, StringFormat::Literal)
}

struct Painter<'a> {
    viewport: &'a Viewport,
    ops: Vec<Operation>,
}

impl Painter<'_> {
    fn set_style(&mut self, symbol: &Symbol) {
        self.ops.push(op("rg", color_operands(symbol.color)));
        if let Some(outline) = symbol.outline {
            self.ops.push(op("RG", color_operands(outline)));
            self.ops
                .push(op("w", vec![real(OUTLINE_WIDTH.max(self.viewport.pixel))]));
        }
    }

    fn ring(&mut self, ring: &LineString<f64>) {
        for (index, coord) in ring.coords().enumerate() {
            let (x, y) = self.viewport.to_page(coord.x, coord.y);
            let operator = if index == 0 { "m" } else { "l" };
            self.ops.push(op(operator, vec![real(x), real(y)]));
        }
        self.ops.push(op("h", Vec::new()));
    }

    fn feature(&mut self, geometry: &Geometry, symbol: &Symbol) {
        self.set_style(symbol);
        match geometry {
            Geometry::Polygon(polygons) => {
                for polygon in polygons {
                    self.ring(polygon.exterior());
                    for interior in polygon.interiors() {
                        self.ring(interior);
                    }
                }
                let paint = if symbol.outline.is_some() { "B*" } else { "f*" };
                self.ops.push(op(paint, Vec::new()));
            }
            Geometry::Point(point) => {
                let (cx, cy) = self.viewport.to_page(point.x(), point.y());
                self.marker(symbol.shape, cx, cy, symbol.size / 2.0);
                let paint = if symbol.outline.is_some() { "B" } else { "f" };
                self.ops.push(op(paint, Vec::new()));
            }
        }
    }

    fn marker(&mut self, shape: Shape, cx: f64, cy: f64, r: f64) {
        match shape {
            Shape::Square => {
                self.ops.push(op(
                    "re",
                    vec![real(cx - r), real(cy - r), real(2.0 * r), real(2.0 * r)],
                ));
            }
            Shape::Triangle => {
                self.ops.push(op("m", vec![real(cx), real(cy + r)]));
                self.ops
                    .push(op("l", vec![real(cx - r * 0.866), real(cy - r * 0.5)]));
                self.ops
                    .push(op("l", vec![real(cx + r * 0.866), real(cy - r * 0.5)]));
                self.ops.push(op("h", Vec::new()));
            }
            Shape::Circle => {
                let k = r * KAPPA;
                self.ops.push(op("m", vec![real(cx + r), real(cy)]));
                let quarters = [
                    [cx + r, cy + k, cx + k, cy + r, cx, cy + r],
                    [cx - k, cy + r, cx - r, cy + k, cx - r, cy],
                    [cx - r, cy - k, cx - k, cy - r, cx, cy - r],
                    [cx + k, cy - r, cx + r, cy - k, cx + r, cy],
                ];
                for quarter in quarters {
                    self.ops.push(op("c", quarter.into_iter().map(real).collect()));
                }
                self.ops.push(op("h", Vec::new()));
            }
        }
    }
}

/// Renders `layout` with `layers` (top layer first) into PDF bytes.
pub(crate) fn render_layout(
    layout: &Layout,
    layers: &[PdfLayer],
    minimum_extent: f64,
    resolution: u32,
) -> Result<Vec<u8>, String> {
    let viewport = Viewport::fit(layout.map_frame, layers, minimum_extent, resolution);
    let frame = layout.map_frame;
    let frame_rect = || {
        vec![
            real(frame.x),
            real(frame.y),
            real(frame.width),
            real(frame.height),
        ]
    };

    let mut painter = Painter {
        viewport: &viewport,
        ops: Vec::new(),
    };
    painter.ops.push(op("q", Vec::new()));
    painter.ops.push(op("re", frame_rect()));
    painter.ops.push(op("W", Vec::new()));
    painter.ops.push(op("n", Vec::new()));

    let mut opacities = BTreeSet::new();
    for layer in layers.iter().rev() {
        painter.ops.push(op("q", Vec::new()));
        if layer.transparency > 0 {
            opacities.insert(layer.transparency);
            painter.ops.push(op(
                "gs",
                vec![Object::Name(opacity_name(layer.transparency).into_bytes())],
            ));
        }
        for (geometry, symbol) in &layer.features {
            painter.feature(geometry, symbol);
        }
        painter.ops.push(op("Q", Vec::new()));
    }
    painter.ops.push(op("Q", Vec::new()));

    let mut ops = painter.ops;
    ops.push(op("RG", color_operands(Color::BLACK)));
    ops.push(op("w", vec![real(1.0)]));
    ops.push(op("re", frame_rect()));
    ops.push(op("S", Vec::new()));

    ops.push(op("rg", color_operands(Color::BLACK)));
    for element in &layout.elements {
        if element.text.is_empty() {
            continue;
        }
        let font = if element.bold { "F2" } else { "F1" };
        ops.push(op("BT", Vec::new()));
        ops.push(op(
            "Tf",
            vec![Object::Name(font.as_bytes().to_vec()), real(element.size)],
        ));
        ops.push(op("Td", vec![real(element.x), real(element.y)]));
        ops.push(op("Tj", vec![pdf_text(&element.text)]));
        ops.push(op("ET", Vec::new()));
    }

    let content = Content { operations: ops }
        .encode()
        .map_err(|err| format!("failed to encode page content: {err}"))?;

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let regular_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let bold_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
        "Encoding" => "WinAnsiEncoding",
    });

    let mut states = Dictionary::new();
    for transparency in opacities {
        let alpha = 1.0 - f64::from(transparency.min(100)) / 100.0;
        states.set(
            opacity_name(transparency),
            dictionary! {
                "Type" => "ExtGState",
                "ca" => real(alpha),
                "CA" => real(alpha),
            },
        );
    }
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => regular_id,
            "F2" => bold_id,
        },
        "ExtGState" => states,
    });

    let content_id = doc.add_object(Stream::new(dictionary! {}, content));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => resources_id,
        "MediaBox" => vec![
            0.into(),
            0.into(),
            real(layout.page.width),
            real(layout.page.height),
        ],
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    let info_id = doc.add_object(dictionary! {
        "Title" => Object::string_literal(layout.name.as_str()),
        "Producer" => Object::string_literal("wnv-etl"),
        "ExportResolution" => i64::from(resolution),
    });
    doc.trailer.set("Root", catalog_id);
    doc.trailer.set("Info", info_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .map_err(|err| format!("failed to serialize document: {err}"))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::project::{Page, TextElement};
    use geo::{polygon, MultiPolygon, Point};

    fn layout() -> Layout {
        Layout {
            name: "Layout".to_string(),
            map: "Map".to_string(),
            page: Page::default(),
            map_frame: Frame {
                x: 36.0,
                y: 72.0,
                width: 720.0,
                height: 468.0,
            },
            elements: vec![TextElement {
                name: "Subtitle".to_string(),
                text: "Spray zone (North)".to_string(),
                x: 36.0,
                y: 560.0,
                size: 14.0,
                bold: false,
            }],
        }
    }

    fn layers() -> Vec<PdfLayer> {
        let square = polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
            (x: 0.0, y: 1.0),
            (x: 0.0, y: 0.0),
        ];
        vec![
            PdfLayer {
                transparency: 0,
                features: vec![(
                    Geometry::Point(Point::new(0.5, 0.5)),
                    Symbol::new(Shape::Triangle, Color::BLACK, 6.0),
                )],
            },
            PdfLayer {
                transparency: 50,
                features: vec![(
                    Geometry::Polygon(MultiPolygon::new(vec![square])),
                    Symbol::new(Shape::Circle, Color::RED, 8.0).with_outline(Color::BLACK),
                )],
            },
        ]
    }

    #[test]
    fn renders_a_loadable_single_page_document() {
        let bytes = render_layout(&layout(), &layers(), 0.01, 300).expect("renders");
        assert!(bytes.starts_with(b"%PDF-1.5"));

        let doc = Document::load_mem(&bytes).expect("lopdf reads its own output");
        assert_eq!(doc.get_pages().len(), 1);

        let info_id = doc
            .trailer
            .get(b"Info")
            .and_then(Object::as_reference)
            .expect("info reference");
        let resolution = doc
            .get_object(info_id)
            .and_then(Object::as_dict)
            .and_then(|info| info.get(b"ExportResolution"))
            .and_then(Object::as_i64)
            .expect("resolution entry");
        assert_eq!(resolution, 300);

        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("/GS50"));
        assert!(text.contains("Spray zone (North)"));
    }

    #[test]
    fn identical_inputs_render_identical_bytes() {
        let first = render_layout(&layout(), &layers(), 0.01, 300).expect("renders");
        let second = render_layout(&layout(), &layers(), 0.01, 300).expect("renders");
        assert_eq!(first, second);
    }

    #[test]
    fn viewport_centers_extent_in_frame() {
        let frame = layout().map_frame;
        let viewport = Viewport::fit(frame, &layers(), 0.01, 300);
        let (x, y) = viewport.to_page(0.5, 0.5);
        assert!((x - (frame.x + frame.width / 2.0)).abs() < 1e-6);
        assert!((y - (frame.y + frame.height / 2.0)).abs() < 1e-6);

        let (_, top) = viewport.to_page(0.5, 1.0);
        assert!(top < frame.y + frame.height);
    }

    #[test]
    fn empty_map_still_renders() {
        let bytes = render_layout(&layout(), &[], 0.01, 96).expect("renders");
        assert!(Document::load_mem(&bytes).is_ok());
    }

    fn operand(object: &Object) -> f64 {
        match object {
            Object::Integer(value) => *value as f64,
            Object::Real(value) => f64::from(*value),
            other => panic!("unexpected operand {other:?}"),
        }
    }

    fn page_operations(bytes: &[u8]) -> Vec<Operation> {
        let doc = Document::load_mem(bytes).expect("loads");
        let page = *doc.get_pages().values().next().expect("one page");
        let content = doc.get_page_content(page).expect("page content");
        Content::decode(&content).expect("content decodes").operations
    }

    #[test]
    fn resolution_sets_the_vertex_grid_and_minimum_stroke() {
        let bytes = render_layout(&layout(), &layers(), 0.01, 72).expect("renders");
        let operations = page_operations(&bytes);

        let vertices: Vec<f64> = operations
            .iter()
            .filter(|operation| operation.operator == "m" || operation.operator == "l")
            .flat_map(|operation| operation.operands.iter().map(operand))
            .collect();
        assert!(!vertices.is_empty());
        // the triangle marker is offset from its snapped center, so only polygon rings
        // (the first five moves and lines drawn, bottom layer first) sit on whole points
        for value in &vertices[..10] {
            assert!((value - value.round()).abs() < 1e-3, "{value} is off the 72 dpi grid");
        }

        let widths: Vec<f64> = operations
            .iter()
            .filter(|operation| operation.operator == "w")
            .map(|operation| operand(&operation.operands[0]))
            .collect();
        assert!(widths.iter().all(|width| *width >= 1.0), "{widths:?}");

        let fine = render_layout(&layout(), &layers(), 0.01, 600).expect("renders");
        assert_ne!(bytes, fine);
    }
}
