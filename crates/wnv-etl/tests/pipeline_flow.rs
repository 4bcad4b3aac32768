use std::path::{Path, PathBuf};
use std::sync::Mutex;

use geo::{polygon, MultiPolygon, Point};
use serde_json::json;
use wnv_etl::analysis::JOIN_COUNT_FIELD;
use wnv_etl::gdb::{
    Attributes, Feature, FeatureClass, Field, FileGeodatabase, Geodatabase, Geometry,
    GeometryType, GisError, SpatialReference,
};
use wnv_etl::geocode::{Coordinate, GeocodeError, Geocoder};
use wnv_etl::map::{MapService, ProjectMapService};
use wnv_etl::pipeline::{
    AnalysisConfig, AnalysisStage, FinalizePlan, LoadConfig, LoadSummary, Loader, MapFinalizer,
    ReportConfig, TargetReport, TransformConfig, TransformSummary, Transformer, EXTRACTED_CSV,
    MAP_PDF, TARGET_REPORT_CSV, TRANSFORMED_CSV,
};

const PROJECT: &str = r##"
maps:
  - name: Map
    spatial_reference: 3857
layouts:
  - name: Layout
    map: Map
    map_frame: { x: 36, y: 72, width: 720, height: 468 }
    elements:
      - name: Title
        text: West Nile Virus Adulticide Spray Zones
        x: 36
        y: 560
        size: 20
        bold: true
      - name: Subtitle
        x: 36
        y: 540
"##;

#[derive(Debug, Default)]
struct FakeGeocoder {
    calls: Mutex<Vec<String>>,
}

impl Geocoder for FakeGeocoder {
    fn geocode(&self, address: &str) -> Result<Option<Coordinate>, GeocodeError> {
        self.calls
            .lock()
            .expect("calls mutex poisoned")
            .push(address.to_string());
        match address {
            "123 Main St, Springfield, IL" => Ok(Coordinate::new(39.80, -89.64)),
            "500 Broken Rd, Springfield, IL" => Err(GeocodeError::Status(500)),
            _ => Ok(None),
        }
    }
}

struct Workspace {
    _dir: tempfile::TempDir,
    local_dir: PathBuf,
    gdb: FileGeodatabase,
}

fn workspace(extracted: &str) -> Workspace {
    let dir = tempfile::tempdir().expect("temp dir");
    let local_dir = dir.path().join("data");
    std::fs::create_dir_all(&local_dir).expect("local dir");
    std::fs::write(local_dir.join(EXTRACTED_CSV), extracted).expect("seed extraction");
    let gdb = FileGeodatabase::create(dir.path().join("wnv.gdb")).expect("gdb");
    Workspace {
        _dir: dir,
        local_dir,
        gdb,
    }
}

fn transform_config(local_dir: &Path) -> TransformConfig {
    TransformConfig {
        input: local_dir.join(EXTRACTED_CSV),
        output: local_dir.join(TRANSFORMED_CSV),
        address_field: "address".to_string(),
        city_state: "Springfield, IL".to_string(),
    }
}

fn load_config(local_dir: &Path) -> LoadConfig {
    LoadConfig {
        input: local_dir.join(TRANSFORMED_CSV),
        feature_class: "Opt_Out_Address_Points".to_string(),
        fields: None,
    }
}

fn seed_analysis_inputs(gdb: &FileGeodatabase) {
    let mut high_risk = FeatureClass::new(
        "High_Risk_Intersect",
        GeometryType::Polygon,
        SpatialReference::Wgs84,
        vec![Field::text("ZONE")],
    );
    let zone = polygon![
        (x: -89.70, y: 39.75),
        (x: -89.58, y: 39.75),
        (x: -89.58, y: 39.85),
        (x: -89.70, y: 39.85),
        (x: -89.70, y: 39.75),
    ];
    let mut attributes = Attributes::new();
    attributes.insert("ZONE".to_string(), json!("Zone 4"));
    high_risk
        .insert(Feature::new(
            Geometry::Polygon(MultiPolygon::new(vec![zone])),
            attributes,
        ))
        .expect("zone inserts");
    gdb.write(&high_risk).expect("write high risk");

    let mut addresses = FeatureClass::new(
        "Addresses",
        GeometryType::Point,
        SpatialReference::Wgs84,
        vec![Field::text("FULLADDR"), Field::text("ADDRNUM")],
    );
    for (full, number, x, y) in [
        ("125 MAIN ST", "125", -89.640, 39.801),
        ("900 ELM ST", "900", -89.620, 39.820),
        ("40 FARM RD", "40", -89.500, 39.900),
    ] {
        let mut attributes = Attributes::new();
        attributes.insert("FULLADDR".to_string(), json!(full));
        attributes.insert("ADDRNUM".to_string(), json!(number));
        addresses
            .insert(Feature::new(Geometry::Point(Point::new(x, y)), attributes))
            .expect("address inserts");
    }
    gdb.write(&addresses).expect("write addresses");
}

#[test]
fn transform_calls_geocoder_with_suffix_and_keeps_unresolved_rows() {
    let ws = workspace(
        "timestamp,address\n\
         t1,123 Main St\n\
         t2,Unknown Rd\n\
         t3,500 Broken Rd\n",
    );
    let geocoder = FakeGeocoder::default();

    let summary = Transformer::new(transform_config(&ws.local_dir), &geocoder)
        .run()
        .expect("transform succeeds");

    assert_eq!(
        summary,
        TransformSummary {
            rows: 3,
            geocoded: 1,
            unresolved: 2,
        }
    );
    assert_eq!(
        geocoder.calls.lock().expect("calls mutex poisoned").as_slice(),
        [
            "123 Main St, Springfield, IL",
            "Unknown Rd, Springfield, IL",
            "500 Broken Rd, Springfield, IL",
        ]
    );

    let output = std::fs::read_to_string(ws.local_dir.join(TRANSFORMED_CSV)).expect("output");
    let mut reader = csv::Reader::from_reader(output.as_bytes());
    let rows: Vec<csv::StringRecord> = reader
        .records()
        .collect::<Result<_, _>>()
        .expect("valid csv");
    assert_eq!(rows.len(), 3, "row count is preserved");
    assert_eq!(&rows[0][1], "123 Main St");
    assert_eq!(rows[0][2].parse::<f64>().expect("latitude"), 39.80);
    assert_eq!(rows[0][3].parse::<f64>().expect("longitude"), -89.64);
    assert_eq!((&rows[1][2], &rows[1][3]), ("", ""));
    assert_eq!((&rows[2][2], &rows[2][3]), ("", ""));
}

#[test]
fn load_inserts_only_geocoded_rows() {
    let ws = workspace("address\n123 Main St\nUnknown Rd\n");
    let geocoder = FakeGeocoder::default();
    Transformer::new(transform_config(&ws.local_dir), &geocoder)
        .run()
        .expect("transform succeeds");

    let summary = Loader::new(load_config(&ws.local_dir), &ws.gdb)
        .run()
        .expect("load succeeds");
    assert_eq!(
        summary,
        LoadSummary {
            rows: 2,
            inserted: 1,
            skipped: 1,
        }
    );

    let points = ws.gdb.read("Opt_Out_Address_Points").expect("class written");
    assert_eq!(points.len(), 1);
    assert_eq!(points.spatial_reference, SpatialReference::Wgs84);
    assert_eq!(
        points.features[0].geometry,
        Geometry::Point(Point::new(-89.64, 39.80))
    );
    assert_eq!(
        points.features[0].attribute("address"),
        Some(&json!("123 Main St"))
    );
}

#[test]
fn failed_load_keeps_previous_feature_class() {
    let ws = workspace("address\n123 Main St\n");
    let geocoder = FakeGeocoder::default();
    Transformer::new(transform_config(&ws.local_dir), &geocoder)
        .run()
        .expect("transform succeeds");
    Loader::new(load_config(&ws.local_dir), &ws.gdb)
        .run()
        .expect("first load succeeds");

    std::fs::write(
        ws.local_dir.join(TRANSFORMED_CSV),
        "address,latitude,longitude\n9 Elm,north,-89.6\n",
    )
    .expect("corrupt transformed csv");
    let err = Loader::new(load_config(&ws.local_dir), &ws.gdb)
        .run()
        .expect_err("bad coordinate");
    assert!(err.to_string().contains("row 1"), "{err}");

    let points = ws.gdb.read("Opt_Out_Address_Points").expect("previous class");
    assert_eq!(points.len(), 1);
}

#[test]
fn analysis_and_report_select_addresses_outside_buffers() {
    let ws = workspace("address\n123 Main St\n");
    let geocoder = FakeGeocoder::default();
    Transformer::new(transform_config(&ws.local_dir), &geocoder)
        .run()
        .expect("transform succeeds");
    Loader::new(load_config(&ws.local_dir), &ws.gdb)
        .run()
        .expect("load succeeds");
    seed_analysis_inputs(&ws.gdb);

    let summary = AnalysisStage::new(AnalysisConfig::default(), &ws.gdb)
        .run()
        .expect("analysis succeeds");
    assert_eq!(summary.points, 1);
    assert_eq!(summary.buffers, 1);
    assert_eq!(summary.selection, 1);
    assert_eq!(summary.targets, 3);
    assert!(ws.gdb.exists("Avoid_Buffer"));
    assert!(ws.gdb.exists("Final_Selection"));

    let targets = ws.gdb.read("Target_addresses").expect("targets written");
    let counts: Vec<(String, i64)> = targets
        .features
        .iter()
        .map(|feature| {
            (
                feature
                    .attribute("FULLADDR")
                    .and_then(|value| value.as_str())
                    .unwrap_or_default()
                    .to_string(),
                feature
                    .attribute(JOIN_COUNT_FIELD)
                    .and_then(|value| value.as_i64())
                    .unwrap_or(-1),
            )
        })
        .collect();
    assert_eq!(
        counts,
        vec![
            ("125 MAIN ST".to_string(), 0),
            ("900 ELM ST".to_string(), 1),
            ("40 FARM RD".to_string(), 0),
        ]
    );

    let report = ReportConfig {
        feature_class: "Target_addresses".to_string(),
        fields: vec!["FULLADDR".to_string(), "ADDRNUM".to_string()],
        output: ws.local_dir.join(TARGET_REPORT_CSV),
        definition_query: Some("Join_Count > 0".to_string()),
    };
    let summary = TargetReport::new(report, &ws.gdb)
        .run()
        .expect("report succeeds");
    assert_eq!(summary.rows, 1);
    assert_eq!(
        std::fs::read_to_string(&summary.path).expect("report written"),
        "FULLADDR,ADDRNUM\n900 ELM ST,900\n"
    );
}

#[test]
fn finalize_is_idempotent_and_pdf_bytes_are_stable() {
    let ws = workspace("address\n123 Main St\n");
    let geocoder = FakeGeocoder::default();
    Transformer::new(transform_config(&ws.local_dir), &geocoder)
        .run()
        .expect("transform succeeds");
    Loader::new(load_config(&ws.local_dir), &ws.gdb)
        .run()
        .expect("load succeeds");
    seed_analysis_inputs(&ws.gdb);
    AnalysisStage::new(AnalysisConfig::default(), &ws.gdb)
        .run()
        .expect("analysis succeeds");

    let project_path = ws.local_dir.join("wnvoutbreak.yaml");
    std::fs::write(&project_path, PROJECT).expect("write project");
    let first_pdf = ws.local_dir.join(MAP_PDF);
    let second_pdf = ws.local_dir.join("West_Nile_Map_again.pdf");

    let mut service =
        ProjectMapService::open(&project_path, "Map", "Layout", &ws.gdb).expect("project opens");
    let plan = FinalizePlan::standard("Zone 4 - July 12", &first_pdf);
    let summary = MapFinalizer::run(&mut service, &plan).expect("first export");
    assert_eq!(summary.layers_added, 3);
    assert_eq!(
        service
            .layer("Target_addresses")
            .expect("layer added")
            .definition_query
            .as_deref(),
        Some("Join_Count = 1")
    );

    // same service, same settings: nothing new is added and the output does not change
    let mut again = plan.clone();
    again.output = second_pdf.clone();
    let summary = MapFinalizer::run(&mut service, &again).expect("second export");
    assert_eq!(summary.layers_added, 0);

    let first = std::fs::read(&first_pdf).expect("first pdf");
    let second = std::fs::read(&second_pdf).expect("second pdf");
    assert!(first.starts_with(b"%PDF-"));
    assert_eq!(first, second);

    // a fresh service from the same project file renders the same bytes too
    let mut fresh =
        ProjectMapService::open(&project_path, "Map", "Layout", &ws.gdb).expect("project opens");
    MapFinalizer::run(&mut fresh, &again).expect("third export");
    assert_eq!(std::fs::read(&second_pdf).expect("third pdf"), first);
}

#[test]
fn finalize_errors_name_the_missing_element() {
    let ws = workspace("address\n");
    let project_path = ws.local_dir.join("wnvoutbreak.yaml");
    std::fs::write(&project_path, PROJECT.replace("Subtitle", "Caption")).expect("project");
    for class in ["Opt_Out_Address_Points", "Final_Selection", "Target_addresses"] {
        let geometry_type = if class == "Final_Selection" {
            GeometryType::Polygon
        } else {
            GeometryType::Point
        };
        ws.gdb
            .write(&FeatureClass::new(
                class,
                geometry_type,
                SpatialReference::Wgs84,
                vec![Field::integer("Join_Count")],
            ))
            .expect("seed class");
    }

    let mut service =
        ProjectMapService::open(&project_path, "Map", "Layout", &ws.gdb).expect("project opens");
    let plan = FinalizePlan::standard("Zone 4", ws.local_dir.join(MAP_PDF));
    let err = MapFinalizer::run(&mut service, &plan).expect_err("no Subtitle element");
    match err {
        GisError::ElementNotFound { layout, element } => {
            assert_eq!(layout, "Layout");
            assert_eq!(element, "Subtitle");
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(!ws.local_dir.join(MAP_PDF).exists());
    assert!(service.add_layer("Target_addresses").is_ok());
}
