use std::io::Write;
use std::path::PathBuf;

use serde_json::Value;
use tracing::info;

use crate::error::AppError;
use crate::fs::write_atomically;
use crate::gdb::{FeatureClass, Geodatabase, GisError};
use crate::map::DefinitionQuery;

pub const DEFAULT_REPORT_FIELDS: [&str; 7] = [
    "FULLADDR",
    "ADDRNUM",
    "UNITID",
    "PREDIR",
    "STREETNAME",
    "STREETSUFF",
    "POSTDIR",
];

#[derive(Debug, Clone, PartialEq)]
pub struct ReportConfig {
    pub feature_class: String,
    pub fields: Vec<String>,
    pub output: PathBuf,
    pub definition_query: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportSummary {
    pub rows: usize,
    pub path: PathBuf,
}

/// Exports the target addresses as a CSV for field crews.
#[derive(Debug)]
pub struct TargetReport<'a> {
    config: ReportConfig,
    gdb: &'a dyn Geodatabase,
}

impl<'a> TargetReport<'a> {
    pub fn new(config: ReportConfig, gdb: &'a dyn Geodatabase) -> Self {
        Self { config, gdb }
    }

    pub fn run(&self) -> Result<ReportSummary, AppError> {
        let config = &self.config;
        let class = self.gdb.read(&config.feature_class)?;
        let query = config
            .definition_query
            .as_deref()
            .filter(|text| !text.trim().is_empty())
            .map(|text| {
                DefinitionQuery::parse(text).map_err(|reason| GisError::InvalidQuery {
                    layer: config.feature_class.clone(),
                    reason,
                })
            })
            .transpose()?;

        let mut buffer = Vec::new();
        let rows = export_report(&class, &config.fields, query.as_ref(), &mut buffer)?;
        write_atomically(&config.output, &buffer)?;

        info!(
            rows,
            feature_class = %config.feature_class,
            path = %config.output.display(),
            "target report written"
        );
        Ok(ReportSummary {
            rows,
            path: config.output.clone(),
        })
    }
}

/// Writes `fields` of every feature passing `query` as CSV, returning the row count.
pub fn export_report<W: Write>(
    class: &FeatureClass,
    fields: &[String],
    query: Option<&DefinitionQuery>,
    writer: W,
) -> Result<usize, AppError> {
    let resolved: Vec<String> = fields
        .iter()
        .map(|field| class.require_field(field).map(|field| field.name.clone()))
        .collect::<Result<_, _>>()?;
    if let Some(query) = query {
        for field in query.fields() {
            class.require_field(field)?;
        }
    }

    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer
        .write_record(&resolved)
        .map_err(crate::pipeline::DataError::from)?;

    let mut rows = 0;
    for feature in &class.features {
        if query.is_some_and(|query| !query.matches(feature)) {
            continue;
        }
        let record: Vec<String> = resolved
            .iter()
            .map(|field| match feature.attribute(field) {
                None | Some(Value::Null) => String::new(),
                Some(Value::String(text)) => text.clone(),
                Some(other) => other.to_string(),
            })
            .collect();
        csv_writer
            .write_record(&record)
            .map_err(crate::pipeline::DataError::from)?;
        rows += 1;
    }
    csv_writer.flush()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gdb::{Attributes, Feature, Field, Geometry, GeometryType, SpatialReference};
    use geo::Point;
    use serde_json::json;

    fn targets() -> FeatureClass {
        let mut class = FeatureClass::new(
            "Target_addresses",
            GeometryType::Point,
            SpatialReference::Wgs84,
            vec![
                Field::text("FULLADDR"),
                Field::text("UNITID"),
                Field::integer("Join_Count"),
            ],
        );
        for (addr, unit, count) in [
            ("1777 BROADWAY", json!("A"), 1),
            ("1 PEARL ST", Value::Null, 1),
            ("9 WALNUT ST", Value::Null, 0),
        ] {
            let mut attributes = Attributes::new();
            attributes.insert("FULLADDR".to_string(), json!(addr));
            attributes.insert("UNITID".to_string(), unit);
            attributes.insert("Join_Count".to_string(), json!(count));
            class
                .insert(Feature::new(Geometry::Point(Point::new(0.0, 0.0)), attributes))
                .expect("insert");
        }
        class
    }

    #[test]
    fn writes_selected_fields_for_matching_features() {
        let query = DefinitionQuery::parse("Join_Count = 1").expect("query");
        let fields = vec!["fulladdr".to_string(), "UNITID".to_string()];
        let mut output = Vec::new();
        let rows = export_report(&targets(), &fields, Some(&query), &mut output).expect("export");

        assert_eq!(rows, 2);
        assert_eq!(
            String::from_utf8(output).expect("utf8"),
            "FULLADDR,UNITID\n1777 BROADWAY,A\n1 PEARL ST,\n"
        );
    }

    #[test]
    fn missing_report_field_is_a_gis_error() {
        let fields: Vec<String> = DEFAULT_REPORT_FIELDS.iter().map(|f| f.to_string()).collect();
        let err = export_report(&targets(), &fields, None, Vec::new()).expect_err("ADDRNUM");
        match err {
            AppError::Gis(GisError::FieldNotFound { field, .. }) => assert_eq!(field, "ADDRNUM"),
            other => panic!("unexpected error {other:?}"),
        }
    }
}
