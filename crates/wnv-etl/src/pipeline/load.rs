use std::io::Read;
use std::path::PathBuf;

use geo::Point;
use serde_json::Value;
use tracing::{debug, info};

use super::{column_index, strip_bom, DataError, LATITUDE_COLUMN, LONGITUDE_COLUMN};
use crate::error::AppError;
use crate::gdb::{
    sanitize_field_name, Attributes, Feature, FeatureClass, Field, Geodatabase, Geometry,
    GeometryType, SpatialReference,
};
use crate::geocode::Coordinate;

#[derive(Debug, Clone)]
pub struct LoadConfig {
    pub input: PathBuf,
    pub feature_class: String,
    /// CSV columns copied into attributes. `None` copies every original column.
    pub fields: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub rows: usize,
    pub inserted: usize,
    pub skipped: usize,
}

/// Writes geocoded rows into a point feature class, replacing its previous contents.
#[derive(Debug)]
pub struct Loader<'a> {
    config: LoadConfig,
    gdb: &'a dyn Geodatabase,
}

struct ColumnMapping {
    index: usize,
    field: String,
}

impl<'a> Loader<'a> {
    pub fn new(config: LoadConfig, gdb: &'a dyn Geodatabase) -> Self {
        Self { config, gdb }
    }

    pub fn run(&self) -> Result<LoadSummary, AppError> {
        let input = &self.config.input;
        info!(
            path = %input.display(),
            feature_class = %self.config.feature_class,
            "loading geocoded addresses"
        );

        let file = std::fs::File::open(input).map_err(|source| DataError::Io {
            path: input.clone(),
            source,
        })?;
        let (class, summary) = self.build(file)?;
        self.gdb.write(&class)?;

        info!(
            rows = summary.rows,
            inserted = summary.inserted,
            skipped = summary.skipped,
            "load finished"
        );
        Ok(summary)
    }

    /// Builds the feature class from CSV text without touching the geodatabase.
    pub fn build<R: Read>(&self, reader: R) -> Result<(FeatureClass, LoadSummary), AppError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::Headers)
            .from_reader(reader);
        let headers = csv_reader.headers().map_err(DataError::from)?.clone();

        let missing = |column: &str| DataError::MissingColumn {
            path: self.config.input.clone(),
            column: column.to_string(),
        };
        let lat_index = column_index(&headers, LATITUDE_COLUMN)
            .ok_or_else(|| missing(LATITUDE_COLUMN))?;
        let lon_index = column_index(&headers, LONGITUDE_COLUMN)
            .ok_or_else(|| missing(LONGITUDE_COLUMN))?;

        let mappings = self.column_mappings(&headers, lat_index, lon_index)?;
        let fields = mappings
            .iter()
            .map(|mapping| Field::text(mapping.field.clone()))
            .collect();
        let mut class = FeatureClass::new(
            self.config.feature_class.clone(),
            GeometryType::Point,
            SpatialReference::Wgs84,
            fields,
        );

        let mut summary = LoadSummary::default();
        for (index, record) in csv_reader.records().enumerate() {
            let record = record.map_err(DataError::from)?;
            let row = index + 1;
            summary.rows += 1;

            let latitude = record.get(lat_index).unwrap_or_default().trim();
            let longitude = record.get(lon_index).unwrap_or_default().trim();
            match (latitude.is_empty(), longitude.is_empty()) {
                (true, true) => {
                    debug!(row, "skipping row without coordinates");
                    summary.skipped += 1;
                    continue;
                }
                (false, false) => {}
                _ => {
                    return Err(DataError::InvalidCoordinate {
                        row,
                        value: format!("{latitude},{longitude}"),
                    }
                    .into());
                }
            }
            let coordinate = parse_coordinate(row, latitude, longitude)?;

            let mut attributes = Attributes::new();
            for mapping in &mappings {
                let value = record.get(mapping.index).unwrap_or_default();
                attributes.insert(mapping.field.clone(), Value::String(value.to_string()));
            }
            class.insert(Feature::new(
                Geometry::Point(Point::new(coordinate.longitude, coordinate.latitude)),
                attributes,
            ))?;
            summary.inserted += 1;
        }

        Ok((class, summary))
    }

    fn column_mappings(
        &self,
        headers: &csv::StringRecord,
        lat_index: usize,
        lon_index: usize,
    ) -> Result<Vec<ColumnMapping>, DataError> {
        let indices: Vec<usize> = match &self.config.fields {
            Some(selected) => selected
                .iter()
                .map(|column| {
                    column_index(headers, column).ok_or_else(|| DataError::MissingColumn {
                        path: self.config.input.clone(),
                        column: column.clone(),
                    })
                })
                .collect::<Result<_, _>>()?,
            None => (0..headers.len())
                .filter(|index| *index != lat_index && *index != lon_index)
                .collect(),
        };

        let mut mappings: Vec<ColumnMapping> = Vec::with_capacity(indices.len());
        for index in indices {
            let base = sanitize_field_name(strip_bom(&headers[index]));
            let mut field = base.clone();
            let mut suffix = 1;
            while mappings
                .iter()
                .any(|mapping| mapping.field.eq_ignore_ascii_case(&field))
            {
                field = format!("{base}_{suffix}");
                suffix += 1;
            }
            mappings.push(ColumnMapping { index, field });
        }
        Ok(mappings)
    }
}

fn parse_coordinate(row: usize, latitude: &str, longitude: &str) -> Result<Coordinate, DataError> {
    let invalid = |value: &str| DataError::InvalidCoordinate {
        row,
        value: value.to_string(),
    };
    let lat = latitude.parse::<f64>().map_err(|_| invalid(latitude))?;
    let lon = longitude.parse::<f64>().map_err(|_| invalid(longitude))?;
    Coordinate::new(lat, lon).ok_or_else(|| invalid(&format!("{latitude},{longitude}")))
}
