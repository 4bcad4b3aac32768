use std::io::{Read, Write};
use std::path::PathBuf;

use tracing::{info, warn};

use super::{column_index, DataError, LATITUDE_COLUMN, LONGITUDE_COLUMN};
use crate::fs::write_atomically;
use crate::geocode::Geocoder;

#[derive(Debug, Clone)]
pub struct TransformConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub address_field: String,
    pub city_state: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransformSummary {
    pub rows: usize,
    pub geocoded: usize,
    pub unresolved: usize,
}

/// The query string sent to the geocoder for one row.
pub fn full_address(address: &str, city_state: &str) -> String {
    let address = address.trim();
    let city_state = city_state.trim();
    if city_state.is_empty() {
        address.to_string()
    } else {
        format!("{address}, {city_state}")
    }
}

/// Appends `latitude`/`longitude` columns to the extracted CSV.
#[derive(Debug)]
pub struct Transformer<'a> {
    config: TransformConfig,
    geocoder: &'a dyn Geocoder,
}

impl<'a> Transformer<'a> {
    pub fn new(config: TransformConfig, geocoder: &'a dyn Geocoder) -> Self {
        Self { config, geocoder }
    }

    pub fn run(&self) -> Result<TransformSummary, DataError> {
        let input = &self.config.input;
        info!(path = %input.display(), "geocoding opt-out addresses");

        let file = std::fs::File::open(input).map_err(|source| DataError::Io {
            path: input.clone(),
            source,
        })?;
        let mut buffer = Vec::new();
        let summary = self.transform(file, &mut buffer)?;

        let output = &self.config.output;
        write_atomically(output, &buffer).map_err(|source| DataError::Io {
            path: output.clone(),
            source,
        })?;

        info!(
            rows = summary.rows,
            geocoded = summary.geocoded,
            unresolved = summary.unresolved,
            path = %output.display(),
            "transformation finished"
        );
        Ok(summary)
    }

    /// Streams rows from `reader` to `writer`. Geocoding failures never abort the run.
    pub fn transform<R: Read, W: Write>(
        &self,
        reader: R,
        writer: W,
    ) -> Result<TransformSummary, DataError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::Headers)
            .from_reader(reader);
        let headers = csv_reader.headers()?.clone();

        let address_index = column_index(&headers, &self.config.address_field).ok_or_else(|| {
            DataError::MissingColumn {
                path: self.config.input.clone(),
                column: self.config.address_field.clone(),
            }
        })?;
        for column in [LATITUDE_COLUMN, LONGITUDE_COLUMN] {
            if column_index(&headers, column).is_some() {
                return Err(DataError::DuplicateColumn {
                    path: self.config.input.clone(),
                    column: column.to_string(),
                });
            }
        }

        let mut csv_writer = csv::Writer::from_writer(writer);
        let mut out_headers: Vec<&str> = headers.iter().map(super::strip_bom).collect();
        out_headers.push(LATITUDE_COLUMN);
        out_headers.push(LONGITUDE_COLUMN);
        csv_writer.write_record(&out_headers)?;

        let mut summary = TransformSummary::default();
        for (index, record) in csv_reader.records().enumerate() {
            let record = record?;
            let row = index + 1;
            summary.rows += 1;

            let address = record.get(address_index).unwrap_or_default();
            let (latitude, longitude) = match self.resolve(row, address) {
                Some(coordinate) => {
                    summary.geocoded += 1;
                    (
                        coordinate.latitude.to_string(),
                        coordinate.longitude.to_string(),
                    )
                }
                None => {
                    summary.unresolved += 1;
                    (String::new(), String::new())
                }
            };

            let mut fields: Vec<&str> = record.iter().collect();
            fields.push(&latitude);
            fields.push(&longitude);
            csv_writer.write_record(&fields)?;
        }

        csv_writer.flush().map_err(|source| DataError::Io {
            path: self.config.output.clone(),
            source,
        })?;
        Ok(summary)
    }

    fn resolve(&self, row: usize, address: &str) -> Option<crate::geocode::Coordinate> {
        if address.trim().is_empty() {
            warn!(row, "blank address, leaving coordinates empty");
            return None;
        }

        let query = full_address(address, &self.config.city_state);
        match self.geocoder.geocode(&query) {
            Ok(Some(coordinate)) => Some(coordinate),
            Ok(None) => {
                warn!(row, address = %query, "no geocoding match");
                None
            }
            Err(err) => {
                warn!(row, address = %query, error = %err, "geocoding failed");
                None
            }
        }
    }
}
