//! Opt-out address pipeline for West Nile virus spraying maps.
//!
//! Stages run in a fixed order and hand off through files or the geodatabase:
//! extract the form CSV, geocode it, load the points, run the exclusion analysis,
//! and finalize the map layout as a PDF.

pub mod analysis;
pub mod config;
pub mod error;
pub(crate) mod fs;
pub mod gdb;
pub mod geocode;
pub mod map;
pub mod pipeline;
pub mod telemetry;
