use tracing::info;

use crate::analysis::{buffer_points, erase, reproject, spatial_join};
use crate::gdb::{Geodatabase, GisError};

pub const DEFAULT_BUFFER_DISTANCE_FEET: f64 = 1500.0;

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisConfig {
    pub points_class: String,
    pub buffer_class: String,
    pub high_risk_class: String,
    pub selection_class: String,
    pub address_class: String,
    pub target_class: String,
    pub buffer_distance_feet: f64,
    /// Drop addresses outside the selection instead of keeping them with `Join_Count = 0`.
    pub keep_common: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            points_class: "Opt_Out_Address_Points".to_string(),
            buffer_class: "Avoid_Buffer".to_string(),
            high_risk_class: "High_Risk_Intersect".to_string(),
            selection_class: "Final_Selection".to_string(),
            address_class: "Addresses".to_string(),
            target_class: "Target_addresses".to_string(),
            buffer_distance_feet: DEFAULT_BUFFER_DISTANCE_FEET,
            keep_common: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnalysisSummary {
    pub points: usize,
    pub buffers: usize,
    pub selection: usize,
    pub targets: usize,
}

/// Buffer, erase and join: opt-out points to the final list of spray target addresses.
#[derive(Debug)]
pub struct AnalysisStage<'a> {
    config: AnalysisConfig,
    gdb: &'a dyn Geodatabase,
}

impl<'a> AnalysisStage<'a> {
    pub fn new(config: AnalysisConfig, gdb: &'a dyn Geodatabase) -> Self {
        Self { config, gdb }
    }

    pub fn run(&self) -> Result<AnalysisSummary, GisError> {
        let config = &self.config;
        info!(
            distance_feet = config.buffer_distance_feet,
            "starting spray zone analysis"
        );

        let points = self.gdb.read(&config.points_class)?;
        let buffers = buffer_points(&points, config.buffer_distance_feet, &config.buffer_class)?;
        self.gdb.write(&buffers)?;

        let high_risk = self.gdb.read(&config.high_risk_class)?;
        let buffers = reproject(&buffers, high_risk.spatial_reference);
        let selection = erase(&high_risk, &buffers, &config.selection_class)?;
        self.gdb.write(&selection)?;

        let addresses = self.gdb.read(&config.address_class)?;
        let selection = reproject(&selection, addresses.spatial_reference);
        let targets = spatial_join(
            &addresses,
            &selection,
            config.keep_common,
            &config.target_class,
        )?;
        self.gdb.write(&targets)?;

        let summary = AnalysisSummary {
            points: points.len(),
            buffers: buffers.len(),
            selection: selection.len(),
            targets: targets.len(),
        };
        info!(
            points = summary.points,
            buffers = summary.buffers,
            selection = summary.selection,
            targets = summary.targets,
            "analysis finished"
        );
        Ok(summary)
    }
}
