use chrono::{Local, NaiveDate};
use clap::Args;
use std::path::PathBuf;
use tracing::info;
use wnv_etl::config::AppConfig;
use wnv_etl::error::AppError;
use wnv_etl::gdb::FileGeodatabase;
use wnv_etl::geocode::NominatimGeocoder;
use wnv_etl::map::ProjectMapService;
use wnv_etl::pipeline::{AnalysisStage, Extractor, Loader, MapFinalizer, TargetReport, Transformer};

#[derive(Args, Debug, Default)]
pub(crate) struct FinalizeArgs {
    /// Subtitle text for the layout (defaults to the configured subtitle or today's date)
    #[arg(long)]
    pub(crate) subtitle: Option<String>,
    /// Where to write the PDF (defaults to West_Nile_Map.pdf in the local directory)
    #[arg(long)]
    pub(crate) output: Option<PathBuf>,
}

pub(crate) fn run_extract(config: &AppConfig) -> Result<(), AppError> {
    let summary = Extractor::new(config.extract_config())?.run()?;
    println!(
        "extracted {} bytes to {} at {}",
        summary.bytes,
        summary.path.display(),
        summary.fetched_at.to_rfc3339()
    );
    Ok(())
}

pub(crate) fn run_transform(config: &AppConfig) -> Result<(), AppError> {
    let geocoder = NominatimGeocoder::new(config.nominatim_config())?;
    let summary = Transformer::new(config.transform_config(), &geocoder).run()?;
    println!(
        "geocoded {} of {} rows ({} unresolved)",
        summary.geocoded, summary.rows, summary.unresolved
    );
    Ok(())
}

pub(crate) fn run_load(config: &AppConfig) -> Result<(), AppError> {
    let gdb = FileGeodatabase::create(&config.gdb_path)?;
    let load = config.load_config();
    let feature_class = load.feature_class.clone();
    let summary = Loader::new(load, &gdb).run()?;
    println!(
        "loaded {} of {} rows into {} ({} skipped without coordinates)",
        summary.inserted, summary.rows, feature_class, summary.skipped
    );
    Ok(())
}

pub(crate) fn run_analyze(config: &AppConfig) -> Result<(), AppError> {
    let gdb = FileGeodatabase::open(&config.gdb_path)?;
    let summary = AnalysisStage::new(config.analysis_config(), &gdb).run()?;
    println!(
        "buffered {} opt-out points, {} selection polygons, {} target addresses",
        summary.points, summary.selection, summary.targets
    );
    Ok(())
}

pub(crate) fn run_report(config: &AppConfig) -> Result<(), AppError> {
    let gdb = FileGeodatabase::open(&config.gdb_path)?;
    let summary = TargetReport::new(config.report_config(), &gdb).run()?;
    println!(
        "wrote {} target addresses to {}",
        summary.rows,
        summary.path.display()
    );
    Ok(())
}

pub(crate) fn run_finalize(config: &AppConfig, args: FinalizeArgs) -> Result<(), AppError> {
    let gdb = FileGeodatabase::open(&config.gdb_path)?;
    let mut service = ProjectMapService::open(
        &config.proj_loc,
        &config.finalize.map,
        &config.finalize.layout,
        &gdb,
    )?;

    let subtitle = args
        .subtitle
        .or_else(|| config.finalize.subtitle.clone())
        .unwrap_or_else(|| default_subtitle(Local::now().date_naive()));
    let plan = config.finalize_plan(Some(subtitle), args.output);
    let summary = MapFinalizer::run(&mut service, &plan)?;
    println!(
        "exported {} at {} dpi ({} layers added)",
        summary.path.display(),
        summary.resolution,
        summary.layers_added
    );
    Ok(())
}

pub(crate) fn run_all(config: &AppConfig, args: FinalizeArgs) -> Result<(), AppError> {
    info!("running full pipeline");
    run_extract(config)?;
    run_transform(config)?;
    run_load(config)?;
    run_analyze(config)?;
    run_report(config)?;
    run_finalize(config, args)?;
    info!("pipeline finished");
    Ok(())
}

fn default_subtitle(today: NaiveDate) -> String {
    format!("Opt-out addresses as of {}", today.format("%B %-d, %Y"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_subtitle_spells_out_the_date() {
        let date = NaiveDate::from_ymd_opt(2024, 7, 4).expect("valid date");
        assert_eq!(default_subtitle(date), "Opt-out addresses as of July 4, 2024");
    }
}
