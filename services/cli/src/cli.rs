use crate::stages::{
    run_all, run_analyze, run_extract, run_finalize, run_load, run_report, run_transform,
    FinalizeArgs,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use wnv_etl::config::AppConfig;
use wnv_etl::error::AppError;
use wnv_etl::telemetry;

#[derive(Parser, Debug)]
#[command(
    name = "wnv-etl",
    about = "Geocode West Nile virus spraying opt-out addresses and publish the exclusion map",
    version
)]
struct Cli {
    /// Path to the YAML configuration (defaults to $WNV_CONFIG or config/wnvoutbreak.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download the opt-out form export to the local directory
    Extract,
    /// Geocode the extracted addresses into the transformed CSV
    Transform,
    /// Replace the opt-out point feature class with the geocoded rows
    Load,
    /// Buffer opt-out points and derive the target address layer
    Analyze,
    /// Write the target address report CSV
    Report,
    /// Style the map layout and export it to PDF
    Finalize(FinalizeArgs),
    /// Run every stage in order, stopping at the first failure
    Run(FinalizeArgs),
}

pub(crate) fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;

    std::fs::create_dir_all(&config.proj_dir)?;
    std::fs::create_dir_all(&config.local_dir)?;
    telemetry::init(&config.telemetry)?;

    match cli.command {
        Command::Extract => run_extract(&config),
        Command::Transform => run_transform(&config),
        Command::Load => run_load(&config),
        Command::Analyze => run_analyze(&config),
        Command::Report => run_report(&config),
        Command::Finalize(args) => run_finalize(&config, args),
        Command::Run(args) => run_all(&config, args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn finalize_accepts_subtitle_and_output() {
        let cli = Cli::try_parse_from([
            "wnv-etl",
            "--config",
            "wnv.yaml",
            "finalize",
            "--subtitle",
            "Zone 4",
            "--output",
            "map.pdf",
        ])
        .expect("arguments parse");
        assert_eq!(cli.config, Some(PathBuf::from("wnv.yaml")));
        match cli.command {
            Command::Finalize(args) => {
                assert_eq!(args.subtitle.as_deref(), Some("Zone 4"));
                assert_eq!(args.output, Some(PathBuf::from("map.pdf")));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
