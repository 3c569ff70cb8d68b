//! Command-line parsing for the `tomo` binary.
//!
//! Parsing only; dispatch lives in `app`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::{AutoOr, CorMode, CorObservation};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "tomo", version, about = "Tomography pre/post-processing and COR calibration")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Centre-of-rotation calibration.
    #[command(subcommand)]
    Cor(CorCommand),
    /// List both stage chains in execution order with their parameters.
    Stages,
    /// Load and validate a pipeline config without touching any data.
    CheckConfig(CheckConfigArgs),
    /// Run pre-processing on a synthetic stack under several execution
    /// settings and compare the outputs bit for bit.
    Determinism(DeterminismArgs),
}

#[derive(Debug, Subcommand)]
pub enum CorCommand {
    /// Fit `cor = intercept + slope * slice` and report the tilt.
    Fit(CorFitArgs),
    /// Build the dense per-slice COR table.
    Table(CorTableArgs),
}

/// Where observations come from. Sources are merged; later ones win per slice.
#[derive(Debug, Args, Clone)]
pub struct ObservationArgs {
    /// Observation as SLICE=COR (repeatable).
    #[arg(long = "obs", value_name = "SLICE=COR")]
    pub obs: Vec<CorObservation>,

    /// CSV file with `slice,cor` rows.
    #[arg(long = "obs-csv", value_name = "CSV")]
    pub obs_csv: Option<PathBuf>,

    /// COR JSON file written by `tomo cor fit --export-json`.
    #[arg(long = "obs-json", value_name = "JSON")]
    pub obs_json: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct CorFitArgs {
    #[command(flatten)]
    pub observations: ObservationArgs,

    /// Write observations and the fitted model to JSON.
    #[arg(long = "export-json", value_name = "JSON")]
    pub export_json: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct CorTableArgs {
    #[command(flatten)]
    pub observations: ObservationArgs,

    /// Number of slices (projection rows).
    #[arg(long)]
    pub slices: usize,

    #[arg(long, value_enum, default_value_t = CorMode::Interpolate)]
    pub mode: CorMode,

    /// Rows printed before eliding the middle of the table.
    #[arg(long, default_value_t = 20)]
    pub rows: usize,

    /// Write the full table as `slice,cor` CSV.
    #[arg(long = "export-csv", value_name = "CSV")]
    pub export_csv: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct CheckConfigArgs {
    /// Pipeline config JSON.
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,
}

#[derive(Debug, Args)]
pub struct DeterminismArgs {
    #[arg(long, default_value_t = 64)]
    pub frames: usize,

    #[arg(long, default_value_t = 32)]
    pub height: usize,

    #[arg(long, default_value_t = 48)]
    pub width: usize,

    /// Worker counts to compare (`auto` allowed).
    #[arg(long, value_delimiter = ',', default_value = "1,2,8")]
    pub cores: Vec<AutoOr>,

    /// Frames per chunk (`auto` allowed).
    #[arg(long, default_value = "auto")]
    pub chunksize: AutoOr,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Use this config's pre-processing stages instead of the built-in chain.
    #[arg(long, value_name = "CONFIG")]
    pub config: Option<PathBuf>,

    /// Print the run report of the reference run.
    #[arg(long)]
    pub report: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cor_table_with_repeated_observations() {
        let cli = Cli::try_parse_from([
            "tomo", "cor", "table", "--slices", "10", "--obs", "2=5.0", "--obs", "8=11", "--mode", "regression",
        ])
        .unwrap();
        let Command::Cor(CorCommand::Table(args)) = cli.command else {
            panic!("wrong command");
        };
        assert_eq!(args.slices, 10);
        assert_eq!(args.mode, CorMode::Regression);
        assert_eq!(args.observations.obs, vec![CorObservation::new(2, 5.0), CorObservation::new(8, 11.0)]);
    }

    #[test]
    fn determinism_cores_accept_a_list() {
        let cli = Cli::try_parse_from(["tomo", "determinism", "--cores", "1,4,auto"]).unwrap();
        let Command::Determinism(args) = cli.command else {
            panic!("wrong command");
        };
        assert_eq!(args.cores, vec![AutoOr::Fixed(1), AutoOr::Fixed(4), AutoOr::Auto]);
        assert_eq!(args.chunksize, AutoOr::Auto);
    }

    #[test]
    fn malformed_observation_is_rejected() {
        assert!(Cli::try_parse_from(["tomo", "cor", "fit", "--obs", "12"]).is_err());
    }
}
