//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - runs COR calibration commands
//! - lists and validates stage configurations
//! - runs the synthetic determinism check
//! - prints reports and writes optional exports

use clap::Parser;

use crate::cli::{CheckConfigArgs, Command, CorCommand, CorFitArgs, CorTableArgs, DeterminismArgs};
use crate::cor::{CorModel, dense_table};
use crate::domain::Phase;
use crate::error::AppError;
use crate::io::CorFile;
use crate::synthetic::PhantomSpec;

pub mod pipeline;

/// Entry point for the `tomo` binary.
pub fn run() -> Result<(), AppError> {
    let cli = crate::cli::Cli::parse();

    match cli.command {
        Command::Cor(CorCommand::Fit(args)) => handle_cor_fit(args),
        Command::Cor(CorCommand::Table(args)) => handle_cor_table(args),
        Command::Stages => {
            println!("{}", crate::report::format_stage_list());
            Ok(())
        }
        Command::CheckConfig(args) => handle_check_config(args),
        Command::Determinism(args) => handle_determinism(args),
    }
}

fn handle_cor_fit(args: CorFitArgs) -> Result<(), AppError> {
    let observations = pipeline::gather_observations(&args.observations)?;
    let model = CorModel::fit(&observations)?;

    println!("{}", crate::report::format_cor_model(&model, &observations));

    if let Some(path) = &args.export_json {
        crate::io::write_cor_json(path, &CorFile::new(observations))?;
        log::info!("wrote COR observations and model to {}", path.display());
    }
    Ok(())
}

fn handle_cor_table(args: CorTableArgs) -> Result<(), AppError> {
    let observations = pipeline::gather_observations(&args.observations)?;
    let table = dense_table(args.mode, args.slices, &observations)?;

    println!("{}", crate::report::format_cor_table(&table, args.rows));

    if let Some(path) = &args.export_csv {
        crate::io::write_cor_table_csv(path, &table)?;
        log::info!("wrote {} COR value(s) to {}", table.len(), path.display());
    }
    Ok(())
}

fn handle_check_config(args: CheckConfigArgs) -> Result<(), AppError> {
    let config = crate::io::read_config_json(&args.config)?;
    crate::pipeline::validate_config(&config)?;

    let enabled = |phase: Phase| config.stages(phase).values().filter(|s| s.enabled).count();
    println!(
        "{}: ok ({} pre / {} post stage(s) enabled, cores={}, chunksize={})",
        args.config.display(),
        enabled(Phase::Pre),
        enabled(Phase::Post),
        config.execution.cores,
        config.execution.chunksize
    );
    Ok(())
}

fn handle_determinism(args: DeterminismArgs) -> Result<(), AppError> {
    let phantom = PhantomSpec {
        frames: args.frames,
        height: args.height,
        width: args.width,
        seed: args.seed,
        ..PhantomSpec::default()
    };
    let base = match &args.config {
        Some(path) => crate::io::read_config_json(path)?,
        None => pipeline::builtin_preprocess_config((phantom.height, phantom.width)),
    };

    let run = pipeline::run_determinism(&phantom, &base, &args.cores, args.chunksize)?;

    if args.report {
        println!("{}", crate::report::format_run_report(&run.report));
    }
    println!("{}", crate::report::format_determinism(&run.rows));

    if !run.all_identical() {
        return Err(AppError::new(4, "Outputs differ between execution settings."));
    }
    Ok(())
}
