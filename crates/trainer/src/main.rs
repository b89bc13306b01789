use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};

use trainer::cli::TrainArgs;
use trainer::preview::PreviewSampler;
use trainer::simulated::SimulatedEngine;
use trainer::{launch, CancelToken, RunFailure, RunOutcome, RunSummary, TrainerError};

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = TrainArgs::parse();
    match run(&args) {
        Ok(summary) => {
            report(&summary);
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("{:#}", err);
            ExitCode::from(exit_code(&err))
        }
    }
}

fn run(args: &TrainArgs) -> Result<RunSummary> {
    let config = args
        .run_params()
        .context("Failed to load run parameters")?
        .validate()?;

    println!("{}", "=".repeat(60));
    println!("         CYCLEGAN TRAINING");
    println!("{}", "=".repeat(60));
    println!("Training configuration:");
    for (key, value) in config.describe() {
        println!("  {key}: {value}");
    }

    let cancel = CancelToken::new();
    cancel
        .install_ctrlc_handler()
        .context("Failed to install Ctrl-C handler")?;

    let engine = SimulatedEngine::new(args.seed).with_epoch_delay(args.epoch_delay());
    let summary = launch(&config, engine, PreviewSampler::default(), cancel)?;
    Ok(summary)
}

fn report(summary: &RunSummary) {
    let last = summary
        .last_completed_epoch
        .map_or_else(|| "none".to_string(), |epoch| (epoch + 1).to_string());
    match summary.outcome {
        RunOutcome::Completed => info!(
            "Training completed: {} epochs this run, last epoch {}, {} checkpoints written",
            summary.epochs_run,
            last,
            summary.checkpoints.len()
        ),
        RunOutcome::Interrupted => info!(
            "Training interrupted after epoch {}; resume with --resume",
            last
        ),
    }
    if summary.sample_failures > 0 {
        warn!("{} sample renders failed", summary.sample_failures);
    }
}

fn exit_code(err: &anyhow::Error) -> u8 {
    if let Some(failure) = err.downcast_ref::<RunFailure>() {
        return failure.exit_code();
    }
    err.chain()
        .find_map(|cause| cause.downcast_ref::<TrainerError>())
        .map_or(1, TrainerError::exit_code)
}
