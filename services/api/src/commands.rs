use crate::cli::ArtifactArgs;
use crate::infra::{artifact_store, load_service, resolve_artifact};
use chrono::NaiveDate;
use clap::Args;
use loan_guidance::config::AppConfig;
use loan_guidance::error::AppError;
use loan_guidance::telemetry;
use loan_guidance::workflows::guidance::domain::parse_date;
use loan_guidance::workflows::guidance::{
    save_artifact, Clock, FixedClock, GuidanceError, SystemClock,
};
use loan_guidance::workflows::training::{
    load_training_csv, TrainingError, TrainingNoise, TrainingOptions, TrainingWorkflow,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct TrainArgs {
    /// Labelled training CSV (sector_data and payment_history as JSON cells)
    #[arg(long)]
    pub(crate) data: PathBuf,
    #[command(flatten)]
    pub(crate) artifact: ArtifactArgs,
    /// Explicit fit id; defaults to one derived from the training timestamp
    #[arg(long)]
    pub(crate) fit_id: Option<String>,
    /// Apply seeded feature/label/target noise to the training split
    #[arg(long)]
    pub(crate) noise: bool,
    /// Seed for the training noise
    #[arg(long, default_value_t = 42)]
    pub(crate) noise_seed: u64,
    /// Cross-validation folds over the training split (0 disables)
    #[arg(long, default_value_t = 5)]
    pub(crate) cv_folds: usize,
    /// Print the training report as JSON instead of text
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Args, Debug)]
pub(crate) struct AssessArgs {
    /// JSON file holding one guidance request body
    #[arg(long)]
    pub(crate) input: PathBuf,
    #[command(flatten)]
    pub(crate) artifact: ArtifactArgs,
    /// Anchor date for the payment schedule (defaults to today)
    #[arg(long, value_parser = parse_date)]
    pub(crate) today: Option<NaiveDate>,
}

pub(crate) fn run_train(args: TrainArgs) -> Result<(), AppError> {
    let TrainArgs {
        data,
        artifact,
        fit_id,
        noise,
        noise_seed,
        cv_folds,
        json,
    } = args;

    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;
    let location = resolve_artifact(config.artifacts, artifact);

    let records = load_training_csv(&data).map_err(TrainingError::from)?;
    let options = TrainingOptions {
        fit_id,
        cv_folds,
        noise: noise.then(|| TrainingNoise {
            seed: noise_seed,
            ..TrainingNoise::default()
        }),
        ..TrainingOptions::default()
    };
    let outcome = TrainingWorkflow::new(options).train(&records)?;

    let store = artifact_store(&location);
    save_artifact(&store, &location.key, &outcome.artifact)?;

    if json {
        let rendered =
            serde_json::to_string_pretty(&outcome.report).map_err(std::io::Error::from)?;
        println!("{rendered}");
    } else {
        println!("Training report ({} records from {})", records.len(), data.display());
        for line in outcome.report.summary_lines() {
            println!("  {line}");
        }
        println!(
            "Artifact saved to {}",
            store.root().join(&location.key).display()
        );
    }
    Ok(())
}

pub(crate) fn run_assess(args: AssessArgs) -> Result<(), AppError> {
    let AssessArgs {
        input,
        artifact,
        today,
    } = args;

    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;
    let location = resolve_artifact(config.artifacts, artifact);

    let clock: Arc<dyn Clock> = match today {
        Some(date) => Arc::new(FixedClock(date)),
        None => Arc::new(SystemClock),
    };
    let service = load_service(&artifact_store(&location), &location.key, clock);

    let raw = std::fs::read(&input)?;
    let body = serde_json::from_slice(&raw)
        .map_err(|err| GuidanceError::validation("request", err.to_string()))?;
    let (_, guidance) = service.guidance_for_json(body)?;

    let rendered = serde_json::to_string_pretty(&guidance).map_err(std::io::Error::from)?;
    println!("{rendered}");
    Ok(())
}
