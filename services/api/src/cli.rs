use crate::commands::{run_assess, run_train, AssessArgs, TrainArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use loan_guidance::error::AppError;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "Loan Guidance",
    about = "Score loan default risk and generate repayment guidance",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Train both models from a labelled CSV and store the artifact
    Train(TrainArgs),
    /// Generate guidance for a single JSON request using the stored artifact
    Assess(AssessArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ArtifactArgs {
    /// Override the artifact store root directory
    #[arg(long)]
    pub(crate) artifact_root: Option<PathBuf>,
    /// Override the artifact key within the store
    #[arg(long)]
    pub(crate) artifact_key: Option<String>,
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    #[command(flatten)]
    pub(crate) artifact: ArtifactArgs,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Train(args) => run_train(args),
        Command::Assess(args) => run_assess(args),
    }
}
