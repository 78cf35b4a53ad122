use crate::demo::{run_demo, run_detect, run_score, DemoArgs, DetectArgs, ScoreArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use seatwatch::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "seatwatch",
    about = "Childcare admission forecasting, route strategy, and seat-opening alerts",
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
    /// Score one facility from a snapshot CSV and print the result as JSON
    Score(ScoreArgs),
    /// Run one turnover detection pass over a snapshot CSV
    Detect(DetectArgs),
    /// Walk through scoring, route analysis, detection, and alert delivery on synthetic data
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Score(args) => run_score(args),
        Command::Detect(args) => run_detect(args),
        Command::Demo(args) => run_demo(args),
    }
}
