mod cli;
mod demo;
mod infra;
mod jobs;
mod routes;
mod scheduler;
mod server;

use seatwatch::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
