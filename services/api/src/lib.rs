mod cli;
mod demo;
mod infra;
mod routes;
mod server;
mod verify;

use verihire::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
