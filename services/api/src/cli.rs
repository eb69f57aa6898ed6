use crate::demo::{run_demo, DemoArgs};
use crate::server;
use crate::verify::{run_verify, VerifyArgs};
use clap::{Args, Parser, Subcommand};
use verihire::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "VeriHire",
    about = "Run the VeriHire candidate verification service from the command line",
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
    /// Verify a set of documents on disk against the configured language model
    Verify(VerifyArgs),
    /// Run an offline walkthrough with a scripted model
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
        Command::Verify(args) => run_verify(args).await,
        Command::Demo(args) => run_demo(args).await,
    }
}
