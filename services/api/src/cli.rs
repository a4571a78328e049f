use crate::demo::{run_metadata, run_views, MetadataArgs, ViewsArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use northwind::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Northwind Data API",
    about = "Serve and inspect the Northwind sample data API from the command line",
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
    /// Print the published entity data model as JSON
    Metadata(MetadataArgs),
    /// Print the rows of the read-only views against the seed data
    Views(ViewsArgs),
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
        Command::Metadata(args) => run_metadata(args),
        Command::Views(args) => run_views(args),
    }
}
