use crate::demo::{run_demo, run_validate, DemoArgs, ValidateArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use shelter_intake::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Shelter Intake",
    about = "Run the animal profile lifecycle service or check drafts offline",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service and job worker (default command)
    Serve(ServeArgs),
    /// Run the validation gate over a profile draft stored as JSON
    Validate(ValidateArgs),
    /// Walk a sample profile through the lifecycle without contacting any platform
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
        Command::Validate(args) => run_validate(args),
        Command::Demo(args) => run_demo(args),
    }
}
