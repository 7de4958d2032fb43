use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "sf-cli")]
#[command(about = "Scenario engine console")]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Mode,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Mode {
    /// Chat with a scenario over stdin/stdout.
    Run(RunArgs),
    /// Load a scenario, build an engine and print a summary.
    Check(CheckArgs),
}

#[derive(Debug, Args)]
pub(crate) struct RunArgs {
    #[arg(long = "scenario")]
    pub(crate) scenario: String,
    #[arg(long = "session", default_value = "console")]
    pub(crate) session: String,
    #[arg(long = "config")]
    pub(crate) config: Option<String>,
}

#[derive(Debug, Args)]
pub(crate) struct CheckArgs {
    #[arg(long = "scenario")]
    pub(crate) scenario: String,
    #[arg(long = "config")]
    pub(crate) config: Option<String>,
}
