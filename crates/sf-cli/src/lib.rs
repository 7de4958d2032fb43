use std::ffi::OsString;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use sf_api::{create_engine, load_config, load_scenario, summarize_scenario, CreateEngineOptions};
use sf_core::ScenarioError;
use sf_runtime::{EngineConfig, MemoryTransport};
use tracing_subscriber::EnvFilter;

mod cli_args;
mod console;
mod error_map;

pub(crate) use cli_args::{CheckArgs, Cli, Mode, RunArgs};
pub(crate) use console::{run_console, ConsoleTransport};
pub(crate) use error_map::{emit_error, map_runtime_start};

const CHECK_SESSION: &str = "check";

pub fn run_cli_from_args<I, T>(args: I) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => {
            let _ = error.print();
            return error.exit_code();
        }
    };
    init_tracing();
    match run(cli) {
        Ok(code) => code,
        Err(error) => emit_error(error),
    }
}

/// Logs go to stderr so stdout stays a clean transcript. `RUST_LOG`
/// overrides the default `warn` level.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run(cli: Cli) -> anyhow::Result<i32> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(map_runtime_start)?;
    runtime.block_on(async move {
        match cli.command {
            Mode::Run(args) => run_chat(args).await,
            Mode::Check(args) => run_check(args).await,
        }
    })
}

fn read_config(path: Option<&str>) -> Result<Option<EngineConfig>, ScenarioError> {
    path.map(load_config).transpose()
}

async fn run_chat(args: RunArgs) -> anyhow::Result<i32> {
    let config = read_config(args.config.as_deref())?;
    let scenario = load_scenario(&args.scenario)?;
    let transport = Arc::new(ConsoleTransport::stdout());
    let engine = create_engine(CreateEngineOptions {
        config,
        ..CreateEngineOptions::new(scenario, transport.clone())
    })?;
    let sweeper = engine.spawn_session_sweeper();

    println!("type /help for commands");
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let result = run_console(&engine, &transport, &args.session, stdin).await;
    sweeper.abort();
    result.with_context(|| format!("console session {}", args.session))?;
    Ok(0)
}

/// Loads the scenario, builds an engine and performs a dry start against an
/// in-memory transport.
async fn run_check(args: CheckArgs) -> anyhow::Result<i32> {
    let config = read_config(args.config.as_deref())?;
    let scenario = load_scenario(&args.scenario)?;
    let summary = summarize_scenario(&scenario);
    let transport = Arc::new(MemoryTransport::new());
    let engine = create_engine(CreateEngineOptions {
        config,
        ..CreateEngineOptions::new(scenario, transport.clone())
    })?;
    engine.start_session(CHECK_SESSION).await?;

    println!("RESULT:OK");
    println!("SUMMARY_JSON:{}", serde_json::to_string(&summary)?);
    println!("START_OUTPUTS:{}", transport.records().len());
    Ok(0)
}
