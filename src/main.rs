/*!
 * Process Runner - Command Line Entry Point
 *
 * Runs one command through the ProcessManager with limits from the
 * environment and prints the result (or the typed error) as JSON.
 */

use clap::Parser;
use process_runner::{
    init_tracing, ExecError, ExecuteOptions, ExecuteRequest, ProcessLimits, ProcessManager,
    TerminalType,
};
use std::error::Error;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "process-runner")]
#[command(about = "Run a command under concurrency, memory, CPU and time limits")]
struct Cli {
    /// Timeout in milliseconds (clamped to the configured maximum)
    #[arg(short, long)]
    timeout_ms: Option<u64>,

    /// Working directory
    #[arg(long)]
    cwd: Option<PathBuf>,

    /// Extra environment variable, KEY=VALUE (repeatable)
    #[arg(short, long = "env", value_parser = parse_env_pair)]
    env: Vec<(String, String)>,

    /// Open the command in a visible terminal window
    #[arg(long)]
    visible: bool,

    /// Terminal emulator for --visible
    #[arg(long, value_parser = parse_terminal)]
    terminal: Option<TerminalType>,

    /// Window title for --visible
    #[arg(long)]
    title: Option<String>,

    /// Keep the terminal window open after the command ends
    #[arg(long)]
    keep_open: bool,

    /// Command to run, followed by its arguments
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

fn parse_env_pair(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", raw))
}

fn parse_terminal(raw: &str) -> Result<TerminalType, String> {
    serde_json::from_value(serde_json::Value::String(raw.to_string()))
        .map_err(|_| format!("unknown terminal '{}'", raw))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();
    let cli = Cli::parse();

    let limits = ProcessLimits::from_env()?;
    let manager = ProcessManager::new(limits);

    let mut options = ExecuteOptions::new().with_keep_open(cli.keep_open);
    options.cwd = cli.cwd;
    options.env = cli.env;
    options.timeout_ms = cli.timeout_ms;
    options.title = cli.title;
    if cli.visible {
        options = options.in_visible_terminal(cli.terminal.unwrap_or_default());
    }

    let mut words = cli.command.into_iter();
    let command = words.next().unwrap_or_default();
    let request = ExecuteRequest::new(command)
        .with_args(words)
        .with_options(options);

    let outcome = tokio::select! {
        result = manager.execute(request) => Some(result),
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, stopping child processes");
            None
        }
    };
    manager.shutdown().await;

    let code = match outcome {
        Some(Ok(result)) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            result.exit_code.unwrap_or(0)
        }
        Some(Err(error)) => {
            println!("{}", serde_json::to_string_pretty(&error)?);
            match error {
                ExecError::ProcessTerminated { exit_code, .. } => exit_code.unwrap_or(1),
                _ => 1,
            }
        }
        None => 130,
    };

    info!(exit_code = code, "Process runner exiting");
    std::process::exit(code);
}
