mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "plcprims", version, about = "PLC frame and transport CLI")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr) [default: info, warn for decode].
    #[arg(long, value_name = "LEVEL", env = "PLCPRIMS_LOG_LEVEL", global = true)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    let level = cli
        .log_level
        .unwrap_or_else(|| default_log_level(&cli.command));
    init_logging(cli.log_format, level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

/// Offline commands only log problems; networked ones also report connection progress.
fn default_log_level(command: &Command) -> LogLevel {
    match command {
        Command::Decode(_) | Command::Version(_) => LogLevel::Warn,
        Command::Send(_) | Command::Listen(_) => LogLevel::Info,
    }
}
