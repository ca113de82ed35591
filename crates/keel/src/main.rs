use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

mod commands;

use commands::{run_host, run_list, run_scan};

/// Keel - extension host for line-of-business applications
#[derive(Parser)]
#[command(name = "keel")]
#[command(about = "Run and inspect keel extension hosts", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to keel.toml (defaults to ./keel.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Subcommand)]
enum Commands {
    /// Boot the host and deliver lifecycle events read from stdin
    Run,
    /// Print the classified descriptors of one extension as JSON
    Scan {
        /// Extension identifier
        extension: String,
    },
    /// List installed extensions and whether they are authorized
    List,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run => run_host(cli.config, cli.verbose),
        Commands::Scan { extension } => run_scan(cli.config, cli.verbose, extension),
        Commands::List => run_list(cli.config, cli.verbose),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
