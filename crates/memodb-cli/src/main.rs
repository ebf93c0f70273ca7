//! MemoDB command-line interface.
//!
//! An in-memory hierarchical key-value server spoken to over a plain line
//! protocol.
//!
//! # Quick Start
//!
//! ```bash
//! # Start the server on the default port (12049)
//! memodb start
//!
//! # Talk to it (new terminal)
//! nc 127.0.0.1 12049
//! SET /users alice secret
//! GET /users alice
//! ```

mod commands;
mod style;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::start::StartOptions;

/// MemoDB - an in-memory hierarchical key-value store.
#[derive(Parser)]
#[command(name = "memodb")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Disable colored output (also honors NO_COLOR).
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version information.
    Version,

    /// Start the MemoDB server.
    Start {
        /// Address to bind to (port only: 12049, or full: 127.0.0.1:12049).
        #[arg(short, long)]
        address: Option<String>,

        /// Directory holding memodb.toml and memodb.local.toml.
        #[arg(short, long, default_value = ".")]
        project: PathBuf,

        /// Maximum number of concurrent connections.
        #[arg(short = 'c', long)]
        max_connections: Option<usize>,

        /// Close connections idle for this many seconds.
        #[arg(long)]
        idle_timeout: Option<u64>,

        /// Greet clients and show a prompt (for telnet sessions).
        #[arg(short, long)]
        interactive: bool,
    },

    /// Configuration commands.
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration.
    Show {
        /// Directory holding memodb.toml and memodb.local.toml.
        #[arg(short, long, default_value = ".")]
        project: PathBuf,

        /// Output format (text, toml, json).
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    style::init(cli.no_color);

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            style::print_error(&format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Version => {
            commands::version::run();
            Ok(())
        }
        Commands::Start {
            address,
            project,
            max_connections,
            idle_timeout,
            interactive,
        } => commands::start::run(&StartOptions {
            address,
            project,
            max_connections,
            idle_timeout,
            interactive,
        }),
        Commands::Config(ConfigCommands::Show { project, format }) => {
            commands::config::show(&project, &format)
        }
    }
}
