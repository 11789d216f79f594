//! Rhythm CLI - run and lint Rhythm scripts locally
//!
//! `run` wires an in-process Domus and Filter domain pair over a local link,
//! serves the fixture's posts and takes, and prints the ranked result.
//! `check` compiles a Rhythm and reports its hooks without running it.

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;
mod fixture;
mod output;

use crate::commands::{check, run};
use crate::config::CliConfig;

/// Rhythm CLI application
#[derive(Parser)]
#[command(name = "rhythm")]
#[command(about = "Rhythm - sandboxed feed ranking scripts", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "RHYTHM_CONFIG")]
    config: Option<String>,

    /// Log level
    #[arg(long, env = "RHYTHM_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long, env = "RHYTHM_LOG_JSON")]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Run a Rhythm against a fixture
    Run(run::RunArgs),

    /// Compile a Rhythm and list its hooks
    Check(check::CheckArgs),

    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| cli.log_level.clone().into());

    if cli.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    let config = CliConfig::load(cli.config.as_deref())?;

    let outcome = match cli.command {
        Commands::Run(args) => run::execute(args, &config).await,
        Commands::Check(args) => check::execute(args),
        Commands::Config => {
            output::print_single(&config);
            Ok(())
        }
    };

    if let Err(err) = &outcome {
        output::print_error(&format!("{:#}", err));
        std::process::exit(1);
    }
    Ok(())
}
