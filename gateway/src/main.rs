mod config;
mod telemetry;

use clap::{Parser, Subcommand};
use config::Config;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(version, about = "Log ingestion gateway")]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(long, short, default_value = "gateway.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Accept logs over HTTP and publish them to the message queue
    LogApi,
    /// Load and validate the configuration, then exit
    ValidateConfig,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::from_file(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {e}", cli.config.display());
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        CliCommand::ValidateConfig => match config.log_api() {
            Ok(_) => {
                println!("{}: ok", cli.config.display());
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("{}: {e}", cli.config.display());
                ExitCode::FAILURE
            }
        },
        CliCommand::LogApi => run_log_api(config),
    }
}

fn run_log_api(config: Config) -> ExitCode {
    let log_api_config = match config.log_api() {
        Ok(log_api_config) => log_api_config.clone(),
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let _telemetry = match telemetry::init(&config.common) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("could not initialize telemetry: {e}");
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "could not start tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!("starting log api");
    match runtime.block_on(log_api::run(log_api_config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "log api stopped");
            ExitCode::FAILURE
        }
    }
}
