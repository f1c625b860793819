use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use newswatch::cli::{Cli, OutputFormat};
use newswatch::config::{self, AppConfig};
use newswatch::error::MonitorError;
use newswatch::export;
use newswatch::logger::{RunLogger, VerbosityLevel};
use newswatch::pipeline::{Monitor, MonitorContext};

/// Exit status when a credential is missing or rejected
const EXIT_AUTH_FAILURE: i32 = 3;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Handle --init flag first (before any other processing)
    if cli.init {
        match AppConfig::create_default_config_at(&cli.config) {
            Ok(path) => {
                println!("✅ Created default configuration file at: {}", path.display());
                println!("   Edit this file to customize settings, then run newswatch again.");
                std::process::exit(0);
            }
            Err(e) => {
                eprintln!("❌ Failed to create configuration file: {}", e);
                std::process::exit(1);
            }
        }
    }

    let mut app_config = match AppConfig::read_from_path(&cli.config) {
        Ok(cfg) => cfg,
        Err(config::ConfigError::FileNotFound(path)) => match AppConfig::prompt_create_config(&path) {
            Ok(Some(created_path)) => {
                println!("✅ Created default configuration file at: {}", created_path.display());
                println!("   Edit this file to customize settings, then run newswatch again.");
                std::process::exit(0);
            }
            Ok(None) => {
                eprintln!("❌ Configuration file not found at: {}", path.display());
                eprintln!("   Run with --init to create a default configuration file.");
                std::process::exit(1);
            }
            Err(e) => {
                eprintln!("❌ Failed to create configuration file: {}", e);
                std::process::exit(1);
            }
        },
        Err(e) => {
            eprintln!("❌ Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // Command-line values win over the file, and are validated with it
    cli.apply_overrides(&mut app_config);
    if let Err(e) = app_config.validate() {
        eprintln!("❌ Configuration error: {}", e);
        std::process::exit(1);
    }

    let verbosity = if cli.quiet {
        VerbosityLevel::Silent
    } else {
        VerbosityLevel::from_verbose_count(cli.verbose)
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(verbosity.tracing_directive())),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let logger = match &cli.log_file {
        Some(path) => RunLogger::with_log_file(verbosity, path.clone()),
        None => RunLogger::new(verbosity),
    };

    let context = match MonitorContext::from_config(&app_config).await {
        Ok(context) => context,
        Err(e) => {
            logger.error(&format!("Startup failed: {:#}", e));
            let _ = logger.export_logs();
            let fatal = e
                .downcast_ref::<MonitorError>()
                .map(MonitorError::is_fatal)
                .unwrap_or(false);
            std::process::exit(if fatal { EXIT_AUTH_FAILURE } else { 1 });
        }
    };

    let monitor = Monitor::new(context, logger.clone());
    let report = monitor.run(&app_config.search.keywords).await;

    if let Some(output) = &cli.output {
        let output_path = output.display().to_string();
        let exported = match cli.format {
            OutputFormat::Json => export::export_json(&report.ranked, &report.stats, &output_path),
            OutputFormat::Csv => export::export_csv(&report.ranked, &output_path),
        };
        match exported {
            Ok(()) => logger.log_export_success(&output_path),
            Err(e) => logger.error(&format!("Export to {} failed: {}", output_path, e)),
        }
    }

    logger.print_final_summary(&report);

    if let Err(e) = logger.export_logs() {
        eprintln!("❌ Failed to write log file: {}", e);
    }

    Ok(())
}
