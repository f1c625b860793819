use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::config::{AlertBackend, AppConfig, CONFIG_PATH};

#[derive(Parser, Debug)]
#[command(name = "newswatch")]
#[command(about = "Monitors recent news for people and companies that match known merchant accounts")]
#[command(version)]
pub struct Cli {
    /// Create default configuration file at ./config/newswatch.toml
    #[arg(long)]
    pub init: bool,

    /// Configuration file to load
    #[arg(short, long, value_name = "PATH", default_value = CONFIG_PATH)]
    pub config: PathBuf,

    /// Search keyword; repeat for several (replaces the configured keywords)
    #[arg(short = 'k', long = "keyword", value_name = "KEYWORD")]
    pub keywords: Vec<String>,

    /// How many days back to search (overrides config)
    #[arg(long, value_name = "DAYS")]
    pub days_back: Option<u32>,

    /// Maximum search results per keyword (overrides config)
    #[arg(long, value_name = "COUNT")]
    pub max_results: Option<usize>,

    /// Pages processed at once per keyword (overrides config)
    #[arg(short = 'j', long, value_name = "PAGES")]
    pub page_concurrency: Option<usize>,

    /// Print alerts to stdout instead of posting them
    #[arg(long)]
    pub dry_run: bool,

    /// Write the ranked matches to this file
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Format of the --output file
    #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Verbose logging (use -v for INFO, -vv for DEBUG)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only print the final summary
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Export execution logs to a file (specify file path)
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Csv,
}

impl Cli {
    /// Apply command-line overrides on top of the loaded configuration.
    pub fn apply_overrides(&self, config: &mut AppConfig) {
        let keywords: Vec<String> = self
            .keywords
            .iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        if !keywords.is_empty() {
            config.search.keywords = keywords;
        }
        if let Some(days_back) = self.days_back {
            config.search.days_back = days_back;
        }
        if let Some(max_results) = self.max_results {
            config.search.max_results = max_results;
        }
        if let Some(page_concurrency) = self.page_concurrency {
            config.pipeline.page_concurrency = page_concurrency;
        }
        if self.dry_run {
            config.alerts.backend = AlertBackend::Stdout;
        }
    }
}
