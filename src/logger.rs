use chrono::Local;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::RwLock;

use crate::pipeline::RunReport;

#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub enum VerbosityLevel {
    Silent = 0,   // Only progress bar and final summary
    Summary = 1,  // Keyword and page progress (default)
    Detailed = 2, // Per-page results and recovered failures
    Debug = 3,    // Everything
}

impl VerbosityLevel {
    pub fn from_verbose_count(count: u8) -> Self {
        match count {
            0 => VerbosityLevel::Summary,
            1 => VerbosityLevel::Detailed,
            2.. => VerbosityLevel::Debug,
        }
    }

    /// Default `tracing` filter directive for this level
    pub fn tracing_directive(&self) -> &'static str {
        match self {
            VerbosityLevel::Silent => "newswatch=error",
            VerbosityLevel::Summary => "newswatch=warn",
            VerbosityLevel::Detailed => "newswatch=info",
            VerbosityLevel::Debug => "newswatch=debug",
        }
    }
}

/// Console output for a monitoring run
#[derive(Clone)]
pub struct RunLogger {
    verbosity: VerbosityLevel,
    progress_bar: Arc<RwLock<Option<ProgressBar>>>,
    timing: Arc<Mutex<RunTiming>>,
    log_buffer: Arc<Mutex<Vec<String>>>,
    log_file_path: Option<String>,
}

#[derive(Default)]
struct RunTiming {
    start_time: Option<Instant>,
    end_time: Option<Instant>,
    output_file: Option<String>,
}

impl RunLogger {
    pub fn new(verbosity: VerbosityLevel) -> Self {
        Self {
            verbosity,
            progress_bar: Arc::new(RwLock::new(None)),
            timing: Arc::new(Mutex::new(RunTiming::default())),
            log_buffer: Arc::new(Mutex::new(Vec::new())),
            log_file_path: None,
        }
    }

    pub fn with_log_file(verbosity: VerbosityLevel, log_file_path: String) -> Self {
        Self {
            log_file_path: Some(log_file_path),
            ..Self::new(verbosity)
        }
    }

    pub fn info(&self, message: &str) {
        if self.verbosity >= VerbosityLevel::Summary {
            self.print_message("INFO", message);
        }
    }

    pub fn warn(&self, message: &str) {
        if self.verbosity >= VerbosityLevel::Detailed {
            self.print_message("WARN", message);
        }
    }

    /// Always shown
    pub fn error(&self, message: &str) {
        self.print_message("ERROR", message);
    }

    pub fn debug(&self, message: &str) {
        if self.verbosity >= VerbosityLevel::Debug {
            self.print_message("DEBUG", message);
        }
    }

    fn print_message(&self, level: &str, message: &str) {
        let msg = format!("[{}] {}: {}", Local::now().format("%H:%M:%S%.3f"), level, message);

        if self.log_file_path.is_some() {
            if let Ok(mut buffer) = self.log_buffer.lock() {
                buffer.push(msg.clone());
            }
        }

        // Print above the progress bar when one is active
        if let Ok(guard) = self.progress_bar.try_read() {
            if let Some(pb) = guard.as_ref() {
                pb.println(msg);
                return;
            }
        }

        eprintln!("{}", msg);
    }

    pub async fn start_progress(&self, total_pages: u64) {
        let pb = ProgressBar::new(total_pages);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} pages {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("##-"),
        );
        pb.set_message("Starting...");

        *self.progress_bar.write().await = Some(pb);
        if let Ok(mut timing) = self.timing.lock() {
            timing.start_time = Some(Instant::now());
        }
    }

    pub async fn update_progress(&self, message: &str) {
        if let Some(pb) = self.progress_bar.read().await.as_ref() {
            pb.set_message(message.to_string());
        }
    }

    pub async fn advance_progress(&self, steps: u64) {
        if let Some(pb) = self.progress_bar.read().await.as_ref() {
            pb.inc(steps);
        }
    }

    pub async fn finish_progress(&self, final_message: &str) {
        if let Some(pb) = self.progress_bar.write().await.take() {
            pb.finish_and_clear();
        }
        if let Ok(mut timing) = self.timing.lock() {
            timing.end_time = Some(Instant::now());
        }
        self.info(final_message);
    }

    // Pipeline phases

    pub fn log_run_start(&self, keywords: &[String], days_back: u32) {
        self.info(&format!(
            "Monitoring {} keyword(s) over the last {} day(s): {}",
            keywords.len(),
            days_back,
            keywords.join(", ")
        ));
    }

    pub fn log_search_result(&self, keyword: &str, link_count: usize, blocked: usize) {
        if link_count > 0 {
            self.info(&format!(
                "Found {} news links for '{}' ({} blocked)",
                link_count, keyword, blocked
            ));
        } else {
            self.info(&format!("No news found for '{}'", keyword));
        }
    }

    pub fn log_search_failed(&self, keyword: &str, error: &str) {
        self.warn(&format!("Search failed for '{}': {}", keyword, error));
    }

    pub fn log_page_processed(&self, url: &str, body_chars: usize, kept: usize, dropped: usize) {
        if body_chars == 0 {
            self.warn(&format!("No content extracted from {}", url));
        }
        self.debug(&format!(
            "{}: {} chars, {} entities kept, {} dropped",
            url, body_chars, kept, dropped
        ));
    }

    pub fn log_entity_candidates(&self, entity: &str, candidate_count: usize) {
        self.debug(&format!("Registry: {} candidates for '{}'", candidate_count, entity));
    }

    pub fn log_extraction_failed(&self, url: &str, error: &str) {
        self.warn(&format!("Entity extraction failed for {}: {}", url, error));
    }

    pub fn log_registry_failed(&self, entity: &str, error: &str) {
        self.warn(&format!("Registry query failed for '{}': {}", entity, error));
    }

    pub fn log_alert_failed(&self, error: &str) {
        self.warn(&format!("Alert not delivered: {}", error));
    }

    pub fn log_export_success(&self, path: &str) {
        if let Ok(mut timing) = self.timing.lock() {
            timing.output_file = Some(path.to_string());
        }
        self.info(&format!("Export completed: {}", path));
    }

    /// Always printed, regardless of verbosity
    pub fn print_final_summary(&self, report: &RunReport) {
        print!("\x1b[2K\r");
        let _ = io::stdout().flush();

        let stats = &report.stats;
        println!("\n=== RUN SUMMARY ===");
        if let Ok(timing) = self.timing.lock() {
            if let (Some(start), Some(end)) = (timing.start_time, timing.end_time) {
                println!("Duration: {:.2}s", end.duration_since(start).as_secs_f64());
            }
        }
        println!("Keywords: {} ({} searches failed)", stats.keywords, stats.searches_failed);
        println!("News Links: {}", stats.links);
        println!("Pages Without Content: {}", stats.empty_pages);
        println!(
            "Entities: {} extracted, {} kept, {} dropped ({} extraction failures)",
            stats.entities_extracted, stats.entities_kept, stats.entities_dropped, stats.extraction_failures
        );
        println!(
            "Registry: {} candidates scored ({} failed queries)",
            stats.candidates_scored, stats.registry_failures
        );
        println!("Matches: {} unique, {} surfaced", report.ranked.len(), report.surfaced().len());
        println!("Alerts: {} sent, {} failed", stats.alerts_sent, stats.alerts_failed);
        if let Ok(timing) = self.timing.lock() {
            if let Some(output) = &timing.output_file {
                println!("Results Exported: {}", output);
            }
        }
        println!("===================\n");
    }

    /// Write all buffered messages to the log file, if one was requested
    pub fn export_logs(&self) -> io::Result<()> {
        let Some(ref log_file_path) = self.log_file_path else {
            return Ok(());
        };

        if let Some(parent) = Path::new(log_file_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(log_file_path)?;

        if let Ok(buffer) = self.log_buffer.lock() {
            for log_entry in buffer.iter() {
                writeln!(file, "{}", log_entry)?;
            }
        }
        file.flush()
    }

    pub fn get_log_count(&self) -> usize {
        self.log_buffer.lock().map(|buffer| buffer.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_from_count() {
        assert_eq!(VerbosityLevel::from_verbose_count(0), VerbosityLevel::Summary);
        assert_eq!(VerbosityLevel::from_verbose_count(1), VerbosityLevel::Detailed);
        assert_eq!(VerbosityLevel::from_verbose_count(5), VerbosityLevel::Debug);
        assert_eq!(VerbosityLevel::Debug.tracing_directive(), "newswatch=debug");
    }

    #[test]
    fn test_messages_buffered_by_verbosity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs/run.log");
        let logger = RunLogger::with_log_file(VerbosityLevel::Summary, path.display().to_string());

        logger.info("shown");
        logger.debug("hidden");
        logger.error("always");
        assert_eq!(logger.get_log_count(), 2);

        logger.export_logs().unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("INFO: shown"));
        assert!(content.contains("ERROR: always"));
        assert!(!content.contains("hidden"));
    }
}
