//! Pacing for outbound calls to external providers
//!
//! Provides a fixed-interval pacer: each caller invokes `acquire` before an
//! external call and is held back until the configured interval has passed
//! since the previous grant. An interval of zero disables pacing.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

use crate::config::AppConfig;

/// Fixed-interval pacer
#[derive(Debug)]
pub struct Pacer {
    /// Minimum spacing between two grants
    interval: Duration,
    /// When the previous grant was handed out
    last_grant: Option<Instant>,
}

impl Pacer {
    /// Create a pacer with the given spacing. Zero disables pacing.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_grant: None,
        }
    }

    pub fn from_millis(interval_ms: u64) -> Self {
        Self::new(Duration::from_millis(interval_ms))
    }

    pub fn is_enabled(&self) -> bool {
        !self.interval.is_zero()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Time to wait before the next grant, if any
    pub fn time_until_ready(&self) -> Option<Duration> {
        if !self.is_enabled() {
            return None;
        }
        let last = self.last_grant?;
        let ready_at = last + self.interval;
        let now = Instant::now();
        if ready_at > now {
            Some(ready_at - now)
        } else {
            None
        }
    }

    /// Wait until the interval has elapsed since the previous grant.
    pub async fn acquire(&mut self) {
        if self.is_enabled() {
            if let Some(last) = self.last_grant {
                let ready_at = last + self.interval;
                if ready_at > Instant::now() {
                    debug!("Pacer waiting {:?} before next call", ready_at - Instant::now());
                    sleep_until(ready_at).await;
                }
            }
        }
        self.last_grant = Some(Instant::now());
    }
}

/// Pacer that can be shared between tasks
#[derive(Debug, Clone)]
pub struct SharedPacer {
    inner: Arc<Mutex<Pacer>>,
}

impl SharedPacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Pacer::new(interval))),
        }
    }

    pub fn from_millis(interval_ms: u64) -> Self {
        Self::new(Duration::from_millis(interval_ms))
    }

    /// Wait for the next slot. Callers are served one at a time.
    pub async fn acquire(&self) {
        let mut pacer = self.inner.lock().await;
        pacer.acquire().await;
    }

    pub async fn is_enabled(&self) -> bool {
        let pacer = self.inner.lock().await;
        pacer.is_enabled()
    }
}

/// One pacer per host, created on first use
#[derive(Debug, Clone)]
pub struct HostPacer {
    pacers: Arc<Mutex<HashMap<String, SharedPacer>>>,
    interval: Duration,
}

impl HostPacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            pacers: Arc::new(Mutex::new(HashMap::new())),
            interval,
        }
    }

    /// Wait for the next slot for `host`.
    pub async fn acquire(&self, host: &str) {
        if self.interval.is_zero() {
            return;
        }

        let pacer = {
            let mut pacers = self.pacers.lock().await;
            pacers
                .entry(host.to_lowercase())
                .or_insert_with(|| SharedPacer::new(self.interval))
                .clone()
        };

        pacer.acquire().await;
    }
}

/// Pacing policy for a monitoring run
#[derive(Debug, Clone)]
pub struct PacingContext {
    /// Spacing between search provider calls
    pub search: SharedPacer,
    /// Spacing between page fetches to the same host
    pub fetch: HostPacer,
}

impl PacingContext {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            search: SharedPacer::from_millis(config.search.pacing_interval_ms),
            fetch: HostPacer::new(Duration::from_millis(config.http.per_host_interval_ms)),
        }
    }

    /// No pacing at all, for tests and dry runs against local mocks
    pub fn disabled() -> Self {
        Self {
            search: SharedPacer::new(Duration::ZERO),
            fetch: HostPacer::new(Duration::ZERO),
        }
    }

    pub fn log_config(&self, config: &AppConfig) {
        let search_status = if config.search.pacing_interval_ms > 0 {
            format!("{} ms between calls", config.search.pacing_interval_ms)
        } else {
            "unpaced".to_string()
        };
        let fetch_status = if config.http.per_host_interval_ms > 0 {
            format!("{} ms per host", config.http.per_host_interval_ms)
        } else {
            "unpaced".to_string()
        };
        debug!("Pacing: search={}, fetch={}", search_status, fetch_status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pacer_disabled() {
        let pacer = Pacer::new(Duration::ZERO);
        assert!(!pacer.is_enabled());
        assert!(pacer.time_until_ready().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_acquire_is_immediate() {
        let mut pacer = Pacer::from_millis(2000);
        let start = Instant::now();
        pacer.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_successive_acquires_are_spaced() {
        let mut pacer = Pacer::from_millis(2000);
        let start = Instant::now();
        pacer.acquire().await;
        pacer.acquire().await;
        pacer.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(4000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_wait_after_interval_elapsed() {
        let mut pacer = Pacer::from_millis(500);
        pacer.acquire().await;
        tokio::time::advance(Duration::from_millis(800)).await;
        assert!(pacer.time_until_ready().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shared_pacer_serializes_tasks() {
        let pacer = SharedPacer::from_millis(1000);
        let start = Instant::now();

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let pacer = pacer.clone();
                tokio::spawn(async move { pacer.acquire().await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(start.elapsed() >= Duration::from_millis(2000));
        assert!(pacer.is_enabled().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_host_pacer_is_per_host() {
        let pacer = HostPacer::new(Duration::from_millis(1000));
        let start = Instant::now();
        pacer.acquire("g1.example").await;
        pacer.acquire("folha.example").await;
        assert_eq!(start.elapsed(), Duration::ZERO);

        pacer.acquire("G1.example").await;
        assert!(start.elapsed() >= Duration::from_millis(1000));
    }
}
