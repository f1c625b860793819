//! Merchant registry lookups
//!
//! Given an entity mention, return every merchant whose name contains it,
//! case-insensitively. Two backends are provided:
//! - `BigQueryRegistry` runs a parameterized query through the BigQuery REST API
//! - `CsvRegistry` scans a local `user_id,merchant_name` export
//!
//! Credentials for the BigQuery backend are acquired once, at startup.

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::{RegistryBackend, RegistryConfig};
use crate::error::{MonitorError, MonitorResult};
use crate::model::RegistryRecord;

#[async_trait]
pub trait MerchantRegistry: Send + Sync {
    /// Every record whose display name contains `entity_text`, ignoring case.
    async fn find_matches(&self, entity_text: &str) -> MonitorResult<Vec<RegistryRecord>>;
}

/// Bearer token for the registry API
#[derive(Clone)]
pub struct Credentials {
    token: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials").field("token", &"<redacted>").finish()
    }
}

impl Credentials {
    pub fn from_token(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }

    /// Take the token from `access_token_env`, or else run `token_command`.
    pub async fn acquire(config: &RegistryConfig) -> MonitorResult<Self> {
        if !config.access_token_env.is_empty() {
            if let Ok(token) = std::env::var(&config.access_token_env) {
                if !token.trim().is_empty() {
                    debug!("Using registry token from {}", config.access_token_env);
                    return Ok(Self::from_token(token.trim()));
                }
            }
        }

        let (program, args) = config.token_command.split_first().ok_or_else(|| {
            MonitorError::Authentication(format!(
                "{} is not set and no token command is configured",
                config.access_token_env
            ))
        })?;

        info!("Acquiring registry credentials with `{}`", config.token_command.join(" "));
        let output = tokio::process::Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|e| MonitorError::Authentication(format!("failed to run {}: {}", program, e)))?;

        if !output.status.success() {
            return Err(MonitorError::Authentication(format!(
                "{} exited with {}: {}",
                program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if token.is_empty() {
            return Err(MonitorError::Authentication(format!("{} printed no token", program)));
        }
        Ok(Self::from_token(token))
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

/// Open the configured registry backend, authenticating if it needs to.
pub async fn open_registry(config: &RegistryConfig) -> anyhow::Result<Arc<dyn MerchantRegistry>> {
    match config.backend {
        RegistryBackend::BigQuery => {
            let credentials = Credentials::acquire(config).await?;
            let registry = BigQueryRegistry::new(
                config.endpoint.clone(),
                config.project_id.clone(),
                config.table.clone(),
                credentials,
                Duration::from_secs(config.timeout_secs),
            )?;
            info!("Registry: BigQuery table {}.{}", config.project_id, config.table);
            Ok(Arc::new(registry))
        }
        RegistryBackend::Csv => {
            let registry = CsvRegistry::load(&config.csv_path)?;
            info!(
                "Registry: {} merchants from {}",
                registry.len(),
                config.csv_path.display()
            );
            Ok(Arc::new(registry))
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: Option<bool>,
    #[serde(default)]
    rows: Vec<QueryRow>,
}

#[derive(Debug, Deserialize)]
struct QueryRow {
    f: Vec<QueryCell>,
}

#[derive(Debug, Deserialize)]
struct QueryCell {
    v: serde_json::Value,
}

impl QueryCell {
    fn as_string(&self) -> String {
        match &self.v {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

/// Merchant table behind the BigQuery `jobs.query` endpoint
#[derive(Debug, Clone)]
pub struct BigQueryRegistry {
    client: reqwest::Client,
    endpoint: String,
    project_id: String,
    table: String,
    credentials: Credentials,
    timeout: Duration,
}

impl BigQueryRegistry {
    pub fn new(
        endpoint: impl Into<String>,
        project_id: impl Into<String>,
        table: impl Into<String>,
        credentials: Credentials,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client for registry")?;

        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            project_id: project_id.into(),
            table: table.into(),
            credentials,
            timeout,
        })
    }

    /// SQL text; the entity is bound as `@entity`, never interpolated.
    /// `STRPOS` matches `%` and `_` in names literally.
    pub fn query_sql(&self) -> String {
        format!(
            "SELECT user_id, merchant_name FROM `{}.{}` \
             WHERE STRPOS(LOWER(merchant_name), LOWER(@entity)) > 0",
            self.project_id, self.table
        )
    }
}

#[async_trait]
impl MerchantRegistry for BigQueryRegistry {
    async fn find_matches(&self, entity_text: &str) -> MonitorResult<Vec<RegistryRecord>> {
        let query_error = |reason: String| MonitorError::RegistryQuery {
            entity: entity_text.to_string(),
            reason,
        };

        let body = json!({
            "query": self.query_sql(),
            "useLegacySql": false,
            "parameterMode": "NAMED",
            "queryParameters": [{
                "name": "entity",
                "parameterType": {"type": "STRING"},
                "parameterValue": {"value": entity_text}
            }],
            "timeoutMs": self.timeout.as_millis() as u64
        });

        let response = self
            .client
            .post(format!("{}/projects/{}/queries", self.endpoint, self.project_id))
            .bearer_auth(self.credentials.token())
            .json(&body)
            .send()
            .await
            .map_err(|e| query_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(query_error(format!("HTTP {}: {}", status, body.trim())));
        }

        let parsed: QueryResponse = response
            .json()
            .await
            .map_err(|e| query_error(format!("invalid response: {}", e)))?;

        if parsed.job_complete == Some(false) {
            return Err(query_error("query did not finish within the timeout".to_string()));
        }

        let records: Vec<RegistryRecord> = parsed
            .rows
            .iter()
            .filter(|row| row.f.len() >= 2)
            .map(|row| RegistryRecord::new(row.f[0].as_string(), row.f[1].as_string()))
            .collect();

        debug!("Registry returned {} candidates for '{}'", records.len(), entity_text);
        Ok(records)
    }
}

/// Registry loaded from a local CSV export
#[derive(Debug, Clone, Default)]
pub struct CsvRegistry {
    records: Vec<RegistryRecord>,
    /// Lowercased display names, index-aligned with `records`
    lowered: Vec<String>,
}

impl CsvRegistry {
    pub fn new(records: Vec<RegistryRecord>) -> Self {
        let lowered = records.iter().map(|r| r.display_name.to_lowercase()).collect();
        Self { records, lowered }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("Failed to open registry CSV {}", path.display()))?;

        let records = reader
            .deserialize()
            .collect::<Result<Vec<RegistryRecord>, _>>()
            .with_context(|| format!("Failed to parse registry CSV {}", path.display()))?;

        Ok(Self::new(records))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl MerchantRegistry for CsvRegistry {
    async fn find_matches(&self, entity_text: &str) -> MonitorResult<Vec<RegistryRecord>> {
        let needle = entity_text.to_lowercase();
        Ok(self
            .records
            .iter()
            .zip(&self.lowered)
            .filter(|(_, name)| name.contains(&needle))
            .map(|(record, _)| record.clone())
            .collect())
    }
}
