use anyhow::Result;
use chrono::Utc;
use csv::Writer;
use std::fs::File;
use std::io::Write;
use tracing::{debug, info};

use crate::aggregate::tier_for;
use crate::model::{AlertTier, EntityType, MatchResult};
use crate::pipeline::RunStats;

pub fn export_csv(ranked: &[MatchResult], output_path: &str) -> Result<()> {
    debug!("Exporting {} matches to CSV: {}", ranked.len(), output_path);

    let file = File::create(output_path)?;
    let mut wtr = Writer::from_writer(file);

    wtr.write_record(["Entity", "Entity Type", "Identity ID", "Display Name", "Score", "Tier"])?;

    for result in ranked {
        let tier = tier_for(result.score).map(|t| t.label()).unwrap_or("");
        let score = format!("{:.3}", result.score);
        wtr.write_record([
            result.entity_text.as_str(),
            result.entity_type.as_code(),
            result.identity_id.as_str(),
            result.display_name.as_str(),
            score.as_str(),
            tier,
        ])?;
    }

    wtr.flush()?;
    info!("Exported {} matches to CSV: {}", ranked.len(), output_path);

    Ok(())
}

pub fn export_json(ranked: &[MatchResult], stats: &RunStats, output_path: &str) -> Result<()> {
    debug!("Exporting {} matches to JSON: {}", ranked.len(), output_path);

    let json_output = JsonExport {
        summary: ExportSummary::from_ranked(ranked),
        stats: stats.clone(),
        matches: ranked.iter().map(ExportedMatch::from).collect(),
    };

    let json_string = serde_json::to_string_pretty(&json_output)?;
    let mut file = File::create(output_path)?;
    file.write_all(json_string.as_bytes())?;

    info!("Exported {} matches to JSON: {}", ranked.len(), output_path);

    Ok(())
}

#[derive(serde::Serialize)]
struct JsonExport {
    summary: ExportSummary,
    stats: RunStats,
    matches: Vec<ExportedMatch>,
}

#[derive(serde::Serialize)]
struct ExportSummary {
    generated_at: String,
    total_matches: usize,
    surfaced: usize,
    high: usize,
    medium: usize,
    low: usize,
}

impl ExportSummary {
    fn from_ranked(ranked: &[MatchResult]) -> Self {
        let tiers: Vec<AlertTier> = ranked.iter().filter_map(|r| tier_for(r.score)).collect();
        let count = |tier: AlertTier| tiers.iter().filter(|t| **t == tier).count();

        Self {
            generated_at: Utc::now().to_rfc3339(),
            total_matches: ranked.len(),
            surfaced: tiers.len(),
            high: count(AlertTier::High),
            medium: count(AlertTier::Medium),
            low: count(AlertTier::Low),
        }
    }
}

#[derive(serde::Serialize)]
struct ExportedMatch {
    entity: String,
    entity_type: EntityType,
    identity_id: String,
    display_name: String,
    score: f64,
    tier: Option<AlertTier>,
}

impl From<&MatchResult> for ExportedMatch {
    fn from(result: &MatchResult) -> Self {
        Self {
            entity: result.entity_text.clone(),
            entity_type: result.entity_type,
            identity_id: result.identity_id.clone(),
            display_name: result.display_name.clone(),
            score: result.score,
            tier: tier_for(result.score),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Entity, RegistryRecord};

    fn ranked() -> Vec<MatchResult> {
        vec![
            MatchResult::new(&Entity::organization("Acme Corp"), &RegistryRecord::new("u1", "ACME CORP LTDA"), 0.908),
            MatchResult::new(&Entity::person("Maria Souza"), &RegistryRecord::new("u2", "MARIA SOUZA, ME"), 0.55),
            MatchResult::new(&Entity::organization("Zeta"), &RegistryRecord::new("u3", "Alfa"), 0.12),
        ]
    }

    #[test]
    fn test_export_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("matches.csv");
        export_csv(&ranked(), path.to_str().unwrap()).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "Entity,Entity Type,Identity ID,Display Name,Score,Tier");
        assert_eq!(lines[1], "Acme Corp,ORG,u1,ACME CORP LTDA,0.908,HIGH");
        assert_eq!(lines[2], "Maria Souza,PER,u2,\"MARIA SOUZA, ME\",0.550,LOW");
        assert_eq!(lines[3], "Zeta,ORG,u3,Alfa,0.120,");
    }

    #[test]
    fn test_export_json_summary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("matches.json");
        export_json(&ranked(), &RunStats::default(), path.to_str().unwrap()).unwrap();

        let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["summary"]["total_matches"], 3);
        assert_eq!(value["summary"]["surfaced"], 2);
        assert_eq!(value["summary"]["high"], 1);
        assert_eq!(value["summary"]["low"], 1);
        assert_eq!(value["matches"][0]["tier"], "High");
        assert!(value["matches"][2]["tier"].is_null());
    }
}
