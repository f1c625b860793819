use serde::{Deserialize, Serialize};

/// Coarse classification attached to an entity mention by the extractor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum EntityType {
    Person,
    Organization,
    Other,
}

impl EntityType {
    /// Map the extractor's wire code ("PER", "ORG", ...) to a type.
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_uppercase().as_str() {
            "PER" => EntityType::Person,
            "ORG" => EntityType::Organization,
            _ => EntityType::Other,
        }
    }

    pub fn as_code(&self) -> &'static str {
        match self {
            EntityType::Person => "PER",
            EntityType::Organization => "ORG",
            EntityType::Other => "OTHER",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_code())
    }
}

/// A person or organization mention extracted from article text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entity {
    pub text: String,
    pub entity_type: EntityType,
}

impl Entity {
    pub fn new(text: impl Into<String>, entity_type: EntityType) -> Self {
        Self {
            text: text.into(),
            entity_type,
        }
    }

    pub fn person(text: impl Into<String>) -> Self {
        Self::new(text, EntityType::Person)
    }

    pub fn organization(text: impl Into<String>) -> Self {
        Self::new(text, EntityType::Organization)
    }
}

/// A merchant account as stored in the registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegistryRecord {
    #[serde(rename = "user_id")]
    pub identity_id: String,
    #[serde(rename = "merchant_name")]
    pub display_name: String,
}

impl RegistryRecord {
    pub fn new(identity_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            identity_id: identity_id.into(),
            display_name: display_name.into(),
        }
    }
}

/// Score of one entity mention against one registry record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchResult {
    pub entity_text: String,
    pub entity_type: EntityType,
    pub identity_id: String,
    pub display_name: String,
    /// Always within [0, 1]
    pub score: f64,
}

impl MatchResult {
    pub fn new(entity: &Entity, record: &RegistryRecord, score: f64) -> Self {
        Self {
            entity_text: entity.text.clone(),
            entity_type: entity.entity_type,
            identity_id: record.identity_id.clone(),
            display_name: record.display_name.clone(),
            score: score.clamp(0.0, 1.0),
        }
    }

    /// Score as a whole percentage, truncated.
    pub fn score_percent(&self) -> u32 {
        (self.score * 100.0) as u32
    }
}

/// Clean text pulled out of one fetched page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractedPage {
    pub title: String,
    pub body: String,
    pub source_url: String,
}

impl ExtractedPage {
    /// Text handed to the entity extractor.
    pub fn combined_text(&self) -> String {
        format!("{} \n\n {}", self.title, self.body)
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

/// Presentation tier for a surfaced match.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AlertTier {
    High,
    Medium,
    Low,
}

impl AlertTier {
    pub fn label(&self) -> &'static str {
        match self {
            AlertTier::High => "HIGH",
            AlertTier::Medium => "MEDIUM",
            AlertTier::Low => "LOW",
        }
    }

    pub fn marker(&self) -> &'static str {
        match self {
            AlertTier::High => "🔴",
            AlertTier::Medium => "🟠",
            AlertTier::Low => "🟡",
        }
    }
}

impl std::fmt::Display for AlertTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}
