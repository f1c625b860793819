//! Denylist filtering of extracted entity mentions
//!
//! An entity is dropped when its lowercased text is empty or contains any
//! denylisted term as a substring. Terms are grouped in named categories
//! (`generic_terms`, `cities`, `agencies`, plus any extra ones) loaded from
//! TOML; the built-in tables are embedded in the binary.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

use crate::config::FilterConfig;
use crate::model::Entity;

/// Built-in denylist tables
pub const DEFAULT_DENYLISTS: &str = include_str!("../config/denylists.toml");

/// Category name to lowercase terms
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Denylists {
    categories: BTreeMap<String, Vec<String>>,
}

impl Denylists {
    /// The tables compiled into the binary.
    pub fn builtin() -> Self {
        Self::from_toml_str(DEFAULT_DENYLISTS).unwrap_or_default()
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let denylists: Denylists = toml::from_str(content).context("Failed to parse denylist table")?;
        Ok(denylists.normalized())
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read denylist file {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// Denylists for a run: the configured file (or the built-ins) plus extra categories.
    pub fn from_config(config: &FilterConfig) -> Result<Self> {
        let mut denylists = match &config.denylist_path {
            Some(path) => Self::load_from_path(path)?,
            None => Self::builtin(),
        };
        for (category, terms) in &config.extra {
            denylists.extend(category, terms.iter().cloned());
        }
        Ok(denylists)
    }

    /// Append terms to a category, creating it if needed.
    pub fn extend(&mut self, category: &str, terms: impl IntoIterator<Item = String>) {
        let entry = self.categories.entry(category.to_string()).or_default();
        for term in terms {
            let term = term.trim().to_lowercase();
            if !term.is_empty() && !entry.contains(&term) {
                entry.push(term);
            }
        }
    }

    pub fn terms(&self, category: &str) -> &[String] {
        self.categories.get(category).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn category_count(&self) -> usize {
        self.categories.len()
    }

    /// First (category, term) contained in `lowered`, if any.
    fn find_match<'a>(&'a self, lowered: &str) -> Option<(&'a str, &'a str)> {
        self.categories.iter().find_map(|(category, terms)| {
            terms
                .iter()
                .find(|term| lowered.contains(term.as_str()))
                .map(|term| (category.as_str(), term.as_str()))
        })
    }

    fn normalized(self) -> Self {
        let mut normalized = Denylists::default();
        for (category, terms) in self.categories {
            normalized.extend(&category, terms);
        }
        normalized
    }
}

/// Drops denylisted, geographic and agency mentions
#[derive(Debug, Clone)]
pub struct EntityFilter {
    denylists: Denylists,
}

impl Default for EntityFilter {
    fn default() -> Self {
        Self::new(Denylists::builtin())
    }
}

impl EntityFilter {
    pub fn new(denylists: Denylists) -> Self {
        Self { denylists }
    }

    pub fn denylists(&self) -> &Denylists {
        &self.denylists
    }

    /// Whether a single entity survives the denylists.
    pub fn keeps(&self, entity: &Entity) -> bool {
        let lowered = entity.text.trim().to_lowercase();
        if lowered.is_empty() {
            return false;
        }
        match self.denylists.find_match(&lowered) {
            Some((category, term)) => {
                debug!("Dropping entity '{}' ({} term '{}')", entity.text, category, term);
                false
            }
            None => true,
        }
    }

    /// Keep the surviving entities, preserving order.
    pub fn filter(&self, entities: Vec<Entity>) -> Vec<Entity> {
        entities.into_iter().filter(|entity| self.keeps(entity)).collect()
    }
}
