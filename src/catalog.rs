//! Read-only index over the canonical card catalog
//!
//! Built once per run and shared by reference across images. Entries are kept
//! sorted by canonical name, so every "first match wins" rule below resolves
//! to the lexicographically smallest name.

use crate::error::ScanError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use strsim::normalized_levenshtein;

/// A canonical card name plus its external identifier (may be empty)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    #[serde(default, alias = "scryfall_id")]
    pub external_id: String,
}

impl CatalogEntry {
    pub fn new(name: impl Into<String>, external_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            external_id: external_id.into(),
        }
    }
}

/// Best fuzzy candidate for a piece of text
#[derive(Debug, Clone, PartialEq)]
pub struct FuzzyMatch<'a> {
    pub name: &'a str,
    pub similarity: f64,
}

#[derive(Debug, Clone)]
struct IndexedEntry {
    entry: CatalogEntry,
    lowercase: String,
    alphanumeric: String,
}

#[derive(Debug, Clone, Default)]
pub struct CatalogIndex {
    entries: Vec<IndexedEntry>,
    by_name: HashMap<String, usize>,
    by_lowercase: HashMap<String, usize>,
}

impl CatalogIndex {
    pub fn new(entries: impl IntoIterator<Item = CatalogEntry>) -> Self {
        let mut cleaned: Vec<CatalogEntry> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for entry in entries {
            let name = entry.name.trim();
            if name.is_empty() {
                tracing::warn!("Skipping catalog entry with empty name");
                continue;
            }
            if !seen.insert(name.to_string()) {
                tracing::debug!("Ignoring repeated catalog entry {:?}", name);
                continue;
            }
            cleaned.push(CatalogEntry::new(name, entry.external_id.trim()));
        }

        cleaned.sort_by(|a, b| a.name.cmp(&b.name));

        let mut by_name = HashMap::with_capacity(cleaned.len());
        let mut by_lowercase = HashMap::with_capacity(cleaned.len());
        let mut indexed = Vec::with_capacity(cleaned.len());

        for (i, entry) in cleaned.into_iter().enumerate() {
            let lowercase = entry.name.to_lowercase();
            by_name.insert(entry.name.clone(), i);
            by_lowercase.entry(lowercase.clone()).or_insert(i);
            indexed.push(IndexedEntry {
                alphanumeric: alphanumeric(&lowercase),
                lowercase,
                entry,
            });
        }

        if indexed.is_empty() {
            tracing::warn!("Catalog is empty; every card will resolve as unmatched");
        }

        Self {
            entries: indexed,
            by_name,
            by_lowercase,
        }
    }

    /// Load a JSON array of catalog entries
    pub fn load_json(path: &Path) -> Result<Self, ScanError> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            ScanError::CatalogLoad(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let entries: Vec<CatalogEntry> = serde_json::from_str(&data).map_err(|e| {
            ScanError::CatalogLoad(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        let index = Self::new(entries);
        tracing::info!(
            "Loaded {} catalog entries from {}",
            index.len(),
            path.display()
        );
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Case-sensitive exact lookup
    pub fn exact(&self, text: &str) -> Option<&str> {
        self.by_name
            .get(text)
            .map(|&i| self.entries[i].entry.name.as_str())
    }

    /// Case-insensitive lookup returning canonical casing
    pub fn case_insensitive(&self, text: &str) -> Option<&str> {
        self.by_lowercase
            .get(&text.to_lowercase())
            .map(|&i| self.entries[i].entry.name.as_str())
    }

    /// Most similar canonical name at or above `threshold`. On equal
    /// similarity the entry that comes first in index order wins.
    pub fn fuzzy(&self, text: &str, threshold: f64) -> Option<FuzzyMatch<'_>> {
        let lowercase = text.to_lowercase();
        let stripped = alphanumeric(&lowercase);

        let mut best: Option<FuzzyMatch<'_>> = None;
        for indexed in &self.entries {
            let similarity = similarity(&lowercase, &stripped, indexed);
            if similarity < threshold {
                continue;
            }
            if best.as_ref().map_or(true, |b| similarity > b.similarity) {
                best = Some(FuzzyMatch {
                    name: &indexed.entry.name,
                    similarity,
                });
            }
        }
        best
    }

    /// External identifier for a canonical name, if one is recorded
    pub fn external_id(&self, name: &str) -> Option<&str> {
        self.by_name
            .get(name)
            .map(|&i| self.entries[i].entry.external_id.as_str())
            .filter(|id| !id.is_empty())
    }
}

fn alphanumeric(s: &str) -> String {
    s.chars().filter(|c| c.is_alphanumeric()).collect()
}

/// Normalized Levenshtein ratio over lowercased text, also compared with
/// punctuation and spacing removed; the better score wins.
fn similarity(lowercase: &str, stripped: &str, candidate: &IndexedEntry) -> f64 {
    let base = normalized_levenshtein(lowercase, &candidate.lowercase);
    if stripped.is_empty() || candidate.alphanumeric.is_empty() {
        return base;
    }
    base.max(normalized_levenshtein(stripped, &candidate.alphanumeric))
}
