//! Tiered matching of merged card text against the catalog
//!
//! Order of preference: case-sensitive exact, case-insensitive, fuzzy. The
//! canonical name is chosen first and only then checked against the names the
//! image has already claimed, so the topmost occurrence of a card wins and
//! every later one is a duplicate.

use crate::catalog::CatalogIndex;
use crate::cluster::MergedCard;
use crate::detection::Point;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

/// Classification tag of a resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Exact,
    ExactCorrected,
    Fuzzy,
    Duplicate,
    Unmatched,
}

impl MatchStatus {
    /// Resolved to a catalog entry (duplicates included)
    pub fn is_matched(&self) -> bool {
        !matches!(self, Self::Unmatched)
    }

    /// Counts toward the player's deck list
    pub fn is_claim(&self) -> bool {
        matches!(self, Self::Exact | Self::ExactCorrected | Self::Fuzzy)
    }
}

/// Outcome of matching one card's text
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Exact(String),
    ExactCorrected(String),
    Fuzzy { name: String, similarity: f64 },
    Duplicate(String),
    Unmatched,
}

impl Resolution {
    pub fn status(&self) -> MatchStatus {
        match self {
            Self::Exact(_) => MatchStatus::Exact,
            Self::ExactCorrected(_) => MatchStatus::ExactCorrected,
            Self::Fuzzy { .. } => MatchStatus::Fuzzy,
            Self::Duplicate(_) => MatchStatus::Duplicate,
            Self::Unmatched => MatchStatus::Unmatched,
        }
    }

    pub fn resolved_name(&self) -> Option<&str> {
        match self {
            Self::Exact(name)
            | Self::ExactCorrected(name)
            | Self::Fuzzy { name, .. }
            | Self::Duplicate(name) => Some(name),
            Self::Unmatched => None,
        }
    }

    /// Similarity ratio of a fuzzy match
    pub fn similarity(&self) -> Option<f64> {
        match self {
            Self::Fuzzy { similarity, .. } => Some(*similarity),
            _ => None,
        }
    }

    /// Review note shown next to the card
    pub fn note(&self, ocr_text: &str) -> String {
        match self {
            Self::Exact(_) => String::new(),
            Self::ExactCorrected(_) => format!("case corrected from: {}", ocr_text),
            Self::Fuzzy { .. } => format!("corrected from: {}", ocr_text),
            Self::Duplicate(_) => "duplicate removed".to_string(),
            Self::Unmatched => "no match found".to_string(),
        }
    }
}

/// Canonical names already claimed within one image
#[derive(Debug, Default)]
pub struct SeenSet {
    claimed: HashSet<String>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the name was not claimed before
    pub fn claim(&mut self, name: &str) -> bool {
        if self.contains(name) {
            return false;
        }
        self.claimed.insert(name.to_string());
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.claimed.contains(name)
    }

    pub fn len(&self) -> usize {
        self.claimed.len()
    }
}

/// Output record for one card
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedCard {
    pub text: String,
    pub confidence: f32,
    pub bbox: Vec<Point>,
    pub y_position: f64,
    pub status: MatchStatus,
    pub resolved_name: Option<String>,
    pub external_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
    pub note: String,
}

#[derive(Debug, Clone)]
pub struct Resolver {
    catalog: Arc<CatalogIndex>,
    fuzzy_threshold: f64,
}

impl Resolver {
    pub fn new(catalog: Arc<CatalogIndex>, fuzzy_threshold: f64) -> Self {
        Self {
            catalog,
            fuzzy_threshold,
        }
    }

    pub fn catalog(&self) -> &CatalogIndex {
        &self.catalog
    }

    /// Resolve one text. Claims the canonical name in `seen` on first sight.
    pub fn resolve(&self, text: &str, seen: &mut SeenSet) -> Resolution {
        if let Some(name) = self.catalog.exact(text) {
            return claim_or_duplicate(seen, name, Resolution::Exact);
        }

        if let Some(name) = self.catalog.case_insensitive(text) {
            return claim_or_duplicate(seen, name, Resolution::ExactCorrected);
        }

        if let Some(m) = self.catalog.fuzzy(text, self.fuzzy_threshold) {
            tracing::debug!(
                "Fuzzy match {:?} -> {:?} ({:.3})",
                text,
                m.name,
                m.similarity
            );
            let similarity = m.similarity;
            return claim_or_duplicate(seen, m.name, |name| Resolution::Fuzzy { name, similarity });
        }

        Resolution::Unmatched
    }

    /// Resolve an image's cards in presentation order with a fresh [`SeenSet`]
    pub fn resolve_all(&self, cards: Vec<MergedCard>) -> Vec<ResolvedCard> {
        let mut seen = SeenSet::new();
        let resolved: Vec<ResolvedCard> = cards
            .into_iter()
            .map(|card| {
                let resolution = self.resolve(&card.text, &mut seen);
                tracing::trace!(
                    "{:?} ({} fragments) -> {:?}",
                    card.text,
                    card.fragments,
                    resolution.status()
                );
                let resolved_name = resolution.resolved_name().map(str::to_string);
                let external_id = resolved_name
                    .as_deref()
                    .and_then(|name| self.catalog.external_id(name))
                    .map(str::to_string);
                ResolvedCard {
                    note: resolution.note(&card.text),
                    similarity: resolution.similarity(),
                    status: resolution.status(),
                    resolved_name,
                    external_id,
                    text: card.text,
                    confidence: card.confidence,
                    bbox: card.bbox,
                    y_position: card.y_position,
                }
            })
            .collect();
        tracing::debug!(
            "Resolved {} cards, {} distinct catalog names claimed",
            resolved.len(),
            seen.len()
        );
        resolved
    }
}

fn claim_or_duplicate<F>(seen: &mut SeenSet, name: &str, claimed: F) -> Resolution
where
    F: FnOnce(String) -> Resolution,
{
    if seen.claim(name) {
        claimed(name.to_string())
    } else {
        Resolution::Duplicate(name.to_string())
    }
}
