use crate::catalog::CatalogIndex;
use crate::cluster::{cluster, Adjacency, MergedCard};
use crate::config::PipelineConfig;
use crate::detection::{Detection, RawDetection};
use crate::filter::DetectionFilter;
use crate::resolve::{MatchStatus, ResolvedCard, Resolver};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

/// Timing information for a single pipeline stage
#[derive(Debug, Clone, Serialize)]
pub struct StageTiming {
    pub name: String,
    pub time_us: u64,
}

/// Per-image counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub raw_detections: usize,
    pub rejected: usize,
    pub filtered_out: usize,
    pub cards: usize,
    pub exact: usize,
    pub exact_corrected: usize,
    pub fuzzy: usize,
    pub duplicate: usize,
    pub unmatched: usize,
}

impl Summary {
    fn count(&mut self, status: MatchStatus) {
        match status {
            MatchStatus::Exact => self.exact += 1,
            MatchStatus::ExactCorrected => self.exact_corrected += 1,
            MatchStatus::Fuzzy => self.fuzzy += 1,
            MatchStatus::Duplicate => self.duplicate += 1,
            MatchStatus::Unmatched => self.unmatched += 1,
        }
    }
}

/// One line of the clean deck list
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeckEntry {
    pub name: String,
    pub external_id: Option<String>,
}

/// Result of running one image through the pipeline
#[derive(Debug, Clone, Serialize)]
pub struct ImageReport {
    pub image_id: String,
    /// Cards in top-to-bottom order
    pub cards: Vec<ResolvedCard>,
    pub deck_list: Vec<DeckEntry>,
    /// Merged OCR texts before catalog matching
    pub raw_names: Vec<String>,
    pub summary: Summary,
    pub timings: Vec<StageTiming>,
    pub warnings: Vec<String>,
}

/// Validate, filter, cluster and resolve the detections of one image
pub struct Pipeline {
    filter: DetectionFilter,
    adjacency: Adjacency,
    resolver: Resolver,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, catalog: Arc<CatalogIndex>) -> Self {
        Self {
            filter: DetectionFilter::new(&config),
            adjacency: Adjacency::from(&config),
            resolver: Resolver::new(catalog, config.fuzzy_similarity_threshold),
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn catalog(&self) -> &CatalogIndex {
        self.resolver.catalog()
    }

    pub fn process(&self, image_id: &str, raw: Vec<RawDetection>) -> ImageReport {
        let mut timings = Vec::new();
        let mut warnings = Vec::new();
        let mut summary = Summary {
            raw_detections: raw.len(),
            ..Default::default()
        };

        if self.catalog().is_empty() {
            warnings.push("catalog is empty; every card resolves as unmatched".to_string());
        }

        let detections = run_stage("validate", &mut timings, || {
            let mut valid = Vec::with_capacity(raw.len());
            for (index, record) in raw.into_iter().enumerate() {
                match Detection::from_raw(index, record) {
                    Ok(det) => valid.push(det),
                    Err(e) => {
                        tracing::warn!("[{}] {}", image_id, e);
                        warnings.push(e.to_string());
                    }
                }
            }
            valid
        });
        summary.rejected = summary.raw_detections - detections.len();

        let validated = detections.len();
        let kept = run_stage("filter", &mut timings, || self.filter.filter(detections));
        summary.filtered_out = validated - kept.len();

        let merged: Vec<MergedCard> =
            run_stage("cluster", &mut timings, || cluster(&kept, &self.adjacency));
        let raw_names = merged.iter().map(|c| c.text.clone()).collect();

        let cards = run_stage("resolve", &mut timings, || self.resolver.resolve_all(merged));

        summary.cards = cards.len();
        for card in &cards {
            summary.count(card.status);
        }

        let deck_list = cards
            .iter()
            .filter(|c| c.status.is_claim())
            .filter_map(|c| {
                c.resolved_name.as_ref().map(|name| DeckEntry {
                    name: name.clone(),
                    external_id: c.external_id.clone(),
                })
            })
            .collect();

        tracing::info!(
            "[{}] {} cards: {} exact, {} case-corrected, {} fuzzy, {} duplicate, {} unmatched",
            image_id,
            summary.cards,
            summary.exact,
            summary.exact_corrected,
            summary.fuzzy,
            summary.duplicate,
            summary.unmatched
        );

        ImageReport {
            image_id: image_id.to_string(),
            cards,
            deck_list,
            raw_names,
            summary,
            timings,
            warnings,
        }
    }
}

fn run_stage<T, F>(name: &str, timings: &mut Vec<StageTiming>, stage_fn: F) -> T
where
    F: FnOnce() -> T,
{
    let start = Instant::now();
    let result = stage_fn();
    timings.push(StageTiming {
        name: name.to_string(),
        time_us: start.elapsed().as_micros() as u64,
    });
    result
}
