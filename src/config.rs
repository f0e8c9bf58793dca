use crate::error::ScanError;
use crate::{BatchArgs, PipelineArgs, ServeArgs};
use serde::Serialize;
use std::path::PathBuf;

pub const DEFAULT_STOPLIST: [&str; 7] = ["tap", "untap", "mana", "cost", "main", "deck", "sideboard"];
pub const DEFAULT_MANA_SYMBOLS: &str = "{}/WUBRGC";

/// Parameters of the filter, clustering and matching stages
#[derive(Debug, Clone, Serialize)]
pub struct PipelineConfig {
    pub min_confidence_floor: f32,
    pub min_text_length: usize,
    pub max_text_length: usize,
    pub noise_stoplist: Vec<String>,
    pub mana_symbol_set: String,
    pub vertical_adjacency_tolerance_px: f64,
    pub horizontal_adjacency_tolerance_px: f64,
    pub fuzzy_similarity_threshold: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_confidence_floor: 0.05,
            min_text_length: 3,
            max_text_length: 50,
            noise_stoplist: DEFAULT_STOPLIST.iter().map(|s| s.to_string()).collect(),
            mana_symbol_set: DEFAULT_MANA_SYMBOLS.to_string(),
            vertical_adjacency_tolerance_px: 10.0,
            horizontal_adjacency_tolerance_px: 30.0,
            fuzzy_similarity_threshold: 0.65,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ScanError> {
        if !(0.0..=1.0).contains(&self.min_confidence_floor) {
            return Err(ScanError::InvalidConfig(format!(
                "min confidence must be within [0, 1], got {}",
                self.min_confidence_floor
            )));
        }
        if self.min_text_length > self.max_text_length {
            return Err(ScanError::InvalidConfig(format!(
                "min text length {} exceeds max text length {}",
                self.min_text_length, self.max_text_length
            )));
        }
        for (name, value) in [
            ("vertical tolerance", self.vertical_adjacency_tolerance_px),
            ("horizontal tolerance", self.horizontal_adjacency_tolerance_px),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ScanError::InvalidConfig(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.fuzzy_similarity_threshold) {
            return Err(ScanError::InvalidConfig(format!(
                "fuzzy threshold must be within [0, 1], got {}",
                self.fuzzy_similarity_threshold
            )));
        }
        Ok(())
    }
}

impl From<PipelineArgs> for PipelineConfig {
    fn from(args: PipelineArgs) -> Self {
        Self {
            min_confidence_floor: args.min_confidence,
            min_text_length: args.min_text_length,
            max_text_length: args.max_text_length,
            noise_stoplist: args
                .noise_stoplist
                .into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            mana_symbol_set: args.mana_symbols,
            vertical_adjacency_tolerance_px: args.vertical_tolerance,
            horizontal_adjacency_tolerance_px: args.horizontal_tolerance,
            fuzzy_similarity_threshold: args.fuzzy_threshold,
        }
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub catalog_path: Option<PathBuf>,
    pub max_file_size: usize,
    pub pipeline: PipelineConfig,
}

impl TryFrom<ServeArgs> for ServerConfig {
    type Error = ScanError;

    fn try_from(args: ServeArgs) -> Result<Self, Self::Error> {
        let pipeline = PipelineConfig::from(args.pipeline);
        pipeline.validate()?;
        Ok(Self {
            host: args.host,
            port: args.port,
            catalog_path: args.catalog,
            max_file_size: args.max_file_size,
            pipeline,
        })
    }
}

/// Batch run configuration
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub catalog_path: PathBuf,
    pub detections_dir: PathBuf,
    pub output_dir: PathBuf,
    pub images_dir: Option<PathBuf>,
    pub jobs: usize,
    pub pipeline: PipelineConfig,
}

impl TryFrom<BatchArgs> for BatchConfig {
    type Error = ScanError;

    fn try_from(args: BatchArgs) -> Result<Self, Self::Error> {
        let pipeline = PipelineConfig::from(args.pipeline);
        pipeline.validate()?;
        if args.jobs == 0 {
            return Err(ScanError::InvalidConfig("jobs must be at least 1".to_string()));
        }
        Ok(Self {
            catalog_path: args.catalog,
            detections_dir: args.detections,
            output_dir: args.output,
            images_dir: args.images,
            jobs: args.jobs,
            pipeline,
        })
    }
}
