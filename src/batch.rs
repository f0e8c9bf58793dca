//! Offline batch run over a directory of detection files
//!
//! Every image is an independent blocking task. A failing image is logged and
//! recorded in the summary; it never stops the rest of the run.

use crate::annotate;
use crate::catalog::CatalogIndex;
use crate::config::BatchConfig;
use crate::error::ScanError;
use crate::pipeline::{ImageReport, Pipeline};
use crate::source::{DetectionSource, JsonDirSource};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "webp", "bmp"];

/// Outcome of one image
#[derive(Debug, Clone, Serialize)]
pub struct ImageOutcome {
    pub image_id: String,
    pub ok: bool,
    pub error: Option<String>,
    pub card_count: usize,
}

/// Per-image success/failure summary of a run
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub images: Vec<ImageOutcome>,
}

struct Job {
    source: Arc<dyn DetectionSource>,
    pipeline: Arc<Pipeline>,
    output_dir: PathBuf,
    images_dir: Option<PathBuf>,
}

pub async fn run(config: BatchConfig) -> anyhow::Result<BatchSummary> {
    let catalog = Arc::new(CatalogIndex::load_json(&config.catalog_path)?);
    let source: Arc<dyn DetectionSource> = Arc::new(JsonDirSource::new(&config.detections_dir)?);
    std::fs::create_dir_all(&config.output_dir).map_err(|e| {
        ScanError::Internal(format!(
            "Failed to create output directory {}: {}",
            config.output_dir.display(),
            e
        ))
    })?;

    let image_ids = source.list_images()?;
    tracing::info!(
        "Processing {} image(s) from {} [{}: {}] with {} worker(s)",
        image_ids.len(),
        config.detections_dir.display(),
        source.name(),
        source.description(),
        config.jobs
    );

    let job = Arc::new(Job {
        source,
        pipeline: Arc::new(Pipeline::new(config.pipeline, catalog)),
        output_dir: config.output_dir.clone(),
        images_dir: config.images_dir.clone(),
    });

    let mut images: Vec<ImageOutcome> = stream::iter(image_ids)
        .map(|image_id| {
            let job = Arc::clone(&job);
            async move {
                let task_id = image_id.clone();
                let result = tokio::task::spawn_blocking(move || job.process(&task_id)).await;
                outcome(image_id, result)
            }
        })
        .buffer_unordered(config.jobs)
        .collect()
        .await;
    images.sort_by(|a, b| a.image_id.cmp(&b.image_id));

    let succeeded = images.iter().filter(|o| o.ok).count();
    let summary = BatchSummary {
        succeeded,
        failed: images.len() - succeeded,
        images,
    };

    write_json(&config.output_dir.join("summary.json"), &summary)?;
    Ok(summary)
}

fn outcome(
    image_id: String,
    result: Result<Result<ImageReport, ScanError>, tokio::task::JoinError>,
) -> ImageOutcome {
    let failure = match result {
        Ok(Ok(report)) => {
            return ImageOutcome {
                image_id,
                ok: true,
                error: None,
                card_count: report.cards.len(),
            }
        }
        Ok(Err(e)) => e.to_string(),
        Err(e) if e.is_panic() => "processing panicked".to_string(),
        Err(e) => format!("processing task failed: {}", e),
    };
    tracing::error!("[{}] {}", image_id, failure);
    ImageOutcome {
        image_id,
        ok: false,
        error: Some(failure),
        card_count: 0,
    }
}

impl Job {
    fn process(&self, image_id: &str) -> Result<ImageReport, ScanError> {
        let detections = self.source.detections(image_id)?;
        let report = self.pipeline.process(image_id, detections);

        if let Some(image_path) = self.find_image(image_id) {
            let image = image::open(&image_path).map_err(|e| {
                ScanError::ImageDecode(format!("{}: {}", image_path.display(), e))
            })?;
            let out_path = self.output_dir.join(format!("annotated_{}.png", image_id));
            annotate::render(&image, &report.cards)
                .save(&out_path)
                .map_err(|e| ScanError::ImageEncode(format!("{}: {}", out_path.display(), e)))?;
            tracing::debug!("[{}] wrote {}", image_id, out_path.display());
        }

        // Only images that fully succeeded leave a report behind
        write_json(&self.output_dir.join(format!("{}.json", image_id)), &report)?;
        Ok(report)
    }

    fn find_image(&self, image_id: &str) -> Option<PathBuf> {
        let dir = self.images_dir.as_ref()?;
        IMAGE_EXTENSIONS
            .iter()
            .map(|ext| dir.join(format!("{}.{}", image_id, ext)))
            .find(|path| path.is_file())
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ScanError> {
    let data = serde_json::to_vec_pretty(value)
        .map_err(|e| ScanError::Internal(format!("Failed to serialize report: {}", e)))?;
    std::fs::write(path, data)
        .map_err(|e| ScanError::Internal(format!("Failed to write {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use image::{Rgb, RgbImage};

    fn write(path: &Path, contents: &str) {
        std::fs::write(path, contents).unwrap();
    }

    fn config(root: &Path, images: bool) -> BatchConfig {
        BatchConfig {
            catalog_path: root.join("catalog.json"),
            detections_dir: root.join("detections"),
            output_dir: root.join("out"),
            images_dir: images.then(|| root.join("images")),
            jobs: 2,
            pipeline: PipelineConfig::default(),
        }
    }

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(
            &root.join("catalog.json"),
            r#"[{"name": "Lightning Bolt", "external_id": "lb"}, {"name": "Counterspell"}]"#,
        );
        std::fs::create_dir(root.join("detections")).unwrap();
        write(
            &root.join("detections/alice.json"),
            r#"[
                {"bbox": [[0,10],[60,10],[60,30],[0,30]], "text": "Lightning", "confidence": 0.9},
                {"bbox": [[70,10],[110,10],[110,30],[70,30]], "text": "Bolt", "confidence": 0.85},
                {"bbox": [[0,50],[100,50],[100,70],[0,70]], "text": "Counterspell", "confidence": 0.95}
            ]"#,
        );
        write(&root.join("detections/bob.json"), "{ this is not json");
        write(&root.join("detections/carol.json"), r#"{"detections": []}"#);
        dir
    }

    #[test]
    fn test_failed_image_does_not_stop_the_run() {
        let dir = fixture();
        let summary = tokio_test::block_on(run(config(dir.path(), false))).unwrap();

        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        let ids: Vec<&str> = summary.images.iter().map(|o| o.image_id.as_str()).collect();
        assert_eq!(ids, vec!["alice", "bob", "carol"]);
        assert!(summary.images[0].ok);
        assert_eq!(summary.images[0].card_count, 2);
        assert!(!summary.images[1].ok);
        assert!(summary.images[1].error.as_deref().unwrap().contains("bob.json"));
        assert_eq!(summary.images[2].card_count, 0);

        let out = dir.path().join("out");
        assert!(out.join("summary.json").is_file());
        assert!(out.join("carol.json").is_file());
        assert!(!out.join("bob.json").exists());

        let report: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(out.join("alice.json")).unwrap()).unwrap();
        assert_eq!(report["cards"][0]["resolved_name"], "Lightning Bolt");
        assert_eq!(report["deck_list"][0]["external_id"], "lb");
        assert_eq!(report["deck_list"][1]["external_id"], serde_json::Value::Null);
    }

    #[test]
    fn test_writes_annotated_image_when_source_image_exists() {
        let dir = fixture();
        std::fs::create_dir(dir.path().join("images")).unwrap();
        RgbImage::from_pixel(200, 100, Rgb([255, 255, 255]))
            .save(dir.path().join("images/alice.png"))
            .unwrap();

        let summary = tokio_test::block_on(run(config(dir.path(), true))).unwrap();
        assert_eq!(summary.succeeded, 2);

        let annotated = image::open(dir.path().join("out/annotated_alice.png")).unwrap();
        assert_eq!(annotated.to_rgb8().get_pixel(0, 10), &annotate::MATCHED_COLOR);
        assert!(!dir.path().join("out/annotated_carol.png").exists());
    }

    #[test]
    fn test_unreadable_image_leaves_no_report() {
        let dir = fixture();
        std::fs::create_dir(dir.path().join("images")).unwrap();
        write(&dir.path().join("images/alice.png"), "not a png");

        let summary = tokio_test::block_on(run(config(dir.path(), true))).unwrap();
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 2);
        assert!(!summary.images[0].ok);
        assert!(summary.images[0].error.as_deref().unwrap().contains("alice.png"));

        let out = dir.path().join("out");
        assert!(!out.join("alice.json").exists());
        assert!(!out.join("annotated_alice.png").exists());
        assert!(out.join("carol.json").is_file());
    }

    #[test]
    fn test_missing_catalog_is_fatal() {
        let dir = fixture();
        std::fs::remove_file(dir.path().join("catalog.json")).unwrap();
        assert!(tokio_test::block_on(run(config(dir.path(), false))).is_err());
    }
}
