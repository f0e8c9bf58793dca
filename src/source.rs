//! Detection sources
//!
//! The OCR engine itself lives outside this crate; a source only hands over
//! the detections it produced for each image.

use crate::detection::RawDetection;
use crate::error::ScanError;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Trait that all detection sources must implement
pub trait DetectionSource: Send + Sync {
    /// Returns the source identifier (e.g., "json-dir")
    fn name(&self) -> &'static str;

    /// Returns a human-readable description of the source
    fn description(&self) -> &'static str;

    /// Identifiers of every image the source has detections for
    fn list_images(&self) -> Result<Vec<String>, ScanError>;

    /// Raw detections for one image
    fn detections(&self, image_id: &str) -> Result<Vec<RawDetection>, ScanError>;
}

/// Accepted layouts of a detection document
#[derive(Deserialize)]
#[serde(untagged)]
enum DetectionDocument {
    Bare(Vec<RawDetection>),
    Wrapped { detections: Vec<RawDetection> },
}

/// Parse a detection document: a bare array or `{"detections": [...]}`
pub fn parse_detections(data: &str) -> Result<Vec<RawDetection>, serde_json::Error> {
    let doc: DetectionDocument = serde_json::from_str(data)?;
    Ok(match doc {
        DetectionDocument::Bare(list) => list,
        DetectionDocument::Wrapped { detections } => detections,
    })
}

/// One `<image_id>.json` file per image in a directory
pub struct JsonDirSource {
    dir: PathBuf,
}

impl JsonDirSource {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, ScanError> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(ScanError::Source(format!(
                "Detection directory {} does not exist",
                dir.display()
            )));
        }
        Ok(Self { dir })
    }

    fn path_for(&self, image_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", image_id))
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().map(|ext| ext == "json").unwrap_or(false)
}

impl DetectionSource for JsonDirSource {
    fn name(&self) -> &'static str {
        "json-dir"
    }

    fn description(&self) -> &'static str {
        "Directory of per-image JSON detection files"
    }

    fn list_images(&self) -> Result<Vec<String>, ScanError> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| {
            ScanError::Source(format!("Failed to list {}: {}", self.dir.display(), e))
        })?;

        let mut ids = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|e| ScanError::Source(format!("Failed to read directory entry: {}", e)))?
                .path();
            if !path.is_file() || !is_json(&path) {
                continue;
            }
            if let Some(stem) = path.file_stem() {
                ids.push(stem.to_string_lossy().to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn detections(&self, image_id: &str) -> Result<Vec<RawDetection>, ScanError> {
        let path = self.path_for(image_id);
        let data = std::fs::read_to_string(&path).map_err(|e| {
            ScanError::Source(format!("Failed to read {}: {}", path.display(), e))
        })?;
        parse_detections(&data).map_err(|e| {
            ScanError::Source(format!("Failed to parse {}: {}", path.display(), e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_bare_and_wrapped_documents() {
        let bare = r#"[{"bbox": [[0,0],[1,0],[1,1],[0,1]], "text": "Opt", "confidence": 0.5}]"#;
        let wrapped = r#"{"detections": [[[[0,0],[1,0],[1,1],[0,1]], "Opt", 0.5]]}"#;
        assert_eq!(parse_detections(bare).unwrap().len(), 1);
        assert_eq!(parse_detections(wrapped).unwrap().len(), 1);
        assert!(parse_detections(r#"{"nope": 1}"#).is_err());
    }

    #[test]
    fn test_wrongly_shaped_record_keeps_the_rest_of_the_document() {
        let doc = r#"[
            {"bbox": [[0,0],[90,0],[90,20],[0,20]], "text": "Counterspell", "confidence": 0.9},
            {"bbox": [[0,40],[90,40],[90,60]], "text": "Opt", "confidence": "high"}
        ]"#;
        let detections = parse_detections(doc).unwrap();
        assert_eq!(detections.len(), 2);
        assert!(matches!(detections[0], RawDetection::Record { .. }));
        assert!(matches!(detections[1], RawDetection::Malformed(_)));
    }

    #[test]
    fn test_lists_json_stems_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bob.json"), "[]").unwrap();
        std::fs::write(dir.path().join("alice.json"), "[]").unwrap();
        std::fs::write(dir.path().join("carol.json.bak"), "[]").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();
        std::fs::create_dir(dir.path().join("nested.json")).unwrap();

        let source = JsonDirSource::new(dir.path()).unwrap();
        assert_eq!(source.list_images().unwrap(), vec!["alice", "bob"]);
        assert_eq!(source.name(), "json-dir");
    }

    #[test]
    fn test_reports_unreadable_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.json"), "{not json").unwrap();
        let source = JsonDirSource::new(dir.path()).unwrap();
        assert!(matches!(source.detections("bad"), Err(ScanError::Source(_))));
        assert!(matches!(source.detections("missing"), Err(ScanError::Source(_))));
    }

    #[test]
    fn test_missing_directory() {
        assert!(JsonDirSource::new("/nonexistent/detections").is_err());
    }
}
