//! Configuration loading and management.
//!
//! [`FusionConfig`] covers the whole pipeline: which engines run, how long
//! each may take, how results are fused, and whether results are cached.
//! It can be loaded from TOML or JSON files, discovered in the project
//! hierarchy (`ocrfuse.toml`), or created programmatically.

use crate::error::{FusionError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How engine outcomes are reconciled into one result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionPolicy {
    /// The primary (vision) engine supplies text and confidence
    /// unconditionally; all other engines only enrich metadata.
    #[default]
    PrimaryPlusSupplement,
    /// First outcome meeting the confidence threshold wins; otherwise the
    /// highest-confidence completed outcome.
    BestOfN,
}

/// Main pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Ordered language preference, ISO-639-1 codes.
    pub languages: Vec<String>,

    /// Enable the content-addressed result cache.
    pub use_cache: bool,

    /// Cache root directory (None = `.ocrfuse/results` under the current dir).
    pub cache_dir: Option<PathBuf>,

    /// Maximum engine invocations in flight per call.
    pub max_workers: usize,

    /// Normalize the image before local OCR.
    pub preprocess: bool,

    /// Run the contour-based layout analyzer.
    pub detect_layout: bool,

    /// Acceptance threshold for the best-of-n policy, in [0, 1].
    pub confidence_threshold: f64,

    /// Active fusion policy.
    pub policy: FusionPolicy,

    /// Wait budget for the primary engine, seconds.
    pub primary_timeout_secs: u64,

    /// Wait budget for each supplemental engine, seconds.
    pub supplemental_timeout_secs: u64,

    /// Image normalization parameters.
    pub preprocessing: PreprocessConfig,

    /// Layout classification parameters.
    pub layout: LayoutConfig,

    /// Multimodal vision engine (None = disabled).
    pub vision: Option<VisionConfig>,

    /// Hosted document-text-detection engine (None = disabled).
    pub cloud: Option<CloudOcrConfig>,

    /// Local neural detection+recognition engine (None = disabled).
    pub neural: Option<NeuralConfig>,

    /// Classical local OCR engine (None = disabled).
    pub tesseract: Option<TesseractOcrConfig>,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            languages: default_languages(),
            use_cache: true,
            cache_dir: None,
            max_workers: 3,
            preprocess: true,
            detect_layout: true,
            confidence_threshold: 0.8,
            policy: FusionPolicy::default(),
            primary_timeout_secs: 60,
            supplemental_timeout_secs: 30,
            preprocessing: PreprocessConfig::default(),
            layout: LayoutConfig::default(),
            vision: Some(VisionConfig::default()),
            cloud: None,
            neural: None,
            tesseract: Some(TesseractOcrConfig::default()),
        }
    }
}

impl FusionConfig {
    pub fn primary_timeout(&self) -> Duration {
        Duration::from_secs(self.primary_timeout_secs)
    }

    pub fn supplemental_timeout(&self) -> Duration {
        Duration::from_secs(self.supplemental_timeout_secs)
    }

    /// Reject configurations the pipeline cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            return Err(FusionError::validation("max_workers must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(FusionError::validation(format!(
                "confidence_threshold must be within [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        if self.primary_timeout_secs == 0 || self.supplemental_timeout_secs == 0 {
            return Err(FusionError::validation("engine timeouts must be non-zero"));
        }
        Ok(())
    }

    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            FusionError::validation(format!(
                "failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        toml::from_str(&content).map_err(|e| {
            FusionError::validation(format!("invalid TOML in {}: {}", path.as_ref().display(), e))
        })
    }

    /// Load configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            FusionError::validation(format!(
                "failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            FusionError::validation(format!("invalid JSON in {}: {}", path.as_ref().display(), e))
        })
    }

    /// Discover `ocrfuse.toml` in the current directory or any parent.
    pub fn discover() -> Result<Option<Self>> {
        let mut current = std::env::current_dir().map_err(FusionError::Io)?;

        loop {
            let candidate = current.join("ocrfuse.toml");
            if candidate.exists() {
                return Ok(Some(Self::from_toml_file(candidate)?));
            }
            if let Some(parent) = current.parent() {
                current = parent.to_path_buf();
            } else {
                break;
            }
        }

        Ok(None)
    }
}

/// Image normalization parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Median filter radius for denoising; 0 disables the filter.
    pub median_radius: u32,

    /// Apply histogram equalization before binarization.
    pub equalize_contrast: bool,

    /// Neighborhood radius for adaptive mean binarization.
    pub binarize_block_radius: u32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            median_radius: 1,
            equalize_contrast: true,
            binarize_block_radius: 5,
        }
    }
}

/// Layout classification thresholds.
///
/// A region larger than `min_block_area` is classified by its bounding-box
/// aspect ratio: near-square regions are treated as embedded images, very
/// wide regions as tables, everything else as text blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub min_block_area: u64,
    pub image_aspect_min: f64,
    pub image_aspect_max: f64,
    pub table_aspect_min: f64,
    pub image_confidence: f64,
    pub table_confidence: f64,
    pub text_confidence: f64,
    pub column_confidence: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            min_block_area: 10_000,
            image_aspect_min: 0.8,
            image_aspect_max: 1.2,
            table_aspect_min: 3.0,
            image_confidence: 0.7,
            table_confidence: 0.6,
            text_confidence: 0.8,
            column_confidence: 0.5,
        }
    }
}

/// Multimodal vision engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    /// OpenAI-compatible chat completions endpoint.
    pub endpoint: String,

    /// Model identifier sent with each request.
    pub model: String,

    /// Environment variable holding the API key.
    pub api_key_env: String,

    /// Completion token budget per request.
    pub max_tokens: u32,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-5-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            max_tokens: 2048,
        }
    }
}

/// Hosted document-text-detection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudOcrConfig {
    /// Annotation endpoint; the API key is appended as a query parameter.
    pub endpoint: String,

    /// Environment variable holding the API key.
    pub api_key_env: String,
}

impl Default for CloudOcrConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://vision.googleapis.com/v1/images:annotate".to_string(),
            api_key_env: "CLOUD_VISION_API_KEY".to_string(),
        }
    }
}

/// Local neural detection+recognition settings.
///
/// Model paths are required; the engine is skipped when the files are
/// missing at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeuralConfig {
    /// Text detection model file.
    pub det_model: PathBuf,

    /// Text recognition model file.
    pub rec_model: PathBuf,

    /// Character set file for the recognition model.
    pub keys_file: PathBuf,

    /// Minimum recognition confidence per character.
    #[serde(default = "default_min_score")]
    pub min_score: f32,

    /// Minimum confidence for punctuation characters.
    #[serde(default = "default_punct_min_score")]
    pub punct_min_score: f32,

    /// Merge adjacent detection boxes.
    #[serde(default = "default_true")]
    pub merge_boxes: bool,

    /// Merge distance threshold in pixels.
    #[serde(default = "default_merge_threshold")]
    pub merge_threshold: i32,
}

/// Classical OCR engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TesseractOcrConfig {
    /// Page segmentation mode (0-10).
    pub psm: u8,

    /// Words below this TSV confidence (0-100) are excluded from the
    /// confidence average.
    pub min_word_confidence: f64,
}

impl Default for TesseractOcrConfig {
    fn default() -> Self {
        Self {
            psm: 3,
            min_word_confidence: 0.0,
        }
    }
}

fn default_languages() -> Vec<String> {
    vec!["ja".to_string(), "en".to_string()]
}
fn default_true() -> bool {
    true
}
fn default_min_score() -> f32 {
    0.6
}
fn default_punct_min_score() -> f32 {
    0.1
}
fn default_merge_threshold() -> i32 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = FusionConfig::default();
        assert_eq!(config.languages, vec!["ja", "en"]);
        assert!(config.use_cache);
        assert_eq!(config.max_workers, 3);
        assert_eq!(config.policy, FusionPolicy::PrimaryPlusSupplement);
        assert!(config.vision.is_some());
        assert!(config.cloud.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let config = FusionConfig {
            max_workers: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_threshold() {
        let config = FusionConfig {
            confidence_threshold: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeouts() {
        let config = FusionConfig {
            supplemental_timeout_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_toml_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ocrfuse.toml");
        fs::write(
            &path,
            r#"
languages = ["en"]
use_cache = false
max_workers = 2
policy = "best_of_n"
confidence_threshold = 0.6

[tesseract]
psm = 6
"#,
        )
        .unwrap();

        let config = FusionConfig::from_toml_file(&path).unwrap();
        assert_eq!(config.languages, vec!["en"]);
        assert!(!config.use_cache);
        assert_eq!(config.max_workers, 2);
        assert_eq!(config.policy, FusionPolicy::BestOfN);
        assert_eq!(config.tesseract.unwrap().psm, 6);
        // Unspecified sections keep their defaults.
        assert_eq!(config.primary_timeout_secs, 60);
    }

    #[test]
    fn test_from_toml_file_invalid() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ocrfuse.toml");
        fs::write(&path, "languages = not-a-list").unwrap();
        assert!(FusionConfig::from_toml_file(&path).is_err());
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"languages": ["de", "en"], "supplemental_timeout_secs": 10}"#,
        )
        .unwrap();

        let config = FusionConfig::from_json_file(&path).unwrap();
        assert_eq!(config.languages, vec!["de", "en"]);
        assert_eq!(config.supplemental_timeout_secs, 10);
    }

    #[test]
    fn test_neural_config_defaults_applied() {
        let toml = r#"
det_model = "models/det.mnn"
rec_model = "models/rec.mnn"
keys_file = "models/keys.txt"
"#;
        let config: NeuralConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.min_score, 0.6);
        assert!(config.merge_boxes);
        assert_eq!(config.merge_threshold, 1);
    }
}
