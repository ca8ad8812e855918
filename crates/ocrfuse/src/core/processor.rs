//! Public facade.
//!
//! [`ImageProcessor`] owns the engines, the shared HTTP client, and the
//! result cache, all constructed once and safe to share across concurrent
//! calls. `process_image` is the single entry point external collaborators
//! use: read → cache lookup → (on miss) decode, preprocess, layout, fusion
//! → cache write → return.
//!
//! Only unreadable input escapes as an error (`Io` for filesystem failures,
//! `ImageLoad` for undecodable bytes); every other failure mode degrades
//! into a well-formed, lower-quality [`OcrResult`].

use crate::cache::{CacheKey, ResultCache};
use crate::core::config::{FusionConfig, FusionPolicy};
use crate::engines::{
    CloudOcrEngine, ExtractionJob, NeuralEngine, OcrEngine, TesseractEngine, VisionEngine,
};
use crate::error::{FusionError, Result};
use crate::fusion::FusionOrchestrator;
use crate::preprocess::{analyze_layout, normalize};
use crate::types::OcrResult;
use once_cell::sync::Lazy;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Global Tokio runtime backing the synchronous wrappers.
///
/// Lazily initialized and shared across all sync calls; runtime creation
/// only fails when the system is already out of resources, at which point
/// nothing else would work either.
static GLOBAL_RUNTIME: Lazy<tokio::runtime::Runtime> = Lazy::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to create global Tokio runtime")
});

pub struct ImageProcessor {
    config: FusionConfig,
    cache: Option<ResultCache>,
    orchestrator: FusionOrchestrator,
}

impl ImageProcessor {
    /// Build the processor from configuration.
    ///
    /// Engines whose prerequisites are missing (API key not set, model files
    /// absent) are skipped with a warning rather than failing construction;
    /// the pipeline degrades to whatever engines remain.
    pub fn new(config: FusionConfig) -> Result<Self> {
        config.validate()?;

        let client = reqwest::Client::new();

        let primary: Option<Arc<dyn OcrEngine>> = match &config.vision {
            Some(vision_config) => {
                match VisionEngine::from_config(vision_config.clone(), client.clone()) {
                    Ok(engine) => Some(Arc::new(engine)),
                    Err(e) => {
                        tracing::warn!("vision engine disabled: {}", e);
                        None
                    }
                }
            }
            None => None,
        };

        // Declared merge order: neural before traditional before cloud.
        let mut supplements: Vec<Arc<dyn OcrEngine>> = Vec::new();
        if let Some(neural_config) = &config.neural {
            match NeuralEngine::from_config(neural_config) {
                Ok(engine) => supplements.push(Arc::new(engine)),
                Err(e) => tracing::warn!("neural engine disabled: {}", e),
            }
        }
        if let Some(tesseract_config) = &config.tesseract {
            supplements.push(Arc::new(TesseractEngine::new(tesseract_config.clone())));
        }
        if let Some(cloud_config) = &config.cloud {
            match CloudOcrEngine::from_config(cloud_config.clone(), client) {
                Ok(engine) => supplements.push(Arc::new(engine)),
                Err(e) => tracing::warn!("cloud OCR engine disabled: {}", e),
            }
        }

        Self::with_engines(config, primary, supplements)
    }

    /// Build the processor with explicit engines, bypassing configuration-
    /// driven construction. The primary supplies text under the
    /// primary-plus-supplement policy; supplements are in merge order.
    pub fn with_engines(
        config: FusionConfig,
        primary: Option<Arc<dyn OcrEngine>>,
        supplements: Vec<Arc<dyn OcrEngine>>,
    ) -> Result<Self> {
        config.validate()?;

        let cache = if config.use_cache {
            let cache_dir = config
                .cache_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(".ocrfuse").join("results"));
            match ResultCache::new(cache_dir) {
                Ok(cache) => Some(cache),
                Err(e) => {
                    tracing::warn!("result cache disabled: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let orchestrator = FusionOrchestrator::new(&config, primary, supplements);

        Ok(Self {
            config,
            cache,
            orchestrator,
        })
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    /// Extract text and metadata from one image, using the configured
    /// preprocessing and layout toggles.
    pub async fn process_image(&self, path: impl AsRef<Path>) -> Result<OcrResult> {
        self.process_image_with(path, self.config.preprocess, self.config.detect_layout)
            .await
    }

    /// Extract text and metadata with per-call preprocessing/layout toggles.
    pub async fn process_image_with(
        &self,
        path: impl AsRef<Path>,
        preprocess: bool,
        detect_layout: bool,
    ) -> Result<OcrResult> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;

        let key = CacheKey::compute(&bytes, &self.key_params(preprocess, detect_layout));
        if let Some(cache) = &self.cache
            && let Some(result) = cache.get(&key)
        {
            tracing::debug!("cache hit for {}", path.display());
            return Ok(result);
        }

        let image = image::load_from_memory(&bytes).map_err(|e| {
            FusionError::image_load_with_source(
                format!("failed to decode image {}", path.display()),
                e,
            )
        })?;

        let preprocessed = preprocess.then(|| normalize(&image, &self.config.preprocessing));
        let layout = detect_layout.then(|| {
            let page = preprocessed.clone().unwrap_or_else(|| image.to_luma8());
            analyze_layout(&page, &self.config.layout)
        });

        let job = Arc::new(ExtractionJob {
            path: path.to_path_buf(),
            bytes,
            image,
            preprocessed,
            languages: self.config.languages.clone(),
        });

        let fused = self.orchestrator.run(job).await;
        let result = OcrResult {
            text: fused.text,
            confidence: fused.confidence,
            method: fused.method,
            layout,
            metadata: fused.metadata,
        };

        if let Some(cache) = &self.cache {
            cache.put(&key, &result);
        }

        Ok(result)
    }

    /// Synchronous wrapper over [`process_image`](Self::process_image).
    ///
    /// Must not be called from inside an async runtime.
    pub fn process_image_sync(&self, path: impl AsRef<Path>) -> Result<OcrResult> {
        GLOBAL_RUNTIME.block_on(self.process_image(path))
    }

    /// Parameters that must keep results in separate cache entries.
    fn key_params(&self, preprocess: bool, detect_layout: bool) -> Vec<(&'static str, String)> {
        let policy = match self.config.policy {
            FusionPolicy::PrimaryPlusSupplement => "primary_plus_supplement",
            FusionPolicy::BestOfN => "best_of_n",
        };
        vec![
            ("languages", self.config.languages.join(",")),
            ("preprocess", preprocess.to_string()),
            ("detect_layout", detect_layout.to_string()),
            (
                "confidence_threshold",
                format!("{:016x}", self.config.confidence_threshold.to_bits()),
            ),
            ("policy", policy.to_string()),
        ]
    }
}
