//! Local neural OCR engine.
//!
//! Runs a detection + recognition model pair (PP-OCR style, via
//! `rust-paddle-ocr`) over the normalized image. Detected fragments are
//! joined into the outcome text; confidence is the mean of per-fragment
//! scores, where a fragment's score is the mean of its character scores.
//! Fragment bounding boxes and the fragment count land in metadata.

use super::{ExtractionJob, OcrEngine};
use crate::core::config::NeuralConfig;
use crate::error::{FusionError, Result};
use crate::types::{EngineOutcome, OcrMethod};
use async_trait::async_trait;
use image::DynamicImage;
use rust_paddle_ocr::{Det, Rec};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

struct NeuralModels {
    det: Det,
    rec: Rec,
}

/// Detection + recognition models are loaded once at construction and reused
/// across calls. The upstream handles take `&mut self`, so concurrent calls
/// are serialized behind a mutex; inference itself runs on the blocking pool.
pub struct NeuralEngine {
    models: Arc<Mutex<NeuralModels>>,
}

impl NeuralEngine {
    pub fn from_config(config: &NeuralConfig) -> Result<Self> {
        for path in [&config.det_model, &config.rec_model, &config.keys_file] {
            if !path.exists() {
                return Err(FusionError::validation(format!(
                    "neural model file not found: {}",
                    path.display()
                )));
            }
        }

        let det = Det::from_file(&config.det_model)
            .map_err(|e| FusionError::engine(format!("failed to load detection model: {e}")))?
            .with_merge_boxes(config.merge_boxes)
            .with_merge_threshold(config.merge_threshold);

        let rec = Rec::from_file(&config.rec_model, &config.keys_file)
            .map_err(|e| FusionError::engine(format!("failed to load recognition model: {e}")))?
            .with_min_score(config.min_score)
            .with_punct_min_score(config.punct_min_score);

        Ok(Self {
            models: Arc::new(Mutex::new(NeuralModels { det, rec })),
        })
    }
}

#[async_trait]
impl OcrEngine for NeuralEngine {
    fn name(&self) -> &'static str {
        "neural"
    }

    fn method(&self) -> OcrMethod {
        OcrMethod::NeuralLocal
    }

    async fn extract(&self, job: &ExtractionJob) -> EngineOutcome {
        let models = Arc::clone(&self.models);
        let image = job.ocr_image();

        let handle = tokio::task::spawn_blocking(move || run_inference(&models, &image));
        match handle.await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                tracing::error!("neural engine failed for {}: {}", job.path.display(), e);
                EngineOutcome::failed(e.to_string())
            }
            Err(e) => {
                tracing::error!("neural inference task panicked: {}", e);
                EngineOutcome::failed(format!("neural inference task panicked: {e}"))
            }
        }
    }
}

fn run_inference(models: &Mutex<NeuralModels>, image: &DynamicImage) -> Result<EngineOutcome> {
    let mut guard = models
        .lock()
        .map_err(|_| FusionError::engine("neural model lock poisoned"))?;
    let NeuralModels { det, rec } = &mut *guard;

    let rects = det
        .find_text_rect(image)
        .map_err(|e| FusionError::engine(format!("text detection failed: {e}")))?;

    let mut fragments = Vec::new();
    let mut scores = Vec::new();
    let mut boxes = Vec::new();

    for rect in rects {
        let crop = image.crop_imm(
            rect.left().max(0) as u32,
            rect.top().max(0) as u32,
            rect.width(),
            rect.height(),
        );

        let text = rec
            .predict_str(&crop)
            .map_err(|e| FusionError::engine(format!("text recognition failed: {e}")))?;
        if text.trim().is_empty() {
            continue;
        }

        let char_scores = rec
            .predict_char_score(&crop)
            .map_err(|e| FusionError::engine(format!("score prediction failed: {e}")))?;

        scores.push(mean(&char_scores));
        boxes.push(json!([
            rect.left().max(0),
            rect.top().max(0),
            rect.width(),
            rect.height()
        ]));
        fragments.push(text);
    }

    let confidence = mean(&scores);
    let mut metadata = HashMap::new();
    metadata.insert("fragment_count".to_string(), json!(fragments.len()));
    metadata.insert("fragment_boxes".to_string(), Value::Array(boxes));

    Ok(EngineOutcome::success(
        fragments.join("\n"),
        confidence,
        metadata,
    ))
}

fn mean<T: Into<f64> + Copy>(values: &[T]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().map(|&v| v.into()).sum::<f64>() / values.len() as f64
    }
}
