//! Hosted document-text-detection engine.
//!
//! Posts the raw image bytes to an `images:annotate`-style REST endpoint and
//! reads back the full text annotation. Confidence is the mean of the
//! per-block confidences reported by the service; detected language codes
//! are collected into metadata.

use super::{ExtractionJob, OcrEngine};
use crate::core::config::CloudOcrConfig;
use crate::error::{FusionError, Result};
use crate::types::{EngineOutcome, OcrMethod};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Value, json};
use std::collections::HashMap;

pub struct CloudOcrEngine {
    client: reqwest::Client,
    config: CloudOcrConfig,
    api_key: String,
}

impl CloudOcrEngine {
    pub fn from_config(config: CloudOcrConfig, client: reqwest::Client) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            FusionError::validation(format!(
                "environment variable {} is not set",
                config.api_key_env
            ))
        })?;
        Ok(Self {
            client,
            config,
            api_key,
        })
    }

    async fn request(&self, job: &ExtractionJob) -> Result<EngineOutcome> {
        let body = json!({
            "requests": [{
                "image": {"content": BASE64.encode(&job.bytes)},
                "features": [{"type": "DOCUMENT_TEXT_DETECTION"}],
                "imageContext": {"languageHints": job.languages},
            }],
        });

        let response = self
            .client
            .post(&self.config.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| FusionError::engine(format!("cloud OCR request failed: {e}")))?
            .error_for_status()
            .map_err(|e| FusionError::engine(format!("cloud OCR request rejected: {e}")))?;

        let annotation: Value = response
            .json()
            .await
            .map_err(|e| FusionError::engine(format!("cloud OCR response unreadable: {e}")))?;

        parse_annotate_response(&annotation)
    }
}

#[async_trait]
impl OcrEngine for CloudOcrEngine {
    fn name(&self) -> &'static str {
        "cloud_ocr"
    }

    fn method(&self) -> OcrMethod {
        OcrMethod::CloudOcr
    }

    async fn extract(&self, job: &ExtractionJob) -> EngineOutcome {
        match self.request(job).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("cloud OCR failed for {}: {}", job.path.display(), e);
                EngineOutcome::failed(e.to_string())
            }
        }
    }
}

fn parse_annotate_response(annotation: &Value) -> Result<EngineOutcome> {
    let response = &annotation["responses"][0];

    if let Some(message) = response["error"]["message"].as_str() {
        return Err(FusionError::engine(format!("annotation error: {message}")));
    }

    let full_text = &response["fullTextAnnotation"];
    let text = full_text["text"].as_str().unwrap_or("").to_string();

    let empty = Vec::new();
    let pages = full_text["pages"].as_array().unwrap_or(&empty);

    let block_confidences: Vec<f64> = pages
        .iter()
        .flat_map(|page| page["blocks"].as_array().into_iter().flatten())
        .filter_map(|block| block["confidence"].as_f64())
        .collect();
    let confidence = if block_confidences.is_empty() {
        0.0
    } else {
        block_confidences.iter().sum::<f64>() / block_confidences.len() as f64
    };

    let detected_languages: Vec<Value> = pages
        .first()
        .and_then(|page| page["property"]["detectedLanguages"].as_array())
        .into_iter()
        .flatten()
        .filter_map(|lang| lang["languageCode"].as_str())
        .map(|code| Value::String(code.to_string()))
        .collect();

    let mut metadata = HashMap::new();
    metadata.insert(
        "detected_languages".to_string(),
        Value::Array(detected_languages),
    );
    metadata.insert(
        "block_count".to_string(),
        json!(block_confidences.len()),
    );

    Ok(EngineOutcome::success(text, confidence, metadata))
}
