//! Primary multimodal vision engine.
//!
//! Sends the raw image plus a structured instruction to a vision-capable
//! generative model behind an OpenAI-compatible chat completions API and
//! requests a machine-parseable JSON response: verbatim transcription, a
//! short summary, derived keyword tags, and a coarse category label. The
//! transcription becomes the outcome text; everything else lands in
//! metadata.

use super::{ExtractionJob, OcrEngine};
use crate::core::config::VisionConfig;
use crate::error::{FusionError, Result};
use crate::types::{EngineOutcome, OcrMethod};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Value, json};
use std::collections::HashMap;

/// The model does not emit a calibrated confidence score; successful
/// transcriptions are assigned this fixed value.
const PRIMARY_CONFIDENCE: f64 = 0.95;

const INSTRUCTION: &str = "Extract the following from this image and return it \
as a JSON object.\n\
1. `extracted_text`: every piece of text in the image, transcribed verbatim, \
respecting the original layout and paragraphs.\n\
2. `summary`: a 2-3 sentence summary of the visual content.\n\
3. `tags`: 10-15 keywords or tags derived from the text and the visual \
content, chosen to improve search recall.\n\
4. `category`: the coarse category this image belongs to (for example: \
document, landscape, person, chart).";

pub struct VisionEngine {
    client: reqwest::Client,
    config: VisionConfig,
    api_key: String,
}

impl VisionEngine {
    /// Fails when the configured API key variable is unset, so the caller
    /// can skip the engine instead of failing every request later.
    pub fn from_config(config: VisionConfig, client: reqwest::Client) -> Result<Self> {
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
        let mime = image::guess_format(&job.bytes)
            .map(|f| f.to_mime_type())
            .unwrap_or("image/jpeg");
        let data_url = format!("data:{};base64,{}", mime, BASE64.encode(&job.bytes));

        let body = json!({
            "model": self.config.model,
            "response_format": {"type": "json_object"},
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "text", "text": INSTRUCTION},
                    {"type": "image_url", "image_url": {"url": data_url}},
                ],
            }],
            "max_tokens": self.config.max_tokens,
        });

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| FusionError::engine(format!("vision request failed: {e}")))?
            .error_for_status()
            .map_err(|e| FusionError::engine(format!("vision request rejected: {e}")))?;

        let completion: Value = response
            .json()
            .await
            .map_err(|e| FusionError::engine(format!("vision response unreadable: {e}")))?;

        let content = completion["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| FusionError::engine("vision response missing message content"))?;
        let payload: Value = serde_json::from_str(content)
            .map_err(|e| FusionError::engine(format!("vision payload is not valid JSON: {e}")))?;

        Ok(parse_vision_payload(&payload, &self.config.model))
    }
}

#[async_trait]
impl OcrEngine for VisionEngine {
    fn name(&self) -> &'static str {
        "vision"
    }

    fn method(&self) -> OcrMethod {
        OcrMethod::PrimaryVision
    }

    async fn extract(&self, job: &ExtractionJob) -> EngineOutcome {
        match self.request(job).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("vision engine failed for {}: {}", job.path.display(), e);
                EngineOutcome::failed(e.to_string())
            }
        }
    }
}

/// Turn the model's JSON payload into an outcome. Absent fields degrade to
/// empty defaults rather than failures.
fn parse_vision_payload(payload: &Value, model: &str) -> EngineOutcome {
    let text = payload["extracted_text"].as_str().unwrap_or("").to_string();

    let mut metadata = HashMap::new();
    metadata.insert(
        "summary".to_string(),
        Value::String(payload["summary"].as_str().unwrap_or("").to_string()),
    );
    metadata.insert(
        "tags".to_string(),
        payload
            .get("tags")
            .filter(|v| v.is_array())
            .cloned()
            .unwrap_or_else(|| json!([])),
    );
    metadata.insert(
        "category".to_string(),
        Value::String(payload["category"].as_str().unwrap_or("unknown").to_string()),
    );
    metadata.insert("model".to_string(), Value::String(model.to_string()));

    EngineOutcome::success(text, PRIMARY_CONFIDENCE, metadata)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_payload_full() {
        let payload = json!({
            "extracted_text": "INVOICE #2024-001\nTotal: 1,200 JPY",
            "summary": "A scanned invoice.",
            "tags": ["invoice", "receipt", "2024"],
            "category": "document",
        });

        let outcome = parse_vision_payload(&payload, "gpt-5-mini");
        assert!(outcome.text.contains("INVOICE #2024-001"));
        assert_eq!(outcome.confidence, PRIMARY_CONFIDENCE);
        assert_eq!(
            outcome.metadata.get("category").unwrap(),
            &json!("document")
        );
        assert_eq!(
            outcome.metadata.get("tags").unwrap(),
            &json!(["invoice", "receipt", "2024"])
        );
        assert_eq!(outcome.metadata.get("model").unwrap(), &json!("gpt-5-mini"));
    }

    #[test]
    fn test_parse_payload_missing_fields() {
        let outcome = parse_vision_payload(&json!({}), "gpt-5-mini");
        assert!(outcome.text.is_empty());
        // Empty transcription means zero confidence, even for the primary.
        assert_eq!(outcome.confidence, 0.0);
        assert_eq!(outcome.metadata.get("category").unwrap(), &json!("unknown"));
        assert_eq!(outcome.metadata.get("tags").unwrap(), &json!([]));
    }

    #[test]
    fn test_parse_payload_tags_not_an_array() {
        let payload = json!({"extracted_text": "x", "tags": "invoice"});
        let outcome = parse_vision_payload(&payload, "m");
        assert_eq!(outcome.metadata.get("tags").unwrap(), &json!([]));
    }

    #[test]
    fn test_from_config_requires_api_key() {
        let config = VisionConfig {
            api_key_env: "OCRFUSE_TEST_MISSING_KEY".to_string(),
            ..Default::default()
        };
        let result = VisionEngine::from_config(config, reqwest::Client::new());
        assert!(result.is_err());
    }
}
