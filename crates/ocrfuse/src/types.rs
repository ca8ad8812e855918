//! Core data types shared across the pipeline.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Which engine produced the text of an [`OcrResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcrMethod {
    /// Multimodal vision-language model (primary engine).
    PrimaryVision,
    /// Hosted document-text-detection service.
    CloudOcr,
    /// Local neural detection + recognition model.
    NeuralLocal,
    /// Classical local OCR engine.
    TraditionalLocal,
    /// No engine produced usable text.
    Failed,
}

impl OcrMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            OcrMethod::PrimaryVision => "primary_vision",
            OcrMethod::CloudOcr => "cloud_ocr",
            OcrMethod::NeuralLocal => "neural_local",
            OcrMethod::TraditionalLocal => "traditional_local",
            OcrMethod::Failed => "failed",
        }
    }
}

/// Axis-aligned bounding box in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Width / height, or 0.0 for degenerate boxes.
    pub fn aspect_ratio(&self) -> f64 {
        if self.height == 0 {
            0.0
        } else {
            self.width as f64 / self.height as f64
        }
    }
}

/// A classified region found by the layout analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutBlock {
    pub bbox: BoundingBox,
    /// Fixed heuristic confidence for the block class, not a measured score.
    pub confidence: f64,
}

/// Structural hints for one image: best-effort, not ground truth.
///
/// Produced once per image by the preprocessing stage, independent of which
/// OCR engine wins the text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayoutInfo {
    pub tables: Vec<LayoutBlock>,
    pub columns: Vec<LayoutBlock>,
    pub images: Vec<LayoutBlock>,
    pub text_blocks: Vec<LayoutBlock>,
}

impl LayoutInfo {
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
            && self.columns.is_empty()
            && self.images.is_empty()
            && self.text_blocks.is_empty()
    }
}

/// Final unified result of processing one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrResult {
    /// Extracted text. Empty implies `confidence == 0.0`.
    pub text: String,
    /// Confidence in [0, 1].
    pub confidence: f64,
    /// Engine that supplied the text.
    pub method: OcrMethod,
    /// Structural hints, when layout detection was enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout: Option<LayoutInfo>,
    /// Open-ended enrichment: tags, summary, category, bounding boxes,
    /// word counts, error notes.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl OcrResult {
    /// A well-formed result for the case where no engine produced text.
    pub fn failed(note: impl Into<String>) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert(
            "error".to_string(),
            serde_json::Value::String(note.into()),
        );
        Self {
            text: String::new(),
            confidence: 0.0,
            method: OcrMethod::Failed,
            layout: None,
            metadata,
        }
    }
}

/// Per-adapter outcome, before fusion.
///
/// Never carries `layout` or `method`; those are assigned by the
/// orchestrator and facade.
#[derive(Debug, Clone, Default)]
pub struct EngineOutcome {
    pub text: String,
    pub confidence: f64,
    pub metadata: HashMap<String, serde_json::Value>,
    /// Set when the adapter failed internally; the text/confidence are then
    /// empty/zero and `metadata` carries an error note.
    pub error: Option<String>,
}

impl EngineOutcome {
    pub fn success(
        text: String,
        confidence: f64,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Self {
        let confidence = if text.is_empty() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self {
            text,
            confidence,
            metadata,
            error: None,
        }
    }

    /// Outcome for an adapter that failed or timed out.
    pub fn failed(note: impl Into<String>) -> Self {
        let note = note.into();
        let mut metadata = HashMap::new();
        metadata.insert(
            "error".to_string(),
            serde_json::Value::String(note.clone()),
        );
        Self {
            text: String::new(),
            confidence: 0.0,
            metadata,
            error: Some(note),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}
