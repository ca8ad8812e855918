//! Classical local OCR engine (Tesseract).
//!
//! Fallback-quality extraction with no model downloads: initializes a
//! Tesseract API handle per call, feeds it the normalized image as RGB8, and
//! derives confidence from the per-word scores in the TSV output, scaled
//! into [0, 1].

use super::{ExtractionJob, OcrEngine, tesseract_languages};
use crate::core::config::TesseractOcrConfig;
use crate::error::{FusionError, Result};
use crate::types::{EngineOutcome, OcrMethod};
use async_trait::async_trait;
use image::DynamicImage;
use kreuzberg_tesseract::{TessPageSegMode, TesseractAPI};
use serde_json::json;
use std::collections::HashMap;
use std::path::Path;

pub struct TesseractEngine {
    config: TesseractOcrConfig,
}

impl TesseractEngine {
    pub fn new(config: TesseractOcrConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl OcrEngine for TesseractEngine {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    fn method(&self) -> OcrMethod {
        OcrMethod::TraditionalLocal
    }

    async fn extract(&self, job: &ExtractionJob) -> EngineOutcome {
        let config = self.config.clone();
        let language = tesseract_languages(&job.languages);
        let image = job.ocr_image();

        let handle = tokio::task::spawn_blocking(move || run_ocr(&config, &language, &image));
        match handle.await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                tracing::error!("tesseract failed for {}: {}", job.path.display(), e);
                EngineOutcome::failed(e.to_string())
            }
            Err(e) => {
                tracing::error!("tesseract task panicked: {}", e);
                EngineOutcome::failed(format!("tesseract task panicked: {e}"))
            }
        }
    }
}

fn run_ocr(
    config: &TesseractOcrConfig,
    language: &str,
    image: &DynamicImage,
) -> Result<EngineOutcome> {
    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();
    let bytes_per_pixel = 3i32;

    let api = TesseractAPI::new();
    let tessdata = resolve_tessdata_path();

    api.init(&tessdata, language)
        .map_err(|e| FusionError::engine(format!("failed to initialize language '{language}': {e}")))?;
    api.set_page_seg_mode(TessPageSegMode::from_int(config.psm as i32))
        .map_err(|e| FusionError::engine(format!("failed to set page segmentation mode: {e}")))?;
    api.set_image(
        rgb.as_raw(),
        width as i32,
        height as i32,
        bytes_per_pixel,
        width as i32 * bytes_per_pixel,
    )
    .map_err(|e| FusionError::engine(format!("failed to set image: {e}")))?;

    api.recognize()
        .map_err(|e| FusionError::engine(format!("recognition failed: {e}")))?;

    let text = api
        .get_utf8_text()
        .map_err(|e| FusionError::engine(format!("failed to read text: {e}")))?;
    let tsv = api
        .get_tsv_text(0)
        .map_err(|e| FusionError::engine(format!("failed to read TSV output: {e}")))?;

    let (confidence, word_count) = word_confidence_from_tsv(&tsv, config.min_word_confidence);

    let mut metadata = HashMap::new();
    metadata.insert("word_count".to_string(), json!(word_count));
    metadata.insert("ocr_language".to_string(), json!(language));

    Ok(EngineOutcome::success(
        text.trim().to_string(),
        confidence,
        metadata,
    ))
}

/// TESSDATA_PREFIX when set, otherwise the usual install locations.
fn resolve_tessdata_path() -> String {
    if let Ok(path) = std::env::var("TESSDATA_PREFIX") {
        return path;
    }
    [
        "/usr/share/tesseract-ocr/5/tessdata",
        "/usr/share/tesseract-ocr/4/tessdata",
        "/usr/share/tessdata",
        "/usr/local/share/tessdata",
        "/opt/homebrew/share/tessdata",
    ]
    .iter()
    .find(|p| Path::new(p).exists())
    .map(|p| (*p).to_string())
    .unwrap_or_default()
}

/// Mean per-word confidence from Tesseract TSV output, scaled into [0, 1],
/// plus the word count.
///
/// TSV rows: level, page, block, paragraph, line, word, left, top, width,
/// height, conf, text. Word-level rows have level 5; rows with negative
/// confidence are non-word structure.
fn word_confidence_from_tsv(tsv: &str, min_word_confidence: f64) -> (f64, usize) {
    let mut confidences = Vec::new();
    let mut word_count = 0usize;

    for line in tsv.lines().skip(1) {
        let fields: Vec<&str> = line.trim().split('\t').collect();
        if fields.len() < 12 {
            continue;
        }
        if fields[0].parse::<u32>().unwrap_or(0) != 5 {
            continue;
        }
        if fields[11].trim().is_empty() {
            continue;
        }
        word_count += 1;

        let conf = fields[10].parse::<f64>().unwrap_or(-1.0);
        if conf >= 0.0 && conf >= min_word_confidence {
            confidences.push(conf);
        }
    }

    if confidences.is_empty() {
        (0.0, word_count)
    } else {
        let mean = confidences.iter().sum::<f64>() / confidences.len() as f64;
        ((mean / 100.0).clamp(0.0, 1.0), word_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TSV_HEADER: &str =
        "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    fn tsv(rows: &[&str]) -> String {
        let mut out = TSV_HEADER.to_string();
        for row in rows {
            out.push('\n');
            out.push_str(row);
        }
        out
    }

    #[test]
    fn test_word_confidence_mean() {
        let data = tsv(&[
            "5\t1\t0\t0\t0\t0\t100\t50\t80\t30\t90.0\tHello",
            "5\t1\t0\t0\t0\t1\t190\t50\t70\t30\t70.0\tWorld",
        ]);
        let (confidence, words) = word_confidence_from_tsv(&data, 0.0);
        assert!((confidence - 0.8).abs() < 1e-9);
        assert_eq!(words, 2);
    }

    #[test]
    fn test_non_word_rows_ignored() {
        let data = tsv(&[
            "1\t1\t0\t0\t0\t0\t0\t0\t640\t480\t-1\t",
            "4\t1\t0\t0\t1\t0\t0\t0\t640\t40\t-1\t",
            "5\t1\t0\t0\t1\t0\t100\t50\t80\t30\t88.0\tInvoice",
        ]);
        let (confidence, words) = word_confidence_from_tsv(&data, 0.0);
        assert!((confidence - 0.88).abs() < 1e-9);
        assert_eq!(words, 1);
    }

    #[test]
    fn test_min_word_confidence_filters_average() {
        let data = tsv(&[
            "5\t1\t0\t0\t0\t0\t100\t50\t80\t30\t90.0\tclear",
            "5\t1\t0\t0\t0\t1\t190\t50\t70\t30\t10.0\tsmudge",
        ]);
        let (confidence, words) = word_confidence_from_tsv(&data, 50.0);
        assert!((confidence - 0.9).abs() < 1e-9);
        // The low-confidence word is still counted, just not averaged.
        assert_eq!(words, 2);
    }

    #[test]
    fn test_empty_tsv() {
        let (confidence, words) = word_confidence_from_tsv(TSV_HEADER, 0.0);
        assert_eq!(confidence, 0.0);
        assert_eq!(words, 0);
    }
}
