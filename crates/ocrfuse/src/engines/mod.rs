//! Engine adapters.
//!
//! Every OCR/vision backend sits behind [`OcrEngine`]: one async `extract`
//! call that never errors across the adapter boundary. Internal failures are
//! caught and converted into an [`EngineOutcome`] with empty text, zero
//! confidence, and an error note in metadata, so the orchestrator can treat
//! all engines uniformly.
//!
//! Adapters are stateless per call. Client/session state (HTTP clients,
//! loaded models) is created once at construction and safely shared across
//! concurrent calls; backends whose handles are not concurrency-safe
//! serialize access internally.

pub mod cloud;
pub mod neural;
pub mod tesseract;
pub mod vision;

pub use cloud::CloudOcrEngine;
pub use neural::NeuralEngine;
pub use tesseract::TesseractEngine;
pub use vision::VisionEngine;

use crate::types::{EngineOutcome, OcrMethod};
use async_trait::async_trait;
use image::{DynamicImage, GrayImage};
use std::path::PathBuf;

/// Per-call input shared by all engines.
///
/// Carries the original bytes, the decoded image, and the normalized copy
/// (when preprocessing is enabled) so each adapter can pick the input it
/// works best on: remote engines send the original bytes, local engines
/// prefer the normalized image.
#[derive(Debug, Clone)]
pub struct ExtractionJob {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
    pub image: DynamicImage,
    pub preprocessed: Option<GrayImage>,
    /// Ordered language preference, ISO-639-1 codes.
    pub languages: Vec<String>,
}

impl ExtractionJob {
    /// The image local OCR engines should run on.
    pub fn ocr_image(&self) -> DynamicImage {
        match &self.preprocessed {
            Some(gray) => DynamicImage::ImageLuma8(gray.clone()),
            None => self.image.clone(),
        }
    }
}

/// Uniform contract over heterogeneous OCR/vision backends.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Stable identifier used in logs and metadata keys.
    fn name(&self) -> &'static str;

    /// Provenance tag assigned when this engine's text wins.
    fn method(&self) -> OcrMethod;

    /// Extract text and metadata from the job's image.
    ///
    /// Must not fail: errors become failed outcomes.
    async fn extract(&self, job: &ExtractionJob) -> EngineOutcome;
}

/// Map ISO-639-1 codes to Tesseract traineddata names.
///
/// Codes that are already three letters pass through unchanged; unknown
/// two-letter codes are dropped. An empty result falls back to `eng`.
pub(crate) fn tesseract_languages(languages: &[String]) -> String {
    let mapped: Vec<&str> = languages
        .iter()
        .filter_map(|lang| match lang.as_str() {
            "ja" => Some("jpn"),
            "en" => Some("eng"),
            "de" => Some("deu"),
            "fr" => Some("fra"),
            "es" => Some("spa"),
            "it" => Some("ita"),
            "pt" => Some("por"),
            "ko" => Some("kor"),
            "zh" => Some("chi_sim"),
            "ru" => Some("rus"),
            other if other.len() == 3 => Some(other),
            _ => None,
        })
        .collect();

    if mapped.is_empty() {
        "eng".to_string()
    } else {
        mapped.join("+")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn langs(codes: &[&str]) -> Vec<String> {
        codes.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_tesseract_language_mapping() {
        assert_eq!(tesseract_languages(&langs(&["ja", "en"])), "jpn+eng");
        assert_eq!(tesseract_languages(&langs(&["zh"])), "chi_sim");
    }

    #[test]
    fn test_three_letter_codes_pass_through() {
        assert_eq!(tesseract_languages(&langs(&["eng", "deu"])), "eng+deu");
    }

    #[test]
    fn test_unknown_codes_fall_back_to_eng() {
        assert_eq!(tesseract_languages(&langs(&["xx"])), "eng");
        assert_eq!(tesseract_languages(&[]), "eng");
    }

    #[test]
    fn test_ocr_image_prefers_preprocessed() {
        let image = DynamicImage::new_rgb8(32, 16);
        let gray = GrayImage::new(8, 8);
        let job = ExtractionJob {
            path: PathBuf::from("test.png"),
            bytes: vec![],
            image: image.clone(),
            preprocessed: Some(gray),
            languages: langs(&["en"]),
        };
        assert_eq!(job.ocr_image().to_luma8().dimensions(), (8, 8));

        let job = ExtractionJob {
            preprocessed: None,
            ..job
        };
        assert_eq!(job.ocr_image().to_luma8().dimensions(), (32, 16));
    }
}
