//! Deterministic image normalization for OCR.
//!
//! The pipeline is a pure function of the input pixels and fixed parameters:
//! grayscale conversion, median-filter denoising, histogram equalization for
//! local contrast, and adaptive mean binarization. Engines that prefer the
//! raw image simply ignore the normalized copy.

pub mod layout;

pub use layout::analyze_layout;

use crate::core::config::PreprocessConfig;
use image::{DynamicImage, GrayImage};
use imageproc::contrast::{adaptive_threshold, equalize_histogram};
use imageproc::filter::median_filter;

/// Normalize an image for OCR.
pub fn normalize(image: &DynamicImage, config: &PreprocessConfig) -> GrayImage {
    let gray = image.to_luma8();

    let denoised = if config.median_radius > 0 {
        median_filter(&gray, config.median_radius, config.median_radius)
    } else {
        gray
    };

    let enhanced = if config.equalize_contrast {
        equalize_histogram(&denoised)
    } else {
        denoised
    };

    adaptive_threshold(&enhanced, config.binarize_block_radius.max(1))
}
