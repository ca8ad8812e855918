//! ocrfuse - Multi-Engine OCR Fusion Pipeline
//!
//! Given a single document image, ocrfuse extracts text and
//! structural/semantic metadata by running several independent extraction
//! engines concurrently, reconciling their outputs into one result, and
//! caching that result keyed by image content.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use ocrfuse::{FusionConfig, ImageProcessor};
//!
//! # async fn example() -> ocrfuse::Result<()> {
//! let processor = ImageProcessor::new(FusionConfig::default())?;
//! let result = processor.process_image("scan.png").await?;
//! println!("{} (confidence {:.2})", result.text, result.confidence);
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - **Cache Store** (`cache`): content-addressed store of prior results
//! - **Preprocessing** (`preprocess`): deterministic normalization and
//!   contour-based layout analysis
//! - **Engine Adapters** (`engines`): vision-language model, cloud OCR,
//!   local neural OCR, and classical OCR behind one contract
//! - **Fusion Orchestrator** (`fusion`): concurrent fan-out with per-engine
//!   timeouts and a confidence-driven merge policy
//! - **Facade** (`core::processor`): `process_image`, the single entry point
//!
//! Engines are black boxes behind the [`OcrEngine`] contract: a failed or
//! timed-out engine degrades the result instead of failing the call, and
//! "no text found" is a representable outcome, not an error.

#![deny(unsafe_code)]

pub mod cache;
pub mod core;
pub mod engines;
pub mod error;
pub mod fusion;
pub mod preprocess;
pub mod types;

pub use error::{FusionError, Result};
pub use types::{BoundingBox, EngineOutcome, LayoutBlock, LayoutInfo, OcrMethod, OcrResult};

pub use core::config::{
    CloudOcrConfig, FusionConfig, FusionPolicy, LayoutConfig, NeuralConfig, PreprocessConfig,
    TesseractOcrConfig, VisionConfig,
};
pub use core::processor::ImageProcessor;

pub use engines::{ExtractionJob, OcrEngine};
pub use fusion::{FusedOutcome, FusionOrchestrator};
