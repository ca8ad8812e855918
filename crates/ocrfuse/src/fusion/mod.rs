//! Fusion orchestrator.
//!
//! Runs the configured engines concurrently, each bounded by its own
//! timeout, and reconciles their outcomes under the active policy:
//!
//! - **primary-plus-supplement** (default): the primary engine supplies text
//!   and confidence unconditionally; on primary failure the result is empty
//!   text and zero confidence, never another engine's text. Supplemental
//!   engines only enrich metadata, merged in declared order (later engines
//!   overwrite earlier ones on key collision) regardless of which finishes
//!   first.
//! - **best-of-n**: the first arriving outcome whose confidence meets the
//!   threshold wins; otherwise the highest-confidence completed outcome;
//!   otherwise a failed result.
//!
//! A timed-out, panicking, or erroring engine is indistinguishable from one
//! returning an empty zero-confidence outcome. The orchestrator always
//! returns within the configured per-engine budgets.

use crate::core::config::{FusionConfig, FusionPolicy};
use crate::engines::{ExtractionJob, OcrEngine};
use crate::types::{EngineOutcome, OcrMethod};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Text, confidence, and provenance after fusion; the facade attaches
/// layout and cache handling on top.
#[derive(Debug, Clone)]
pub struct FusedOutcome {
    pub text: String,
    pub confidence: f64,
    pub method: OcrMethod,
    pub metadata: HashMap<String, Value>,
}

impl FusedOutcome {
    fn failed(note: impl Into<String>) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert("error".to_string(), Value::String(note.into()));
        Self {
            text: String::new(),
            confidence: 0.0,
            method: OcrMethod::Failed,
            metadata,
        }
    }
}

pub struct FusionOrchestrator {
    policy: FusionPolicy,
    /// Supplies text and confidence under the primary-plus-supplement policy.
    primary: Option<Arc<dyn OcrEngine>>,
    /// Declared merge order; never reordered by arrival.
    supplements: Vec<Arc<dyn OcrEngine>>,
    primary_timeout: Duration,
    supplemental_timeout: Duration,
    confidence_threshold: f64,
    max_workers: usize,
}

impl FusionOrchestrator {
    pub fn new(
        config: &FusionConfig,
        primary: Option<Arc<dyn OcrEngine>>,
        supplements: Vec<Arc<dyn OcrEngine>>,
    ) -> Self {
        Self {
            policy: config.policy,
            primary,
            supplements,
            primary_timeout: config.primary_timeout(),
            supplemental_timeout: config.supplemental_timeout(),
            confidence_threshold: config.confidence_threshold,
            max_workers: config.max_workers.max(1),
        }
    }

    pub fn engine_count(&self) -> usize {
        self.primary.is_some() as usize + self.supplements.len()
    }

    pub async fn run(&self, job: Arc<ExtractionJob>) -> FusedOutcome {
        if self.engine_count() == 0 {
            return FusedOutcome::failed("no OCR engines are configured");
        }
        match self.policy {
            FusionPolicy::PrimaryPlusSupplement => self.run_primary_plus_supplement(job).await,
            FusionPolicy::BestOfN => self.run_best_of_n(job).await,
        }
    }

    async fn run_primary_plus_supplement(&self, job: Arc<ExtractionJob>) -> FusedOutcome {
        let workers = Arc::new(Semaphore::new(self.max_workers));
        let mut tasks = JoinSet::new();

        // Slot 0 is the primary; supplements keep their declared positions.
        if let Some(primary) = &self.primary {
            spawn_engine(
                &mut tasks,
                0,
                Arc::clone(primary),
                Arc::clone(&job),
                self.primary_timeout,
                Arc::clone(&workers),
            );
        }
        for (index, engine) in self.supplements.iter().enumerate() {
            spawn_engine(
                &mut tasks,
                index + 1,
                Arc::clone(engine),
                Arc::clone(&job),
                self.supplemental_timeout,
                Arc::clone(&workers),
            );
        }

        let mut slots: Vec<Option<EngineOutcome>> = vec![None; self.supplements.len() + 1];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((slot, outcome)) => slots[slot] = Some(outcome),
                Err(e) => tracing::error!("engine task failed to join: {}", e),
            }
        }

        let primary_outcome = slots[0]
            .take()
            .unwrap_or_else(|| EngineOutcome::failed("primary engine is not configured"));

        let method = if primary_outcome.is_failure() {
            OcrMethod::Failed
        } else {
            // engine_count() > 0 and slot 0 was filled, so primary is Some.
            self.primary.as_ref().map_or(OcrMethod::Failed, |p| p.method())
        };

        let mut metadata = primary_outcome.metadata;
        for (engine, slot) in self.supplements.iter().zip(slots.into_iter().skip(1)) {
            match slot {
                Some(outcome) if !outcome.is_failure() => {
                    metadata.extend(outcome.metadata);
                }
                Some(outcome) => {
                    tracing::warn!(
                        "supplemental engine {} contributed nothing: {}",
                        engine.name(),
                        outcome.error.as_deref().unwrap_or("unknown failure")
                    );
                }
                None => {}
            }
        }

        FusedOutcome {
            text: primary_outcome.text,
            confidence: primary_outcome.confidence,
            method,
            metadata,
        }
    }

    async fn run_best_of_n(&self, job: Arc<ExtractionJob>) -> FusedOutcome {
        let engines: Vec<Arc<dyn OcrEngine>> = self
            .primary
            .iter()
            .chain(self.supplements.iter())
            .cloned()
            .collect();

        let workers = Arc::new(Semaphore::new(self.max_workers));
        let mut tasks = JoinSet::new();
        for (index, engine) in engines.iter().enumerate() {
            let timeout = if self.primary.is_some() && index == 0 {
                self.primary_timeout
            } else {
                self.supplemental_timeout
            };
            spawn_engine(
                &mut tasks,
                index,
                Arc::clone(engine),
                Arc::clone(&job),
                timeout,
                Arc::clone(&workers),
            );
        }

        let mut completed: Vec<Option<EngineOutcome>> = vec![None; engines.len()];
        while let Some(joined) = tasks.join_next().await {
            let Ok((slot, outcome)) = joined else {
                continue;
            };
            let acceptable = !outcome.is_failure()
                && !outcome.text.is_empty()
                && outcome.confidence >= self.confidence_threshold;
            if acceptable {
                tasks.abort_all();
                return FusedOutcome {
                    text: outcome.text,
                    confidence: outcome.confidence,
                    method: engines[slot].method(),
                    metadata: outcome.metadata,
                };
            }
            completed[slot] = Some(outcome);
        }

        // Nothing met the threshold: fall back to the best completed outcome,
        // preferring the higher-priority engine on confidence ties.
        let best = completed
            .iter()
            .enumerate()
            .filter_map(|(slot, outcome)| outcome.as_ref().map(|o| (slot, o)))
            .filter(|(_, o)| !o.is_failure() && !o.text.is_empty())
            .max_by(|a, b| {
                a.1.confidence
                    .partial_cmp(&b.1.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| b.0.cmp(&a.0))
            });

        match best {
            Some((slot, outcome)) => FusedOutcome {
                text: outcome.text.clone(),
                confidence: outcome.confidence,
                method: engines[slot].method(),
                metadata: outcome.metadata.clone(),
            },
            None => FusedOutcome::failed("all OCR engines failed or timed out"),
        }
    }
}

/// Run one engine under the worker pool with its own deadline.
///
/// The timeout clock starts once a worker permit is held, so queueing behind
/// the pool never eats into an engine's budget.
fn spawn_engine(
    tasks: &mut JoinSet<(usize, EngineOutcome)>,
    slot: usize,
    engine: Arc<dyn OcrEngine>,
    job: Arc<ExtractionJob>,
    timeout: Duration,
    workers: Arc<Semaphore>,
) {
    tasks.spawn(async move {
        let _permit = match workers.acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return (slot, EngineOutcome::failed("worker pool closed")),
        };

        let outcome = match tokio::time::timeout(timeout, engine.extract(job.as_ref())).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(
                    "engine {} timed out after {}s",
                    engine.name(),
                    timeout.as_secs()
                );
                EngineOutcome::failed(format!(
                    "{} timed out after {}s",
                    engine.name(),
                    timeout.as_secs()
                ))
            }
        };
        (slot, outcome)
    });
}
