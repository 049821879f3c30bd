//! Batch ingestion: inputs → fetch or read → extract → ordered results →
//! conflicts.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use tracing::{debug, info, instrument, warn};
use url::Url;

use absorber_acquire::{BrowserFallback, FetchOutcome, Fetcher};
use absorber_extract::{Extractor, run_ordered};
use absorber_shared::{
    AbsorberError, ConflictConfig, FetchResult, Input, InputEntry, InputOutcome, InputSpec,
    PipelineConfig, PipelineResult,
};

use crate::conflicts::{ConflictStrategy, HeuristicDetector};

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called as each input finishes, in completion order.
    fn input_done(
        &self,
        index: usize,
        raw: &str,
        outcome: &InputOutcome,
        completed: usize,
        total: usize,
    );
    /// Called once the batch result is complete.
    fn finished(&self, result: &PipelineResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn input_done(&self, _: usize, _: &str, _: &InputOutcome, _: usize, _: usize) {}
    fn finished(&self, _result: &PipelineResult) {}
}

/// Everything one input task needs.
struct Stages {
    fetcher: Arc<Fetcher>,
    browser: Option<Arc<BrowserFallback>>,
    extractor: Arc<Extractor>,
}

/// Runs a batch of inputs on a bounded pool and returns results in input
/// order.
pub struct Orchestrator {
    config: PipelineConfig,
    stages: Arc<Stages>,
    detector: Arc<dyn ConflictStrategy>,
}

impl Orchestrator {
    pub fn new(
        config: PipelineConfig,
        fetcher: Arc<Fetcher>,
        extractor: Arc<Extractor>,
        conflicts: &ConflictConfig,
    ) -> Self {
        Self {
            config,
            stages: Arc::new(Stages {
                fetcher,
                browser: None,
                extractor,
            }),
            detector: Arc::new(HeuristicDetector::new(conflicts)),
        }
    }

    /// Enable escalation of soft-blocked and failed fetches.
    pub fn with_browser(mut self, browser: Arc<BrowserFallback>) -> Self {
        self.stages = Arc::new(Stages {
            fetcher: self.stages.fetcher.clone(),
            browser: Some(browser),
            extractor: self.stages.extractor.clone(),
        });
        self
    }

    pub fn with_detector(mut self, detector: Arc<dyn ConflictStrategy>) -> Self {
        self.detector = detector;
        self
    }

    /// Process every input. Never fails as a whole: each input's failure is
    /// recorded as its own result.
    #[instrument(skip_all, fields(inputs = inputs.len(), workers = self.config.workers))]
    pub async fn run(
        &self,
        inputs: Vec<InputSpec>,
        progress: Arc<dyn ProgressReporter>,
    ) -> PipelineResult {
        let start = Instant::now();
        let total = inputs.len();
        info!("starting ingestion");
        progress.phase("Ingesting inputs");

        let specs = inputs.clone();
        let stages = self.stages.clone();
        let reporter = progress.clone();
        let completed = Arc::new(AtomicUsize::new(0));

        let outcomes = run_ordered(inputs, self.config.workers, move |index, spec| {
            let stages = stages.clone();
            let reporter = reporter.clone();
            let completed = completed.clone();
            async move {
                let outcome = stages.process(&spec.input).await;
                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                reporter.input_done(index, &spec.raw, &outcome, done, total);
                outcome
            }
        })
        .await;

        let entries: Vec<InputEntry> = specs
            .into_iter()
            .zip(outcomes)
            .map(|(spec, outcome)| {
                let outcome = outcome.unwrap_or_else(|panic| {
                    warn!(input = %spec.raw, %panic, "input task panicked");
                    InputOutcome::Failed {
                        message: format!("[INTERNAL ERROR: {panic}]"),
                    }
                });
                InputEntry {
                    raw: spec.raw,
                    input: spec.input,
                    outcome,
                }
            })
            .collect();

        progress.phase("Detecting conflicts");
        let texts: Vec<String> = entries
            .iter()
            .map(|entry| match &entry.outcome {
                InputOutcome::Document(doc) => doc.body.clone(),
                InputOutcome::Failed { .. } => String::new(),
            })
            .collect();
        let conflicts = self.detector.detect(&texts);

        let result = PipelineResult { entries, conflicts };
        progress.finished(&result);

        let failed = result
            .entries
            .iter()
            .filter(|e| matches!(e.outcome, InputOutcome::Failed { .. }))
            .count();
        info!(
            failed,
            conflicts = result.conflicts.len(),
            elapsed_ms = start.elapsed().as_millis(),
            "ingestion complete"
        );
        result
    }

    /// Close the browser session, if one was opened.
    pub async fn shutdown(&self) {
        if let Some(browser) = &self.stages.browser {
            browser.close().await;
        }
    }
}

impl Stages {
    async fn process(&self, input: &Input) -> InputOutcome {
        let extracted = match input {
            Input::LocalPath(path) => self.extractor.extract_path(path).await,
            Input::Url(url) => match self.acquire(url).await {
                Ok(fetched) => self.extractor.extract_remote(fetched).await,
                Err(message) => {
                    warn!(%url, %message, "acquisition failed");
                    return InputOutcome::Failed { message };
                }
            },
        };

        match extracted {
            Ok(doc) => InputOutcome::Document(doc),
            Err(e) => {
                warn!(input = %input.label(), error = %e, "extraction failed");
                InputOutcome::Failed { message: e.marker() }
            }
        }
    }

    /// Direct fetch, escalating to the browser at most once. `Err` carries
    /// the marker that replaces the input's text.
    async fn acquire(&self, url: &Url) -> Result<FetchResult, String> {
        let outcome = match self.fetcher.fetch(url).await {
            FetchOutcome::Success(fetched) => return Ok(fetched),
            FetchOutcome::TooLarge { size, limit } => {
                return Err(AbsorberError::SizeLimitExceeded { size, limit }.marker());
            }
            other => other,
        };

        let reason = outcome.describe();
        let Some(browser) = &self.browser else {
            return Err(format!("[FETCH FAILED: {reason}; browser fallback: disabled]"));
        };

        info!(%url, %reason, "escalating to browser");
        browser
            .fetch_via_browser(url)
            .await
            .inspect(|fetched| debug!(bytes = fetched.body.len(), "browser render succeeded"))
            .map_err(|e| format!("[FETCH FAILED: {reason}; browser fallback: {e}]"))
    }
}
