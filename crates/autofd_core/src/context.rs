//! Per-run logging and timing context passed explicitly through the pipeline.

use crate::error::Result;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{info, info_span, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageTiming {
    pub stage: String,
    pub elapsed: Duration,
    pub succeeded: bool,
}

/// Collects stage timings for one generation run. Timings are informational
/// and never feed back into the generated output.
#[derive(Debug, Clone, Default)]
pub struct GenerationContext {
    run: String,
    timings: Vec<StageTiming>,
}

impl GenerationContext {
    pub fn new(run: impl Into<String>) -> Self {
        Self {
            run: run.into(),
            timings: Vec::new(),
        }
    }

    pub fn run(&self) -> &str {
        &self.run
    }

    /// Runs `f` inside a `stage` span and records how long it took.
    pub fn stage<T>(&mut self, stage: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let span = info_span!("stage", run = %self.run, stage);
        let _guard = span.enter();
        let start = Instant::now();
        let result = f();
        let elapsed = start.elapsed();
        match &result {
            Ok(_) => info!(elapsed_ms = elapsed.as_secs_f64() * 1e3, "stage complete"),
            Err(error) => warn!(%error, "stage failed"),
        }
        self.timings.push(StageTiming {
            stage: stage.to_string(),
            elapsed,
            succeeded: result.is_ok(),
        });
        result
    }

    pub fn timings(&self) -> &[StageTiming] {
        &self.timings
    }

    pub fn total(&self) -> Duration {
        self.timings.iter().map(|t| t.elapsed).sum()
    }
}
