use crate::error::Result;
use crate::metrics::StageMetrics;
use std::time::Instant;

/// Trait for a processing stage in the pipeline
pub trait Stage: Send {
    type Input;
    type Output;

    /// Process one input and produce 0, 1 or multiple outputs
    fn process(&mut self, input: Self::Input) -> Result<Vec<Self::Output>>;

    /// Called before the stage starts processing
    fn on_start(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called once the stage has seen all of its inputs
    fn on_shutdown(&mut self) -> Result<()> {
        Ok(())
    }

    /// Get a human-readable name for this stage
    fn name(&self) -> &str {
        "stage"
    }
}

/// Drives one stage instance over one partition of inputs
pub struct StageRunner {
    metrics: StageMetrics,
}

impl StageRunner {
    /// Create a runner reporting into the given (shared) metrics
    pub fn new(metrics: StageMetrics) -> Self {
        Self { metrics }
    }

    /// Get a reference to the metrics
    pub fn metrics(&self) -> &StageMetrics {
        &self.metrics
    }

    /// Run the stage over every input and collect its outputs.
    ///
    /// Stops at the first error; `on_shutdown` is only called when every
    /// input was processed.
    pub fn run<S, I>(&self, stage: &mut S, inputs: I) -> Result<Vec<S::Output>>
    where
        S: Stage,
        I: IntoIterator<Item = S::Input>,
    {
        let start = Instant::now();
        stage.on_start()?;

        let mut outputs = Vec::new();
        for input in inputs {
            self.metrics.record_in();
            let produced = stage.process(input)?;
            self.metrics.record_out(produced.len() as u64);
            outputs.extend(produced);
        }

        stage.on_shutdown()?;
        self.metrics.record_task(start);
        log::debug!(
            "Stage {} finished a task with {} outputs in {:?}",
            stage.name(),
            outputs.len(),
            start.elapsed()
        );
        Ok(outputs)
    }
}
