use std::path::PathBuf;

/// Final outcome of one prompt. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success { path: PathBuf, size_bytes: usize },
    Failure { reason: String },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }
}

#[derive(Debug, Clone)]
pub struct GenerationResult {
    /// Index of the prompt in the original batch, not completion order.
    pub index: usize,
    pub outcome: Outcome,
}

/// Progress of one batch run. Results are appended in completion order;
/// `completed` never exceeds `total`.
#[derive(Debug, Clone)]
pub struct BatchState {
    pub total: usize,
    pub completed: usize,
    pub results: Vec<GenerationResult>,
}

impl BatchState {
    pub fn new(total: usize) -> Self {
        BatchState {
            total,
            completed: 0,
            results: Vec::with_capacity(total),
        }
    }

    pub fn record(&mut self, result: GenerationResult) {
        debug_assert!(self.completed < self.total);
        self.results.push(result);
        self.completed += 1;
    }

    pub fn success_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.outcome.is_success())
            .count()
    }

    pub fn failure_count(&self) -> usize {
        self.results.len() - self.success_count()
    }

    pub fn is_complete(&self) -> bool {
        self.completed == self.total
    }
}
