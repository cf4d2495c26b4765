//! Placement searches. Every strategy maximises `Evaluation::score` and
//! returns the best mapping it has seen.

pub mod genetic;
pub mod list;
pub mod random;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::StrategyKind;
use crate::mapping::{Evaluation, Evaluator, Mapping};
use crate::Result;

pub use genetic::GeneticSearch;
pub use list::ListSearch;
pub use random::RandomSearch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOptions {
    pub iterations: usize,
    /// Count iterations since the last improvement instead of all iterations.
    pub stop_on_stagnation: bool,
    pub population: usize,
    pub offspring: usize,
    pub seed: Option<u64>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self { iterations: 1000, stop_on_stagnation: false, population: 100, offspring: 25, seed: None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub iteration: usize,
    pub budget: usize,
    pub best_score: f64,
}

type ProgressCallback = Box<dyn Fn(Progress) + Send + Sync>;

/// Cooperative cancellation and progress reporting for a running search.
/// The flag is polled between restarts and generations.
#[derive(Default)]
pub struct SearchControl {
    cancelled: Arc<AtomicBool>,
    progress: Option<ProgressCallback>,
}

impl SearchControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(Progress) + Send + Sync + 'static,
    {
        self.progress = Some(Box::new(callback));
        self
    }

    /// Shared flag; storing `true` stops the search at its next checkpoint.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub fn report(&self, progress: Progress) {
        if let Some(callback) = &self.progress {
            callback(progress);
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub mapping: Mapping,
    pub evaluation: Evaluation,
    pub iterations: usize,
    pub elapsed: Duration,
    /// One score per iteration; what it records depends on the strategy.
    pub scores: Vec<f64>,
}

pub trait MappingStrategy {
    fn name(&self) -> &'static str;

    fn search(&mut self, evaluator: &Evaluator, control: &SearchControl) -> Result<SearchOutcome>;
}

pub fn build_strategy(kind: StrategyKind, options: SearchOptions) -> Box<dyn MappingStrategy + Send> {
    match kind {
        StrategyKind::Random => Box::new(RandomSearch::new(options)),
        StrategyKind::List => Box::new(ListSearch::new(options)),
        StrategyKind::Genetic => Box::new(GeneticSearch::new(options)),
    }
}

pub(crate) fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Iteration budget shared by all strategies.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Budget {
    limit: usize,
    stop_on_stagnation: bool,
    performed: usize,
    since_improvement: usize,
}

impl Budget {
    pub(crate) fn new(options: &SearchOptions) -> Self {
        Self { limit: options.iterations, stop_on_stagnation: options.stop_on_stagnation, performed: 0, since_improvement: 0 }
    }

    fn counter(&self) -> usize {
        if self.stop_on_stagnation {
            self.since_improvement
        } else {
            self.performed
        }
    }

    pub(crate) fn exhausted(&self) -> bool {
        self.counter() >= self.limit
    }

    pub(crate) fn tick(&mut self, improved: bool) {
        self.performed += 1;
        if improved {
            self.since_improvement = 0;
        } else {
            self.since_improvement += 1;
        }
    }

    pub(crate) fn performed(&self) -> usize {
        self.performed
    }

    pub(crate) fn progress(&self, best_score: f64) -> Progress {
        Progress { iteration: self.counter(), budget: self.limit, best_score }
    }
}

/// A mapping together with its evaluation.
#[derive(Debug, Clone)]
pub(crate) struct Candidate {
    pub(crate) mapping: Mapping,
    pub(crate) evaluation: Evaluation,
}

impl Candidate {
    pub(crate) fn new(mapping: Mapping, evaluation: Evaluation) -> Self {
        Self { mapping, evaluation }
    }

    pub(crate) fn score(&self) -> f64 {
        self.evaluation.score()
    }

    /// Takes over `mapping` when it scores strictly better; ties keep self.
    pub(crate) fn offer(&mut self, mapping: &Mapping, evaluation: &Evaluation) -> bool {
        if evaluation.score() > self.score() {
            self.mapping = mapping.clone();
            self.evaluation = evaluation.clone();
            true
        } else {
            false
        }
    }
}
