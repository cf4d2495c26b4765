use std::time::Instant;

use log::{debug, info};

use super::{seeded_rng, Budget, Candidate, MappingStrategy, SearchControl, SearchOptions, SearchOutcome};
use crate::mapping::{Evaluator, Mapping};
use crate::Result;

/// Uniform random sampling of placements.
pub struct RandomSearch {
    options: SearchOptions,
}

impl RandomSearch {
    pub fn new(options: SearchOptions) -> Self {
        Self { options }
    }
}

impl MappingStrategy for RandomSearch {
    fn name(&self) -> &'static str {
        "RandomMapping"
    }

    fn search(&mut self, evaluator: &Evaluator, control: &SearchControl) -> Result<SearchOutcome> {
        let start = Instant::now();
        let mut rng = seeded_rng(self.options.seed);
        let mut budget = Budget::new(&self.options);
        let (rows, columns, cores) = (evaluator.rows(), evaluator.columns(), evaluator.num_cores());

        let first = Mapping::random(rows, columns, cores, &mut rng)?;
        let evaluation = evaluator.evaluate(&first)?;
        let mut best = Candidate::new(first, evaluation);
        let mut scores = Vec::new();

        while !budget.exhausted() && !control.is_cancelled() {
            let mapping = Mapping::random(rows, columns, cores, &mut rng)?;
            let evaluation = evaluator.evaluate(&mapping)?;
            scores.push(evaluation.score());

            let improved = best.offer(&mapping, &evaluation);
            if improved {
                debug!("iteration {}: new best score {:.3}", budget.performed(), best.score());
            }
            budget.tick(improved);
            control.report(budget.progress(best.score()));
        }

        info!("Random search finished after {} iterations, best score {:.3}", budget.performed(), best.score());
        Ok(SearchOutcome {
            mapping: best.mapping,
            evaluation: best.evaluation,
            iterations: budget.performed(),
            elapsed: start.elapsed(),
            scores,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Objective;
    use crate::strategy::tests::{evaluator, options};

    #[test]
    fn keeps_the_best_sample() {
        let evaluator = evaluator(Objective::PowerLoss);
        let outcome = RandomSearch::new(options(50)).search(&evaluator, &SearchControl::new()).unwrap();
        assert_eq!(outcome.iterations, 50);
        assert_eq!(outcome.scores.len(), 50);
        let best = outcome.evaluation.score();
        assert!(outcome.scores.iter().all(|&score| score <= best));
    }

    #[test]
    fn seeded_runs_repeat() {
        let evaluator = evaluator(Objective::LaserPower);
        let first = RandomSearch::new(options(20)).search(&evaluator, &SearchControl::new()).unwrap();
        let second = RandomSearch::new(options(20)).search(&evaluator, &SearchControl::new()).unwrap();
        assert_eq!(first.mapping, second.mapping);
        assert_eq!(first.scores, second.scores);
    }

    #[test]
    fn stagnation_budget_runs_at_least_the_limit() {
        let evaluator = evaluator(Objective::PowerLoss);
        let options = SearchOptions { stop_on_stagnation: true, ..options(10) };
        let outcome = RandomSearch::new(options).search(&evaluator, &SearchControl::new()).unwrap();
        assert!(outcome.iterations >= 10);
    }
}
