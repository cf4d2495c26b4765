use std::time::Instant;

use itertools::Itertools;
use log::{debug, info};
use rayon::prelude::*;

use super::{seeded_rng, Budget, Candidate, MappingStrategy, SearchControl, SearchOptions, SearchOutcome};
use crate::calculate_chunk_size;
use crate::config::Objective;
use crate::mapping::{Evaluation, Evaluator, Mapping};
use crate::Result;

/// Restarted steepest-ascent over swaps that move a tile involved in the
/// worst-case communication.
pub struct ListSearch {
    options: SearchOptions,
}

impl ListSearch {
    pub fn new(options: SearchOptions) -> Self {
        Self { options }
    }

    /// Applies improving swaps from `mapping` until none is left.
    pub fn local_optimum(evaluator: &Evaluator, mapping: Mapping) -> Result<(Mapping, Evaluation)> {
        let evaluation = evaluator.evaluate(&mapping)?;
        Self::descend(evaluator, Candidate::new(mapping, evaluation))
    }

    fn descend(evaluator: &Evaluator, mut current: Candidate) -> Result<(Mapping, Evaluation)> {
        let num_tiles = current.mapping.num_tiles();
        // An evaluation visits every pair of communications
        let weight = evaluator.application().tasks().len().pow(2);
        loop {
            let moves: Vec<(usize, usize)> = neighbourhood(&current.mapping, &current.evaluation)
                .into_iter()
                .flat_map(|tile| (0..num_tiles).filter(move |&other| other != tile).map(move |other| (tile, other)))
                .collect();
            if moves.is_empty() {
                break;
            }

            let evaluations = moves
                .par_iter()
                .with_min_len(calculate_chunk_size(moves.len(), weight))
                .map(|&(a, b)| {
                    let mut mapping = current.mapping.clone();
                    mapping.swap_tiles(a, b);
                    evaluator.evaluate(&mapping)
                })
                .collect::<Result<Vec<_>>>()?;

            // First strictly better move wins ties.
            let mut chosen = None;
            let mut best_score = current.score();
            for (index, evaluation) in evaluations.iter().enumerate() {
                if evaluation.score() > best_score {
                    best_score = evaluation.score();
                    chosen = Some(index);
                }
            }
            let Some(index) = chosen else { break };

            let (a, b) = moves[index];
            current.mapping.swap_tiles(a, b);
            current.evaluation = evaluations[index].clone();
        }
        Ok((current.mapping, current.evaluation))
    }
}

/// Tiles whose occupant may move: both ends of the worst-case communication
/// and of every noise task kept for it. The laser objective has no worst
/// case, so every occupied tile qualifies.
fn neighbourhood(mapping: &Mapping, evaluation: &Evaluation) -> Vec<usize> {
    match evaluation.objective {
        Objective::LaserPower => mapping.occupied_tiles().collect(),
        Objective::Crosstalk if evaluation.noise.is_empty() => Vec::new(),
        _ => {
            let Some((src, dst)) = evaluation.worst_case else { return Vec::new() };
            std::iter::once((src, dst))
                .chain(evaluation.noise.iter().map(|noise| (noise.task.src, noise.task.dst)))
                .flat_map(|(src, dst)| [mapping.tile_of_core(src), mapping.tile_of_core(dst)])
                .unique()
                .collect()
        }
    }
}

impl MappingStrategy for ListSearch {
    fn name(&self) -> &'static str {
        "ListMapping"
    }

    fn search(&mut self, evaluator: &Evaluator, control: &SearchControl) -> Result<SearchOutcome> {
        let start = Instant::now();
        let mut rng = seeded_rng(self.options.seed);
        let mut budget = Budget::new(&self.options);
        let (rows, columns, cores) = (evaluator.rows(), evaluator.columns(), evaluator.num_cores());

        let first = Mapping::random(rows, columns, cores, &mut rng)?;
        let evaluation = evaluator.evaluate(&first)?;
        let mut best = Candidate::new(first, evaluation);
        let mut restart = Some(best.clone());
        let mut scores = Vec::new();

        while !budget.exhausted() && !control.is_cancelled() {
            let seed = match restart.take() {
                Some(candidate) => candidate,
                None => {
                    let mapping = Mapping::random(rows, columns, cores, &mut rng)?;
                    let evaluation = evaluator.evaluate(&mapping)?;
                    Candidate::new(mapping, evaluation)
                }
            };
            let (mapping, evaluation) = Self::descend(evaluator, seed)?;
            scores.push(evaluation.score());

            let improved = best.offer(&mapping, &evaluation);
            if improved {
                debug!("restart {}: new best score {:.3}", budget.performed(), best.score());
            }
            budget.tick(improved);
            control.report(budget.progress(best.score()));
        }

        info!("List search finished after {} restarts, best score {:.3}", budget.performed(), best.score());
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
    use crate::strategy::tests::{evaluator, options};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn local_optimum_never_worsens_its_start() {
        for objective in [Objective::Crosstalk, Objective::PowerLoss, Objective::LaserPower] {
            let evaluator = evaluator(objective);
            let mut rng = StdRng::seed_from_u64(3);
            for _ in 0..5 {
                let start = Mapping::random(3, 3, 5, &mut rng).unwrap();
                let before = evaluator.score(&start).unwrap();
                let (mapping, evaluation) = ListSearch::local_optimum(&evaluator, start).unwrap();
                assert!(evaluation.score() >= before);
                assert_eq!(evaluator.score(&mapping).unwrap(), evaluation.score());
            }
        }
    }

    #[test]
    fn no_neighbouring_swap_improves_a_local_optimum() {
        let evaluator = evaluator(Objective::PowerLoss);
        let start = Mapping::random(3, 3, 5, &mut StdRng::seed_from_u64(9)).unwrap();
        let (mapping, evaluation) = ListSearch::local_optimum(&evaluator, start).unwrap();
        for tile in neighbourhood(&mapping, &evaluation) {
            for other in 0..mapping.num_tiles() {
                let mut neighbour = mapping.clone();
                neighbour.swap_tiles(tile, other);
                assert!(evaluator.score(&neighbour).unwrap() <= evaluation.score());
            }
        }
    }

    #[test]
    fn neighbourhood_follows_the_worst_case() {
        let evaluator = evaluator(Objective::PowerLoss);
        let mapping = Mapping::from_cells(3, 3, (0..9).map(|t| (t < 5).then_some(t)).collect(), 5).unwrap();
        let evaluation = evaluator.evaluate(&mapping).unwrap();
        let (src, dst) = evaluation.worst_case.unwrap();
        assert_eq!(neighbourhood(&mapping, &evaluation), vec![src, dst]);

        let evaluator = crate::strategy::tests::evaluator(Objective::LaserPower);
        let evaluation = evaluator.evaluate(&mapping).unwrap();
        assert_eq!(neighbourhood(&mapping, &evaluation), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn restarts_are_scored() {
        let evaluator = evaluator(Objective::Crosstalk);
        let outcome = ListSearch::new(options(4)).search(&evaluator, &SearchControl::new()).unwrap();
        assert_eq!(outcome.scores.len(), 4);
        assert!(outcome.scores.iter().all(|&score| score <= outcome.evaluation.score()));
    }
}
