//! Generational evolutionary search over placements. Recombination is cycle
//! crossover on the row-major cell vectors; mutation swaps two occupied
//! tiles.

use std::time::Instant;

use dashmap::DashMap;
use log::{debug, info};
use rand::seq::index;
use rand::Rng;
use rayon::prelude::*;

use super::{seeded_rng, Budget, Candidate, MappingStrategy, SearchControl, SearchOptions, SearchOutcome};
use crate::mapping::{Evaluation, Evaluator, Mapping};
use crate::{Result, MUTATION_PROBABILITY};

pub struct GeneticSearch {
    options: SearchOptions,
    cache: DashMap<Mapping, Evaluation>,
}

impl GeneticSearch {
    pub fn new(options: SearchOptions) -> Self {
        Self { options, cache: DashMap::new() }
    }

    fn evaluate(&self, evaluator: &Evaluator, mapping: Mapping) -> Result<Candidate> {
        if let Some(hit) = self.cache.get(&mapping) {
            let evaluation = hit.value().clone();
            return Ok(Candidate::new(mapping, evaluation));
        }
        let evaluation = evaluator.evaluate(&mapping)?;
        self.cache.insert(mapping.clone(), evaluation.clone());
        Ok(Candidate::new(mapping, evaluation))
    }

    fn evaluate_all(&self, evaluator: &Evaluator, mappings: Vec<Mapping>) -> Result<Vec<Candidate>> {
        mappings.into_par_iter().map(|mapping| self.evaluate(evaluator, mapping)).collect()
    }
}

/// Cells relabelled as a permutation of `0..num_tiles`: cores keep their id,
/// the k-th empty cell becomes `num_cores + k`.
fn labels(mapping: &Mapping) -> Vec<usize> {
    let mut next_empty = mapping.num_cores();
    mapping
        .cells()
        .iter()
        .map(|&cell| {
            cell.unwrap_or_else(|| {
                next_empty += 1;
                next_empty - 1
            })
        })
        .collect()
}

/// Cycle crossover: cycles are copied alternately from `first` (even
/// cycles) and `second` (odd cycles), starting each at the lowest unfilled
/// cell.
pub fn cycle_crossover(first: &Mapping, second: &Mapping) -> Result<Mapping> {
    let (a, b) = (labels(first), labels(second));
    let mut position_in_a = vec![0; a.len()];
    for (position, &label) in a.iter().enumerate() {
        position_in_a[label] = position;
    }

    let mut child: Vec<Option<usize>> = vec![None; a.len()];
    let mut cycle = 0;
    for start in 0..a.len() {
        if child[start].is_some() {
            continue;
        }
        let mut position = start;
        loop {
            child[position] = Some(if cycle % 2 == 0 { a[position] } else { b[position] });
            position = position_in_a[b[position]];
            if position == start {
                break;
            }
        }
        cycle += 1;
    }

    let num_cores = first.num_cores();
    let cells = child.into_iter().map(|label| label.filter(|&core| core < num_cores)).collect();
    Mapping::from_cells(first.rows(), first.columns(), cells, num_cores)
}

/// Swaps the cores on two distinct occupied tiles.
pub fn mutate<R: Rng + ?Sized>(mapping: &mut Mapping, rng: &mut R) {
    let occupied: Vec<usize> = mapping.occupied_tiles().collect();
    if occupied.len() < 2 {
        return;
    }
    let picked = index::sample(rng, occupied.len(), 2);
    mapping.swap_tiles(occupied[picked.index(0)], occupied[picked.index(1)]);
}

/// Binary tournament; the first drawn wins ties.
fn tournament<R: Rng + ?Sized>(population: &[Candidate], rng: &mut R) -> usize {
    let a = rng.gen_range(0..population.len());
    let b = rng.gen_range(0..population.len());
    if population[b].score() > population[a].score() {
        b
    } else {
        a
    }
}

impl MappingStrategy for GeneticSearch {
    fn name(&self) -> &'static str {
        "GeneticMapping"
    }

    fn search(&mut self, evaluator: &Evaluator, control: &SearchControl) -> Result<SearchOutcome> {
        let start = Instant::now();
        let mut rng = seeded_rng(self.options.seed);
        let mut budget = Budget::new(&self.options);
        let (rows, columns, cores) = (evaluator.rows(), evaluator.columns(), evaluator.num_cores());
        let survivors = self.options.population.max(2);
        let offspring = self.options.offspring.max(1);
        self.cache.clear();

        let initial = (0..survivors + offspring)
            .map(|_| Mapping::random(rows, columns, cores, &mut rng))
            .collect::<Result<Vec<_>>>()?;
        let mut population = self.evaluate_all(evaluator, initial)?;
        let mut best = population[0].clone();
        for candidate in &population[1..] {
            best.offer(&candidate.mapping, &candidate.evaluation);
        }
        let mut scores = Vec::new();

        while !budget.exhausted() && !control.is_cancelled() {
            // Stable sort keeps earlier individuals ahead on ties.
            population.sort_by(|a, b| b.score().total_cmp(&a.score()));
            population.truncate(survivors);

            let parents: Vec<usize> = (0..offspring).map(|_| tournament(&population, &mut rng)).collect();
            let mut previous = parents[parents.len() - 1];
            let mut children = Vec::with_capacity(offspring);
            for &parent in &parents {
                let mut child = cycle_crossover(&population[previous].mapping, &population[parent].mapping)?;
                if rng.gen_bool(MUTATION_PROBABILITY) {
                    mutate(&mut child, &mut rng);
                }
                children.push(child);
                previous = parent;
            }

            let children = self.evaluate_all(evaluator, children)?;
            let mut improved = false;
            for child in &children {
                improved |= best.offer(&child.mapping, &child.evaluation);
            }
            population.extend(children);
            scores.push(best.score());

            if improved {
                debug!("generation {}: new best score {:.3}", budget.performed(), best.score());
            }
            budget.tick(improved);
            control.report(budget.progress(best.score()));
        }

        info!(
            "Genetic search finished after {} generations ({} distinct mappings evaluated), best score {:.3}",
            budget.performed(),
            self.cache.len(),
            best.score()
        );
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
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn assert_bijection(mapping: &Mapping) {
        for core in 0..mapping.num_cores() {
            assert_eq!(mapping.core_at(mapping.tile_of_core(core)), Some(core));
        }
        assert_eq!(mapping.occupied_tiles().count(), mapping.num_cores());
    }

    #[test]
    fn crossover_children_are_bijections() {
        let mut rng = StdRng::seed_from_u64(21);
        for cores in [1, 4, 9, 12] {
            for _ in 0..20 {
                let a = Mapping::random(3, 4, cores, &mut rng).unwrap();
                let b = Mapping::random(3, 4, cores, &mut rng).unwrap();
                let child = cycle_crossover(&a, &b).unwrap();
                assert_bijection(&child);
            }
        }
    }

    #[test]
    fn crossover_copies_cells_in_place() {
        let a = Mapping::from_cells(1, 4, vec![Some(0), Some(1), Some(2), Some(3)], 4).unwrap();
        let b = Mapping::from_cells(1, 4, vec![Some(1), Some(0), Some(3), Some(2)], 4).unwrap();
        // Cycles {0, 1} from a, then {2, 3} from b.
        let child = cycle_crossover(&a, &b).unwrap();
        assert_eq!(child.cells(), &[Some(0), Some(1), Some(3), Some(2)]);
        assert_eq!(cycle_crossover(&a, &a).unwrap(), a);
    }

    #[test]
    fn mutation_swaps_two_cores() {
        let mut rng = StdRng::seed_from_u64(5);
        let parent = Mapping::random(3, 3, 4, &mut rng).unwrap();
        for _ in 0..20 {
            let mut mutated = parent.clone();
            mutate(&mut mutated, &mut rng);
            assert_bijection(&mutated);
            let changed = (0..9).filter(|&tile| mutated.core_at(tile) != parent.core_at(tile)).count();
            assert_eq!(changed, 2);
            assert!(mutated.occupied_tiles().eq(parent.occupied_tiles()));
        }

        let mut lonely = Mapping::random(2, 2, 1, &mut rng).unwrap();
        let before = lonely.clone();
        mutate(&mut lonely, &mut rng);
        assert_eq!(lonely, before);
    }

    #[test]
    fn best_score_never_decreases() {
        let evaluator = evaluator(Objective::PowerLoss);
        let outcome = GeneticSearch::new(options(15)).search(&evaluator, &SearchControl::new()).unwrap();
        assert_eq!(outcome.scores.len(), 15);
        assert!(outcome.scores.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(outcome.scores.last().copied(), Some(outcome.evaluation.score()));
    }

    #[test]
    fn seeded_runs_repeat() {
        let evaluator = evaluator(Objective::Crosstalk);
        let first = GeneticSearch::new(options(6)).search(&evaluator, &SearchControl::new()).unwrap();
        let second = GeneticSearch::new(options(6)).search(&evaluator, &SearchControl::new()).unwrap();
        assert_eq!(first.mapping, second.mapping);
    }
}
