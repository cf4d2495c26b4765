//! Placement of application cores on NoC tiles.

pub mod evaluator;

use std::fmt;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::{NocError, Result};

pub use evaluator::{Evaluation, Evaluator, NoiseContribution};

/// Bijection from cores onto a subset of the tiles. Cells are the tiles in
/// row-major order; `None` marks an unmapped tile.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Mapping {
    rows: usize,
    columns: usize,
    cells: Vec<Option<usize>>,
    tile_of_core: Vec<usize>,
}

impl Mapping {
    /// Uniformly random placement of `num_cores` cores.
    pub fn random<R: Rng + ?Sized>(rows: usize, columns: usize, num_cores: usize, rng: &mut R) -> Result<Self> {
        let num_tiles = rows * columns;
        if num_cores > num_tiles {
            return Err(NocError::ApplicationTooLarge { cores: num_cores, tiles: num_tiles });
        }
        let mut tiles: Vec<usize> = (0..num_tiles).collect();
        tiles.shuffle(rng);
        let mut cells = vec![None; num_tiles];
        for (core, &tile) in tiles.iter().take(num_cores).enumerate() {
            cells[tile] = Some(core);
        }
        Self::from_cells(rows, columns, cells, num_cores)
    }

    /// Validates a row-major cell vector as a bijection over `0..num_cores`.
    pub fn from_cells(rows: usize, columns: usize, cells: Vec<Option<usize>>, num_cores: usize) -> Result<Self> {
        if cells.len() != rows * columns {
            return Err(NocError::Mapping(format!("expected {} cells, got {}", rows * columns, cells.len())));
        }
        let mut tile_of_core = vec![None; num_cores];
        for (tile, cell) in cells.iter().enumerate() {
            let Some(core) = *cell else { continue };
            match tile_of_core.get_mut(core) {
                None => return Err(NocError::Mapping(format!("core {} on tile {} is out of range", core, tile))),
                Some(Some(other)) => {
                    return Err(NocError::Mapping(format!("core {} placed on tiles {} and {}", core, other, tile)))
                }
                Some(slot) => *slot = Some(tile),
            }
        }
        let tile_of_core = tile_of_core
            .into_iter()
            .enumerate()
            .map(|(core, tile)| tile.ok_or_else(|| NocError::Mapping(format!("core {} is not placed", core))))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rows, columns, cells, tile_of_core })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn num_cores(&self) -> usize {
        self.tile_of_core.len()
    }

    pub fn num_tiles(&self) -> usize {
        self.cells.len()
    }

    pub fn cells(&self) -> &[Option<usize>] {
        &self.cells
    }

    pub fn tile_of_core(&self, core: usize) -> usize {
        self.tile_of_core[core]
    }

    pub fn core_at(&self, tile: usize) -> Option<usize> {
        self.cells[tile]
    }

    pub fn occupied_tiles(&self) -> impl Iterator<Item = usize> + '_ {
        self.cells.iter().enumerate().filter_map(|(tile, cell)| cell.map(|_| tile))
    }

    /// Exchanges the occupants of two tiles; either may be empty.
    pub fn swap_tiles(&mut self, a: usize, b: usize) {
        self.cells.swap(a, b);
        for tile in [a, b] {
            if let Some(core) = self.cells[tile] {
                self.tile_of_core[core] = tile;
            }
        }
    }
}

impl fmt::Display for Mapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in self.cells.chunks(self.columns) {
            for cell in row {
                match cell {
                    Some(core) => write!(f, "{}\t", core)?,
                    None => write!(f, "n/a\t")?,
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn random_placement_is_a_bijection() {
        let mut rng = StdRng::seed_from_u64(7);
        for cores in [0, 1, 5, 12] {
            let mapping = Mapping::random(3, 4, cores, &mut rng).unwrap();
            assert_eq!(mapping.occupied_tiles().count(), cores);
            for core in 0..cores {
                assert_eq!(mapping.core_at(mapping.tile_of_core(core)), Some(core));
            }
        }
        assert!(Mapping::random(2, 2, 5, &mut rng).is_err());
    }

    #[test]
    fn from_cells_rejects_duplicates_and_gaps() {
        assert!(Mapping::from_cells(2, 2, vec![Some(0), Some(0), None, Some(1)], 2).is_err());
        assert!(Mapping::from_cells(2, 2, vec![Some(0), None, None, None], 2).is_err());
        assert!(Mapping::from_cells(2, 2, vec![Some(0), Some(3), None, Some(1)], 2).is_err());
        assert!(Mapping::from_cells(1, 3, vec![Some(1), None, Some(0)], 2).is_ok());
    }

    #[test]
    fn swap_keeps_inverse_in_sync() {
        let mut mapping = Mapping::from_cells(2, 2, vec![Some(0), Some(1), None, None], 2).unwrap();
        mapping.swap_tiles(1, 3);
        assert_eq!(mapping.tile_of_core(1), 3);
        assert_eq!(mapping.core_at(1), None);
        mapping.swap_tiles(0, 3);
        assert_eq!(mapping.tile_of_core(0), 3);
        assert_eq!(mapping.tile_of_core(1), 0);
    }

    #[test]
    fn display_marks_empty_tiles() {
        let mapping = Mapping::from_cells(2, 2, vec![Some(0), None, None, Some(1)], 2).unwrap();
        assert_eq!(mapping.to_string(), "0\tn/a\t\nn/a\t1\t\n");
    }
}
