//! Chemical species: a diffusion coefficient, an optional grid-bound
//! copy-number vector, and an optional list of individually tracked
//! particles (`original_source/src/Species.h`'s `Species`/`Molecules`).

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{Error, Result};
use crate::grid::Grid;

static SPECIES_COUNT: AtomicUsize = AtomicUsize::new(0);

/// A single individually tracked particle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Molecule {
    pub position: [f64; 3],
    pub previous_position: [f64; 3],
    pub alive: bool,
    pub id: usize,
}

/// The list of particles belonging to a species, mirroring
/// `original_source`'s `Molecules`.
#[derive(Debug, Clone, Default)]
pub struct Molecules {
    mols: Vec<Molecule>,
    next_id: usize,
}

impl Molecules {
    pub fn add(&mut self, position: [f64; 3]) -> usize {
        self.add_with_previous(position, position)
    }

    pub fn add_with_previous(&mut self, position: [f64; 3], previous_position: [f64; 3]) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        self.mols.push(Molecule {
            position,
            previous_position,
            alive: true,
            id,
        });
        id
    }

    pub fn mark_for_deletion(&mut self, index: usize) -> Result<()> {
        let mol = self
            .mols
            .get_mut(index)
            .ok_or(Error::OutOfRange { index, size: self.mols.len() })?;
        mol.alive = false;
        Ok(())
    }

    /// Physically removes every molecule marked for deletion.
    pub fn compact(&mut self) {
        self.mols.retain(|m| m.alive);
    }

    pub fn len(&self) -> usize {
        self.mols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mols.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Molecule> {
        self.mols.iter()
    }

    pub fn clear(&mut self) {
        self.mols.clear();
    }
}

/// A chemical species with a diffusion coefficient, a stable id, an
/// optional grid-bound copy-number vector and an optional particle list.
#[derive(Debug, Clone)]
pub struct Species {
    pub diffusion_coefficient: f64,
    pub id: usize,
    pub copy_numbers: Vec<i64>,
    pub mols: Molecules,
    grid_size: Option<usize>,
}

impl Species {
    /// Constructs a species with no grid bound; `copy_numbers` stays empty
    /// until a grid is attached with [`Species::bind_grid`].
    pub fn new(diffusion_coefficient: f64) -> Species {
        Species {
            diffusion_coefficient,
            id: SPECIES_COUNT.fetch_add(1, Ordering::Relaxed),
            copy_numbers: Vec::new(),
            mols: Molecules::default(),
            grid_size: None,
        }
    }

    pub fn with_grid(diffusion_coefficient: f64, grid: &impl Grid) -> Species {
        let mut species = Species::new(diffusion_coefficient);
        species.bind_grid(grid);
        species
    }

    /// Binds `grid`, (re)allocating `copy_numbers` to `grid.size()` zeros
    /// (`Species::set_grid` in `original_source/src/Species.h`).
    pub fn bind_grid(&mut self, grid: &impl Grid) {
        self.grid_size = Some(grid.size());
        self.copy_numbers = vec![0; grid.size()];
    }

    pub fn grid_size(&self) -> Option<usize> {
        self.grid_size
    }

    /// Invariant check: `len(copy_numbers) == grid.size()` whenever a grid
    /// is bound, and every copy number is non-negative.
    pub fn check_invariants(&self) -> Result<()> {
        if let Some(size) = self.grid_size {
            if self.copy_numbers.len() != size {
                return Err(Error::InvalidConfiguration(format!(
                    "species {} has {} copy-number entries but its grid has size {}",
                    self.id,
                    self.copy_numbers.len(),
                    size
                )));
            }
        }
        if self.copy_numbers.iter().any(|&n| n < 0) {
            return Err(Error::InvalidConfiguration(format!(
                "species {} has a negative copy number",
                self.id
            )));
        }
        Ok(())
    }

    /// Uniformly distributes `n` molecules of this species across the
    /// compartments overlapping `[low, high]`, incrementing copy numbers
    /// (`Species::fill_uniform` in `original_source`).
    pub fn fill_uniform(&mut self, grid: &impl Grid, cells: &[usize], n: usize, rng: &mut impl rand::Rng) {
        if cells.is_empty() {
            return;
        }
        for _ in 0..n {
            let cell = cells[rng.random_range(0..cells.len())];
            if cell < self.copy_numbers.len() {
                self.copy_numbers[cell] += 1;
            }
            let _ = grid;
        }
    }

    /// Reads compartment copy numbers back as a `[Nx][Ny][Nz]` array
    /// (spec §6 array interchange).
    pub fn copy_numbers_3d(&self, grid: &crate::grid::StructuredGrid) -> Result<Vec<Vec<Vec<i64>>>> {
        let [nx, ny, nz] = grid.dims();
        if self.copy_numbers.len() != nx * ny * nz {
            return Err(Error::ShapeMismatch {
                expected: (nx, ny, nz),
                actual: (self.copy_numbers.len(), 1, 1),
            });
        }
        let mut out = vec![vec![vec![0i64; nz]; ny]; nx];
        for i in 0..nx {
            for j in 0..ny {
                for k in 0..nz {
                    out[i][j][k] = self.copy_numbers[grid.index_of(i, j, k)];
                }
            }
        }
        Ok(out)
    }

    /// Writes compartment copy numbers from a `[Nx][Ny][Nz]` array. The
    /// caller **must** call `Nsm::reset_all_priorities` before stepping
    /// again (spec §6).
    pub fn set_copy_numbers_3d(
        &mut self,
        grid: &crate::grid::StructuredGrid,
        data: &[Vec<Vec<i64>>],
    ) -> Result<()> {
        let [nx, ny, nz] = grid.dims();
        let actual = (
            data.len(),
            data.first().map_or(0, |r| r.len()),
            data.first().and_then(|r| r.first()).map_or(0, |c| c.len()),
        );
        if actual != (nx, ny, nz) {
            return Err(Error::ShapeMismatch {
                expected: (nx, ny, nz),
                actual,
            });
        }
        for i in 0..nx {
            for j in 0..ny {
                for k in 0..nz {
                    self.copy_numbers[grid.index_of(i, j, k)] = data[i][j][k];
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::StructuredGrid;

    #[test]
    fn binding_a_grid_allocates_zeroed_copy_numbers() {
        let grid = StructuredGrid::new([0.0; 3], [1.0; 3], [2, 2, 2]).unwrap();
        let species = Species::with_grid(1e-2, &grid);
        assert_eq!(species.copy_numbers.len(), 8);
        assert!(species.copy_numbers.iter().all(|&n| n == 0));
    }

    #[test]
    fn species_ids_are_stable_and_monotonic() {
        let a = Species::new(1.0);
        let b = Species::new(1.0);
        assert!(b.id > a.id);
    }

    #[test]
    fn array_interchange_round_trips() {
        let grid = StructuredGrid::new([0.0; 3], [1.0; 3], [2, 1, 1]).unwrap();
        let mut species = Species::with_grid(0.0, &grid);
        species.copy_numbers[0] = 3;
        species.copy_numbers[1] = 7;
        let arr = species.copy_numbers_3d(&grid).unwrap();
        assert_eq!(arr[0][0][0], 3);
        assert_eq!(arr[1][0][0], 7);
        let mut other = Species::with_grid(0.0, &grid);
        other.set_copy_numbers_3d(&grid, &arr).unwrap();
        assert_eq!(other.copy_numbers, species.copy_numbers);
    }

    #[test]
    fn shape_mismatch_is_rejected() {
        let grid = StructuredGrid::new([0.0; 3], [1.0; 3], [2, 1, 1]).unwrap();
        let mut species = Species::with_grid(0.0, &grid);
        let bad = vec![vec![vec![0i64; 1]; 1]; 1];
        assert!(matches!(
            species.set_copy_numbers_3d(&grid, &bad),
            Err(Error::ShapeMismatch { .. })
        ));
    }
}
