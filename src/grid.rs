//! Spatial partition of 3-space into indexed compartments.
//!
//! [`StructuredGrid`] lays cells row-major as `i*Ny*Nz + j*Nz + k` and
//! exposes the up-to-six axis-aligned neighbours, matching
//! `original_source`'s `StructuredGrid`. [`OctreeGrid`] additionally
//! supports a coarse/fine refinement used at multi-resolution interfaces.

use crate::error::{Error, Result};
use crate::geometry::Geometry;
use rand::Rng;

/// The 14 canonical edge segments of a unit cell used by `get_slice`: the
/// 12 box edges plus the two half-diagonals from a corner to the centre.
/// This specific set (not just the 12 box edges) is what `original_source`
/// uses and is load-bearing for slice correctness at coarse resolutions.
const CELL_EDGES: [([f64; 3], [f64; 3]); 14] = [
    ([0.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
    ([0.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
    ([0.0, 0.0, 0.0], [1.0, 0.0, 0.0]),
    ([0.0, 0.0, 1.0], [0.0, 1.0, 1.0]),
    ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0]),
    ([0.0, 1.0, 0.0], [1.0, 1.0, 0.0]),
    ([0.0, 1.0, 0.0], [0.0, 1.0, 1.0]),
    ([1.0, 0.0, 0.0], [1.0, 1.0, 0.0]),
    ([1.0, 0.0, 0.0], [1.0, 0.0, 1.0]),
    ([0.0, 1.0, 1.0], [1.0, 1.0, 1.0]),
    ([1.0, 1.0, 0.0], [1.0, 1.0, 1.0]),
    ([1.0, 0.0, 1.0], [1.0, 1.0, 1.0]),
    ([0.0, 0.0, 0.0], [0.5, 0.5, 0.5]),
    ([0.5, 0.5, 0.5], [1.0, 1.0, 1.0]),
];

/// The abstract partition of space that the NSM event scheduler runs over.
pub trait Grid {
    fn size(&self) -> usize;
    fn neighbours(&self, i: usize) -> Result<&[usize]>;
    /// Per-neighbour distances, parallel to `neighbours(i)` (spec.md §9
    /// open question, resolved per `original_source::calculate_neighbours`).
    fn neighbour_distances(&self, i: usize) -> Result<&[f64]>;
    fn distance(&self, i: usize, j: usize) -> Result<f64> {
        let neighbours = self.neighbours(i)?;
        let distances = self.neighbour_distances(i)?;
        neighbours
            .iter()
            .position(|&n| n == j)
            .map(|pos| distances[pos])
            .ok_or(Error::NotFound)
    }
    fn is_in(&self, geometry: &dyn Geometry, i: usize) -> Result<bool>;
    fn get_slice(&self, geometry: &dyn Geometry) -> Vec<usize>;
    fn get_region(&self, geometry: &dyn Geometry) -> Vec<usize>;
    fn cell_centre(&self, i: usize) -> Result<[f64; 3]>;
    fn cell_volume(&self, i: usize) -> Result<f64>;
    fn random_point_in(&self, i: usize, rng: &mut impl Rng) -> Result<[f64; 3]>
    where
        Self: Sized;
    fn check_index(&self, i: usize) -> Result<()> {
        if i < self.size() {
            Ok(())
        } else {
            Err(Error::OutOfRange {
                index: i,
                size: self.size(),
            })
        }
    }
}

/// A uniform 3-D grid of `nx * ny * nz` axis-aligned boxes between `low` and
/// `high`, 6-connected with a reflecting (no-wraparound) boundary.
#[derive(Debug, Clone)]
pub struct StructuredGrid {
    low: [f64; 3],
    cell_size: [f64; 3],
    dims: [usize; 3],
    neighbours: Vec<Vec<usize>>,
    neighbour_distances: Vec<Vec<f64>>,
}

impl StructuredGrid {
    pub fn new(low: [f64; 3], high: [f64; 3], dims: [usize; 3]) -> Result<StructuredGrid> {
        if dims.iter().any(|&d| d == 0) {
            return Err(Error::InvalidConfiguration(
                "grid dimensions must be positive".into(),
            ));
        }
        let cell_size = [
            (high[0] - low[0]) / dims[0] as f64,
            (high[1] - low[1]) / dims[1] as f64,
            (high[2] - low[2]) / dims[2] as f64,
        ];
        let mut grid = StructuredGrid {
            low,
            cell_size,
            dims,
            neighbours: Vec::new(),
            neighbour_distances: Vec::new(),
        };
        grid.calculate_neighbours();
        Ok(grid)
    }

    /// Constructs a grid covering `[low, high]` with cells no larger than
    /// `max_cell_size` in any axis (the teacher-free analogue of
    /// `original_source`'s `StructuredGrid(low, high, max_grid_size)`
    /// constructor).
    pub fn with_max_cell_size(
        low: [f64; 3],
        high: [f64; 3],
        max_cell_size: [f64; 3],
    ) -> Result<StructuredGrid> {
        let dims = [
            ((high[0] - low[0]) / max_cell_size[0]).ceil().max(1.0) as usize,
            ((high[1] - low[1]) / max_cell_size[1]).ceil().max(1.0) as usize,
            ((high[2] - low[2]) / max_cell_size[2]).ceil().max(1.0) as usize,
        ];
        StructuredGrid::new(low, high, dims)
    }

    fn vect_to_index(&self, i: usize, j: usize, k: usize) -> usize {
        i * self.dims[1] * self.dims[2] + j * self.dims[2] + k
    }

    fn index_to_vect(&self, idx: usize) -> (usize, usize, usize) {
        let k = idx % self.dims[2];
        let rest = idx / self.dims[2];
        let j = rest % self.dims[1];
        let i = rest / self.dims[1];
        (i, j, k)
    }

    fn low_point(&self, idx: usize) -> [f64; 3] {
        let (i, j, k) = self.index_to_vect(idx);
        [
            self.low[0] + i as f64 * self.cell_size[0],
            self.low[1] + j as f64 * self.cell_size[1],
            self.low[2] + k as f64 * self.cell_size[2],
        ]
    }

    fn calculate_neighbours(&mut self) {
        let (nx, ny, nz) = (self.dims[0], self.dims[1], self.dims[2]);
        self.neighbours = vec![Vec::new(); nx * ny * nz];
        self.neighbour_distances = vec![Vec::new(); nx * ny * nz];
        for i in 0..nx {
            for j in 0..ny {
                for k in 0..nz {
                    let cell = self.vect_to_index(i, j, k);
                    let neigh = &mut self.neighbours[cell];
                    let dist = &mut self.neighbour_distances[cell];
                    if i != 0 {
                        neigh.push(self.vect_to_index(i - 1, j, k));
                        dist.push(self.cell_size[0]);
                    }
                    if i != nx - 1 {
                        neigh.push(self.vect_to_index(i + 1, j, k));
                        dist.push(self.cell_size[0]);
                    }
                    if j != 0 {
                        neigh.push(self.vect_to_index(i, j - 1, k));
                        dist.push(self.cell_size[1]);
                    }
                    if j != ny - 1 {
                        neigh.push(self.vect_to_index(i, j + 1, k));
                        dist.push(self.cell_size[1]);
                    }
                    if k != 0 {
                        neigh.push(self.vect_to_index(i, j, k - 1));
                        dist.push(self.cell_size[2]);
                    }
                    if k != nz - 1 {
                        neigh.push(self.vect_to_index(i, j, k + 1));
                        dist.push(self.cell_size[2]);
                    }
                }
            }
        }
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    pub fn cell_size(&self) -> [f64; 3] {
        self.cell_size
    }

    pub fn low(&self) -> [f64; 3] {
        self.low
    }

    /// The `(i, j, k)` axis indices of compartment `i` (kept for array
    /// interchange — see `Species::copy_numbers_3d`).
    pub fn cell_indices(&self, i: usize) -> Result<(usize, usize, usize)> {
        self.check_index(i)?;
        Ok(self.index_to_vect(i))
    }

    pub fn index_of(&self, i: usize, j: usize, k: usize) -> usize {
        self.vect_to_index(i, j, k)
    }
}

impl Grid for StructuredGrid {
    fn size(&self) -> usize {
        self.dims[0] * self.dims[1] * self.dims[2]
    }

    fn neighbours(&self, i: usize) -> Result<&[usize]> {
        self.check_index(i)?;
        Ok(&self.neighbours[i])
    }

    fn neighbour_distances(&self, i: usize) -> Result<&[f64]> {
        self.check_index(i)?;
        Ok(&self.neighbour_distances[i])
    }

    fn is_in(&self, geometry: &dyn Geometry, i: usize) -> Result<bool> {
        self.check_index(i)?;
        let low = self.low_point(i);
        let centre = [
            low[0] + 0.5 * self.cell_size[0],
            low[1] + 0.5 * self.cell_size[1],
            low[2] + 0.5 * self.cell_size[2],
        ];
        if geometry.contains(centre) {
            return Ok(true);
        }
        for di in 0..2 {
            for dj in 0..2 {
                for dk in 0..2 {
                    let corner = [
                        low[0] + di as f64 * self.cell_size[0],
                        low[1] + dj as f64 * self.cell_size[1],
                        low[2] + dk as f64 * self.cell_size[2],
                    ];
                    if geometry.contains(corner) {
                        return Ok(true);
                    }
                }
            }
        }
        Ok(false)
    }

    fn get_slice(&self, geometry: &dyn Geometry) -> Vec<usize> {
        let mut indices = Vec::new();
        for i in 0..self.size() {
            let low = self.low_point(i);
            let crossed = CELL_EDGES.iter().any(|(a, b)| {
                let p1 = [
                    low[0] + a[0] * self.cell_size[0],
                    low[1] + a[1] * self.cell_size[1],
                    low[2] + a[2] * self.cell_size[2],
                ];
                let p2 = [
                    low[0] + b[0] * self.cell_size[0],
                    low[1] + b[1] * self.cell_size[1],
                    low[2] + b[2] * self.cell_size[2],
                ];
                geometry.intersects_segment(p1, p2)
            });
            if crossed {
                indices.push(i);
            }
        }
        indices
    }

    fn get_region(&self, geometry: &dyn Geometry) -> Vec<usize> {
        (0..self.size())
            .filter(|&i| self.is_in(geometry, i).unwrap_or(false))
            .collect()
    }

    fn cell_centre(&self, i: usize) -> Result<[f64; 3]> {
        self.check_index(i)?;
        let low = self.low_point(i);
        Ok([
            low[0] + 0.5 * self.cell_size[0],
            low[1] + 0.5 * self.cell_size[1],
            low[2] + 0.5 * self.cell_size[2],
        ])
    }

    fn cell_volume(&self, i: usize) -> Result<f64> {
        self.check_index(i)?;
        Ok(self.cell_size[0] * self.cell_size[1] * self.cell_size[2])
    }

    fn random_point_in(&self, i: usize, rng: &mut impl Rng) -> Result<[f64; 3]> {
        self.check_index(i)?;
        let low = self.low_point(i);
        Ok([
            low[0] + rng.random::<f64>() * self.cell_size[0],
            low[1] + rng.random::<f64>() * self.cell_size[1],
            low[2] + rng.random::<f64>() * self.cell_size[2],
        ])
    }
}

/// A minimal octree-refined grid: a coarse [`StructuredGrid`] in which each
/// coarse cell may be logically split into uniform leaf cells, so a coarser
/// consumer can aggregate finer copy numbers via `leaf_indices`.
#[derive(Debug, Clone)]
pub struct OctreeGrid {
    coarse: StructuredGrid,
    /// Refinement factor per coarse cell (1 = unrefined leaf).
    refinement: Vec<usize>,
    leaf_offsets: Vec<usize>,
    total_leaves: usize,
}

impl OctreeGrid {
    pub fn new(coarse: StructuredGrid, refinement: Vec<usize>) -> Result<OctreeGrid> {
        if refinement.len() != coarse.size() {
            return Err(Error::InvalidConfiguration(
                "refinement vector must have one entry per coarse cell".into(),
            ));
        }
        let mut leaf_offsets = Vec::with_capacity(refinement.len());
        let mut total_leaves = 0;
        for &r in &refinement {
            leaf_offsets.push(total_leaves);
            total_leaves += r * r * r;
        }
        Ok(OctreeGrid {
            coarse,
            refinement,
            leaf_offsets,
            total_leaves,
        })
    }

    /// The leaf-grid indices making up coarse cell `ijk` (flat coarse
    /// index), used by a coarser view to aggregate finer copy numbers.
    pub fn leaf_indices(&self, coarse_cell: usize) -> Result<std::ops::Range<usize>> {
        self.coarse.check_index(coarse_cell)?;
        let r = self.refinement[coarse_cell];
        let start = self.leaf_offsets[coarse_cell];
        Ok(start..start + r * r * r)
    }
}

impl Grid for OctreeGrid {
    fn size(&self) -> usize {
        self.total_leaves
    }

    fn neighbours(&self, i: usize) -> Result<&[usize]> {
        // Refinement is for read-back aggregation only in this minimal
        // implementation; leaves within the same coarse cell (and across
        // coarse cells) are not separately connected.
        self.check_index(i)?;
        Ok(&[])
    }

    fn neighbour_distances(&self, i: usize) -> Result<&[f64]> {
        self.check_index(i)?;
        Ok(&[])
    }

    fn is_in(&self, _geometry: &dyn Geometry, i: usize) -> Result<bool> {
        self.check_index(i)?;
        Err(Error::InvalidConfiguration(
            "geometry queries are not supported on an octree grid".into(),
        ))
    }

    fn get_slice(&self, _geometry: &dyn Geometry) -> Vec<usize> {
        Vec::new()
    }

    fn get_region(&self, _geometry: &dyn Geometry) -> Vec<usize> {
        Vec::new()
    }

    fn cell_centre(&self, i: usize) -> Result<[f64; 3]> {
        self.check_index(i)?;
        Err(Error::InvalidConfiguration(
            "cell_centre is not supported on an octree grid leaf index".into(),
        ))
    }

    fn cell_volume(&self, i: usize) -> Result<f64> {
        self.check_index(i)?;
        Err(Error::InvalidConfiguration(
            "cell_volume is not supported on an octree grid leaf index".into(),
        ))
    }

    fn random_point_in(&self, i: usize, _rng: &mut impl Rng) -> Result<[f64; 3]>
    where
        Self: Sized,
    {
        self.check_index(i)?;
        Err(Error::InvalidConfiguration(
            "random_point_in is not supported on an octree grid leaf index".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reflecting_boundary_has_no_wraparound_neighbour() {
        let grid = StructuredGrid::new([0.0, 0.0, 0.0], [1.0, 1.0, 1.0], [4, 1, 1]).unwrap();
        let neighbours = grid.neighbours(0).unwrap();
        assert_eq!(neighbours, &[1]);
        let last = grid.size() - 1;
        let neighbours = grid.neighbours(last).unwrap();
        assert_eq!(neighbours, &[last - 1]);
    }

    #[test]
    fn row_major_indexing() {
        let grid = StructuredGrid::new([0.0, 0.0, 0.0], [2.0, 3.0, 4.0], [2, 3, 4]).unwrap();
        assert_eq!(grid.index_of(1, 2, 3), 1 * 3 * 4 + 2 * 4 + 3);
    }

    #[test]
    fn neighbour_distances_are_parallel_to_neighbours() {
        let grid = StructuredGrid::new([0.0, 0.0, 0.0], [4.0, 1.0, 1.0], [4, 1, 1]).unwrap();
        let neighbours = grid.neighbours(1).unwrap();
        let distances = grid.neighbour_distances(1).unwrap();
        assert_eq!(neighbours.len(), distances.len());
        assert_eq!(neighbours, &[0, 2]);
        assert!(distances.iter().all(|&d| (d - 1.0).abs() < 1e-12));
    }

    #[test]
    fn out_of_range_is_an_error() {
        let grid = StructuredGrid::new([0.0, 0.0, 0.0], [1.0, 1.0, 1.0], [2, 2, 2]).unwrap();
        assert!(matches!(
            grid.neighbours(100),
            Err(Error::OutOfRange { index: 100, size: 8 })
        ));
    }
}
