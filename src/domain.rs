//! Domain decomposition bookkeeping and the halo-refresh seam.
//!
//! The domain splits into an `nProcX × nProcY` grid of rectangular tiles,
//! each owning a contiguous index range of the interior. Tile ownership is
//! deterministic: rows and columns are distributed as evenly as possible,
//! with the remainder going to the lowest-ranked tiles. The launch
//! contract requires the worker grid to produce exactly one tile per
//! worker; a grid that cannot be split that way is rejected at startup.
//!
//! [`HaloRefresher`] is the single operation that brings field halos up to
//! date between kernels. The in-process implementation applies the
//! periodic wrap; a distributed runtime would swap this for a neighbor
//! exchange, leaving every call site unchanged. The elliptic sweep of the
//! SOR solver stays a single global pass by design, so the
//! conjugate-gradient solver is the preferred path when running tiled.

use thiserror::Error;

use crate::grid::{Field2D, Field3D, Grid};

/// Error raised while building the decomposition.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The worker grid cannot tile the domain.
    #[error("cannot split {nx}x{ny} interior across {nproc_x}x{nproc_y} workers")]
    Unsplittable {
        /// Domain width.
        nx: usize,
        /// Domain height.
        ny: usize,
        /// Workers in x.
        nproc_x: usize,
        /// Workers in y.
        nproc_y: usize,
    },
}

/// One worker's rectangular share of the interior.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tile {
    /// Linear rank, row-major in the worker grid.
    pub rank: usize,
    /// Position in the worker grid along x.
    pub px: usize,
    /// Position in the worker grid along y.
    pub py: usize,
    /// First owned interior column.
    pub ilower: usize,
    /// Last owned interior column.
    pub iupper: usize,
    /// First owned interior row.
    pub jlower: usize,
    /// Last owned interior row.
    pub jupper: usize,
}

impl Tile {
    /// Owned columns.
    pub fn width(&self) -> usize {
        self.iupper - self.ilower + 1
    }

    /// Owned rows.
    pub fn height(&self) -> usize {
        self.jupper - self.jlower + 1
    }

    /// Whether the tile owns interior cell `(i, j)`.
    pub fn contains(&self, i: usize, j: usize) -> bool {
        i >= self.ilower && i <= self.iupper && j >= self.jlower && j <= self.jupper
    }
}

/// The full worker-grid decomposition.
#[derive(Clone, Debug)]
pub struct Decomposition {
    /// Workers along x.
    pub nproc_x: usize,
    /// Workers along y.
    pub nproc_y: usize,
    tiles: Vec<Tile>,
}

impl Decomposition {
    /// Split the interior across an `nproc_x × nproc_y` worker grid.
    pub fn new(grid: &Grid, nproc_x: usize, nproc_y: usize) -> Result<Self, DomainError> {
        if nproc_x == 0 || nproc_y == 0 || nproc_x > grid.nx || nproc_y > grid.ny {
            return Err(DomainError::Unsplittable {
                nx: grid.nx,
                ny: grid.ny,
                nproc_x,
                nproc_y,
            });
        }

        let cols = balanced_split(grid.nx, nproc_x);
        let rows = balanced_split(grid.ny, nproc_y);

        let mut tiles = Vec::with_capacity(nproc_x * nproc_y);
        let mut jlower = 1;
        for (py, height) in rows.iter().enumerate() {
            let mut ilower = 1;
            for (px, width) in cols.iter().enumerate() {
                tiles.push(Tile {
                    rank: py * nproc_x + px,
                    px,
                    py,
                    ilower,
                    iupper: ilower + width - 1,
                    jlower,
                    jupper: jlower + height - 1,
                });
                ilower += width;
            }
            jlower += height;
        }
        Ok(Self {
            nproc_x,
            nproc_y,
            tiles,
        })
    }

    /// Number of workers the launch contract demands.
    pub fn worker_count(&self) -> usize {
        self.tiles.len()
    }

    /// All tiles, ordered by rank.
    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    /// Rank owning interior cell `(i, j)`, if any.
    pub fn owner_of(&self, i: usize, j: usize) -> Option<usize> {
        self.tiles.iter().find(|t| t.contains(i, j)).map(|t| t.rank)
    }

    /// Rank of a tile's neighbor at worker-grid offset `(dx, dy)`,
    /// honoring the periodic domain.
    pub fn neighbor_rank(&self, tile: &Tile, dx: i64, dy: i64) -> usize {
        let px = (tile.px as i64 + dx).rem_euclid(self.nproc_x as i64) as usize;
        let py = (tile.py as i64 + dy).rem_euclid(self.nproc_y as i64) as usize;
        py * self.nproc_x + px
    }
}

/// Split `n` items across `k` buckets as evenly as possible.
fn balanced_split(n: usize, k: usize) -> Vec<usize> {
    let base = n / k;
    let rem = n % k;
    (0..k).map(|i| base + usize::from(i < rem)).collect()
}

/// The border-refresh operation between kernels.
///
/// Sequentially this is the periodic wrap; in a distributed run it is the
/// collective neighbor exchange. Keeping it behind one type keeps the
/// stencil code identical in both settings.
#[derive(Clone, Debug, Default)]
pub struct HaloRefresher;

impl HaloRefresher {
    /// Refresh a 2D field's halo.
    pub fn refresh2(&self, field: &mut Field2D) {
        field.wrap();
    }

    /// Refresh a layered field's halo.
    pub fn refresh3(&self, field: &mut Field3D) {
        field.wrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tiles_cover_interior_exactly_once() {
        let grid = Grid::new(17, 11, 1, 1.0, 1.0);
        let decomp = Decomposition::new(&grid, 4, 3).unwrap();
        assert_eq!(decomp.worker_count(), 12);
        for j in 1..=11 {
            for i in 1..=17 {
                let owners = decomp
                    .tiles()
                    .iter()
                    .filter(|t| t.contains(i, j))
                    .count();
                assert_eq!(owners, 1, "cell ({i},{j}) owned {owners} times");
            }
        }
    }

    #[test]
    fn test_balanced_split_distributes_remainder() {
        assert_eq!(balanced_split(10, 3), vec![4, 3, 3]);
        assert_eq!(balanced_split(9, 3), vec![3, 3, 3]);
    }

    #[test]
    fn test_unsplittable_grid_rejected() {
        let grid = Grid::new(4, 4, 1, 1.0, 1.0);
        assert!(Decomposition::new(&grid, 5, 1).is_err());
        assert!(Decomposition::new(&grid, 0, 1).is_err());
    }

    #[test]
    fn test_periodic_neighbors() {
        let grid = Grid::new(8, 8, 1, 1.0, 1.0);
        let decomp = Decomposition::new(&grid, 2, 2).unwrap();
        let corner = &decomp.tiles()[0];
        // West of rank 0 wraps to rank 1; south wraps to rank 2.
        assert_eq!(decomp.neighbor_rank(corner, -1, 0), 1);
        assert_eq!(decomp.neighbor_rank(corner, 0, -1), 2);
        assert_eq!(decomp.neighbor_rank(corner, 1, 0), 1);
    }

    #[test]
    fn test_halo_refresh_matches_wrap() {
        let grid = Grid::new(4, 4, 2, 1.0, 1.0);
        let mut a = grid.field3d();
        for k in 0..2 {
            for j in 1..=4 {
                for i in 1..=4 {
                    a.set(i, j, k, (i + 10 * j + 100 * k) as f64);
                }
            }
        }
        let mut b = a.clone();
        HaloRefresher.refresh3(&mut a);
        b.wrap();
        assert_eq!(a.as_slice(), b.as_slice());
    }
}
