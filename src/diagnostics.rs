//! Runtime diagnostics: per-layer field statistics and the NaN guard.

use crate::grid::{Field2D, Field3D, Grid, Stagger};

/// Summary statistics of one layer of a gridded field.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayerStats {
    /// Arithmetic mean over the staggered interior.
    pub mean: f64,
    /// Largest value.
    pub max: f64,
    /// Smallest value.
    pub min: f64,
    /// Population standard deviation.
    pub std: f64,
}

impl LayerStats {
    fn from_slice_iter<I: Iterator<Item = f64>>(values: I) -> Self {
        let mut count = 0usize;
        let mut sum = 0.0;
        let mut sum_sq = 0.0;
        let mut max = f64::NEG_INFINITY;
        let mut min = f64::INFINITY;
        for value in values {
            count += 1;
            sum += value;
            sum_sq += value * value;
            max = max.max(value);
            min = min.min(value);
        }
        let n = count as f64;
        let mean = sum / n;
        let variance = (sum_sq / n - mean * mean).max(0.0);
        Self {
            mean,
            max,
            min,
            std: variance.sqrt(),
        }
    }
}

fn single_layer_stats(
    field: &Field3D,
    k: usize,
    grid: &Grid,
    stagger: Stagger,
) -> LayerStats {
    let (ni, nj) = stagger.extent(grid.nx, grid.ny);
    LayerStats::from_slice_iter(
        (1..=nj).flat_map(|j| (1..=ni).map(move |i| field.get(i, j, k))),
    )
}

/// Per-layer statistics of a layered field over its staggered interior.
pub fn layer_stats(field: &Field3D, grid: &Grid, stagger: Stagger) -> Vec<LayerStats> {
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        (0..grid.layers)
            .into_par_iter()
            .map(|k| single_layer_stats(field, k, grid, stagger))
            .collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        (0..grid.layers)
            .map(|k| single_layer_stats(field, k, grid, stagger))
            .collect()
    }
}

/// Statistics of a 2D field over the H-point interior.
pub fn field2d_stats(field: &Field2D, grid: &Grid) -> LayerStats {
    LayerStats::from_slice_iter(
        (1..=grid.ny).flat_map(|j| (1..=grid.nx).map(move |i| field.get(i, j))),
    )
}

/// First non-finite interior value of a layered field, if any.
///
/// Returns 1-based grid indices and the 0-based layer.
pub fn first_non_finite(field: &Field3D, grid: &Grid) -> Option<(usize, usize, usize)> {
    for k in 0..grid.layers {
        for j in 1..=grid.ny {
            for i in 1..=grid.nx {
                if !field.get(i, j, k).is_finite() {
                    return Some((i, j, k));
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_of_uniform_field() {
        let grid = Grid::new(4, 4, 2, 1.0, 1.0);
        let mut f = grid.field3d();
        f.fill(3.0);
        let stats = layer_stats(&f, &grid, Stagger::HPoint);
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].mean, 3.0);
        assert_eq!(stats[0].max, 3.0);
        assert_eq!(stats[0].min, 3.0);
        assert_eq!(stats[0].std, 0.0);
    }

    #[test]
    fn test_stats_use_staggered_extent() {
        // A U-point field has one extra interior column; put a marker
        // there and confirm it is seen.
        let grid = Grid::new(4, 4, 1, 1.0, 1.0);
        let mut f = grid.field3d();
        f.set(5, 2, 0, 7.0);
        let stats = layer_stats(&f, &grid, Stagger::UPoint);
        assert_eq!(stats[0].max, 7.0);
        let h_stats = layer_stats(&f, &grid, Stagger::HPoint);
        assert_eq!(h_stats[0].max, 0.0);
    }

    #[test]
    fn test_std_of_two_values() {
        let grid = Grid::new(2, 1, 1, 1.0, 1.0);
        let mut f = grid.field3d();
        f.set(1, 1, 0, 1.0);
        f.set(2, 1, 0, 3.0);
        let stats = layer_stats(&f, &grid, Stagger::HPoint);
        assert_eq!(stats[0].mean, 2.0);
        assert_eq!(stats[0].std, 1.0);
    }

    #[test]
    fn test_nan_guard_locates_bad_cell() {
        let grid = Grid::new(4, 4, 2, 1.0, 1.0);
        let mut f = grid.field3d();
        assert!(first_non_finite(&f, &grid).is_none());
        f.set(3, 2, 1, f64::NAN);
        assert_eq!(first_non_finite(&f, &grid), Some((3, 2, 1)));
        f.set(3, 2, 1, f64::INFINITY);
        assert_eq!(first_non_finite(&f, &grid), Some((3, 2, 1)));
    }
}
