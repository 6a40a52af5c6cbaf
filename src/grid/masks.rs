//! Wet/dry masking for the model domain.
//!
//! A cell is either wet (fluid, mask value 1) or dry (land, mask value 0)
//! and the classification is fixed for the whole run. Face masks record
//! whether mass or momentum may cross each cell face: a face between two
//! cells of differing wetness is closed.

use super::{Field2D, Grid};

/// Wet/dry cell mask at H points. 1 = wet, 0 = dry, fixed at startup.
#[derive(Clone, Debug)]
pub struct WetMask {
    mask: Field2D,
}

impl WetMask {
    /// Mask with every cell wet.
    pub fn all_wet(grid: &Grid) -> Self {
        let mut mask = Field2D::constant(grid.nx, grid.ny, 1.0);
        mask.wrap();
        Self { mask }
    }

    /// Maximal rectangular pool: wet interior with a one-cell dry ring.
    pub fn rectangular_pool(grid: &Grid) -> Self {
        let mut mask = Field2D::zeros(grid.nx, grid.ny);
        for j in 2..grid.ny {
            for i in 2..grid.nx {
                mask.set(i, j, 1.0);
            }
        }
        mask.wrap();
        Self { mask }
    }

    /// Wrap a raw 0/1 field read from file. Values are snapped to {0, 1}.
    pub fn from_field(mut mask: Field2D) -> Self {
        for v in mask.as_mut_slice() {
            *v = if *v > 0.5 { 1.0 } else { 0.0 };
        }
        mask.wrap();
        Self { mask }
    }

    /// Mask value at `(i, j)`: 1.0 for wet, 0.0 for dry.
    #[inline(always)]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.mask.get(i, j)
    }

    /// Whether cell `(i, j)` is wet.
    #[inline(always)]
    pub fn is_wet(&self, i: usize, j: usize) -> bool {
        self.mask.get(i, j) > 0.5
    }

    /// Number of wet interior cells.
    pub fn wet_count(&self) -> usize {
        let mut count = 0;
        for j in 1..=self.mask.ny() {
            for i in 1..=self.mask.nx() {
                if self.is_wet(i, j) {
                    count += 1;
                }
            }
        }
        count
    }

    /// The underlying field, halo included.
    pub fn field(&self) -> &Field2D {
        &self.mask
    }
}

/// Face masks derived from the wet mask.
///
/// `hfacW[i,j]` is 0 when the west face of cell `(i,j)` separates cells of
/// differing wetness, else 1; E/N/S analogously. Outer rows and columns
/// are the periodic partners of the interior ones.
#[derive(Clone, Debug)]
pub struct FaceMasks {
    /// West face of cell `(i,j)` (the U point).
    pub w: Field2D,
    /// East face of cell `(i,j)`.
    pub e: Field2D,
    /// South face of cell `(i,j)` (the V point).
    pub s: Field2D,
    /// North face of cell `(i,j)`.
    pub n: Field2D,
}

impl FaceMasks {
    /// Derive all four face masks from a wet mask.
    pub fn derive(grid: &Grid, wet: &WetMask) -> Self {
        let mut w = Field2D::constant(grid.nx, grid.ny, 1.0);
        let mut e = Field2D::constant(grid.nx, grid.ny, 1.0);
        let mut s = Field2D::constant(grid.nx, grid.ny, 1.0);
        let mut n = Field2D::constant(grid.nx, grid.ny, 1.0);

        for j in 1..=grid.ny {
            for i in 1..=grid.nx {
                let c = wet.get(i, j);
                if wet.get(i - 1, j) != c {
                    w.set(i, j, 0.0);
                }
                if wet.get(i + 1, j) != c {
                    e.set(i, j, 0.0);
                }
                if wet.get(i, j - 1) != c {
                    s.set(i, j, 0.0);
                }
                if wet.get(i, j + 1) != c {
                    n.set(i, j, 0.0);
                }
            }
        }

        w.wrap();
        e.wrap();
        s.wrap();
        n.wrap();
        Self { w, e, s, n }
    }
}
