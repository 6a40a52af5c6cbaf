//! Halo-carrying field arrays on the staggered grid.
//!
//! Every gridded quantity in the model is stored with a one-cell halo on
//! all four sides, so a field logically covering `nx × ny` interior cells
//! occupies `(nx+2) × (ny+2)` slots with valid indices `0..=nx+1` and
//! `0..=ny+1`. Stencil kernels read freely one cell past the interior and
//! the halo is refreshed by periodic wrap after every kernel write.
//!
//! Storage is a flat `Vec<f64>` with `i` fastest, then `j`, then the layer
//! index `k`, so a single layer of a [`Field3D`] is one contiguous slice.

/// A 2D field with a one-cell halo on every side.
#[derive(Clone, Debug, PartialEq)]
pub struct Field2D {
    nx: usize,
    ny: usize,
    data: Vec<f64>,
}

impl Field2D {
    /// Create a zero-filled field for an `nx × ny` interior.
    pub fn zeros(nx: usize, ny: usize) -> Self {
        Self {
            nx,
            ny,
            data: vec![0.0; (nx + 2) * (ny + 2)],
        }
    }

    /// Create a field with every slot (halo included) set to `value`.
    pub fn constant(nx: usize, ny: usize, value: f64) -> Self {
        Self {
            nx,
            ny,
            data: vec![value; (nx + 2) * (ny + 2)],
        }
    }

    /// Interior width.
    #[inline(always)]
    pub fn nx(&self) -> usize {
        self.nx
    }

    /// Interior height.
    #[inline(always)]
    pub fn ny(&self) -> usize {
        self.ny
    }

    #[inline(always)]
    fn idx(&self, i: usize, j: usize) -> usize {
        debug_assert!(i <= self.nx + 1 && j <= self.ny + 1);
        i + (self.nx + 2) * j
    }

    /// Read the value at `(i, j)`, halo included.
    #[inline(always)]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[self.idx(i, j)]
    }

    /// Write the value at `(i, j)`, halo included.
    #[inline(always)]
    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        let idx = self.idx(i, j);
        self.data[idx] = value;
    }

    /// Add `value` to the slot at `(i, j)`.
    #[inline(always)]
    pub fn add(&mut self, i: usize, j: usize, value: f64) {
        let idx = self.idx(i, j);
        self.data[idx] += value;
    }

    /// Set every slot, halo included.
    pub fn fill(&mut self, value: f64) {
        self.data.fill(value);
    }

    /// Copy every slot from `other`. Panics if the shapes differ.
    pub fn copy_from(&mut self, other: &Self) {
        assert_eq!(self.data.len(), other.data.len());
        self.data.copy_from_slice(&other.data);
    }

    /// Flat view of the whole array, halo included.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Mutable flat view of the whole array, halo included.
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// Copy column `nx` into column `0` and column `1` into column `nx+1`.
    pub fn wrap_x(&mut self) {
        let (nx, ny) = (self.nx, self.ny);
        for j in 0..=ny + 1 {
            let west = self.get(nx, j);
            let east = self.get(1, j);
            self.set(0, j, west);
            self.set(nx + 1, j, east);
        }
    }

    /// Copy row `ny` into row `0` and row `1` into row `ny+1`.
    pub fn wrap_y(&mut self) {
        let (nx, ny) = (self.nx, self.ny);
        for i in 0..=nx + 1 {
            let south = self.get(i, ny);
            let north = self.get(i, 1);
            self.set(i, 0, south);
            self.set(i, ny + 1, north);
        }
    }

    /// Apply the periodic wrap in both directions.
    pub fn wrap(&mut self) {
        self.wrap_x();
        self.wrap_y();
    }
}

/// A layered field: `layers` stacked [`Field2D`]-shaped slabs sharing one
/// allocation.
#[derive(Clone, Debug, PartialEq)]
pub struct Field3D {
    nx: usize,
    ny: usize,
    layers: usize,
    data: Vec<f64>,
}

impl Field3D {
    /// Create a zero-filled layered field.
    pub fn zeros(nx: usize, ny: usize, layers: usize) -> Self {
        Self {
            nx,
            ny,
            layers,
            data: vec![0.0; (nx + 2) * (ny + 2) * layers],
        }
    }

    /// Interior width.
    #[inline(always)]
    pub fn nx(&self) -> usize {
        self.nx
    }

    /// Interior height.
    #[inline(always)]
    pub fn ny(&self) -> usize {
        self.ny
    }

    /// Number of layers.
    #[inline(always)]
    pub fn layers(&self) -> usize {
        self.layers
    }

    #[inline(always)]
    fn idx(&self, i: usize, j: usize, k: usize) -> usize {
        debug_assert!(i <= self.nx + 1 && j <= self.ny + 1 && k < self.layers);
        i + (self.nx + 2) * (j + (self.ny + 2) * k)
    }

    /// Read the value at `(i, j, k)`, halo included.
    #[inline(always)]
    pub fn get(&self, i: usize, j: usize, k: usize) -> f64 {
        self.data[self.idx(i, j, k)]
    }

    /// Write the value at `(i, j, k)`, halo included.
    #[inline(always)]
    pub fn set(&mut self, i: usize, j: usize, k: usize, value: f64) {
        let idx = self.idx(i, j, k);
        self.data[idx] = value;
    }

    /// Add `value` to the slot at `(i, j, k)`.
    #[inline(always)]
    pub fn add(&mut self, i: usize, j: usize, k: usize, value: f64) {
        let idx = self.idx(i, j, k);
        self.data[idx] += value;
    }

    /// Set every slot, halo included.
    pub fn fill(&mut self, value: f64) {
        self.data.fill(value);
    }

    /// Copy every slot from `other`. Panics if the shapes differ.
    pub fn copy_from(&mut self, other: &Self) {
        assert_eq!(self.data.len(), other.data.len());
        self.data.copy_from_slice(&other.data);
    }

    /// One layer as a contiguous slice, halo included.
    pub fn layer(&self, k: usize) -> &[f64] {
        let slab = (self.nx + 2) * (self.ny + 2);
        &self.data[k * slab..(k + 1) * slab]
    }

    /// Flat view of the whole array, halo included.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Mutable flat view of the whole array, halo included.
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// In-place `self += c * other` over every slot.
    ///
    /// This is the vector-space operation the time integrator is built on.
    pub fn axpy(&mut self, c: f64, other: &Self) {
        assert_eq!(self.data.len(), other.data.len());
        for (a, b) in self.data.iter_mut().zip(&other.data) {
            *a += c * b;
        }
    }

    /// Apply the periodic wrap in both directions to every layer.
    pub fn wrap(&mut self) {
        let (nx, ny) = (self.nx, self.ny);
        for k in 0..self.layers {
            for j in 0..=ny + 1 {
                let west = self.get(nx, j, k);
                let east = self.get(1, j, k);
                self.set(0, j, k, west);
                self.set(nx + 1, j, k, east);
            }
            for i in 0..=nx + 1 {
                let south = self.get(i, ny, k);
                let north = self.get(i, 1, k);
                self.set(i, 0, k, south);
                self.set(i, ny + 1, k, north);
            }
        }
    }
}
