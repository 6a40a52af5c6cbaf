//! Layer physics: the reduced-gravity / n-layer branch and the diagnostic
//! fields both branches feed to the momentum kernels.
//!
//! The mode is decided once per run. In reduced-gravity mode the layer
//! below the deepest active layer is infinitely thick and at rest, the
//! free surface is not carried and the barotropic correction is skipped.
//! In n-layer mode the full column is active, the free surface evolves and
//! the barotropic correction closes the column every step.
//!
//! The Bernoulli potential combines the Montgomery potential with the
//! kinetic energy density averaged onto H points:
//!
//! ```text
//! KE = (u[i,j]² + u[i+1,j]² + v[i,j]² + v[i,j+1]²) / 4
//! ```

use crate::grid::{Field2D, Field3D, Grid};

/// Which layer-physics branch a run uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayerMode {
    /// Bottom layer passive, no free surface, no barotropic correction.
    ReducedGravity,
    /// All layers active above real bathymetry with a free surface.
    NLayer,
}

/// Physical constants plus the branch tag.
#[derive(Clone, Debug)]
pub struct LayerPhysics {
    /// Branch tag, consulted once per step for the barotropic stage.
    pub mode: LayerMode,
    /// Reduced gravity at the top of each layer (m/s²); `g[0]` is the
    /// surface value used by the barotropic correction.
    pub g: Vec<f64>,
    /// Reference density (kg/m³).
    pub rho0: f64,
}

impl LayerPhysics {
    /// Reduced-gravity physics.
    pub fn reduced_gravity(g: Vec<f64>, rho0: f64) -> Self {
        Self {
            mode: LayerMode::ReducedGravity,
            g,
            rho0,
        }
    }

    /// n-layer physics.
    pub fn n_layer(g: Vec<f64>, rho0: f64) -> Self {
        Self {
            mode: LayerMode::NLayer,
            g,
            rho0,
        }
    }

    /// Whether the barotropic correction runs.
    #[inline]
    pub fn is_n_layer(&self) -> bool {
        self.mode == LayerMode::NLayer
    }

    /// Surface gravity, the coefficient of the free-surface pressure
    /// gradient.
    #[inline]
    pub fn g_surface(&self) -> f64 {
        self.g[0]
    }

    /// Compute the Bernoulli potential at H points into `b`.
    ///
    /// Interior extent `1..=nx × 1..=ny`, all layers, followed by the
    /// periodic wrap.
    pub fn bernoulli(
        &self,
        b: &mut Field3D,
        grid: &Grid,
        h: &Field3D,
        u: &Field3D,
        v: &Field3D,
        depth: &Field2D,
    ) {
        match self.mode {
            LayerMode::ReducedGravity => self.bernoulli_reduced_gravity(b, grid, h, u, v),
            LayerMode::NLayer => self.bernoulli_n_layer(b, grid, h, u, v, depth),
        }
        b.wrap();
    }

    /// Reduced-gravity Bernoulli potential:
    /// `b_k = Σ_{l=k..L} g_l · (Σ_{m=1..l} h_m) + KE_k`.
    fn bernoulli_reduced_gravity(
        &self,
        b: &mut Field3D,
        grid: &Grid,
        h: &Field3D,
        u: &Field3D,
        v: &Field3D,
    ) {
        let layers = grid.layers;
        let mut cumulative = vec![0.0; layers];
        for j in 1..=grid.ny {
            for i in 1..=grid.nx {
                let mut sum = 0.0;
                for (k, slot) in cumulative.iter_mut().enumerate() {
                    sum += h.get(i, j, k);
                    *slot = sum;
                }
                // Suffix sums of g_l * (cumulative thickness to layer l).
                let mut tail = 0.0;
                for k in (0..layers).rev() {
                    tail += self.g[k] * cumulative[k];
                    b.set(i, j, k, tail + kinetic_energy(u, v, i, j, k));
                }
            }
        }
    }

    /// n-layer Bernoulli potential via the Montgomery potential:
    /// interface heights are stacked up from the bathymetry and
    /// `M_k = M_{k-1} + g_k · z_{k-1}` with `M_1 = 0`.
    fn bernoulli_n_layer(
        &self,
        b: &mut Field3D,
        grid: &Grid,
        h: &Field3D,
        u: &Field3D,
        v: &Field3D,
        depth: &Field2D,
    ) {
        let layers = grid.layers;
        let mut z_bottom = vec![0.0; layers];
        for j in 1..=grid.ny {
            for i in 1..=grid.nx {
                z_bottom[layers - 1] = -depth.get(i, j);
                for k in (0..layers - 1).rev() {
                    z_bottom[k] = z_bottom[k + 1] + h.get(i, j, k + 1);
                }
                let mut montgomery = 0.0;
                b.set(i, j, 0, kinetic_energy(u, v, i, j, 0));
                for k in 1..layers {
                    montgomery += self.g[k] * z_bottom[k - 1];
                    b.set(i, j, k, montgomery + kinetic_energy(u, v, i, j, k));
                }
            }
        }
    }
}

#[inline(always)]
fn kinetic_energy(u: &Field3D, v: &Field3D, i: usize, j: usize, k: usize) -> f64 {
    let uw = u.get(i, j, k);
    let ue = u.get(i + 1, j, k);
    let vs = v.get(i, j, k);
    let vn = v.get(i, j + 1, k);
    0.25 * (uw * uw + ue * ue + vs * vs + vn * vn)
}

/// Relative vorticity at Z points (southwest corners):
/// `ζ = ∂v/∂x − ∂u/∂y`, extent `1..=nx+1 × 1..=ny+1`, then wrap.
pub fn vorticity(zeta: &mut Field3D, grid: &Grid, u: &Field3D, v: &Field3D) {
    let inv_dx = 1.0 / grid.dx;
    let inv_dy = 1.0 / grid.dy;
    for k in 0..grid.layers {
        for j in 1..=grid.ny + 1 {
            for i in 1..=grid.nx + 1 {
                let value = (v.get(i, j, k) - v.get(i - 1, j, k)) * inv_dx
                    - (u.get(i, j, k) - u.get(i, j - 1, k)) * inv_dy;
                zeta.set(i, j, k, value);
            }
        }
    }
    zeta.wrap();
}
