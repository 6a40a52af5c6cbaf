//! Barotropic correction for the free surface.
//!
//! In n-layer mode the depth-integrated flow must stay consistent with the
//! free-surface slope. After the provisional momentum update, this stage
//! computes the barotropic transport, forms the provisional surface `η*`,
//! solves the elliptic equation `A·η = −η*/dt²` for the new surface,
//! applies the resulting pressure gradient to every layer's velocity and
//! rescales the layer thicknesses so the column matches
//! `depth + freesurfFac·η`.
//!
//! The five-point operator `A` is assembled once at startup from the
//! bathymetry and the face masks; it does not depend on the evolving
//! state.

mod cg;
mod sor;

pub use cg::CgSolver;
pub use sor::SorSolver;

use log::warn;

use crate::config::SolverMethod;
use crate::grid::{FaceMasks, Field2D, Grid, WetMask};
use crate::timestep::State;

/// The five-point elliptic operator of the surface-pressure equation.
///
/// Off-center coefficients are `g·(face-averaged depth)/dx²` (or `dy²`)
/// gated by the face mask; the center coefficient is the negative sum of
/// the four neighbors minus `freesurfFac/dt²`.
#[derive(Clone, Debug)]
pub struct SurfaceOperator {
    west: Field2D,
    east: Field2D,
    south: Field2D,
    north: Field2D,
    center: Field2D,
}

impl SurfaceOperator {
    /// Assemble the operator for fixed bathymetry and masks.
    pub fn assemble(
        grid: &Grid,
        depth: &Field2D,
        faces: &FaceMasks,
        g: f64,
        freesurf_fac: f64,
        dt: f64,
    ) -> Self {
        let inv_dx2 = 1.0 / (grid.dx * grid.dx);
        let inv_dy2 = 1.0 / (grid.dy * grid.dy);
        let mut west = grid.field2d();
        let mut east = grid.field2d();
        let mut south = grid.field2d();
        let mut north = grid.field2d();
        let mut center = grid.field2d();

        for j in 1..=grid.ny {
            for i in 1..=grid.nx {
                let dc = depth.get(i, j);
                let aw = g * 0.5 * (dc + depth.get(i - 1, j)) * inv_dx2 * faces.w.get(i, j);
                let ae = g * 0.5 * (dc + depth.get(i + 1, j)) * inv_dx2 * faces.e.get(i, j);
                let as_ = g * 0.5 * (dc + depth.get(i, j - 1)) * inv_dy2 * faces.s.get(i, j);
                let an = g * 0.5 * (dc + depth.get(i, j + 1)) * inv_dy2 * faces.n.get(i, j);
                west.set(i, j, aw);
                east.set(i, j, ae);
                south.set(i, j, as_);
                north.set(i, j, an);
                center.set(i, j, -(aw + ae + as_ + an) - freesurf_fac / (dt * dt));
            }
        }
        west.wrap();
        east.wrap();
        south.wrap();
        north.wrap();
        center.wrap();
        Self {
            west,
            east,
            south,
            north,
            center,
        }
    }

    /// Center coefficient at `(i, j)`.
    #[inline(always)]
    pub fn center(&self, i: usize, j: usize) -> f64 {
        self.center.get(i, j)
    }

    /// Apply the stencil at `(i, j)`; the field's halo must be current.
    #[inline(always)]
    pub fn apply_at(&self, eta: &Field2D, i: usize, j: usize) -> f64 {
        self.west.get(i, j) * eta.get(i - 1, j)
            + self.east.get(i, j) * eta.get(i + 1, j)
            + self.south.get(i, j) * eta.get(i, j - 1)
            + self.north.get(i, j) * eta.get(i, j + 1)
            + self.center.get(i, j) * eta.get(i, j)
    }
}

/// Outcome of one elliptic solve.
#[derive(Clone, Copy, Debug)]
pub struct SolveStats {
    /// Sweeps or iterations used.
    pub iterations: usize,
    /// Whether the tolerance was met within the iteration cap.
    pub converged: bool,
    /// Final residual norm relative to the starting one.
    pub residual_ratio: f64,
}

/// The elliptic solver running the barotropic step, chosen at
/// configuration time. The correction does not know which is active.
#[derive(Debug)]
pub enum EllipticSolver {
    /// In-process successive over-relaxation.
    Sor(SorSolver),
    /// Jacobi-preconditioned conjugate gradients.
    Cg(CgSolver),
}

impl EllipticSolver {
    /// Build the configured solver.
    pub fn new(method: SolverMethod, grid: &Grid, eps: f64, maxits: usize) -> Self {
        match method {
            SolverMethod::Sor => EllipticSolver::Sor(SorSolver::new(grid, eps, maxits)),
            SolverMethod::Cg => EllipticSolver::Cg(CgSolver::new(grid, eps, maxits)),
        }
    }

    /// Solve `A·η = rhs` in place, starting from the current `eta`.
    pub fn solve(
        &mut self,
        op: &SurfaceOperator,
        rhs: &Field2D,
        eta: &mut Field2D,
        grid: &Grid,
    ) -> SolveStats {
        match self {
            EllipticSolver::Sor(solver) => solver.solve(op, rhs, eta, grid),
            EllipticSolver::Cg(solver) => solver.solve(op, rhs, eta, grid),
        }
    }
}

/// Statistics of one barotropic correction.
#[derive(Clone, Copy, Debug)]
pub struct BarotropicStats {
    /// Elliptic solve outcome.
    pub solve: SolveStats,
    /// Largest relative thickness rescaling applied, `max|r − 1|`.
    pub max_rescale: f64,
}

/// Workspace and fixed inputs of the barotropic correction.
///
/// All scratch fields are allocated once; `correct` runs every n-layer
/// step without allocating.
#[derive(Debug)]
pub struct BarotropicCorrector {
    op: SurfaceOperator,
    ub: Field2D,
    vb: Field2D,
    eta_star: Field2D,
    rhs: Field2D,
    freesurf_fac: f64,
    g_surface: f64,
    thickness_error: f64,
}

impl BarotropicCorrector {
    /// Assemble the operator and allocate scratch for the grid.
    pub fn new(
        grid: &Grid,
        depth: &Field2D,
        faces: &FaceMasks,
        g_surface: f64,
        freesurf_fac: f64,
        thickness_error: f64,
        dt: f64,
    ) -> Self {
        Self {
            op: SurfaceOperator::assemble(grid, depth, faces, g_surface, freesurf_fac, dt),
            ub: grid.field2d(),
            vb: grid.field2d(),
            eta_star: grid.field2d(),
            rhs: grid.field2d(),
            freesurf_fac,
            g_surface,
            thickness_error,
        }
    }

    /// The assembled operator (used by tests and diagnostics).
    pub fn operator(&self) -> &SurfaceOperator {
        &self.op
    }

    /// Run the correction on the provisional state after an AB3 step.
    ///
    /// Velocity masks must be re-applied by the caller afterwards.
    #[allow(clippy::too_many_arguments)]
    pub fn correct(
        &mut self,
        state: &mut State,
        grid: &Grid,
        depth: &Field2D,
        wet: &WetMask,
        solver: &mut EllipticSolver,
        dt: f64,
        step: u64,
    ) -> BarotropicStats {
        let layers = grid.layers;
        let fsf = self.freesurf_fac;

        // Face-integrated barotropic transport, with the free-surface
        // contribution folded into the top layer.
        for j in 1..=grid.ny {
            for i in 1..=grid.nx {
                let mut ub = 0.0;
                let mut vb = 0.0;
                for k in 0..layers {
                    let surf_c = if k == 0 { fsf * state.eta.get(i, j) } else { 0.0 };
                    let surf_w = if k == 0 { fsf * state.eta.get(i - 1, j) } else { 0.0 };
                    let surf_s = if k == 0 { fsf * state.eta.get(i, j - 1) } else { 0.0 };
                    let hc = state.h.get(i, j, k) + surf_c;
                    ub += state.u.get(i, j, k) * 0.5 * (hc + state.h.get(i - 1, j, k) + surf_w);
                    vb += state.v.get(i, j, k) * 0.5 * (hc + state.h.get(i, j - 1, k) + surf_s);
                }
                self.ub.set(i, j, ub);
                self.vb.set(i, j, vb);
            }
        }
        self.ub.wrap();
        self.vb.wrap();

        // Provisional free surface from the transport divergence.
        for j in 1..=grid.ny {
            for i in 1..=grid.nx {
                let div = (self.ub.get(i + 1, j) - self.ub.get(i, j)) / grid.dx
                    + (self.vb.get(i, j + 1) - self.vb.get(i, j)) / grid.dy;
                self.eta_star.set(i, j, fsf * state.eta.get(i, j) - dt * div);
            }
        }
        self.eta_star.wrap();

        let inv_dt2 = 1.0 / (dt * dt);
        for j in 0..=grid.ny + 1 {
            for i in 0..=grid.nx + 1 {
                self.rhs.set(i, j, -self.eta_star.get(i, j) * inv_dt2);
            }
        }

        // Solve for the new surface, starting from the provisional one.
        state.eta.copy_from(&self.eta_star);
        let solve = solver.solve(&self.op, &self.rhs, &mut state.eta, grid);

        for j in 1..=grid.ny {
            for i in 1..=grid.nx {
                let masked = state.eta.get(i, j) * wet.get(i, j);
                state.eta.set(i, j, masked);
            }
        }
        state.eta.wrap();

        // Surface-pressure correction of every layer's velocity.
        let coeff = dt * self.g_surface;
        for j in 1..=grid.ny {
            for i in 1..=grid.nx {
                let dpdx = (state.eta.get(i, j) - state.eta.get(i - 1, j)) / grid.dx;
                let dpdy = (state.eta.get(i, j) - state.eta.get(i, j - 1)) / grid.dy;
                for k in 0..layers {
                    state.u.add(i, j, k, -coeff * dpdx);
                    state.v.add(i, j, k, -coeff * dpdy);
                }
            }
        }
        state.u.wrap();
        state.v.wrap();

        // Rescale the column so the thicknesses agree with the surface.
        let mut max_rescale = 0.0f64;
        for j in 1..=grid.ny {
            for i in 1..=grid.nx {
                if !wet.is_wet(i, j) {
                    continue;
                }
                let mut column = 0.0;
                for k in 0..layers {
                    column += state.h.get(i, j, k);
                }
                if column <= 0.0 {
                    continue;
                }
                let ratio = (fsf * state.eta.get(i, j) + depth.get(i, j)) / column;
                max_rescale = max_rescale.max((ratio - 1.0).abs());
                for k in 0..layers {
                    state.h.set(i, j, k, state.h.get(i, j, k) * ratio);
                }
            }
        }
        state.h.wrap();

        if max_rescale > self.thickness_error {
            warn!(
                "step {step}: thickness/free-surface mismatch {max_rescale:.3e} \
                 exceeds thickness_error {:.3e}",
                self.thickness_error
            );
        }

        BarotropicStats { solve, max_rescale }
    }
}
