//! Jacobi-preconditioned conjugate gradients for the surface-pressure
//! equation.
//!
//! The operator is applied matrix-free from the assembled five-point
//! stencil, so the solver shares the exact discretization with the SOR
//! path and honors the same interface: right-hand side `−η*/dt²`, initial
//! guess `η*`, relative tolerance `eps`, iteration cap `maxits`. All work
//! vectors are allocated once with the solver and reused every step.

use log::warn;

use crate::grid::{Field2D, Grid};

use super::{SolveStats, SurfaceOperator};

/// Conjugate-gradient solver with diagonal preconditioning.
#[derive(Clone, Debug)]
pub struct CgSolver {
    eps: f64,
    maxits: usize,
    r: Field2D,
    z: Field2D,
    p: Field2D,
    ap: Field2D,
}

impl CgSolver {
    /// Create a solver with workspace shaped for the grid.
    pub fn new(grid: &Grid, eps: f64, maxits: usize) -> Self {
        Self {
            eps,
            maxits,
            r: grid.field2d(),
            z: grid.field2d(),
            p: grid.field2d(),
            ap: grid.field2d(),
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
        let (nx, ny) = (grid.nx, grid.ny);

        eta.wrap();
        // r = b - A*x0
        for j in 1..=ny {
            for i in 1..=nx {
                self.r.set(i, j, rhs.get(i, j) - op.apply_at(eta, i, j));
            }
        }

        let b_norm = dot_interior(rhs, rhs, nx, ny).sqrt();
        if b_norm < 1e-300 {
            return SolveStats {
                iterations: 0,
                converged: true,
                residual_ratio: 0.0,
            };
        }

        apply_jacobi(&mut self.z, &self.r, op, nx, ny);
        self.p.copy_from(&self.z);
        self.p.wrap();
        let mut rho = dot_interior(&self.r, &self.z, nx, ny);
        let mut ratio = dot_interior(&self.r, &self.r, nx, ny).sqrt() / b_norm;

        for iteration in 1..=self.maxits {
            for j in 1..=ny {
                for i in 1..=nx {
                    self.ap.set(i, j, op.apply_at(&self.p, i, j));
                }
            }
            let p_ap = dot_interior(&self.p, &self.ap, nx, ny);
            if p_ap.abs() < 1e-300 {
                break;
            }
            let alpha = rho / p_ap;

            for j in 1..=ny {
                for i in 1..=nx {
                    eta.add(i, j, alpha * self.p.get(i, j));
                    self.r.add(i, j, -alpha * self.ap.get(i, j));
                }
            }

            let r_norm = dot_interior(&self.r, &self.r, nx, ny).sqrt();
            ratio = r_norm / b_norm;
            if ratio < self.eps {
                eta.wrap();
                return SolveStats {
                    iterations: iteration,
                    converged: true,
                    residual_ratio: ratio,
                };
            }

            apply_jacobi(&mut self.z, &self.r, op, nx, ny);
            let rho_new = dot_interior(&self.r, &self.z, nx, ny);
            let beta = rho_new / rho;
            rho = rho_new;
            for j in 1..=ny {
                for i in 1..=nx {
                    self.p.set(i, j, self.z.get(i, j) + beta * self.p.get(i, j));
                }
            }
            self.p.wrap();
        }

        eta.wrap();
        warn!(
            "conjugate-gradient surface solver did not converge within {} iterations \
             (residual ratio {:.3e})",
            self.maxits, ratio
        );
        SolveStats {
            iterations: self.maxits,
            converged: false,
            residual_ratio: ratio,
        }
    }
}

/// `z = r / diag(A)`, falling back to `z = r` where the diagonal vanishes.
fn apply_jacobi(z: &mut Field2D, r: &Field2D, op: &SurfaceOperator, nx: usize, ny: usize) {
    for j in 1..=ny {
        for i in 1..=nx {
            let d = op.center(i, j);
            let value = if d.abs() > 1e-30 {
                r.get(i, j) / d
            } else {
                r.get(i, j)
            };
            z.set(i, j, value);
        }
    }
}

fn dot_interior(a: &Field2D, b: &Field2D, nx: usize, ny: usize) -> f64 {
    let mut sum = 0.0;
    for j in 1..=ny {
        for i in 1..=nx {
            sum += a.get(i, j) * b.get(i, j);
        }
    }
    sum
}
