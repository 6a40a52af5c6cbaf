//! Time integration: model state, the tendency history and the
//! Adams–Bashforth 3 / Runge–Kutta 2 arithmetic.
//!
//! The main integrator is third-order Adams–Bashforth, which needs the
//! tendencies of the two previous steps. These live in a triple buffer of
//! named slots (current, old, very old) rotated by two swaps per step,
//! with no copies and no reallocation. A fresh run primes the history with two
//! half-step Runge–Kutta rounds; a restarted run loads it from the
//! checkpoint instead.

use std::mem;

use crate::grid::{Field2D, Field3D, Grid};

/// The prognostic fields advanced by the integrator.
///
/// The free surface `eta` is carried only in n-layer mode; reduced-gravity
/// runs keep it allocated but identically zero and never read it.
#[derive(Clone, Debug)]
pub struct State {
    /// Layer thickness at H points.
    pub h: Field3D,
    /// Zonal velocity at U points.
    pub u: Field3D,
    /// Meridional velocity at V points.
    pub v: Field3D,
    /// Free-surface anomaly at H points.
    pub eta: Field2D,
}

impl State {
    /// Zero state shaped for the grid.
    pub fn zeros(grid: &Grid) -> Self {
        Self {
            h: grid.field3d(),
            u: grid.field3d(),
            v: grid.field3d(),
            eta: grid.field2d(),
        }
    }

    /// Copy every field from `other`.
    pub fn copy_from(&mut self, other: &Self) {
        self.h.copy_from(&other.h);
        self.u.copy_from(&other.u);
        self.v.copy_from(&other.v);
        self.eta.copy_from(&other.eta);
    }

    /// `self += c * tendencies` on the three prognostic fields.
    ///
    /// `eta` is not touched here: it only changes through the barotropic
    /// correction.
    pub fn add_scaled(&mut self, c: f64, tendencies: &Tendencies) {
        self.h.axpy(c, &tendencies.dh);
        self.u.axpy(c, &tendencies.du);
        self.v.axpy(c, &tendencies.dv);
    }

    /// Apply the periodic wrap to every prognostic field.
    pub fn wrap(&mut self) {
        self.h.wrap();
        self.u.wrap();
        self.v.wrap();
        self.eta.wrap();
    }
}

/// One snapshot of the three tendency fields.
#[derive(Clone, Debug)]
pub struct Tendencies {
    /// Thickness tendency.
    pub dh: Field3D,
    /// Zonal momentum tendency.
    pub du: Field3D,
    /// Meridional momentum tendency.
    pub dv: Field3D,
}

impl Tendencies {
    /// Zero tendencies shaped for the grid.
    pub fn zeros(grid: &Grid) -> Self {
        Self {
            dh: grid.field3d(),
            du: grid.field3d(),
            dv: grid.field3d(),
        }
    }
}

/// Triple-buffered tendency history for Adams–Bashforth 3.
#[derive(Clone, Debug)]
pub struct TendencyHistory {
    /// Tendencies of the step being taken.
    pub current: Tendencies,
    /// Tendencies of the previous step.
    pub old: Tendencies,
    /// Tendencies of the step before that.
    pub very_old: Tendencies,
}

impl TendencyHistory {
    /// Zero history shaped for the grid.
    pub fn zeros(grid: &Grid) -> Self {
        Self {
            current: Tendencies::zeros(grid),
            old: Tendencies::zeros(grid),
            very_old: Tendencies::zeros(grid),
        }
    }

    /// Age the history by one step: very old takes old, old takes
    /// current. The buffer left in `current` holds stale values and is
    /// fully overwritten by the next tendency evaluation.
    pub fn rotate(&mut self) {
        mem::swap(&mut self.very_old, &mut self.old);
        mem::swap(&mut self.old, &mut self.current);
    }
}

/// Third-order Adams–Bashforth combination:
/// `s += dt · (23·f − 16·f_old + 5·f_very_old) / 12`.
pub fn adams_bashforth3_step(state: &mut State, history: &TendencyHistory, dt: f64) {
    let c = dt / 12.0;
    state.add_scaled(23.0 * c, &history.current);
    state.add_scaled(-16.0 * c, &history.old);
    state.add_scaled(5.0 * c, &history.very_old);
}

/// Forward-Euler-at-half-point stage of the bootstrap: write
/// `base + (dt/2)·f` into `target`.
pub fn half_step(target: &mut State, base: &State, tendencies: &Tendencies, dt: f64) {
    target.copy_from(base);
    target.add_scaled(0.5 * dt, tendencies);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> Grid {
        Grid::new(3, 3, 1, 1.0, 1.0)
    }

    fn constant_tendencies(grid: &Grid, value: f64) -> Tendencies {
        let mut t = Tendencies::zeros(grid);
        t.dh.fill(value);
        t.du.fill(value);
        t.dv.fill(value);
        t
    }

    #[test]
    fn test_ab3_weights() {
        let grid = grid();
        let mut state = State::zeros(&grid);
        let history = TendencyHistory {
            current: constant_tendencies(&grid, 1.0),
            old: constant_tendencies(&grid, 1.0),
            very_old: constant_tendencies(&grid, 1.0),
        };
        adams_bashforth3_step(&mut state, &history, 12.0);
        // (23 - 16 + 5)/12 * 12 = 12.
        assert!((state.h.get(1, 1, 0) - 12.0).abs() < 1e-12);
    }

    #[test]
    fn test_ab3_exactness_for_constant_tendency() {
        // With equal history a constant-tendency step must reduce to
        // forward Euler.
        let grid = grid();
        let mut state = State::zeros(&grid);
        let history = TendencyHistory {
            current: constant_tendencies(&grid, 2.0),
            old: constant_tendencies(&grid, 2.0),
            very_old: constant_tendencies(&grid, 2.0),
        };
        adams_bashforth3_step(&mut state, &history, 0.5);
        assert!((state.u.get(2, 2, 0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_history_rotation_is_two_swaps() {
        let grid = grid();
        let mut history = TendencyHistory {
            current: constant_tendencies(&grid, 3.0),
            old: constant_tendencies(&grid, 2.0),
            very_old: constant_tendencies(&grid, 1.0),
        };
        history.rotate();
        assert_eq!(history.very_old.dh.get(1, 1, 0), 2.0);
        assert_eq!(history.old.dh.get(1, 1, 0), 3.0);
        // The recycled buffer holds the stale very-old values.
        assert_eq!(history.current.dh.get(1, 1, 0), 1.0);
    }

    #[test]
    fn test_half_step() {
        let grid = grid();
        let mut base = State::zeros(&grid);
        base.h.fill(10.0);
        let tendencies = constant_tendencies(&grid, 4.0);
        let mut target = State::zeros(&grid);
        half_step(&mut target, &base, &tendencies, 1.0);
        assert!((target.h.get(1, 1, 0) - 12.0).abs() < 1e-12);
        // Base untouched.
        assert_eq!(base.h.get(1, 1, 0), 10.0);
    }
}
