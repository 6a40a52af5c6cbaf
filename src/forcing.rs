//! External forcing: wind stress and sponge relaxation regions.
//!
//! Wind acts on the top layer only. Two variants are supported: an
//! absolute stress divided by `ρ₀` and the top-layer thickness, and a
//! relative-wind variant applying quadratic drag to the difference between
//! the 10 m wind and the surface current. Either can be modulated by a
//! per-step magnitude time series.
//!
//! Sponges relax the state toward a prescribed profile with a local time
//! scale: `S = γ(x,y,k) · (q_ref − q)`. A zero time scale disables the
//! term, so an absent sponge configuration is simply all-zero fields.

use crate::grid::{Field2D, Field3D, Grid};

/// How the wind fields are interpreted.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum WindVariant {
    /// `wind_x`, `wind_y` are stresses (N/m²); forcing is
    /// `2·τ / (ρ₀·(h + h_neighbor))`.
    Absolute,
    /// `wind_x`, `wind_y` are 10 m winds (m/s); forcing is
    /// `2·Cd·(w − u)·|w_rel| / (h + h_neighbor)`.
    Relative {
        /// Quadratic drag coefficient.
        cd: f64,
    },
}

/// Wind forcing state for a run.
#[derive(Clone, Debug)]
pub struct WindForcing {
    /// Zonal component at U points.
    pub wind_x: Field2D,
    /// Meridional component at V points.
    pub wind_y: Field2D,
    /// Stress vs relative-wind interpretation.
    pub variant: WindVariant,
    /// Per-step magnitude multipliers; empty means constant 1.
    pub magnitude_series: Vec<f64>,
    /// Whether snapshots also dump the modulated wind.
    pub dump_wind: bool,
}

impl WindForcing {
    /// Calm wind everywhere.
    pub fn calm(grid: &Grid) -> Self {
        Self {
            wind_x: grid.field2d(),
            wind_y: grid.field2d(),
            variant: WindVariant::Absolute,
            magnitude_series: Vec::new(),
            dump_wind: false,
        }
    }

    /// Magnitude multiplier for the given zero-based step index.
    ///
    /// Steps past the end of the series hold the last value.
    #[inline]
    pub fn magnitude_at(&self, step: usize) -> f64 {
        match self.magnitude_series.len() {
            0 => 1.0,
            n if step < n => self.magnitude_series[step],
            n => self.magnitude_series[n - 1],
        }
    }
}

/// Sponge relaxation rates and targets for all three prognostic fields.
///
/// Time scales are stored as rates (1/s); zero everywhere means no sponge.
#[derive(Clone, Debug)]
pub struct SpongeFields {
    /// Thickness relaxation rate at H points.
    pub h_rate: Field3D,
    /// Thickness relaxation target.
    pub h_target: Field3D,
    /// Zonal velocity relaxation rate at U points.
    pub u_rate: Field3D,
    /// Zonal velocity relaxation target.
    pub u_target: Field3D,
    /// Meridional velocity relaxation rate at V points.
    pub v_rate: Field3D,
    /// Meridional velocity relaxation target.
    pub v_target: Field3D,
}

impl SpongeFields {
    /// No sponge anywhere.
    pub fn none(grid: &Grid) -> Self {
        Self {
            h_rate: grid.field3d(),
            h_target: grid.field3d(),
            u_rate: grid.field3d(),
            u_target: grid.field3d(),
            v_rate: grid.field3d(),
            v_target: grid.field3d(),
        }
    }
}
