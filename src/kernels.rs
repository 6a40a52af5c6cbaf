//! Tendency stencil kernels on the C-grid.
//!
//! Each kernel writes one tendency field from read-only inputs over the
//! interior `1..=nx × 1..=ny` (all layers) and concludes with the periodic
//! wrap, so downstream stages may read one cell into the halo. The
//! staggered index conventions are load-bearing: an H-point quantity at
//! `(i,j)` sits between U points `i` and `i+1` and between V points `j`
//! and `j+1`; the Z point `(i,j)` is the cell's southwest corner.

use crate::forcing::{SpongeFields, WindForcing, WindVariant};
use crate::grid::{FaceMasks, Field2D, Field3D, Grid, WetMask};

/// Scalar parameters of the momentum equations.
#[derive(Clone, Copy, Debug)]
pub struct MomentumParams {
    /// Horizontal viscosity (m²/s).
    pub au: f64,
    /// Vertical momentum coupling between adjacent layers (1/s).
    pub ar: f64,
    /// Lateral slip parameter: 0 free-slip, 1 no-slip.
    pub slip: f64,
    /// Linear bottom drag (1/s), applied to the deepest layer in n-layer
    /// mode.
    pub bot_drag: f64,
    /// Reference density (kg/m³), divides the absolute wind stress.
    pub rho0: f64,
}

/// Thickness tendency at H points.
///
/// Sums four contributions: masked-reflecting horizontal diffusion,
/// vertical thickness diffusion, advective flux divergence with
/// face-averaged thickness, and sponge relaxation. In n-layer mode the
/// bottom layer's horizontal diffusion is replaced by the negative sum of
/// the other layers' so the diffusive part moves no net mass through the
/// column. The result is zeroed on dry cells.
#[allow(clippy::too_many_arguments)]
pub fn thickness_tendency(
    dhdt: &mut Field3D,
    grid: &Grid,
    h: &Field3D,
    u: &Field3D,
    v: &Field3D,
    wet: &WetMask,
    sponge: &SpongeFields,
    kh: &[f64],
    kv: f64,
    n_layer: bool,
) {
    let layers = grid.layers;
    let inv_dx2 = 1.0 / (grid.dx * grid.dx);
    let inv_dy2 = 1.0 / (grid.dy * grid.dy);
    let inv_dx = 1.0 / grid.dx;
    let inv_dy = 1.0 / grid.dy;
    let mut hordiff = vec![0.0; layers];

    for j in 1..=grid.ny {
        for i in 1..=grid.nx {
            let mask = wet.get(i, j);

            // Horizontal diffusion with reflecting neighbors: a dry
            // neighbor contributes the cell's own value, so the Laplacian
            // sees no gradient across land.
            for (k, slot) in hordiff.iter_mut().enumerate() {
                let hc = h.get(i, j, k);
                let hw = if wet.is_wet(i - 1, j) { h.get(i - 1, j, k) } else { hc };
                let he = if wet.is_wet(i + 1, j) { h.get(i + 1, j, k) } else { hc };
                let hs = if wet.is_wet(i, j - 1) { h.get(i, j - 1, k) } else { hc };
                let hn = if wet.is_wet(i, j + 1) { h.get(i, j + 1, k) } else { hc };
                *slot = kh[k] * ((hw - 2.0 * hc + he) * inv_dx2 + (hs - 2.0 * hc + hn) * inv_dy2);
            }
            if n_layer {
                let upper_sum: f64 = hordiff[..layers - 1].iter().sum();
                hordiff[layers - 1] = -upper_sum;
            }

            for k in 0..layers {
                let hc = h.get(i, j, k);
                let mut tendency = hordiff[k];

                // Vertical thickness diffusion: differences of kv/h with
                // the adjacent layers, one-sided at the top and bottom.
                // A thin layer has a large kv/h and gains mass from its
                // neighbors; the column total is unchanged.
                if kv != 0.0 && layers > 1 {
                    if k > 0 {
                        tendency += kv * (1.0 / hc - 1.0 / h.get(i, j, k - 1));
                    }
                    if k < layers - 1 {
                        tendency += kv * (1.0 / hc - 1.0 / h.get(i, j, k + 1));
                    }
                }

                // Advective flux divergence with face-centered thickness.
                let flux_w = u.get(i, j, k) * 0.5 * (hc + h.get(i - 1, j, k));
                let flux_e = u.get(i + 1, j, k) * 0.5 * (h.get(i + 1, j, k) + hc);
                let flux_s = v.get(i, j, k) * 0.5 * (hc + h.get(i, j - 1, k));
                let flux_n = v.get(i, j + 1, k) * 0.5 * (h.get(i, j + 1, k) + hc);
                tendency -= (flux_e - flux_w) * inv_dx + (flux_n - flux_s) * inv_dy;

                tendency += sponge.h_rate.get(i, j, k) * (sponge.h_target.get(i, j, k) - hc);

                dhdt.set(i, j, k, tendency * mask);
            }
        }
    }
    dhdt.wrap();
}

/// Zonal momentum tendency at U points.
#[allow(clippy::too_many_arguments)]
pub fn zonal_momentum_tendency(
    dudt: &mut Field3D,
    grid: &Grid,
    h: &Field3D,
    u: &Field3D,
    v: &Field3D,
    b: &Field3D,
    zeta: &Field3D,
    fu: &Field2D,
    faces: &FaceMasks,
    sponge: &SpongeFields,
    wind: &WindForcing,
    wind_scale: f64,
    params: &MomentumParams,
    n_layer: bool,
) {
    let layers = grid.layers;
    let inv_dx = 1.0 / grid.dx;
    let inv_dx2 = inv_dx * inv_dx;
    let inv_dy2 = 1.0 / (grid.dy * grid.dy);
    let ghost = 1.0 - 2.0 * params.slip;

    for j in 1..=grid.ny {
        for i in 1..=grid.nx {
            for k in 0..layers {
                let uc = u.get(i, j, k);

                // Horizontal viscosity. Across a closed north or south
                // face the missing neighbor becomes the slip ghost value
                // (1-2*slip)*u: +u for free slip, -u for no slip.
                let un = if faces.n.get(i, j) == 0.0 { ghost * uc } else { u.get(i, j + 1, k) };
                let us = if faces.s.get(i, j) == 0.0 { ghost * uc } else { u.get(i, j - 1, k) };
                let mut tendency = params.au
                    * ((u.get(i + 1, j, k) - 2.0 * uc + u.get(i - 1, j, k)) * inv_dx2
                        + (un - 2.0 * uc + us) * inv_dy2);

                // Planetary plus relative vorticity advecting the
                // surrounding meridional flow.
                let zeta_u = 0.5 * (zeta.get(i, j, k) + zeta.get(i, j + 1, k));
                let v_sum = v.get(i - 1, j, k)
                    + v.get(i, j, k)
                    + v.get(i - 1, j + 1, k)
                    + v.get(i, j + 1, k);
                tendency += 0.25 * (fu.get(i, j) + zeta_u) * v_sum;

                tendency -= (b.get(i, j, k) - b.get(i - 1, j, k)) * inv_dx;

                tendency += sponge.u_rate.get(i, j, k) * (sponge.u_target.get(i, j, k) - uc);

                if k == 0 {
                    let h_pair = h.get(i, j, 0) + h.get(i - 1, j, 0);
                    let wx = wind.wind_x.get(i, j) * wind_scale;
                    match wind.variant {
                        WindVariant::Absolute => {
                            tendency += 2.0 * wx / (params.rho0 * h_pair);
                        }
                        WindVariant::Relative { cd } => {
                            let wy = 0.25
                                * (wind.wind_y.get(i - 1, j)
                                    + wind.wind_y.get(i, j)
                                    + wind.wind_y.get(i - 1, j + 1)
                                    + wind.wind_y.get(i, j + 1))
                                * wind_scale;
                            let v_at_u = 0.25 * v_sum;
                            let rel = ((wx - uc) * (wx - uc) + (wy - v_at_u) * (wy - v_at_u))
                                .sqrt();
                            tendency += 2.0 * cd * (wx - uc) * rel / h_pair;
                        }
                    }
                }

                if layers > 1 {
                    if k == 0 {
                        tendency -= params.ar * (uc - u.get(i, j, 1));
                    } else if k == layers - 1 {
                        tendency -= params.ar * (uc - u.get(i, j, k - 1));
                    } else {
                        tendency -=
                            params.ar * (2.0 * uc - u.get(i, j, k - 1) - u.get(i, j, k + 1));
                    }
                }
                if n_layer && k == layers - 1 {
                    tendency -= params.bot_drag * uc;
                }

                dudt.set(i, j, k, tendency);
            }
        }
    }
    dudt.wrap();
}

/// Meridional momentum tendency at V points: the mirror of
/// [`zonal_momentum_tendency`] across the grid axes.
#[allow(clippy::too_many_arguments)]
pub fn meridional_momentum_tendency(
    dvdt: &mut Field3D,
    grid: &Grid,
    h: &Field3D,
    u: &Field3D,
    v: &Field3D,
    b: &Field3D,
    zeta: &Field3D,
    fv: &Field2D,
    faces: &FaceMasks,
    sponge: &SpongeFields,
    wind: &WindForcing,
    wind_scale: f64,
    params: &MomentumParams,
    n_layer: bool,
) {
    let layers = grid.layers;
    let inv_dy = 1.0 / grid.dy;
    let inv_dy2 = inv_dy * inv_dy;
    let inv_dx2 = 1.0 / (grid.dx * grid.dx);
    let ghost = 1.0 - 2.0 * params.slip;

    for j in 1..=grid.ny {
        for i in 1..=grid.nx {
            for k in 0..layers {
                let vc = v.get(i, j, k);

                let vw = if faces.w.get(i, j) == 0.0 { ghost * vc } else { v.get(i - 1, j, k) };
                let ve = if faces.e.get(i, j) == 0.0 { ghost * vc } else { v.get(i + 1, j, k) };
                let mut tendency = params.au
                    * ((vw - 2.0 * vc + ve) * inv_dx2
                        + (v.get(i, j + 1, k) - 2.0 * vc + v.get(i, j - 1, k)) * inv_dy2);

                let zeta_v = 0.5 * (zeta.get(i, j, k) + zeta.get(i + 1, j, k));
                let u_sum = u.get(i, j - 1, k)
                    + u.get(i, j, k)
                    + u.get(i + 1, j - 1, k)
                    + u.get(i + 1, j, k);
                tendency -= 0.25 * (fv.get(i, j) + zeta_v) * u_sum;

                tendency -= (b.get(i, j, k) - b.get(i, j - 1, k)) * inv_dy;

                tendency += sponge.v_rate.get(i, j, k) * (sponge.v_target.get(i, j, k) - vc);

                if k == 0 {
                    let h_pair = h.get(i, j, 0) + h.get(i, j - 1, 0);
                    let wy = wind.wind_y.get(i, j) * wind_scale;
                    match wind.variant {
                        WindVariant::Absolute => {
                            tendency += 2.0 * wy / (params.rho0 * h_pair);
                        }
                        WindVariant::Relative { cd } => {
                            let wx = 0.25
                                * (wind.wind_x.get(i, j - 1)
                                    + wind.wind_x.get(i, j)
                                    + wind.wind_x.get(i + 1, j - 1)
                                    + wind.wind_x.get(i + 1, j))
                                * wind_scale;
                            let u_at_v = 0.25 * u_sum;
                            let rel = ((wx - u_at_v) * (wx - u_at_v) + (wy - vc) * (wy - vc))
                                .sqrt();
                            tendency += 2.0 * cd * (wy - vc) * rel / h_pair;
                        }
                    }
                }

                if layers > 1 {
                    if k == 0 {
                        tendency -= params.ar * (vc - v.get(i, j, 1));
                    } else if k == layers - 1 {
                        tendency -= params.ar * (vc - v.get(i, j, k - 1));
                    } else {
                        tendency -=
                            params.ar * (2.0 * vc - v.get(i, j, k - 1) - v.get(i, j, k + 1));
                    }
                }
                if n_layer && k == layers - 1 {
                    tendency -= params.bot_drag * vc;
                }

                dvdt.set(i, j, k, tendency);
            }
        }
    }
    dvdt.wrap();
}

/// Zero the normal velocity on closed faces and any velocity in dry cells:
/// `u *= hfacW · wetmask`, `v *= hfacS · wetmask`, per layer.
pub fn apply_velocity_masks(
    u: &mut Field3D,
    v: &mut Field3D,
    grid: &Grid,
    wet: &WetMask,
    faces: &FaceMasks,
) {
    for k in 0..grid.layers {
        for j in 0..=grid.ny + 1 {
            for i in 0..=grid.nx + 1 {
                let mask = wet.get(i, j);
                u.set(i, j, k, u.get(i, j, k) * faces.w.get(i, j) * mask);
                v.set(i, j, k, v.get(i, j, k) * faces.s.get(i, j) * mask);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Grid;

    fn params() -> MomentumParams {
        MomentumParams {
            au: 0.0,
            ar: 0.0,
            slip: 0.0,
            bot_drag: 0.0,
            rho0: 1026.0,
        }
    }

    fn flat_setup(grid: &Grid, h0: f64) -> (Field3D, Field3D, Field3D) {
        let mut h = grid.field3d();
        h.fill(h0);
        (h, grid.field3d(), grid.field3d())
    }

    #[test]
    fn test_thickness_tendency_vanishes_at_rest() {
        let grid = Grid::new(6, 6, 1, 1e4, 1e4);
        let (h, u, v) = flat_setup(&grid, 400.0);
        let wet = WetMask::all_wet(&grid);
        let sponge = SpongeFields::none(&grid);
        let mut dhdt = grid.field3d();
        thickness_tendency(&mut dhdt, &grid, &h, &u, &v, &wet, &sponge, &[100.0], 0.0, false);
        for j in 1..=6 {
            for i in 1..=6 {
                assert_eq!(dhdt.get(i, j, 0), 0.0);
            }
        }
    }

    #[test]
    fn test_thickness_diffusion_reflects_at_land() {
        // A thickness bump next to a dry cell: the land face carries no
        // diffusive flux, so mass leaks only through open faces.
        let grid = Grid::new(6, 6, 1, 1e3, 1e3);
        let wet = WetMask::rectangular_pool(&grid);
        let sponge = SpongeFields::none(&grid);
        let (mut h, u, v) = flat_setup(&grid, 100.0);
        h.set(2, 3, 0, 110.0);
        let mut dhdt = grid.field3d();
        thickness_tendency(&mut dhdt, &grid, &h, &u, &v, &wet, &sponge, &[10.0], 0.0, false);
        // The bump diffuses away...
        assert!(dhdt.get(2, 3, 0) < 0.0);
        // ...into wet neighbors only; the dry cell stays untouched.
        assert!(dhdt.get(3, 3, 0) > 0.0);
        assert_eq!(dhdt.get(1, 3, 0), 0.0);
    }

    #[test]
    fn test_bottom_layer_diffusion_closes_column() {
        let grid = Grid::new(5, 5, 3, 1e3, 1e3);
        let wet = WetMask::all_wet(&grid);
        let sponge = SpongeFields::none(&grid);
        let mut h = grid.field3d();
        h.fill(100.0);
        h.set(3, 3, 0, 120.0);
        h.set(3, 3, 1, 90.0);
        let u = grid.field3d();
        let v = grid.field3d();
        let mut dhdt = grid.field3d();
        thickness_tendency(
            &mut dhdt, &grid, &h, &u, &v, &wet, &sponge, &[50.0, 50.0, 50.0], 0.0, true,
        );
        for j in 1..=5 {
            for i in 1..=5 {
                let column: f64 = (0..3).map(|k| dhdt.get(i, j, k)).sum();
                assert!(
                    column.abs() < 1e-12,
                    "diffusive column sum at ({i},{j}) = {column}"
                );
            }
        }
    }

    #[test]
    fn test_vertical_thickness_diffusion_thickens_thin_layer() {
        let grid = Grid::new(4, 4, 2, 1e3, 1e3);
        let wet = WetMask::all_wet(&grid);
        let sponge = SpongeFields::none(&grid);
        let mut h = grid.field3d();
        for j in 0..=5 {
            for i in 0..=5 {
                h.set(i, j, 0, 10.0);
                h.set(i, j, 1, 500.0);
            }
        }
        let u = grid.field3d();
        let v = grid.field3d();
        let mut dhdt = grid.field3d();
        thickness_tendency(&mut dhdt, &grid, &h, &u, &v, &wet, &sponge, &[0.0, 0.0], 1e-4, false);
        assert!(dhdt.get(2, 2, 0) > 0.0);
        assert!((dhdt.get(2, 2, 0) + dhdt.get(2, 2, 1)).abs() < 1e-15);
    }

    #[test]
    fn test_pressure_gradient_accelerates_downslope() {
        // b increasing eastward -> du/dt negative.
        let grid = Grid::new(5, 5, 1, 1e3, 1e3);
        let wet = WetMask::all_wet(&grid);
        let faces = FaceMasks::derive(&grid, &wet);
        let sponge = SpongeFields::none(&grid);
        let wind = WindForcing::calm(&grid);
        let (h, u, v) = flat_setup(&grid, 100.0);
        let mut b = grid.field3d();
        for j in 0..=6 {
            for i in 0..=6 {
                b.set(i, j, 0, i as f64);
            }
        }
        let zeta = grid.field3d();
        let fu = grid.field2d();
        let mut dudt = grid.field3d();
        zonal_momentum_tendency(
            &mut dudt, &grid, &h, &u, &v, &b, &zeta, &fu, &faces, &sponge, &wind, 1.0,
            &params(), false,
        );
        assert!((dudt.get(3, 3, 0) + 1.0 / 1e3).abs() < 1e-12);
    }

    #[test]
    fn test_coriolis_turns_meridional_flow() {
        let grid = Grid::new(5, 5, 1, 1e3, 1e3);
        let wet = WetMask::all_wet(&grid);
        let faces = FaceMasks::derive(&grid, &wet);
        let sponge = SpongeFields::none(&grid);
        let wind = WindForcing::calm(&grid);
        let (h, u, mut v) = flat_setup(&grid, 100.0);
        v.fill(0.5);
        let b = grid.field3d();
        let zeta = grid.field3d();
        let f0 = 1e-4;
        let fu = Field2D::constant(5, 5, f0);
        let mut dudt = grid.field3d();
        zonal_momentum_tendency(
            &mut dudt, &grid, &h, &u, &v, &b, &zeta, &fu, &faces, &sponge, &wind, 1.0,
            &params(), false,
        );
        // du/dt = +f*v for uniform northward flow.
        assert!((dudt.get(3, 3, 0) - f0 * 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_wind_forces_only_top_layer() {
        let grid = Grid::new(5, 5, 2, 1e3, 1e3);
        let wet = WetMask::all_wet(&grid);
        let faces = FaceMasks::derive(&grid, &wet);
        let sponge = SpongeFields::none(&grid);
        let mut wind = WindForcing::calm(&grid);
        for j in 0..=6 {
            for i in 0..=6 {
                wind.wind_x.set(i, j, 0.1);
            }
        }
        let mut h = grid.field3d();
        h.fill(200.0);
        let u = grid.field3d();
        let v = grid.field3d();
        let b = grid.field3d();
        let zeta = grid.field3d();
        let fu = grid.field2d();
        let mut dudt = grid.field3d();
        zonal_momentum_tendency(
            &mut dudt, &grid, &h, &u, &v, &b, &zeta, &fu, &faces, &sponge, &wind, 1.0,
            &params(), false,
        );
        let expected = 2.0 * 0.1 / (1026.0 * 400.0);
        assert!((dudt.get(3, 3, 0) - expected).abs() < 1e-15);
        assert_eq!(dudt.get(3, 3, 1), 0.0);
    }

    #[test]
    fn test_velocity_masks_zero_closed_faces() {
        let grid = Grid::new(6, 6, 1, 1.0, 1.0);
        let wet = WetMask::rectangular_pool(&grid);
        let faces = FaceMasks::derive(&grid, &wet);
        let mut u = grid.field3d();
        let mut v = grid.field3d();
        u.fill(1.0);
        v.fill(1.0);
        apply_velocity_masks(&mut u, &mut v, &grid, &wet, &faces);
        // Face between dry (1,3) and wet (2,3) is closed.
        assert_eq!(u.get(2, 3, 0), 0.0);
        // Interior wet-wet face keeps its velocity.
        assert_eq!(u.get(3, 3, 0), 1.0);
        // Dry cells carry no velocity at all.
        assert_eq!(v.get(1, 1, 0), 0.0);
    }
}
