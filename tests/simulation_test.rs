//! Integration tests for complete simulations.
//!
//! These exercise the wired model end to end:
//! - reduced-gravity spin-up with diagnostics and snapshots
//! - two-layer n-layer run staying at rest with a flat free surface
//! - a one-wet-cell domain where no forcing can move anything
//! - a wind-driven gyre spinning up with the imposed curl
//! - translation symmetry on a fully wet periodic domain
//! - mass conservation in n-layer mode

use std::fs;
use std::path::{Path, PathBuf};

use aronnax::{
    io::write_field2, io::write_field3, Grid, Model, RunConfig, Stagger, WetMask,
};

fn run_dir(name: &str) -> PathBuf {
    let mut dir = std::env::temp_dir();
    dir.push(format!("aronnax-sim-test-{}-{name}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(dir.join("input")).unwrap();
    dir
}

fn config(text: &str) -> RunConfig {
    RunConfig::from_toml_str(text).unwrap()
}

const REDUCED_GRAVITY_POOL: &str = r#"
    [numerics]
    dt = 600.0
    nTimeSteps = 200
    dumpFreq = 6.0e4
    diagFreq = 1.2e4
    hmin = 100.0

    [model]
    hmean = [400.0]
    H0 = 2000.0
    RedGrav = true

    [physics]
    g_vec = [0.01]

    [grid]
    nx = 10
    ny = 10
    layers = 1
    dx = 2.0e4
    dy = 2.0e4
    wetMaskFile = ":rectangular_pool:"
    fUfile = ":f_plane_f_u:1e-4"
    fVfile = ":f_plane_f_v:1e-4"
"#;

#[test]
fn test_reduced_gravity_spin_up_completes() {
    let dir = run_dir("rg-spinup");
    let mut model = Model::new(config(REDUCED_GRAVITY_POOL), &dir).unwrap();
    let summary = model.run().unwrap();
    assert_eq!(summary.final_step, 200);

    // Thickness stays bounded near its mean; nothing blew up.
    let state = model.state();
    for j in 1..=10 {
        for i in 1..=10 {
            let h = state.h.get(i, j, 0);
            assert!(h.is_finite());
            assert!((h - 400.0).abs() < 5.0, "h({i},{j}) = {h}");
        }
    }

    // dumpFreq = 100 steps: snapshots at n = 1 and n = 101.
    assert_eq!(summary.outputs.snapshots, 2);
    assert!(dir.join("output/snap.h.0000000001").exists());
    assert!(dir.join("output/snap.h.0000000101").exists());
    let h_bytes = fs::metadata(dir.join("output/snap.h.0000000001")).unwrap().len();
    let u_bytes = fs::metadata(dir.join("output/snap.u.0000000001")).unwrap().len();
    assert_eq!(h_bytes, 10 * 10 * 8);
    assert_eq!(u_bytes, 11 * 10 * 8);

    // diagFreq = 20 steps: rows at n = 1, 21, ..., 181 plus the header.
    let diag = fs::read_to_string(dir.join("output/diagnostic.h.csv")).unwrap();
    let lines: Vec<&str> = diag.lines().collect();
    assert_eq!(lines.len(), 11);
    assert!(lines[0].starts_with("timestep,mean01,max01,min01,std01"));
    assert!(lines[1].starts_with("1,"));

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_two_layer_n_layer_stays_at_rest() {
    let dir = run_dir("two-layer-rest");
    let text = r#"
        [numerics]
        dt = 100.0
        nTimeSteps = 50
        slip = 0.0
        eps = 1.0e-9
        freesurfFac = 1.0

        [model]
        hmean = [400.0, 1600.0]
        H0 = 2000.0
        RedGrav = false

        [physics]
        g_vec = [9.8, 0.02]
        rho0 = 1026.0

        [grid]
        nx = 10
        ny = 10
        layers = 2
        dx = 2.0e4
        dy = 2.0e4
        wetMaskFile = ":rectangular_pool:"
        fUfile = ":f_plane_f_u:1.4e-4"
        fVfile = ":f_plane_f_v:1.4e-4"
    "#;
    let mut model = Model::new(config(text), &dir).unwrap();
    model.run().unwrap();

    let state = model.state();
    let wet = WetMask::rectangular_pool(model.grid());
    for j in 1..=10 {
        for i in 1..=10 {
            if !wet.is_wet(i, j) {
                continue;
            }
            // The free surface never moves away from flat...
            assert!(state.eta.get(i, j).abs() < 1e-8, "eta({i},{j})");
            // ...velocities stay at rest...
            assert!(state.u.get(i, j, 0).abs() < 1e-10);
            assert!(state.v.get(i, j, 1).abs() < 1e-10);
            // ...and the column closes onto the bathymetry.
            let column = state.h.get(i, j, 0) + state.h.get(i, j, 1);
            let target = 2000.0 + state.eta.get(i, j);
            assert!((column - target).abs() <= 1e-2 * 2000.0);
            assert!((state.h.get(i, j, 0) - 400.0).abs() < 1e-6);
        }
    }
    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_single_wet_cell_is_immovable() {
    let dir = run_dir("one-wet-cell");
    let grid = Grid::new(8, 8, 1, 1e4, 1e4);

    // Wet mask with exactly one fluid cell, written as a raw input file.
    let mut mask = grid.field2d();
    mask.set(4, 4, 1.0);
    write_field2(&dir.join("input/wetmask.bin"), &mask, &grid, Stagger::HPoint).unwrap();

    // Strong wind trying to push the fluid around.
    let mut wind = grid.field2d();
    wind.fill(1.0);
    write_field2(&dir.join("input/wind_x.bin"), &wind, &grid, Stagger::UPoint).unwrap();

    let text = r#"
        [numerics]
        dt = 600.0
        nTimeSteps = 100
        kh = [100.0]

        [model]
        hmean = [400.0]
        H0 = 2000.0
        RedGrav = true

        [physics]
        g_vec = [0.01]

        [grid]
        nx = 8
        ny = 8
        layers = 1
        dx = 1.0e4
        dy = 1.0e4
        wetMaskFile = "input/wetmask.bin"

        [external_forcing]
        zonalWindFile = "input/wind_x.bin"
    "#;
    let mut model = Model::new(config(text), &dir).unwrap();
    model.run().unwrap();

    let state = model.state();
    for j in 1..=8 {
        for i in 1..=8 {
            assert_eq!(state.u.get(i, j, 0), 0.0, "u({i},{j})");
            assert_eq!(state.v.get(i, j, 0), 0.0, "v({i},{j})");
            assert_eq!(state.h.get(i, j, 0), 400.0, "h({i},{j})");
        }
    }
    fs::remove_dir_all(&dir).unwrap();
}

fn gyre_config(n_steps: u64) -> String {
    format!(
        r#"
        [numerics]
        dt = 600.0
        nTimeSteps = {n_steps}
        au = 500.0
        slip = 0.0
        hmin = 100.0

        [model]
        hmean = [400.0]
        H0 = 2000.0
        RedGrav = true

        [physics]
        g_vec = [0.01]
        rho0 = 1026.0

        [grid]
        nx = 16
        ny = 16
        layers = 1
        dx = 2.0e4
        dy = 2.0e4
        wetMaskFile = ":rectangular_pool:"
        fUfile = ":f_plane_f_u:1e-4"
        fVfile = ":f_plane_f_v:1e-4"

        [external_forcing]
        zonalWindFile = "input/tau_x.bin"
    "#
    )
}

fn write_gyre_wind(dir: &Path, grid: &Grid) {
    let tau0 = 0.05;
    let ly = grid.ny as f64 * grid.dy;
    let mut tau = grid.field2d();
    for j in 0..=grid.ny + 1 {
        let y = grid.y_center(j);
        for i in 0..=grid.nx + 1 {
            tau.set(i, j, tau0 * (std::f64::consts::PI * y / ly).sin());
        }
    }
    write_field2(&dir.join("input/tau_x.bin"), &tau, grid, Stagger::UPoint).unwrap();
}

fn max_abs_u(model: &Model) -> f64 {
    let mut max = 0.0f64;
    for j in 1..=model.grid().ny {
        for i in 1..=model.grid().nx + 1 {
            max = max.max(model.state().u.get(i, j, 0).abs());
        }
    }
    max
}

#[test]
fn test_wind_driven_gyre_spins_up() {
    let grid = Grid::new(16, 16, 1, 2e4, 2e4);

    let dir_short = run_dir("gyre-short");
    write_gyre_wind(&dir_short, &grid);
    let mut short = Model::new(config(&gyre_config(100)), &dir_short).unwrap();
    short.run().unwrap();

    let dir_long = run_dir("gyre-long");
    write_gyre_wind(&dir_long, &grid);
    let mut long = Model::new(config(&gyre_config(400)), &dir_long).unwrap();
    long.run().unwrap();

    // The zonal flow strengthens through the spin-up window.
    let u_short = max_abs_u(&short);
    let u_long = max_abs_u(&long);
    assert!(u_short > 0.0);
    assert!(u_long > u_short, "no spin-up: {u_short} -> {u_long}");

    // The circulation matches the imposed curl: tau_x ∝ sin(πy/Ly) has
    // negative curl south of mid-basin and positive curl north of it, so
    // an anticyclonic gyre sits in the southern half and a cyclonic one
    // in the northern half.
    let state = long.state();
    let zeta_at = |i: usize, j: usize| {
        (state.v.get(i, j, 0) - state.v.get(i - 1, j, 0)) / 2e4
            - (state.u.get(i, j, 0) - state.u.get(i, j - 1, 0)) / 2e4
    };
    let mut south = 0.0;
    let mut north = 0.0;
    for j in 3..=8 {
        for i in 3..=15 {
            south += zeta_at(i, j);
        }
    }
    for j in 10..=15 {
        for i in 3..=15 {
            north += zeta_at(i, j);
        }
    }
    assert!(south < 0.0, "southern gyre sign mismatch: {south}");
    assert!(north > 0.0, "northern gyre sign mismatch: {north}");

    fs::remove_dir_all(&dir_short).unwrap();
    fs::remove_dir_all(&dir_long).unwrap();
}

#[test]
fn test_translation_symmetry_on_periodic_domain() {
    // Fully wet periodic domain, spatially constant forcing, uniform
    // initial state: the solution stays spatially constant forever.
    let dir = run_dir("translation");
    let grid = Grid::new(8, 8, 1, 1e4, 1e4);
    let mut wind = grid.field2d();
    wind.fill(0.02);
    write_field2(&dir.join("input/wind_x.bin"), &wind, &grid, Stagger::UPoint).unwrap();

    let text = r#"
        [numerics]
        dt = 600.0
        nTimeSteps = 50

        [model]
        hmean = [400.0]
        H0 = 2000.0
        RedGrav = true

        [physics]
        g_vec = [0.01]

        [grid]
        nx = 8
        ny = 8
        layers = 1
        dx = 1.0e4
        dy = 1.0e4
        fUfile = ":f_plane_f_u:1e-4"
        fVfile = ":f_plane_f_v:1e-4"

        [external_forcing]
        zonalWindFile = "input/wind_x.bin"
    "#;
    let mut model = Model::new(config(text), &dir).unwrap();
    model.run().unwrap();

    let state = model.state();
    let u_ref = state.u.get(1, 1, 0);
    let v_ref = state.v.get(1, 1, 0);
    let h_ref = state.h.get(1, 1, 0);
    // The wind has done something...
    assert!(u_ref.abs() > 0.0);
    for j in 1..=8 {
        for i in 1..=8 {
            // ...but identically in every cell.
            assert!((state.u.get(i, j, 0) - u_ref).abs() < 1e-12);
            assert!((state.v.get(i, j, 0) - v_ref).abs() < 1e-12);
            assert!((state.h.get(i, j, 0) - h_ref).abs() < 1e-12);
        }
    }
    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_n_layer_mass_conservation() {
    let dir = run_dir("mass");
    let grid = Grid::new(12, 12, 2, 1e4, 1e4);

    // An interface bump that keeps the column closed: layer 0 thickens
    // where layer 1 thins.
    let mut h0 = grid.field3d();
    for j in 1..=12 {
        for i in 1..=12 {
            let dx = i as f64 - 6.5;
            let dy = j as f64 - 6.5;
            let bump = 20.0 * (-(dx * dx + dy * dy) / 8.0).exp();
            h0.set(i, j, 0, 400.0 + bump);
            h0.set(i, j, 1, 1600.0 - bump);
        }
    }
    h0.wrap();
    write_field3(&dir.join("input/init_h.bin"), &h0, &grid, Stagger::HPoint).unwrap();

    let text = r#"
        [numerics]
        dt = 100.0
        nTimeSteps = 100
        eps = 1.0e-10
        freesurfFac = 1.0

        [model]
        hmean = [400.0, 1600.0]
        H0 = 2000.0
        RedGrav = false

        [physics]
        g_vec = [9.8, 0.02]
        rho0 = 1026.0

        [grid]
        nx = 12
        ny = 12
        layers = 2
        dx = 1.0e4
        dy = 1.0e4
        fUfile = ":f_plane_f_u:1e-4"
        fVfile = ":f_plane_f_v:1e-4"

        [initial_conditions]
        initHfile = "input/init_h.bin"
    "#;
    let mut model = Model::new(config(text), &dir).unwrap();

    let total = |m: &Model| -> f64 {
        let mut sum = 0.0;
        for k in 0..2 {
            for j in 1..=12 {
                for i in 1..=12 {
                    sum += m.state().h.get(i, j, k);
                }
            }
        }
        sum
    };
    let before = total(&model);
    model.run().unwrap();
    let after = total(&model);

    assert!(
        ((after - before) / before).abs() < 1e-6,
        "mass drifted: {before} -> {after}"
    );
    // And the interface bump actually evolved.
    assert!((model.state().h.get(6, 6, 0) - h0.get(6, 6, 0)).abs() > 1e-6);
    fs::remove_dir_all(&dir).unwrap();
}
