//! Restart equivalence and reversed-integration sanity.

use std::fs;
use std::path::PathBuf;

use aronnax::{io::write_field3, Grid, Model, RunConfig, Stagger};

fn run_dir(name: &str) -> PathBuf {
    let mut dir = std::env::temp_dir();
    dir.push(format!("aronnax-restart-test-{}-{name}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(dir.join("input")).unwrap();
    dir
}

fn write_bump_initial(dir: &PathBuf, grid: &Grid) {
    let mut h0 = grid.field3d();
    for j in 1..=grid.ny {
        for i in 1..=grid.nx {
            let dx = i as f64 - 6.5;
            let dy = j as f64 - 6.5;
            let bump = 20.0 * (-(dx * dx + dy * dy) / 8.0).exp();
            h0.set(i, j, 0, 400.0 + bump);
            h0.set(i, j, 1, 1600.0 - bump);
        }
    }
    h0.wrap();
    write_field3(&dir.join("input/init_h.bin"), &h0, grid, Stagger::HPoint).unwrap();
}

fn two_layer_config(niter0: u64, n_steps: u64) -> RunConfig {
    RunConfig::from_toml_str(&format!(
        r#"
        [numerics]
        dt = 100.0
        nTimeSteps = {n_steps}
        niter0 = {niter0}
        checkpointFreq = 2000.0
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
    "#
    ))
    .unwrap()
}

/// Scenario: run 40 steps with a checkpoint at step 21, restart a fresh
/// model from that checkpoint for the remaining 19 steps, and require the
/// final states to agree bit for bit.
#[test]
fn test_checkpoint_restart_is_bit_exact() {
    let dir = run_dir("equivalence");
    let grid = Grid::new(12, 12, 2, 1e4, 1e4);
    write_bump_initial(&dir, &grid);

    let mut uninterrupted = Model::new(two_layer_config(0, 40), &dir).unwrap();
    uninterrupted.run().unwrap();
    assert!(dir.join("checkpoints/checkpoint.0000000021.dat").exists());

    let mut restarted = Model::new(two_layer_config(21, 19), &dir).unwrap();
    let summary = restarted.run().unwrap();
    assert_eq!(summary.final_step, 40);

    let a = uninterrupted.state();
    let b = restarted.state();
    assert_eq!(a.h.as_slice(), b.h.as_slice());
    assert_eq!(a.u.as_slice(), b.u.as_slice());
    assert_eq!(a.v.as_slice(), b.v.as_slice());
    assert_eq!(a.eta.as_slice(), b.eta.as_slice());

    fs::remove_dir_all(&dir).unwrap();
}

/// Scenario: with every dissipative coefficient zero, integrating
/// forward, then restarting from the final state with velocities and the
/// Coriolis parameter negated (the discrete equivalent of reversing dt),
/// returns close to the initial condition.
#[test]
fn test_reversed_integration_returns_near_start() {
    let forward_dir = run_dir("reverse-fwd");
    let grid = Grid::new(10, 10, 1, 2e4, 2e4);

    let mut h0 = grid.field3d();
    for j in 1..=10 {
        for i in 1..=10 {
            let dx = i as f64 - 5.5;
            let dy = j as f64 - 5.5;
            h0.set(i, j, 0, 400.0 + (-(dx * dx + dy * dy) / 4.0).exp());
        }
    }
    h0.wrap();
    write_field3(&forward_dir.join("input/init_h.bin"), &h0, &grid, Stagger::HPoint).unwrap();

    let config = |f_sign: f64| -> String {
        format!(
            r#"
            [numerics]
            dt = 600.0
            nTimeSteps = 20

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
            fUfile = ":f_plane_f_u:{f}"
            fVfile = ":f_plane_f_v:{f}"

            [initial_conditions]
            initHfile = "input/init_h.bin"
            initUfile = "input/init_u.bin"
            initVfile = "input/init_v.bin"
        "#,
            f = f_sign * 1e-4
        )
    };

    // Start from rest.
    write_field3(&forward_dir.join("input/init_u.bin"), &grid.field3d(), &grid, Stagger::UPoint)
        .unwrap();
    write_field3(&forward_dir.join("input/init_v.bin"), &grid.field3d(), &grid, Stagger::VPoint)
        .unwrap();
    let mut forward =
        Model::new(RunConfig::from_toml_str(&config(1.0)).unwrap(), &forward_dir).unwrap();
    forward.run().unwrap();

    // Reverse: same thickness, negated velocities, negated rotation.
    let reverse_dir = run_dir("reverse-bwd");
    let state = forward.state();
    let mut u_rev = grid.field3d();
    let mut v_rev = grid.field3d();
    for k in 0..1 {
        for j in 0..=11 {
            for i in 0..=11 {
                u_rev.set(i, j, k, -state.u.get(i, j, k));
                v_rev.set(i, j, k, -state.v.get(i, j, k));
            }
        }
    }
    write_field3(&reverse_dir.join("input/init_h.bin"), &state.h, &grid, Stagger::HPoint)
        .unwrap();
    write_field3(&reverse_dir.join("input/init_u.bin"), &u_rev, &grid, Stagger::UPoint).unwrap();
    write_field3(&reverse_dir.join("input/init_v.bin"), &v_rev, &grid, Stagger::VPoint).unwrap();

    let mut reversed =
        Model::new(RunConfig::from_toml_str(&config(-1.0)).unwrap(), &reverse_dir).unwrap();
    reversed.run().unwrap();

    let mut max_diff = 0.0f64;
    for j in 1..=10 {
        for i in 1..=10 {
            max_diff = max_diff.max((reversed.state().h.get(i, j, 0) - h0.get(i, j, 0)).abs());
        }
    }
    // The bump is 1 m tall and disperses by a large fraction of that
    // over the window; the round trip must come back within a tenth.
    assert!(max_diff < 0.1, "reversed run strayed by {max_diff} m");

    fs::remove_dir_all(&forward_dir).unwrap();
    fs::remove_dir_all(&reverse_dir).unwrap();
}
