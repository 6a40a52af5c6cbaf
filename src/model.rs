//! Driver orchestration: allocation, input wiring and the main loop.
//!
//! [`Model::new`] allocates every array once, resolves each configured
//! input (file, generator or built-in default) and assembles the fixed
//! operators. [`Model::run`] then performs the two-stage initialization
//! (two half-Runge–Kutta rounds priming the tendency history, or a
//! checkpoint restore when `niter0 > 0`) and takes `nTimeSteps`
//! Adams–Bashforth steps.
//!
//! Within a step the stages run in strict sequence: tendencies, AB3
//! combine, boundary conditions, barotropic correction (n-layer only),
//! minimum-thickness clip, halo refresh, average accumulation, history
//! rotation, output. Fatal conditions (non-positive depth, NaN in the
//! state, a diverged conjugate-gradient solve) abort the run cleanly with
//! context; convergence and clipping troubles are warnings on the log
//! channel and the run continues.

use std::path::{Path, PathBuf};
use std::time::Instant;

use log::{info, warn};
use thiserror::Error;

use crate::barotropic::{BarotropicCorrector, EllipticSolver};
use crate::config::{ConfigError, RunConfig, SolverMethod};
use crate::diagnostics::first_non_finite;
use crate::domain::{Decomposition, DomainError, HaloRefresher};
use crate::forcing::{SpongeFields, WindForcing, WindVariant};
use crate::grid::{
    beta_plane_fu, beta_plane_fv, f_plane_fu, f_plane_fv, FaceMasks, Field2D, Field3D, Grid,
    Stagger, WetMask,
};
use crate::io::checkpoint::{read_checkpoint, CheckpointError};
use crate::io::{
    read_field2, read_field3, read_series, resolve_input, FieldIoError, GeneratorSpec,
    InputSource,
};
use crate::kernels::{
    apply_velocity_masks, meridional_momentum_tendency, thickness_tendency,
    zonal_momentum_tendency, MomentumParams,
};
use crate::output::{OutputCounts, OutputError, OutputScheduler};
use crate::physics::{vorticity, LayerPhysics};
use crate::timestep::{
    adams_bashforth3_step, half_step, State, Tendencies, TendencyHistory,
};

/// Error raised while building or running a model.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Configuration loading or validation failed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The worker grid cannot tile the domain.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// An input field could not be loaded.
    #[error(transparent)]
    Input(#[from] FieldIoError),

    /// Checkpoint restore failed.
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    /// Output emission failed.
    #[error(transparent)]
    Output(#[from] OutputError),

    /// The bathymetry is not strictly positive in a wet cell.
    #[error("depth {value} at wet cell ({i},{j}) must be strictly positive")]
    NonPositiveDepth {
        /// Interior column.
        i: usize,
        /// Interior row.
        j: usize,
        /// Offending depth.
        value: f64,
    },

    /// A non-finite thickness appeared in the state.
    #[error("non-finite thickness at cell ({i},{j}) layer {k} after step {step}")]
    NonFinite {
        /// Step at which the scan fired.
        step: u64,
        /// Interior column.
        i: usize,
        /// Interior row.
        j: usize,
        /// Layer.
        k: usize,
    },

    /// The mandatory conjugate-gradient surface solve did not converge.
    #[error("surface solver diverged at step {step}")]
    SurfaceSolverDiverged {
        /// Offending step.
        step: u64,
    },
}

/// Which history slot a tendency evaluation writes.
#[derive(Clone, Copy, Debug)]
enum Slot {
    Current,
    Old,
    VeryOld,
}

/// Outcome of a completed run.
#[derive(Clone, Copy, Debug)]
pub struct RunSummary {
    /// Steps taken in this process.
    pub steps: u64,
    /// Global index of the last completed step.
    pub final_step: u64,
    /// Wall-clock seconds spent in `run`.
    pub wall_time: f64,
    /// Output emissions.
    pub outputs: OutputCounts,
}

/// A fully wired simulation.
#[derive(Debug)]
pub struct Model {
    grid: Grid,
    wet: WetMask,
    faces: FaceMasks,
    depth: Field2D,
    fu: Field2D,
    fv: Field2D,
    physics: LayerPhysics,
    params: MomentumParams,
    kh: Vec<f64>,
    kv: f64,
    dt: f64,
    hmin: f64,
    n_time_steps: u64,
    niter0: u64,
    solver_method: SolverMethod,
    state: State,
    scratch: State,
    history: TendencyHistory,
    bernoulli: Field3D,
    zeta: Field3D,
    wind: WindForcing,
    sponge: SpongeFields,
    corrector: Option<BarotropicCorrector>,
    solver: Option<EllipticSolver>,
    decomp: Decomposition,
    halo: HaloRefresher,
    scheduler: OutputScheduler,
    checkpoint_dir: PathBuf,
    step: u64,
}

impl Model {
    /// Allocate and wire a model for `config`, resolving input files
    /// relative to the run directory `root`.
    pub fn new(config: RunConfig, root: &Path) -> Result<Self, ModelError> {
        let grid = Grid::new(
            config.grid.nx,
            config.grid.ny,
            config.grid.layers,
            config.grid.dx,
            config.grid.dy,
        );

        // Launch contract: the worker grid must tile the domain exactly.
        let decomp = Decomposition::new(
            &grid,
            config.pressure_solver.nproc_x,
            config.pressure_solver.nproc_y,
        )?;

        let wet = match resolve_input(&config.grid.wet_mask_file, root)? {
            InputSource::Default => WetMask::all_wet(&grid),
            InputSource::File(path) => {
                WetMask::from_field(read_field2(&path, &grid, Stagger::HPoint)?)
            }
            InputSource::Generator(spec) => match spec.name.as_str() {
                "rectangular_pool" => WetMask::rectangular_pool(&grid),
                _ => return Err(FieldIoError::UnknownGenerator(spec.name).into()),
            },
        };
        let faces = FaceMasks::derive(&grid, &wet);

        let depth = match resolve_input(&config.model.depth_file, root)? {
            InputSource::Default => Field2D::constant(grid.nx, grid.ny, config.model.h0),
            InputSource::File(path) => read_field2(&path, &grid, Stagger::HPoint)?,
            InputSource::Generator(spec) => {
                return Err(FieldIoError::UnknownGenerator(spec.name).into())
            }
        };

        let physics = if config.model.red_grav {
            LayerPhysics::reduced_gravity(config.physics.g_vec.clone(), config.physics.rho0)
        } else {
            LayerPhysics::n_layer(config.physics.g_vec.clone(), config.physics.rho0)
        };

        if physics.is_n_layer() {
            for j in 1..=grid.ny {
                for i in 1..=grid.nx {
                    if wet.is_wet(i, j) && depth.get(i, j) <= 0.0 {
                        return Err(ModelError::NonPositiveDepth {
                            i,
                            j,
                            value: depth.get(i, j),
                        });
                    }
                }
            }
        }

        let fu = load_coriolis(&config.grid.fu_file, root, &grid, CoriolisPoint::U)?;
        let fv = load_coriolis(&config.grid.fv_file, root, &grid, CoriolisPoint::V)?;

        let mut state = State::zeros(&grid);
        match resolve_input(&config.initial_conditions.h_file, root)? {
            InputSource::Default => {
                for (k, &mean) in config.model.hmean.iter().enumerate() {
                    for j in 0..=grid.ny + 1 {
                        for i in 0..=grid.nx + 1 {
                            state.h.set(i, j, k, mean);
                        }
                    }
                }
            }
            InputSource::File(path) => state.h = read_field3(&path, &grid, Stagger::HPoint)?,
            InputSource::Generator(spec) => {
                return Err(FieldIoError::UnknownGenerator(spec.name).into())
            }
        }
        if let InputSource::File(path) = resolve_input(&config.initial_conditions.u_file, root)? {
            state.u = read_field3(&path, &grid, Stagger::UPoint)?;
        }
        if let InputSource::File(path) = resolve_input(&config.initial_conditions.v_file, root)? {
            state.v = read_field3(&path, &grid, Stagger::VPoint)?;
        }
        if let InputSource::File(path) =
            resolve_input(&config.initial_conditions.eta_file, root)?
        {
            state.eta = read_field2(&path, &grid, Stagger::HPoint)?;
        }
        apply_velocity_masks(&mut state.u, &mut state.v, &grid, &wet, &faces);
        state.wrap();

        let mut wind = WindForcing::calm(&grid);
        if let InputSource::File(path) =
            resolve_input(&config.external_forcing.zonal_wind_file, root)?
        {
            wind.wind_x = read_field2(&path, &grid, Stagger::UPoint)?;
        }
        if let InputSource::File(path) =
            resolve_input(&config.external_forcing.meridional_wind_file, root)?
        {
            wind.wind_y = read_field2(&path, &grid, Stagger::VPoint)?;
        }
        if config.external_forcing.relative_wind {
            wind.variant = WindVariant::Relative {
                cd: config.external_forcing.cd,
            };
        }
        wind.dump_wind = config.external_forcing.dump_wind;
        if let InputSource::File(path) =
            resolve_input(&config.external_forcing.wind_mag_time_series_file, root)?
        {
            wind.magnitude_series =
                read_series(&path, config.numerics.n_time_steps as usize)?;
        }

        let mut sponge = SpongeFields::none(&grid);
        load_sponge_field(&mut sponge.h_rate, &config.sponge.h_time_scale_file, root, &grid, Stagger::HPoint)?;
        load_sponge_field(&mut sponge.h_target, &config.sponge.h_file, root, &grid, Stagger::HPoint)?;
        load_sponge_field(&mut sponge.u_rate, &config.sponge.u_time_scale_file, root, &grid, Stagger::UPoint)?;
        load_sponge_field(&mut sponge.u_target, &config.sponge.u_file, root, &grid, Stagger::UPoint)?;
        load_sponge_field(&mut sponge.v_rate, &config.sponge.v_time_scale_file, root, &grid, Stagger::VPoint)?;
        load_sponge_field(&mut sponge.v_target, &config.sponge.v_file, root, &grid, Stagger::VPoint)?;

        let (corrector, solver) = if physics.is_n_layer() {
            let corrector = BarotropicCorrector::new(
                &grid,
                &depth,
                &faces,
                physics.g_surface(),
                config.numerics.freesurf_fac,
                config.numerics.thickness_error,
                config.numerics.dt,
            );
            let solver = EllipticSolver::new(
                config.pressure_solver.method,
                &grid,
                config.numerics.eps,
                config.numerics.maxits,
            );
            (Some(corrector), Some(solver))
        } else {
            (None, None)
        };

        let scheduler = OutputScheduler::new(
            root,
            &grid,
            &config.numerics,
            &config.external_forcing,
            physics.is_n_layer(),
        )?;

        let params = MomentumParams {
            au: config.numerics.au,
            ar: config.numerics.ar,
            slip: config.numerics.slip,
            bot_drag: config.numerics.bot_drag,
            rho0: config.physics.rho0,
        };

        info!(
            "aronnax: {}x{}x{} grid, {} mode, {} worker tile(s), {} solver",
            grid.nx,
            grid.ny,
            grid.layers,
            if physics.is_n_layer() { "n-layer" } else { "reduced-gravity" },
            decomp.worker_count(),
            match config.pressure_solver.method {
                SolverMethod::Sor => "SOR",
                SolverMethod::Cg => "CG",
            },
        );

        Ok(Self {
            scratch: State::zeros(&grid),
            history: TendencyHistory::zeros(&grid),
            bernoulli: grid.field3d(),
            zeta: grid.field3d(),
            kh: config.numerics.kh.clone(),
            kv: config.numerics.kv,
            dt: config.numerics.dt,
            hmin: config.numerics.hmin,
            n_time_steps: config.numerics.n_time_steps,
            niter0: config.numerics.niter0,
            solver_method: config.pressure_solver.method,
            checkpoint_dir: root.join("checkpoints"),
            step: config.numerics.niter0,
            grid,
            wet,
            faces,
            depth,
            fu,
            fv,
            physics,
            params,
            state,
            wind,
            sponge,
            corrector,
            solver,
            decomp,
            halo: HaloRefresher,
            scheduler,
        })
    }

    /// The model state (read-only view for tests and embedding).
    pub fn state(&self) -> &State {
        &self.state
    }

    /// The grid in use.
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// The worker decomposition in use.
    pub fn decomposition(&self) -> &Decomposition {
        &self.decomp
    }

    /// Run the configured number of steps.
    pub fn run(&mut self) -> Result<RunSummary, ModelError> {
        let start = Instant::now();

        if self.niter0 > 0 {
            read_checkpoint(
                &self.checkpoint_dir,
                self.niter0,
                &self.grid,
                &mut self.state,
                &mut self.history,
            )?;
            info!("restarted from checkpoint at step {}", self.niter0);
        } else {
            self.bootstrap();
        }

        for local in 1..=self.n_time_steps {
            let n = self.niter0 + local;
            self.step_once(n)?;
            self.step = n;
        }

        self.scheduler.finish()?;
        let summary = RunSummary {
            steps: self.n_time_steps,
            final_step: self.step,
            wall_time: start.elapsed().as_secs_f64(),
            outputs: self.scheduler.counts(),
        };
        info!(
            "completed {} steps in {:.2}s ({} snapshots, {} checkpoints)",
            summary.steps, summary.wall_time, summary.outputs.snapshots,
            summary.outputs.checkpoints,
        );
        Ok(summary)
    }

    /// Two half-Runge–Kutta rounds priming the very-old and old history
    /// slots. No barotropic correction, clipping or output here; the
    /// rounds exist solely to hand Adams–Bashforth a usable history.
    fn bootstrap(&mut self) {
        let wind_scale = self.wind.magnitude_at(self.step as usize);
        for slot in [Slot::VeryOld, Slot::Old] {
            self.eval_tendencies(false, Slot::Current, wind_scale);
            half_step(&mut self.scratch, &self.state, &self.history.current, self.dt);
            self.eval_tendencies(true, slot, wind_scale);
            let filled = match slot {
                Slot::VeryOld => &self.history.very_old,
                Slot::Old => &self.history.old,
                Slot::Current => unreachable!("bootstrap fills history slots"),
            };
            self.state.add_scaled(self.dt, filled);
            apply_velocity_masks(
                &mut self.state.u,
                &mut self.state.v,
                &self.grid,
                &self.wet,
                &self.faces,
            );
            self.state.wrap();
        }
    }

    /// One Adams–Bashforth step with the full stage sequence.
    fn step_once(&mut self, n: u64) -> Result<(), ModelError> {
        let wind_scale = self.wind.magnitude_at((n - 1) as usize);

        self.eval_tendencies(false, Slot::Current, wind_scale);
        adams_bashforth3_step(&mut self.state, &self.history, self.dt);
        apply_velocity_masks(
            &mut self.state.u,
            &mut self.state.v,
            &self.grid,
            &self.wet,
            &self.faces,
        );

        if let (Some(corrector), Some(solver)) = (&mut self.corrector, &mut self.solver) {
            let stats = corrector.correct(
                &mut self.state,
                &self.grid,
                &self.depth,
                &self.wet,
                solver,
                self.dt,
                n,
            );
            if !stats.solve.converged && self.solver_method == SolverMethod::Cg {
                return Err(ModelError::SurfaceSolverDiverged { step: n });
            }
            apply_velocity_masks(
                &mut self.state.u,
                &mut self.state.v,
                &self.grid,
                &self.wet,
                &self.faces,
            );
        }

        let mut clipped = 0usize;
        for k in 0..self.grid.layers {
            for j in 1..=self.grid.ny {
                for i in 1..=self.grid.nx {
                    if self.state.h.get(i, j, k) < self.hmin {
                        self.state.h.set(i, j, k, self.hmin);
                        clipped += 1;
                    }
                }
            }
        }
        if clipped > 0 {
            warn!("step {n}: clipped {clipped} layer thicknesses to hmin");
        }

        self.halo.refresh3(&mut self.state.h);
        self.halo.refresh3(&mut self.state.u);
        self.halo.refresh3(&mut self.state.v);
        self.halo.refresh2(&mut self.state.eta);

        self.scheduler.accumulate(&self.state);
        self.history.rotate();

        let snapshot_written = self.scheduler.emit(
            n,
            &self.grid,
            &self.state,
            &self.history,
            &self.wind,
            wind_scale,
        )?;
        if snapshot_written {
            if let Some((i, j, k)) = first_non_finite(&self.state.h, &self.grid) {
                return Err(ModelError::NonFinite { step: n, i, j, k });
            }
        }
        Ok(())
    }

    /// Evaluate the full tendency set into one history slot, reading the
    /// main state or the bootstrap scratch state.
    fn eval_tendencies(&mut self, from_scratch: bool, slot: Slot, wind_scale: f64) {
        let state = if from_scratch { &self.scratch } else { &self.state };

        self.physics.bernoulli(
            &mut self.bernoulli,
            &self.grid,
            &state.h,
            &state.u,
            &state.v,
            &self.depth,
        );
        vorticity(&mut self.zeta, &self.grid, &state.u, &state.v);

        let n_layer = self.physics.is_n_layer();
        let out = match slot {
            Slot::Current => &mut self.history.current,
            Slot::Old => &mut self.history.old,
            Slot::VeryOld => &mut self.history.very_old,
        };
        let Tendencies { dh, du, dv } = out;

        #[cfg(feature = "parallel")]
        {
            rayon::join(
                || {
                    thickness_tendency(
                        dh, &self.grid, &state.h, &state.u, &state.v, &self.wet, &self.sponge,
                        &self.kh, self.kv, n_layer,
                    )
                },
                || {
                    rayon::join(
                        || {
                            zonal_momentum_tendency(
                                du, &self.grid, &state.h, &state.u, &state.v, &self.bernoulli,
                                &self.zeta, &self.fu, &self.faces, &self.sponge, &self.wind,
                                wind_scale, &self.params, n_layer,
                            )
                        },
                        || {
                            meridional_momentum_tendency(
                                dv, &self.grid, &state.h, &state.u, &state.v, &self.bernoulli,
                                &self.zeta, &self.fv, &self.faces, &self.sponge, &self.wind,
                                wind_scale, &self.params, n_layer,
                            )
                        },
                    )
                },
            );
        }
        #[cfg(not(feature = "parallel"))]
        {
            thickness_tendency(
                dh, &self.grid, &state.h, &state.u, &state.v, &self.wet, &self.sponge, &self.kh,
                self.kv, n_layer,
            );
            zonal_momentum_tendency(
                du, &self.grid, &state.h, &state.u, &state.v, &self.bernoulli, &self.zeta,
                &self.fu, &self.faces, &self.sponge, &self.wind, wind_scale, &self.params,
                n_layer,
            );
            meridional_momentum_tendency(
                dv, &self.grid, &state.h, &state.u, &state.v, &self.bernoulli, &self.zeta,
                &self.fv, &self.faces, &self.sponge, &self.wind, wind_scale, &self.params,
                n_layer,
            );
        }
    }
}

enum CoriolisPoint {
    U,
    V,
}

fn load_coriolis(
    value: &Option<String>,
    root: &Path,
    grid: &Grid,
    point: CoriolisPoint,
) -> Result<Field2D, ModelError> {
    let source = resolve_input(value, root)?;
    let field = match source {
        InputSource::Default => grid.field2d(),
        InputSource::File(path) => {
            let stagger = match point {
                CoriolisPoint::U => Stagger::UPoint,
                CoriolisPoint::V => Stagger::VPoint,
            };
            read_field2(&path, grid, stagger)?
        }
        InputSource::Generator(spec) => coriolis_generator(&spec, grid, point)?,
    };
    Ok(field)
}

fn coriolis_generator(
    spec: &GeneratorSpec,
    grid: &Grid,
    point: CoriolisPoint,
) -> Result<Field2D, ModelError> {
    let arity = |n: usize| -> Result<(), ModelError> {
        if spec.args.len() == n {
            Ok(())
        } else {
            Err(FieldIoError::BadSpecifier(format!(
                ":{}: expects {n} argument(s), got {}",
                spec.name,
                spec.args.len()
            ))
            .into())
        }
    };
    match (spec.name.as_str(), point) {
        ("f_plane_f_u", CoriolisPoint::U) => {
            arity(1)?;
            Ok(f_plane_fu(grid, spec.args[0]))
        }
        ("f_plane_f_v", CoriolisPoint::V) => {
            arity(1)?;
            Ok(f_plane_fv(grid, spec.args[0]))
        }
        ("beta_plane_f_u", CoriolisPoint::U) => {
            arity(2)?;
            Ok(beta_plane_fu(grid, spec.args[0], spec.args[1]))
        }
        ("beta_plane_f_v", CoriolisPoint::V) => {
            arity(2)?;
            Ok(beta_plane_fv(grid, spec.args[0], spec.args[1]))
        }
        _ => Err(FieldIoError::UnknownGenerator(spec.name.clone()).into()),
    }
}

fn load_sponge_field(
    target: &mut Field3D,
    value: &Option<String>,
    root: &Path,
    grid: &Grid,
    stagger: Stagger,
) -> Result<(), ModelError> {
    if let InputSource::File(path) = resolve_input(value, root)? {
        *target = read_field3(&path, grid, stagger)?;
    }
    Ok(())
}
