//! Run configuration.
//!
//! A run is described by a plain-text TOML file whose tables are the named
//! sections of the classic namelist: `[numerics]`, `[model]`,
//! `[pressure_solver]`, `[sponge]`, `[physics]`, `[grid]`,
//! `[initial_conditions]` and `[external_forcing]`. Key names match the
//! namelist keys, including their historical capitalization.
//!
//! Every file-name key is optional; an absent key (or empty string) means
//! "use the built-in default" for that input: depth from `H0`, initial
//! thickness from `hmean`, velocities, free surface, Coriolis and wind all
//! zero, wet mask all wet. File-name values starting with `:` are
//! generator specifiers (`:rectangular_pool:`, `:f_plane_f_u:1e-4`, ...)
//! interpreted by the input loader.
//!
//! # Example
//!
//! ```toml
//! [numerics]
//! dt = 600.0
//! nTimeSteps = 1000
//! dumpFreq = 6.0e5
//! hmin = 100.0
//!
//! [model]
//! hmean = [400.0]
//! H0 = 2000.0
//! RedGrav = true
//!
//! [physics]
//! g_vec = [0.01]
//!
//! [grid]
//! nx = 10
//! ny = 10
//! layers = 1
//! dx = 2.0e4
//! dy = 2.0e4
//! wetMaskFile = ":rectangular_pool:"
//! fUfile = ":f_plane_f_u:1e-4"
//! fVfile = ":f_plane_f_v:1e-4"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Error raised while loading or validating a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read configuration file {path}: {source}")]
    Read {
        /// Offending path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The file is not valid TOML or has an unknown key.
    #[error("cannot parse configuration file {path}: {source}")]
    Parse {
        /// Offending path.
        path: PathBuf,
        /// Underlying TOML error.
        source: toml::de::Error,
    },

    /// A value that must be strictly positive is not.
    #[error("configuration key `{key}` must be positive, got {value}")]
    NonPositive {
        /// Offending key.
        key: &'static str,
        /// Value found.
        value: f64,
    },

    /// A per-layer vector has the wrong length.
    #[error("configuration key `{key}` must have one entry per layer ({expected}), got {found}")]
    LayerLength {
        /// Offending key.
        key: &'static str,
        /// Expected entries.
        expected: usize,
        /// Entries found.
        found: usize,
    },

    /// The pressure-solver worker grid does not fit the domain.
    #[error("worker grid {nproc_x}x{nproc_y} does not fit a {nx}x{ny} domain")]
    WorkerGrid {
        /// Workers in x.
        nproc_x: usize,
        /// Workers in y.
        nproc_y: usize,
        /// Domain width.
        nx: usize,
        /// Domain height.
        ny: usize,
    },

    /// Unknown elliptic solver name.
    #[error("unknown pressure solver method `{0}` (expected \"sor\" or \"cg\")")]
    UnknownSolver(String),
}

fn default_maxits() -> usize {
    1000
}

fn default_eps() -> f64 {
    1e-7
}

fn default_thickness_error() -> f64 {
    1e-2
}

fn default_one() -> usize {
    1
}

fn default_rho0() -> f64 {
    1026.0
}

fn default_red_grav() -> bool {
    true
}

fn default_method() -> SolverMethod {
    SolverMethod::Sor
}

/// `[numerics]`: time stepping, dissipation and solver control.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NumericsSection {
    /// Horizontal momentum viscosity (m²/s).
    #[serde(default)]
    pub au: f64,
    /// Per-layer horizontal thickness diffusivity (m²/s). A single entry
    /// is broadcast to all layers.
    #[serde(default)]
    pub kh: Vec<f64>,
    /// Vertical thickness diffusivity (m²/s).
    #[serde(default)]
    pub kv: f64,
    /// Vertical momentum coupling between adjacent layers (1/s).
    #[serde(default)]
    pub ar: f64,
    /// Linear bottom drag on the deepest layer (1/s), n-layer mode only.
    #[serde(default, rename = "botDrag")]
    pub bot_drag: f64,
    /// Time step (s).
    pub dt: f64,
    /// Lateral slip parameter: 0 free-slip, 1 no-slip.
    #[serde(default)]
    pub slip: f64,
    /// First step index; nonzero restarts from the matching checkpoint.
    #[serde(default)]
    pub niter0: u64,
    /// Number of time steps to run.
    #[serde(rename = "nTimeSteps")]
    pub n_time_steps: u64,
    /// Snapshot interval (s); 0 disables.
    #[serde(default, rename = "dumpFreq")]
    pub dump_freq: f64,
    /// Averaging interval (s); 0 disables.
    #[serde(default, rename = "avFreq")]
    pub av_freq: f64,
    /// Checkpoint interval (s); 0 disables.
    #[serde(default, rename = "checkpointFreq")]
    pub checkpoint_freq: f64,
    /// Diagnostics interval (s); 0 disables.
    #[serde(default, rename = "diagFreq")]
    pub diag_freq: f64,
    /// Minimum layer thickness (m); thinner layers are clipped.
    #[serde(default)]
    pub hmin: f64,
    /// Elliptic solver iteration cap.
    #[serde(default = "default_maxits")]
    pub maxits: usize,
    /// Elliptic solver relative tolerance.
    #[serde(default = "default_eps")]
    pub eps: f64,
    /// Free-surface factor: 0 rigid lid, 1 linear free surface.
    #[serde(default, rename = "freesurfFac")]
    pub freesurf_fac: f64,
    /// Accepted relative thickness/free-surface inconsistency.
    #[serde(default = "default_thickness_error")]
    pub thickness_error: f64,
    /// Extra output detail: >= 2 dumps tendencies with snapshots.
    #[serde(default)]
    pub debug_level: u8,
}

/// `[model]`: layer structure and physics mode.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelSection {
    /// Per-layer mean thickness (m), the default initial condition.
    #[serde(default)]
    pub hmean: Vec<f64>,
    /// Bathymetry file (H points); empty means flat depth `H0`.
    #[serde(default, rename = "depthFile")]
    pub depth_file: Option<String>,
    /// Flat-bottom depth (m) used when `depthFile` is unset.
    #[serde(default, rename = "H0")]
    pub h0: f64,
    /// Reduced-gravity mode: the deepest layer is passive and no free
    /// surface is carried.
    #[serde(default = "default_red_grav", rename = "RedGrav")]
    pub red_grav: bool,
}

/// Elliptic solver selection for the barotropic correction.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SolverMethod {
    /// In-process successive over-relaxation (the default).
    Sor,
    /// Jacobi-preconditioned conjugate gradients.
    Cg,
}

/// `[pressure_solver]`: worker grid and solver selection.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PressureSolverSection {
    /// Worker tiles in x.
    #[serde(default = "default_one", rename = "nProcX")]
    pub nproc_x: usize,
    /// Worker tiles in y.
    #[serde(default = "default_one", rename = "nProcY")]
    pub nproc_y: usize,
    /// Which elliptic solver runs the barotropic step.
    #[serde(default = "default_method")]
    pub method: SolverMethod,
}

impl Default for PressureSolverSection {
    fn default() -> Self {
        Self {
            nproc_x: 1,
            nproc_y: 1,
            method: SolverMethod::Sor,
        }
    }
}

/// `[sponge]`: relaxation regions, all optional.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpongeSection {
    /// Relaxation rate for thickness (H points, 1/s).
    #[serde(default, rename = "spongeHTimeScaleFile")]
    pub h_time_scale_file: Option<String>,
    /// Relaxation rate for zonal velocity (U points, 1/s).
    #[serde(default, rename = "spongeUTimeScaleFile")]
    pub u_time_scale_file: Option<String>,
    /// Relaxation rate for meridional velocity (V points, 1/s).
    #[serde(default, rename = "spongeVTimeScaleFile")]
    pub v_time_scale_file: Option<String>,
    /// Thickness relaxation target.
    #[serde(default, rename = "spongeHFile")]
    pub h_file: Option<String>,
    /// Zonal velocity relaxation target.
    #[serde(default, rename = "spongeUFile")]
    pub u_file: Option<String>,
    /// Meridional velocity relaxation target.
    #[serde(default, rename = "spongeVFile")]
    pub v_file: Option<String>,
}

/// `[physics]`: gravities and reference density.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PhysicsSection {
    /// Reduced gravity at the top of each layer (m/s²); `g_vec[0]` is the
    /// surface value.
    pub g_vec: Vec<f64>,
    /// Reference density (kg/m³).
    #[serde(default = "default_rho0")]
    pub rho0: f64,
}

/// `[grid]`: shape, spacing and static masks.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GridSection {
    /// Interior cells in x.
    pub nx: usize,
    /// Interior cells in y.
    pub ny: usize,
    /// Active layers.
    pub layers: usize,
    /// Grid spacing in x (m).
    pub dx: f64,
    /// Grid spacing in y (m).
    pub dy: f64,
    /// Coriolis parameter at U points; empty means zero.
    #[serde(default, rename = "fUfile")]
    pub fu_file: Option<String>,
    /// Coriolis parameter at V points; empty means zero.
    #[serde(default, rename = "fVfile")]
    pub fv_file: Option<String>,
    /// Wet mask (H points); empty means all wet.
    #[serde(default, rename = "wetMaskFile")]
    pub wet_mask_file: Option<String>,
}

/// `[initial_conditions]`: state at step `niter0 = 0`, all optional.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InitialConditionsSection {
    /// Initial zonal velocity.
    #[serde(default, rename = "initUfile")]
    pub u_file: Option<String>,
    /// Initial meridional velocity.
    #[serde(default, rename = "initVfile")]
    pub v_file: Option<String>,
    /// Initial layer thickness.
    #[serde(default, rename = "initHfile")]
    pub h_file: Option<String>,
    /// Initial free surface (n-layer mode).
    #[serde(default, rename = "initEtaFile")]
    pub eta_file: Option<String>,
}

/// `[external_forcing]`: wind stress and its modulation.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExternalForcingSection {
    /// Zonal wind field (U points).
    #[serde(default, rename = "zonalWindFile")]
    pub zonal_wind_file: Option<String>,
    /// Meridional wind field (V points).
    #[serde(default, rename = "meridionalWindFile")]
    pub meridional_wind_file: Option<String>,
    /// Interpret the wind fields as 10 m winds and apply quadratic drag
    /// relative to the surface current.
    #[serde(default, rename = "RelativeWind")]
    pub relative_wind: bool,
    /// Drag coefficient for the relative-wind variant.
    #[serde(default, rename = "Cd")]
    pub cd: f64,
    /// Also dump the (possibly modulated) wind with each snapshot.
    #[serde(default, rename = "DumpWind")]
    pub dump_wind: bool,
    /// Per-step wind magnitude multipliers, `nTimeSteps` doubles.
    #[serde(default, rename = "wind_mag_time_series_file")]
    pub wind_mag_time_series_file: Option<String>,
}

/// The complete, validated run configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// `[numerics]`
    pub numerics: NumericsSection,
    /// `[model]`
    pub model: ModelSection,
    /// `[pressure_solver]`
    #[serde(default)]
    pub pressure_solver: PressureSolverSection,
    /// `[sponge]`
    #[serde(default)]
    pub sponge: SpongeSection,
    /// `[physics]`
    pub physics: PhysicsSection,
    /// `[grid]`
    pub grid: GridSection,
    /// `[initial_conditions]`
    #[serde(default)]
    pub initial_conditions: InitialConditionsSection,
    /// `[external_forcing]`
    #[serde(default)]
    pub external_forcing: ExternalForcingSection,
}

impl RunConfig {
    /// Load and validate a configuration file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: RunConfig =
            toml::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a configuration from TOML text (used by tests and embedding).
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let mut config: RunConfig =
            toml::from_str(text).map_err(|source| ConfigError::Parse {
                path: PathBuf::from("<inline>"),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field consistency and broadcast per-layer vectors.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        let layers = self.grid.layers;

        for (key, value) in [
            ("grid.nx", self.grid.nx as f64),
            ("grid.ny", self.grid.ny as f64),
            ("grid.layers", layers as f64),
            ("grid.dx", self.grid.dx),
            ("grid.dy", self.grid.dy),
            ("numerics.dt", self.numerics.dt),
            ("physics.rho0", self.physics.rho0),
        ] {
            if value <= 0.0 {
                return Err(ConfigError::NonPositive { key, value });
            }
        }

        // kh: absent -> zero, single entry -> broadcast.
        match self.numerics.kh.len() {
            0 => self.numerics.kh = vec![0.0; layers],
            1 => self.numerics.kh = vec![self.numerics.kh[0]; layers],
            n if n == layers => {}
            n => {
                return Err(ConfigError::LayerLength {
                    key: "numerics.kh",
                    expected: layers,
                    found: n,
                })
            }
        }

        if self.physics.g_vec.len() != layers {
            return Err(ConfigError::LayerLength {
                key: "physics.g_vec",
                expected: layers,
                found: self.physics.g_vec.len(),
            });
        }

        // hmean backs the default initial thickness and must match when the
        // initial condition is not read from a file.
        if self.initial_conditions.h_file.is_none() && self.model.hmean.len() != layers {
            return Err(ConfigError::LayerLength {
                key: "model.hmean",
                expected: layers,
                found: self.model.hmean.len(),
            });
        }

        let ps = &self.pressure_solver;
        if ps.nproc_x == 0
            || ps.nproc_y == 0
            || ps.nproc_x > self.grid.nx
            || ps.nproc_y > self.grid.ny
        {
            return Err(ConfigError::WorkerGrid {
                nproc_x: ps.nproc_x,
                nproc_y: ps.nproc_y,
                nx: self.grid.nx,
                ny: self.grid.ny,
            });
        }

        Ok(())
    }

    /// Total workers demanded by the launch contract.
    pub fn worker_count(&self) -> usize {
        self.pressure_solver.nproc_x * self.pressure_solver.nproc_y
    }
}
