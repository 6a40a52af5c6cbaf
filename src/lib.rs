//! # aronnax
//!
//! An idealized layered rotating fluid, an isopycnal ocean model, on a
//! rectangular Arakawa C-grid with arbitrary bathymetry.
//!
//! The crate advances a stack of active layers of variable thickness
//! under gravity, Coriolis forcing, wind stress, viscosity, drag and
//! optional sponge relaxation, producing raw-binary snapshots, running
//! averages, checkpoints and CSV diagnostics. The core building blocks:
//!
//! - C-grid stencil kernels (Bernoulli potential, vorticity, tendencies)
//! - two-stage initialization plus an Adams–Bashforth 3 main integrator
//! - reduced-gravity and n-layer physics branches
//! - a barotropic correction solved by SOR or preconditioned CG
//! - domain-decomposition bookkeeping with a single halo-refresh seam
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use aronnax::{Model, RunConfig};
//!
//! let config = RunConfig::from_file(Path::new("aronnax.conf"))?;
//! let mut model = Model::new(config, Path::new("."))?;
//! let summary = model.run()?;
//! println!("finished at step {}", summary.final_step);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod barotropic;
pub mod config;
pub mod diagnostics;
pub mod domain;
pub mod forcing;
pub mod grid;
pub mod io;
pub mod kernels;
pub mod model;
pub mod output;
pub mod physics;
pub mod timestep;

// Re-export the main types for convenience.
pub use barotropic::{
    BarotropicCorrector, BarotropicStats, CgSolver, EllipticSolver, SolveStats, SorSolver,
    SurfaceOperator,
};
pub use config::{ConfigError, RunConfig, SolverMethod};
pub use diagnostics::{field2d_stats, first_non_finite, layer_stats, LayerStats};
pub use domain::{Decomposition, DomainError, HaloRefresher, Tile};
pub use forcing::{SpongeFields, WindForcing, WindVariant};
pub use grid::{
    beta_plane_fu, beta_plane_fv, f_plane_fu, f_plane_fv, FaceMasks, Field2D, Field3D, Grid,
    Stagger, WetMask,
};
pub use io::{FieldIoError, InputSource};
pub use kernels::{
    apply_velocity_masks, meridional_momentum_tendency, thickness_tendency,
    zonal_momentum_tendency, MomentumParams,
};
pub use model::{Model, ModelError, RunSummary};
pub use output::{OutputCounts, OutputError, OutputScheduler};
pub use physics::{vorticity, LayerMode, LayerPhysics};
pub use timestep::{adams_bashforth3_step, half_step, State, Tendencies, TendencyHistory};
