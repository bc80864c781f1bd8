//! Synthetic turbulence via multiplicative cascades.
//!
//! The crate builds solenoidal vector fields with tunable power-law
//! spectra and intermittency on periodic grids of 1 to 3 dimensions.
//! Two generation paths share one spectral core:
//!
//! * [`Cascade`] accumulates band-passed log-normal wavelets into a
//!   spectral vector potential and takes its curl.
//! * [`LagrangianMapper`] additionally advects a coordinate field along
//!   the partially built flow and remaps the potential through the
//!   resulting deformation, which folds coherent structures into the
//!   field.
//!
//! Every field owns its thread pool and variate stream; runs with the
//! same seed are bit-identical for any thread count.
//!
//! ```no_run
//! use synturb_core::{Cascade, CascadeParams, FieldConfig};
//!
//! let mut config = FieldConfig::new(3, 64);
//! config.seed = Some(7);
//! let mut cascade = Cascade::<f64>::new("B", config)?;
//! let field = cascade.generate(&CascadeParams::new(8, 0.5))?;
//! assert_eq!(field.len(), 3);
//! # Ok::<(), synturb_core::FieldError>(())
//! ```

pub mod cascade;
pub mod diffops;
pub mod error;
pub mod field;
pub mod grid;
pub mod interp;
pub mod mapper;
pub mod rvs;
pub mod scalar;
pub mod stats;
pub mod storage;
pub mod transform;

pub use cascade::{Cascade, CascadeParams, NoiseChannel, ScaleLadder};
pub use error::FieldError;
pub use field::{Field, FieldConfig};
pub use grid::Grid;
pub use mapper::{LagrangianMapper, LowPassParams, MapperOptions};
pub use rvs::VariateSource;
pub use scalar::Real;
pub use storage::{read_field, read_manifest, write_field, Manifest};
