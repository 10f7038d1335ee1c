//! Adaptive rejection sampling for log-concave univariate densities.
//!
//! A [`Tdrgw`] generator builds a piecewise exponential hat from tangents of
//! the log-density and a squeeze from secants, and refines both whenever a
//! candidate is rejected. Only the log-density and its derivative are needed,
//! and both may be known up to an additive constant.
//!
//! ```
//! use rand::{rngs::StdRng, SeedableRng};
//! use tdr_rs::{ContDistr, TdrParams};
//!
//! let normal = ContDistr::builder()
//!     .log_pdf(|x| -0.5 * x * x)
//!     .dlog_pdf(|x| -x)
//!     .build()?;
//! let mut generator = TdrParams::new(normal)?.init()?;
//! let mut rng = StdRng::seed_from_u64(42);
//! let draws = generator.sample_n(&mut rng, 1000)?;
//! assert_eq!(draws.len(), 1000);
//! # Ok::<(), tdr_rs::TdrError>(())
//! ```

pub(crate) mod density;
pub(crate) mod error;
pub(crate) mod generator;
pub(crate) mod guide;
pub(crate) mod interval;
pub(crate) mod math;
pub(crate) mod parallel;
pub(crate) mod settings;
pub(crate) mod setup;

pub use density::{ContDistr, ContDistrBuilder, LogDensity};
pub use error::{Result, TdrError};
pub use generator::{SamplerStats, Tdrgw};
pub use parallel::sample_parallel;
pub use settings::{CPoints, TdrParams, TdrSettings};
