//! Gridded atmospheric profiles for microwave radiative transfer.
//!
//! A [`Profile`] holds the atmospheric state of a grid of columns and derives
//! what a radiative transfer engine needs from it: layer means, pressures,
//! humidities and densities. Profiles can be filtered, regridded onto new
//! heights and decorated with cloud information.
//!
//! Runs over a profile are cut into independent sub-cubes of frequencies and
//! columns ([`run::partition`]), dispatched to an [`run::RtEngine`] on a
//! thread pool and collected into a [`run::ResultStore`].
//!
//! With the `python` feature, the crate also builds a Python extension module.

pub mod config;
pub mod error;
pub mod meteo;
pub mod profile;
pub mod run;
pub mod settings;
pub mod warning;

#[cfg(feature = "python")]
mod python;

pub use config::{DerivationGuards, OutputShape, RangeLimits, RunConfig, RunOptions};
pub use error::{ProfileError, Result};
pub use profile::{Derived, Field, FieldValue, Humidity, Hydrometeor, Profile, MISSING};
pub use settings::EngineSettings;
pub use warning::Warning;
