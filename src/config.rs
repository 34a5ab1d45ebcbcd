//! Typed configuration for derivations, data checks and runs.

use std::time::Duration;

use crate::profile::{Field, Hydrometeor};
use crate::settings::EngineSettings;

/// Guard values used by the layer pressure reconstruction.
///
/// These keep the computation finite for degenerate columns. They are not
/// physical constants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivationGuards {
    /// Substituted for non-positive level pressures before taking the logarithm, Pa
    pub pressure_floor: f64,
    /// Substituted for layer thicknesses that are zero, negative or undefined, m
    pub degenerate_thickness: f64,
    /// Substituted for a vanishing extinction coefficient. `None` evaluates
    /// the limit of the integral instead, which is the bottom pressure.
    pub zero_extinction: Option<f64>,
}

impl Default for DerivationGuards {
    fn default() -> Self {
        Self {
            pressure_floor: 1.,
            degenerate_thickness: 9999.,
            zero_extinction: None,
        }
    }
}

/// Plausible bounds checked before anything is sent to the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeLimits {
    /// (field, minimum, maximum)
    pub bounds: Vec<(Field, f64, f64)>,
}

impl Default for RangeLimits {
    fn default() -> Self {
        let mut bounds = vec![
            (Field::RelhumLev, 0., 2.),
            (Field::TempLev, 170., 320.),
            (Field::PressLev, 1., 110000.),
        ];
        bounds.extend(
            Hydrometeor::ALL
                .into_iter()
                .map(|h| (Field::MixingRatio(h), 0., 0.05)),
        );
        Self { bounds }
    }
}

/// Sizes of the brightness temperature axes the engine fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputShape {
    /// Number of output levels (e.g. top of atmosphere and ground)
    pub n_outlevels: usize,
    /// Number of observation angles
    pub n_angles: usize,
    /// Number of Stokes components
    pub n_stokes: usize,
}

impl Default for OutputShape {
    fn default() -> Self {
        Self {
            n_outlevels: 2,
            n_angles: 32,
            n_stokes: 2,
        }
    }
}

/// How a run is cut up and executed.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    /// Frequencies per sub-cube, 0 for no splitting
    pub delta_f: usize,
    /// Columns along x per sub-cube, 0 for no splitting
    pub delta_x: usize,
    /// Columns along y per sub-cube, 0 for no splitting
    pub delta_y: usize,
    /// Number of worker threads, `None` to let rayon decide
    pub num_threads: Option<usize>,
    /// Minimum time between progress log messages
    pub progress_interval: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            delta_f: 1,
            delta_x: 0,
            delta_y: 0,
            num_threads: None,
            progress_interval: Duration::from_secs(5),
        }
    }
}

/// Everything besides the profile and the frequencies that a run needs.
#[derive(Debug, Clone, Default)]
pub struct RunConfig {
    /// Named engine configuration, handed to every job
    pub settings: EngineSettings,
    /// Brightness temperature tensor sizes
    pub output: OutputShape,
    /// Data sanity bounds
    pub limits: RangeLimits,
    /// Partitioning and threading
    pub options: RunOptions,
}
