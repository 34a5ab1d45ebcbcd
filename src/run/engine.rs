use std::collections::BTreeMap;

use ndarray::{Array3, Array4, Array6};
use smallvec::SmallVec;

use super::SubCube;
use crate::config::OutputShape;
use crate::profile::{Hydrometeor, Profile, ProfileSlice, MISSING};
use crate::settings::EngineSettings;

/// Error type engines report failures with.
pub type EngineError = Box<dyn std::error::Error + Send + Sync>;

/// Everything the engine needs to compute one sub-cube.
///
/// The profile is an owned copy, so jobs can be handed to other threads
/// independently of each other.
#[derive(Debug, Clone)]
pub struct Job {
    /// Where in the run's cube this job sits
    pub cube: SubCube,
    /// Frequencies of the sub-cube, GHz
    pub frequencies: SmallVec<[f64; 8]>,
    /// Columns of the sub-cube
    pub profile: ProfileSlice,
}

impl Job {
    /// Cut the job for `cube` out of `profile` and `frequencies`.
    pub fn new(cube: SubCube, profile: &Profile, frequencies: &[f64]) -> Self {
        Self {
            frequencies: frequencies[cube.f.clone()].iter().copied().collect(),
            profile: profile.slice(cube.x.clone(), cube.y.clone()),
            cube,
        }
    }

    /// Sub-cube size as `(nx, ny, nf)`.
    pub fn dim(&self) -> (usize, usize, usize) {
        let (nx, ny) = self.profile.grid();
        (nx, ny, self.frequencies.len())
    }
}

/// A radiative transfer engine.
pub trait RtEngine: Sync {
    /// Compute one sub-cube.
    fn run(&self, job: &Job, settings: &EngineSettings) -> Result<EngineOutput, EngineError>;
}

/// What the engine returns for one sub-cube. Arrays are indexed relative to
/// the sub-cube.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineOutput {
    /// Engine version
    pub version: String,
    /// Identifies the engine build
    pub build_hash: String,
    /// Observation angles of the brightness temperatures, degrees
    pub angles: Vec<f64>,
    /// Radar reflectivity, (x, y, z, f)
    pub ze: Array4<f64>,
    /// Attenuation by hydrometeors, (x, y, z, f)
    pub att_hydro: Array4<f64>,
    /// Attenuation by the atmosphere, (x, y, z, f)
    pub att_atmo: Array4<f64>,
    /// Reflectivity per hydrometeor species, if split up
    pub ze_species: BTreeMap<Hydrometeor, Array4<f64>>,
    /// Attenuation per hydrometeor species, if split up
    pub att_species: BTreeMap<Hydrometeor, Array4<f64>>,
    /// Absolute height of the layers, (x, y, z)
    pub hgt: Array3<f64>,
    /// Brightness temperatures, (x, y, outlevel, angle, f, stokes), for
    /// passive runs
    pub tb: Option<Array6<f64>>,
}

impl EngineOutput {
    /// Output for `job` with every value missing, to be filled in by an engine.
    pub fn missing(job: &Job, shape: &OutputShape, passive: bool) -> Self {
        let (nx, ny, nf) = job.dim();
        let nz = job.profile.max_nlyrs;
        let layer = || Array4::from_elem((nx, ny, nz, nf), MISSING);
        Self {
            version: String::new(),
            build_hash: String::new(),
            angles: vec![MISSING; shape.n_angles],
            ze: layer(),
            att_hydro: layer(),
            att_atmo: layer(),
            ze_species: BTreeMap::new(),
            att_species: BTreeMap::new(),
            hgt: Array3::from_elem((nx, ny, nz), MISSING),
            tb: passive.then(|| {
                Array6::from_elem(
                    (nx, ny, shape.n_outlevels, shape.n_angles, nf, shape.n_stokes),
                    MISSING,
                )
            }),
        }
    }
}
