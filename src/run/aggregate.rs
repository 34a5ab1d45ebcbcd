//! Collection of sub-cube results into the run's result tensors.

use std::collections::BTreeMap;

use log::debug;
use ndarray::{s, Array2, Array3, Array4, Array6, ArrayBase, Data, Dimension};

use super::{EngineOutput, SubCube};
use crate::config::OutputShape;
use crate::error::{ProfileError, Result};
use crate::profile::{Hydrometeor, MISSING};
use crate::settings::EngineSettings;

/// Progress of a run's result collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Tensors exist but nothing was applied yet
    Allocated,
    /// Some, but not all, sub-cubes were applied
    Collecting,
    /// Every sub-cube was applied
    Complete,
}

/// Results of a whole run. Cells that no result was written to hold
/// [`MISSING`].
#[derive(Debug, Clone, PartialEq)]
pub struct ResultStore {
    /// Frequencies of the run, GHz
    pub frequencies: Vec<f64>,
    /// Observation angles, degrees
    pub angles: Vec<f64>,
    /// Engine version that computed the results
    pub engine_version: String,
    /// Build of the engine that computed the results
    pub engine_hash: String,
    /// Engine configuration of the run
    pub settings: EngineSettings,
    /// Radar reflectivity, (x, y, z, f)
    pub ze: Array4<f64>,
    /// Attenuation by hydrometeors, (x, y, z, f)
    pub att_hydro: Array4<f64>,
    /// Attenuation by the atmosphere, (x, y, z, f)
    pub att_atmo: Array4<f64>,
    /// Reflectivity per hydrometeor species, (x, y, z, f)
    pub ze_species: BTreeMap<Hydrometeor, Array4<f64>>,
    /// Attenuation per hydrometeor species, (x, y, z, f)
    pub att_species: BTreeMap<Hydrometeor, Array4<f64>>,
    /// Absolute height of the layers, (x, y, z)
    pub hgt: Array3<f64>,
    /// Brightness temperatures, (x, y, outlevel, angle, f, stokes)
    pub tb: Array6<f64>,
}

/// Metadata every sub-cube of a run has to agree on.
#[derive(Debug, Clone, PartialEq)]
struct RunMetadata {
    version: String,
    build_hash: String,
    angles: Vec<f64>,
}

/// Collects sub-cube results in any order, each exactly once.
#[derive(Debug)]
pub struct Aggregator {
    results: ResultStore,
    /// (x, y, f) cells that have been written
    written: Array3<bool>,
    hgt_written: Array2<bool>,
    metadata: Option<RunMetadata>,
    done: usize,
    expected: usize,
}

impl Aggregator {
    /// Allocate result tensors for `ngridx` × `ngridy` columns of `max_nlyrs`
    /// layers and `frequencies`, expecting `expected` sub-cube results.
    pub fn new(
        ngridx: usize,
        ngridy: usize,
        max_nlyrs: usize,
        frequencies: &[f64],
        shape: OutputShape,
        expected: usize,
    ) -> Self {
        let nf = frequencies.len();
        let layer = || Array4::from_elem((ngridx, ngridy, max_nlyrs, nf), MISSING);
        debug!("allocating results for {ngridx}x{ngridy} columns and {nf} frequencies");

        Self {
            results: ResultStore {
                frequencies: frequencies.to_vec(),
                angles: Vec::new(),
                engine_version: String::new(),
                engine_hash: String::new(),
                settings: EngineSettings::default(),
                ze: layer(),
                att_hydro: layer(),
                att_atmo: layer(),
                ze_species: BTreeMap::new(),
                att_species: BTreeMap::new(),
                hgt: Array3::from_elem((ngridx, ngridy, max_nlyrs), MISSING),
                tb: Array6::from_elem(
                    (
                        ngridx,
                        ngridy,
                        shape.n_outlevels,
                        shape.n_angles,
                        nf,
                        shape.n_stokes,
                    ),
                    MISSING,
                ),
            },
            written: Array3::from_elem((ngridx, ngridy, nf), false),
            hgt_written: Array2::from_elem((ngridx, ngridy), false),
            metadata: None,
            done: 0,
            expected,
        }
    }

    /// Where collection stands.
    pub fn state(&self) -> RunState {
        if self.done == self.expected {
            RunState::Complete
        } else if self.done == 0 {
            RunState::Allocated
        } else {
            RunState::Collecting
        }
    }

    /// Number of results applied.
    pub fn completed(&self) -> usize {
        self.done
    }

    /// Number of results the run needs.
    pub fn expected(&self) -> usize {
        self.expected
    }

    /// The results collected so far.
    pub fn results(&self) -> &ResultStore {
        &self.results
    }

    /// The results of a complete run.
    pub fn into_results(self) -> Result<ResultStore> {
        match self.state() {
            RunState::Complete => Ok(self.results),
            _ => Err(ProfileError::Incomplete {
                done: self.done,
                expected: self.expected,
            }),
        }
    }

    /// Write the engine's result for `cube` into the result tensors.
    ///
    /// Nothing is written unless the result fits the run: its arrays have to
    /// match the sub-cube, none of its cells may have been written before and
    /// its metadata has to agree with earlier results.
    pub fn apply_result(&mut self, cube: &SubCube, output: EngineOutput) -> Result<()> {
        let (nx, ny, nz, nf) = self.results.ze.dim();
        if cube.x.end > nx || cube.y.end > ny || cube.f.end > nf {
            return Err(ProfileError::ShapeMismatch {
                field: format!("sub-cube {}", cube.index),
                found: vec![cube.x.end, cube.y.end, cube.f.end],
                expected: vec![nx, ny, nf],
            });
        }

        let (cx, cy, cf) = (cube.x.len(), cube.y.len(), cube.f.len());
        let layer = [cx, cy, nz, cf];
        check_shape("ze", &output.ze, &layer)?;
        check_shape("att_hydro", &output.att_hydro, &layer)?;
        check_shape("att_atmo", &output.att_atmo, &layer)?;
        for values in output.ze_species.values() {
            check_shape("ze species", values, &layer)?;
        }
        for values in output.att_species.values() {
            check_shape("att species", values, &layer)?;
        }
        check_shape("hgt", &output.hgt, &[cx, cy, nz])?;
        if let Some(tb) = &output.tb {
            let (_, _, nout, nang, _, nstokes) = self.results.tb.dim();
            check_shape("tb", tb, &[cx, cy, nout, nang, cf, nstokes])?;
        }

        let cells = || s![cube.x.clone(), cube.y.clone(), cube.f.clone()];
        if self.written.slice(cells()).iter().any(|&w| w) {
            return Err(ProfileError::DuplicateResult { index: cube.index });
        }

        let metadata = RunMetadata {
            version: output.version.trim().to_string(),
            build_hash: output.build_hash.trim().to_string(),
            angles: output.angles,
        };
        if let Some(expected) = &self.metadata {
            check_metadata(expected, &metadata)?;
        } else {
            self.results.engine_version = metadata.version.clone();
            self.results.engine_hash = metadata.build_hash.clone();
            self.results.angles = metadata.angles.clone();
            self.metadata = Some(metadata);
        }

        let (x, y, f) = (cube.x.clone(), cube.y.clone(), cube.f.clone());
        let layer_slice = || s![x.clone(), y.clone(), .., f.clone()];
        self.results.ze.slice_mut(layer_slice()).assign(&output.ze);
        self.results.att_hydro.slice_mut(layer_slice()).assign(&output.att_hydro);
        self.results.att_atmo.slice_mut(layer_slice()).assign(&output.att_atmo);

        let shape = self.results.ze.raw_dim();
        for (species, values) in output.ze_species {
            self.results
                .ze_species
                .entry(species)
                .or_insert_with(|| Array4::from_elem(shape, MISSING))
                .slice_mut(layer_slice())
                .assign(&values);
        }
        for (species, values) in output.att_species {
            self.results
                .att_species
                .entry(species)
                .or_insert_with(|| Array4::from_elem(shape, MISSING))
                .slice_mut(layer_slice())
                .assign(&values);
        }

        if let Some(tb) = &output.tb {
            self.results
                .tb
                .slice_mut(s![x.clone(), y.clone(), .., .., f.clone(), ..])
                .assign(tb);
        }

        // heights are the same for every frequency, only the first one counts
        let mut hgt_written = self.hgt_written.slice_mut(s![x.clone(), y.clone()]);
        for ((i, j), written) in hgt_written.indexed_iter_mut() {
            if !*written {
                self.results
                    .hgt
                    .slice_mut(s![x.start + i, y.start + j, ..])
                    .assign(&output.hgt.slice(s![i, j, ..]));
                *written = true;
            }
        }

        self.written.slice_mut(cells()).fill(true);
        self.done += 1;
        debug!(
            "applied sub-cube {} ({}/{})",
            cube.index, self.done, self.expected
        );
        Ok(())
    }
}

fn check_shape<S, D>(field: &str, values: &ArrayBase<S, D>, expected: &[usize]) -> Result<()>
where
    S: Data,
    D: Dimension,
{
    if values.shape() == expected {
        Ok(())
    } else {
        Err(ProfileError::ShapeMismatch {
            field: field.into(),
            found: values.shape().to_vec(),
            expected: expected.to_vec(),
        })
    }
}

fn check_metadata(expected: &RunMetadata, found: &RunMetadata) -> Result<()> {
    let mismatch = |what, expected: &dyn std::fmt::Debug, found: &dyn std::fmt::Debug| {
        Err(ProfileError::InconsistentRun {
            what,
            expected: format!("{expected:?}"),
            found: format!("{found:?}"),
        })
    };
    if expected.version != found.version {
        return mismatch("engine version", &expected.version, &found.version);
    }
    if expected.build_hash != found.build_hash {
        return mismatch("engine build hash", &expected.build_hash, &found.build_hash);
    }
    if expected.angles != found.angles {
        return mismatch("angles", &expected.angles, &found.angles);
    }
    Ok(())
}
