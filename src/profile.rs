//! Gridded atmospheric profiles.
//!
//! A [`Profile`] holds every field of an (x, y) grid of columns. Each field has
//! one of three canonical shapes: per column `(ngridx, ngridy)`, per layer
//! `(ngridx, ngridy, max_nlyrs)` or per level `(ngridx, ngridy, max_nlyrs + 1)`.
//! Columns can be shorter than `max_nlyrs`, in which case they are padded with
//! [`MISSING`] at the top.

mod builder;
mod cloud;
mod derive;
mod field;
mod filter;
mod regrid;

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::ops::Range;

use log::debug;
use ndarray::{s, Array2, Array3, ArrayView2, ArrayView3, ArrayViewD, Zip};

use crate::config::{DerivationGuards, RangeLimits};
use crate::error::{ProfileError, Result};
use crate::warning::{Warning, Warnings};

pub use self::builder::{FieldValue, Humidity, ProfileBuilder};
pub use self::cloud::{detect_liquid_cloud, CloudLayers, CLOUD_RELHUM_MIN, CLOUD_TEMP_MIN};
pub use self::derive::Derived;
pub use self::field::{Field, FieldDefault, Hydrometeor, ShapeClass};

use self::derive::DerivedStore;

/// Marks a missing or not applicable value in any numeric field.
pub const MISSING: f64 = -9999.;

/// Most layers the engine accepts in a column.
pub const MAX_LAYERS: usize = 200;

/// Whether `value` is the missing-value sentinel.
#[inline]
pub fn is_missing(value: f64) -> bool {
    value == MISSING
}

/// Evaluate `f` unless any of `inputs` is missing, in which case the result is
/// missing as well.
#[inline]
pub(crate) fn propagate<const N: usize>(inputs: [f64; N], f: impl FnOnce([f64; N]) -> f64) -> f64 {
    if inputs.iter().any(|&v| is_missing(v)) {
        MISSING
    } else {
        f(inputs)
    }
}

/// The atmospheric state on a grid of columns.
#[derive(Debug)]
pub struct Profile {
    ngridx: usize,
    ngridy: usize,
    max_nlyrs: usize,
    /// Number of valid layers in each column.
    nlyrs: Array2<usize>,
    /// 1-based (i, j) position of each column in the grid it was created on.
    source_index: Array2<(usize, usize)>,
    deltax: f64,
    deltay: f64,
    columns: BTreeMap<Field, Array2<f64>>,
    layers: BTreeMap<Field, Array3<f64>>,
    levels: BTreeMap<Field, Array3<f64>>,
    derived: DerivedStore,
    /// Bumped whenever cached derivations are evicted or reshaped.
    generation: u64,
    guards: DerivationGuards,
    warnings: Warnings,
}

impl Profile {
    /// Start a new profile from the mandatory fields. See
    /// [`ProfileBuilder::new`].
    pub fn builder(
        hgt_lev: ArrayViewD<'_, f64>,
        temp_lev: ArrayViewD<'_, f64>,
        press_lev: ArrayViewD<'_, f64>,
        humidity: Humidity<'_>,
    ) -> Result<ProfileBuilder> {
        ProfileBuilder::new(hgt_lev, temp_lev, press_lev, humidity)
    }

    /// Grid size as `(ngridx, ngridy)`.
    pub fn grid(&self) -> (usize, usize) {
        (self.ngridx, self.ngridy)
    }

    /// Number of layers of the tallest column.
    pub fn max_nlyrs(&self) -> usize {
        self.max_nlyrs
    }

    /// Number of valid layers per column.
    pub fn nlyrs(&self) -> ArrayView2<'_, usize> {
        self.nlyrs.view()
    }

    /// 1-based grid position each column had when the profile was created.
    /// Filtering keeps these, so they identify columns across reshapes.
    pub fn source_index(&self) -> ArrayView2<'_, (usize, usize)> {
        self.source_index.view()
    }

    /// Grid spacing along x and y, m.
    pub fn grid_spacing(&self) -> (f64, f64) {
        (self.deltax, self.deltay)
    }

    /// Guard values used by the derivations.
    pub fn guards(&self) -> &DerivationGuards {
        &self.guards
    }

    /// Counter that changes every time cached derivations are evicted or
    /// reshaped.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn shape2d(&self) -> (usize, usize) {
        (self.ngridx, self.ngridy)
    }

    pub(crate) fn shape3d(&self) -> (usize, usize, usize) {
        (self.ngridx, self.ngridy, self.max_nlyrs)
    }

    pub(crate) fn shape3d_plus(&self) -> (usize, usize, usize) {
        (self.ngridx, self.ngridy, self.max_nlyrs + 1)
    }

    /// A per-column field, if present.
    pub fn column(&self, field: Field) -> Option<ArrayView2<'_, f64>> {
        self.columns.get(&field).map(Array2::view)
    }

    /// A per-layer field, if present.
    pub fn layer(&self, field: Field) -> Option<ArrayView3<'_, f64>> {
        self.layers.get(&field).map(Array3::view)
    }

    /// A per-level field, if present.
    pub fn level(&self, field: Field) -> Option<ArrayView3<'_, f64>> {
        self.levels.get(&field).map(Array3::view)
    }

    /// Any field as a dynamic-dimensional view, if present.
    pub fn field(&self, field: Field) -> Option<ArrayViewD<'_, f64>> {
        match field.shape_class() {
            ShapeClass::Column => self.column(field).map(|a| a.into_dyn()),
            ShapeClass::Layer => self.layer(field).map(|a| a.into_dyn()),
            ShapeClass::Level => self.level(field).map(|a| a.into_dyn()),
        }
    }

    /// Fields that are currently stored.
    pub fn fields(&self) -> impl Iterator<Item = Field> + '_ {
        self.columns
            .keys()
            .chain(self.layers.keys())
            .chain(self.levels.keys())
            .copied()
    }

    pub(crate) fn require_level(&self, field: Field) -> Result<ArrayView3<'_, f64>> {
        self.level(field).ok_or(ProfileError::MissingField(field))
    }

    /// Replace (or add) a field after construction. Scalars are broadcast to
    /// every cell. Height levels can't be replaced since they define the
    /// column lengths; use [`Profile::rescale_heights`] instead.
    ///
    /// Every cached derivation is evicted.
    pub fn set_field(&mut self, field: Field, value: FieldValue<'_>) -> Result<()> {
        if field == Field::HgtLev {
            return Err(ProfileError::NotSettable(field));
        }
        match field.shape_class() {
            ShapeClass::Column => {
                let data = value.into_shape(field, self.shape2d())?;
                self.columns.insert(field, data);
            }
            ShapeClass::Layer => {
                let data = value.into_shape(field, self.shape3d())?;
                self.layers.insert(field, data);
            }
            ShapeClass::Level => {
                let data = value.into_shape(field, self.shape3d_plus())?;
                self.levels.insert(field, data);
            }
        }
        self.finalize_nans();
        self.invalidate_derived();
        Ok(())
    }

    /// Warnings recorded since the profile was created.
    pub fn warnings(&self) -> &[Warning] {
        self.warnings.as_slice()
    }

    /// Take every recorded warning out of the profile.
    pub fn take_warnings(&mut self) -> Vec<Warning> {
        self.warnings.drain()
    }

    /// Replace every NaN in every field with [`MISSING`].
    pub fn finalize_nans(&mut self) {
        let replace = |v: &mut f64| {
            if v.is_nan() {
                *v = MISSING;
            }
        };
        self.columns.values_mut().for_each(|a| a.map_inplace(replace));
        self.layers.values_mut().for_each(|a| a.map_inplace(replace));
        self.levels.values_mut().for_each(|a| a.map_inplace(replace));
    }

    /// Drop every cached derivation.
    pub fn invalidate_derived(&mut self) {
        debug!("evicting derived quantities");
        self.derived.clear();
        self.generation += 1;
    }

    pub(crate) fn warn_if_too_many_layers(&mut self) {
        if self.max_nlyrs > MAX_LAYERS {
            self.warnings.push(Warning::TooManyLayers {
                max_nlyrs: self.max_nlyrs,
            });
        }
    }

    /// Recount the valid layers of every column from the level heights.
    pub(crate) fn recount_layers(&mut self) {
        let hgt = &self.levels[&Field::HgtLev];
        self.nlyrs = count_layers(hgt.view());
    }

    /// Check physical fields against plausible bounds.
    ///
    /// Maximum bounds are checked against every value, minimum bounds only
    /// against values that aren't missing. Fields that aren't present are
    /// skipped.
    pub fn check_ranges(&self, limits: &RangeLimits) -> Result<()> {
        for &(field, min, max) in &limits.bounds {
            let Some(values) = self.field(field) else {
                continue;
            };

            let highest = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            if highest > max {
                return Err(ProfileError::RangeViolation {
                    field,
                    value: highest,
                    bound_kind: "maximum",
                    bound: max,
                });
            }

            let lowest = values
                .iter()
                .copied()
                .filter(|&v| !is_missing(v))
                .fold(f64::INFINITY, f64::min);
            if lowest < min {
                return Err(ProfileError::RangeViolation {
                    field,
                    value: lowest,
                    bound_kind: "minimum",
                    bound: min,
                });
            }
        }
        Ok(())
    }

    /// Copy out every field for the columns in `x` × `y`. The copy shares
    /// nothing with the profile, so it can be handed to another thread.
    pub fn slice(&self, x: Range<usize>, y: Range<usize>) -> ProfileSlice {
        let cols = |a: &Array2<f64>| a.slice(s![x.clone(), y.clone()]).to_owned();
        let cube = |a: &Array3<f64>| a.slice(s![x.clone(), y.clone(), ..]).to_owned();

        ProfileSlice {
            x: x.clone(),
            y: y.clone(),
            max_nlyrs: self.max_nlyrs,
            nlyrs: self.nlyrs.slice(s![x.clone(), y.clone()]).to_owned(),
            source_index: self.source_index.slice(s![x.clone(), y.clone()]).to_owned(),
            deltax: self.deltax,
            deltay: self.deltay,
            columns: self.columns.iter().map(|(&k, v)| (k, cols(v))).collect(),
            layers: self.layers.iter().map(|(&k, v)| (k, cube(v))).collect(),
            levels: self.levels.iter().map(|(&k, v)| (k, cube(v))).collect(),
        }
    }
}

/// Valid layers per column: the non-missing level heights minus one.
pub(crate) fn count_layers(hgt_lev: ArrayView3<'_, f64>) -> Array2<usize> {
    let (nx, ny, _) = hgt_lev.dim();
    let mut nlyrs = Array2::zeros((nx, ny));
    Zip::from(&mut nlyrs)
        .and(hgt_lev.lanes(ndarray::Axis(2)))
        .for_each(|n, column| {
            *n = column
                .iter()
                .filter(|&&h| !is_missing(h))
                .count()
                .saturating_sub(1);
        });
    nlyrs
}

/// An owned copy of a block of columns of a [`Profile`].
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileSlice {
    /// Range of x indices this was cut from
    pub x: Range<usize>,
    /// Range of y indices this was cut from
    pub y: Range<usize>,
    /// Layer dimension of the layer fields
    pub max_nlyrs: usize,
    /// Valid layers per column
    pub nlyrs: Array2<usize>,
    /// 1-based source grid position per column
    pub source_index: Array2<(usize, usize)>,
    /// Grid spacing along x, m
    pub deltax: f64,
    /// Grid spacing along y, m
    pub deltay: f64,
    /// Per-column fields
    pub columns: BTreeMap<Field, Array2<f64>>,
    /// Per-layer fields
    pub layers: BTreeMap<Field, Array3<f64>>,
    /// Per-level fields
    pub levels: BTreeMap<Field, Array3<f64>>,
}

impl ProfileSlice {
    /// Number of columns as `(nx, ny)`.
    pub fn grid(&self) -> (usize, usize) {
        self.nlyrs.dim()
    }
}
