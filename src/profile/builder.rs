//! Profile construction with eager validation and documented defaults.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use ndarray::{Array, Array2, Array3, ArrayView, ArrayViewD, Dimension, IntoDimension};

use super::{derive::DerivedStore, Field, FieldDefault, Profile, ShapeClass};
use super::MAX_LAYERS;
use crate::config::DerivationGuards;
use crate::error::{ProfileError, Result};
use crate::warning::{Warning, Warnings};

/// Humidity input, one of which is mandatory.
#[derive(Debug, Clone)]
pub enum Humidity<'a> {
    /// Relative humidity (0-1) at the levels
    Relative(ArrayViewD<'a, f64>),
    /// Specific humidity (kg/kg) of the layers
    Specific(ArrayViewD<'a, f64>),
}

/// Value for a single field: either one number for every cell, or an array
/// with as many elements as the field's canonical shape.
#[derive(Debug, Clone)]
pub enum FieldValue<'a> {
    /// Broadcast to every cell
    Scalar(f64),
    /// Reshaped (in row-major order) to the field's shape
    Array(ArrayViewD<'a, f64>),
}

impl From<f64> for FieldValue<'_> {
    fn from(value: f64) -> Self {
        Self::Scalar(value)
    }
}

impl<'a, D: Dimension> From<ArrayView<'a, f64, D>> for FieldValue<'a> {
    fn from(value: ArrayView<'a, f64, D>) -> Self {
        Self::Array(value.into_dyn())
    }
}

impl<'a, D: Dimension> From<&'a Array<f64, D>> for FieldValue<'a> {
    fn from(value: &'a Array<f64, D>) -> Self {
        Self::Array(value.view().into_dyn())
    }
}

impl FieldValue<'_> {
    pub(crate) fn into_shape<D: Dimension>(
        self,
        field: Field,
        shape: impl IntoDimension<Dim = D>,
    ) -> Result<Array<f64, D>> {
        let dim = shape.into_dimension();
        match self {
            FieldValue::Scalar(value) => Ok(Array::from_elem(dim, value)),
            FieldValue::Array(values) => reshape(&field.to_string(), values, dim),
        }
    }
}

/// Copy `values` into an array of shape `dim`, as long as the element counts
/// agree.
fn reshape<D: Dimension>(name: &str, values: ArrayViewD<'_, f64>, dim: D) -> Result<Array<f64, D>> {
    let mismatch = || ProfileError::ShapeMismatch {
        field: name.into(),
        found: values.shape().to_vec(),
        expected: dim.slice().to_vec(),
    };
    if values.len() != dim.size() {
        return Err(mismatch());
    }
    Array::from_shape_vec(dim.clone(), values.iter().copied().collect()).map_err(|_| mismatch())
}

/// Collects the inputs of a [`Profile`].
///
/// The grid is fixed by the mandatory inputs, so every optional field is
/// shape checked as soon as it is set. Optional fields that are never set
/// get their [`FieldDefault`] in [`ProfileBuilder::build`], with a warning.
#[derive(Debug)]
pub struct ProfileBuilder {
    ngridx: usize,
    ngridy: usize,
    max_nlyrs: usize,
    hgt_lev: Array3<f64>,
    temp_lev: Array3<f64>,
    press_lev: Array3<f64>,
    relhum_lev: Option<Array3<f64>>,
    columns: BTreeMap<Field, Array2<f64>>,
    layers: BTreeMap<Field, Array3<f64>>,
    deltax: f64,
    deltay: f64,
    guards: DerivationGuards,
    warnings: Warnings,
}

impl ProfileBuilder {
    /// Start from the mandatory fields.
    ///
    /// The grid is inferred from `hgt_lev`: with one dimension it is a single
    /// column, with two it is `(ngridx, 1)` columns and with three
    /// `(ngridx, ngridy)`. The last axis holds the levels, so `max_nlyrs` is
    /// its length minus one. The other inputs only need the same number of
    /// elements as their canonical shape.
    pub fn new(
        hgt_lev: ArrayViewD<'_, f64>,
        temp_lev: ArrayViewD<'_, f64>,
        press_lev: ArrayViewD<'_, f64>,
        humidity: Humidity<'_>,
    ) -> Result<Self> {
        let shape = hgt_lev.shape();
        let (ngridx, ngridy) = match shape.len() {
            1 => (1, 1),
            2 => (shape[0], 1),
            3 => (shape[0], shape[1]),
            ndim => {
                return Err(ProfileError::Shape {
                    field: Field::HgtLev.to_string(),
                    ndim,
                })
            }
        };
        let num_levels = shape[shape.len() - 1];
        if num_levels < 2 {
            return Err(ProfileError::InvalidAxis("a column needs at least two levels"));
        }
        let max_nlyrs = num_levels - 1;

        let levels = (ngridx, ngridy, max_nlyrs + 1);
        let layers = (ngridx, ngridy, max_nlyrs);

        let mut builder = Self {
            ngridx,
            ngridy,
            max_nlyrs,
            hgt_lev: FieldValue::Array(hgt_lev).into_shape(Field::HgtLev, levels)?,
            temp_lev: FieldValue::Array(temp_lev).into_shape(Field::TempLev, levels)?,
            press_lev: FieldValue::Array(press_lev).into_shape(Field::PressLev, levels)?,
            relhum_lev: None,
            columns: BTreeMap::new(),
            layers: BTreeMap::new(),
            deltax: 0.,
            deltay: 0.,
            guards: DerivationGuards::default(),
            warnings: Warnings::default(),
        };

        match humidity {
            Humidity::Relative(rh) => {
                let rh = FieldValue::Array(rh).into_shape(Field::RelhumLev, levels)?;
                builder.relhum_lev = Some(rh);
            }
            Humidity::Specific(q) => {
                builder
                    .layers
                    .insert(Field::Q, FieldValue::Array(q).into_shape(Field::Q, layers)?);
            }
        }

        if max_nlyrs > MAX_LAYERS {
            builder.warnings.push(Warning::TooManyLayers { max_nlyrs });
        }

        Ok(builder)
    }

    /// Set an optional field by name. Unknown names fail with
    /// [`ProfileError::UnknownField`].
    pub fn set_optional<'v>(
        &mut self,
        name: &str,
        value: impl Into<FieldValue<'v>>,
    ) -> Result<&mut Self> {
        self.set(Field::from_name(name)?, value)
    }

    /// Set an optional field.
    pub fn set<'v>(&mut self, field: Field, value: impl Into<FieldValue<'v>>) -> Result<&mut Self> {
        let value = value.into();
        let shape2d = (self.ngridx, self.ngridy);
        let shape3d = (self.ngridx, self.ngridy, self.max_nlyrs);

        match (field, field.shape_class()) {
            (Field::HgtLev | Field::TempLev | Field::PressLev, _) => {
                return Err(ProfileError::NotSettable(field))
            }
            (_, ShapeClass::Level) => {
                let levels = (self.ngridx, self.ngridy, self.max_nlyrs + 1);
                self.relhum_lev = Some(value.into_shape(field, levels)?);
            }
            (_, ShapeClass::Column) => {
                self.columns.insert(field, value.into_shape(field, shape2d)?);
            }
            (_, ShapeClass::Layer) => {
                self.layers.insert(field, value.into_shape(field, shape3d)?);
            }
        }
        Ok(self)
    }

    /// Grid spacing along x and y, m. Defaults to 0.
    pub fn grid_spacing(&mut self, deltax: f64, deltay: f64) -> &mut Self {
        self.deltax = deltax;
        self.deltay = deltay;
        self
    }

    /// Guard values for the derivations.
    pub fn guards(&mut self, guards: DerivationGuards) -> &mut Self {
        self.guards = guards;
        self
    }

    /// Fill in defaults, replace NaNs with [`MISSING`](super::MISSING) and derive the level
    /// relative humidity if only specific humidity was given.
    pub fn build(self) -> Result<Profile> {
        let Self {
            ngridx,
            ngridy,
            max_nlyrs,
            hgt_lev,
            temp_lev,
            press_lev,
            relhum_lev,
            mut columns,
            mut layers,
            deltax,
            deltay,
            guards,
            mut warnings,
        } = self;

        let shape2d = (ngridx, ngridy);
        let shape3d = (ngridx, ngridy, max_nlyrs);

        for field in Field::all() {
            match (field.default_policy(), field.shape_class()) {
                (FieldDefault::Value(value), ShapeClass::Column)
                    if !columns.contains_key(&field) =>
                {
                    columns.insert(field, Array2::from_elem(shape2d, value));
                    warnings.push(Warning::DefaultedField { field, value });
                }
                (FieldDefault::Value(value), ShapeClass::Layer) if !layers.contains_key(&field) => {
                    layers.insert(field, Array3::from_elem(shape3d, value));
                    warnings.push(Warning::DefaultedField { field, value });
                }
                (FieldDefault::Now, _) if !columns.contains_key(&field) => {
                    let unixtime = SystemTime::now()
                        .duration_since(UNIX_EPOCH)
                        .map_or(0, |d| d.as_secs() as i64);
                    columns.insert(field, Array2::from_elem(shape2d, unixtime as f64));
                    warnings.push(Warning::TimestampDefaulted { unixtime });
                }
                _ => {}
            }
        }

        let mut levels = BTreeMap::new();
        levels.insert(Field::HgtLev, hgt_lev);
        levels.insert(Field::TempLev, temp_lev);
        levels.insert(Field::PressLev, press_lev);
        let derive_relhum = relhum_lev.is_none();
        if let Some(relhum_lev) = relhum_lev {
            levels.insert(Field::RelhumLev, relhum_lev);
        }

        let mut profile = Profile {
            ngridx,
            ngridy,
            max_nlyrs,
            nlyrs: Array2::zeros(shape2d),
            source_index: Array2::from_shape_fn(shape2d, |(i, j)| (i + 1, j + 1)),
            deltax,
            deltay,
            columns,
            layers,
            levels,
            derived: DerivedStore::default(),
            generation: 0,
            guards,
            warnings,
        };
        profile.finalize_nans();
        profile.recount_layers();

        if derive_relhum {
            let relhum_lev = profile.derive_relhum_lev()?;
            profile.levels.insert(Field::RelhumLev, relhum_lev);
        }

        Ok(profile)
    }
}
