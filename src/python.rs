//! Python bindings.
//!
//! NOTE: this module is only the interface between Rust and Python. The real
//! work happens in the other modules, which do not use `pyo3`.

use log::debug;
use numpy::prelude::*;
use numpy::{PyArray2, PyArray3, PyArrayDyn, PyReadonlyArray1, PyReadonlyArrayDyn, ToPyArray};
use pyo3::exceptions::{PyKeyError, PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyDict;

use crate::config::RangeLimits;
use crate::error::ProfileError;
use crate::profile::{Derived, Field, FieldValue, Humidity, Profile};

impl From<ProfileError> for PyErr {
    fn from(e: ProfileError) -> Self {
        match e {
            ProfileError::UnknownField(_) | ProfileError::MissingField(_) => {
                PyKeyError::new_err(e.to_string())
            }
            ProfileError::Engine { .. } | ProfileError::ThreadPool(_) => {
                PyRuntimeError::new_err(e.to_string())
            }
            _ => PyValueError::new_err(e.to_string()),
        }
    }
}

/// Either a number or an array, as accepted for any field.
fn field_value<'a, 'py>(
    value: &Bound<'py, PyAny>,
    array: &'a mut Option<PyReadonlyArrayDyn<'py, f64>>,
) -> PyResult<FieldValue<'a>> {
    if let Ok(scalar) = value.extract::<f64>() {
        return Ok(FieldValue::Scalar(scalar));
    }
    let values = array.insert(value.extract()?);
    Ok(FieldValue::Array(values.as_array()))
}

/// Gridded atmospheric profile.
#[pyclass(name = "Profile")]
struct PyProfile {
    inner: Profile,
}

#[pymethods]
impl PyProfile {
    /// Create a profile from the mandatory level fields, either relative
    /// humidity at the levels or specific humidity of the layers, and a dict
    /// of optional fields.
    #[new]
    #[pyo3(signature = (
        hgt_lev, temp_lev, press_lev, relhum_lev=None, q=None, optional=None, deltax=0., deltay=0.
    ))]
    #[allow(clippy::too_many_arguments)]
    fn new(
        hgt_lev: PyReadonlyArrayDyn<'_, f64>,
        temp_lev: PyReadonlyArrayDyn<'_, f64>,
        press_lev: PyReadonlyArrayDyn<'_, f64>,
        relhum_lev: Option<PyReadonlyArrayDyn<'_, f64>>,
        q: Option<PyReadonlyArrayDyn<'_, f64>>,
        optional: Option<&Bound<'_, PyDict>>,
        deltax: f64,
        deltay: f64,
    ) -> PyResult<Self> {
        let humidity = match (&relhum_lev, &q) {
            (Some(rh), None) => Humidity::Relative(rh.as_array()),
            (None, Some(q)) => Humidity::Specific(q.as_array()),
            _ => {
                return Err(PyValueError::new_err(
                    "exactly one of relhum_lev and q is needed",
                ))
            }
        };

        let mut builder = Profile::builder(
            hgt_lev.as_array(),
            temp_lev.as_array(),
            press_lev.as_array(),
            humidity,
        )?;
        builder.grid_spacing(deltax, deltay);

        if let Some(optional) = optional {
            for (key, value) in optional.iter() {
                let name: String = key.extract()?;
                let mut array = None;
                builder.set_optional(&name, field_value(&value, &mut array)?)?;
            }
        }

        let inner = builder.build()?;
        debug!("created profile with grid {:?}", inner.grid());
        Ok(Self { inner })
    }

    /// Grid size as (ngridx, ngridy)
    #[getter]
    fn grid(&self) -> (usize, usize) {
        self.inner.grid()
    }

    /// Grid spacing as (deltax, deltay), m
    #[getter]
    fn grid_spacing(&self) -> (f64, f64) {
        self.inner.grid_spacing()
    }

    #[getter]
    fn max_nlyrs(&self) -> usize {
        self.inner.max_nlyrs()
    }

    #[getter]
    fn nlyrs<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray2<usize>> {
        self.inner.nlyrs().to_pyarray(py)
    }

    /// Warnings recorded so far
    #[getter]
    fn warnings(&self) -> Vec<String> {
        self.inner.warnings().iter().map(ToString::to_string).collect()
    }

    /// Names of the stored fields
    fn fields(&self) -> Vec<String> {
        self.inner.fields().map(|f| f.to_string()).collect()
    }

    /// A stored field by name, or None if it isn't present
    fn field<'py>(
        &self,
        py: Python<'py>,
        name: &str,
    ) -> PyResult<Option<Bound<'py, PyArrayDyn<f64>>>> {
        let field = Field::from_name(name)?;
        Ok(self.inner.field(field).map(|values| values.to_pyarray(py)))
    }

    /// Replace a field with a number or an array
    fn set_field(&mut self, name: &str, value: &Bound<'_, PyAny>) -> PyResult<()> {
        let field = Field::from_name(name)?;
        let mut array = None;
        self.inner.set_field(field, field_value(value, &mut array)?)?;
        Ok(())
    }

    /// A derived quantity by name (temp, relhum, press, dz, q, q_lev,
    /// rho_moist)
    fn derived<'py>(&self, py: Python<'py>, name: &str) -> PyResult<Bound<'py, PyArray3<f64>>> {
        let derived = Derived::ALL
            .into_iter()
            .find(|d| d.to_string() == name)
            .ok_or_else(|| PyKeyError::new_err(format!("no derived quantity {name:?}")))?;
        Ok(self.inner.derived(derived)?.to_pyarray(py))
    }

    /// Keep only the columns where `mask` is true
    fn filter(&mut self, mask: PyReadonlyArrayDyn<'_, bool>) -> PyResult<()> {
        Ok(self.inner.filter(mask.as_array())?)
    }

    /// Interpolate onto new level heights
    fn rescale_heights(&mut self, new_hgt_lev: PyReadonlyArray1<'_, f64>) -> PyResult<()> {
        Ok(self.inner.rescale_heights(new_hgt_lev.as_slice()?)?)
    }

    fn add_integrated_values(&mut self) -> PyResult<()> {
        Ok(self.inner.add_integrated_values()?)
    }

    fn add_cloud_shape(&mut self) -> PyResult<()> {
        Ok(self.inner.add_cloud_shape()?)
    }

    fn add_pseudo_adiabatic_lwc(&mut self) -> PyResult<()> {
        Ok(self.inner.add_pseudo_adiabatic_lwc()?)
    }

    /// Check the fields against the default plausible ranges
    fn check_ranges(&self) -> PyResult<()> {
        Ok(self.inner.check_ranges(&RangeLimits::default())?)
    }

    fn __repr__(&self) -> String {
        let (ngridx, ngridy) = self.inner.grid();
        format!(
            "Profile(ngridx={ngridx}, ngridy={ngridy}, max_nlyrs={})",
            self.inner.max_nlyrs()
        )
    }
}

/// Sub-cubes of a run as (index, f_start, f_end, x_start, x_end, y_start,
/// y_end) tuples.
#[pyfunction]
fn partition(
    total_f: usize,
    total_x: usize,
    total_y: usize,
    delta_f: usize,
    delta_x: usize,
    delta_y: usize,
) -> Vec<(usize, usize, usize, usize, usize, usize, usize)> {
    crate::run::partition(total_f, total_x, total_y, delta_f, delta_x, delta_y)
        .into_iter()
        .map(|c| (c.index, c.f.start, c.f.end, c.x.start, c.x.end, c.y.start, c.y.end))
        .collect()
}

/// A Python module implemented in Rust.
#[pymodule]
fn rt_profile(m: &Bound<'_, PyModule>) -> PyResult<()> {
    pyo3_log::init();

    m.add_function(wrap_pyfunction!(partition, m)?)?;
    m.add_class::<PyProfile>()?;
    Ok(())
}
