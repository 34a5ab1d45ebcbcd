//! Quantities derived from the profile on demand.
//!
//! Everything here is a pure function of the profile's fields, so results are
//! cached per profile until a mutation evicts them. Two threads asking for the
//! same quantity at once may both compute it; the first result stored wins and
//! the values are identical anyway.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use log::debug;
use ndarray::{s, Array2, Array3, ArrayView3, Axis, Zip};

use super::{is_missing, propagate, Field, Hydrometeor, Profile, MISSING};
use crate::config::DerivationGuards;
use crate::error::Result;
use crate::meteo;

/// Quantities that are derived rather than stored in the profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Derived {
    /// Layer mean temperature, K
    Temp,
    /// Layer mean relative humidity
    Relhum,
    /// Layer mean pressure, Pa
    Press,
    /// Layer thickness, m
    Dz,
    /// Layer specific humidity, kg/kg
    Q,
    /// Level specific humidity, kg/kg
    QLev,
    /// Layer moist air density, kg/m³
    RhoMoist,
}

impl Derived {
    /// Every derived quantity.
    pub const ALL: [Derived; 7] = [
        Derived::Temp,
        Derived::Relhum,
        Derived::Press,
        Derived::Dz,
        Derived::Q,
        Derived::QLev,
        Derived::RhoMoist,
    ];
}

impl fmt::Display for Derived {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Derived::Temp => "temp",
            Derived::Relhum => "relhum",
            Derived::Press => "press",
            Derived::Dz => "dz",
            Derived::Q => "q",
            Derived::QLev => "q_lev",
            Derived::RhoMoist => "rho_moist",
        })
    }
}

/// Cache of derived quantities owned by a [`Profile`].
#[derive(Debug, Default)]
pub(crate) struct DerivedStore {
    entries: RwLock<HashMap<Derived, Arc<Array3<f64>>>>,
    computations: AtomicUsize,
}

impl DerivedStore {
    fn get(&self, derived: Derived) -> Option<Arc<Array3<f64>>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&derived)
            .cloned()
    }

    fn insert(&self, derived: Derived, value: Array3<f64>) -> Arc<Array3<f64>> {
        self.computations.fetch_add(1, Ordering::Relaxed);
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(derived)
            .or_insert_with(|| Arc::new(value))
            .clone()
    }

    fn keys(&self) -> Vec<Derived> {
        let mut keys: Vec<_> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect();
        keys.sort();
        keys
    }

    pub(crate) fn clear(&mut self) {
        self.entries
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Replace every cached array by `f` applied to it.
    pub(crate) fn map_entries(&mut self, mut f: impl FnMut(Derived, &Array3<f64>) -> Array3<f64>) {
        let entries = self.entries.get_mut().unwrap_or_else(PoisonError::into_inner);
        for (&derived, value) in entries.iter_mut() {
            *value = Arc::new(f(derived, value));
        }
    }
}

impl Profile {
    fn cached(
        &self,
        derived: Derived,
        compute: impl FnOnce(&Self) -> Result<Array3<f64>>,
    ) -> Result<Arc<Array3<f64>>> {
        if let Some(value) = self.derived.get(derived) {
            return Ok(value);
        }
        debug!("calculating {derived}");
        Ok(self.derived.insert(derived, compute(self)?))
    }

    /// Any derived quantity.
    pub fn derived(&self, derived: Derived) -> Result<Arc<Array3<f64>>> {
        match derived {
            Derived::Temp => self.layer_temperature(),
            Derived::Relhum => self.layer_relhum(),
            Derived::Press => self.layer_pressure(),
            Derived::Dz => self.layer_thickness(),
            Derived::Q => self.specific_humidity(),
            Derived::QLev => self.level_specific_humidity(),
            Derived::RhoMoist => self.moist_density(),
        }
    }

    /// Derived quantities that are currently cached.
    pub fn cached_derivations(&self) -> Vec<Derived> {
        self.derived.keys()
    }

    /// How many derivations have been computed (not served from the cache)
    /// over the profile's lifetime.
    pub fn recomputations(&self) -> usize {
        self.derived.computations.load(Ordering::Relaxed)
    }

    /// Layer temperature, the mean of the bounding levels.
    pub fn layer_temperature(&self) -> Result<Arc<Array3<f64>>> {
        self.cached(Derived::Temp, |p| {
            Ok(layer_mean(p.require_level(Field::TempLev)?))
        })
    }

    /// Layer relative humidity, the mean of the bounding levels.
    pub fn layer_relhum(&self) -> Result<Arc<Array3<f64>>> {
        self.cached(Derived::Relhum, |p| {
            Ok(layer_mean(p.require_level(Field::RelhumLev)?))
        })
    }

    /// Layer thickness. Thicknesses that are not positive, or that involve a
    /// missing height, are replaced by the degenerate thickness guard.
    pub fn layer_thickness(&self) -> Result<Arc<Array3<f64>>> {
        self.cached(Derived::Dz, |p| {
            let hgt = p.require_level(Field::HgtLev)?;
            let guard = p.guards.degenerate_thickness;
            Ok(Zip::from(hgt.slice(s![.., .., ..-1]))
                .and(hgt.slice(s![.., .., 1..]))
                .map_collect(|&h0, &h1| match h1 - h0 {
                    _ if is_missing(h0) || is_missing(h1) => guard,
                    dz if dz <= 0. => guard,
                    dz => dz,
                }))
        })
    }

    /// Layer mean pressure of an exponential pressure profile.
    pub fn layer_pressure(&self) -> Result<Arc<Array3<f64>>> {
        self.cached(Derived::Press, |p| {
            let press = p.require_level(Field::PressLev)?;
            let hgt = p.require_level(Field::HgtLev)?;
            let dz = p.layer_thickness()?;
            let guards = p.guards;
            Ok(Zip::from(press.slice(s![.., .., ..-1]))
                .and(press.slice(s![.., .., 1..]))
                .and(hgt.slice(s![.., .., ..-1]))
                .and(hgt.slice(s![.., .., 1..]))
                .and(&*dz)
                .map_collect(|&p0, &p1, &h0, &h1, &dz| {
                    propagate([p0, p1, h0, h1], |_| log_mean_pressure(p0, p1, dz, &guards))
                }))
        })
    }

    /// Layer specific humidity. Taken as given if the profile was built from
    /// specific humidity, otherwise converted from the layer relative
    /// humidity, temperature and pressure.
    pub fn specific_humidity(&self) -> Result<Arc<Array3<f64>>> {
        self.cached(Derived::Q, |p| {
            if let Some(q) = p.layers.get(&Field::Q) {
                return Ok(q.clone());
            }
            let relhum = p.layer_relhum()?;
            let temp = p.layer_temperature()?;
            let press = p.layer_pressure()?;
            Ok(Zip::from(&*relhum)
                .and(&*temp)
                .and(&*press)
                .map_collect(|&rh, &t, &pr| {
                    propagate([rh, t, pr], |[rh, t, pr]| meteo::rh_to_q(rh, t, pr))
                }))
        })
    }

    /// Specific humidity at the levels.
    ///
    /// Interior levels are the mean of the two adjacent layers. The bottom and
    /// top level of each column are extrapolated from the two nearest layers
    /// as `q0 + 0.25 (q0 - q1)`.
    pub fn level_specific_humidity(&self) -> Result<Arc<Array3<f64>>> {
        self.cached(Derived::QLev, |p| {
            let q = p.specific_humidity()?;
            Ok(layers_to_levels(q.view(), &p.nlyrs))
        })
    }

    /// Density of moist air including the condensed hydrometeors.
    pub fn moist_density(&self) -> Result<Arc<Array3<f64>>> {
        self.cached(Derived::RhoMoist, |p| {
            let press = p.layer_pressure()?;
            let temp = p.layer_temperature()?;
            let q = p.specific_humidity()?;

            let mut q_hydrometeors = Array3::zeros(p.shape3d());
            for species in Hydrometeor::ALL {
                if let Some(mixing_ratio) = p.layers.get(&Field::MixingRatio(species)) {
                    Zip::from(&mut q_hydrometeors)
                        .and(mixing_ratio)
                        .for_each(|total, &m| *total = propagate([*total, m], |[a, b]| a + b));
                }
            }

            Ok(Zip::from(&*press)
                .and(&*temp)
                .and(&*q)
                .and(&q_hydrometeors)
                .map_collect(|&pr, &t, &q, &qh| {
                    propagate([pr, t, q, qh], |[pr, t, q, qh]| meteo::moist_density(pr, t, q, qh))
                }))
        })
    }

    /// Level relative humidity from the level specific humidity.
    pub(crate) fn derive_relhum_lev(&self) -> Result<Array3<f64>> {
        let q_lev = self.level_specific_humidity()?;
        let temp = self.require_level(Field::TempLev)?;
        let press = self.require_level(Field::PressLev)?;
        Ok(Zip::from(&*q_lev)
            .and(temp)
            .and(press)
            .map_collect(|&q, &t, &p| propagate([q, t, p], |[q, t, p]| meteo::q_to_rh(q, t, p))))
    }

    /// Vertical integral of `values * rho_moist * dz` for every column. Layers
    /// with a missing input or without positive thickness are skipped.
    pub(crate) fn column_integral(&self, values: ArrayView3<'_, f64>) -> Result<Array2<f64>> {
        let rho = self.moist_density()?;
        let hgt = self.require_level(Field::HgtLev)?;

        let mut integral = Array2::zeros(self.shape2d());
        Zip::from(&mut integral)
            .and(values.lanes(Axis(2)))
            .and(rho.lanes(Axis(2)))
            .and(hgt.lanes(Axis(2)))
            .for_each(|sum, values, rho, hgt| {
                *sum = (0..values.len())
                    .filter_map(|k| {
                        let (h0, h1) = (hgt[k], hgt[k + 1]);
                        let inputs = [values[k], rho[k], h0, h1];
                        if inputs.iter().any(|&v| is_missing(v)) || h1 <= h0 {
                            None
                        } else {
                            Some(values[k] * rho[k] * (h1 - h0))
                        }
                    })
                    .sum();
            });
        Ok(integral)
    }

    /// Add the integrated water vapor and the water path of every
    /// hydrometeor species as column fields.
    pub fn add_integrated_values(&mut self) -> Result<()> {
        let q = self.specific_humidity()?;
        let iwv = self.column_integral(q.view())?;
        self.columns.insert(Field::Iwv, iwv);

        for species in Hydrometeor::ALL {
            let Some(mixing_ratio) = self.layers.get(&Field::MixingRatio(species)) else {
                continue;
            };
            // nothing to do without hydrometeors
            let path = if mixing_ratio.iter().all(|&m| m == 0.) {
                Array2::zeros(self.shape2d())
            } else {
                self.column_integral(mixing_ratio.view())?
            };
            self.columns.insert(Field::WaterPath(species), path);
        }
        Ok(())
    }
}

/// Mean of each pair of adjacent levels.
fn layer_mean(levels: ArrayView3<'_, f64>) -> Array3<f64> {
    Zip::from(levels.slice(s![.., .., ..-1]))
        .and(levels.slice(s![.., .., 1..]))
        .map_collect(|&a, &b| propagate([a, b], |[a, b]| 0.5 * (a + b)))
}

/// Layer mean of a pressure profile that decays exponentially from `p_bot` to
/// `p_top` over `dz`.
///
/// With the extinction coefficient `xp = -ln(p_top / p_bot) / dz`, the mean is
/// `-p_bot / xp * (exp(-xp dz) - 1) / dz`.
pub(crate) fn log_mean_pressure(
    p_bot: f64,
    p_top: f64,
    dz: f64,
    guards: &DerivationGuards,
) -> f64 {
    let floor = |p: f64| if p > 0. { p } else { guards.pressure_floor };
    let (p0, p1) = (floor(p_bot), floor(p_top));

    let mut xp = -(p1 / p0).ln() / dz;
    if xp == 0. {
        match guards.zero_extinction {
            Some(substitute) => xp = substitute,
            // limit of the integral for xp -> 0
            None => return p0,
        }
    }
    let k = xp * dz;
    -p0 * (-k).exp_m1() / k
}

/// Rebuild level values from layer values, per column of `nlyrs[x, y]`
/// layers. Levels above a column's top are missing.
fn layers_to_levels(layers: ArrayView3<'_, f64>, nlyrs: &Array2<usize>) -> Array3<f64> {
    let (nx, ny, nz) = layers.dim();
    let mut levels = Array3::from_elem((nx, ny, nz + 1), MISSING);

    let extrapolate = |edge: f64, inner: f64| propagate([edge, inner], |[e, i]| e + 0.25 * (e - i));
    Zip::from(levels.lanes_mut(Axis(2)))
        .and(layers.lanes(Axis(2)))
        .and(nlyrs)
        .for_each(|mut out, q, &n| {
            let n = n.min(nz);
            match n {
                0 => {}
                1 => {
                    out[0] = q[0];
                    out[1] = q[0];
                }
                _ => {
                    out[0] = extrapolate(q[0], q[1]);
                    for k in 1..n {
                        out[k] = propagate([q[k - 1], q[k]], |[a, b]| 0.5 * (a + b));
                    }
                    out[n] = extrapolate(q[n - 1], q[n - 2]);
                }
            }
        });
    levels
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::arr2;

    #[test]
    fn isobaric_layer_uses_the_limit() {
        let guards = DerivationGuards::default();
        assert_eq!(log_mean_pressure(90000., 90000., 500., &guards), 90000.);

        let substituted = DerivationGuards {
            zero_extinction: Some(9999.),
            ..guards
        };
        assert!(log_mean_pressure(90000., 90000., 500., &substituted) < 1.);
    }

    #[test]
    fn exponential_mean_is_below_arithmetic_mean() {
        let guards = DerivationGuards::default();
        let (p0, p1, dz) = (101325., 50000., 5000.);
        let mean = log_mean_pressure(p0, p1, dz, &guards);

        // exact mean of p0 * exp(-xp z) over [0, dz]
        let xp = (p0 / p1).ln() / dz;
        assert_relative_eq!(mean, p0 * (1. - (-xp * dz).exp()) / (xp * dz), max_relative = 1e-12);
        assert!(mean < 0.5 * (p0 + p1));
        assert!(mean > p1);
    }

    #[test]
    fn non_positive_pressure_is_floored() {
        let guards = DerivationGuards::default();
        let p = log_mean_pressure(100., 0., 1000., &guards);
        assert!(p.is_finite());
        assert!(p > 1. && p < 100.);
    }

    #[test]
    fn levels_from_layers() {
        let layers = Array3::from_shape_vec((1, 1, 3), vec![4., 2., 1.]).unwrap();
        let nlyrs = arr2(&[[3]]);
        let levels = layers_to_levels(layers.view(), &nlyrs);
        assert_eq!(levels.as_slice().unwrap(), &[4.5, 3., 1.5, 0.75]);

        // shorter column
        let nlyrs = arr2(&[[2]]);
        let levels = layers_to_levels(layers.view(), &nlyrs);
        assert_eq!(levels.as_slice().unwrap(), &[4.5, 3., 1.5, MISSING]);
    }
}
