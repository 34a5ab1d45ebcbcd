//! Liquid cloud detection and simple cloud models.

use ndarray::{s, Array2, Array3, ArrayView3};
use smallvec::SmallVec;

use super::{is_missing, Field, Hydrometeor, Profile, MISSING};
use crate::error::Result;
use crate::meteo;

/// Relative humidity from which a level counts as cloudy.
pub const CLOUD_RELHUM_MIN: f64 = 0.95;

/// Temperature from which a cloudy level counts as liquid, K.
pub const CLOUD_TEMP_MIN: f64 = 253.15;

/// Contiguous cloudy runs of a single column.
///
/// `base[i]` and `top[i]` are the first and last index of the i-th run,
/// counted from the bottom.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloudLayers {
    /// First index of each run
    pub base: SmallVec<[usize; 4]>,
    /// Last index of each run
    pub top: SmallVec<[usize; 4]>,
    /// Every cloudy index
    pub cloudy: Vec<usize>,
}

impl CloudLayers {
    /// Whether any cloud was found.
    pub fn is_empty(&self) -> bool {
        self.base.is_empty()
    }

    /// `(base, top)` of every run.
    pub fn runs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.base.iter().copied().zip(self.top.iter().copied())
    }
}

/// Find the liquid cloud layers of one column, given its valid level values
/// from the bottom up.
///
/// A level is cloudy where the relative humidity is at least
/// [`CLOUD_RELHUM_MIN`] and the temperature at least [`CLOUD_TEMP_MIN`].
/// Levels without a height never are.
pub fn detect_liquid_cloud(heights: &[f64], temps: &[f64], relhum: &[f64]) -> CloudLayers {
    let mut layers = CloudLayers::default();
    let mut in_cloud = false;

    for (i, ((&h, &t), &rh)) in heights.iter().zip(temps).zip(relhum).enumerate() {
        let cloudy = !is_missing(h) && rh >= CLOUD_RELHUM_MIN && t >= CLOUD_TEMP_MIN;
        match (cloudy, in_cloud) {
            (true, false) => {
                layers.base.push(i);
                layers.top.push(i);
            }
            (true, true) => {
                if let Some(top) = layers.top.last_mut() {
                    *top = i;
                }
            }
            _ => {}
        }
        if cloudy {
            layers.cloudy.push(i);
        }
        in_cloud = cloudy;
    }
    layers
}

impl Profile {
    /// Liquid cloud layers of column `(x, y)`, searched over its valid
    /// levels.
    pub fn cloud_layers(&self, x: usize, y: usize) -> Result<CloudLayers> {
        let n = self.nlyrs[[x, y]];
        let column = |field| -> Result<Vec<f64>> {
            let values = self.require_level(field)?;
            Ok(values.slice(s![x, y, ..n]).to_vec())
        };
        Ok(detect_liquid_cloud(
            &column(Field::HgtLev)?,
            &column(Field::TempLev)?,
            &column(Field::RelhumLev)?,
        ))
    }

    /// Add the cloud base and cloud top heights of every column.
    ///
    /// The base is the height of the lowest run's first level, the top the
    /// height of the level above the highest run's last one. Columns without
    /// cloud get [`MISSING`] for both.
    pub fn add_cloud_shape(&mut self) -> Result<()> {
        let hgt = self.require_level(Field::HgtLev)?;
        let mut base = Array2::from_elem(self.shape2d(), MISSING);
        let mut top = Array2::from_elem(self.shape2d(), MISSING);

        for ((x, y), cloud_base) in base.indexed_iter_mut() {
            let layers = self.cloud_layers(x, y)?;
            if let (Some(&lowest), Some(&highest)) = (layers.base.first(), layers.top.last()) {
                *cloud_base = hgt[[x, y, lowest]];
                top[[x, y]] = hgt[[x, y, highest + 1]];
            }
        }

        self.columns.insert(Field::CloudBase, base);
        self.columns.insert(Field::CloudTop, top);
        Ok(())
    }

    /// Replace the cloud water mixing ratio by an adiabatic liquid water
    /// profile inside every detected cloud, zero elsewhere, and recompute the
    /// cloud water path.
    ///
    /// A run's layers are those between its first and last cloudy level, so
    /// a run of a single level holds no water. Runs touching missing
    /// temperatures or pressures are left empty.
    pub fn add_pseudo_adiabatic_lwc(&mut self) -> Result<()> {
        let hgt = self.require_level(Field::HgtLev)?;
        let temp = self.require_level(Field::TempLev)?;
        let press = self.require_level(Field::PressLev)?;

        let mut cwc = Array3::zeros(self.shape3d());
        for (x, y) in ndarray::indices(self.shape2d()) {
            for (base, top) in self.cloud_layers(x, y)?.runs() {
                if top == base {
                    continue;
                }
                let window = |values: &ArrayView3<'_, f64>| {
                    values.slice(s![x, y, base..=top]).to_vec()
                };
                let (t, p, h) = (window(&temp), window(&press), window(&hgt));
                if t.iter().chain(&p).chain(&h).any(|&v| is_missing(v)) {
                    continue;
                }
                for (k, lwc) in meteo::adiabatic_lwc(&t, &p, &h).into_iter().enumerate() {
                    cwc[[x, y, base + k]] = lwc;
                }
            }
        }

        self.layers.insert(Field::MixingRatio(Hydrometeor::Cloud), cwc);
        self.invalidate_derived();

        let cwp = {
            let cwc = &self.layers[&Field::MixingRatio(Hydrometeor::Cloud)];
            self.column_integral(cwc.view())?
        };
        self.columns.insert(Field::WaterPath(Hydrometeor::Cloud), cwp);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_run() {
        let layers = detect_liquid_cloud(
            &[0., 500., 1000., 1500.],
            &[280., 278., 276., 274.],
            &[0.5, 0.97, 0.98, 0.5],
        );
        assert_eq!(layers.base.as_slice(), &[1]);
        assert_eq!(layers.top.as_slice(), &[2]);
        assert_eq!(layers.cloudy, vec![1, 2]);
    }

    #[test]
    fn separate_runs_and_single_levels() {
        let layers = detect_liquid_cloud(
            &[0., 1., 2., 3., 4., 5.],
            &[280.; 6],
            &[0.96, 0.5, 0.99, 1.0, 0.2, 0.95],
        );
        assert_eq!(layers.runs().collect::<Vec<_>>(), vec![(0, 0), (2, 3), (5, 5)]);
    }

    #[test]
    fn single_level_runs_hold_no_water() {
        let hgt = ndarray::Array1::from(vec![0., 500., 1000., 1500.])
            .into_shape_with_order((1, 1, 4))
            .unwrap();
        let temp = hgt.mapv(|h| 285. - 0.006 * h);
        let press = hgt.mapv(|h: f64| 100000. * (-h / 8000.).exp());
        let rh = ndarray::Array1::from(vec![0.5, 0.97, 0.5, 0.5])
            .into_shape_with_order((1, 1, 4))
            .unwrap();
        let mut profile = Profile::builder(
            hgt.view().into_dyn(),
            temp.view().into_dyn(),
            press.view().into_dyn(),
            crate::profile::Humidity::Relative(rh.view().into_dyn()),
        )
        .unwrap()
        .build()
        .unwrap();

        profile.add_pseudo_adiabatic_lwc().unwrap();
        let cwc = profile.layer(Field::MixingRatio(Hydrometeor::Cloud)).unwrap();
        assert!(cwc.iter().all(|&v| v == 0.));
        assert_eq!(profile.column(Field::WaterPath(Hydrometeor::Cloud)).unwrap()[[0, 0]], 0.);
    }

    #[test]
    fn cold_or_missing_levels_are_clear() {
        let layers = detect_liquid_cloud(
            &[0., MISSING, 2.],
            &[250., 280., 280.],
            &[0.99, 0.99, MISSING],
        );
        assert!(layers.is_empty());
        assert!(layers.cloudy.is_empty());
    }
}
