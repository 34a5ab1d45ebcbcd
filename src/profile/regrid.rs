//! Interpolation of a profile onto a new height axis.

use log::debug;
use ndarray::{Array3, ArrayView1, Axis, Zip};

use super::{is_missing, propagate, Field, Profile, MISSING};
use crate::error::{ProfileError, Result};

/// Values below this after interpolation are treated as missing.
const VALID_MIN: f64 = -1.;

/// The valid part of one column's height axis.
#[derive(Debug, Default)]
struct ColumnAxis {
    /// Indices of the levels with a height
    levels: Vec<usize>,
    /// Heights of those levels
    heights: Vec<f64>,
    /// Indices of layers bounded by two valid levels
    layers: Vec<usize>,
    /// Mid-heights of those layers
    mids: Vec<f64>,
}

impl ColumnAxis {
    fn new(hgt: ArrayView1<'_, f64>) -> Self {
        let mut axis = Self::default();
        for (k, &h) in hgt.iter().enumerate() {
            if !is_missing(h) {
                axis.levels.push(k);
                axis.heights.push(h);
            }
        }
        for k in 0..hgt.len().saturating_sub(1) {
            let (h0, h1) = (hgt[k], hgt[k + 1]);
            if !is_missing(h0) && !is_missing(h1) {
                axis.layers.push(k);
                axis.mids.push(0.5 * (h0 + h1));
            }
        }
        axis
    }

    /// Highest valid level, if the column has at least one layer.
    fn top(&self) -> Option<f64> {
        match self.heights.len() {
            0 | 1 => None,
            n => Some(self.heights[n - 1]),
        }
    }
}

/// How values are interpolated between heights.
#[derive(Debug, Clone, Copy)]
enum Scale {
    Linear,
    /// Interpolate the logarithm; values are floored to the given minimum
    Log(f64),
}

impl Scale {
    fn forward(self, value: f64) -> f64 {
        match self {
            Scale::Linear => value,
            Scale::Log(floor) => propagate([value], |[v]| v.max(floor).ln()),
        }
    }

    fn inverse(self, value: f64) -> f64 {
        match self {
            Scale::Linear => value,
            Scale::Log(_) => propagate([value], |[v]| v.exp()),
        }
    }
}

impl Profile {
    /// Interpolate every layer and level field onto the level heights
    /// `new_hgt_lev`, shared by all columns.
    ///
    /// Level values are interpolated linearly in height, pressure linearly in
    /// its logarithm. Layer values are interpolated between layer
    /// mid-heights. New levels above a column's top are missing, new levels
    /// below its bottom take the bottom value. Afterwards every value below
    /// -1 is set to [`MISSING`], the layer counts are recomputed and all
    /// cached derivations are evicted.
    pub fn rescale_heights(&mut self, new_hgt_lev: &[f64]) -> Result<()> {
        if new_hgt_lev.len() < 2 {
            return Err(ProfileError::InvalidAxis("at least two levels are needed"));
        }
        if new_hgt_lev.iter().any(|h| !h.is_finite()) {
            return Err(ProfileError::InvalidAxis("heights must be finite"));
        }
        if new_hgt_lev.windows(2).any(|w| w[1] <= w[0]) {
            return Err(ProfileError::InvalidAxis("heights must be strictly increasing"));
        }

        let new_mids: Vec<f64> = new_hgt_lev.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect();
        let (nx, ny) = self.shape2d();
        let max_nlyrs = new_hgt_lev.len() - 1;
        debug!(
            "regridding {nx}x{ny} columns from {} to {max_nlyrs} layers",
            self.max_nlyrs
        );

        let axes = self
            .require_level(Field::HgtLev)?
            .lanes(Axis(2))
            .into_iter()
            .map(ColumnAxis::new)
            .collect::<Vec<_>>();
        // lanes come in row-major order of the grid
        let axes = ndarray::Array2::from_shape_vec((nx, ny), axes)
            .map_err(|_| ProfileError::InvalidAxis("inconsistent height field"))?;

        let floor = self.guards.pressure_floor;
        for (&field, values) in self.levels.iter_mut() {
            let mut regridded = Array3::from_elem((nx, ny, max_nlyrs + 1), MISSING);
            Zip::from(regridded.lanes_mut(Axis(2)))
                .and(values.lanes(Axis(2)))
                .and(&axes)
                .for_each(|mut out, old, axis| {
                    let Some(top) = axis.top() else {
                        return;
                    };
                    let scale = match field {
                        Field::PressLev => Scale::Log(floor),
                        _ => Scale::Linear,
                    };
                    let ys: Vec<f64> = axis.levels.iter().map(|&k| scale.forward(old[k])).collect();
                    for (out, &h) in out.iter_mut().zip(new_hgt_lev) {
                        if h > top {
                            break;
                        }
                        *out = match field {
                            Field::HgtLev => h,
                            _ => scale.inverse(interp(h, &axis.heights, &ys)),
                        };
                    }
                });
            *values = regridded;
        }

        for values in self.layers.values_mut() {
            let mut regridded = Array3::from_elem((nx, ny, max_nlyrs), MISSING);
            Zip::from(regridded.lanes_mut(Axis(2)))
                .and(values.lanes(Axis(2)))
                .and(&axes)
                .for_each(|mut out, old, axis| {
                    let Some(top) = axis.top() else {
                        return;
                    };
                    let new_nlyrs = new_hgt_lev
                        .iter()
                        .take_while(|&&h| h <= top)
                        .count()
                        .saturating_sub(1);
                    let ys: Vec<f64> = axis.layers.iter().map(|&k| old[k]).collect();
                    for (out, &mid) in out.iter_mut().zip(&new_mids).take(new_nlyrs) {
                        *out = interp(mid, &axis.mids, &ys);
                    }
                });
            *values = regridded;
        }

        let invalidate = |v: &mut f64| {
            if *v < VALID_MIN {
                *v = MISSING;
            }
        };
        self.layers.values_mut().for_each(|a| a.map_inplace(invalidate));
        self.levels.values_mut().for_each(|a| a.map_inplace(invalidate));

        self.max_nlyrs = max_nlyrs;
        self.recount_layers();
        self.warn_if_too_many_layers();
        self.invalidate_derived();
        Ok(())
    }
}

/// Piecewise linear interpolation of the points `(xs, ys)` at `x`, holding
/// the end values outside of `xs`. `xs` must be increasing. The result is
/// missing if either bracketing value is.
/// A point hit exactly takes its own value, whatever its neighbours are.
fn interp(x: f64, xs: &[f64], ys: &[f64]) -> f64 {
    match xs.partition_point(|&xi| xi < x) {
        _ if xs.is_empty() => MISSING,
        0 => ys[0],
        i if i == xs.len() => ys[i - 1],
        i if xs[i] == x => ys[i],
        i => {
            let (x0, x1) = (xs[i - 1], xs[i]);
            propagate([ys[i - 1], ys[i]], |[y0, y1]| {
                if x1 == x0 {
                    y1
                } else {
                    y0 + (y1 - y0) * (x - x0) / (x1 - x0)
                }
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn interpolation_holds_end_values() {
        let xs = [0., 10., 20.];
        let ys = [1., 2., 4.];
        assert_eq!(interp(-5., &xs, &ys), 1.);
        assert_eq!(interp(0., &xs, &ys), 1.);
        assert_relative_eq!(interp(15., &xs, &ys), 3.);
        assert_eq!(interp(20., &xs, &ys), 4.);
        assert_eq!(interp(25., &xs, &ys), 4.);
        assert!(is_missing(interp(1., &[], &[])));
    }

    #[test]
    fn missing_neighbours_propagate() {
        let xs = [0., 10., 20.];
        let ys = [1., MISSING, 4.];
        assert!(is_missing(interp(5., &xs, &ys)));
        assert!(is_missing(interp(15., &xs, &ys)));
        assert_eq!(interp(20., &xs, &ys), 4.);
        assert_eq!(interp(0., &xs, &ys), 1.);
        assert!(is_missing(interp(10., &xs, &ys)));
    }

    #[test]
    fn log_scale_round_trips_and_keeps_missing() {
        let scale = Scale::Log(1.);
        assert_relative_eq!(scale.inverse(scale.forward(85000.)), 85000., max_relative = 1e-12);
        assert_relative_eq!(scale.inverse(scale.forward(0.5)), 1.);
        assert!(is_missing(scale.inverse(scale.forward(MISSING))));
    }

    #[test]
    fn column_axis_skips_padding() {
        let hgt = ndarray::arr1(&[0., 100., 300., MISSING]);
        let axis = ColumnAxis::new(hgt.view());
        assert_eq!(axis.levels, vec![0, 1, 2]);
        assert_eq!(axis.layers, vec![0, 1]);
        assert_eq!(axis.mids, vec![50., 200.]);
        assert_eq!(axis.top(), Some(300.));

        let hgt = ndarray::arr1(&[0., MISSING]);
        assert_eq!(ColumnAxis::new(hgt.view()).top(), None);
    }
}
