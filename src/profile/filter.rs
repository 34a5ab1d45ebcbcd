use log::debug;
use ndarray::{Array2, Array3, ArrayViewD};

use super::Profile;
use crate::error::{ProfileError, Result};

impl Profile {
    /// Keep only the columns where `mask` is true.
    ///
    /// `mask` is either shaped like the grid or flattened to `ngridx * ngridy`
    /// entries in row-major order. The kept columns end up on a `1 × K` grid,
    /// in row-major order of their old position. Cached derivations are
    /// filtered along with the fields.
    pub fn filter(&mut self, mask: ArrayViewD<'_, bool>) -> Result<()> {
        let (nx, ny) = self.shape2d();
        let keep: Vec<(usize, usize)> = match *mask.shape() {
            [n] if n == nx * ny => mask
                .iter()
                .enumerate()
                .filter(|(_, &k)| k)
                .map(|(i, _)| (i / ny, i % ny))
                .collect(),
            [a, b] if (a, b) == (nx, ny) => mask
                .indexed_iter()
                .filter(|(_, &k)| k)
                .map(|(index, _)| (index[0], index[1]))
                .collect(),
            _ => {
                return Err(ProfileError::ShapeMismatch {
                    field: "mask".into(),
                    found: mask.shape().to_vec(),
                    expected: vec![nx, ny],
                })
            }
        };
        debug!("filtering {} of {} columns", keep.len(), nx * ny);

        self.ngridx = 1;
        self.ngridy = keep.len();
        self.nlyrs = select_columns(&self.nlyrs, &keep);
        self.source_index = select_columns(&self.source_index, &keep);
        for values in self.columns.values_mut() {
            *values = select_columns(values, &keep);
        }
        for values in self.layers.values_mut().chain(self.levels.values_mut()) {
            *values = select_cubes(values, &keep);
        }
        self.derived.map_entries(|_, values| select_cubes(values, &keep));
        self.generation += 1;
        Ok(())
    }
}

fn select_columns<T: Clone>(values: &Array2<T>, keep: &[(usize, usize)]) -> Array2<T> {
    Array2::from_shape_fn((1, keep.len()), |(_, n)| {
        let (x, y) = keep[n];
        values[[x, y]].clone()
    })
}

fn select_cubes(values: &Array3<f64>, keep: &[(usize, usize)]) -> Array3<f64> {
    let nz = values.dim().2;
    Array3::from_shape_fn((1, keep.len(), nz), |(_, n, z)| {
        let (x, y) = keep[n];
        values[[x, y, z]]
    })
}
