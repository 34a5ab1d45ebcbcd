use std::ops::Range;

/// One block of the frequency × x × y cube that is computed as a unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubCube {
    /// Position in the order the sub-cubes were emitted
    pub index: usize,
    /// Frequency indices
    pub f: Range<usize>,
    /// Column indices along x
    pub x: Range<usize>,
    /// Column indices along y
    pub y: Range<usize>,
}

impl SubCube {
    /// Number of (frequency, x, y) cells.
    pub fn cells(&self) -> usize {
        self.f.len() * self.x.len() * self.y.len()
    }
}

/// Split `0..total` into consecutive chunks of `delta`, the last one possibly
/// shorter. A `delta` of 0 keeps the axis whole.
fn split(total: usize, delta: usize) -> Vec<Range<usize>> {
    match (total, delta) {
        (0, _) => Vec::new(),
        (_, 0) => vec![0..total],
        _ => (0..total)
            .step_by(delta)
            .map(|start| start..(start + delta).min(total))
            .collect(),
    }
}

/// Number of chunks [`split`] produces.
fn chunks(total: usize, delta: usize) -> usize {
    match (total, delta) {
        (0, _) => 0,
        (_, 0) => 1,
        _ => total.div_ceil(delta),
    }
}

/// Cut the cube of `total_f` frequencies and `total_x` × `total_y` columns
/// into sub-cubes of at most `delta_f` × `delta_x` × `delta_y`.
///
/// Sub-cubes are emitted with frequency as the outermost and y as the
/// innermost axis, and numbered in that order. Together they cover the cube
/// exactly once.
pub fn partition(
    total_f: usize,
    total_x: usize,
    total_y: usize,
    delta_f: usize,
    delta_x: usize,
    delta_y: usize,
) -> Vec<SubCube> {
    let (fs, xs, ys) = (
        split(total_f, delta_f),
        split(total_x, delta_x),
        split(total_y, delta_y),
    );

    let mut cubes = Vec::with_capacity(fs.len() * xs.len() * ys.len());
    for f in &fs {
        for x in &xs {
            for y in &ys {
                cubes.push(SubCube {
                    index: cubes.len(),
                    f: f.clone(),
                    x: x.clone(),
                    y: y.clone(),
                });
            }
        }
    }
    cubes
}

/// Number of sub-cubes [`partition`] emits for the same arguments.
pub fn job_count(
    total_f: usize,
    total_x: usize,
    total_y: usize,
    delta_f: usize,
    delta_x: usize,
    delta_y: usize,
) -> usize {
    chunks(total_f, delta_f) * chunks(total_x, delta_x) * chunks(total_y, delta_y)
}
