//! Errors reported by profiles and runs.

use thiserror::Error;

use crate::profile::Field;

/// Possible profile and run errors.
#[derive(Debug, Error)]
pub enum ProfileError {
    /// An input array has a rank the grid can't be inferred from
    #[error("{field} has {ndim} dimensions, expected 1, 2 or 3")]
    Shape {
        /// Name of the offending input
        field: String,
        /// Number of dimensions it had
        ndim: usize,
    },
    /// An input array doesn't match the grid the profile already has
    #[error("{field} has shape {found:?}, expected {expected:?}")]
    ShapeMismatch {
        /// Name of the offending input
        field: String,
        /// Shape that was supplied
        found: Vec<usize>,
        /// Shape that was required
        expected: Vec<usize>,
    },
    /// A field name outside the recognised set
    #[error("could not parse field name {0:?}")]
    UnknownField(String),
    /// A field that has to be present for the operation isn't
    #[error("field {0} is not available")]
    MissingField(Field),
    /// A field that can only be given through the mandatory inputs
    #[error("field {0} can't be set individually")]
    NotSettable(Field),
    /// A new height axis that can't be used for regridding
    #[error("invalid height axis: {0}")]
    InvalidAxis(&'static str),
    /// A physical field outside its plausible bounds
    #[error("unrealistic value for {field}: {value}, {bound_kind} is {bound}")]
    RangeViolation {
        /// The checked field
        field: Field,
        /// The offending extreme value
        value: f64,
        /// Either "maximum" or "minimum"
        bound_kind: &'static str,
        /// The violated bound
        bound: f64,
    },
    /// A sub-cube result was applied over cells that already hold results
    #[error("result for sub-cube {index} overlaps cells that were already written")]
    DuplicateResult {
        /// Sequence index of the offending sub-cube
        index: usize,
    },
    /// A sub-cube result came from a different engine build or configuration
    #[error("inconsistent run: {what} was {found:?}, earlier results had {expected:?}")]
    InconsistentRun {
        /// Which piece of metadata differed
        what: &'static str,
        /// Value recorded from the first completion
        expected: String,
        /// Value of the current completion
        found: String,
    },
    /// The radiative transfer engine failed for a sub-cube
    #[error("radiative transfer engine failed for sub-cube {index}: {source}")]
    Engine {
        /// Sequence index of the failed sub-cube
        index: usize,
        /// The engine's own error
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// A run was requested without any frequencies
    #[error("at least one frequency is needed")]
    NoFrequencies,
    /// The worker pool couldn't be created
    #[error("could not build the worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    /// Results were requested before every sub-cube was applied
    #[error("run is incomplete: {done} of {expected} sub-cubes collected")]
    Incomplete {
        /// Completions applied so far
        done: usize,
        /// Completions needed
        expected: usize,
    },
}

/// Shorthand used throughout the crate.
pub type Result<T, E = ProfileError> = std::result::Result<T, E>;
