//! Running a radiative transfer engine over a profile.
//!
//! The frequency × x × y cube is cut into sub-cubes ([`partition`]), each of
//! which becomes an independent [`Job`] for an [`RtEngine`]. The results come
//! back in any order and are collected by an [`Aggregator`] into a
//! [`ResultStore`].

mod aggregate;
mod dispatch;
mod engine;
mod partition;


pub use self::aggregate::{Aggregator, ResultStore, RunState};
pub use self::dispatch::{run_local, run_parallel};
pub use self::engine::{EngineError, EngineOutput, Job, RtEngine};
pub use self::partition::{job_count, partition, SubCube};
