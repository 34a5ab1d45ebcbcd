use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::time::Instant;

use log::{debug, info, warn};
use rayon::prelude::*;

use super::{job_count, partition, Aggregator, Job, ResultStore, RtEngine, SubCube};
use crate::config::RunConfig;
use crate::error::{ProfileError, Result};
use crate::profile::Profile;

/// Check what every run checks before any engine time is spent.
fn prepare(profile: &Profile, frequencies: &[f64], config: &RunConfig) -> Result<()> {
    if frequencies.is_empty() {
        return Err(ProfileError::NoFrequencies);
    }
    profile.check_ranges(&config.limits)?;
    debug!("profile passed the range check");
    Ok(())
}

fn aggregator(
    profile: &Profile,
    frequencies: &[f64],
    config: &RunConfig,
    expected: usize,
) -> Aggregator {
    let (ngridx, ngridy) = profile.grid();
    Aggregator::new(
        ngridx,
        ngridy,
        profile.max_nlyrs(),
        frequencies,
        config.output,
        expected,
    )
}

/// Run the whole cube as a single job on the calling thread.
pub fn run_local(
    profile: &Profile,
    engine: &dyn RtEngine,
    frequencies: &[f64],
    config: &RunConfig,
) -> Result<ResultStore> {
    prepare(profile, frequencies, config)?;
    let (ngridx, ngridy) = profile.grid();
    info!(
        "Running {ngridx}x{ngridy} columns at {} frequencies",
        frequencies.len()
    );

    let cube = SubCube {
        index: 0,
        f: 0..frequencies.len(),
        x: 0..ngridx,
        y: 0..ngridy,
    };
    let job = Job::new(cube, profile, frequencies);
    let output = engine
        .run(&job, &config.settings)
        .map_err(|source| ProfileError::Engine { index: 0, source })?;

    let mut aggregator = aggregator(profile, frequencies, config, 1);
    aggregator.apply_result(&job.cube, output)?;
    let mut results = aggregator.into_results()?;
    results.settings = config.settings.clone();
    Ok(results)
}

/// Partition the cube and run the sub-cubes on a thread pool.
///
/// Jobs are cut from the profile inside the workers. Results are sent back to
/// the calling thread, which is the only one touching the result tensors.
/// After the first failure, jobs that haven't started yet are skipped and the
/// failure is returned once the pool is idle.
pub fn run_parallel(
    profile: &Profile,
    engine: &dyn RtEngine,
    frequencies: &[f64],
    config: &RunConfig,
) -> Result<ResultStore> {
    prepare(profile, frequencies, config)?;

    let options = &config.options;
    let (ngridx, ngridy) = profile.grid();
    let (nf, dx, dy, df) = (frequencies.len(), options.delta_x, options.delta_y, options.delta_f);
    let cubes = partition(nf, ngridx, ngridy, df, dx, dy);
    let num_jobs = job_count(nf, ngridx, ngridy, df, dx, dy);
    let mut aggregator = aggregator(profile, frequencies, config, num_jobs);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.num_threads.unwrap_or(0))
        .build()?;

    // Jobs the engine finished, and whether anything failed so the remaining
    // jobs can be skipped
    let num_computed = AtomicUsize::new(0);
    let failed = AtomicBool::new(false);
    let mut first_error = None;

    info!(
        "Running {ngridx}x{ngridy} columns at {nf} frequencies as {num_jobs} jobs on {} threads",
        pool.current_num_threads()
    );

    let (sender, receiver) = mpsc::channel();
    pool.in_place_scope(|s| {
        let (failed, num_computed) = (&failed, &num_computed);
        s.spawn(move |_| {
            cubes.into_par_iter().for_each_with(sender, |sender, cube| {
                if failed.load(Ordering::Relaxed) {
                    return;
                }
                let index = cube.index;
                let job = Job::new(cube, profile, frequencies);
                let result = engine
                    .run(&job, &config.settings)
                    .map_err(|source| ProfileError::Engine { index, source });
                if result.is_err() {
                    failed.store(true, Ordering::Relaxed);
                }
                num_computed.fetch_add(1, Ordering::Relaxed);
                // the receiver outlives the scope
                let _ = sender.send((job.cube, result));
            });
        });

        // The work happens in the pool, back here results are collected and
        // progress is reported
        let mut last_report = Instant::now();
        for (cube, result) in receiver.iter() {
            let applied = result.and_then(|output| aggregator.apply_result(&cube, output));
            if let Err(e) = applied {
                warn!("sub-cube {} failed: {e}", cube.index);
                failed.store(true, Ordering::Relaxed);
                first_error.get_or_insert(e);
                continue;
            }

            let (completed, expected) = (aggregator.completed(), aggregator.expected());
            if completed == expected || last_report.elapsed() >= options.progress_interval {
                let progress = completed as f32 / expected as f32 * 100.;
                info!("Completed {completed}/{expected} sub-cubes ({progress:0.2}%)");
                last_report = Instant::now();
            }
        }
    });

    if let Some(e) = first_error {
        warn!(
            "run failed after computing {}/{num_jobs} sub-cubes",
            num_computed.load(Ordering::Relaxed)
        );
        return Err(e);
    }
    let mut results = aggregator.into_results()?;
    results.settings = config.settings.clone();
    Ok(results)
}
