//! Bounded worker pool for sync batches.
//!
//! Jobs are queued on a crossbeam channel and drained by a fixed number of
//! named worker threads. Workers check the batch's cancel token before
//! taking each job, so cancellation stops new work without interrupting a
//! job in progress.

use std::thread;

use crossbeam_channel::{Receiver, Sender, bounded, unbounded};

use super::CancelToken;

fn worker_loop<T, R>(
    id: usize,
    jobs: &Receiver<(usize, T)>,
    results: &Sender<(usize, R)>,
    cancel: &CancelToken,
    work: &(impl Fn(T) -> R + Sync),
) {
    log::debug!("Sync worker {} started", id);

    loop {
        if cancel.is_cancelled() {
            log::debug!("Sync worker {} observed cancellation", id);
            break;
        }
        let Ok((index, job)) = jobs.recv() else {
            break;
        };
        if results.send((index, work(job))).is_err() {
            break;
        }
    }

    log::debug!("Sync worker {} finished", id);
}

/// Run `work` over `items` on at most `workers` threads.
///
/// Returns one slot per item, in input order. A slot is `None` only if the
/// job never started because `cancel` fired first.
pub fn run_bounded<T, R, F>(
    items: Vec<T>,
    workers: usize,
    cancel: &CancelToken,
    work: F,
) -> Vec<Option<R>>
where
    T: Send,
    R: Send,
    F: Fn(T) -> R + Sync,
{
    let total = items.len();
    let mut slots: Vec<Option<R>> = (0..total).map(|_| None).collect();
    if total == 0 {
        return slots;
    }

    // Sized to hold every job, so queueing never blocks.
    let (job_tx, job_rx) = bounded(total);
    for job in items.into_iter().enumerate() {
        let _ = job_tx.send(job);
    }
    drop(job_tx);

    let (result_tx, result_rx) = unbounded();
    let worker_count = workers.clamp(1, total);

    thread::scope(|scope| {
        let mut spawned = 0;
        for id in 0..worker_count {
            let jobs = job_rx.clone();
            let results = result_tx.clone();
            let work = &work;
            let spawn = thread::Builder::new()
                .name(format!("repomirror-sync-{}", id))
                .spawn_scoped(scope, move || worker_loop(id, &jobs, &results, cancel, work));
            match spawn {
                Ok(_) => spawned += 1,
                Err(e) => log::warn!("Failed to spawn sync worker {}: {}", id, e),
            }
        }

        if spawned == 0 {
            log::warn!("No sync workers could be spawned, running batch inline");
            worker_loop(0, &job_rx, &result_tx, cancel, &work);
        }
    });
    drop(result_tx);

    for (index, result) in result_rx.try_iter() {
        slots[index] = Some(result);
    }
    slots
}
