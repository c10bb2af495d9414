use std::{
    slice,
    sync::{
        Arc, Barrier,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
};

use parking_lot::Mutex;

use crate::classifier::Classifier;

/// Long-lived matching workers.
///
/// Worker `i` permanently scans the population slots `i, i + n, i + 2n, ...` where `n`
/// is the number of workers plus one; the calling thread takes offset zero. A build
/// synchronizes exactly twice: every party waits at the start barrier before scanning
/// and at the end barrier after appending its matches.
#[derive(Debug)]
pub(super) struct WorkerPool {
    shared: Arc<Shared>,
    handles: Vec<JoinHandle<()>>,
    scratch: Vec<f64>,
    local: Vec<usize>,
}

#[derive(Debug)]
struct Shared {
    start: Barrier,
    end: Barrier,
    stride: usize,
    job: Mutex<Option<Job>>,
    matched: Mutex<Vec<usize>>,
    shutdown: AtomicBool,
}

/// Borrowed view of one build's inputs.
#[derive(Debug, Clone, Copy)]
struct Job {
    population: *const Classifier,
    population_len: usize,
    input: *const f64,
    input_len: usize,
}

// SAFETY: a `Job` is only dereferenced between the start and end barriers of a build,
// while `WorkerPool::scan` keeps the borrowed slices alive and unmodified. `Classifier`
// is `Sync`, so shared reads from several threads are sound.
unsafe impl Send for Job {}

impl WorkerPool {
    pub(super) fn new(workers: usize) -> Self {
        assert!(workers > 0, "a worker pool needs at least one worker");
        let shared = Arc::new(Shared {
            start: Barrier::new(workers + 1),
            end: Barrier::new(workers + 1),
            stride: workers + 1,
            job: Mutex::new(None),
            matched: Mutex::new(vec![]),
            shutdown: AtomicBool::new(false),
        });
        let handles = (1..=workers)
            .map(|offset| {
                let shared = Arc::clone(&shared);
                thread::Builder::new()
                    .name(format!("xcsf-match-{offset}"))
                    .spawn(move || worker_loop(&shared, offset))
                    .expect("failed to spawn matching worker")
            })
            .collect();
        log::debug!("started {workers} matching workers");
        Self {
            shared,
            handles,
            scratch: vec![],
            local: vec![],
        }
    }

    #[must_use]
    pub(super) fn workers(&self) -> usize {
        self.handles.len()
    }

    /// Appends the indices of all slots of `population` matching `input` to `matched`.
    ///
    /// The order of the appended indices depends on thread scheduling.
    pub(super) fn scan(&mut self, population: &[Classifier], input: &[f64], matched: &mut Vec<usize>) {
        assert!(!self.handles.is_empty(), "worker pool was shut down");
        *self.shared.job.lock() = Some(Job {
            population: population.as_ptr(),
            population_len: population.len(),
            input: input.as_ptr(),
            input_len: input.len(),
        });
        std::mem::swap(&mut *self.shared.matched.lock(), matched);

        self.shared.start.wait();
        scan_stride(
            population,
            input,
            0,
            self.shared.stride,
            &mut self.scratch,
            &mut self.local,
        );
        self.shared.matched.lock().extend_from_slice(&self.local);
        self.shared.end.wait();

        *self.shared.job.lock() = None;
        std::mem::swap(&mut *self.shared.matched.lock(), matched);
    }

    /// Stops and joins every worker. Calling it again is a no-op.
    pub(super) fn shutdown(&mut self) {
        if self.handles.is_empty() {
            return;
        }
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.start.wait();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                log::warn!("a matching worker panicked");
            }
        }
        log::debug!("matching workers stopped");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(shared: &Shared, offset: usize) {
    let mut scratch = vec![];
    let mut local = vec![];
    loop {
        shared.start.wait();
        if shared.shutdown.load(Ordering::Acquire) {
            return;
        }
        let job = *shared.job.lock();
        if let Some(job) = job {
            // SAFETY: the caller of `WorkerPool::scan` holds both slices borrowed until
            // after the end barrier below, so they are valid and not mutated here.
            let (population, input) = unsafe {
                (
                    slice::from_raw_parts(job.population, job.population_len),
                    slice::from_raw_parts(job.input, job.input_len),
                )
            };
            scan_stride(
                population,
                input,
                offset,
                shared.stride,
                &mut scratch,
                &mut local,
            );
            shared.matched.lock().extend_from_slice(&local);
        }
        shared.end.wait();
    }
}

fn scan_stride(
    population: &[Classifier],
    input: &[f64],
    offset: usize,
    stride: usize,
    scratch: &mut Vec<f64>,
    local: &mut Vec<usize>,
) {
    scratch.resize(input.len(), 0.0);
    local.clear();
    for index in (offset..population.len()).step_by(stride) {
        if population[index].region().matches_with(input, scratch) {
            local.push(index);
        }
    }
}
