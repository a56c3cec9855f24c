// Copyright 2016 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! `WorkerThread`: one OS thread's worth of dispatch loop. Detached at
//! creation; the pool tracks liveness through `should_exit`/`exited` rather
//! than joining.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::config::BuildOptions;
use crate::graph::node::BuildResult;
use crate::job::Job;
use crate::system::{init_tmp_root, thread_tmp_dir, Timer};
use crate::worker::queue::JobQueue;
use crate::worker::MemoryStressTracker;

const WAIT_TIMEOUT_MS: u64 = 500;

pub struct WorkerThread {
    index: u16,
    should_exit: AtomicBool,
    exited: AtomicBool,
}

impl WorkerThread {
    pub fn index(&self) -> u16 {
        self.index
    }

    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::Relaxed)
    }

    pub fn request_exit(&self) {
        self.should_exit.store(true, Ordering::Relaxed);
    }

    /// Spawns the worker's detached OS thread and returns the handle used to
    /// query/signal it. `global_stop` is shared across every worker in the
    /// pool (`FBuild::StopBuild` in the original). A `WorkerThread` only
    /// ever touches local and locally-consumable distributable jobs; actual
    /// remote hand-off is a separate pump the pool drives through
    /// `worker::remote::RemoteDispatcher` (see `worker::pool`).
    pub fn spawn(
        index: u16,
        queue: Arc<JobQueue>,
        options: BuildOptions,
        stress: Arc<MemoryStressTracker>,
        timer: Arc<Timer>,
        global_stop: Arc<AtomicBool>,
        can_build_second_pass: bool,
    ) -> Arc<WorkerThread> {
        let worker = Arc::new(WorkerThread {
            index,
            should_exit: AtomicBool::new(false),
            exited: AtomicBool::new(false),
        });

        let thread_worker = Arc::clone(&worker);
        thread::Builder::new()
            .name(format!("buildcore-worker-{}", index))
            .spawn(move || {
                if let Err(e) = thread_tmp_dir(index) {
                    log::warn!("worker {} failed to create its temp dir: {}", index, e);
                }

                loop {
                    if thread_worker.should_exit.load(Ordering::Relaxed) || global_stop.load(Ordering::Relaxed) {
                        break;
                    }

                    queue.worker_thread_wait(WAIT_TIMEOUT_MS);

                    if thread_worker.should_exit.load(Ordering::Relaxed) || global_stop.load(Ordering::Relaxed) {
                        break;
                    }

                    if stress.poll(options.min_percent_memory_available, &timer) {
                        thread::sleep(Duration::from_secs(u64::from(options.wait_duration_when_memory_stressed)));
                        continue;
                    }

                    update(&queue, &options, can_build_second_pass);

                }

                thread_worker.exited.store(true, Ordering::Relaxed);
                queue.wake_main_thread();
            })
            .expect("failed to spawn worker thread");

        worker
    }
}

/// One dispatch iteration, in priority order: a local second-pass job
/// first, then any local-ready job, then (if enabled) a distributable job
/// consumed locally, then (if enabled) a distributable job raced locally
/// against its in-flight remote copy. Returns whether any work was found.
fn update(queue: &JobQueue, options: &BuildOptions, can_build_second_pass: bool) -> bool {
    if let Some(job) = queue.get_local_job_to_build_second_pass() {
        process(queue, job, false);
        return true;
    }

    if let Some(mut job) = queue.get_job_to_process() {
        // A worker that can't finish a second pass itself (e.g. a remote
        // one) asks the action to stop after the first pass rather than
        // build the whole thing in one go, so the (possibly distributable)
        // remainder doesn't get stuck behind it.
        job.set_try_postpone_local_build_to_second_pass(!can_build_second_pass);
        process(queue, job, false);
        return true;
    }

    // `JobQueue::get_distributable_job_to_process` itself enforces
    // `no_local_consumption_of_remote_jobs` for a local (non-remote) caller.
    if let Some(job) = queue.get_distributable_job_to_process(false, can_build_second_pass) {
        process(queue, job, false);
        return true;
    }

    if options.allow_local_race {
        if let Some(job) = queue.get_distributable_job_to_race(can_build_second_pass) {
            process(queue, job, false);
            return true;
        }
    }

    false
}

/// Runs a job's `do_build` and routes the result: `Ok`/`Failed` are
/// terminal and reported through `finished_processing_job`; the two
/// second-pass results are re-queued instead.
fn process(queue: &JobQueue, mut job: Job, _is_race: bool) {
    let node = queue.graph().node(job.node());
    let start = Instant::now();
    let result = queue.graph().do_build(&job);
    node.set_last_build_time_ms(start.elapsed().as_millis() as u64);

    match result {
        BuildResult::Ok => queue.finished_processing_job(job, true, false),
        BuildResult::Failed(reason) => {
            if job.failure_should_be_reported() {
                log::error!("{}", reason);
            }
            queue.finished_processing_job(job, false, false);
        }
        BuildResult::NeedSecondBuildPass | BuildResult::NeedSecondLocalBuildPass if !node.supports_second_build_pass() => {
            log::error!("'{}' returned a second-build-pass result but its action doesn't support one", node.name);
            queue.finished_processing_job(job, false, false);
        }
        BuildResult::NeedSecondBuildPass => queue.queue_distributable_job(job),
        BuildResult::NeedSecondLocalBuildPass => {
            job.mark_second_pass();
            queue.queue_local_job_to_build_second_pass(job);
        }
    }
}

/// Ensures the process-wide temp root exists before any worker computes its
/// own subdirectory. Safe to call more than once; only the first call wins.
pub fn ensure_tmp_root(remote: bool) -> std::io::Result<()> {
    init_tmp_root(remote).map(|_| ())
}
