// Copyright 2016 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! `WorkerPool`: owns the `JobQueue`, the local `WorkerThread`s, and (if
//! configured) a remote-dispatch pump thread. This is the orchestrator's
//! entry point -- `run_to_completion` drives one build from a set of
//! requested targets to either every reachable node reaching `UpToDate`, or
//! the first failure if `stop_on_first_error` is set.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::config::BuildOptions;
use crate::graph::{NodeGraph, NodeIndex};
use crate::system::Timer;
use crate::worker::queue::JobQueue;
use crate::worker::remote::RemoteDispatcher;
use crate::worker::thread::WorkerThread;
use crate::worker::MemoryStressTracker;

/// Outcome of a single `run_to_completion` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildReport {
    pub succeeded: bool,
    pub nodes_remaining: usize,
}

pub struct WorkerPool {
    queue: Arc<JobQueue>,
    workers: Vec<Arc<WorkerThread>>,
    global_stop: Arc<AtomicBool>,
    remote_stop: Arc<AtomicBool>,
    remote_pump: Option<thread::JoinHandle<()>>,
}

impl WorkerPool {
    /// Builds the job queue for `targets`, spawns `options.
    /// worker_thread_count()` local workers plus (if `remote` is supplied) a
    /// dispatch pump thread, and returns a handle. Workers start polling
    /// immediately; call `run_to_completion` to block until the build ends.
    pub fn new(graph: Arc<NodeGraph>, targets: &[NodeIndex], options: BuildOptions, remote: Option<Arc<dyn RemoteDispatcher>>) -> WorkerPool {
        let queue = Arc::new(JobQueue::new(Arc::clone(&graph), targets, &options));
        let stress = Arc::new(MemoryStressTracker::new());
        let timer = Arc::new(Timer::new());
        let global_stop = Arc::new(AtomicBool::new(false));

        let worker_count = options.worker_thread_count();
        let workers: Vec<Arc<WorkerThread>> = (0..worker_count)
            .map(|i| {
                WorkerThread::spawn(
                    i as u16,
                    Arc::clone(&queue),
                    options.clone(),
                    Arc::clone(&stress),
                    Arc::clone(&timer),
                    Arc::clone(&global_stop),
                    true,
                )
            })
            .collect();

        let remote_stop = Arc::new(AtomicBool::new(false));
        let remote_pump = remote.map(|dispatcher| spawn_remote_pump(Arc::clone(&queue), dispatcher, Arc::clone(&global_stop), Arc::clone(&remote_stop)));

        WorkerPool {
            queue,
            workers,
            global_stop,
            remote_stop,
            remote_pump,
        }
    }

    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    /// Blocks until the build reaches a terminal state, then requests every
    /// worker to stop and waits for each to report `exited`.
    pub fn run_to_completion(mut self) -> BuildReport {
        self.queue.wait_for_completion();
        self.stop();
        BuildReport {
            succeeded: !self.queue.had_build_error(),
            nodes_remaining: self.queue.outstanding_count(),
        }
    }

    /// Signals every worker (and the remote pump) to exit and waits for
    /// each `WorkerThread` to report `has_exited()`. Safe to call more than
    /// once; idempotent after the first call.
    pub fn stop(&mut self) {
        self.global_stop.store(true, Ordering::Relaxed);
        self.remote_stop.store(true, Ordering::Relaxed);
        for worker in &self.workers {
            worker.request_exit();
        }
        self.queue.wake_main_thread();

        for worker in &self.workers {
            while !worker.has_exited() {
                thread::sleep(Duration::from_millis(10));
            }
        }
        if let Some(handle) = self.remote_pump.take() {
            let _ = handle.join();
        }
    }
}

/// A separate thread that repeatedly asks the queue for distributable work
/// on behalf of the remote side (`remote_caller = true`) and hands it to
/// `dispatcher.dispatch`. Decoupled from `WorkerThread` because remote
/// hand-off has nothing to do with local dispatch order: worker discovery
/// and wire protocols live entirely behind `RemoteDispatcher`.
fn spawn_remote_pump(queue: Arc<JobQueue>, dispatcher: Arc<dyn RemoteDispatcher>, global_stop: Arc<AtomicBool>, remote_stop: Arc<AtomicBool>) -> thread::JoinHandle<()> {
    thread::Builder::new()
        .name("buildcore-remote-pump".into())
        .spawn(move || loop {
            if remote_stop.load(Ordering::Relaxed) || global_stop.load(Ordering::Relaxed) {
                break;
            }
            match queue.get_distributable_job_to_process(true, true) {
                Some(job) => dispatcher.dispatch(job, Arc::clone(&queue)),
                None => queue.worker_thread_wait(500),
            }
        })
        .expect("failed to spawn remote dispatch pump")
}
