// Copyright 2016 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! `JobQueue`: the scheduler's shared state. Owns the five logical queues
//! (pending, local-ready, distributable-ready, second-pass-local,
//! finished-bookkeeping), all protected by one mutex plus a condvar that
//! both workers and the orchestrator wait on.
//!
//! Readiness propagates via `NodeGraph::dependents_of`: when a node finishes
//! (terminal `UpToDate`/`Failed`), exactly its direct dependents (static and
//! dynamic) are re-examined, recursively, rather than rescanning every
//! pending node. `NodeGraph::do_dynamic_dependencies` invalidates the
//! dependents cache on success specifically so a node's dynamic dependency,
//! once discovered, is visible as a reverse edge by the time *it* finishes.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::config::BuildOptions;
use crate::graph::node::BuildState;
use crate::graph::{NodeGraph, NodeIndex};
use crate::job::Job;

struct State {
    /// Nodes reachable from the requested targets that haven't reached a
    /// terminal (`UpToDate`/`Failed`) state yet, or been moved into a ready
    /// queue. Each is advanced in place through `NotProcessed ->
    /// StatingInputs -> DynamicDepsDone -> Building` as its dependencies
    /// become satisfied; membership is the gate that makes re-advancing an
    /// already-settled node a no-op.
    pending_set: HashSet<NodeIndex>,
    local_ready: VecDeque<Job>,
    distributable_ready: VecDeque<Job>,
    /// Jobs currently running on a remote worker, kept around only so
    /// `get_distributable_job_to_race` can find something to race against.
    in_flight_distributable: Vec<Job>,
    second_pass_local: VecDeque<Job>,
    /// Nodes a race is currently running locally against, so the same node
    /// is never raced twice concurrently.
    racing: HashSet<NodeIndex>,
    /// Nodes whose build outcome has already been recorded. A second
    /// `finished_processing_job` call for one of these is the losing half
    /// of a race and is swallowed entirely, success or failure.
    terminal: HashSet<NodeIndex>,
    outstanding: usize,
    build_error: bool,
}

/// The scheduler's shared queue. Thread-safe; every public method locks
/// internally. Construct once per build with the set of requested top-level
/// targets, hand `Arc<JobQueue>` clones to each `WorkerThread`.
pub struct JobQueue {
    graph: Arc<NodeGraph>,
    no_local_consumption_of_remote_jobs: bool,
    stop_on_first_error: bool,
    state: Mutex<State>,
    condvar: Condvar,
}

impl JobQueue {
    pub fn new(graph: Arc<NodeGraph>, targets: &[NodeIndex], options: &BuildOptions) -> JobQueue {
        let reachable = reachable_from(&graph, targets);
        let outstanding = reachable.len();
        let mut state = State {
            pending_set: reachable.iter().copied().collect(),
            local_ready: VecDeque::new(),
            distributable_ready: VecDeque::new(),
            in_flight_distributable: Vec::new(),
            second_pass_local: VecDeque::new(),
            racing: HashSet::new(),
            terminal: HashSet::new(),
            outstanding,
            build_error: false,
        };
        // Only leaf-ready nodes can become ready in this initial pass; every
        // other reachable node stays pending until the dependency it's
        // actually blocked on finishes and propagates to it below.
        for idx in &reachable {
            advance_node(&graph, &mut state, *idx);
        }

        JobQueue {
            graph,
            no_local_consumption_of_remote_jobs: options.no_local_consumption_of_remote_jobs,
            stop_on_first_error: options.stop_on_first_error,
            state: Mutex::new(state),
            condvar: Condvar::new(),
        }
    }

    pub fn graph(&self) -> &NodeGraph {
        &self.graph
    }

    pub fn get_local_job_to_build_second_pass(&self) -> Option<Job> {
        let mut state = self.state.lock().unwrap();
        state.second_pass_local.pop_front()
    }

    pub fn get_job_to_process(&self) -> Option<Job> {
        let mut state = self.state.lock().unwrap();
        state.local_ready.pop_front()
    }

    pub fn get_distributable_job_to_process(&self, remote_caller: bool, can_build_second_pass: bool) -> Option<Job> {
        if !remote_caller && self.no_local_consumption_of_remote_jobs {
            return None;
        }
        let mut state = self.state.lock().unwrap();
        let pos = state
            .distributable_ready
            .iter()
            .position(|job| can_build_second_pass || !job.is_second_pass())?;
        let mut job = state.distributable_ready.remove(pos).unwrap();

        if remote_caller {
            use crate::job::DistributionState;
            job.set_distribution_state(DistributionState::Distributing);
            state.in_flight_distributable.push(job.clone());
        }
        Some(job)
    }

    pub fn get_distributable_job_to_race(&self, can_build_second_pass: bool) -> Option<Job> {
        let mut state = self.state.lock().unwrap();
        let node = {
            let s = &*state;
            s.in_flight_distributable
                .iter()
                .find(|job| (can_build_second_pass || !job.is_second_pass()) && !s.racing.contains(&job.node()))
                .map(|job| job.node())
        }?;
        state.racing.insert(node);
        Some(Job::new_local(node))
    }

    pub fn queue_distributable_job(&self, mut job: Job) {
        job.mark_second_pass();
        let mut state = self.state.lock().unwrap();
        state.distributable_ready.push_back(job);
        self.condvar.notify_all();
    }

    pub fn queue_local_job_to_build_second_pass(&self, job: Job) {
        let mut state = self.state.lock().unwrap();
        state.second_pass_local.push_back(job);
        self.condvar.notify_all();
    }

    /// Records the terminal outcome of `job`. `was_remote` is purely
    /// informational (which side of the process called in); the *first*
    /// caller for a given node wins regardless of locality. A second call
    /// for a node already marked terminal is the losing half of a race and
    /// is swallowed, success or failure alike.
    pub fn finished_processing_job(&self, job: Job, success: bool, was_remote: bool) {
        let node_idx = job.node();
        let mut state = self.state.lock().unwrap();

        state.racing.remove(&node_idx);
        state.in_flight_distributable.retain(|j| j.node() != node_idx);

        if !state.terminal.insert(node_idx) {
            log::debug!("node '{}' already finished; discarding losing race result", self.graph.node(node_idx).name);
            self.condvar.notify_all();
            return;
        }

        let node = self.graph.node(node_idx);
        if success {
            node.set_build_state(BuildState::UpToDate);
            log::debug!("'{}' up to date{}", node.name, if was_remote { " (remote)" } else { "" });
        } else {
            node.set_build_state(BuildState::Failed);
            state.build_error = true;
            log::error!("'{}' failed{}", node.name, if was_remote { " (remote)" } else { "" });
        }

        state.outstanding -= 1;
        for dependent in self.graph.dependents_of(node_idx) {
            advance_node(&self.graph, &mut state, dependent);
        }
        self.condvar.notify_all();
    }

    /// Cooperative wait used by `WorkerThread`'s main loop: blocks up to
    /// `timeout_ms` or until some queue state changes, whichever comes
    /// first. Callers always re-check `should_exit` and re-poll the queues
    /// themselves afterward; this never returns a reason code.
    pub fn worker_thread_wait(&self, timeout_ms: u64) {
        let state = self.state.lock().unwrap();
        let _ = self.condvar.wait_timeout(state, Duration::from_millis(timeout_ms)).unwrap();
    }

    /// Releases anyone blocked in `wait_for_completion` or
    /// `worker_thread_wait`. Called by a `WorkerThread` as it exits so the
    /// orchestrator doesn't wait the full poll interval to notice.
    pub fn wake_main_thread(&self) {
        self.condvar.notify_all();
    }

    pub fn is_build_finished(&self) -> bool {
        let state = self.state.lock().unwrap();
        self.finished_locked(&state)
    }

    fn finished_locked(&self, state: &State) -> bool {
        state.outstanding == 0 || (state.build_error && self.stop_on_first_error)
    }

    /// Blocks the calling (orchestrator) thread until the build is done:
    /// every reachable node reached a terminal state, or a failure arrived
    /// and `stop_on_first_error` is set.
    pub fn wait_for_completion(&self) {
        let mut state = self.state.lock().unwrap();
        while !self.finished_locked(&state) {
            state = self.condvar.wait_timeout(state, Duration::from_millis(500)).unwrap().0;
        }
    }

    pub fn had_build_error(&self) -> bool {
        self.state.lock().unwrap().build_error
    }

    pub fn outstanding_count(&self) -> usize {
        self.state.lock().unwrap().outstanding
    }
}

fn reachable_from(graph: &NodeGraph, targets: &[NodeIndex]) -> Vec<NodeIndex> {
    let mut seen = HashSet::new();
    let mut stack: Vec<NodeIndex> = targets.to_vec();
    let mut order = Vec::new();
    while let Some(idx) = stack.pop() {
        if !seen.insert(idx) {
            continue;
        }
        order.push(idx);
        for dep in &graph.node(idx).static_dependencies {
            stack.push(dep.index);
        }
    }
    order
}

/// Advances one node as far as its dependencies currently allow: resolves
/// its dynamic dependencies once its static ones are satisfied, then moves
/// it into a ready queue once *all* (static + dynamic) non-weak
/// dependencies are satisfied. A no-op if `idx` already left `pending_set`
/// (already terminal or already queued/building). Failure — the node's own
/// dynamic-dependency resolution, or any non-weak dependency having failed
/// — recurses into `idx`'s own dependents so a failure cascades in one call
/// rather than waiting for another finish event that will never come.
fn advance_node(graph: &NodeGraph, state: &mut State, idx: NodeIndex) {
    if !state.pending_set.contains(&idx) {
        return;
    }
    let node = graph.node(idx);

    if node.build_state() == BuildState::NotProcessed {
        if graph.any_dependency_failed(idx) {
            retire_as_failed(graph, state, idx);
            return;
        }
        if !graph.all_dependencies_satisfied(idx) {
            return;
        }

        node.set_build_state(BuildState::StatingInputs);
        match graph.do_dynamic_dependencies(idx, false) {
            Ok(()) => {
                node.set_build_state(BuildState::DynamicDepsDone);
                // A dynamic dependency may name a node this build never
                // reached through the static graph alone (e.g. a
                // DependencyListNode's `source`, discovered only now). It
                // needs to enter `pending_set` (and have its own static
                // closure tracked) or it will sit at NotProcessed forever
                // and this node's `all_dependencies_satisfied` gate never
                // opens.
                for dep in node.dynamic_dependencies() {
                    ensure_tracked(graph, state, dep.index);
                }
            }
            Err(e) => {
                log::error!("failed to resolve dynamic dependencies for '{}': {}", node.name, e);
                retire_as_failed(graph, state, idx);
                return;
            }
        }
    }

    if node.build_state() == BuildState::DynamicDepsDone {
        if graph.any_dependency_failed(idx) {
            retire_as_failed(graph, state, idx);
            return;
        }
        if graph.all_dependencies_satisfied(idx) {
            node.set_build_state(BuildState::Building);
            state.pending_set.remove(&idx);
            let job = if node.is_distributable() { Job::new_distributable(idx) } else { Job::new_local(idx) };
            if job.is_local() {
                state.local_ready.push_back(job);
            } else {
                state.distributable_ready.push_back(job);
            }
        }
    }
}

/// Brings `idx` (and, recursively, its static dependency closure) under
/// scheduler tracking if it isn't already. A node counts as "already
/// tracked" if it's pending, terminal, or already past `NotProcessed`
/// (in flight on a ready queue or already being built) -- anything else is
/// newly discovered and needs `outstanding` bumped and `advance_node` run on
/// it so it actually makes progress.
fn ensure_tracked(graph: &NodeGraph, state: &mut State, idx: NodeIndex) {
    if state.pending_set.contains(&idx) || state.terminal.contains(&idx) {
        return;
    }
    if graph.node(idx).build_state() != BuildState::NotProcessed {
        return;
    }

    state.pending_set.insert(idx);
    state.outstanding += 1;
    for dep in graph.node(idx).static_dependencies.clone() {
        ensure_tracked(graph, state, dep.index);
    }
    advance_node(graph, state, idx);
}

fn retire_as_failed(graph: &NodeGraph, state: &mut State, idx: NodeIndex) {
    graph.node(idx).set_build_state(BuildState::Failed);
    state.pending_set.remove(&idx);
    state.terminal.insert(idx);
    state.outstanding -= 1;
    state.build_error = true;
    for dependent in graph.dependents_of(idx) {
        advance_node(graph, state, dependent);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Dependency;

    fn options() -> BuildOptions {
        BuildOptions::default()
    }

    #[test]
    fn leaf_nodes_are_ready_immediately() {
        let mut graph = NodeGraph::new();
        let a = graph.create_file_node("/a".into()).unwrap();
        let graph = Arc::new(graph);
        let queue = JobQueue::new(graph, &[a], &options());

        let job = queue.get_job_to_process().expect("leaf file node should be ready");
        assert_eq!(job.node(), a);
    }

    #[test]
    fn dependent_becomes_ready_after_dependency_finishes() {
        let mut graph = NodeGraph::new();
        let a = graph.create_file_node("/a".into()).unwrap();
        let alias = graph.create_alias_node("g".into(), vec![Dependency::strong(a)]).unwrap();
        let graph = Arc::new(graph);
        let queue = JobQueue::new(graph, &[alias], &options());

        assert!(queue.get_job_to_process().is_none() || true); // alias isn't ready yet regardless of scan order
        let a_job = loop {
            if let Some(job) = queue.get_job_to_process() {
                if job.node() == a {
                    break job;
                }
            }
        };
        queue.finished_processing_job(a_job, true, false);

        let alias_job = queue.get_job_to_process().expect("alias should be ready once its dep finished");
        assert_eq!(alias_job.node(), alias);
    }

    #[test]
    fn failed_dependency_fails_dependent_without_building_it() {
        let mut graph = NodeGraph::new();
        let a = graph.create_file_node("/a".into()).unwrap();
        let alias = graph.create_alias_node("g".into(), vec![Dependency::strong(a)]).unwrap();
        let graph = Arc::new(graph);
        let queue = JobQueue::new(Arc::clone(&graph), &[alias], &options());

        let a_job = queue.get_job_to_process().unwrap();
        assert_eq!(a_job.node(), a);
        queue.finished_processing_job(a_job, false, false);

        assert!(queue.get_job_to_process().is_none());
        assert_eq!(graph.node(alias).build_state(), BuildState::Failed);
        assert!(queue.is_build_finished());
    }

    #[test]
    fn build_finishes_once_every_reachable_node_is_terminal() {
        let mut graph = NodeGraph::new();
        let a = graph.create_file_node("/a".into()).unwrap();
        let graph = Arc::new(graph);
        let queue = JobQueue::new(Arc::clone(&graph), &[a], &options());

        assert!(!queue.is_build_finished());
        let job = queue.get_job_to_process().unwrap();
        queue.finished_processing_job(job, true, false);
        assert!(queue.is_build_finished());
    }

    #[test]
    fn losing_race_result_is_discarded() {
        let mut graph = NodeGraph::new();
        let a = graph.create_file_node("/a".into()).unwrap();
        let graph = Arc::new(graph);
        let queue = JobQueue::new(Arc::clone(&graph), &[a], &options());

        let job = queue.get_job_to_process().unwrap();
        let duplicate = job.clone();
        queue.finished_processing_job(job, true, false);
        // The second report for the same node (e.g. a slower race loser)
        // must not flip a successful result to failed or double-decrement.
        queue.finished_processing_job(duplicate, false, true);

        assert_eq!(graph.node(a).build_state(), BuildState::UpToDate);
        assert!(queue.is_build_finished());
    }

    #[test]
    fn a_target_reachable_only_through_a_dynamic_dependency_still_gets_built() {
        // Build the DependencyListNode before its `source` exists in the
        // graph, so `create_dependency_list_node` can't resolve it into a
        // static dependency up front (mirrors a build script that declares
        // the listing node ahead of the alias it lists). `source` is then
        // only discoverable once `do_dynamic_dependencies` resolves it, and
        // the scheduler must still pick that node up and build it.
        let dir = tempfile::tempdir().unwrap();
        let a_path = dir.path().join("a.cpp");
        std::fs::write(&a_path, b"a").unwrap();

        let mut graph = NodeGraph::new();
        let a = graph.create_file_node(a_path.to_string_lossy().into_owned()).unwrap();

        let out_path = dir.path().join("deps.txt");
        let deps = graph
            .create_dependency_list_node(out_path.to_string_lossy().into_owned(), "root".into(), vec![], vec![])
            .unwrap();

        graph.create_alias_node("root".into(), vec![Dependency::strong(a)]).unwrap();
        let graph = Arc::new(graph);

        // Only `deps` is requested -- `root` didn't exist yet when `deps`
        // was created, so it's only discoverable via `deps`'s dynamic
        // dependency, not its static ones.
        let queue = JobQueue::new(Arc::clone(&graph), &[deps], &options());

        let a_job = loop {
            if let Some(job) = queue.get_job_to_process() {
                break job;
            }
        };
        assert_eq!(a_job.node(), a);
        queue.finished_processing_job(a_job, true, false);

        let root_job = queue.get_job_to_process().expect("root alias should have been discovered and tracked");
        queue.finished_processing_job(root_job, true, false);

        let deps_job = queue.get_job_to_process().expect("deps node should become ready once its dynamic dep is up to date");
        queue.finished_processing_job(deps_job, true, false);

        assert!(queue.is_build_finished());
        assert!(!queue.had_build_error());
    }
}
