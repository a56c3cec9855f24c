// Copyright 2016 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The seam between the scheduler and a real remote-distribution backend.
//! Worker discovery, the wire protocol, and cache plugin loading live
//! outside this crate; this module only defines the interface the core
//! consumes and a couple of fakes used by tests.

use std::sync::Arc;

use crate::job::Job;
use crate::worker::queue::JobQueue;

/// A collaborator that can run a distributable job somewhere other than
/// this process. `dispatch` must return promptly -- it hands the job off
/// (e.g. to a network send queue or another thread) and returns; the result
/// is reported back asynchronously via `queue.finished_processing_job` with
/// `was_remote = true`, from whatever thread the dispatcher uses to learn
/// the remote side is done.
pub trait RemoteDispatcher: Send + Sync {
    fn dispatch(&self, job: Job, queue: Arc<JobQueue>);
}

/// A `RemoteDispatcher` that always reports success instantly, useful for
/// exercising the distribution/racing code paths in tests without a real
/// network backend.
pub struct InProcessRemoteDispatcher;

impl RemoteDispatcher for InProcessRemoteDispatcher {
    fn dispatch(&self, job: Job, queue: Arc<JobQueue>) {
        let node = queue.graph().node(job.node());
        node.set_stamp(1);
        queue.finished_processing_job(job, true, true);
    }
}

/// A `RemoteDispatcher` that always fails, useful for exercising error
/// propagation through the distributable path.
pub struct AlwaysFailRemoteDispatcher;

impl RemoteDispatcher for AlwaysFailRemoteDispatcher {
    fn dispatch(&self, job: Job, queue: Arc<JobQueue>) {
        queue.finished_processing_job(job, false, true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BuildOptions;
    use crate::graph::node::BuildState;
    use crate::graph::{NodeGraph, NodeType};
    use crate::worker::queue::JobQueue;
    use std::sync::Arc;

    struct AcceptAnything;
    impl crate::graph::generated::BuildAction for AcceptAnything {
        fn run(&self, _job: &Job) -> crate::graph::node::BuildResult {
            crate::graph::node::BuildResult::Ok
        }
        fn is_distributable(&self) -> bool {
            true
        }
    }

    #[test]
    fn in_process_dispatcher_resolves_a_distributable_job() {
        let mut graph = NodeGraph::new();
        let n = graph
            .create_generated_node("/out.o".into(), NodeType::Object, vec![], Arc::new(AcceptAnything), "/out.o".into())
            .unwrap();
        let graph = Arc::new(graph);
        let queue = Arc::new(JobQueue::new(Arc::clone(&graph), &[n], &BuildOptions::default()));

        let job = queue.get_distributable_job_to_process(true, true).expect("distributable node should be ready");
        let dispatcher = InProcessRemoteDispatcher;
        dispatcher.dispatch(job, Arc::clone(&queue));

        assert_eq!(graph.node(n).build_state(), BuildState::UpToDate);
        assert!(queue.is_build_finished());
    }
}
