// Copyright 2016 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! `GeneratedNode`: the stand-in for `ObjectNode`/`LibraryNode`/
//! `ExecutableNode`/`CopyNode`. Concrete compiler/linker/archiver/copy
//! invocation lives outside this crate -- the core only needs a node with
//! real (non-trivial) build work, static + dynamic deps, and a stamp equal
//! to its output file's last-write-time on success. Callers supply the
//! actual behavior via `BuildAction`.

use std::sync::Arc;

use super::file::last_write_time;
use super::node::{BuildResult, NodeFlags};
use super::NodeGraph;
use crate::job::Job;

pub const FLAGS: NodeFlags = NodeFlags::IS_FILE;

/// The opaque compiler/linker/archiver/copy invocation a `GeneratedNode`
/// delegates to. Implementations live entirely outside this crate; the core
/// only needs the three bits below.
pub trait BuildAction: Send + Sync {
    /// Perform the actual work for this job (spawn a compiler, copy a file,
    /// ...). Returning `BuildResult::Ok` does not set the node's stamp --
    /// the caller re-stats the output path afterwards, matching `FileNode`'s
    /// own contract. An action whose `supports_second_build_pass` is `true`
    /// may return `NeedSecondBuildPass`/`NeedSecondLocalBuildPass` instead of
    /// finishing outright; `job.is_second_pass()` tells a re-invoked action
    /// which phase it's in, and `job.should_try_postpone_local_build_to_second_pass()`
    /// hints that it's worth splitting even though this call is running
    /// locally rather than through real distribution.
    fn run(&self, job: &Job) -> BuildResult;

    /// Whether this node's build can be split into a distributed first pass
    /// and a local second pass (e.g. preprocess locally, compile remotely).
    fn supports_second_build_pass(&self) -> bool {
        false
    }

    /// Whether this node is eligible to run on a remote worker at all.
    fn is_distributable(&self) -> bool {
        false
    }
}

pub struct GeneratedData {
    pub action: Arc<dyn BuildAction>,
    /// The path whose last-write-time becomes this node's stamp after a
    /// successful build. For most kinds this is simply the node's own name.
    pub output_path: String,
}

pub fn do_build(graph: &NodeGraph, job: &Job) -> BuildResult {
    let node = graph.node(job.node());
    let data = match &node.kind {
        super::node::NodeKind::Generated(data) => data,
        _ => unreachable!("generated::do_build called on a non-Generated node"),
    };

    match data.action.run(job) {
        BuildResult::Ok => {
            node.set_stamp(last_write_time(&data.output_path));
            BuildResult::Ok
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeGraph;

    struct AlwaysFail;
    impl BuildAction for AlwaysFail {
        fn run(&self, _job: &Job) -> BuildResult {
            BuildResult::Failed("tool invocation failed".into())
        }
    }

    struct WritesFile(std::path::PathBuf);
    impl BuildAction for WritesFile {
        fn run(&self, _job: &Job) -> BuildResult {
            match std::fs::write(&self.0, b"out") {
                Ok(()) => BuildResult::Ok,
                Err(e) => BuildResult::Failed(e.to_string()),
            }
        }
    }

    #[test]
    fn failing_action_fails_the_node() {
        let mut graph = NodeGraph::new();
        let n = graph
            .create_generated_node(
                "/out.o".into(),
                super::super::node::NodeType::Object,
                vec![],
                Arc::new(AlwaysFail),
                "/out.o".into(),
            )
            .unwrap();
        let job = Job::new_local(n);
        assert!(do_build(&graph, &job).is_failure());
    }

    #[test]
    fn successful_action_stamps_output() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.o");

        let mut graph = NodeGraph::new();
        let n = graph
            .create_generated_node(
                out.to_string_lossy().into_owned(),
                super::super::node::NodeType::Object,
                vec![],
                Arc::new(WritesFile(out.clone())),
                out.to_string_lossy().into_owned(),
            )
            .unwrap();
        let job = Job::new_local(n);
        assert!(!do_build(&graph, &job).is_failure());
        assert_ne!(graph.node(n).stamp(), 0);
    }
}
