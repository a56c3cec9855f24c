// Copyright 2016 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! `buildcore`: the execution core of a distributed build tool.
//!
//! This crate owns three things, and deliberately nothing else:
//!
//! - the [`graph`] module -- a typed node graph (files, aliases, dependency
//!   listings, generated artifacts, global settings) with strong/weak
//!   dependencies and staleness stamps;
//! - the [`worker`] module -- the job queue and thread pool that drive a
//!   graph's nodes to completion, including two-pass and distributable
//!   builds and memory-pressure throttling;
//! - [`dependency_list`] -- a graph-walking build action (transitive
//!   closure, alias resolution, wildcard filter) that doubles as the
//!   reference example of what a node's build action looks like.
//!
//! Concrete compiler/linker invocations, the build-script front-end that
//! constructs the graph in the first place, and the wire protocol to actual
//! remote workers are all out of scope; see [`graph::generated::BuildAction`]
//! and [`worker::remote::RemoteDispatcher`] for the seams this crate exposes
//! to them instead.

pub mod config;
pub mod dependency_list;
pub mod error;
pub mod graph;
pub mod job;
pub mod system;
pub mod worker;

pub use config::BuildOptions;
pub use error::GraphError;
pub use graph::{Dependency, NodeGraph, NodeIndex};
pub use job::Job;
pub use worker::pool::{BuildReport, WorkerPool};
pub use worker::remote::RemoteDispatcher;

/// Initializes `env_logger` from the environment and the process-wide temp
/// root, in that order. Call once from the surrounding tool's `main` before
/// constructing a [`WorkerPool`]; harmless (but redundant) to call more than
/// once within a single process, including across tests.
pub fn init(remote_worker: bool) -> std::io::Result<()> {
    let _ = env_logger::try_init();
    system::init_tmp_root(remote_worker).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    /// End-to-end smoke test exercising the whole public surface: build a
    /// small graph (two files, an alias, a `DependencyList`), drive it
    /// through a `WorkerPool`, and check the collected listing on disk.
    #[test]
    fn builds_a_small_graph_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let a_path = dir.path().join("a.cpp");
        let b_path = dir.path().join("b.h");
        std::fs::write(&a_path, b"// a").unwrap();
        std::fs::write(&b_path, b"// b").unwrap();

        let mut graph = NodeGraph::new();
        let a = graph.create_file_node(a_path.to_string_lossy().into_owned()).unwrap();
        let b = graph.create_file_node(b_path.to_string_lossy().into_owned()).unwrap();
        let alias = graph.create_alias_node("all".into(), vec![Dependency::strong(a), Dependency::strong(b)]).unwrap();

        let list_path = dir.path().join("deps.txt");
        let deps = graph
            .create_dependency_list_node(
                list_path.to_string_lossy().into_owned(),
                "all".into(),
                vec!["*.cpp".into()],
                vec![],
            )
            .unwrap();

        let graph = Arc::new(graph);
        let pool = WorkerPool::new(Arc::clone(&graph), &[alias, deps], BuildOptions::default(), None);
        let report = pool.run_to_completion();

        assert!(report.succeeded);
        assert_eq!(report.nodes_remaining, 0);

        let contents = std::fs::read_to_string(&list_path).unwrap();
        assert_eq!(contents, format!("{}\r\n", a_path.to_string_lossy()));
    }
}
