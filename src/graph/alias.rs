// Copyright 2016 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! `AliasNode`: a zero-cost group whose targets are its static dependencies.
//! Building one is almost free (`FLAG_TRIVIAL_BUILD | FLAG_ALWAYS_BUILD`);
//! the real work is in `do_build`, which fails if any non-weak target is
//! missing and otherwise stamps itself with a hash of its children.

use std::hash::Hasher;

use twox_hash::XxHash64;

use super::node::{BuildResult, NodeFlags};
use super::NodeGraph;
use crate::job::Job;

pub const FLAGS: NodeFlags = NodeFlags::TRIVIAL_BUILD;
// NodeFlags doesn't implement const bitor, so ALWAYS_BUILD is ORed in by
// the caller (`NodeGraph::create_alias_node`) rather than folded in here.

pub fn do_build(graph: &NodeGraph, job: &Job) -> BuildResult {
    let node = graph.node(job.node());

    let mut stamps: Vec<u64> = Vec::with_capacity(node.static_dependencies.len());
    for dep in &node.static_dependencies {
        if dep.weak {
            continue;
        }
        let child = graph.node(dep.index);
        let stamp = child.stamp();
        if stamp == 0 {
            let reason = if child.is_a_file() {
                format!(
                    "Alias: {}\nFailed due to missing file: {}",
                    node.name, child.name
                )
            } else {
                format!(
                    "Alias: {}\nFailed due to missing dependency: {}",
                    node.name, child.name
                )
            };
            return BuildResult::Failed(reason);
        }
        stamps.push(stamp);
    }

    let stamp = if stamps.is_empty() {
        1 // non-zero
    } else {
        let mut hasher = XxHash64::with_seed(0);
        for s in &stamps {
            hasher.write_u64(*s);
        }
        hasher.finish()
    };

    node.set_stamp(stamp);
    BuildResult::Ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Dependency, NodeGraph};

    #[test]
    fn alias_of_present_files_hashes_stamps() {
        let mut graph = NodeGraph::new();
        let a = graph.create_file_node("/a".into()).unwrap();
        let b = graph.create_file_node("/b".into()).unwrap();
        let c = graph.create_file_node("/c".into()).unwrap();
        graph.node(a).set_stamp(10);
        graph.node(b).set_stamp(20);
        graph.node(c).set_stamp(30);

        let alias = graph
            .create_alias_node(
                "all".into(),
                vec![Dependency::strong(a), Dependency::strong(b), Dependency::strong(c)],
            )
            .unwrap();

        let job = Job::new_local(alias);
        let result = do_build(&graph, &job);
        assert!(!result.is_failure());

        let mut hasher = XxHash64::with_seed(0);
        hasher.write_u64(10);
        hasher.write_u64(20);
        hasher.write_u64(30);
        assert_eq!(graph.node(alias).stamp(), hasher.finish());
    }

    #[test]
    fn alias_of_empty_targets_stamps_one() {
        let mut graph = NodeGraph::new();
        let alias = graph.create_alias_node("empty".into(), vec![]).unwrap();
        let job = Job::new_local(alias);
        assert!(!do_build(&graph, &job).is_failure());
        assert_eq!(graph.node(alias).stamp(), 1);
    }

    #[test]
    fn alias_fails_on_missing_file() {
        let mut graph = NodeGraph::new();
        let a = graph.create_file_node("/present".into()).unwrap();
        let b = graph.create_file_node("/missing".into()).unwrap();
        graph.node(a).set_stamp(1);
        // b stays at stamp 0

        let alias = graph
            .create_alias_node("g".into(), vec![Dependency::strong(a), Dependency::strong(b)])
            .unwrap();
        let job = Job::new_local(alias);
        let result = do_build(&graph, &job);
        match result {
            BuildResult::Failed(msg) => assert!(msg.contains("missing file: /missing")),
            other => panic!("expected failure, got {:?}", other),
        }
    }
}
