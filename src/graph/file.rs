// Copyright 2016 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! `FileNode`: a plain on-disk input with no build action of its own.
//! Building one just re-stats the file; whether a missing file is an error
//! is up to whoever depends on it (see `graph::alias`).

use std::fs;
use std::time::SystemTime;

use super::node::{BuildResult, NodeFlags};
use super::NodeGraph;
use crate::job::Job;

pub const FLAGS: NodeFlags = NodeFlags::IS_FILE;

/// Last-write-time of `path` in seconds since `UNIX_EPOCH`, or `0` if the
/// file is missing or its metadata can't be read.
pub fn last_write_time(path: &str) -> u64 {
    let metadata = match fs::metadata(path) {
        Ok(m) => m,
        Err(_) => return 0,
    };
    let modified = match metadata.modified() {
        Ok(m) => m,
        Err(_) => return 0,
    };
    match modified.duration_since(SystemTime::UNIX_EPOCH) {
        Ok(d) => d.as_secs().max(1), // non-zero sentinel reserved for "missing"
        Err(_) => 0,
    }
}

pub fn do_build(graph: &NodeGraph, job: &Job) -> BuildResult {
    let node = graph.node(job.node());
    node.set_stamp(last_write_time(&node.name));
    BuildResult::Ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeGraph;

    #[test]
    fn missing_file_stamps_zero() {
        let mut graph = NodeGraph::new();
        let f = graph.create_file_node("/does/not/exist/buildcore-test".into()).unwrap();
        let job = Job::new_local(f);
        assert!(!do_build(&graph, &job).is_failure());
        assert_eq!(graph.node(f).stamp(), 0);
    }

    #[test]
    fn present_file_stamps_nonzero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("present");
        std::fs::write(&path, b"hi").unwrap();

        let mut graph = NodeGraph::new();
        let f = graph.create_file_node(path.to_string_lossy().into_owned()).unwrap();
        let job = Job::new_local(f);
        assert!(!do_build(&graph, &job).is_failure());
        assert_ne!(graph.node(f).stamp(), 0);
    }
}
