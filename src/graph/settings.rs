// Copyright 2016 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! `SettingsNode`: global build configuration (environment, cache, worker
//! list). It is not a file (`is_a_file() == false`) and is never built in
//! the scheduler sense -- its job is done entirely in `initialize`, which
//! packs `Environment` into the double-NUL-terminated buffer the linker
//! expects on Windows-like hosts and pulls out `LIB=` for hand-off.

use super::node::{BuildResult, NodeFlags};
use super::NodeGraph;
use crate::job::Job;

pub const FLAGS: NodeFlags = NodeFlags::NONE;

#[derive(Debug, Clone, Default)]
pub struct SettingsData {
    /// The raw `Environment` strings as reflected, kept around (in addition
    /// to the derived buffer below) so persistence can recover it verbatim.
    pub environment: Vec<String>,
    pub cache_path: String,
    pub cache_plugin_dll: String,
    pub workers: Vec<String>,
    pub worker_connection_limit: u32,
    /// The packed `KEY=VALUE\0...\0` buffer built from `Environment`.
    pub environment_block: Vec<u8>,
    /// The `LIB` entry, pulled out of `Environment` for linker hand-off.
    pub lib_env_var: Option<String>,
}

impl SettingsData {
    pub fn new(environment: &[String], cache_path: String, cache_plugin_dll: String, workers: Vec<String>, worker_connection_limit: u32) -> SettingsData {
        let (environment_block, lib_env_var) = process_environment(environment);
        SettingsData {
            environment: environment.to_vec(),
            cache_path,
            cache_plugin_dll,
            workers,
            worker_connection_limit,
            environment_block,
            lib_env_var,
        }
    }
}

/// Packs `envStrings` into a single buffer of `KEY=VALUE\0` entries followed
/// by a final extra `\0`, and pulls out the `LIB=` entry (if any) along the
/// way. Mirrors `SettingsNode::ProcessEnvironment`.
fn process_environment(env_strings: &[String]) -> (Vec<u8>, Option<String>) {
    let mut lib_env_var = None;
    let mut buffer = Vec::new();

    for entry in env_strings {
        if let Some(value) = entry.strip_prefix("LIB=") {
            lib_env_var = Some(value.to_owned());
        }
        buffer.extend_from_slice(entry.as_bytes());
        buffer.push(0);
    }
    buffer.push(0); // final double-NUL

    (buffer, lib_env_var)
}

pub fn do_build(graph: &NodeGraph, job: &Job) -> BuildResult {
    // Trivial: a SettingsNode's work happens in `initialize`, not here.
    let node = graph.node(job.node());
    node.set_stamp(1);
    BuildResult::Ok
}
