// Copyright 2016 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! `DependencyListNode`: writes a sorted, filtered listing of a source
//! node's transitive file dependencies to `dest` (the node's own name).
//! The actual walk/filter/write lives in `dependency_list`; this module
//! just wires the node contract (dynamic deps, `do_build`) to it.
//!
//! Note: the original's `DependencyListNode::GetTypeS()` returns
//! `COPY_FILE_NODE`, inconsistent with the constructor, which sets
//! `DEPENDENCY_LIST_NODE`. Treated as a bug; this implementation always
//! reports `NodeType::DependencyList`.

use super::node::{BuildResult, NodeFlags};
use super::{Dependency, NodeGraph};
use crate::dependency_list::DependencyListBuilder;
use crate::error::GraphError;
use crate::job::Job;

pub const FLAGS: NodeFlags = NodeFlags::IS_FILE;

#[derive(Debug, Clone)]
pub struct DependencyListData {
    pub source: String,
    pub patterns: Vec<String>,
    pub pre_build_dependency_names: Vec<String>,
}

/// Re-resolves `source` against the graph and replaces the node's dynamic
/// dependencies with it. Called at most once per build pass; `force_clean`
/// is accepted for contract symmetry with other node kinds but, per the
/// original, is meaningless here since dynamic deps are always recomputed.
pub fn do_dynamic_dependencies(
    graph: &NodeGraph,
    index: super::NodeIndex,
    _force_clean: bool,
) -> Result<(), GraphError> {
    let node = graph.node(index);
    let data = match &node.kind {
        super::node::NodeKind::DependencyList(data) => data,
        _ => unreachable!("dependency_list_node::do_dynamic_dependencies on wrong kind"),
    };

    let source_index = graph.find_node(&data.source).ok_or_else(|| GraphError::NodeNotFound {
        name: data.source.clone(),
        context: "dependency list",
    })?;

    node.set_dynamic_dependencies(vec![Dependency::strong(source_index)]);
    Ok(())
}

pub fn do_build(graph: &NodeGraph, job: &Job) -> BuildResult {
    let node = graph.node(job.node());
    let data = match &node.kind {
        super::node::NodeKind::DependencyList(data) => data,
        _ => unreachable!("dependency_list_node::do_build on wrong kind"),
    };

    log::info!("DependencyList: '{}' -> '{}'", data.source, node.name);

    let builder = DependencyListBuilder::new(&data.patterns);
    if let Err(e) = builder.make_list_file(graph, node, &node.name) {
        let reason = format!("DependencyList failed. Error: {} Target: '{}'", e, node.name);
        log::error!("{}", reason);
        return BuildResult::Failed(reason);
    }

    node.set_stamp(super::file::last_write_time(&node.name));
    BuildResult::Ok
}
