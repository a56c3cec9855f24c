// Copyright 2016 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! On-disk caching of the node graph between invocations. Each node is
//! serialized by name rather than by index, since node indices are only
//! stable within a single process's arena: loading re-resolves each dep name
//! against the freshly-constructed graph for the *current* invocation.
//! Every reflected field round-trips byte-for-byte, including kind-specific
//! ones (`SerializedKindData`) -- but a `BuildAction` itself can't be
//! serialized, and `NodeKind` is set once at construction and never mutated
//! afterwards, so `apply_serialized` only ever writes the stamp/timing bits
//! back onto a live `Node`; a freshly-built graph already supplies its own
//! kind data through the `create_*` call that built it.

use std::fs::File;
use std::io::{self, BufReader, BufWriter};

use serde_derive::{Deserialize, Serialize};

use super::node::{NodeFlags, NodeKind, NodeType};

/// Bumped whenever `SerializedNode`'s shape changes; a mismatch on load
/// means "treat as cache miss", not "error".
pub const FORMAT_VERSION: u32 = 2;

/// The reflected fields specific to one `NodeKind` variant. `File`/`Alias`
/// carry none beyond what `SerializedNode` already has.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SerializedKindData {
    None,
    DependencyList {
        source: String,
        patterns: Vec<String>,
        pre_build_dependency_names: Vec<String>,
    },
    Settings {
        environment: Vec<String>,
        cache_path: String,
        cache_plugin_dll: String,
        workers: Vec<String>,
        worker_connection_limit: u32,
    },
    Generated {
        output_path: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializedNode {
    pub name: String,
    pub node_type: NodeType,
    pub flags: NodeFlags,
    pub stamp: u64,
    pub static_dependency_names: Vec<String>,
    pub last_build_time_ms: u64,
    pub kind_data: SerializedKindData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializedGraph {
    pub format_version: u32,
    pub nodes: Vec<SerializedNode>,
}

impl SerializedGraph {
    pub fn new(nodes: Vec<SerializedNode>) -> SerializedGraph {
        SerializedGraph {
            format_version: FORMAT_VERSION,
            nodes,
        }
    }

    pub fn write_to(&self, path: &str) -> io::Result<()> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer(writer, self).map_err(io::Error::from)
    }

    /// Returns `Ok(None)` on a version mismatch rather than erroring -- per
    /// the format contract, a stale cache is just a miss, not a failure.
    pub fn read_from(path: &str) -> io::Result<Option<SerializedGraph>> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let graph: SerializedGraph = serde_json::from_reader(reader).map_err(io::Error::from)?;
        if graph.format_version != FORMAT_VERSION {
            return Ok(None);
        }
        Ok(Some(graph))
    }
}

use super::{Dependency, NodeGraph};

impl NodeGraph {
    pub fn to_serialized(&self) -> SerializedGraph {
        let nodes = self
            .iter()
            .map(|(_, node)| SerializedNode {
                name: node.name.clone(),
                node_type: node.node_type,
                flags: node.flags,
                stamp: node.stamp(),
                static_dependency_names: node
                    .static_dependencies
                    .iter()
                    .map(|dep| self.node(dep.index).name.clone())
                    .collect(),
                last_build_time_ms: node.last_build_time_ms(),
                kind_data: match &node.kind {
                    NodeKind::File | NodeKind::Alias => SerializedKindData::None,
                    NodeKind::DependencyList(data) => SerializedKindData::DependencyList {
                        source: data.source.clone(),
                        patterns: data.patterns.clone(),
                        pre_build_dependency_names: data.pre_build_dependency_names.clone(),
                    },
                    NodeKind::Settings(data) => SerializedKindData::Settings {
                        environment: data.environment.clone(),
                        cache_path: data.cache_path.clone(),
                        cache_plugin_dll: data.cache_plugin_dll.clone(),
                        workers: data.workers.clone(),
                        worker_connection_limit: data.worker_connection_limit,
                    },
                    NodeKind::Generated(data) => SerializedKindData::Generated {
                        output_path: data.output_path.clone(),
                    },
                },
            })
            .collect();
        SerializedGraph::new(nodes)
    }

    /// Applies cached stamps/timings onto freshly-constructed nodes whose
    /// name and dependency set still match. Nodes with no match, or whose
    /// dependency names changed, are left untouched (equivalent to "never
    /// built"). `kind_data` isn't written back here -- `NodeKind` is fixed
    /// at construction, and the fresh graph's own `create_*` call already
    /// supplied it; `kind_data` exists so the cache file itself is a
    /// faithful record of what was built.
    pub fn apply_serialized(&self, cache: &SerializedGraph) {
        for serialized in &cache.nodes {
            let index = match self.find_node(&serialized.name) {
                Some(i) => i,
                None => continue,
            };
            let node = self.node(index);
            if node.node_type != serialized.node_type {
                continue;
            }

            let current_dep_names: Vec<String> = node
                .static_dependencies
                .iter()
                .map(|dep: &Dependency| self.node(dep.index).name.clone())
                .collect();
            if current_dep_names != serialized.static_dependency_names {
                continue;
            }

            node.set_stamp(serialized.stamp);
            node.set_last_build_time_ms(serialized.last_build_time_ms);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Dependency;

    #[test]
    fn round_trips_stamp_and_dependency_names() {
        let mut graph = NodeGraph::new();
        let a = graph.create_file_node("/a".into()).unwrap();
        let lib = graph.create_alias_node("lib".into(), vec![Dependency::strong(a)]).unwrap();
        graph.node(a).set_stamp(42);
        graph.node(lib).set_stamp(99);

        let serialized = graph.to_serialized();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        serialized.write_to(path.to_str().unwrap()).unwrap();

        let loaded = SerializedGraph::read_from(path.to_str().unwrap()).unwrap().unwrap();
        assert_eq!(loaded.format_version, FORMAT_VERSION);

        let mut fresh = NodeGraph::new();
        let fa = fresh.create_file_node("/a".into()).unwrap();
        let flib = fresh.create_alias_node("lib".into(), vec![Dependency::strong(fa)]).unwrap();
        fresh.apply_serialized(&loaded);

        assert_eq!(fresh.node(fa).stamp(), 42);
        assert_eq!(fresh.node(flib).stamp(), 99);
    }

    #[test]
    fn round_trips_kind_specific_fields_for_every_node_type() {
        use crate::graph::generated::BuildAction;
        use crate::graph::node::NodeType;
        use std::sync::Arc;

        struct NoopAction;
        impl BuildAction for NoopAction {
            fn run(&self, _job: &crate::job::Job) -> crate::graph::node::BuildResult {
                crate::graph::node::BuildResult::Ok
            }
        }

        let mut graph = NodeGraph::new();
        graph.create_alias_node("root".into(), vec![]).unwrap();
        let deps = graph
            .create_dependency_list_node("/deps.txt".into(), "root".into(), vec!["*.cpp".into()], vec![])
            .unwrap();
        let settings = graph
            .create_settings_node(&["LIB=x".to_string()], "/cache".into(), "plugin.dll".into(), vec!["worker1".into()], 5)
            .unwrap();
        let generated = graph
            .create_generated_node("/out.o".into(), NodeType::Object, vec![], Arc::new(NoopAction), "/out.o".into())
            .unwrap();

        let serialized = graph.to_serialized();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        serialized.write_to(path.to_str().unwrap()).unwrap();
        let loaded = SerializedGraph::read_from(path.to_str().unwrap()).unwrap().unwrap();

        let find = |name: &str| loaded.nodes.iter().find(|n| n.name == name).unwrap().clone();

        assert_eq!(
            find(&graph.node(deps).name).kind_data,
            SerializedKindData::DependencyList {
                source: "root".into(),
                patterns: vec!["*.cpp".into()],
                pre_build_dependency_names: vec![],
            }
        );
        assert_eq!(
            find(&graph.node(settings).name).kind_data,
            SerializedKindData::Settings {
                environment: vec!["LIB=x".into()],
                cache_path: "/cache".into(),
                cache_plugin_dll: "plugin.dll".into(),
                workers: vec!["worker1".into()],
                worker_connection_limit: 5,
            }
        );
        assert_eq!(find(&graph.node(generated).name).kind_data, SerializedKindData::Generated { output_path: "/out.o".into() });
    }

    #[test]
    fn version_mismatch_is_treated_as_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let mut stale = SerializedGraph::new(Vec::new());
        stale.format_version = FORMAT_VERSION + 1;
        stale.write_to(path.to_str().unwrap()).unwrap();

        let loaded = SerializedGraph::read_from(path.to_str().unwrap()).unwrap();
        assert!(loaded.is_none());
    }
}
