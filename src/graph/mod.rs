// Copyright 2016 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The node graph: an arena of `Node`s addressed by `NodeIndex`, plus the
//! `create_*` constructors and the `do_dynamic_dependencies`/`do_build`
//! dispatch that routes to the per-kind modules.
//!
//! The graph's *structure* (which node depends on which) is fixed once
//! construction finishes; only `Node`'s own interior-mutex'd fields change
//! during a build. That split is what lets many worker threads hold `&Node`
//! references into the same `NodeGraph` concurrently without a whole-graph
//! lock.

pub mod alias;
pub mod dependency_list_node;
pub mod file;
pub mod generated;
pub mod node;
pub mod persist;
pub mod settings;

use std::collections::HashMap;
use std::hash::Hasher;
use std::sync::{Arc, Mutex};

use twox_hash::XxHash32;

use self::generated::{BuildAction, GeneratedData};
use self::node::{BuildResult, BuildState, Node, NodeFlags, NodeKind, NodeType};
use self::settings::SettingsData;
use crate::error::GraphError;
use crate::job::Job;

/// An index into `NodeGraph`'s arena. Cheap, `Copy`, stable for the lifetime
/// of the graph -- nodes are never removed once added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIndex(u32);

impl NodeIndex {
    fn new(raw: u32) -> NodeIndex {
        NodeIndex(raw)
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

/// An edge in the graph: `weak` edges establish build ordering only and are
/// ignored by stamp/failure propagation (`graph::alias::do_build`,
/// `dependency_list::DependencyListBuilder`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dependency {
    pub index: NodeIndex,
    pub weak: bool,
}

impl Dependency {
    pub fn strong(index: NodeIndex) -> Dependency {
        Dependency { index, weak: false }
    }

    pub fn weak(index: NodeIndex) -> Dependency {
        Dependency { index, weak: true }
    }
}

/// A trailing separator marks a folder path. `DependencyListNode`'s
/// `source`/`dest` fields must each name a single file, not a folder.
fn is_folder_path(path: &str) -> bool {
    path.ends_with('/') || path.ends_with('\\')
}

fn hash_name(name: &str) -> u32 {
    let mut hasher = XxHash32::with_seed(0);
    hasher.write(name.as_bytes());
    hasher.finish() as u32
}

pub const SETTINGS_NODE_NAME: &str = "$$Settings$$";

pub struct NodeGraph {
    nodes: Vec<Node>,
    by_name: HashMap<String, NodeIndex>,
    /// Lazily built the first time `dependents_of` is called; invalidated
    /// whenever a node is added or a node's dynamic dependencies change, so
    /// it always reflects the full static+dynamic reverse-edge set at the
    /// time of the query.
    dependents_cache: Mutex<Option<Vec<Vec<NodeIndex>>>>,
}

impl NodeGraph {
    pub fn new() -> NodeGraph {
        NodeGraph {
            nodes: Vec::new(),
            by_name: HashMap::new(),
            dependents_cache: Mutex::new(None),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn find_node(&self, name: &str) -> Option<NodeIndex> {
        let cleaned = self.clean_path(name);
        self.by_name.get(&cleaned).copied()
    }

    pub fn node(&self, index: NodeIndex) -> &Node {
        &self.nodes[index.0 as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeIndex, &Node)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeIndex::new(i as u32), n))
    }

    /// Platform-aware path normalization: backslashes become forward
    /// slashes, repeated separators collapse, a trailing separator is
    /// dropped (unless the whole path is just `/`), and on case-insensitive
    /// hosts the result is lowercased. This is the canonical form all
    /// `by_name` lookups key on.
    pub fn clean_path(&self, input: &str) -> String {
        let slashed = input.replace('\\', "/");

        let mut parts: Vec<&str> = Vec::new();
        for segment in slashed.split('/') {
            if segment.is_empty() && !parts.is_empty() {
                continue;
            }
            parts.push(segment);
        }
        let mut cleaned = parts.join("/");
        if cleaned.len() > 1 && cleaned.ends_with('/') {
            cleaned.pop();
        }

        if cfg!(windows) {
            cleaned.to_lowercase()
        } else {
            cleaned
        }
    }

    fn add_node(&mut self, name: String, node_type: NodeType, flags: NodeFlags, static_dependencies: Vec<Dependency>, kind: NodeKind) -> Result<NodeIndex, GraphError> {
        let cleaned = self.clean_path(&name);
        if self.by_name.contains_key(&cleaned) {
            return Err(GraphError::AlreadyDefined { name: cleaned });
        }

        let name_hash = hash_name(&cleaned);
        let index = NodeIndex::new(self.nodes.len() as u32);
        self.nodes.push(Node::new(cleaned.clone(), name_hash, node_type, flags, static_dependencies, kind));
        self.by_name.insert(cleaned, index);

        // Structure changed; invalidate the reverse-dependency cache.
        *self.dependents_cache.lock().unwrap() = None;

        Ok(index)
    }

    pub fn create_file_node(&mut self, name: String) -> Result<NodeIndex, GraphError> {
        self.add_node(name, NodeType::File, file::FLAGS, Vec::new(), NodeKind::File)
    }

    pub fn create_alias_node(&mut self, name: String, targets: Vec<Dependency>) -> Result<NodeIndex, GraphError> {
        self.add_node(name, NodeType::Alias, alias::FLAGS | NodeFlags::ALWAYS_BUILD, targets, NodeKind::Alias)
    }

    /// `source` and `name` (the destination/output path) are both required
    /// and must each name a single file rather than a folder, mirroring
    /// `FunctionDependencyList::Commit`'s `.Source`/`.Dest` checks in the
    /// original. `pre_build_dependency_names` must already exist in the
    /// graph (mirrors the original's `InitializePreBuildDependencies`, which
    /// errors on a name it can't resolve); `source` is looked up too and, if
    /// already present, recorded as a static dependency up front -- but it's
    /// fine for `source` not to exist yet at this point (graph construction
    /// order isn't guaranteed), since `do_dynamic_dependencies` re-resolves
    /// and re-adds it every pass regardless.
    pub fn create_dependency_list_node(
        &mut self,
        name: String,
        source: String,
        patterns: Vec<String>,
        pre_build_dependency_names: Vec<String>,
    ) -> Result<NodeIndex, GraphError> {
        if name.is_empty() {
            return Err(GraphError::MissingField { kind: "DependencyList", field: "dest" });
        }
        if source.is_empty() {
            return Err(GraphError::MissingField { kind: "DependencyList", field: "source" });
        }
        if is_folder_path(&name) {
            return Err(GraphError::PathNotAllowed { field: "dest", path: name });
        }
        if is_folder_path(&source) {
            return Err(GraphError::PathNotAllowed { field: "source", path: source });
        }

        let mut static_dependencies = Vec::with_capacity(pre_build_dependency_names.len() + 1);
        for pre in &pre_build_dependency_names {
            let idx = self.find_node(pre).ok_or_else(|| GraphError::NodeNotFound {
                name: pre.clone(),
                context: "pre-build dependency",
            })?;
            static_dependencies.push(Dependency::strong(idx));
        }
        if let Some(source_idx) = self.find_node(&source) {
            static_dependencies.push(Dependency::strong(source_idx));
        }

        let data = dependency_list_node::DependencyListData {
            source,
            patterns,
            pre_build_dependency_names,
        };
        self.add_node(name, NodeType::DependencyList, dependency_list_node::FLAGS, static_dependencies, NodeKind::DependencyList(data))
    }

    pub fn create_settings_node(
        &mut self,
        environment: &[String],
        cache_path: String,
        cache_plugin_dll: String,
        workers: Vec<String>,
        worker_connection_limit: u32,
    ) -> Result<NodeIndex, GraphError> {
        let data = SettingsData::new(environment, cache_path, cache_plugin_dll, workers, worker_connection_limit);
        self.add_node(SETTINGS_NODE_NAME.to_string(), NodeType::Settings, settings::FLAGS, Vec::new(), NodeKind::Settings(data))
    }

    pub fn create_generated_node(
        &mut self,
        name: String,
        node_type: NodeType,
        static_dependencies: Vec<Dependency>,
        action: Arc<dyn BuildAction>,
        output_path: String,
    ) -> Result<NodeIndex, GraphError> {
        let data = GeneratedData { action, output_path };
        self.add_node(name, node_type, generated::FLAGS, static_dependencies, NodeKind::Generated(data))
    }

    fn all_deps_of(&self, index: NodeIndex) -> Vec<Dependency> {
        let node = self.node(index);
        let mut deps = node.static_dependencies.clone();
        deps.extend(node.dynamic_dependencies());
        deps
    }

    fn build_dependents_cache(&self) -> Vec<Vec<NodeIndex>> {
        let mut reverse = vec![Vec::new(); self.nodes.len()];
        for (index, node) in self.iter() {
            for dep in &node.static_dependencies {
                reverse[dep.index.0 as usize].push(index);
            }
            for dep in node.dynamic_dependencies() {
                reverse[dep.index.0 as usize].push(index);
            }
        }
        reverse
    }

    /// The nodes that directly depend on `index`, static or dynamic, weak or
    /// not. Built once and cached; invalidated whenever a node is added.
    pub fn dependents_of(&self, index: NodeIndex) -> Vec<NodeIndex> {
        let mut guard = self.dependents_cache.lock().unwrap();
        if guard.is_none() {
            *guard = Some(self.build_dependents_cache());
        }
        guard.as_ref().unwrap()[index.0 as usize].clone()
    }

    /// Whether every non-weak dependency (static + dynamic) of `index` has
    /// finished building successfully. Weak dependencies only order a build;
    /// they never gate it, matching `graph::alias::do_build`'s own
    /// weak-skip.
    pub fn all_dependencies_satisfied(&self, index: NodeIndex) -> bool {
        self.all_deps_of(index)
            .iter()
            .filter(|dep| !dep.weak)
            .all(|dep| self.node(dep.index).build_state() == BuildState::UpToDate)
    }

    /// Whether any non-weak dependency of `index` has already failed, in
    /// which case `index` itself can be failed without ever attempting to
    /// build it.
    pub fn any_dependency_failed(&self, index: NodeIndex) -> bool {
        self.all_deps_of(index)
            .iter()
            .filter(|dep| !dep.weak)
            .any(|dep| self.node(dep.index).build_state() == BuildState::Failed)
    }

    /// Re-computes `index`'s dynamic dependencies and, on success,
    /// invalidates the `dependents_of` cache: a freshly-added dynamic edge
    /// needs to show up as a reverse dependency the next time it's queried,
    /// which is exactly what the scheduler relies on to wake a node that
    /// was waiting on a dependency it only discovered dynamically.
    pub fn do_dynamic_dependencies(&self, index: NodeIndex, force_clean: bool) -> Result<(), GraphError> {
        let is_dependency_list = matches!(self.node(index).kind, NodeKind::DependencyList(_));
        let result = if is_dependency_list {
            dependency_list_node::do_dynamic_dependencies(self, index, force_clean)
        } else {
            Ok(())
        };
        if result.is_ok() {
            *self.dependents_cache.lock().unwrap() = None;
        }
        result
    }

    pub fn do_build(&self, job: &Job) -> BuildResult {
        let kind = &self.node(job.node()).kind;
        match kind {
            NodeKind::File => file::do_build(self, job),
            NodeKind::Alias => alias::do_build(self, job),
            NodeKind::DependencyList(_) => dependency_list_node::do_build(self, job),
            NodeKind::Settings(_) => settings::do_build(self, job),
            NodeKind::Generated(_) => generated::do_build(self, job),
        }
    }
}

impl Default for NodeGraph {
    fn default() -> Self {
        NodeGraph::new()
    }
}
