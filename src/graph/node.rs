// Copyright 2016 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The node contract: common fields every node carries, plus the per-kind
//! payload that distinguishes an `AliasNode` from a `SettingsNode` and so
//! on. See `graph::alias`, `graph::file`, `graph::generated`,
//! `graph::settings` and `graph::dependency_list_node` for the per-kind
//! behavior.

use std::sync::Mutex;

use serde_derive::{Deserialize, Serialize};

use super::generated::GeneratedData;
use super::settings::SettingsData;
use super::dependency_list_node::DependencyListData;
use super::Dependency;

/// The closed set of node kinds. Kept distinct from `NodeKind` (the payload
/// enum) because it's also what gets persisted and logged; `Copy`,
/// `Object`, `Library` and `Executable` all share the same `Generated`
/// payload shape (an injected `BuildAction`) but keep distinct tags here,
/// matching the original's reflection type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    File,
    Object,
    Library,
    Executable,
    Alias,
    DependencyList,
    Copy,
    Settings,
}

/// Bitset of the three flags the original reflects on every node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeFlags(u8);

impl NodeFlags {
    pub const NONE: NodeFlags = NodeFlags(0);
    pub const TRIVIAL_BUILD: NodeFlags = NodeFlags(1 << 0);
    pub const ALWAYS_BUILD: NodeFlags = NodeFlags(1 << 1);
    pub const IS_FILE: NodeFlags = NodeFlags(1 << 2);

    pub fn contains(self, other: NodeFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for NodeFlags {
    type Output = NodeFlags;
    fn bitor(self, rhs: NodeFlags) -> NodeFlags {
        NodeFlags(self.0 | rhs.0)
    }
}

/// `NotProcessed -> Building -> { UpToDate | Failed }`, with the two
/// optional substates slotted in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildState {
    NotProcessed,
    StatingInputs,
    DynamicDepsDone,
    Building,
    UpToDate,
    Failed,
}

/// What a `do_build` call produced.
#[derive(Debug, Clone)]
pub enum BuildResult {
    Ok,
    /// Carries a human-readable reason, logged by the caller.
    Failed(String),
    /// Only distributable jobs have a second pass; it's always distributable.
    NeedSecondBuildPass,
    /// The job must be finished by the same local worker, not distributed.
    NeedSecondLocalBuildPass,
}

impl BuildResult {
    pub fn is_failure(&self) -> bool {
        matches!(self, BuildResult::Failed(_))
    }
}

/// The per-kind immutable payload. Each variant is populated once, during
/// `initialize`/construction, and never mutated afterwards -- this is what
/// lets `NodeGraph` hand out `&Node` to many readers at once without a lock.
pub enum NodeKind {
    File,
    Alias,
    DependencyList(DependencyListData),
    Settings(SettingsData),
    Generated(GeneratedData),
}

/// Fields that change over the course of a build. Guarded by a per-node
/// mutex rather than the whole-graph lock, allowing concurrent *reads* of
/// another node's stamp (e.g. from `AliasNode::do_build`) while that node's
/// owning worker is between builds; the owning worker is the only writer
/// for the duration it holds `Building`.
#[derive(Debug, Clone)]
pub struct MutableState {
    pub state: BuildState,
    pub stamp: u64,
    pub dynamic_dependencies: Vec<Dependency>,
    pub last_build_time_ms: u64,
}

impl Default for MutableState {
    fn default() -> Self {
        MutableState {
            state: BuildState::NotProcessed,
            stamp: 0,
            dynamic_dependencies: Vec::new(),
            last_build_time_ms: 0,
        }
    }
}

pub struct Node {
    pub name: String,
    pub name_hash: u32,
    pub node_type: NodeType,
    pub flags: NodeFlags,
    pub static_dependencies: Vec<Dependency>,
    pub kind: NodeKind,
    mutable: Mutex<MutableState>,
}

impl Node {
    pub fn new(
        name: String,
        name_hash: u32,
        node_type: NodeType,
        flags: NodeFlags,
        static_dependencies: Vec<Dependency>,
        kind: NodeKind,
    ) -> Node {
        Node {
            name,
            name_hash,
            node_type,
            flags,
            static_dependencies,
            kind,
            mutable: Mutex::new(MutableState::default()),
        }
    }

    pub fn is_a_file(&self) -> bool {
        self.flags.contains(NodeFlags::IS_FILE)
    }

    pub fn always_build(&self) -> bool {
        self.flags.contains(NodeFlags::ALWAYS_BUILD)
    }

    pub fn supports_second_build_pass(&self) -> bool {
        match &self.kind {
            NodeKind::Generated(data) => data.action.supports_second_build_pass(),
            _ => false,
        }
    }

    /// Whether this node's job belongs on the distributable queue rather
    /// than the local-only one. Only a `Generated` node's injected
    /// `BuildAction` can opt in; every other kind always builds locally.
    pub fn is_distributable(&self) -> bool {
        match &self.kind {
            NodeKind::Generated(data) => data.action.is_distributable(),
            _ => false,
        }
    }

    pub fn stamp(&self) -> u64 {
        self.mutable.lock().unwrap().stamp
    }

    pub fn set_stamp(&self, stamp: u64) {
        self.mutable.lock().unwrap().stamp = stamp;
    }

    pub fn build_state(&self) -> BuildState {
        self.mutable.lock().unwrap().state
    }

    pub fn set_build_state(&self, state: BuildState) {
        self.mutable.lock().unwrap().state = state;
    }

    pub fn dynamic_dependencies(&self) -> Vec<Dependency> {
        self.mutable.lock().unwrap().dynamic_dependencies.clone()
    }

    pub fn set_dynamic_dependencies(&self, deps: Vec<Dependency>) {
        self.mutable.lock().unwrap().dynamic_dependencies = deps;
    }

    pub fn last_build_time_ms(&self) -> u64 {
        self.mutable.lock().unwrap().last_build_time_ms
    }

    pub fn set_last_build_time_ms(&self, ms: u64) {
        self.mutable.lock().unwrap().last_build_time_ms = ms;
    }

    /// A snapshot of the mutable state, for serialization.
    pub fn snapshot(&self) -> MutableState {
        self.mutable.lock().unwrap().clone()
    }
}
