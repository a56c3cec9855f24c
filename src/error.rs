// Copyright 2016 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Error types surfaced by graph construction and traversal.
//!
//! Build-time failures (a node's `do_build` returning `BuildResult::Failed`)
//! are deliberately *not* part of this enum: in the original tool they are a
//! logged, free-form reason string attached to the node, not a condition the
//! caller recovers from. See `graph::BuildResult`.

use failure::Fail;

/// Errors raised while constructing or querying the node graph, before or
/// between build passes.
#[derive(Debug, Fail)]
pub enum GraphError {
    /// A node with this (already-canonicalized) name exists in the graph.
    #[fail(display = "Already defined: '{}'", name)]
    AlreadyDefined { name: String },

    /// A field requires a file but a folder path was given, or vice versa.
    #[fail(display = "Path not allowed for '{}': '{}'", field, path)]
    PathNotAllowed { field: &'static str, path: String },

    /// A required field on a node config was left unset.
    #[fail(display = "Missing required field '{}' on {} node", field, kind)]
    MissingField { kind: &'static str, field: &'static str },

    /// A dynamic-dependency pass could not resolve a referenced node name.
    #[fail(display = "failed to find '{}' for {}", name, context)]
    NodeNotFound { name: String, context: &'static str },
}
