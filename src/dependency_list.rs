// Copyright 2016 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The transitive dependency walker behind `DependencyListNode`: collects
//! the non-weak transitive closure of a root node's dependencies, resolving
//! aliases transparently, dedupes via a fixed bucket table keyed by name
//! hash, filters by wildcard pattern, and writes a sorted CRLF-terminated
//! text file.

use std::fs::File;
use std::io::{self, Write};

use crate::graph::node::{Node, NodeKind};
use crate::graph::{NodeGraph, NodeIndex};

const BUCKET_COUNT: usize = 256;
const BUCKET_MASK: u32 = (BUCKET_COUNT - 1) as u32;

pub struct DependencyListBuilder<'a> {
    visited: Vec<Vec<NodeIndex>>,
    patterns: &'a [String],
}

impl<'a> DependencyListBuilder<'a> {
    pub fn new(patterns: &'a [String]) -> DependencyListBuilder<'a> {
        DependencyListBuilder {
            visited: vec![Vec::new(); BUCKET_COUNT],
            patterns,
        }
    }

    /// Returns `true` the first time `index` is seen; subsequent calls for
    /// the same index return `false` without re-walking it.
    fn find_or_add(&mut self, index: NodeIndex, name_hash: u32) -> bool {
        let bucket = &mut self.visited[(name_hash & BUCKET_MASK) as usize];
        if bucket.contains(&index) {
            false
        } else {
            bucket.push(index);
            true
        }
    }

    fn collect_node(&mut self, graph: &NodeGraph, index: NodeIndex) {
        let node = graph.node(index);
        if !self.find_or_add(index, node.name_hash) {
            return;
        }

        // Aliases are transparent: their targets are just their static
        // dependencies, so the walk below already recurses into them.
        self.collect_deps(graph, &node.static_dependencies);
        let dynamic = node.dynamic_dependencies();
        self.collect_deps(graph, &dynamic);
    }

    fn collect_deps(&mut self, graph: &NodeGraph, deps: &[crate::graph::Dependency]) {
        for dep in deps {
            if !dep.weak {
                self.collect_node(graph, dep.index);
            }
        }
    }

    fn is_match(&self, name: &str) -> bool {
        if self.patterns.is_empty() {
            return true;
        }
        self.patterns.iter().any(|p| wildcard_match(p, name))
    }

    fn sorted_matching_names(&self, graph: &NodeGraph) -> Vec<String> {
        let mut names: Vec<String> = self
            .visited
            .iter()
            .flatten()
            .map(|&index| graph.node(index))
            .filter(|node| node.is_a_file() && self.is_match(&node.name))
            .map(|node| node.name.clone())
            .collect();
        names.sort();
        names
    }

    fn write_to(&self, graph: &NodeGraph, filename: &str) -> io::Result<()> {
        let names = self.sorted_matching_names(graph);

        let mut buffer = String::new();
        for name in &names {
            buffer.push_str(name);
            buffer.push_str("\r\n");
        }

        let mut file = File::create(filename)?;
        file.write_all(buffer.as_bytes())
    }

    /// Walks `root`'s static and dynamic dependencies (never `root` itself)
    /// and writes the resulting listing to `filename`.
    pub fn make_list_file(mut self, graph: &NodeGraph, root: &Node, filename: &str) -> io::Result<()> {
        self.collect_deps(graph, &root.static_dependencies);
        let dynamic = root.dynamic_dependencies();
        self.collect_deps(graph, &dynamic);
        self.write_to(graph, filename)
    }
}

/// Shell-style wildcard match of `pattern` against the whole of `text`.
/// `*` matches any sequence (including empty, including path separators);
/// `?` matches exactly one character. Classic two-pointer backtracking
/// match, equivalent to a textbook `fnmatch`.
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();

    let (mut pi, mut ti) = (0usize, 0usize);
    let mut star_idx: Option<usize> = None;
    let mut match_idx = 0usize;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star_idx = Some(pi);
            match_idx = ti;
            pi += 1;
        } else if let Some(si) = star_idx {
            pi = si + 1;
            match_idx += 1;
            ti = match_idx;
        } else {
            return false;
        }
    }

    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }

    pi == p.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Dependency, NodeGraph};

    #[test]
    fn wildcard_matches_basic_glob() {
        assert!(wildcard_match("*.cpp", "a.cpp"));
        assert!(!wildcard_match("*.cpp", "a.h"));
        assert!(wildcard_match("a?c", "abc"));
        assert!(!wildcard_match("a?c", "abbc"));
        assert!(wildcard_match("*", "anything/at/all.cpp"));
        assert!(wildcard_match("src/*/*.rs", "src/graph/node.rs"));
    }

    fn make_graph() -> (NodeGraph, NodeIndex) {
        let mut graph = NodeGraph::new();
        let a = graph.create_file_node("/a.cpp".into()).unwrap();
        let b = graph.create_file_node("/b.cpp".into()).unwrap();
        let c = graph.create_file_node("/c.cpp".into()).unwrap();
        let d = graph.create_file_node("/d.cpp".into()).unwrap();
        let libx = graph
            .create_alias_node("libx".into(), vec![Dependency::strong(c), Dependency::strong(d)])
            .unwrap();

        let root = graph
            .create_alias_node(
                "root".into(),
                vec![
                    Dependency::strong(a),
                    Dependency::strong(b),
                    Dependency::strong(libx),
                ],
            )
            .unwrap();
        (graph, root)
    }

    #[test]
    fn collects_filtered_sorted_dedup_listing() {
        let (graph, root) = make_graph();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("deps.txt");

        let patterns = vec!["*.cpp".to_string()];
        let builder = DependencyListBuilder::new(&patterns);
        let root_node = graph.node(root);
        builder.make_list_file(&graph, root_node, out.to_str().unwrap()).unwrap();

        let contents = std::fs::read_to_string(&out).unwrap();
        assert_eq!(contents, "/a.cpp\r\n/b.cpp\r\n/c.cpp\r\n/d.cpp\r\n");
    }

    #[test]
    fn non_matching_pattern_yields_empty_file() {
        let (graph, root) = make_graph();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("deps.txt");

        let patterns = vec!["*.h".to_string()];
        let builder = DependencyListBuilder::new(&patterns);
        let root_node = graph.node(root);
        builder.make_list_file(&graph, root_node, out.to_str().unwrap()).unwrap();

        let contents = std::fs::read_to_string(&out).unwrap();
        assert_eq!(contents, "");
    }

    #[test]
    fn empty_pattern_list_matches_everything() {
        let (graph, root) = make_graph();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("deps.txt");

        let patterns: Vec<String> = vec![];
        let builder = DependencyListBuilder::new(&patterns);
        let root_node = graph.node(root);
        builder.make_list_file(&graph, root_node, out.to_str().unwrap()).unwrap();

        let contents = std::fs::read_to_string(&out).unwrap();
        assert_eq!(contents, "/a.cpp\r\n/b.cpp\r\n/c.cpp\r\n/d.cpp\r\n");
    }

    #[test]
    fn rerunning_produces_identical_output() {
        let (graph, root) = make_graph();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("deps.txt");
        let patterns: Vec<String> = vec![];

        for _ in 0..2 {
            let builder = DependencyListBuilder::new(&patterns);
            let root_node = graph.node(root);
            builder.make_list_file(&graph, root_node, out.to_str().unwrap()).unwrap();
        }

        let contents = std::fs::read_to_string(&out).unwrap();
        assert_eq!(contents, "/a.cpp\r\n/b.cpp\r\n/c.cpp\r\n/d.cpp\r\n");
    }
}
