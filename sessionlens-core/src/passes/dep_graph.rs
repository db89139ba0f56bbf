//! Dependency graph pass
//!
//! Derives a co-occurrence graph over referenced files. The event sequence is
//! split into windows at each tool invocation; files referenced inside the
//! same window are assumed related and connected pairwise. Windows with a
//! single file contribute a node but no edges.
//!
//! The pass emits nothing when the log yields no edges; an edgeless graph
//! is not worth surfacing.

use crate::error::Result;
use crate::parse::ParsedLog;
use crate::types::{GraphEdge, GraphNode, LogEvent, PassKind, PassPayload};
use std::collections::HashSet;

use super::{ExtractionPass, PassOutput};

pub struct DependencyGraphPass;

impl DependencyGraphPass {
    /// Split the event sequence into co-occurrence windows.
    ///
    /// A window covers the file references between two consecutive tool
    /// invocations; references before the first invocation form their own
    /// window.
    fn windows(log: &ParsedLog) -> Vec<Vec<&str>> {
        let mut windows: Vec<Vec<&str>> = Vec::new();
        let mut current: Vec<&str> = Vec::new();

        for event in &log.events {
            match event {
                LogEvent::ToolInvocation { .. } => {
                    if !current.is_empty() {
                        windows.push(std::mem::take(&mut current));
                    }
                }
                LogEvent::FileReference { path } => current.push(path.as_str()),
            }
        }
        if !current.is_empty() {
            windows.push(current);
        }
        windows
    }

    /// Signal score from graph size: 0.5 base, +0.3 for a node count above
    /// 10, +0.2 for an edge count above 15, capped at 1.0.
    fn signal_score(node_count: usize, edge_count: usize) -> f64 {
        let mut score: f64 = 0.5;
        if node_count > 10 {
            score += 0.3;
        }
        if edge_count > 15 {
            score += 0.2;
        }
        score.min(1.0)
    }

    fn file_label(path: &str) -> String {
        path.rsplit('/').next().unwrap_or(path).to_string()
    }
}

impl ExtractionPass for DependencyGraphPass {
    fn kind(&self) -> PassKind {
        PassKind::DependencyGraph
    }

    fn run(&self, log: &ParsedLog) -> Result<Option<PassOutput>> {
        let mut edge_set: HashSet<(String, String)> = HashSet::new();
        let mut edges: Vec<GraphEdge> = Vec::new();
        let mut node_set: HashSet<String> = HashSet::new();
        let mut nodes: Vec<GraphNode> = Vec::new();

        for window in Self::windows(log) {
            for (i, from) in window.iter().enumerate() {
                for to in window.iter().skip(i + 1) {
                    if from == to {
                        continue;
                    }
                    let key = (from.to_string(), to.to_string());
                    if !edge_set.insert(key.clone()) {
                        continue;
                    }
                    for path in [*from, *to] {
                        if node_set.insert(path.to_string()) {
                            nodes.push(GraphNode {
                                id: path.to_string(),
                                label: Self::file_label(path),
                            });
                        }
                    }
                    edges.push(GraphEdge {
                        from: key.0,
                        to: key.1,
                    });
                }
            }
        }

        if edges.is_empty() {
            return Ok(None);
        }

        let signal_score = Self::signal_score(nodes.len(), edges.len());

        Ok(Some(PassOutput::new(
            PassPayload::DependencyGraph { nodes, edges },
            signal_score,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_log;

    #[test]
    fn no_edges_emits_nothing() {
        // one file per window: nodes but never an edge
        let raw = r#""/a/one.rs" <invoke name="Read"> "/b/two.rs" <invoke name="Edit"> "/c/three.rs""#;
        let out = DependencyGraphPass.run(&parse_log(raw)).unwrap();
        assert!(out.is_none());
    }

    #[test]
    fn empty_log_emits_nothing() {
        let out = DependencyGraphPass.run(&parse_log("")).unwrap();
        assert!(out.is_none());
    }

    #[test]
    fn co_occurring_files_form_edges() {
        // two files in the same window, then a new window with one file
        let raw = r#""/a/one.rs" "/b/two.rs" <invoke name="Edit"> "/c/three.rs""#;
        let out = DependencyGraphPass
            .run(&parse_log(raw))
            .unwrap()
            .expect("one edge exists");
        match out.payload {
            PassPayload::DependencyGraph { nodes, edges } => {
                assert_eq!(edges.len(), 1);
                assert_eq!(edges[0].from, "/a/one.rs");
                assert_eq!(edges[0].to, "/b/two.rs");
                // three.rs never co-occurs, so it is not a node
                assert_eq!(nodes.len(), 2);
                assert_eq!(nodes[0].label, "one.rs");
            }
            other => panic!("unexpected payload: {:?}", other),
        }
        assert!((out.signal_score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn duplicate_pairs_collapse() {
        let raw = r#""/a/x.rs" "/a/y.rs" <invoke name="Read"> "/a/x.rs" "/a/y.rs""#;
        // second window repeats the same pair; paths dedupe at parse time so
        // only the first window carries both files
        let out = DependencyGraphPass.run(&parse_log(raw)).unwrap().unwrap();
        match out.payload {
            PassPayload::DependencyGraph { edges, .. } => assert_eq!(edges.len(), 1),
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[test]
    fn score_grows_with_graph_size() {
        assert!((DependencyGraphPass::signal_score(2, 1) - 0.5).abs() < 1e-9);
        assert!((DependencyGraphPass::signal_score(11, 10) - 0.8).abs() < 1e-9);
        assert!((DependencyGraphPass::signal_score(11, 16) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn windows_split_on_invocations() {
        let raw = r#""/w0/a.rs" <invoke name="Read"> "/w1/b.rs" "/w1/c.rs" <invoke name="Edit">"#;
        let log = parse_log(raw);
        let windows = DependencyGraphPass::windows(&log);
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0], vec!["/w0/a.rs"]);
        assert_eq!(windows[1], vec!["/w1/b.rs", "/w1/c.rs"]);
    }
}
