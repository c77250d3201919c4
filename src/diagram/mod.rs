//! Diagram text validation
//!
//! Model output is handled in two steps. [`extract_dot`] pulls the DOT source
//! out of the reply, and [`validate`] parses it and checks it against
//! [`DiagramLimits`]. Only a [`DiagramSpec`] that passed both reaches the
//! renderer; a broken diagram is reported, never patched up.

use std::collections::BTreeSet;
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod layout;
pub mod parser;
mod render;

pub use layout::{Direction, LayoutOptions, Splines};
pub use render::{GraphvizRenderer, RenderFormat};

static FENCED_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:dot|graphviz)?[ \t]*\n?(.*?)\s*```").expect("static regex"));

/// Why a diagram was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiagramError {
    /// The text is not valid DOT
    #[error("malformed diagram at line {line}, column {column}: {message}")]
    Malformed {
        /// 1-based line of the offending token
        line: usize,
        /// 1-based column of the offending token
        column: usize,
        /// What the parser expected
        message: String,
    },
    /// No node statements at all
    #[error("diagram declares no nodes")]
    NoNodes,
    /// More declared nodes than allowed
    #[error("diagram declares {count} nodes, more than the limit of {max}")]
    TooManyNodes {
        /// Declared node count
        count: usize,
        /// Configured ceiling
        max: usize,
    },
    /// An edge endpoint has no node statement
    #[error("edge {edge} references undeclared node '{node}'")]
    UndeclaredNode {
        /// The missing node id
        node: String,
        /// The edge, written `from -> to`
        edge: String,
    },
}

/// Bounds a diagram must respect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiagramLimits {
    /// Maximum number of declared nodes
    pub max_nodes: usize,
}

impl Default for DiagramLimits {
    fn default() -> Self {
        Self { max_nodes: 150 }
    }
}

/// A diagram that passed validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagramSpec {
    /// Declared node ids
    pub nodes: BTreeSet<String>,
    /// Connected node pairs
    pub edges: BTreeSet<(String, String)>,
    /// DOT source as validated
    pub raw_text: String,
    /// `digraph` rather than `graph`
    pub directed: bool,
    /// Graph name, if given
    pub name: Option<String>,
}

impl DiagramSpec {
    /// Number of declared nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of distinct edges
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}

/// Pulls DOT source out of a model reply
///
/// The first ```` ```dot ````, ```` ```graphviz ```` or bare fenced block wins;
/// without a fence the whole reply is used.
pub fn extract_dot(output: &str) -> String {
    match FENCED_BLOCK.captures(output).and_then(|c| c.get(1)) {
        Some(block) => block.as_str().trim().to_string(),
        None => output.trim().to_string(),
    }
}

/// Parses and checks DOT text
pub fn validate(text: &str, limits: &DiagramLimits) -> Result<DiagramSpec, DiagramError> {
    let graph = parser::parse(text)?;

    let count = graph.declared.len();
    if count == 0 {
        return Err(DiagramError::NoNodes);
    }
    if count > limits.max_nodes {
        return Err(DiagramError::TooManyNodes {
            count,
            max: limits.max_nodes,
        });
    }

    let op = if graph.directed { "->" } else { "--" };
    for (from, to) in &graph.edges {
        for node in [from, to] {
            if !graph.declared.contains(node) {
                return Err(DiagramError::UndeclaredNode {
                    node: node.clone(),
                    edge: format!("{} {} {}", from, op, to),
                });
            }
        }
    }

    debug!("Diagram validated: {} nodes, {} edges", count, graph.edges.len());
    Ok(DiagramSpec {
        nodes: graph.declared,
        edges: graph.edges.into_iter().collect(),
        raw_text: text.to_string(),
        directed: graph.directed,
        name: graph.name,
    })
}
