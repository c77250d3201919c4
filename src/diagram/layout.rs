use std::fmt;
use std::str::FromStr;
use log::debug;
use serde::{Deserialize, Serialize};

use super::parser;
use crate::error::AtlasError;

/// Rank direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    /// Top to bottom
    #[default]
    TB,
    /// Left to right
    LR,
    /// Bottom to top
    BT,
    /// Right to left
    RL,
}

/// Edge routing style
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Splines {
    /// Straight segments with bends
    #[default]
    Polyline,
    /// Axis-aligned segments
    Ortho,
    /// Smooth curves
    Spline,
    /// Straight lines
    Line,
    /// Arcs
    Curved,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Direction::TB => "TB",
            Direction::LR => "LR",
            Direction::BT => "BT",
            Direction::RL => "RL",
        };
        f.write_str(s)
    }
}

impl FromStr for Direction {
    type Err = AtlasError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "TB" | "TD" => Ok(Direction::TB),
            "LR" => Ok(Direction::LR),
            "BT" => Ok(Direction::BT),
            "RL" => Ok(Direction::RL),
            other => Err(AtlasError::Validation(format!("Unknown direction '{}'", other))),
        }
    }
}

impl fmt::Display for Splines {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Splines::Polyline => "polyline",
            Splines::Ortho => "ortho",
            Splines::Spline => "spline",
            Splines::Line => "line",
            Splines::Curved => "curved",
        };
        f.write_str(s)
    }
}

impl FromStr for Splines {
    type Err = AtlasError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "polyline" => Ok(Splines::Polyline),
            "ortho" => Ok(Splines::Ortho),
            "spline" | "true" => Ok(Splines::Spline),
            "line" | "false" => Ok(Splines::Line),
            "curved" => Ok(Splines::Curved),
            other => Err(AtlasError::Validation(format!("Unknown spline style '{}'", other))),
        }
    }
}

/// Graph-level layout settings forced onto every rendered diagram
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutOptions {
    /// Rank direction
    pub direction: Direction,
    /// Edge routing
    pub splines: Splines,
    /// Minimum space between nodes in a rank, in inches
    pub nodesep: f32,
    /// Minimum space between ranks, in inches
    pub ranksep: f32,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            direction: Direction::TB,
            splines: Splines::Polyline,
            nodesep: 0.5,
            ranksep: 0.75,
        }
    }
}

impl LayoutOptions {
    fn settings(&self) -> String {
        format!(
            "\n    rankdir={};\n    splines={};\n    nodesep={};\n    ranksep={};\n    pad=0.5;\n    \
             node [shape=box, style=\"rounded,filled\", fontname=\"Helvetica\", fontsize=12, width=2.0, height=0.6, margin=\"0.2,0.1\"];\n    \
             edge [fontname=\"Helvetica\", fontsize=10, arrowsize=0.8];\n",
            self.direction, self.splines, self.nodesep, self.ranksep
        )
    }

    /// Replaces the diagram's own layout settings with these
    ///
    /// Orthogonal splines cannot place edge labels, so edge `label`s become `xlabel`s.
    /// Only statements and attributes are touched, never quoted text or comments.
    /// Text that does not parse is returned unchanged.
    pub fn apply(&self, dot: &str) -> String {
        let graph = match parser::parse(dot) {
            Ok(graph) => graph,
            Err(e) => {
                debug!("Layout not applied: {}", e);
                return dot.to_string();
            }
        };

        // Later edits first so earlier offsets stay valid; at equal offsets removals go first.
        let mut edits: Vec<(usize, usize, String)> = graph
            .layout_spans
            .iter()
            .map(|&(start, end)| (start, end, String::new()))
            .collect();
        if self.splines == Splines::Ortho {
            edits.extend(graph.edge_label_keys.iter().map(|&at| (at, at, "x".to_string())));
        }
        edits.push((graph.body_start, graph.body_start, self.settings()));
        edits.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)));

        let mut out = dot.to_string();
        for (start, end, text) in edits {
            out.replace_range(start..end, &text);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagram::parser::parse;

    #[test]
    fn test_apply_replaces_existing_settings() {
        let dot = "digraph \"a{b\" {\n  rankdir=LR;\n  graph [splines=ortho, nodesep=1.2];\n  A; B;\n  A -> B [label=\"calls\"];\n}";
        let options = LayoutOptions::default();
        let out = options.apply(dot);

        assert!(out.starts_with("digraph \"a{b\" {\n    rankdir=TB;"));
        assert_eq!(out.matches("rankdir").count(), 1);
        assert_eq!(out.matches("splines").count(), 1);
        assert!(out.contains("label=\"calls\""));
        assert!(parse(&out).is_ok());
    }

    #[test]
    fn test_ortho_moves_edge_labels() {
        let options = LayoutOptions {
            splines: Splines::Ortho,
            direction: Direction::LR,
            ..Default::default()
        };
        let out = options.apply("digraph {\n  A [label=\"a\"];\n  B;\n  A -> B [label=\"x\"];\n}");

        assert!(out.contains("A -> B [xlabel=\"x\"]"));
        assert!(out.contains("A [label=\"a\"]"));
        assert!(out.contains("splines=ortho;"));
        assert!(parse(&out).is_ok());
    }

    #[test]
    fn test_quoted_text_and_comments_are_untouched() {
        let options = LayoutOptions {
            splines: Splines::Ortho,
            ..Default::default()
        };
        let dot = "digraph {\n  A [label=\"rankdir=LR; a -> b label=x\"];\n  B;\n  \
                   // A -> B label=old\n  A -> B [xlabel=\"kept\", label=\"both\"];\n  B -> A [ label = \"back\" ];\n}";
        let out = options.apply(dot);

        assert!(out.contains("A [label=\"rankdir=LR; a -> b label=x\"]"));
        assert!(out.contains("// A -> B label=old"));
        assert!(out.contains("A -> B [xlabel=\"kept\", label=\"both\"]"));
        assert!(out.contains("B -> A [ xlabel = \"back\" ]"));
        assert_eq!(out.matches("rankdir=").count(), 2);
        assert!(parse(&out).is_ok());
    }

    #[test]
    fn test_unparseable_text_is_returned_as_is() {
        let dot = "digraph { a -> ";
        assert_eq!(LayoutOptions::default().apply(dot), dot);
    }

    #[test]
    fn test_parse_options() {
        assert_eq!("lr".parse::<Direction>().unwrap(), Direction::LR);
        assert_eq!("Ortho".parse::<Splines>().unwrap(), Splines::Ortho);
        assert!("sideways".parse::<Direction>().is_err());
    }
}
