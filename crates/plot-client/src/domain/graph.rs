//! # Graph View Builder
//!
//! Turns a parsed relationship graph into the node/edge lists a UI draws.
//!
//! ## Filtering
//!
//! - A node is kept when `score >= threshold / 100`, or when its label is
//!   the guaranteed label (the focal or peeked key).
//! - An edge is kept only when both endpoints were kept.
//! - Edge visual weight is `weight / reference * 50` when a non-zero
//!   reference magnitude (the chain height) is known, else the raw weight.

use plot_types::PublicKey;
use std::collections::{HashMap, HashSet};

/// Node as produced by a [`crate::GraphParser`].
#[derive(Debug, Clone, PartialEq)]
pub struct RawNode {
    pub id: String,
    pub label: String,
    pub score: f64,
}

/// Edge as produced by a [`crate::GraphParser`].
#[derive(Debug, Clone, PartialEq)]
pub struct RawEdge {
    pub source: String,
    pub target: String,
    pub weight: f64,
}

/// Parser output: nodes in declaration order, then edges.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawGraph {
    pub nodes: Vec<RawNode>,
    pub edges: Vec<RawEdge>,
}

/// Inputs that shape a view.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GraphOptions {
    threshold: f64,
    include_label: Option<String>,
    reference: Option<u64>,
}

impl GraphOptions {
    /// Threshold in percent; clamped to `[0, 100]`.
    #[must_use]
    pub fn new(threshold: f64) -> Self {
        let threshold = if threshold.is_nan() {
            0.0
        } else {
            threshold.clamp(0.0, 100.0)
        };
        Self {
            threshold,
            ..Self::default()
        }
    }

    /// Always keep the node carrying this label.
    #[must_use]
    pub fn including(mut self, label: impl Into<String>) -> Self {
        self.include_label = Some(label.into());
        self
    }

    /// Scale edge weights against this magnitude.
    #[must_use]
    pub fn with_reference(mut self, reference: Option<u64>) -> Self {
        self.reference = reference;
        self
    }

    #[must_use]
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    #[must_use]
    pub fn include_label(&self) -> Option<&str> {
        self.include_label.as_deref()
    }

    fn keeps(&self, node: &RawNode) -> bool {
        self.include_label.as_deref() == Some(node.label.as_str())
            || node.score >= self.threshold / 100.0
    }

    fn visual_weight(&self, weight: f64) -> f64 {
        match self.reference {
            Some(reference) if reference > 0 => weight / reference as f64 * 50.0,
            _ => weight,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    pub score: f64,
}

impl GraphNode {
    /// Short label for drawing: see [`PublicKey::graph_label`].
    #[must_use]
    pub fn display_label(&self) -> String {
        PublicKey::from_wire(self.label.clone()).graph_label()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub weight: f64,
    pub visual_weight: f64,
}

/// Filtered nodes and edges.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GraphView {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl GraphView {
    /// Apply `options` to a parsed graph.
    #[must_use]
    pub fn build(raw: RawGraph, options: &GraphOptions) -> Self {
        let nodes: Vec<GraphNode> = raw
            .nodes
            .into_iter()
            .filter(|node| options.keeps(node))
            .map(|node| GraphNode {
                id: node.id,
                label: node.label,
                score: node.score,
            })
            .collect();

        let kept: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();

        let edges = raw
            .edges
            .into_iter()
            .filter(|edge| {
                kept.contains(edge.source.as_str()) && kept.contains(edge.target.as_str())
            })
            .map(|edge| GraphEdge {
                visual_weight: options.visual_weight(edge.weight),
                source: edge.source,
                target: edge.target,
                weight: edge.weight,
            })
            .collect();

        Self { nodes, edges }
    }

    #[must_use]
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

/// A [`GraphView`] with neighbour and incident-edge indices built once.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InteractiveGraphView {
    view: GraphView,
    positions: HashMap<String, usize>,
    neighbors: HashMap<String, Vec<String>>,
    incident: HashMap<String, Vec<usize>>,
    focal: Option<usize>,
}

impl InteractiveGraphView {
    /// Build the filtered view and its indices.
    #[must_use]
    pub fn build(raw: RawGraph, options: &GraphOptions) -> Self {
        Self::index(GraphView::build(raw, options), options.include_label())
    }

    /// Index an existing view; `focal_label` selects the focal node.
    #[must_use]
    pub fn index(view: GraphView, focal_label: Option<&str>) -> Self {
        let positions: HashMap<String, usize> = view
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.clone(), i))
            .collect();

        let mut neighbors: HashMap<String, Vec<String>> = HashMap::new();
        let mut incident: HashMap<String, Vec<usize>> = HashMap::new();

        for (i, edge) in view.edges.iter().enumerate() {
            incident.entry(edge.source.clone()).or_default().push(i);
            push_unique(neighbors.entry(edge.source.clone()).or_default(), &edge.target);

            if edge.target != edge.source {
                incident.entry(edge.target.clone()).or_default().push(i);
                push_unique(neighbors.entry(edge.target.clone()).or_default(), &edge.source);
            }
        }

        let focal = focal_label.and_then(|label| view.nodes.iter().position(|n| n.label == label));

        Self {
            view,
            positions,
            neighbors,
            incident,
            focal,
        }
    }

    #[must_use]
    pub fn view(&self) -> &GraphView {
        &self.view
    }

    #[must_use]
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.positions.get(id).map(|&i| &self.view.nodes[i])
    }

    /// Ids of nodes sharing an edge with `id`, in first-seen order.
    #[must_use]
    pub fn neighbors(&self, id: &str) -> &[String] {
        self.neighbors.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Edges touching `id`.
    pub fn incident_edges(&self, id: &str) -> impl Iterator<Item = &GraphEdge> + '_ {
        self.incident
            .get(id)
            .into_iter()
            .flatten()
            .map(move |&i| &self.view.edges[i])
    }

    /// Node whose label equals the guaranteed label, if present.
    #[must_use]
    pub fn focal_node(&self) -> Option<&GraphNode> {
        self.focal.map(|i| &self.view.nodes[i])
    }

    #[must_use]
    pub fn into_view(self) -> GraphView {
        self.view
    }
}

fn push_unique(list: &mut Vec<String>, id: &str) {
    if !list.iter().any(|existing| existing == id) {
        list.push(id.to_string());
    }
}
