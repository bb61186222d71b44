//! Typed relation graphs between modules, models and views.
//!
//! A [`Graph`] is a weighted directed graph keyed by name. Nodes keep
//! insertion order; edges to unknown nodes are rejected so a graph never
//! grows phantom nodes.

pub mod cycles;
pub mod dot;
pub mod filter;
pub mod structure;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};

use crate::error::AnalyseError;
use crate::registry::Registry;

pub use cycles::{CycleBreaker, GreedyCycleBreaker};
pub use filter::{filter, FilteredEdge, FilteredGraph, GlobSet, ModulePredicate, Predicates};
pub use structure::{Structure, StructureNode};

/// A directed edge `(source, target)`.
pub type Edge = (String, String);

/// Relation a module graph is derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    /// Declared manifest dependencies
    Dependency,
    /// Python imports of another module's namespace
    Import,
    /// Markup references to another module's records
    Reference,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::Dependency => "dependency",
            EdgeKind::Import => "import",
            EdgeKind::Reference => "reference",
        }
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EdgeKind {
    type Err = AnalyseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dependency" | "depends" => Ok(EdgeKind::Dependency),
            "import" | "imports" => Ok(EdgeKind::Import),
            "reference" | "refers" => Ok(EdgeKind::Reference),
            other => Err(AnalyseError::Configuration(format!(
                "unknown edge kind: {}",
                other
            ))),
        }
    }
}

/// Weighted directed graph over named nodes.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    graph: DiGraph<String, usize>,
    node_map: HashMap<String, NodeIndex>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node (idempotent).
    pub fn add_node(&mut self, name: &str) -> NodeIndex {
        if let Some(&idx) = self.node_map.get(name) {
            return idx;
        }
        let idx = self.graph.add_node(name.to_string());
        self.node_map.insert(name.to_string(), idx);
        idx
    }

    /// Adds `weight` occurrences of `source -> target`. Returns false and
    /// leaves the graph untouched when an endpoint is unknown.
    pub fn add_edge(&mut self, source: &str, target: &str, weight: usize) -> bool {
        let (Some(&from), Some(&to)) = (self.node_map.get(source), self.node_map.get(target))
        else {
            return false;
        };
        match self.graph.find_edge(from, to) {
            Some(edge) => self.graph[edge] += weight,
            None => {
                self.graph.add_edge(from, to, weight);
            }
        }
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.node_map.contains_key(name)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Node names in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.graph.node_indices().map(|idx| self.graph[idx].as_str())
    }

    /// Every edge with its weight, sorted by endpoints.
    pub fn edges(&self) -> BTreeMap<Edge, usize> {
        self.graph
            .edge_references()
            .map(|edge| {
                (
                    (
                        self.graph[edge.source()].clone(),
                        self.graph[edge.target()].clone(),
                    ),
                    *edge.weight(),
                )
            })
            .collect()
    }

    pub fn weight(&self, source: &str, target: &str) -> Option<usize> {
        let from = *self.node_map.get(source)?;
        let to = *self.node_map.get(target)?;
        self.graph.find_edge(from, to).map(|edge| self.graph[edge])
    }

    /// Targets of `name`, sorted.
    pub fn successors(&self, name: &str) -> BTreeSet<&str> {
        self.neighbors(name, Direction::Outgoing)
    }

    /// Sources pointing at `name`, sorted.
    pub fn referenced_by(&self, name: &str) -> BTreeSet<&str> {
        self.neighbors(name, Direction::Incoming)
    }

    fn neighbors(&self, name: &str, direction: Direction) -> BTreeSet<&str> {
        match self.node_map.get(name) {
            Some(&idx) => self
                .graph
                .neighbors_directed(idx, direction)
                .map(|n| self.graph[n].as_str())
                .collect(),
            None => BTreeSet::new(),
        }
    }

    /// Copy of the graph without the given edges.
    pub fn without_edges(&self, removed: &BTreeSet<Edge>) -> Graph {
        let mut graph = Graph::new();
        for node in self.nodes() {
            graph.add_node(node);
        }
        for (edge, weight) in self.edges() {
            if !removed.contains(&edge) {
                graph.add_edge(&edge.0, &edge.1, weight);
            }
        }
        graph
    }

    pub fn is_acyclic(&self) -> bool {
        !is_cyclic_directed(&self.graph)
    }
}

/// Derives graphs from a registry.
pub struct GraphBuilder;

impl GraphBuilder {
    /// Module graph of one edge kind.
    pub fn build(registry: &Registry, kind: EdgeKind) -> Graph {
        Self::build_many(registry, &[kind])
    }

    /// Union of several edge kinds; weights of coinciding edges add up.
    pub fn build_many(registry: &Registry, kinds: &[EdgeKind]) -> Graph {
        let mut graph = Graph::new();
        for name in registry.names() {
            graph.add_node(name);
        }

        let kinds: BTreeSet<EdgeKind> = kinds.iter().copied().collect();
        for module in registry.iter() {
            let mut weights: BTreeMap<&str, usize> = BTreeMap::new();
            for kind in &kinds {
                match kind {
                    EdgeKind::Dependency => {
                        for dep in module.depends() {
                            *weights.entry(dep.as_str()).or_default() += 1;
                        }
                    }
                    EdgeKind::Import => {
                        for edge in &module.imports {
                            *weights.entry(edge.target.as_str()).or_default() += 1;
                        }
                    }
                    EdgeKind::Reference => {
                        for edge in &module.refers {
                            *weights.entry(edge.target.as_str()).or_default() += 1;
                        }
                    }
                }
            }

            for (target, weight) in weights {
                if !graph.add_edge(&module.name, target, weight) {
                    tracing::debug!("{} -> {} skipped, target not loaded", module.name, target);
                }
            }
        }

        graph
    }

    /// Model graph; edges follow `_inherit` and/or `_inherits`.
    pub fn model_graph(registry: &Registry, inherit: bool, inherits: bool) -> Graph {
        let models = registry.models();
        let mut graph = Graph::new();
        for name in models.keys() {
            graph.add_node(name);
        }

        for (name, model) in &models {
            for declaration in model.declarations() {
                let mut parents: Vec<&str> = Vec::new();
                if inherit {
                    parents.extend(declaration.inherit.iter().map(String::as_str));
                }
                if inherits {
                    parents.extend(declaration.inherits.keys().map(String::as_str));
                }
                for parent in parents {
                    if parent != name {
                        graph.add_edge(name, parent, 1);
                    }
                }
            }
        }

        graph
    }

    /// View graph; edges follow `inherit_id` and/or `t-call`.
    pub fn view_graph(registry: &Registry, inherit: bool, calls: bool) -> Graph {
        let views = registry.views();
        let mut graph = Graph::new();
        for id in views.keys() {
            graph.add_node(id);
        }

        for (id, view) in &views {
            if inherit {
                if let Some(parent) = view.inherit.as_deref().filter(|p| p != id) {
                    graph.add_edge(id, parent, 1);
                }
            }
            if calls {
                for call in view.calls.iter().filter(|c| *c != id) {
                    graph.add_edge(id, call, 1);
                }
            }
        }

        graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{
        ImportEdge, Manifest, ModelDeclaration, Module, ReferenceEdge, View,
    };

    fn module(name: &str, depends: &[&str]) -> Module {
        Module::new(name, format!("/addons/{}", name))
            .with_manifest(Manifest::default().with_depends(depends.iter().copied()))
    }

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry.insert(module("base", &[]));
        registry.insert(module("sale", &["base"]));

        let mut sale_x = module("sale_x", &["sale", "missing"]);
        sale_x.imports.insert(ImportEdge::new("sale", "models"));
        sale_x.imports.insert(ImportEdge::new("sale", "wizard"));
        sale_x.imports.insert(ImportEdge::new("ghost", ""));
        sale_x.refers.insert(ReferenceEdge::new("base", "base.group_user"));
        sale_x.refers.insert(ReferenceEdge::new("sale", "sale.view_order_form"));
        registry.insert(sale_x);
        registry
    }

    #[test]
    fn test_edge_kind_parse() {
        assert_eq!("imports".parse::<EdgeKind>().unwrap(), EdgeKind::Import);
        assert_eq!("Dependency".parse::<EdgeKind>().unwrap(), EdgeKind::Dependency);
        assert!("calls".parse::<EdgeKind>().is_err());
    }

    #[test]
    fn test_add_edge_rejects_unknown_nodes() {
        let mut graph = Graph::new();
        graph.add_node("a");
        assert!(!graph.add_edge("a", "b", 1));
        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_build_dependency_graph() {
        let graph = GraphBuilder::build(&registry(), EdgeKind::Dependency);

        let nodes: Vec<_> = graph.nodes().collect();
        assert_eq!(nodes, vec!["base", "sale", "sale_x"]);
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.weight("sale_x", "sale"), Some(1));
        assert!(graph.weight("sale_x", "missing").is_none());
        assert!(graph.referenced_by("sale").contains("sale_x"));
    }

    #[test]
    fn test_build_import_graph_weights() {
        let graph = GraphBuilder::build(&registry(), EdgeKind::Import);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.weight("sale_x", "sale"), Some(2));
    }

    #[test]
    fn test_build_many_sums_weights() {
        let graph = GraphBuilder::build_many(
            &registry(),
            &[EdgeKind::Dependency, EdgeKind::Import, EdgeKind::Reference],
        );
        assert_eq!(graph.weight("sale_x", "sale"), Some(4));
        assert_eq!(graph.weight("sale_x", "base"), Some(1));
        assert_eq!(graph.weight("sale", "base"), Some(1));
    }

    #[test]
    fn test_empty_registry() {
        let graph = GraphBuilder::build(&Registry::new(), EdgeKind::Dependency);
        assert!(graph.is_empty());
        assert!(graph.is_acyclic());
    }

    #[test]
    fn test_without_edges() {
        let graph = GraphBuilder::build(&registry(), EdgeKind::Dependency);
        let removed: BTreeSet<Edge> = [("sale_x".to_string(), "sale".to_string())].into();
        let trimmed = graph.without_edges(&removed);
        assert_eq!(trimmed.node_count(), 3);
        assert_eq!(trimmed.edge_count(), 1);
        assert_eq!(trimmed.weight("sale", "base"), Some(1));
        assert!(trimmed.weight("sale_x", "sale").is_none());
    }

    #[test]
    fn test_model_graph() {
        let mut registry = Registry::new();
        let mut base = module("base", &[]);
        base.declare_model("res.partner", ModelDeclaration::new("base"));
        base.declare_model("mail.thread", ModelDeclaration::new("base"));
        let mut sale = module("sale", &["base"]);
        sale.declare_model(
            "sale.order",
            ModelDeclaration::new("sale").with_inherit("mail.thread"),
        );
        let mut partner = ModelDeclaration::new("sale").with_inherit("res.partner");
        partner.inherits.insert("unknown.model".to_string(), "x_id".to_string());
        sale.declare_model("res.partner", partner);
        registry.insert(base);
        registry.insert(sale);

        let graph = GraphBuilder::model_graph(&registry, true, true);
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 1);
        assert!(graph.successors("sale.order").contains("mail.thread"));
        assert!(graph.successors("res.partner").is_empty());
    }

    #[test]
    fn test_model_graph_edge_kinds_can_be_disabled() {
        let mut registry = Registry::new();
        let mut base = module("base", &[]);
        base.declare_model("res.partner", ModelDeclaration::new("base"));
        base.declare_model("mail.thread", ModelDeclaration::new("base"));
        let mut sale = module("sale", &["base"]);
        let mut order = ModelDeclaration::new("sale").with_inherit("mail.thread");
        order.inherits.insert("res.partner".to_string(), "partner_id".to_string());
        sale.declare_model("sale.order", order);
        registry.insert(base);
        registry.insert(sale);

        let both = GraphBuilder::model_graph(&registry, true, true);
        assert_eq!(both.edge_count(), 2);

        let no_inherit = GraphBuilder::model_graph(&registry, false, true);
        assert_eq!(no_inherit.edge_count(), 1);
        assert!(no_inherit.successors("sale.order").contains("res.partner"));

        let no_inherits = GraphBuilder::model_graph(&registry, true, false);
        assert_eq!(no_inherits.edge_count(), 1);
        assert!(no_inherits.successors("sale.order").contains("mail.thread"));

        assert_eq!(GraphBuilder::model_graph(&registry, false, false).edge_count(), 0);
    }

    #[test]
    fn test_view_graph() {
        let mut registry = Registry::new();
        let mut web = module("web", &[]);
        web.add_view(View::new("web.layout"));
        web.add_view(View::new("web.frontend").with_call("web.layout"));
        let mut sale = module("sale", &["web"]);
        sale.add_view(View::new("sale.report").with_inherit("web.frontend").with_call("web.missing"));
        registry.insert(web);
        registry.insert(sale);

        let graph = GraphBuilder::view_graph(&registry, true, true);
        assert_eq!(graph.edge_count(), 2);

        let only_inherit = GraphBuilder::view_graph(&registry, true, false);
        assert_eq!(only_inherit.edge_count(), 1);
        assert!(only_inherit.successors("sale.report").contains("web.frontend"));

        let only_calls = GraphBuilder::view_graph(&registry, false, true);
        assert_eq!(only_calls.edge_count(), 1);
        assert!(only_calls.successors("web.frontend").contains("web.layout"));
    }
}
