//! Seed-driven subgraphs under glob and state predicates.

use std::collections::{BTreeSet, HashMap, VecDeque};

use glob::Pattern;
use serde::Serialize;

use crate::error::{AnalyseError, Result};
use crate::registry::view::owning_module;
use crate::registry::{Module, Registry};
use crate::state::ModuleState;

use super::cycles::{CycleBreaker, GreedyCycleBreaker};
use super::Graph;

/// Comma separated glob patterns; a name matches if any pattern does.
#[derive(Debug, Clone)]
pub struct GlobSet {
    patterns: Vec<Pattern>,
}

impl GlobSet {
    pub fn parse(patterns: &str) -> Result<Self> {
        let patterns = patterns
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| {
                Pattern::new(p).map_err(|e| {
                    AnalyseError::Configuration(format!("invalid glob '{}': {}", p, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        if patterns.is_empty() {
            return Err(AnalyseError::Configuration(
                "empty glob pattern list".to_string(),
            ));
        }
        Ok(Self { patterns })
    }

    pub fn matches(&self, name: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(name))
    }
}

/// A condition a module must satisfy to become a seed.
pub trait ModulePredicate {
    fn matches(&self, module: &Module) -> bool;
}

/// Module name glob.
pub struct NameGlob(pub GlobSet);

impl ModulePredicate for NameGlob {
    fn matches(&self, module: &Module) -> bool {
        self.0.matches(&module.name)
    }
}

/// Module declares or extends a matching model.
pub struct ModelGlob(pub GlobSet);

impl ModulePredicate for ModelGlob {
    fn matches(&self, module: &Module) -> bool {
        module.models.keys().any(|name| self.0.matches(name))
    }
}

/// Module owns a matching view.
pub struct ViewGlob(pub GlobSet);

impl ModulePredicate for ViewGlob {
    fn matches(&self, module: &Module) -> bool {
        module
            .views
            .keys()
            .any(|id| owning_module(id) == module.name && self.0.matches(id))
    }
}

/// Module path glob.
pub struct PathGlob(pub GlobSet);

impl ModulePredicate for PathGlob {
    fn matches(&self, module: &Module) -> bool {
        self.0.matches(&module.path.to_string_lossy())
    }
}

/// Rejects `test_*` modules.
pub struct ExcludeTests;

impl ModulePredicate for ExcludeTests {
    fn matches(&self, module: &Module) -> bool {
        !module.is_test()
    }
}

/// Module lifecycle state must be in the accepted set; unknown modules
/// fail.
pub struct StateFilter {
    states: HashMap<String, ModuleState>,
    accepted: BTreeSet<ModuleState>,
}

impl StateFilter {
    pub fn new(states: HashMap<String, ModuleState>, accepted: BTreeSet<ModuleState>) -> Result<Self> {
        if accepted.is_empty() {
            return Err(AnalyseError::Configuration(
                "state filter without accepted states".to_string(),
            ));
        }
        Ok(Self { states, accepted })
    }
}

impl ModulePredicate for StateFilter {
    fn matches(&self, module: &Module) -> bool {
        self.states
            .get(&module.name)
            .is_some_and(|state| self.accepted.contains(state))
    }
}

/// Conjunction of predicates. No predicate accepts everything.
#[derive(Default)]
pub struct Predicates {
    all: Vec<Box<dyn ModulePredicate>>,
}

impl Predicates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, predicate: impl ModulePredicate + 'static) -> Self {
        self.all.push(Box::new(predicate));
        self
    }

    pub fn module_glob(self, patterns: &str) -> Result<Self> {
        Ok(self.with(NameGlob(GlobSet::parse(patterns)?)))
    }

    pub fn model_glob(self, patterns: &str) -> Result<Self> {
        Ok(self.with(ModelGlob(GlobSet::parse(patterns)?)))
    }

    pub fn view_glob(self, patterns: &str) -> Result<Self> {
        Ok(self.with(ViewGlob(GlobSet::parse(patterns)?)))
    }

    pub fn path_glob(self, patterns: &str) -> Result<Self> {
        Ok(self.with(PathGlob(GlobSet::parse(patterns)?)))
    }

    pub fn exclude_tests(self) -> Self {
        self.with(ExcludeTests)
    }

    pub fn state(
        self,
        states: HashMap<String, ModuleState>,
        accepted: BTreeSet<ModuleState>,
    ) -> Result<Self> {
        Ok(self.with(StateFilter::new(states, accepted)?))
    }

    pub fn len(&self) -> usize {
        self.all.len()
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }
}

impl ModulePredicate for Predicates {
    fn matches(&self, module: &Module) -> bool {
        self.all.iter().all(|p| p.matches(module))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilteredEdge {
    pub source: String,
    pub target: String,
    pub weight: usize,
    /// Edge dropped by the cycle breaker to make the graph a hierarchy
    pub back_edge: bool,
}

/// Subgraph selected by a filter run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilteredGraph {
    /// Nodes in graph order
    pub nodes: Vec<String>,
    /// Nodes that satisfied the predicates
    pub seeds: Vec<String>,
    /// Edges sorted by endpoints
    pub edges: Vec<FilteredEdge>,
}

impl FilteredGraph {
    pub fn contains(&self, name: &str) -> bool {
        self.nodes.iter().any(|n| n == name)
    }

    pub fn edge(&self, source: &str, target: &str) -> Option<&FilteredEdge> {
        self.edges
            .iter()
            .find(|e| e.source == source && e.target == target)
    }

    /// Nodes with at least one edge inside the subgraph.
    pub fn connected_nodes(&self) -> BTreeSet<&str> {
        self.edges
            .iter()
            .flat_map(|e| [e.source.as_str(), e.target.as_str()])
            .collect()
    }
}

/// Module subgraph whose seeds satisfy `predicates`.
///
/// With `full_graph` the result also holds everything reachable from a
/// seed; otherwise only seeds and the edges between them.
pub fn filter(
    registry: &Registry,
    graph: &Graph,
    predicates: &dyn ModulePredicate,
    full_graph: bool,
) -> FilteredGraph {
    filter_with(registry, graph, predicates, full_graph, &GreedyCycleBreaker)
}

pub fn filter_with(
    registry: &Registry,
    graph: &Graph,
    predicates: &dyn ModulePredicate,
    full_graph: bool,
    breaker: &dyn CycleBreaker,
) -> FilteredGraph {
    let seeds: Vec<String> = registry
        .iter()
        .filter(|module| graph.contains(&module.name) && predicates.matches(module))
        .map(|module| module.name.clone())
        .collect();
    induce(graph, seeds, full_graph, breaker)
}

/// Subgraph of a model or view graph seeded by a glob on node names.
pub fn select(graph: &Graph, glob: Option<&GlobSet>, full_graph: bool) -> FilteredGraph {
    let seeds: Vec<String> = graph
        .nodes()
        .filter(|name| glob.map_or(true, |g| g.matches(name)))
        .map(str::to_string)
        .collect();
    induce(graph, seeds, full_graph, &GreedyCycleBreaker)
}

fn induce(
    graph: &Graph,
    seeds: Vec<String>,
    full_graph: bool,
    breaker: &dyn CycleBreaker,
) -> FilteredGraph {
    let mut included: BTreeSet<&str> = seeds.iter().map(String::as_str).collect();

    if full_graph {
        let mut queue: VecDeque<&str> = included.iter().copied().collect();
        while let Some(current) = queue.pop_front() {
            for next in graph.successors(current) {
                if included.insert(next) {
                    queue.push_back(next);
                }
            }
        }
    }

    let back_edges = breaker.break_cycles(graph);
    let edges = graph
        .edges()
        .into_iter()
        .filter(|((source, target), _)| {
            included.contains(source.as_str()) && included.contains(target.as_str())
        })
        .map(|((source, target), weight)| {
            let back_edge = back_edges.contains(&(source.clone(), target.clone()));
            FilteredEdge {
                source,
                target,
                weight,
                back_edge,
            }
        })
        .collect();

    let nodes = graph
        .nodes()
        .filter(|name| included.contains(name))
        .map(str::to_string)
        .collect();

    FilteredGraph {
        nodes,
        seeds,
        edges,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EdgeKind, GraphBuilder};
    use crate::registry::{Manifest, ModelDeclaration, View};

    fn module(name: &str, depends: &[&str]) -> Module {
        Module::new(name, format!("/addons/{}", name))
            .with_manifest(Manifest::default().with_depends(depends.iter().copied()))
    }

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry.insert(module("base", &[]));
        registry.insert(module("sale", &["base"]));
        let mut sale_x = module("sale_x", &["sale"]);
        sale_x.declare_model("sale.order", ModelDeclaration::new("sale_x"));
        sale_x.add_view(View::new("sale_x.view_form"));
        registry.insert(sale_x);
        registry.insert(module("other", &["base"]));
        registry.insert(module("test_sale", &["sale"]));
        registry
    }

    #[test]
    fn test_glob_set() {
        let globs = GlobSet::parse("sale*, stock").unwrap();
        assert!(globs.matches("sale_x"));
        assert!(globs.matches("stock"));
        assert!(!globs.matches("stock_x"));

        assert!(GlobSet::parse("[").is_err());
        assert!(GlobSet::parse(" , ").is_err());
    }

    #[test]
    fn test_partial_filter() {
        let registry = registry();
        let graph = GraphBuilder::build(&registry, EdgeKind::Dependency);
        let predicates = Predicates::new().module_glob("sale*").unwrap();

        let result = filter(&registry, &graph, &predicates, false);
        assert_eq!(result.nodes, vec!["sale", "sale_x"]);
        assert_eq!(result.seeds, vec!["sale", "sale_x"]);
        assert_eq!(result.edges.len(), 1);
        assert!(result.edge("sale_x", "sale").is_some());
    }

    #[test]
    fn test_full_graph_adds_closure() {
        let registry = registry();
        let graph = GraphBuilder::build(&registry, EdgeKind::Dependency);
        let predicates = Predicates::new().module_glob("sale_x").unwrap();

        let result = filter(&registry, &graph, &predicates, true);
        assert_eq!(result.seeds, vec!["sale_x"]);
        assert_eq!(result.nodes, vec!["base", "sale", "sale_x"]);
        assert_eq!(result.edges.len(), 2);
    }

    #[test]
    fn test_predicates_combine_with_and() {
        let registry = registry();
        let graph = GraphBuilder::build(&registry, EdgeKind::Dependency);

        let predicates = Predicates::new()
            .module_glob("*sale*")
            .unwrap()
            .exclude_tests();
        let result = filter(&registry, &graph, &predicates, false);
        assert_eq!(result.seeds, vec!["sale", "sale_x"]);

        let predicates = Predicates::new()
            .model_glob("sale.*")
            .unwrap()
            .view_glob("*.view_form")
            .unwrap();
        let result = filter(&registry, &graph, &predicates, false);
        assert_eq!(result.seeds, vec!["sale_x"]);

        let predicates = Predicates::new().path_glob("/addons/o*").unwrap();
        let result = filter(&registry, &graph, &predicates, false);
        assert_eq!(result.seeds, vec!["other"]);
    }

    #[test]
    fn test_state_filter() {
        let registry = registry();
        let graph = GraphBuilder::build(&registry, EdgeKind::Dependency);
        let states: HashMap<String, ModuleState> = [
            ("base".to_string(), ModuleState::Installed),
            ("sale".to_string(), ModuleState::Uninstalled),
        ]
        .into();

        let predicates = Predicates::new()
            .state(states.clone(), [ModuleState::Installed].into())
            .unwrap();
        let result = filter(&registry, &graph, &predicates, false);
        assert_eq!(result.seeds, vec!["base"]);

        assert!(Predicates::new().state(states, BTreeSet::new()).is_err());
    }

    #[test]
    fn test_back_edges_are_annotated() {
        let mut registry = Registry::new();
        registry.insert(module("a", &["b"]));
        registry.insert(module("b", &["a"]));
        let graph = GraphBuilder::build(&registry, EdgeKind::Dependency);

        let result = filter(&registry, &graph, &Predicates::new(), false);
        assert_eq!(result.edges.len(), 2);
        assert_eq!(result.edges.iter().filter(|e| e.back_edge).count(), 1);
    }

    #[test]
    fn test_select_on_node_names() {
        let mut graph = Graph::new();
        for node in ["sale.order", "mail.thread", "res.partner"] {
            graph.add_node(node);
        }
        graph.add_edge("sale.order", "mail.thread", 1);

        let globs = GlobSet::parse("sale.*").unwrap();
        let partial = select(&graph, Some(&globs), false);
        assert_eq!(partial.nodes, vec!["sale.order"]);
        assert!(partial.edges.is_empty());

        let full = select(&graph, Some(&globs), true);
        assert_eq!(full.nodes, vec!["sale.order", "mail.thread"]);

        let everything = select(&graph, None, false);
        assert_eq!(everything.nodes.len(), 3);
    }
}
