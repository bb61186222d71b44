//! Graphviz DOT output for filtered graphs.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;

use crate::registry::Registry;
use crate::settings::{GraphSettings, ModuleColors};

use super::filter::{FilteredGraph, GlobSet};
use super::Graph;

/// Migration progress derived from manifest versions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Migration {
    /// Modules whose version matches the target glob
    pub migrated: BTreeSet<String>,
    /// Modules whose in-registry dependencies are all migrated
    pub ready: BTreeSet<String>,
}

impl Migration {
    pub fn compute(registry: &Registry, version: &GlobSet) -> Self {
        let migrated: BTreeSet<String> = registry
            .iter()
            .filter(|m| version.matches(&m.manifest.version))
            .map(|m| m.name.clone())
            .collect();

        let ready = registry
            .iter()
            .filter(|m| {
                m.depends()
                    .iter()
                    .filter(|dep| registry.contains(dep.as_str()))
                    .all(|dep| migrated.contains(dep.as_str()))
            })
            .map(|m| m.name.clone())
            .collect();

        Self { migrated, ready }
    }

    fn color<'a>(&self, node: &str, colors: &'a ModuleColors) -> &'a str {
        match (self.migrated.contains(node), self.ready.contains(node)) {
            (true, true) => colors.done_color.as_str(),
            (false, true) => colors.todo_color.as_str(),
            (true, false) => colors.warning_color.as_str(),
            (false, false) => colors.default_color.as_str(),
        }
    }
}

/// Nodes without outgoing edges in the unfiltered graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BaseNodes {
    pub nodes: BTreeSet<String>,
    pub color: String,
}

impl BaseNodes {
    pub fn compute(graph: &Graph, color: impl Into<String>) -> Self {
        let nodes = graph
            .nodes()
            .filter(|n| graph.successors(n).is_empty())
            .map(str::to_string)
            .collect();
        Self {
            nodes,
            color: color.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DotOptions {
    pub name: String,
    pub graph: GraphSettings,
    pub colors: ModuleColors,
    pub migration: Option<Migration>,
    pub base: Option<BaseNodes>,
    /// Extra attributes per node (`label`, `shape`, ...)
    pub node_attrs: BTreeMap<String, Vec<(String, String)>>,
}

impl DotOptions {
    pub fn new(name: impl Into<String>, graph: GraphSettings, colors: ModuleColors) -> Self {
        Self {
            name: name.into(),
            graph,
            colors,
            migration: None,
            base: None,
            node_attrs: BTreeMap::new(),
        }
    }

    pub fn with_migration(mut self, migration: Migration) -> Self {
        self.migration = Some(migration);
        self
    }

    pub fn with_base(mut self, base: BaseNodes) -> Self {
        self.base = Some(base);
        self
    }

    pub fn with_node_attr(
        mut self,
        node: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.node_attrs
            .entry(node.into())
            .or_default()
            .push((key.into(), value.into()));
        self
    }

    fn node_color(&self, node: &str) -> &str {
        if let Some(migration) = &self.migration {
            return migration.color(node, &self.colors);
        }
        match &self.base {
            Some(base) if base.nodes.contains(node) => base.color.as_str(),
            _ => self.colors.default_color.as_str(),
        }
    }
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Renders the subgraph as DOT text. Back edges get the loop colour.
pub fn render(filtered: &FilteredGraph, options: &DotOptions) -> String {
    let connected = filtered.connected_nodes();
    let mut out = String::new();

    let name = if options.name.is_empty() {
        "G"
    } else {
        options.name.as_str()
    };
    let _ = writeln!(out, "digraph {} {{", quote(name));
    let _ = writeln!(out, "  layout={};", quote(&options.graph.engine));

    for node in &filtered.nodes {
        if options.graph.skip_lonely_nodes && !connected.contains(node.as_str()) {
            continue;
        }
        let mut attrs: Vec<String> = options
            .node_attrs
            .get(node)
            .into_iter()
            .flatten()
            .map(|(key, value)| format!("{}={}", key, quote(value)))
            .collect();
        let color = options.node_color(node);
        if !color.is_empty() && !attrs.iter().any(|a| a.starts_with("color=")) {
            attrs.push(format!("color={}", quote(color)));
        }
        if attrs.is_empty() {
            let _ = writeln!(out, "  {};", quote(node));
        } else {
            let _ = writeln!(out, "  {} [{}];", quote(node), attrs.join(", "));
        }
    }

    for edge in &filtered.edges {
        let mut attrs = Vec::new();
        if edge.weight > 1 {
            attrs.push(format!("label={}", quote(&edge.weight.to_string())));
        }
        if edge.back_edge {
            attrs.push(format!("color={}", quote(&options.graph.loop_color)));
        }
        if attrs.is_empty() {
            let _ = writeln!(out, "  {} -> {};", quote(&edge.source), quote(&edge.target));
        } else {
            let _ = writeln!(
                out,
                "  {} -> {} [{}];",
                quote(&edge.source),
                quote(&edge.target),
                attrs.join(", ")
            );
        }
    }

    out.push_str("}\n");
    out
}
