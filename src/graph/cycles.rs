//! Feedback edge selection: which edges to drop so a graph becomes a
//! hierarchy.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::{Edge, Graph};

/// Computes a set of edges whose removal leaves the graph acyclic.
pub trait CycleBreaker {
    fn break_cycles(&self, graph: &Graph) -> BTreeSet<Edge>;
}

/// Greedy heuristic: repeatedly find a cycle and drop its busiest edge.
///
/// Not a minimum feedback arc set, but bounded by the number of edges and
/// deterministic for a given graph.
#[derive(Debug, Default, Clone, Copy)]
pub struct GreedyCycleBreaker;

impl CycleBreaker for GreedyCycleBreaker {
    fn break_cycles(&self, graph: &Graph) -> BTreeSet<Edge> {
        let order: Vec<String> = graph.nodes().map(str::to_string).collect();
        let mut working: BTreeSet<Edge> = graph.edges().into_keys().collect();
        let mut removed = BTreeSet::new();

        loop {
            prune(&mut working);
            let Some(cycle) = find_cycle(&order, &working) else {
                break;
            };

            let (outgoing, incoming) = degrees(&working);
            let mut victim: Option<(&Edge, usize)> = None;
            for edge in &cycle {
                let score = outgoing
                    .get(edge.0.as_str())
                    .copied()
                    .unwrap_or(0)
                    .max(incoming.get(edge.1.as_str()).copied().unwrap_or(0));
                if victim.map_or(true, |(_, best)| score > best) {
                    victim = Some((edge, score));
                }
            }

            let Some((edge, _)) = victim else {
                break;
            };
            let edge = edge.clone();
            tracing::debug!("Breaking cycle at {} -> {}", edge.0, edge.1);
            working.remove(&edge);
            removed.insert(edge);
        }

        removed
    }
}

fn degrees(edges: &BTreeSet<Edge>) -> (HashMap<&str, usize>, HashMap<&str, usize>) {
    let mut outgoing: HashMap<&str, usize> = HashMap::new();
    let mut incoming: HashMap<&str, usize> = HashMap::new();
    for (source, target) in edges {
        *outgoing.entry(source.as_str()).or_default() += 1;
        *incoming.entry(target.as_str()).or_default() += 1;
    }
    (outgoing, incoming)
}

/// Drops edges touching a node without incoming or without outgoing
/// edges until nothing changes. Such edges can never be part of a cycle.
fn prune(edges: &mut BTreeSet<Edge>) {
    loop {
        let before = edges.len();
        let (sources, targets): (BTreeSet<String>, BTreeSet<String>) = {
            let (outgoing, incoming) = degrees(edges);
            (
                outgoing.keys().map(|s| s.to_string()).collect(),
                incoming.keys().map(|s| s.to_string()).collect(),
            )
        };
        edges.retain(|(source, target)| targets.contains(source) && sources.contains(target));
        if edges.len() == before {
            break;
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    White,
    Gray,
    Black,
}

/// First cycle found by a depth-first search in node order, as the list
/// of its edges starting at the node the closing edge points to.
fn find_cycle(order: &[String], edges: &BTreeSet<Edge>) -> Option<Vec<Edge>> {
    let mut adjacency: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (source, target) in edges {
        adjacency.entry(source.as_str()).or_default().push(target.as_str());
    }

    let mut marks: HashMap<&str, Mark> = HashMap::new();
    for start in order {
        let start = start.as_str();
        let unvisited = marks.get(start).copied().unwrap_or(Mark::White) == Mark::White;
        if !unvisited || !adjacency.contains_key(start) {
            continue;
        }

        let mut stack: Vec<(&str, usize)> = vec![(start, 0)];
        marks.insert(start, Mark::Gray);

        while let Some(top) = stack.last_mut() {
            let node = top.0;
            let successors = adjacency.get(node).map(Vec::as_slice).unwrap_or(&[]);
            if top.1 >= successors.len() {
                marks.insert(node, Mark::Black);
                stack.pop();
                continue;
            }

            let successor = successors[top.1];
            top.1 += 1;

            match marks.get(successor).copied().unwrap_or(Mark::White) {
                Mark::White => {
                    marks.insert(successor, Mark::Gray);
                    stack.push((successor, 0));
                }
                Mark::Gray => {
                    let position = stack.iter().position(|(n, _)| *n == successor)?;
                    let path: Vec<&str> = stack[position..].iter().map(|(n, _)| *n).collect();
                    let mut cycle: Vec<Edge> = path
                        .windows(2)
                        .map(|pair| (pair[0].to_string(), pair[1].to_string()))
                        .collect();
                    cycle.push((node.to_string(), successor.to_string()));
                    return Some(cycle);
                }
                Mark::Black => {}
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(nodes: &[&str], edges: &[(&str, &str)]) -> Graph {
        let mut graph = Graph::new();
        for node in nodes {
            graph.add_node(node);
        }
        for (source, target) in edges {
            graph.add_edge(source, target, 1);
        }
        graph
    }

    fn edge(source: &str, target: &str) -> Edge {
        (source.to_string(), target.to_string())
    }

    #[test]
    fn test_acyclic_graph_needs_no_cuts() {
        let g = graph(&["a", "b", "c"], &[("a", "b"), ("b", "c"), ("a", "c")]);
        assert!(GreedyCycleBreaker.break_cycles(&g).is_empty());
    }

    #[test]
    fn test_two_node_cycle_removes_one_edge() {
        let g = graph(&["a", "b"], &[("a", "b"), ("b", "a")]);
        let removed = GreedyCycleBreaker.break_cycles(&g);

        assert_eq!(removed.len(), 1);
        let rest = g.without_edges(&removed);
        assert_eq!(rest.edge_count(), 1);
        assert!(rest.is_acyclic());
    }

    #[test]
    fn test_self_loop_is_removed() {
        let g = graph(&["a", "b"], &[("a", "a"), ("a", "b")]);
        let removed = GreedyCycleBreaker.break_cycles(&g);
        assert_eq!(removed, [edge("a", "a")].into());
    }

    #[test]
    fn test_busiest_edge_is_chosen() {
        // b is the hub of two cycles; cutting an edge at b breaks both.
        let g = graph(
            &["a", "b", "c", "d"],
            &[("a", "b"), ("b", "a"), ("b", "c"), ("c", "b"), ("b", "d")],
        );
        let removed = GreedyCycleBreaker.break_cycles(&g);

        assert!(g.without_edges(&removed).is_acyclic());
        assert!(removed.len() <= 2);
        assert!(removed.iter().all(|(s, t)| s == "b" || t == "b"));
    }

    #[test]
    fn test_dense_graph_becomes_acyclic() {
        let names = ["a", "b", "c", "d", "e"];
        let mut edges = Vec::new();
        for s in names {
            for t in names {
                if s != t {
                    edges.push((s, t));
                }
            }
        }
        let g = graph(&names, &edges);
        let removed = GreedyCycleBreaker.break_cycles(&g);

        assert!(removed.len() <= g.edge_count());
        assert!(g.without_edges(&removed).is_acyclic());
    }

    #[test]
    fn test_result_is_deterministic() {
        let g = graph(
            &["x", "y", "z"],
            &[("x", "y"), ("y", "z"), ("z", "x"), ("y", "x")],
        );
        assert_eq!(
            GreedyCycleBreaker.break_cycles(&g),
            GreedyCycleBreaker.break_cycles(&g)
        );
    }

    #[test]
    fn test_find_cycle_reports_edges_in_order() {
        let edges: BTreeSet<Edge> = [edge("a", "b"), edge("b", "c"), edge("c", "a")].into();
        let order: Vec<String> = vec!["a".into(), "b".into(), "c".into()];
        let cycle = find_cycle(&order, &edges).unwrap();
        assert_eq!(cycle, vec![edge("a", "b"), edge("b", "c"), edge("c", "a")]);
    }
}
