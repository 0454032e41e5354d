//! Execution plan: the dependency graph of actions for one run.
//!
//! Plans are built outside this crate (script compilation) and handed to a
//! session with every request. A later request may carry a grown plan that
//! replaces the session's current one.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::hash::Fingerprint;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionNode {
    pub name: String,
    pub action_type: String,
    #[serde(default)]
    pub abstractions: Vec<String>,
}

/// `from` must run before `to`; `abstractions` are handed along the edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionEdge {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub abstractions: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    #[serde(default)]
    pub study: String,
    #[serde(default)]
    pub nodes: Vec<ActionNode>,
    #[serde(default)]
    pub edges: Vec<ActionEdge>,
}

impl ExecutionPlan {
    pub fn new(study: impl Into<String>) -> Self {
        Self {
            study: study.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn with_action(mut self, name: impl Into<String>, action_type: impl Into<String>) -> Self {
        self.nodes.push(ActionNode {
            name: name.into(),
            action_type: action_type.into(),
            abstractions: Vec::new(),
        });
        self
    }

    pub fn with_edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.edges.push(ActionEdge {
            from: from.into(),
            to: to.into(),
            abstractions: Vec::new(),
        });
        self
    }

    pub fn contains_action(&self, name: &str) -> bool {
        self.action(name).is_some()
    }

    pub fn action(&self, name: &str) -> Option<&ActionNode> {
        self.nodes.iter().find(|n| n.name == name)
    }

    pub fn actions_of_type(&self, action_type: &str) -> Vec<&ActionNode> {
        self.nodes
            .iter()
            .filter(|n| n.action_type == action_type)
            .collect()
    }

    /// Direct predecessors of `name`, in edge order.
    pub fn parents(&self, name: &str) -> Vec<&ActionNode> {
        self.edges
            .iter()
            .filter(|e| e.to == name)
            .filter_map(|e| self.action(&e.from))
            .collect()
    }

    /// All ancestors of `name`, nearest first (breadth-first over incoming edges).
    pub fn ancestors(&self, name: &str) -> Vec<&ActionNode> {
        let mut out = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        queue.push_back(name);
        seen.insert(name);

        while let Some(current) = queue.pop_front() {
            for parent in self.parents(current) {
                if seen.insert(parent.name.as_str()) {
                    out.push(parent);
                    queue.push_back(parent.name.as_str());
                }
            }
        }
        out
    }

    /// Nearest ancestor of `name` with the given action type.
    pub fn ancestor_of_type(&self, name: &str, action_type: &str) -> Option<&ActionNode> {
        self.ancestors(name)
            .into_iter()
            .find(|n| n.action_type == action_type)
    }

    pub fn has_ancestor(&self, name: &str, action_type: &str) -> bool {
        self.ancestor_of_type(name, action_type).is_some()
    }

    /// Abstractions handed to `name` by its first incoming edge, falling back
    /// to the node's own declaration.
    pub fn abstractions_for(&self, name: &str) -> Vec<String> {
        match self.edges.iter().find(|e| e.to == name) {
            Some(edge) if !edge.abstractions.is_empty() => edge.abstractions.clone(),
            _ => self
                .action(name)
                .map(|n| n.abstractions.clone())
                .unwrap_or_default(),
        }
    }

    /// Kahn's algorithm; ties resolve in declaration order.
    pub fn topological_order(&self) -> Result<Vec<&ActionNode>> {
        let mut indegree: HashMap<&str, usize> =
            self.nodes.iter().map(|n| (n.name.as_str(), 0)).collect();
        for e in &self.edges {
            if let Some(d) = indegree.get_mut(e.to.as_str()) {
                *d += 1;
            }
        }

        let mut ready: VecDeque<&ActionNode> = self
            .nodes
            .iter()
            .filter(|n| indegree.get(n.name.as_str()) == Some(&0))
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(node) = ready.pop_front() {
            order.push(node);
            for e in self.edges.iter().filter(|e| e.from == node.name) {
                if let Some(d) = indegree.get_mut(e.to.as_str()) {
                    *d -= 1;
                    if *d == 0 {
                        if let Some(next) = self.action(&e.to) {
                            ready.push_back(next);
                        }
                    }
                }
            }
        }

        if order.len() != self.nodes.len() {
            return Err(Error::Plan(format!(
                "cycle detected in plan '{}'",
                self.study
            )));
        }
        Ok(order)
    }

    /// First action of the given type in dependency order.
    pub fn first_action_of_type(&self, action_type: &str) -> Result<Option<&ActionNode>> {
        Ok(self
            .topological_order()?
            .into_iter()
            .find(|n| n.action_type == action_type))
    }

    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for n in &self.nodes {
            if n.name.trim().is_empty() {
                return Err(Error::Plan("action with empty name".into()));
            }
            if !names.insert(n.name.as_str()) {
                return Err(Error::Plan(format!("duplicate action '{}'", n.name)));
            }
        }
        for e in &self.edges {
            for end in [&e.from, &e.to] {
                if !names.contains(end.as_str()) {
                    return Err(Error::Plan(format!(
                        "edge {} -> {} references unknown action '{}'",
                        e.from, e.to, end
                    )));
                }
            }
        }
        self.topological_order().map(|_| ())
    }

    /// Stable content hash; used to tell whether an update changed anything.
    pub fn fingerprint(&self) -> Result<Fingerprint> {
        Fingerprint::of(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> ExecutionPlan {
        ExecutionPlan::new("study")
            .with_action("select", "Select")
            .with_action("crawl", "Crawl")
            .with_action("filter", "Filter")
            .with_action("rank", "Rank")
            .with_edge("select", "crawl")
            .with_edge("crawl", "filter")
            .with_edge("filter", "rank")
    }

    #[test]
    fn ancestors_are_nearest_first() {
        let p = plan();
        let names: Vec<_> = p.ancestors("rank").iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["filter", "crawl", "select"]);
        assert!(p.has_ancestor("rank", "Select"));
        assert!(!p.has_ancestor("select", "Select"));
    }

    #[test]
    fn topological_order_and_cycles() {
        let p = plan();
        let order: Vec<_> = p.topological_order().unwrap().iter().map(|n| n.name.clone()).collect();
        assert_eq!(order, vec!["select", "crawl", "filter", "rank"]);
        assert_eq!(p.first_action_of_type("Filter").unwrap().unwrap().name, "filter");

        let cyclic = plan().with_edge("rank", "select");
        assert!(cyclic.validate().is_err());
    }

    #[test]
    fn validate_rejects_dangling_edges_and_duplicates() {
        assert!(plan().validate().is_ok());
        assert!(plan().with_edge("rank", "ghost").validate().is_err());
        assert!(plan().with_action("rank", "Rank").validate().is_err());
    }

    #[test]
    fn abstractions_come_from_incoming_edge() {
        let mut p = plan();
        p.edges[0].abstractions = vec!["Stack".into()];
        p.nodes[0].abstractions = vec!["Queue".into()];
        assert_eq!(p.abstractions_for("crawl"), vec!["Stack".to_string()]);
        assert_eq!(p.abstractions_for("select"), vec!["Queue".to_string()]);
    }

    #[test]
    fn fingerprint_tracks_changes() {
        let a = plan().fingerprint().unwrap();
        let b = plan().with_action("export", "Export").fingerprint().unwrap();
        assert_ne!(a, b);
        assert_eq!(a, plan().fingerprint().unwrap());
    }
}
