// src/indicators.rs
//! Hierarchical log of compliance findings
//!
//! The tree is append-only. Scopes are opened with [`IndicatorsTree::push`],
//! which hands back a [`ScopeId`]; findings are appended to a scope by passing
//! that handle explicitly, and the scope is closed with [`IndicatorsTree::pop`].
//! Closed scopes stay in the tree so formatters can replay the full trail.

use crate::error::{Error, Result, Status};

/// Handle to one scope of an [`IndicatorsTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(usize);

/// One recorded finding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Indicator {
    pub message: String,
    pub status: Status,
}

/// A named scope with its findings and sub-scopes
#[derive(Debug, Clone)]
pub struct Node {
    pub procedure_name: String,
    pub status: Status,
    pub indicators: Vec<Indicator>,
    children: Vec<ScopeId>,
}

impl Node {
    fn new(procedure_name: String) -> Self {
        Self {
            procedure_name,
            status: Status::NonCompliant,
            indicators: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn child_ids(&self) -> &[ScopeId] {
        &self.children
    }
}

/// Ordered, scoped log of all indicators produced during one evaluation
#[derive(Debug, Clone, Default)]
pub struct IndicatorsTree {
    nodes: Vec<Node>,
    open: Vec<ScopeId>,
}

impl IndicatorsTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new scope under the innermost open scope.
    ///
    /// The first scope becomes the root. A scope opened while nothing is open
    /// is attached to the root.
    pub fn push(&mut self, procedure_name: impl Into<String>) -> ScopeId {
        let id = ScopeId(self.nodes.len());
        let parent = self
            .open
            .last()
            .copied()
            .or_else(|| if self.nodes.is_empty() { None } else { Some(ScopeId(0)) });

        self.nodes.push(Node::new(procedure_name.into()));
        if let Some(parent) = parent {
            self.nodes[parent.0].children.push(id);
        }
        self.open.push(id);
        id
    }

    /// Close `scope`, which must be the innermost open scope
    pub fn pop(&mut self, scope: ScopeId) -> Result<()> {
        match self.open.last() {
            Some(top) if *top == scope => {
                self.open.pop();
                Ok(())
            }
            Some(top) => Err(Error::invalid(format!(
                "Cannot close scope '{}' while '{}' is still open",
                self.name_of(scope),
                self.name_of(*top)
            ))),
            None => Err(Error::invalid("No open scope to close")),
        }
    }

    /// Innermost open scope
    pub fn back(&self) -> Option<ScopeId> {
        self.open.last().copied()
    }

    /// Append a finding to `scope` and hand its status back to the caller
    pub fn add_indicator(
        &mut self,
        scope: ScopeId,
        message: impl Into<String>,
        status: Status,
    ) -> Status {
        let message = message.into();
        match self.nodes.get_mut(scope.0) {
            Some(node) => node.indicators.push(Indicator { message, status }),
            None => log::warn!("Dropping indicator for unknown scope {:?}: {}", scope, message),
        }
        status
    }

    pub fn compliant(&mut self, scope: ScopeId, message: impl Into<String>) -> Status {
        self.add_indicator(scope, message, Status::Compliant)
    }

    pub fn non_compliant(&mut self, scope: ScopeId, message: impl Into<String>) -> Status {
        self.add_indicator(scope, message, Status::NonCompliant)
    }

    /// Record the verdict of a scope
    pub fn set_status(&mut self, scope: ScopeId, status: Status) {
        if let Some(node) = self.nodes.get_mut(scope.0) {
            node.status = status;
        }
    }

    pub fn root_node(&self) -> Option<&Node> {
        self.nodes.first()
    }

    pub fn node(&self, scope: ScopeId) -> Option<&Node> {
        self.nodes.get(scope.0)
    }

    /// Sub-scopes of `node` in the order they were opened
    pub fn children<'a>(&'a self, node: &'a Node) -> impl Iterator<Item = &'a Node> + 'a {
        node.children.iter().filter_map(move |id| self.nodes.get(id.0))
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn name_of(&self, scope: ScopeId) -> &str {
        self.nodes
            .get(scope.0)
            .map(|n| n.procedure_name.as_str())
            .unwrap_or("<unknown>")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_builds_hierarchy() {
        let mut tree = IndicatorsTree::new();
        let root = tree.push("rule");
        let first = tree.push("EnsureSysctl");
        tree.compliant(first, "ok");
        tree.pop(first).unwrap();
        let second = tree.push("PackageInstalled");
        tree.non_compliant(second, "missing");
        tree.pop(second).unwrap();
        tree.pop(root).unwrap();

        let root_node = tree.root_node().unwrap();
        assert_eq!(root_node.procedure_name, "rule");
        let names: Vec<_> = tree
            .children(root_node)
            .map(|n| n.procedure_name.clone())
            .collect();
        assert_eq!(names, vec!["EnsureSysctl", "PackageInstalled"]);
        assert!(tree.back().is_none());
    }

    #[test]
    fn test_indicator_status_is_returned() {
        let mut tree = IndicatorsTree::new();
        let scope = tree.push("proc");
        assert_eq!(tree.compliant(scope, "A"), Status::Compliant);
        assert_eq!(tree.non_compliant(scope, "B"), Status::NonCompliant);

        let node = tree.node(scope).unwrap();
        assert_eq!(node.indicators.len(), 2);
        assert_eq!(node.indicators[0].message, "A");
        assert_eq!(node.indicators[1].status, Status::NonCompliant);
    }

    #[test]
    fn test_pop_out_of_order_rejected() {
        let mut tree = IndicatorsTree::new();
        let outer = tree.push("outer");
        let inner = tree.push("inner");

        match tree.pop(outer) {
            Err(e) => assert!(e.message.contains("'inner' is still open")),
            Ok(_) => panic!("Expected out-of-order pop to fail"),
        }

        tree.pop(inner).unwrap();
        tree.pop(outer).unwrap();
        assert!(tree.pop(outer).is_err());
    }

    #[test]
    fn test_default_status_is_non_compliant() {
        let mut tree = IndicatorsTree::new();
        let scope = tree.push("proc");
        assert_eq!(tree.node(scope).unwrap().status, Status::NonCompliant);
        tree.set_status(scope, Status::Compliant);
        assert_eq!(tree.node(scope).unwrap().status, Status::Compliant);
    }

    #[test]
    fn test_scope_after_root_closed_attaches_to_root() {
        let mut tree = IndicatorsTree::new();
        let root = tree.push("first");
        tree.pop(root).unwrap();
        let second = tree.push("second");
        tree.pop(second).unwrap();

        let root_node = tree.root_node().unwrap();
        assert_eq!(tree.children(root_node).count(), 1);
    }
}
