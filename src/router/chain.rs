//! The binding chain a router walks for every request.
//!
//! A chain is an append-only sequence of [`BindingNode`]s. Nodes are only
//! added while the router is being configured; during dispatch the chain is
//! shared read-only behind an `Arc`, and each traversal frame keeps its own
//! cursor (node index, unit index) into it.

use crate::context::Params;
use crate::http::{Method, MethodFilter};
use crate::middleware::Unit;

use super::Pattern;

/// One binding: a method filter, an optional pattern, and the units to run.
#[derive(Clone)]
pub struct BindingNode {
    method: MethodFilter,
    // `None` matches every path.
    pattern: Option<Pattern>,
    units: Vec<Unit>,
}

impl BindingNode {
    pub(crate) fn new(method: MethodFilter, pattern: Option<Pattern>, units: Vec<Unit>) -> Self {
        Self {
            method,
            pattern,
            units,
        }
    }

    pub fn method(&self) -> &MethodFilter {
        &self.method
    }

    pub fn pattern(&self) -> Option<&Pattern> {
        self.pattern.as_ref()
    }

    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    /// Tests the node against a request, binding parameters into `params` on
    /// a pattern match. A node without a pattern matches and leaves `params`
    /// as they are.
    pub(crate) fn matches(&self, method: &Method, path: &str, params: &mut Params) -> bool {
        if !self.method.accepts(method) {
            return false;
        }
        self.pattern
            .as_ref()
            .is_none_or(|pattern| pattern.match_into(path, params))
    }
}

/// An ordered list of binding nodes.
#[derive(Clone, Default)]
pub struct Chain {
    nodes: Vec<BindingNode>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, node: BindingNode) {
        self.nodes.push(node);
    }

    pub(crate) fn node(&self, index: usize) -> Option<&BindingNode> {
        self.nodes.get(index)
    }

    pub fn nodes(&self) -> &[BindingNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::handler;

    fn noop() -> Unit {
        handler(|_ctx| Ok(()))
    }

    #[test]
    fn method_filter_is_checked_before_pattern() {
        let node = BindingNode::new(
            MethodFilter::Only(Method::Get),
            Some(Pattern::new("/users/:id").unwrap()),
            vec![noop()],
        );
        let mut params = Params::new();
        params.insert("stale", "1");

        assert!(!node.matches(&Method::Post, "/users/1", &mut params));
        assert_eq!(params.get("stale"), Some("1"));

        assert!(node.matches(&Method::Get, "/users/1", &mut params));
        assert_eq!(params.get("id"), Some("1"));
        assert_eq!(params.get("stale"), None);
    }

    #[test]
    fn pattern_less_node_matches_everything_and_keeps_params() {
        let node = BindingNode::new(MethodFilter::All, None, vec![noop()]);
        let mut params: Params = [("id", "9")].into_iter().collect();
        assert!(node.matches(&Method::Delete, "/anything/at/all", &mut params));
        assert_eq!(params.get("id"), Some("9"));
    }

    #[test]
    fn chain_preserves_append_order() {
        let mut chain = Chain::new();
        chain.push(BindingNode::new(MethodFilter::All, None, vec![noop()]));
        chain.push(BindingNode::new(
            MethodFilter::Only(Method::Get),
            Some(Pattern::new("/b").unwrap()),
            vec![noop(), noop()],
        ));

        assert_eq!(chain.len(), 2);
        assert!(chain.node(0).unwrap().pattern().is_none());
        assert_eq!(chain.node(1).unwrap().pattern().unwrap().as_str(), "/b");
        assert_eq!(chain.node(1).unwrap().units().len(), 2);
        assert!(chain.node(2).is_none());
    }
}
