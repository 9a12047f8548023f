use crate::flow::NodeRef;
use std::collections::HashMap;
use stepcore::{FlowError, Node};

/// Registry of node templates, keyed by node name
///
/// Built with explicit `register` calls, then typically shared behind an
/// `Arc`. Lookups hand out independent clones of the stored template, so
/// per-run mutation of one copy never reaches the template or its other
/// copies.
#[derive(Debug)]
pub struct NodeRegistry {
    templates: HashMap<String, Node>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            templates: HashMap::new(),
        }
    }

    /// Register a node template under its declared name.
    ///
    /// Registering the same name again replaces the earlier template. The
    /// replacement is logged, not rejected.
    pub fn register(&mut self, node: Node) {
        let name = node.name().to_string();
        if self.templates.contains_key(&name) {
            tracing::warn!("Replacing registered node: {}", name);
        } else {
            tracing::info!("Registering node: {}", name);
        }
        self.templates.insert(name, node);
    }

    /// Resolve a node reference.
    ///
    /// A name yields an independent copy of the matching template, or
    /// [`FlowError::UnknownNode`] when nothing is registered under it.
    /// A node value passes through unchanged.
    pub fn get(&self, node: impl Into<NodeRef>) -> Result<Node, FlowError> {
        match node.into() {
            NodeRef::Name(name) => self
                .templates
                .get(&name)
                .cloned()
                .ok_or(FlowError::UnknownNode(name)),
            NodeRef::Node(node) => Ok(node),
        }
    }

    /// Resolve several references at once, failing on the first unknown name.
    pub fn get_many<I, R>(&self, nodes: I) -> Result<Vec<Node>, FlowError>
    where
        I: IntoIterator<Item = R>,
        R: Into<NodeRef>,
    {
        nodes.into_iter().map(|node| self.get(node)).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    /// Names of all registered templates
    pub fn names(&self) -> Vec<&str> {
        self.templates.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
