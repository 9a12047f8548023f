use crate::error::NodeError;
use crate::value::{flatten, ParamMap, Value};
use futures::future::BoxFuture;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Role of a node inside a flow
///
/// All kinds share one structure and one execution path. The only behavioral
/// split is on input acceptance: a `Start` node rejects any non-empty inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Start,
    Regular,
    Condition,
    End,
}

/// One declared parameter of a node's callable
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: String,
    /// `None` marks the parameter required; `Some` holds the value injected
    /// when the inputs omit the key.
    pub default: Option<Value>,
}

impl ParamSpec {
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
        }
    }

    pub fn with_default(name: impl Into<String>, default: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            default: Some(default.into()),
        }
    }

    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }
}

/// Declared shape of a node's output, the static side of link checking
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OutputShape {
    /// Field names the callable promises to produce
    Structured(Vec<String>),
    /// A bare mapping, opaque to static link checking
    #[default]
    Unstructured,
}

impl OutputShape {
    pub fn field_names(&self) -> Option<&[String]> {
        match self {
            OutputShape::Structured(fields) => Some(fields),
            OutputShape::Unstructured => None,
        }
    }
}

type SyncFn = dyn Fn(ParamMap) -> Result<ParamMap, NodeError> + Send + Sync;
type AsyncFn = dyn Fn(ParamMap) -> BoxFuture<'static, Result<ParamMap, NodeError>> + Send + Sync;

/// The function wrapped by a node
///
/// The two flavors stay distinguishable so each execution mode can bridge
/// the other one: [`Node::run`] drives an async callable to completion on
/// the current thread, [`Node::async_run`] offloads a sync callable to a
/// blocking worker.
#[derive(Clone)]
pub enum Callable {
    Sync(Arc<SyncFn>),
    Async(Arc<AsyncFn>),
}

impl Callable {
    pub fn is_async(&self) -> bool {
        matches!(self, Callable::Async(_))
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callable::Sync(_) => f.write_str("Callable::Sync(<function>)"),
            Callable::Async(_) => f.write_str("Callable::Async(<function>)"),
        }
    }
}

/// A named wrapper around one processing function
///
/// Carries the declared parameters and output shape used for link checking,
/// plus the mutable run record: assigned inputs, last output, finished flag.
/// Cloning shares the callable and copies the run record, so independent
/// copies of a template are cheap.
#[derive(Clone)]
pub struct Node {
    name: String,
    kind: NodeKind,
    description: Option<String>,
    params: Vec<ParamSpec>,
    output_shape: OutputShape,
    callable: Callable,
    inputs: ParamMap,
    output: Option<ParamMap>,
    finished: bool,
}

impl Node {
    /// Begin a start node, the entry point of a flow. Rejects any inputs.
    pub fn start(name: impl Into<String>) -> NodeBuilder {
        NodeBuilder::new(name, NodeKind::Start)
    }

    /// Begin a regular processing node.
    pub fn regular(name: impl Into<String>) -> NodeBuilder {
        NodeBuilder::new(name, NodeKind::Regular)
    }

    /// Begin a condition node, a branch point for routing decisions.
    pub fn condition(name: impl Into<String>) -> NodeBuilder {
        NodeBuilder::new(name, NodeKind::Condition)
    }

    /// Begin an end node. Runs immediately when forwarded into via [`Node::then`].
    pub fn end(name: impl Into<String>) -> NodeBuilder {
        NodeBuilder::new(name, NodeKind::End)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Declared parameters of the wrapped callable
    pub fn parameters(&self) -> &[ParamSpec] {
        &self.params
    }

    pub fn output_shape(&self) -> &OutputShape {
        &self.output_shape
    }

    pub fn callable(&self) -> &Callable {
        &self.callable
    }

    /// Inputs as last assigned, before default injection
    pub fn inputs(&self) -> &ParamMap {
        &self.inputs
    }

    /// Output of the last successful run, `None` until one happens
    pub fn output(&self) -> Option<&ParamMap> {
        self.output.as_ref()
    }

    pub fn finished(&self) -> bool {
        self.finished
    }

    /// Replace the node's inputs with a mapping, or with a structured record
    /// flattened through its named fields. Assignment always replaces the
    /// previous inputs, it never merges into them.
    pub fn set_inputs(&mut self, inputs: impl Serialize) -> Result<(), NodeError> {
        self.set_input_map(flatten(inputs)?)
    }

    /// Replace the node's inputs with an already-flattened mapping.
    ///
    /// Start nodes reject every non-empty mapping; on failure the prior
    /// inputs stay untouched.
    pub fn set_input_map(&mut self, inputs: ParamMap) -> Result<(), NodeError> {
        if self.kind == NodeKind::Start && !inputs.is_empty() {
            return Err(NodeError::InvalidInput(format!(
                "start node '{}' does not accept inputs",
                self.name
            )));
        }
        self.inputs = inputs;
        Ok(())
    }

    fn check_parameters(&self) -> Result<(), NodeError> {
        for spec in &self.params {
            if spec.is_required() && !self.inputs.contains_key(&spec.name) {
                return Err(NodeError::MissingParameter {
                    node: self.name.clone(),
                    parameter: spec.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Inputs as the callable sees them: declared defaults fill absent keys.
    fn invocation_inputs(&self) -> ParamMap {
        let mut inputs = self.inputs.clone();
        for spec in &self.params {
            if let Some(default) = &spec.default {
                inputs
                    .entry(spec.name.clone())
                    .or_insert_with(|| default.clone());
            }
        }
        inputs
    }

    fn record(&mut self, output: ParamMap) -> ParamMap {
        self.output = Some(output.clone());
        self.finished = true;
        output
    }

    /// Invoke the callable with the current inputs.
    ///
    /// Fails with [`NodeError::MissingParameter`] when a required parameter
    /// has no value. On success the output is recorded on the node and
    /// returned. An async callable is driven to completion on the current
    /// thread; callables that need a reactor belong on [`Node::async_run`].
    pub fn run(&mut self) -> Result<ParamMap, NodeError> {
        self.check_parameters()?;
        let inputs = self.invocation_inputs();
        tracing::debug!("Running node {} with inputs: {:?}", self.name, inputs);
        let output = match &self.callable {
            Callable::Sync(call) => call(inputs)?,
            Callable::Async(call) => futures::executor::block_on(call(inputs))?,
        };
        tracing::debug!("Node {} produced: {:?}", self.name, output);
        Ok(self.record(output))
    }

    /// Invoke the callable without blocking the async scheduler.
    ///
    /// Same contract as [`Node::run`]. A sync callable is offloaded to a
    /// blocking worker so it cannot stall other tasks.
    pub async fn async_run(&mut self) -> Result<ParamMap, NodeError> {
        self.check_parameters()?;
        let inputs = self.invocation_inputs();
        tracing::debug!("Running node {} with inputs: {:?}", self.name, inputs);
        let output = match &self.callable {
            Callable::Async(call) => call(inputs).await?,
            Callable::Sync(call) => {
                let call = Arc::clone(call);
                tokio::task::spawn_blocking(move || call(inputs))
                    .await
                    .map_err(|e| {
                        NodeError::ExecutionFailed(format!("blocking task failed: {}", e))
                    })??
            }
        };
        tracing::debug!("Node {} produced: {:?}", self.name, output);
        Ok(self.record(output))
    }

    /// Run this node, then forward its output into `next` and hand `next`
    /// back for further chaining.
    ///
    /// An end node runs immediately on arrival. Forwarding into a parallel
    /// group fails with [`NodeError::UnsupportedForward`] after this node
    /// has already run; groups belong to flow composition.
    pub fn then(&mut self, next: impl Into<Forward>) -> Result<Node, NodeError> {
        let output = self.run()?;
        match next.into() {
            Forward::Group(_) => Err(NodeError::UnsupportedForward),
            Forward::Node(mut node) => {
                node.set_input_map(output)?;
                if node.kind == NodeKind::End {
                    node.run()?;
                }
                Ok(node)
            }
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("params", &self.params)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

/// Target of [`Node::then`]: a single node or a parallel group
#[derive(Debug)]
pub enum Forward {
    Node(Node),
    Group(Vec<Node>),
}

impl From<Node> for Forward {
    fn from(node: Node) -> Self {
        Forward::Node(node)
    }
}

impl From<Vec<Node>> for Forward {
    fn from(group: Vec<Node>) -> Self {
        Forward::Group(group)
    }
}

impl<const N: usize> From<[Node; N]> for Forward {
    fn from(group: [Node; N]) -> Self {
        Forward::Group(group.into())
    }
}

/// Builder for a node template
///
/// Finished by [`NodeBuilder::handler`] or [`NodeBuilder::handler_async`],
/// so a node never exists without its callable.
#[derive(Debug)]
pub struct NodeBuilder {
    name: String,
    kind: NodeKind,
    description: Option<String>,
    params: Vec<ParamSpec>,
    output_shape: OutputShape,
}

impl NodeBuilder {
    fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            description: None,
            params: Vec::new(),
            output_shape: OutputShape::Unstructured,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Declare a required parameter.
    pub fn param(mut self, name: impl Into<String>) -> Self {
        self.params.push(ParamSpec::required(name));
        self
    }

    /// Declare a parameter with a default, used when resolution omits the key.
    pub fn param_default(mut self, name: impl Into<String>, default: impl Into<Value>) -> Self {
        self.params.push(ParamSpec::with_default(name, default));
        self
    }

    /// Declare the output fields the callable promises to produce.
    pub fn returns<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_shape = OutputShape::Structured(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Finish the template with a synchronous callable.
    pub fn handler<F>(self, handler: F) -> Node
    where
        F: Fn(ParamMap) -> Result<ParamMap, NodeError> + Send + Sync + 'static,
    {
        self.build(Callable::Sync(Arc::new(handler)))
    }

    /// Finish the template with an asynchronous callable.
    pub fn handler_async<F, Fut>(self, handler: F) -> Node
    where
        F: Fn(ParamMap) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<ParamMap, NodeError>> + Send + 'static,
    {
        self.build(Callable::Async(Arc::new(
            move |inputs| -> BoxFuture<'static, Result<ParamMap, NodeError>> {
                Box::pin(handler(inputs))
            },
        )))
    }

    fn build(self, callable: Callable) -> Node {
        Node {
            name: self.name,
            kind: self.kind,
            description: self.description,
            params: self.params,
            output_shape: self.output_shape,
            callable,
            inputs: ParamMap::new(),
            output: None,
            finished: false,
        }
    }
}
