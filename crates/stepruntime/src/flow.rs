use crate::executor::StepTrace;
use crate::link::check_link;
use crate::registry::NodeRegistry;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use stepcore::{FlowError, Node, NodeKind, ParamMap, Value};
use tokio_util::sync::CancellationToken;

/// A node reference used during composition: a registered name to resolve,
/// or a node value used as-is
#[derive(Debug)]
pub enum NodeRef {
    Name(String),
    Node(Node),
}

impl From<&str> for NodeRef {
    fn from(name: &str) -> Self {
        NodeRef::Name(name.to_string())
    }
}

impl From<String> for NodeRef {
    fn from(name: String) -> Self {
        NodeRef::Name(name)
    }
}

impl From<Node> for NodeRef {
    fn from(node: Node) -> Self {
        NodeRef::Node(node)
    }
}

/// One step reference: a single node or a parallel group
#[derive(Debug)]
pub enum StepRef {
    Single(NodeRef),
    Group(Vec<NodeRef>),
}

impl From<&str> for StepRef {
    fn from(name: &str) -> Self {
        StepRef::Single(NodeRef::from(name))
    }
}

impl From<String> for StepRef {
    fn from(name: String) -> Self {
        StepRef::Single(NodeRef::from(name))
    }
}

impl From<Node> for StepRef {
    fn from(node: Node) -> Self {
        StepRef::Single(NodeRef::from(node))
    }
}

impl From<NodeRef> for StepRef {
    fn from(node: NodeRef) -> Self {
        StepRef::Single(node)
    }
}

impl<R: Into<NodeRef>> From<Vec<R>> for StepRef {
    fn from(group: Vec<R>) -> Self {
        StepRef::Group(group.into_iter().map(Into::into).collect())
    }
}

impl<R: Into<NodeRef>, const N: usize> From<[R; N]> for StepRef {
    fn from(group: [R; N]) -> Self {
        StepRef::Group(group.into_iter().map(Into::into).collect())
    }
}

/// A resolved step owned by a flow
#[derive(Debug, Clone)]
pub enum Step {
    Single(Node),
    Group(Vec<Node>),
}

impl Step {
    /// Representative node for link checks against this step. Groups are
    /// represented by their first member; composition guarantees groups
    /// are never empty.
    pub(crate) fn head(&self) -> &Node {
        match self {
            Step::Single(node) => node,
            Step::Group(nodes) => &nodes[0],
        }
    }
}

/// Lifecycle state of a flow run
///
/// `Created` until the first start. A run ends in `Finished` or `Error`,
/// or in `Stopped` once a pending stop request is observed at a step
/// boundary. `Stopping` covers the window between the request and that
/// boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FlowState {
    Created = 0,
    Running = 1,
    Finished = 2,
    Error = 3,
    Stopping = 4,
    Stopped = 5,
}

impl FlowState {
    fn from_u8(raw: u8) -> FlowState {
        match raw {
            0 => FlowState::Created,
            1 => FlowState::Running,
            2 => FlowState::Finished,
            3 => FlowState::Error,
            4 => FlowState::Stopping,
            _ => FlowState::Stopped,
        }
    }
}

/// Cloneable handle for observing and stopping a flow from outside the
/// executing context
///
/// Stopping is cooperative: the flag is only observed at step boundaries,
/// an in-flight step always runs to completion. The flag stays set until
/// the flow observes it, even across a start that begins afterwards.
#[derive(Debug, Clone)]
pub struct FlowHandle {
    state: Arc<AtomicU8>,
    cancel: CancellationToken,
}

impl FlowHandle {
    fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(FlowState::Created as u8)),
            cancel: CancellationToken::new(),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> FlowState {
        FlowState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Request a cooperative halt before the next step starts.
    pub fn stop(&self) {
        self.cancel.cancel();
        self.set_state(FlowState::Stopping);
    }

    pub(crate) fn set_state(&self, state: FlowState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub(crate) fn stop_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// How a parallel group's member outputs become the accumulator for the
/// step that follows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergePolicy {
    /// Only the last member's output flows forward. Earlier outputs are
    /// still recorded in the history.
    #[default]
    LastOutput,
    /// Member outputs folded together in group order, later members
    /// winning key conflicts.
    Union,
}

/// An ordered composition of nodes and parallel groups
///
/// Steps are appended with [`Flow::next`], resolved through the registry
/// and link-checked according to strictness. Execution is driven by
/// [`Flow::start`] or [`Flow::start_async`] in `executor`.
#[derive(Debug)]
pub struct Flow {
    pub(crate) registry: Arc<NodeRegistry>,
    pub(crate) strict: bool,
    pub(crate) description: Option<String>,
    pub(crate) settings: ParamMap,
    pub(crate) merge: MergePolicy,
    pub(crate) steps: Vec<Step>,
    pub(crate) handle: FlowHandle,
    pub(crate) history: Vec<StepTrace>,
}

impl Flow {
    /// A strict, empty flow with no settings overlay.
    pub fn new(registry: Arc<NodeRegistry>) -> Self {
        Self {
            registry,
            strict: true,
            description: None,
            settings: ParamMap::new(),
            merge: MergePolicy::default(),
            steps: Vec::new(),
            handle: FlowHandle::new(),
            history: Vec::new(),
        }
    }

    pub fn builder(registry: Arc<NodeRegistry>) -> FlowBuilder {
        FlowBuilder::new(registry)
    }

    /// Append a step, resolving names through the registry.
    ///
    /// The first appended step must be a start node, bare or heading a
    /// group. Later steps are link-checked against the previous step when
    /// the flow is strict.
    pub fn next(&mut self, step: impl Into<StepRef>) -> Result<&mut Self, FlowError> {
        let check = self.strict;
        self.append(step.into(), check)?;
        Ok(self)
    }

    /// Append a step with the link check forced on, regardless of strictness.
    pub fn next_checked(&mut self, step: impl Into<StepRef>) -> Result<&mut Self, FlowError> {
        self.append(step.into(), true)?;
        Ok(self)
    }

    fn append(&mut self, step: StepRef, check: bool) -> Result<(), FlowError> {
        let resolved = match step {
            StepRef::Single(node) => Step::Single(self.registry.get(node)?),
            StepRef::Group(nodes) => {
                if nodes.is_empty() {
                    return Err(FlowError::InvalidFlow(
                        "a parallel group cannot be empty".to_string(),
                    ));
                }
                Step::Group(self.registry.get_many(nodes)?)
            }
        };

        match self.steps.last() {
            None => {
                if resolved.head().kind() != NodeKind::Start {
                    return Err(FlowError::InvalidFlow(
                        "the first step must be a start node".to_string(),
                    ));
                }
            }
            Some(previous) if check => {
                let upstream = previous.head();
                match &resolved {
                    Step::Single(node) => check_link(upstream, node)?,
                    Step::Group(nodes) => {
                        for node in nodes {
                            check_link(upstream, node)?;
                        }
                    }
                }
            }
            Some(_) => {}
        }

        self.steps.push(resolved);
        Ok(())
    }

    /// Current lifecycle state
    pub fn state(&self) -> FlowState {
        self.handle.state()
    }

    /// Request a cooperative halt; see [`FlowHandle::stop`].
    pub fn stop(&self) {
        self.handle.stop()
    }

    /// A handle for observing or stopping this flow from another task or
    /// thread
    pub fn handle(&self) -> FlowHandle {
        self.handle.clone()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// The immutable settings overlay consulted during input resolution
    pub fn settings(&self) -> &ParamMap {
        &self.settings
    }

    pub fn merge_policy(&self) -> MergePolicy {
        self.merge
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Per-step input/output records, appended as execution proceeds and
    /// kept across runs
    pub fn history(&self) -> &[StepTrace] {
        &self.history
    }
}

/// Builder collecting a flow's shape before resolution
///
/// Steps are resolved and link-checked in order on [`FlowBuilder::build`],
/// so a misconfigured sequence fails before anything executes.
#[derive(Debug)]
pub struct FlowBuilder {
    registry: Arc<NodeRegistry>,
    strict: bool,
    description: Option<String>,
    settings: ParamMap,
    merge: MergePolicy,
    steps: Vec<StepRef>,
}

impl FlowBuilder {
    fn new(registry: Arc<NodeRegistry>) -> Self {
        Self {
            registry,
            strict: true,
            description: None,
            settings: ParamMap::new(),
            merge: MergePolicy::default(),
            steps: Vec::new(),
        }
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Add one settings key, offered to every node during input resolution.
    pub fn setting(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    /// Merge a whole overlay, e.g. one produced by the settings loader.
    pub fn settings(mut self, settings: ParamMap) -> Self {
        self.settings.extend(settings);
        self
    }

    pub fn merge_policy(mut self, merge: MergePolicy) -> Self {
        self.merge = merge;
        self
    }

    /// Append a step reference: a single node or a parallel group.
    pub fn step(mut self, step: impl Into<StepRef>) -> Self {
        self.steps.push(step.into());
        self
    }

    /// Resolve and check the collected steps in order.
    pub fn build(self) -> Result<Flow, FlowError> {
        let mut flow = Flow {
            registry: self.registry,
            strict: self.strict,
            description: self.description,
            settings: self.settings,
            merge: self.merge,
            steps: Vec::new(),
            handle: FlowHandle::new(),
            history: Vec::new(),
        };
        for step in self.steps {
            let check = flow.strict;
            flow.append(step, check)?;
        }
        Ok(flow)
    }
}
