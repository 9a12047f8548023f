use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum NodeError {
    #[error("Invalid inputs: {0}")]
    InvalidInput(String),

    #[error("Node '{node}' missing required parameter: {parameter}")]
    MissingParameter { node: String, parameter: String },

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Forwarding into a parallel group is not supported")]
    UnsupportedForward,
}

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Node error: {0}")]
    Node(#[from] NodeError),

    #[error("Node '{0}' is not registered")]
    UnknownNode(String),

    #[error("Output of '{upstream}' cannot satisfy parameter '{parameter}' required by '{downstream}'")]
    LinkIncompatible {
        upstream: String,
        downstream: String,
        parameter: String,
    },

    #[error("Node '{node}' declares an unstructured output, links out of it cannot be checked")]
    UnstructuredOutput { node: String },

    #[error("Invalid flow: {0}")]
    InvalidFlow(String),
}
