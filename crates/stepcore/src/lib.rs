//! Core node model for the stepflow engine
//!
//! This crate provides the types every other component depends on: the
//! dynamic value type, the node aggregate with its declared signature, and
//! the error taxonomy. Flow composition and execution live in `stepruntime`.

mod error;
mod node;
mod value;

pub use error::{FlowError, NodeError};
pub use node::{Callable, Forward, Node, NodeBuilder, NodeKind, OutputShape, ParamSpec};
pub use value::{flatten, ParamMap, Value};

/// Result type for flow operations
pub type Result<T> = std::result::Result<T, FlowError>;
