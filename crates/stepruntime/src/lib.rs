//! Flow composition and execution runtime
//!
//! This crate provides the node registry, static link checking, flow
//! composition with its lifecycle state machine, the blocking and async
//! execution drivers, and the settings loader.

mod executor;
mod flow;
mod link;
mod registry;
mod settings;

pub use executor::{ExecutionId, StepData, StepTrace};
pub use flow::{Flow, FlowBuilder, FlowHandle, FlowState, MergePolicy, NodeRef, Step, StepRef};
pub use link::{can_link, check_link};
pub use registry::NodeRegistry;
pub use settings::{load_settings, load_settings_if_present, nested_get, SettingsError};
