use crate::flow::{Flow, FlowState, MergePolicy, Step};
use chrono::{DateTime, Utc};
use serde::Serialize;
use stepcore::{FlowError, ParamMap, ParamSpec};
use uuid::Uuid;

pub type ExecutionId = Uuid;

/// Input/output record of one executed step
#[derive(Debug, Clone, Serialize)]
pub struct StepTrace {
    pub execution_id: ExecutionId,
    pub recorded_at: DateTime<Utc>,
    pub inputs: StepData,
    pub outputs: StepData,
}

/// Data attached to a step record: one mapping for a single node, one per
/// member for a parallel group
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum StepData {
    Single(ParamMap),
    Group(Vec<ParamMap>),
}

impl StepTrace {
    fn single(execution_id: ExecutionId, inputs: ParamMap, outputs: ParamMap) -> Self {
        Self {
            execution_id,
            recorded_at: Utc::now(),
            inputs: StepData::Single(inputs),
            outputs: StepData::Single(outputs),
        }
    }

    fn group(execution_id: ExecutionId, inputs: Vec<ParamMap>, outputs: Vec<ParamMap>) -> Self {
        Self {
            execution_id,
            recorded_at: Utc::now(),
            inputs: StepData::Group(inputs),
            outputs: StepData::Group(outputs),
        }
    }
}

/// Compute a node's actual call arguments from the accumulated output and
/// the flow settings.
///
/// Only declared parameter names are considered, extra keys are dropped
/// silently. The accumulated output wins key conflicts against settings.
pub(crate) fn resolve_inputs(
    params: &[ParamSpec],
    accumulated: &ParamMap,
    settings: &ParamMap,
) -> ParamMap {
    let mut resolved = ParamMap::new();
    for spec in params {
        if let Some(value) = accumulated
            .get(&spec.name)
            .or_else(|| settings.get(&spec.name))
        {
            resolved.insert(spec.name.clone(), value.clone());
        }
    }
    resolved
}

fn merge_group(policy: MergePolicy, outputs: &[ParamMap]) -> ParamMap {
    match policy {
        MergePolicy::LastOutput => outputs.last().cloned().unwrap_or_default(),
        MergePolicy::Union => {
            let mut merged = ParamMap::new();
            for output in outputs {
                merged.extend(output.clone());
            }
            merged
        }
    }
}

impl Flow {
    /// Execute the flow to completion on the current thread.
    ///
    /// Walks the steps in order, resolving each node's inputs from the
    /// accumulated output and the settings overlay, and returns the final
    /// accumulator. A node failure re-raises with the state left at
    /// `Error`; a pending stop request halts before the next step with the
    /// state left at `Stopped` and the accumulator so far returned.
    pub fn start(&mut self) -> Result<ParamMap, FlowError> {
        let execution_id = ExecutionId::new_v4();
        tracing::info!("Starting flow execution: {}", execution_id);
        self.handle.set_state(FlowState::Running);
        let result = self.drive_blocking(execution_id);
        self.conclude(execution_id, result)
    }

    /// Execute the flow on the async scheduler.
    ///
    /// Same walk and same observable contract as [`Flow::start`], but the
    /// driver suspends at every node invocation instead of blocking.
    pub async fn start_async(&mut self) -> Result<ParamMap, FlowError> {
        let execution_id = ExecutionId::new_v4();
        tracing::info!("Starting flow execution: {}", execution_id);
        self.handle.set_state(FlowState::Running);
        let result = self.drive_async(execution_id).await;
        self.conclude(execution_id, result)
    }

    fn drive_blocking(&mut self, execution_id: ExecutionId) -> Result<ParamMap, FlowError> {
        let mut accumulated = ParamMap::new();

        for index in 0..self.steps.len() {
            // Stop requests are only honored between steps
            if self.handle.stop_requested() {
                tracing::info!("Flow {} stopped before step {}", execution_id, index);
                self.handle.set_state(FlowState::Stopped);
                return Ok(accumulated);
            }

            let trace = match &mut self.steps[index] {
                Step::Single(node) => {
                    let resolved = resolve_inputs(node.parameters(), &accumulated, &self.settings);
                    node.set_input_map(resolved.clone())?;
                    let output = node.run()?;
                    accumulated = output.clone();
                    StepTrace::single(execution_id, resolved, output)
                }
                Step::Group(nodes) => {
                    // Every member resolves against the pre-step accumulator
                    let before = accumulated;
                    let mut member_inputs = Vec::with_capacity(nodes.len());
                    let mut member_outputs = Vec::with_capacity(nodes.len());
                    for node in nodes.iter_mut() {
                        let resolved =
                            resolve_inputs(node.parameters(), &before, &self.settings);
                        node.set_input_map(resolved.clone())?;
                        let output = node.run()?;
                        member_inputs.push(resolved);
                        member_outputs.push(output);
                    }
                    accumulated = merge_group(self.merge, &member_outputs);
                    StepTrace::group(execution_id, member_inputs, member_outputs)
                }
            };
            self.history.push(trace);
        }

        self.handle.set_state(FlowState::Finished);
        Ok(accumulated)
    }

    async fn drive_async(&mut self, execution_id: ExecutionId) -> Result<ParamMap, FlowError> {
        let mut accumulated = ParamMap::new();

        for index in 0..self.steps.len() {
            // Stop requests are only honored between steps
            if self.handle.stop_requested() {
                tracing::info!("Flow {} stopped before step {}", execution_id, index);
                self.handle.set_state(FlowState::Stopped);
                return Ok(accumulated);
            }

            let trace = match &mut self.steps[index] {
                Step::Single(node) => {
                    let resolved = resolve_inputs(node.parameters(), &accumulated, &self.settings);
                    node.set_input_map(resolved.clone())?;
                    let output = node.async_run().await?;
                    accumulated = output.clone();
                    StepTrace::single(execution_id, resolved, output)
                }
                Step::Group(nodes) => {
                    // Every member resolves against the pre-step accumulator
                    let before = accumulated;
                    let mut member_inputs = Vec::with_capacity(nodes.len());
                    let mut member_outputs = Vec::with_capacity(nodes.len());
                    for node in nodes.iter_mut() {
                        let resolved =
                            resolve_inputs(node.parameters(), &before, &self.settings);
                        node.set_input_map(resolved.clone())?;
                        let output = node.async_run().await?;
                        member_inputs.push(resolved);
                        member_outputs.push(output);
                    }
                    accumulated = merge_group(self.merge, &member_outputs);
                    StepTrace::group(execution_id, member_inputs, member_outputs)
                }
            };
            self.history.push(trace);
        }

        self.handle.set_state(FlowState::Finished);
        Ok(accumulated)
    }

    fn conclude(
        &mut self,
        execution_id: ExecutionId,
        result: Result<ParamMap, FlowError>,
    ) -> Result<ParamMap, FlowError> {
        match result {
            Ok(output) => {
                tracing::info!("Flow {} ended in state {:?}", execution_id, self.state());
                Ok(output)
            }
            Err(e) => {
                self.handle.set_state(FlowState::Error);
                tracing::error!("Flow {} failed: {}", execution_id, e);
                Err(e)
            }
        }
    }
}
