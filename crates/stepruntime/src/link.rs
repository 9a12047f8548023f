use stepcore::{FlowError, Node, OutputShape};

/// Check that `upstream`'s declared output can satisfy every required
/// parameter of `downstream`.
///
/// Parameters with defaults never need to be satisfied. An upstream with an
/// unstructured output cannot be verified and fails conservatively with
/// [`FlowError::UnstructuredOutput`]; a non-strict flow skips this check
/// entirely and lets the mismatch surface at run time instead.
pub fn check_link(upstream: &Node, downstream: &Node) -> Result<(), FlowError> {
    let fields = match upstream.output_shape() {
        OutputShape::Structured(fields) => fields,
        OutputShape::Unstructured => {
            return Err(FlowError::UnstructuredOutput {
                node: upstream.name().to_string(),
            })
        }
    };
    for spec in downstream.parameters() {
        if spec.is_required() && !fields.contains(&spec.name) {
            return Err(FlowError::LinkIncompatible {
                upstream: upstream.name().to_string(),
                downstream: downstream.name().to_string(),
                parameter: spec.name.clone(),
            });
        }
    }
    Ok(())
}

/// Whether `upstream` can feed `downstream`, as a plain predicate.
pub fn can_link(upstream: &Node, downstream: &Node) -> bool {
    check_link(upstream, downstream).is_ok()
}
