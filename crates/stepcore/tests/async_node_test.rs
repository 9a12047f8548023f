use stepcore::{Node, NodeError, ParamMap, Value};

/// Initialize tracing for tests
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .with_test_writer()
        .try_init();
}

fn map(pairs: &[(&str, &str)]) -> ParamMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), Value::from(*v)))
        .collect()
}

fn async_rewrite() -> Node {
    Node::regular("rewrite")
        .param("query")
        .returns(["query"])
        .handler_async(|inputs| async move {
            let query = inputs
                .get("query")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();
            tokio::task::yield_now().await;
            Ok(map(&[("query", &format!("{} rewrite", query))]))
        })
}

#[tokio::test]
async fn test_async_run_awaits_async_callable() {
    init_tracing();

    let mut node = async_rewrite();
    assert!(node.callable().is_async());

    node.set_input_map(map(&[("query", "test")])).unwrap();
    let output = node.async_run().await.expect("Should await the callable");
    assert_eq!(output, map(&[("query", "test rewrite")]));
    assert!(node.finished());
    assert_eq!(node.output(), Some(&output));
}

#[tokio::test]
async fn test_async_run_offloads_sync_callable() {
    init_tracing();

    let mut node = Node::regular("sync_step")
        .param("query")
        .returns(["query"])
        .handler(|inputs| Ok(inputs));
    assert!(!node.callable().is_async());

    node.set_input_map(map(&[("query", "test")])).unwrap();
    let output = node
        .async_run()
        .await
        .expect("Should offload to a blocking worker");
    assert_eq!(output, map(&[("query", "test")]));
}

#[tokio::test]
async fn test_async_run_requires_declared_parameters() {
    init_tracing();

    let mut node = async_rewrite();
    let err = node.async_run().await.unwrap_err();
    assert!(matches!(err, NodeError::MissingParameter { .. }));
    assert!(!node.finished());
}

#[test]
fn test_run_drives_async_callable_without_a_reactor() {
    // No yield points that need a runtime, so the blocking bridge completes
    let mut node = Node::regular("pure_async")
        .param("query")
        .returns(["query"])
        .handler_async(|inputs| async move { Ok(inputs) });

    node.set_input_map(map(&[("query", "test")])).unwrap();
    let output = node.run().expect("Should drive the future to completion");
    assert_eq!(output, map(&[("query", "test")]));
}

#[tokio::test]
async fn test_async_error_propagates() {
    init_tracing();

    let mut node = Node::regular("fails")
        .handler_async(|_inputs| async move {
            Err(NodeError::ExecutionFailed("boom".to_string()))
        });

    let err = node.async_run().await.unwrap_err();
    assert!(matches!(err, NodeError::ExecutionFailed(_)));
    assert!(!node.finished(), "A failed run should not finish the node");
    assert!(node.output().is_none());
}
