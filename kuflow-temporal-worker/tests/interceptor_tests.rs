//! Tests for the encryption interceptors.

use async_trait::async_trait;
use kuflow_temporal_worker::{
    ActivityInbound, ContinueAsNewInput, ENCODING_ENCRYPTED, EncryptionInterceptor,
    EncryptionState, ExecuteActivityInput, ExecuteWorkflowInput, HEADER_ENCODING_ENCRYPTED_KEY_ID,
    HEADER_ENCODING_KEY, HandleQueryInput, HandleUpdateInput, Headers, JsonPayloadConverter,
    PayloadConverter, SignalChildWorkflowInput, SignalExternalWorkflowInput, StartActivityInput,
    StartChildWorkflowInput, StartLocalActivityInput, Value, WorkerError, WorkerResult,
    WorkflowInbound, WorkflowOutbound, retrieve_encryption_state,
};
use serde_json::json;
use std::sync::{Arc, Mutex};

fn encrypted_headers(key_id: &str) -> Headers {
    let converter = JsonPayloadConverter;
    Headers::from([
        (
            HEADER_ENCODING_KEY.to_string(),
            converter.to_payload(&json!(ENCODING_ENCRYPTED)).unwrap(),
        ),
        (
            HEADER_ENCODING_ENCRYPTED_KEY_ID.to_string(),
            converter.to_payload(&json!(key_id)).unwrap(),
        ),
    ])
}

fn wrapped(value: serde_json::Value, key_id: &str) -> Value {
    Value::from(value).wrap(&EncryptionState::active(key_id))
}

// ── Fakes ───────────────────────────────────────────────────────

struct EchoActivity {
    fail: bool,
}

#[async_trait]
impl ActivityInbound for EchoActivity {
    async fn execute_activity(&self, input: ExecuteActivityInput) -> WorkerResult<Value> {
        if self.fail {
            return Err(WorkerError::Execution("activity failed".to_string()));
        }
        Ok(Value::from(json!(format!("done: {}", input.activity))))
    }
}

/// Records every outbound call as (kind, headers, args).
#[derive(Default)]
struct RecordingOutbound {
    calls: Mutex<Vec<(&'static str, Headers, Vec<Value>)>>,
}

impl RecordingOutbound {
    fn record(&self, kind: &'static str, headers: Headers, args: Vec<Value>) {
        self.calls.lock().unwrap().push((kind, headers, args));
    }

    fn calls(&self) -> Vec<(&'static str, Headers, Vec<Value>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl WorkflowOutbound for RecordingOutbound {
    async fn start_activity(&self, input: StartActivityInput) -> WorkerResult<Value> {
        self.record("start_activity", input.headers, input.args);
        Ok(Value::from(json!("activity result")))
    }

    async fn start_local_activity(&self, input: StartLocalActivityInput) -> WorkerResult<Value> {
        self.record("start_local_activity", input.headers, input.args);
        Ok(Value::from(json!("local result")))
    }

    async fn start_child_workflow(&self, input: StartChildWorkflowInput) -> WorkerResult<Value> {
        self.record("start_child_workflow", input.headers, input.args);
        Ok(Value::from(json!("child handle")))
    }

    async fn signal_child_workflow(&self, input: SignalChildWorkflowInput) -> WorkerResult<()> {
        self.record("signal_child_workflow", input.headers, input.args);
        Ok(())
    }

    async fn signal_external_workflow(
        &self,
        input: SignalExternalWorkflowInput,
    ) -> WorkerResult<()> {
        self.record("signal_external_workflow", input.headers, input.args);
        Ok(())
    }

    async fn continue_as_new(&self, input: ContinueAsNewInput) -> WorkerResult<()> {
        self.record("continue_as_new", input.headers, input.args);
        Ok(())
    }
}

/// A workflow that starts one activity with its first argument and returns
/// the activity's result.
#[derive(Default)]
struct ForwardingWorkflow {
    outbound: Mutex<Option<Arc<dyn WorkflowOutbound>>>,
}

impl ForwardingWorkflow {
    fn outbound(&self) -> Arc<dyn WorkflowOutbound> {
        self.outbound
            .lock()
            .unwrap()
            .clone()
            .expect("init was not called")
    }
}

#[async_trait]
impl WorkflowInbound for ForwardingWorkflow {
    fn init(&self, outbound: Arc<dyn WorkflowOutbound>) {
        *self.outbound.lock().unwrap() = Some(outbound);
    }

    async fn execute_workflow(&self, input: ExecuteWorkflowInput) -> WorkerResult<Value> {
        self.outbound()
            .start_activity(StartActivityInput {
                activity: "ship_order".to_string(),
                headers: Headers::new(),
                args: input.args.into_iter().take(1).collect(),
            })
            .await
    }

    async fn handle_query(&self, input: HandleQueryInput) -> WorkerResult<Value> {
        Ok(Value::from(json!(format!("query {}", input.query))))
    }

    async fn handle_update_handler(&self, input: HandleUpdateInput) -> WorkerResult<Value> {
        if input.update == "reject" {
            return Err(WorkerError::Execution("update rejected".to_string()));
        }
        Ok(Value::from(json!(format!("update {}", input.update))))
    }
}

struct Harness {
    inbound: kuflow_temporal_worker::EncryptionWorkflowInbound,
    workflow: Arc<ForwardingWorkflow>,
    recorder: Arc<RecordingOutbound>,
}

fn workflow_harness() -> Harness {
    let workflow = Arc::new(ForwardingWorkflow::default());
    let recorder = Arc::new(RecordingOutbound::default());

    let inbound = EncryptionInterceptor::new().intercept_workflow(workflow.clone());
    inbound.init(recorder.clone());

    Harness {
        inbound,
        workflow,
        recorder,
    }
}

fn execute_input(headers: Headers) -> ExecuteWorkflowInput {
    ExecuteWorkflowInput {
        workflow: "OrderWorkflow".to_string(),
        headers,
        args: vec![Value::from(json!("hello"))],
    }
}

// ── Activity inbound ────────────────────────────────────────────

#[tokio::test]
async fn activity_result_inherits_encrypted_posture() {
    let activity =
        EncryptionInterceptor::new().intercept_activity(Arc::new(EchoActivity { fail: false }));

    let output = activity
        .execute_activity(ExecuteActivityInput {
            activity: "ship_order".to_string(),
            headers: encrypted_headers("key-42"),
            args: vec![],
        })
        .await
        .unwrap();

    assert_eq!(output, wrapped(json!("done: ship_order"), "key-42"));
}

#[tokio::test]
async fn activity_result_stays_plain_without_encryption() {
    let activity =
        EncryptionInterceptor::new().intercept_activity(Arc::new(EchoActivity { fail: false }));

    let output = activity
        .execute_activity(ExecuteActivityInput {
            activity: "ship_order".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(output, Value::from(json!("done: ship_order")));
}

#[tokio::test]
async fn activity_failure_propagates_unchanged() {
    let activity =
        EncryptionInterceptor::new().intercept_activity(Arc::new(EchoActivity { fail: true }));

    let err = activity
        .execute_activity(ExecuteActivityInput {
            headers: encrypted_headers("key-42"),
            ..Default::default()
        })
        .await
        .unwrap_err();

    assert!(matches!(err, WorkerError::Execution(ref msg) if msg == "activity failed"));
}

// ── Workflow inbound ────────────────────────────────────────────

#[tokio::test]
async fn workflow_adopts_inbound_state_and_wraps_result() {
    let harness = workflow_harness();

    let output = harness
        .inbound
        .execute_workflow(execute_input(encrypted_headers("key-42")))
        .await
        .unwrap();

    assert_eq!(output, wrapped(json!("activity result"), "key-42"));
    assert_eq!(harness.inbound.state().await, EncryptionState::active("key-42"));
}

#[tokio::test]
async fn workflow_without_encryption_stays_plain() {
    let harness = workflow_harness();

    let output = harness
        .inbound
        .execute_workflow(execute_input(Headers::new()))
        .await
        .unwrap();

    assert_eq!(output, Value::from(json!("activity result")));

    let calls = harness.recorder.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].1.is_empty());
    assert_eq!(calls[0].2, vec![Value::from(json!("hello"))]);
}

#[tokio::test]
async fn later_plain_execution_clears_state() {
    let harness = workflow_harness();

    harness
        .inbound
        .execute_workflow(execute_input(encrypted_headers("key-42")))
        .await
        .unwrap();
    let output = harness
        .inbound
        .execute_workflow(execute_input(Headers::new()))
        .await
        .unwrap();

    assert_eq!(output, Value::from(json!("activity result")));
    assert_eq!(harness.inbound.state().await, EncryptionState::unset());
}

#[tokio::test]
async fn query_and_update_use_held_state() {
    let harness = workflow_harness();

    let before = harness
        .inbound
        .handle_query(HandleQueryInput {
            query: "status".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(before, Value::from(json!("query status")));

    harness
        .inbound
        .execute_workflow(execute_input(encrypted_headers("key-42")))
        .await
        .unwrap();

    // Plain headers on a query do not change the established posture.
    let query = harness
        .inbound
        .handle_query(HandleQueryInput {
            query: "status".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(query, wrapped(json!("query status"), "key-42"));

    let update = harness
        .inbound
        .handle_update_handler(HandleUpdateInput {
            update: "add_line".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(update, wrapped(json!("update add_line"), "key-42"));
    assert_eq!(harness.inbound.state().await, EncryptionState::active("key-42"));
}

#[tokio::test]
async fn update_failure_propagates_unchanged() {
    let harness = workflow_harness();

    let err = harness
        .inbound
        .handle_update_handler(HandleUpdateInput {
            update: "reject".to_string(),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, WorkerError::Execution(_)));
}

// ── Workflow outbound ───────────────────────────────────────────

#[tokio::test]
async fn started_activity_carries_headers_and_wrapped_args() {
    let harness = workflow_harness();

    harness
        .inbound
        .execute_workflow(execute_input(encrypted_headers("key-42")))
        .await
        .unwrap();

    let calls = harness.recorder.calls();
    assert_eq!(calls.len(), 1);
    let (kind, headers, args) = &calls[0];
    assert_eq!(*kind, "start_activity");
    assert_eq!(retrieve_encryption_state(headers), EncryptionState::active("key-42"));
    assert_eq!(args, &vec![wrapped(json!("hello"), "key-42")]);
}

#[tokio::test]
async fn every_outbound_call_is_instrumented() {
    let harness = workflow_harness();
    harness
        .inbound
        .execute_workflow(execute_input(encrypted_headers("key-9")))
        .await
        .unwrap();

    let outbound = harness.workflow.outbound();
    let args = || vec![Value::from(json!({"n": 1}))];

    outbound
        .start_local_activity(StartLocalActivityInput {
            activity: "reserve".to_string(),
            headers: Headers::new(),
            args: args(),
        })
        .await
        .unwrap();
    outbound
        .start_child_workflow(StartChildWorkflowInput {
            workflow: "Child".to_string(),
            id: "child-1".to_string(),
            headers: Headers::new(),
            args: args(),
        })
        .await
        .unwrap();
    outbound
        .signal_child_workflow(SignalChildWorkflowInput {
            child_workflow_id: "child-1".to_string(),
            signal: "go".to_string(),
            headers: Headers::new(),
            args: args(),
        })
        .await
        .unwrap();
    outbound
        .signal_external_workflow(SignalExternalWorkflowInput {
            workflow_id: "other".to_string(),
            signal: "ping".to_string(),
            headers: Headers::new(),
            args: args(),
        })
        .await
        .unwrap();
    outbound
        .continue_as_new(ContinueAsNewInput {
            workflow: "OrderWorkflow".to_string(),
            headers: Headers::new(),
            args: args(),
        })
        .await
        .unwrap();

    let calls = harness.recorder.calls();
    let kinds: Vec<_> = calls.iter().map(|(kind, _, _)| *kind).collect();
    assert_eq!(
        kinds,
        vec![
            "start_activity",
            "start_local_activity",
            "start_child_workflow",
            "signal_child_workflow",
            "signal_external_workflow",
            "continue_as_new",
        ]
    );
    for (kind, headers, args) in &calls[1..] {
        assert_eq!(
            retrieve_encryption_state(headers),
            EncryptionState::active("key-9"),
            "{kind} headers"
        );
        assert_eq!(args, &vec![wrapped(json!({"n": 1}), "key-9")], "{kind} args");
    }
}

#[tokio::test]
async fn outbound_before_execution_is_untouched() {
    let harness = workflow_harness();

    let existing = Headers::from([(
        "trace-id".to_string(),
        JsonPayloadConverter.to_payload(&json!("t-1")).unwrap(),
    )]);
    harness
        .workflow
        .outbound()
        .signal_external_workflow(SignalExternalWorkflowInput {
            workflow_id: "other".to_string(),
            signal: "ping".to_string(),
            headers: existing.clone(),
            args: vec![Value::from(json!(0))],
        })
        .await
        .unwrap();

    let calls = harness.recorder.calls();
    assert_eq!(calls[0].1, existing);
    assert_eq!(calls[0].2, vec![Value::from(json!(0))]);
}

#[tokio::test]
async fn workflow_executions_do_not_share_state() {
    let interceptor = EncryptionInterceptor::new();
    let first = interceptor.intercept_workflow(Arc::new(ForwardingWorkflow::default()));
    let second = interceptor.intercept_workflow(Arc::new(ForwardingWorkflow::default()));
    first.init(Arc::new(RecordingOutbound::default()));
    second.init(Arc::new(RecordingOutbound::default()));

    first
        .execute_workflow(execute_input(encrypted_headers("key-42")))
        .await
        .unwrap();

    assert_eq!(first.state().await, EncryptionState::active("key-42"));
    assert_eq!(second.state().await, EncryptionState::unset());
}
