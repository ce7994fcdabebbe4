//! Call-boundary interceptors that propagate encryption state.
//!
//! The host runtime drives three chains: activity inbound, workflow inbound,
//! and workflow outbound. Each chain is a stack of trait objects where every
//! link delegates to `next`. The encryption links read the posture of the
//! inbound call from its headers and make sure everything the execution sends
//! out (results, activity arguments, signals, children) carries the same
//! posture.
//!
//! A workflow execution holds a single [`EncryptionState`]. It is set by
//! `execute_workflow` and shared with the outbound link created in
//! [`WorkflowInbound::init`], so every outbound call sees it without the
//! workflow code passing it along.

use crate::error::WorkerResult;
use crate::instrumentation::{
    EncryptionState, Value, add_encryption_encoding, mark_objects_to_be_encrypted,
    retrieve_encryption_state,
};
use crate::payload::Headers;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

// ── Inputs ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecuteActivityInput {
    pub activity: String,
    pub headers: Headers,
    pub args: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecuteWorkflowInput {
    pub workflow: String,
    pub headers: Headers,
    pub args: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HandleQueryInput {
    pub query: String,
    pub headers: Headers,
    pub args: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HandleUpdateInput {
    pub update: String,
    pub headers: Headers,
    pub args: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StartActivityInput {
    pub activity: String,
    pub headers: Headers,
    pub args: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StartLocalActivityInput {
    pub activity: String,
    pub headers: Headers,
    pub args: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StartChildWorkflowInput {
    pub workflow: String,
    pub id: String,
    pub headers: Headers,
    pub args: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalChildWorkflowInput {
    pub child_workflow_id: String,
    pub signal: String,
    pub headers: Headers,
    pub args: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalExternalWorkflowInput {
    pub workflow_id: String,
    pub signal: String,
    pub headers: Headers,
    pub args: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContinueAsNewInput {
    pub workflow: String,
    pub headers: Headers,
    pub args: Vec<Value>,
}

/// Outbound inputs whose headers and arguments get instrumented.
trait OutboundInput {
    fn parts_mut(&mut self) -> (&mut Headers, &mut Vec<Value>);
}

macro_rules! impl_outbound_input {
    ($($ty:ty),* $(,)?) => {
        $(
            impl OutboundInput for $ty {
                fn parts_mut(&mut self) -> (&mut Headers, &mut Vec<Value>) {
                    (&mut self.headers, &mut self.args)
                }
            }
        )*
    };
}

impl_outbound_input!(
    StartActivityInput,
    StartLocalActivityInput,
    StartChildWorkflowInput,
    SignalChildWorkflowInput,
    SignalExternalWorkflowInput,
    ContinueAsNewInput,
);

// ── Chain seams ─────────────────────────────────────────────────

/// Inbound activity chain.
#[async_trait]
pub trait ActivityInbound: Send + Sync {
    async fn execute_activity(&self, input: ExecuteActivityInput) -> WorkerResult<Value>;
}

/// Inbound workflow chain, one instance per workflow execution.
#[async_trait]
pub trait WorkflowInbound: Send + Sync {
    /// Called once by the host before any other method, with the outbound
    /// chain built so far. Implementations wrap it and pass it on to `next`.
    fn init(&self, outbound: Arc<dyn WorkflowOutbound>);

    async fn execute_workflow(&self, input: ExecuteWorkflowInput) -> WorkerResult<Value>;

    async fn handle_query(&self, input: HandleQueryInput) -> WorkerResult<Value>;

    async fn handle_update_handler(&self, input: HandleUpdateInput) -> WorkerResult<Value>;
}

/// Outbound workflow chain: every call a workflow makes to the outside world.
#[async_trait]
pub trait WorkflowOutbound: Send + Sync {
    async fn start_activity(&self, input: StartActivityInput) -> WorkerResult<Value>;

    async fn start_local_activity(&self, input: StartLocalActivityInput) -> WorkerResult<Value>;

    async fn start_child_workflow(&self, input: StartChildWorkflowInput) -> WorkerResult<Value>;

    async fn signal_child_workflow(&self, input: SignalChildWorkflowInput) -> WorkerResult<()>;

    async fn signal_external_workflow(&self, input: SignalExternalWorkflowInput)
    -> WorkerResult<()>;

    async fn continue_as_new(&self, input: ContinueAsNewInput) -> WorkerResult<()>;
}

// ── Encryption links ────────────────────────────────────────────

/// Builds the encryption links for each chain.
#[derive(Debug, Clone, Copy, Default)]
pub struct EncryptionInterceptor;

impl EncryptionInterceptor {
    pub fn new() -> Self {
        Self
    }

    pub fn intercept_activity(&self, next: Arc<dyn ActivityInbound>) -> EncryptionActivityInbound {
        EncryptionActivityInbound { next }
    }

    /// Creates the inbound link for a new workflow execution, with fresh
    /// unset state.
    pub fn intercept_workflow(&self, next: Arc<dyn WorkflowInbound>) -> EncryptionWorkflowInbound {
        EncryptionWorkflowInbound {
            next,
            state: Arc::new(RwLock::new(EncryptionState::unset())),
        }
    }
}

/// Wraps an activity's result with the posture of the call that started it.
pub struct EncryptionActivityInbound {
    next: Arc<dyn ActivityInbound>,
}

#[async_trait]
impl ActivityInbound for EncryptionActivityInbound {
    async fn execute_activity(&self, input: ExecuteActivityInput) -> WorkerResult<Value> {
        let state = retrieve_encryption_state(&input.headers);
        let output = self.next.execute_activity(input).await?;
        Ok(output.wrap(&state))
    }
}

/// Holds the execution's encryption state and wraps every result with it.
pub struct EncryptionWorkflowInbound {
    next: Arc<dyn WorkflowInbound>,
    state: Arc<RwLock<EncryptionState>>,
}

impl EncryptionWorkflowInbound {
    /// Snapshot of the state currently held for this execution.
    pub async fn state(&self) -> EncryptionState {
        self.state.read().await.clone()
    }
}

#[async_trait]
impl WorkflowInbound for EncryptionWorkflowInbound {
    fn init(&self, outbound: Arc<dyn WorkflowOutbound>) {
        self.next.init(Arc::new(EncryptionWorkflowOutbound {
            next: outbound,
            state: Arc::clone(&self.state),
        }));
    }

    async fn execute_workflow(&self, input: ExecuteWorkflowInput) -> WorkerResult<Value> {
        let inbound = retrieve_encryption_state(&input.headers);
        self.state.write().await.merge(&inbound);
        debug!(
            workflow = %input.workflow,
            encrypted = inbound.is_active(),
            "workflow encryption state established"
        );

        let output = self.next.execute_workflow(input).await?;
        Ok(output.wrap(&self.state().await))
    }

    async fn handle_query(&self, input: HandleQueryInput) -> WorkerResult<Value> {
        let output = self.next.handle_query(input).await?;
        Ok(output.wrap(&self.state().await))
    }

    async fn handle_update_handler(&self, input: HandleUpdateInput) -> WorkerResult<Value> {
        let output = self.next.handle_update_handler(input).await?;
        Ok(output.wrap(&self.state().await))
    }
}

/// Stamps headers and marks arguments of every outbound call.
pub struct EncryptionWorkflowOutbound {
    next: Arc<dyn WorkflowOutbound>,
    state: Arc<RwLock<EncryptionState>>,
}

impl EncryptionWorkflowOutbound {
    async fn instrument<I: OutboundInput>(&self, mut input: I) -> WorkerResult<I> {
        let state = self.state.read().await.clone();
        let (headers, args) = input.parts_mut();
        *headers = add_encryption_encoding(&state, std::mem::take(headers))?;
        *args = mark_objects_to_be_encrypted(&state, std::mem::take(args));
        Ok(input)
    }
}

#[async_trait]
impl WorkflowOutbound for EncryptionWorkflowOutbound {
    async fn start_activity(&self, input: StartActivityInput) -> WorkerResult<Value> {
        let input = self.instrument(input).await?;
        self.next.start_activity(input).await
    }

    async fn start_local_activity(&self, input: StartLocalActivityInput) -> WorkerResult<Value> {
        let input = self.instrument(input).await?;
        self.next.start_local_activity(input).await
    }

    async fn start_child_workflow(&self, input: StartChildWorkflowInput) -> WorkerResult<Value> {
        let input = self.instrument(input).await?;
        self.next.start_child_workflow(input).await
    }

    async fn signal_child_workflow(&self, input: SignalChildWorkflowInput) -> WorkerResult<()> {
        let input = self.instrument(input).await?;
        self.next.signal_child_workflow(input).await
    }

    async fn signal_external_workflow(
        &self,
        input: SignalExternalWorkflowInput,
    ) -> WorkerResult<()> {
        let input = self.instrument(input).await?;
        self.next.signal_external_workflow(input).await
    }

    async fn continue_as_new(&self, input: ContinueAsNewInput) -> WorkerResult<()> {
        let input = self.instrument(input).await?;
        self.next.continue_as_new(input).await
    }
}
