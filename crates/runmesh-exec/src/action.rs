//! Actions, their per-instance context, and the instance state machine.
//!
//! An `ActionInstance` moves `Created -> Executing -> Closing -> Finished`
//! exactly once; a later invocation of the same action name gets a new
//! instance. Stop requests only flip the cancellation token (and move an
//! executing instance to `Closing`); the action decides when to return.
//! Once `execute` has returned there is nothing to stop and requests are
//! refused.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use runmesh_core::id::{InstanceId, RunId};
use runmesh_core::model::{System, SystemStatus, Systems};
use runmesh_core::plan::ExecutionPlan;
use runmesh_core::request::ActionConfiguration;
use runmesh_repo::{ExecutableRepository, ReportRepository};

use crate::collect::Collector;
use crate::context::SessionServices;
use crate::error::ActionError;

/// Pluggable unit of work. Implementations own the domain logic; the engine
/// owns the lifecycle around it.
#[async_trait]
pub trait Action: Send + Sync {
    /// Do the work. Call `ctx.fire_success(id)` for each system that is ready
    /// to be collected, and poll `ctx.is_cancelled()` to honor stop requests.
    async fn execute(&self, ctx: &ActionContext) -> Result<(), ActionError>;

    /// Collectors evaluating each fired system, run in order.
    fn collectors(&self) -> Vec<Arc<dyn Collector>> {
        Vec::new()
    }

    /// Called after each system's collection with the verdict. By default a
    /// failed system is dropped from the executables when `dropFailed` is on.
    async fn post_execute(
        &self,
        ctx: &ActionContext,
        system_id: &str,
        passed: bool,
    ) -> Result<(), ActionError> {
        if !passed && ctx.configuration().drop_failed() && ctx.remove_executable(system_id) {
            debug!(action = ctx.action_name(), system = system_id, "dropped failed system");
        }
        Ok(())
    }

    /// Wait for background work the action started itself.
    async fn close(&self, _ctx: &ActionContext) -> Result<(), ActionError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ActionState {
    Created = 0,
    Executing = 1,
    Closing = 2,
    Finished = 3,
}

impl ActionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ActionState::Created,
            1 => ActionState::Executing,
            2 => ActionState::Closing,
            _ => ActionState::Finished,
        }
    }
}

struct ContextInner {
    run_id: RunId,
    action_name: String,
    instance_id: InstanceId,
    configuration: ActionConfiguration,
    plan: ExecutionPlan,
    services: Arc<SessionServices>,
    token: CancellationToken,
    executables: Mutex<Systems>,
    signals: Mutex<Option<mpsc::UnboundedSender<String>>>,
}

/// Everything an action instance sees while it runs. Cheap to clone.
#[derive(Clone)]
pub struct ActionContext {
    inner: Arc<ContextInner>,
}

impl ActionContext {
    pub fn new(
        run_id: RunId,
        action_name: impl Into<String>,
        instance_id: InstanceId,
        configuration: ActionConfiguration,
        plan: ExecutionPlan,
        services: Arc<SessionServices>,
    ) -> Self {
        let mut executables = Systems::new(configuration.abstraction_name());
        executables.action_instance_id = Some(instance_id.to_string());
        Self {
            inner: Arc::new(ContextInner {
                run_id,
                action_name: action_name.into(),
                instance_id,
                configuration,
                plan,
                services,
                token: CancellationToken::new(),
                executables: Mutex::new(executables),
                signals: Mutex::new(None),
            }),
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.inner.run_id
    }

    pub fn action_name(&self) -> &str {
        &self.inner.action_name
    }

    pub fn instance_id(&self) -> &InstanceId {
        &self.inner.instance_id
    }

    pub fn configuration(&self) -> &ActionConfiguration {
        &self.inner.configuration
    }

    /// Plan snapshot taken when the instance was created.
    pub fn plan(&self) -> &ExecutionPlan {
        &self.inner.plan
    }

    pub fn services(&self) -> &Arc<SessionServices> {
        &self.inner.services
    }

    pub fn executable_repository(&self) -> &ExecutableRepository {
        &self.inner.services.executables
    }

    pub fn report_repository(&self) -> &ReportRepository {
        &self.inner.services.reports
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Resolves once a stop was requested.
    pub async fn cancelled(&self) {
        self.inner.token.cancelled().await
    }

    pub fn child_token(&self) -> CancellationToken {
        self.inner.token.child_token()
    }

    pub(crate) fn cancel(&self) {
        self.inner.token.cancel();
    }

    /// Signal that `system_id` is ready for collection. Returns `false` when
    /// the engine is no longer listening (the instance was closed).
    pub fn fire_success(&self, system_id: impl Into<String>) -> bool {
        let system_id = system_id.into();
        let signals = self.inner.signals.lock().unwrap_or_else(|e| e.into_inner());
        match signals.as_ref() {
            Some(tx) => tx.send(system_id).is_ok(),
            None => {
                debug!(action = %self.inner.action_name, system = %system_id, "completion signal after close ignored");
                false
            }
        }
    }

    pub(crate) fn open_signals(&self) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.inner.signals.lock().unwrap_or_else(|e| e.into_inner()) = Some(tx);
        rx
    }

    pub(crate) fn close_signals(&self) {
        self.inner
            .signals
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
    }

    fn with_executables<R>(&self, f: impl FnOnce(&mut Systems) -> R) -> R {
        let mut guard = self.inner.executables.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    /// Snapshot of the systems produced so far.
    pub fn executables(&self) -> Systems {
        self.with_executables(|s| s.clone())
    }

    /// Replace the produced systems. The abstraction defaults to the
    /// configured one and the instance id is always stamped.
    pub fn set_executables(&self, mut systems: Systems) {
        if systems.abstraction.is_empty() {
            systems.abstraction = self.inner.configuration.abstraction_name().to_string();
        }
        systems.action_instance_id = Some(self.inner.instance_id.to_string());
        self.with_executables(|s| *s = systems);
    }

    pub fn add_executable(&self, system: System) {
        self.with_executables(|s| s.upsert(system));
    }

    pub fn remove_executable(&self, system_id: &str) -> bool {
        self.with_executables(|s| s.remove(system_id))
    }

    /// Record a collection verdict; `false` if the system is not (or no
    /// longer) among the executables.
    pub fn set_status(&self, system_id: &str, status: SystemStatus) -> bool {
        self.with_executables(|s| match s.get_mut(system_id) {
            Some(system) => {
                system.status = status;
                true
            }
            None => false,
        })
    }
}

impl fmt::Debug for ActionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionContext")
            .field("run_id", &self.inner.run_id)
            .field("action_name", &self.inner.action_name)
            .field("instance_id", &self.inner.instance_id)
            .finish_non_exhaustive()
    }
}

/// One live action: the pluggable implementation plus its context and state.
pub struct ActionInstance {
    action: Arc<dyn Action>,
    context: ActionContext,
    state: AtomicU8,
}

impl ActionInstance {
    pub fn new(action: Box<dyn Action>, context: ActionContext) -> Self {
        Self {
            action: Arc::from(action),
            context,
            state: AtomicU8::new(ActionState::Created as u8),
        }
    }

    pub fn name(&self) -> &str {
        self.context.action_name()
    }

    pub fn instance_id(&self) -> &InstanceId {
        self.context.instance_id()
    }

    pub fn context(&self) -> &ActionContext {
        &self.context
    }

    pub fn action(&self) -> &Arc<dyn Action> {
        &self.action
    }

    pub fn state(&self) -> ActionState {
        ActionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_finished(&self) -> bool {
        self.state() == ActionState::Finished
    }

    pub(crate) fn advance(&self, from: ActionState, to: ActionState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub(crate) fn set_state(&self, to: ActionState) {
        self.state.store(to as u8, Ordering::SeqCst);
    }

    /// Ask the action to stop. Returns `false` once `execute` has returned
    /// (`Closing` or `Finished`), when there is nothing left to stop.
    pub fn request_stop(&self) -> bool {
        match self.state() {
            ActionState::Created => {}
            ActionState::Executing => {
                if !self.advance(ActionState::Executing, ActionState::Closing) {
                    return false;
                }
            }
            ActionState::Closing | ActionState::Finished => return false,
        }
        self.context.cancel();
        true
    }
}

impl fmt::Debug for ActionInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionInstance")
            .field("name", &self.name())
            .field("instance_id", self.instance_id())
            .field("state", &self.state())
            .finish()
    }
}
