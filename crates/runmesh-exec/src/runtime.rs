//! Engine: request in, action run, results persisted.
//!
//! `execute` resolves or creates the run's session, builds the requested
//! action, drives it through `run`, and writes the produced systems through
//! the executable repository. Inside `run`, every completion signal the
//! action fires is collected on the collection pool while `execute` is still
//! going; failures there are logged per system and never abort the action.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use runmesh_core::config::NodeConfig;
use runmesh_core::id::RunId;
use runmesh_core::manifest::{now_millis, ActionManifest};
use runmesh_core::model::SystemStatus;
use runmesh_core::request::ActionRequest;
use runmesh_store::path;

use crate::action::{ActionContext, ActionInstance, ActionState};
use crate::bus::{spawn_session_listener, EventManager};
use crate::collect::{collect_all, CollectResult, Collector};
use crate::context::{ExecutionContext, NodeServices};
use crate::error::{ExecError, Result};
use crate::fail_point;
use crate::metrics::emit_span;
use crate::registry::ActionRegistry;
use crate::scheduler::CollectionPool;
use crate::session::{ExecutionSession, SessionRegistry};

#[derive(Default)]
struct CollectStats {
    collected: AtomicUsize,
    failed: AtomicUsize,
}

pub struct Engine {
    node: NodeServices,
    sessions: Arc<SessionRegistry>,
}

impl Engine {
    pub fn new(node: NodeServices) -> Self {
        let sessions = Arc::new(SessionRegistry::new(node.clone()));
        Self { node, sessions }
    }

    pub fn from_config(config: NodeConfig) -> Result<Self> {
        Ok(Self::new(NodeServices::from_config(config)?))
    }

    pub fn node(&self) -> &NodeServices {
        &self.node
    }

    pub fn config(&self) -> &NodeConfig {
        &self.node.config
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    /// Node-wide action types; register before serving requests.
    pub fn action_types(&self) -> &ActionRegistry {
        &self.node.action_types
    }

    pub fn events(&self) -> EventManager {
        EventManager::new(Arc::clone(&self.node.bus))
    }

    /// Active session of `run_id` on this node.
    pub fn session(&self, run_id: &RunId) -> Result<Arc<ExecutionSession>> {
        self.sessions
            .resolve(run_id)
            .ok_or_else(|| ExecError::SessionNotFound(run_id.clone()))
    }

    /// Handle one action request end to end.
    pub async fn execute(&self, request: ActionRequest) -> Result<ExecutionContext> {
        let session = match self.sessions.resolve(&request.run_id) {
            Some(existing) => {
                // an empty plan means "no change"; otherwise it is the full DAG
                if !request.execution_plan.nodes.is_empty() {
                    self.sessions
                        .update_session(&existing, request.execution_plan.clone());
                }
                existing
            }
            None => self.sessions.create_session(&request).await?,
        };

        let instance = self.create_action(&request, &session)?;
        session.set_current_action(Arc::clone(&instance));
        let manifest = self.run(Arc::clone(&instance)).await;

        self.store_executables(&request, &session, instance.context())?;
        record_manifest(&session, &manifest);
        Ok(ExecutionContext::new(session, manifest))
    }

    /// Build a new instance of the requested action type for `session`.
    pub fn create_action(
        &self,
        request: &ActionRequest,
        session: &ExecutionSession,
    ) -> Result<Arc<ActionInstance>> {
        let services = session.services();
        let (action, instance_id) = services.actions.create(
            &request.action_name,
            &request.action_type,
            &request.configuration,
        )?;
        let ctx = ActionContext::new(
            request.run_id.clone(),
            request.action_name.clone(),
            instance_id,
            request.configuration.clone(),
            session.plan(),
            Arc::clone(services),
        );
        debug!(
            run_id = %request.run_id,
            action = %request.action_name,
            action_type = %request.action_type,
            instance = %ctx.instance_id(),
            "action created"
        );
        Ok(Arc::new(ActionInstance::new(action, ctx)))
    }

    /// Drive one instance through its lifecycle. Never fails: execute and
    /// close errors are logged and reported in the manifest.
    pub async fn run(&self, instance: Arc<ActionInstance>) -> ActionManifest {
        let ctx = instance.context().clone();
        let mut manifest = ActionManifest::new(
            ctx.run_id().clone(),
            ctx.action_name(),
            ctx.instance_id().clone(),
            now_millis(),
        );
        instance.advance(ActionState::Created, ActionState::Executing);
        emit_span(
            "action_start",
            &[
                ("run_id", ctx.run_id().to_string()),
                ("action", ctx.action_name().to_string()),
            ],
        );

        let pool = CollectionPool::from_config(&self.node.config);
        let stats = Arc::new(CollectStats::default());
        let listener = spawn_completion_listener(&instance, pool.clone(), Arc::clone(&stats));

        let executing = {
            let instance = Arc::clone(&instance);
            tokio::spawn(async move { instance.action().execute(instance.context()).await })
        };
        let failure = match executing.await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(e) => Some(format!("execute aborted: {}", e)),
        };
        if let Some(reason) = &failure {
            warn!(run_id = %ctx.run_id(), action = ctx.action_name(), error = %reason, "action execute failed");
        }

        // losing this transition means a stop request already moved us on
        let stopped = !instance.advance(ActionState::Executing, ActionState::Closing);
        let cancelled = stopped || ctx.is_cancelled();
        if let Err(e) = instance.action().close(&ctx).await {
            warn!(run_id = %ctx.run_id(), action = ctx.action_name(), error = %e, "action close failed");
        }
        ctx.close_signals();
        if let Err(e) = listener.await {
            warn!(action = ctx.action_name(), error = %e, "completion listener aborted");
        }
        if !pool.drain().await {
            warn!(
                action = ctx.action_name(),
                in_flight = pool.in_flight(),
                "collections still running after the close timeout"
            );
        }
        instance.set_state(ActionState::Finished);

        manifest.succeeded = failure.is_none();
        manifest.error = failure;
        manifest.collected = stats.collected.load(Ordering::SeqCst);
        manifest.failed_collections = stats.failed.load(Ordering::SeqCst);
        manifest.cancelled = cancelled;
        let manifest = manifest.finish(now_millis());
        emit_span(
            "action_finish",
            &[
                ("run_id", ctx.run_id().to_string()),
                ("action", ctx.action_name().to_string()),
                ("duration_ms", manifest.duration_ms().to_string()),
                ("collected", manifest.collected.to_string()),
            ],
        );
        info!(
            run_id = %ctx.run_id(),
            action = ctx.action_name(),
            succeeded = manifest.succeeded,
            collected = manifest.collected,
            failed = manifest.failed_collections,
            cancelled = manifest.cancelled,
            "action finished"
        );
        manifest
    }

    fn store_executables(
        &self,
        request: &ActionRequest,
        session: &ExecutionSession,
        ctx: &ActionContext,
    ) -> Result<()> {
        let systems = ctx.executables();
        fail_point!("store_executables");
        session.services().executables.put(
            &request.run_id,
            &request.action_name,
            &systems,
            request.replace_executables,
        )?;
        Ok(())
    }

    /// Publish a stop request for `action_name` to every node.
    pub async fn kill(&self, run_id: &RunId, action_name: &str) -> Result<()> {
        self.events().kill_action(run_id, action_name).await
    }

    /// Publish a close for `run_id` to every node.
    pub async fn close_session(&self, run_id: &RunId) -> Result<()> {
        self.events().close_session(run_id).await
    }

    /// Apply bus events to this node's sessions until `shutdown` fires.
    pub fn listen(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        spawn_session_listener(
            Arc::clone(&self.node.bus),
            Arc::clone(&self.sessions),
            shutdown,
        )
    }
}

fn spawn_completion_listener(
    instance: &Arc<ActionInstance>,
    pool: CollectionPool,
    stats: Arc<CollectStats>,
) -> JoinHandle<()> {
    let mut signals = instance.context().open_signals();
    let instance = Arc::clone(instance);
    tokio::spawn(async move {
        let collectors: Arc<[Arc<dyn Collector>]> = instance.action().collectors().into();
        while let Some(system_id) = signals.recv().await {
            if system_id == instance.instance_id().as_str() {
                warn!(action = instance.name(), "completion signal for the action itself skipped");
                continue;
            }
            let (instance, collectors, stats) =
                (Arc::clone(&instance), Arc::clone(&collectors), Arc::clone(&stats));
            pool.spawn(collect_system(instance, collectors, stats, system_id));
        }
    })
}

async fn collect_system(
    instance: Arc<ActionInstance>,
    collectors: Arc<[Arc<dyn Collector>]>,
    stats: Arc<CollectStats>,
    system_id: String,
) {
    fail_point!("collect");
    let ctx = instance.context();
    let passed = collect_all(&collectors, ctx, &system_id).await == CollectResult::Success;
    let status = if passed {
        SystemStatus::Passed
    } else {
        SystemStatus::Failed
    };
    ctx.set_status(&system_id, status);
    stats.collected.fetch_add(1, Ordering::SeqCst);
    if !passed {
        stats.failed.fetch_add(1, Ordering::SeqCst);
    }

    if let Err(e) = instance.action().post_execute(ctx, &system_id, passed).await {
        let err = ExecError::Collection {
            system: system_id.clone(),
            reason: format!("post-execute hook: {}", e),
        };
        warn!(action = instance.name(), error = %err, "post-execute failed");
    }
}

fn record_manifest(session: &ExecutionSession, manifest: &ActionManifest) {
    let name = format!("manifests/{}.json", path::segment(manifest.instance_id.as_str()));
    if let Err(e) = session.services().workspace.write_json(&name, manifest) {
        warn!(run_id = %manifest.run_id, error = %e, "cannot write action manifest");
    }
}
