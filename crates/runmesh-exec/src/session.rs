//! Node-local session registry: at most one `ExecutionSession` per run.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

use tracing::{debug, info, warn};

use runmesh_core::id::{RunId, SessionId};
use runmesh_core::plan::ExecutionPlan;
use runmesh_core::request::ActionRequest;

use crate::action::ActionInstance;
use crate::context::{NodeServices, SessionServices};
use crate::error::Result;

/// Transient state of one run on this node.
pub struct ExecutionSession {
    run_id: RunId,
    session_id: SessionId,
    plan: RwLock<ExecutionPlan>,
    current_action: Mutex<Option<Arc<ActionInstance>>>,
    services: Arc<SessionServices>,
}

impl ExecutionSession {
    pub fn new(
        run_id: RunId,
        session_id: SessionId,
        plan: ExecutionPlan,
        services: SessionServices,
    ) -> Self {
        Self {
            run_id,
            session_id,
            plan: RwLock::new(plan),
            current_action: Mutex::new(None),
            services: Arc::new(services),
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Snapshot of the current plan.
    pub fn plan(&self) -> ExecutionPlan {
        self.plan.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub(crate) fn replace_plan(&self, plan: ExecutionPlan) -> ExecutionPlan {
        let mut guard = self.plan.write().unwrap_or_else(|e| e.into_inner());
        std::mem::replace(&mut *guard, plan)
    }

    pub fn current_action(&self) -> Option<Arc<ActionInstance>> {
        self.current_action
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub(crate) fn set_current_action(&self, instance: Arc<ActionInstance>) {
        *self.current_action.lock().unwrap_or_else(|e| e.into_inner()) = Some(instance);
    }

    pub fn services(&self) -> &Arc<SessionServices> {
        &self.services
    }
}

impl fmt::Debug for ExecutionSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionSession")
            .field("run_id", &self.run_id)
            .field("session_id", &self.session_id)
            .field("current_action", &self.current_action())
            .finish_non_exhaustive()
    }
}

pub struct SessionRegistry {
    node: NodeServices,
    sessions: RwLock<HashMap<RunId, Arc<ExecutionSession>>>,
}

impl SessionRegistry {
    pub fn new(node: NodeServices) -> Self {
        Self {
            node,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn node(&self) -> &NodeServices {
        &self.node
    }

    /// Local lookup only.
    pub fn resolve(&self, run_id: &RunId) -> Option<Arc<ExecutionSession>> {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        sessions.get(run_id).cloned()
    }

    /// Allocate a workspace and a fresh collaborator set, then register the
    /// session under the request's run. If a concurrent request registered
    /// the run first, that session is returned instead.
    pub async fn create_session(&self, request: &ActionRequest) -> Result<Arc<ExecutionSession>> {
        let workspace = self.node.workspaces.create(request).await?;
        let session = Arc::new(ExecutionSession::new(
            request.run_id.clone(),
            request.session_id.clone(),
            request.execution_plan.clone(),
            self.node.session_services(workspace),
        ));

        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = sessions.get(&request.run_id) {
            debug!(run_id = %request.run_id, "session created concurrently; reusing it");
            return Ok(Arc::clone(existing));
        }
        sessions.insert(request.run_id.clone(), Arc::clone(&session));
        info!(
            run_id = %request.run_id,
            session_id = %request.session_id,
            node = %request.worker_node_id,
            actions = request.execution_plan.nodes.len(),
            "session created"
        );
        Ok(session)
    }

    /// Replace the session's plan with `plan` (the caller's full DAG).
    pub fn update_session(&self, session: &ExecutionSession, plan: ExecutionPlan) {
        let incoming = plan.fingerprint().ok();
        let previous = session.replace_plan(plan);
        let changed = match (previous.fingerprint().ok(), incoming) {
            (Some(a), Some(b)) => a != b,
            _ => true,
        };
        info!(run_id = %session.run_id(), changed, "session plan updated");
    }

    /// Forget the run's session on this node. The store is untouched.
    pub fn close(&self, run_id: &RunId) -> bool {
        let removed = {
            let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
            sessions.remove(run_id)
        };
        match removed {
            Some(_) => {
                info!(run_id = %run_id, "session closed");
                true
            }
            None => {
                debug!(run_id = %run_id, "close for unknown session ignored");
                false
            }
        }
    }

    /// Ask the run's current action to stop if it is `action_name` and still
    /// running. Every mismatch is a silent no-op; kills race with completion.
    pub fn kill_current_action(&self, run_id: &RunId, action_name: &str) -> bool {
        let Some(session) = self.resolve(run_id) else {
            debug!(run_id = %run_id, action = action_name, "kill for unknown session ignored");
            return false;
        };
        let Some(current) = session.current_action() else {
            return false;
        };
        if current.name() != action_name {
            debug!(run_id = %run_id, action = action_name, current = current.name(), "kill for other action ignored");
            return false;
        }
        if !current.request_stop() {
            return false;
        }
        info!(run_id = %run_id, action = action_name, instance = %current.instance_id(), "stop requested");
        true
    }

    /// Run ids with a live session, sorted.
    pub fn list(&self) -> Vec<RunId> {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        let mut ids: Vec<RunId> = sessions.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close every session, e.g. on node shutdown.
    pub fn clear(&self) {
        let drained: Vec<RunId> = {
            let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
            sessions.drain().map(|(k, _)| k).collect()
        };
        if !drained.is_empty() {
            warn!(sessions = drained.len(), "dropping live sessions");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runmesh_core::id::WorkerNodeId;

    fn request(run: &str) -> ActionRequest {
        ActionRequest::new(RunId::new(run), "crawl", "Crawl", WorkerNodeId::new("n1"))
            .with_plan(ExecutionPlan::new("study").with_action("crawl", "Crawl"))
    }

    #[tokio::test]
    async fn resolve_returns_the_created_session() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SessionRegistry::new(NodeServices::in_memory(dir.path()));
        let run = RunId::new("r1");
        assert!(registry.resolve(&run).is_none());

        let created = registry.create_session(&request("r1")).await.unwrap();
        let resolved = registry.resolve(&run).unwrap();
        assert!(Arc::ptr_eq(&created, &resolved));

        let again = registry.create_session(&request("r1")).await.unwrap();
        assert!(Arc::ptr_eq(&created, &again));
        assert_eq!(registry.list(), vec![run.clone()]);
    }

    #[tokio::test]
    async fn update_replaces_plan() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SessionRegistry::new(NodeServices::in_memory(dir.path()));
        let session = registry.create_session(&request("r1")).await.unwrap();
        let extended = session.plan().with_action("rank", "Rank").with_edge("crawl", "rank");
        registry.update_session(&session, extended.clone());
        assert_eq!(session.plan(), extended);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SessionRegistry::new(NodeServices::in_memory(dir.path()));
        registry.create_session(&request("r1")).await.unwrap();
        assert!(registry.close(&RunId::new("r1")));
        assert!(!registry.close(&RunId::new("r1")));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn kill_without_session_or_action_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SessionRegistry::new(NodeServices::in_memory(dir.path()));
        assert!(!registry.kill_current_action(&RunId::new("ghost"), "crawl"));
        registry.create_session(&request("r1")).await.unwrap();
        assert!(!registry.kill_current_action(&RunId::new("r1"), "crawl"));
    }
}
