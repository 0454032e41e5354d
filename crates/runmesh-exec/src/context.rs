//! Collaborators: node-wide ones, the per-session set built from them, and
//! the handle returned to callers of `Engine::execute`.

use std::path::PathBuf;
use std::sync::Arc;

use runmesh_core::config::NodeConfig;
use runmesh_core::id::RunId;
use runmesh_core::manifest::ActionManifest;
use runmesh_repo::{ExecutableRepository, ReportRepository};
use runmesh_store::{build_storage_from_config, MemoryStorage, Storage};

use crate::bus::{BroadcastEventBus, EventBus, EventManager};
use crate::error::Result;
use crate::providers::{Benchmark, DataSource, LazyProviders};
use crate::registry::ActionRegistry;
use crate::session::ExecutionSession;
use crate::workspace::{FsWorkspaceProvider, Workspace, WorkspaceProvider};

/// Shared by every session on this node.
#[derive(Clone)]
pub struct NodeServices {
    pub config: NodeConfig,
    pub storage: Arc<dyn Storage>,
    pub workspaces: Arc<dyn WorkspaceProvider>,
    pub action_types: ActionRegistry,
    pub bus: Arc<dyn EventBus>,
    pub data_sources: Arc<LazyProviders<dyn DataSource>>,
    pub benchmarks: Arc<LazyProviders<Benchmark>>,
}

impl NodeServices {
    /// Store selected by `config.storage_config()`, filesystem workspaces
    /// under `config.workspace_root`, an in-process bus.
    pub fn from_config(config: NodeConfig) -> Result<Self> {
        let storage = build_storage_from_config(&config.storage_config())?;
        let workspaces = Arc::new(FsWorkspaceProvider::new(&config.workspace_root));
        let bus = Arc::new(BroadcastEventBus::new(config.event_bus_capacity));
        Ok(Self::with_parts(config, storage, workspaces, bus))
    }

    /// In-memory store; workspaces still live on disk under `workspace_root`.
    pub fn in_memory(workspace_root: impl Into<PathBuf>) -> Self {
        let root = workspace_root.into();
        let config = NodeConfig {
            workspace_root: root.display().to_string(),
            store_uri: Some("memory://".to_string()),
            ..NodeConfig::default()
        };
        Self::with_parts(
            config,
            Arc::new(MemoryStorage::new()),
            Arc::new(FsWorkspaceProvider::new(root)),
            Arc::new(BroadcastEventBus::default()),
        )
    }

    pub fn with_parts(
        config: NodeConfig,
        storage: Arc<dyn Storage>,
        workspaces: Arc<dyn WorkspaceProvider>,
        bus: Arc<dyn EventBus>,
    ) -> Self {
        Self {
            config,
            storage,
            workspaces,
            action_types: ActionRegistry::new(),
            bus,
            data_sources: Arc::new(LazyProviders::empty()),
            benchmarks: Arc::new(LazyProviders::empty()),
        }
    }

    pub fn with_data_sources(mut self, providers: LazyProviders<dyn DataSource>) -> Self {
        self.data_sources = Arc::new(providers);
        self
    }

    pub fn with_benchmarks(mut self, providers: LazyProviders<Benchmark>) -> Self {
        self.benchmarks = Arc::new(providers);
        self
    }

    /// A fresh collaborator set for a new session.
    pub fn session_services(&self, workspace: Workspace) -> SessionServices {
        SessionServices {
            workspace,
            executables: ExecutableRepository::new(Arc::clone(&self.storage)),
            reports: ReportRepository::new(Arc::clone(&self.storage)),
            events: EventManager::new(Arc::clone(&self.bus)),
            actions: self.action_types.for_session(),
            data_sources: self.data_sources.fresh(),
            benchmarks: self.benchmarks.fresh(),
        }
    }
}

/// Collaborators bound to one session.
pub struct SessionServices {
    pub workspace: Workspace,
    pub executables: ExecutableRepository,
    pub reports: ReportRepository,
    pub events: EventManager,
    pub actions: ActionRegistry,
    pub data_sources: LazyProviders<dyn DataSource>,
    pub benchmarks: LazyProviders<Benchmark>,
}

/// Result of `Engine::execute`: the (possibly reused) session and the
/// manifest of the action that just ran.
#[derive(Clone)]
pub struct ExecutionContext {
    session: Arc<ExecutionSession>,
    manifest: ActionManifest,
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("run_id", self.session.run_id())
            .field("manifest", &self.manifest)
            .finish_non_exhaustive()
    }
}

impl ExecutionContext {
    pub fn new(session: Arc<ExecutionSession>, manifest: ActionManifest) -> Self {
        Self { session, manifest }
    }

    pub fn run_id(&self) -> &RunId {
        self.session.run_id()
    }

    pub fn session(&self) -> &Arc<ExecutionSession> {
        &self.session
    }

    pub fn manifest(&self) -> &ActionManifest {
        &self.manifest
    }

    pub fn services(&self) -> &Arc<SessionServices> {
        self.session.services()
    }
}
