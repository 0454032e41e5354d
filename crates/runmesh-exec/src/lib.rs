#![forbid(unsafe_code)]
//! runmesh-exec: the node-local half of the orchestration substrate.
//!
//! - `SessionRegistry`: one `ExecutionSession` per run on this node.
//! - `Engine`: creates actions from requests, drives their lifecycle, and
//!   persists what they produce through the repositories.
//! - `EventBus`: cluster-wide kill/close notifications, applied locally by
//!   `spawn_session_listener`.
//!
//! Actions, collectors, workspaces, and data sources are pluggable through
//! the traits re-exported below.

pub mod action;
pub mod bus;
pub mod collect;
pub mod context;
pub mod error;
pub mod failpoints;
pub mod metrics;
pub mod providers;
pub mod registry;
pub mod runtime;
pub mod scheduler;
pub mod session;
pub mod workspace;

pub use action::{Action, ActionContext, ActionInstance, ActionState};
pub use bus::{handle_event, spawn_session_listener, BroadcastEventBus, EventBus, EventManager};
pub use collect::{collect_all, CollectResult, Collector};
pub use context::{ExecutionContext, NodeServices, SessionServices};
pub use error::{ActionError, ExecError, Result};
pub use providers::{Benchmark, DataSource, LazyProviders};
pub use registry::{ActionDescriptor, ActionRegistry};
pub use runtime::Engine;
pub use scheduler::CollectionPool;
pub use session::{ExecutionSession, SessionRegistry};
pub use workspace::{FsWorkspaceProvider, Workspace, WorkspaceProvider};
