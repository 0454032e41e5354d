//! Convenient re-exports for downstream crates.

pub use crate::config::{NodeConfig, StorageConfig};
pub use crate::error::{Error, Result};
pub use crate::event::{SessionEvent, SessionEventKind};
pub use crate::id::{InstanceId, RunId, SessionId, WorkerNodeId};
pub use crate::keys::{ExecutableKey, ReportKey};
pub use crate::manifest::{now_millis, ActionManifest};
pub use crate::model::{Abstraction, Report, System, SystemStatus, Systems};
pub use crate::plan::{ActionEdge, ActionNode, ExecutionPlan};
pub use crate::request::{ActionConfiguration, ActionRequest};
pub use crate::schema::{DataType, Field, ReportSchema, Schema};
pub use crate::types::{Column, Scalar, Table};
