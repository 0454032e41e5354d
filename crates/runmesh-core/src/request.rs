//! Inbound action requests and action configuration.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::id::{RunId, SessionId, WorkerNodeId};
use crate::model::Abstraction;
use crate::plan::ExecutionPlan;

/// Setting that removes systems failing collection from the action's output.
pub const DROP_FAILED: &str = "dropFailed";
/// Setting that disables partitioning of the action's work across nodes.
pub const DISABLE_PARTITIONING: &str = "disablePartitioning";

/// Per-action configuration: the abstraction it works on plus free-form settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionConfiguration {
    #[serde(default)]
    pub abstraction: Option<Abstraction>,
    /// Names of actions whose outputs this action reads.
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub settings: serde_json::Map<String, serde_json::Value>,
}

impl ActionConfiguration {
    pub fn for_abstraction(name: impl Into<String>) -> Self {
        Self {
            abstraction: Some(Abstraction::new(name)),
            ..Self::default()
        }
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.settings.insert(key.into(), value);
        self
    }

    pub fn with_dependency(mut self, action: impl Into<String>) -> Self {
        self.depends_on.push(action.into());
        self
    }

    /// Abstraction name, empty when unset.
    pub fn abstraction_name(&self) -> &str {
        self.abstraction.as_ref().map(|a| a.name.as_str()).unwrap_or("")
    }

    /// Defaults to `true`.
    pub fn drop_failed(&self) -> bool {
        self.settings
            .get(DROP_FAILED)
            .and_then(|v| v.as_bool())
            .unwrap_or(true)
    }

    /// Defaults to `false`. Read by schedulers that split an action's work;
    /// the engine runs every action as a single partition.
    pub fn disable_partitioning(&self) -> bool {
        self.settings
            .get(DISABLE_PARTITIONING)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// Typed view of one setting; `Ok(None)` when absent.
    pub fn setting<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        match self.settings.get(name) {
            None => Ok(None),
            Some(v) => serde_json::from_value(v.clone())
                .map(Some)
                .map_err(|e| Error::Config(format!("setting '{}': {}", name, e))),
        }
    }

    pub fn validate(&self) -> Result<()> {
        for flag in [DROP_FAILED, DISABLE_PARTITIONING] {
            if let Some(v) = self.settings.get(flag) {
                if !v.is_boolean() {
                    return Err(Error::Config(format!("'{}' must be a boolean, got {}", flag, v)));
                }
            }
        }
        if let Some(a) = &self.abstraction {
            if a.name.trim().is_empty() {
                return Err(Error::Config("abstraction name must not be empty".into()));
            }
        }
        Ok(())
    }
}

/// Request to run (or continue) one action of a run on this node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRequest {
    pub run_id: RunId,
    pub session_id: SessionId,
    pub action_name: String,
    pub action_type: String,
    #[serde(default)]
    pub configuration: ActionConfiguration,
    #[serde(default)]
    pub execution_plan: ExecutionPlan,
    pub worker_node_id: WorkerNodeId,
    /// Store the action's systems with `remove_existing = true`.
    #[serde(default)]
    pub replace_executables: bool,
}

impl ActionRequest {
    pub fn new(
        run_id: RunId,
        action_name: impl Into<String>,
        action_type: impl Into<String>,
        worker_node_id: WorkerNodeId,
    ) -> Self {
        Self {
            run_id,
            session_id: SessionId::generate(),
            action_name: action_name.into(),
            action_type: action_type.into(),
            configuration: ActionConfiguration::default(),
            execution_plan: ExecutionPlan::default(),
            worker_node_id,
            replace_executables: false,
        }
    }

    pub fn with_configuration(mut self, configuration: ActionConfiguration) -> Self {
        self.configuration = configuration;
        self
    }

    pub fn with_plan(mut self, plan: ExecutionPlan) -> Self {
        self.execution_plan = plan;
        self
    }

    pub fn with_session(mut self, session_id: SessionId) -> Self {
        self.session_id = session_id;
        self
    }

    pub fn replacing_executables(mut self) -> Self {
        self.replace_executables = true;
        self
    }
}
