//! YAML run scripts: an optional `config:` block plus the action list.
//!
//! ```yaml
//! study: stack-study
//! config:
//!   store_dir: /tmp/runmesh-store
//!   collector_threads: 4
//! actions:
//!   - name: import
//!     type: Import
//!     abstraction: Stack
//!     settings:
//!       systems: [{ id: s1, data_source: local }]
//!   - name: keep
//!     type: Filter
//!     abstraction: Stack
//!     depends_on: [import]
//!     settings: { kind: Attributes, where: "score > 0.5" }
//! ```

use serde::{Deserialize, Serialize};

use runmesh_core::config::NodeConfig;
use runmesh_core::error::{Error, Result};
use runmesh_core::id::{RunId, WorkerNodeId};
use runmesh_core::model::Abstraction;
use runmesh_core::plan::{ActionEdge, ActionNode, ExecutionPlan};
use runmesh_core::request::{ActionConfiguration, ActionRequest};

/// Node settings a script may pin; unset fields keep the env defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScriptConfig {
    #[serde(default)]
    pub worker_node_id: Option<String>,
    #[serde(default)]
    pub workspace_root: Option<String>,
    #[serde(default)]
    pub store_uri: Option<String>,
    #[serde(default)]
    pub store_dir: Option<String>,
    #[serde(default)]
    pub collector_threads: Option<usize>,
    #[serde(default)]
    pub close_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptAction {
    pub name: String,
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(default)]
    pub abstraction: Option<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub settings: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Script {
    pub study: String,
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default)]
    pub config: ScriptConfig,
    pub actions: Vec<ScriptAction>,
}

impl Script {
    pub fn parse(yaml: &str) -> Result<Self> {
        let script: Script =
            serde_yaml::from_str(yaml).map_err(|e| Error::Config(format!("script: {}", e)))?;
        if script.actions.is_empty() {
            return Err(Error::Config("script declares no actions".into()));
        }
        Ok(script)
    }

    pub fn action(&self, name: &str) -> Option<&ScriptAction> {
        self.actions.iter().find(|a| a.name == name)
    }

    /// Dependency graph of the script's actions.
    pub fn plan(&self) -> ExecutionPlan {
        let mut plan = ExecutionPlan::new(self.study.clone());
        for a in &self.actions {
            let abstractions: Vec<String> = a.abstraction.iter().cloned().collect();
            plan.nodes.push(ActionNode {
                name: a.name.clone(),
                action_type: a.action_type.clone(),
                abstractions: abstractions.clone(),
            });
            for dep in &a.depends_on {
                plan.edges.push(ActionEdge {
                    from: dep.clone(),
                    to: a.name.clone(),
                    abstractions: abstractions.clone(),
                });
            }
        }
        plan
    }

    pub fn configuration(&self, action: &ScriptAction) -> ActionConfiguration {
        ActionConfiguration {
            abstraction: action.abstraction.as_ref().map(Abstraction::new),
            depends_on: action.depends_on.clone(),
            settings: action.settings.clone(),
        }
    }

    /// One request per action, in dependency order, each carrying the full plan.
    pub fn requests(&self, run_id: &RunId, node: &WorkerNodeId) -> Result<Vec<ActionRequest>> {
        let plan = self.plan();
        plan.validate()?;
        let mut out = Vec::with_capacity(self.actions.len());
        for n in plan.topological_order()? {
            let action = self
                .action(&n.name)
                .ok_or_else(|| Error::Plan(format!("unknown action '{}'", n.name)))?;
            out.push(
                ActionRequest::new(run_id.clone(), &action.name, &action.action_type, node.clone())
                    .with_configuration(self.configuration(action))
                    .with_plan(plan.clone()),
            );
        }
        Ok(out)
    }
}

/// Script `config:` values override what the environment provided.
pub fn apply_script_config(cfg: &mut NodeConfig, doc: &ScriptConfig) {
    if let Some(id) = &doc.worker_node_id {
        cfg.worker_node_id = id.clone();
    }
    if let Some(root) = &doc.workspace_root {
        cfg.workspace_root = root.clone();
    }
    if let Some(uri) = &doc.store_uri {
        cfg.store_uri = Some(uri.clone());
    }
    if let Some(dir) = &doc.store_dir {
        cfg.store_dir = dir.clone();
    }
    if let Some(n) = doc.collector_threads {
        cfg.collector_threads = n.max(1);
    }
    if let Some(ms) = doc.close_timeout_ms {
        cfg.close_timeout_ms = ms;
    }
}
