//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use runmesh_core::id::{RunId, WorkerNodeId};
use runmesh_core::keys::ReportKey;
use runmesh_core::model::{Report, System};
use runmesh_core::plan::ExecutionPlan;
use runmesh_core::request::{ActionConfiguration, ActionRequest};
use runmesh_core::types::Scalar;
use runmesh_exec::{
    Action, ActionContext, ActionDescriptor, ActionError, CollectResult, Collector, Engine,
    NodeServices,
};

pub const VERDICT_KIND: &str = "Verdict";

pub fn systems(ids: &[&str]) -> Vec<System> {
    ids.iter().map(|id| System::new(*id, "fixture")).collect()
}

pub fn engine(workspace_root: &std::path::Path) -> Engine {
    Engine::new(NodeServices::in_memory(workspace_root))
}

pub fn request(run: &str, action: &str, action_type: &str, abstraction: &str) -> ActionRequest {
    ActionRequest::new(
        RunId::new(run),
        action,
        action_type,
        WorkerNodeId::new("node-1"),
    )
    .with_configuration(ActionConfiguration::for_abstraction(abstraction))
    .with_plan(ExecutionPlan::new("study").with_action(action, action_type))
}

/// Poll `cond` every few milliseconds for up to two seconds.
pub async fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..400 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}

/// Action whose behavior is set up by the test.
#[derive(Clone, Default)]
pub struct ScriptedAction {
    pub systems: Vec<System>,
    /// Also fire the action's own instance id.
    pub fire_self: bool,
    /// After firing, block until a stop is requested.
    pub wait_for_cancel: bool,
    pub fail_with: Option<String>,
    pub panic: bool,
    pub post_execute_fails: bool,
    /// Collector verdict `Error` for these ids.
    pub failing: Vec<String>,
    /// Collector returns an error for these ids.
    pub erroring: Vec<String>,
    pub record_reports: bool,
    /// `close` sleeps this long before returning.
    pub slow_close: Option<Duration>,
}

impl ScriptedAction {
    pub fn producing(ids: &[&str]) -> Self {
        Self {
            systems: systems(ids),
            ..Self::default()
        }
    }

    pub fn failing(mut self, ids: &[&str]) -> Self {
        self.failing = ids.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn erroring(mut self, ids: &[&str]) -> Self {
        self.erroring = ids.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Register under `action_type` on the engine's node-wide registry.
    pub fn register(self, engine: &Engine, action_type: &str) {
        engine
            .action_types()
            .register(ActionDescriptor::new(action_type), move |_| {
                Ok(Box::new(self.clone()) as Box<dyn Action>)
            });
    }
}

#[async_trait]
impl Action for ScriptedAction {
    async fn execute(&self, ctx: &ActionContext) -> Result<(), ActionError> {
        if self.panic {
            panic!("scripted panic");
        }
        for system in &self.systems {
            ctx.add_executable(system.clone());
            ctx.fire_success(system.id.clone());
        }
        if self.fire_self {
            ctx.fire_success(ctx.instance_id().to_string());
        }
        if self.wait_for_cancel {
            tokio::select! {
                _ = ctx.cancelled() => return Err(ActionError::Cancelled),
                _ = tokio::time::sleep(Duration::from_secs(10)) => {}
            }
        }
        match &self.fail_with {
            Some(msg) => Err(ActionError::failed(msg.clone())),
            None => Ok(()),
        }
    }

    fn collectors(&self) -> Vec<Arc<dyn Collector>> {
        vec![Arc::new(VerdictCollector {
            failing: self.failing.clone(),
            erroring: self.erroring.clone(),
            record_reports: self.record_reports,
        })]
    }

    async fn post_execute(
        &self,
        ctx: &ActionContext,
        system_id: &str,
        passed: bool,
    ) -> Result<(), ActionError> {
        if self.post_execute_fails {
            return Err(ActionError::failed("post-execute hook exploded"));
        }
        if !passed && ctx.configuration().drop_failed() {
            ctx.remove_executable(system_id);
        }
        Ok(())
    }

    async fn close(&self, _ctx: &ActionContext) -> Result<(), ActionError> {
        if let Some(pause) = self.slow_close {
            tokio::time::sleep(pause).await;
        }
        Ok(())
    }
}

pub struct VerdictCollector {
    pub failing: Vec<String>,
    pub erroring: Vec<String>,
    pub record_reports: bool,
}

#[async_trait]
impl Collector for VerdictCollector {
    fn name(&self) -> &str {
        "verdict"
    }

    async fn collect(&self, ctx: &ActionContext, system_id: &str) -> Result<CollectResult, ActionError> {
        if self.erroring.iter().any(|s| s == system_id) {
            return Err(ActionError::failed("collector exploded"));
        }
        let passed = !self.failing.iter().any(|s| s == system_id);
        if self.record_reports {
            let key = ReportKey::new(
                ctx.action_name(),
                "fixture",
                ctx.configuration().abstraction_name(),
                system_id,
            );
            let report = Report::new().with("passed", Scalar::Bool(passed));
            ctx.report_repository()
                .put_values(ctx.run_id(), &key, VERDICT_KIND, &report)?;
        }
        Ok(if passed {
            CollectResult::Success
        } else {
            CollectResult::Error
        })
    }
}
