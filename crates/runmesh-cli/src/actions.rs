//! Plumbing action types available to local script runs.
//!
//! - `Import`: systems listed in the `systems` setting; each system's
//!   attributes are recorded as a report of kind `kind` (default `Attributes`).
//! - `Copy`: the systems an upstream action stored for the same abstraction.
//! - `Filter`: upstream systems whose report row of kind `kind` matches the
//!   `where` predicate; the rest fail collection and are dropped.

use std::sync::Arc;

use async_trait::async_trait;

use runmesh_core::keys::{self, ReportKey};
use runmesh_core::model::{Report, System, SystemStatus};
use runmesh_core::request::ActionConfiguration;
use runmesh_core::types::Scalar;
use runmesh_exec::{
    Action, ActionContext, ActionDescriptor, ActionError, ActionRegistry, CollectResult, Collector,
};
use runmesh_query::{parse_predicate, Predicate};

pub const DEFAULT_REPORT_KIND: &str = "Attributes";

pub fn register_builtins(registry: &ActionRegistry) {
    registry.register(ActionDescriptor::new("Import").local(), |cfg| {
        Ok(Box::new(ImportAction::from_configuration(cfg)?) as Box<dyn Action>)
    });
    registry.register(ActionDescriptor::new("Copy").local(), |cfg| {
        Ok(Box::new(CopyAction {
            from: cfg.setting("from")?,
        }) as Box<dyn Action>)
    });
    registry.register(ActionDescriptor::new("Filter").local().tester(), |cfg| {
        Ok(Box::new(FilterAction::from_configuration(cfg)?) as Box<dyn Action>)
    });
}

/// Upstream action: the `from` setting, else the first declared dependency,
/// else the first parent in the plan.
fn upstream(ctx: &ActionContext, from: &Option<String>) -> Result<String, ActionError> {
    if let Some(name) = from {
        return Ok(name.clone());
    }
    if let Some(name) = ctx.configuration().depends_on.first() {
        return Ok(name.clone());
    }
    ctx.plan()
        .parents(ctx.action_name())
        .first()
        .map(|n| n.name.clone())
        .ok_or_else(|| ActionError::Config(format!("'{}' has no upstream action", ctx.action_name())))
}

/// Copy the upstream systems into `ctx` and signal each one.
fn forward_upstream(ctx: &ActionContext, from: &Option<String>) -> Result<usize, ActionError> {
    let source = upstream(ctx, from)?;
    let abstraction = ctx.configuration().abstraction_name();
    let stored = ctx
        .executable_repository()
        .get(ctx.run_id(), abstraction, &source)?;
    let mut forwarded = 0;
    for mut system in stored.systems {
        if ctx.is_cancelled() {
            return Err(ActionError::Cancelled);
        }
        system.status = SystemStatus::Pending;
        let id = system.id.clone();
        ctx.add_executable(system);
        ctx.fire_success(id);
        forwarded += 1;
    }
    Ok(forwarded)
}

pub struct ImportAction {
    systems: Vec<System>,
    kind: String,
}

impl ImportAction {
    fn from_configuration(cfg: &ActionConfiguration) -> Result<Self, ActionError> {
        Ok(Self {
            systems: cfg.setting("systems")?.unwrap_or_default(),
            kind: cfg
                .setting("kind")?
                .unwrap_or_else(|| DEFAULT_REPORT_KIND.to_string()),
        })
    }
}

#[async_trait]
impl Action for ImportAction {
    async fn execute(&self, ctx: &ActionContext) -> Result<(), ActionError> {
        for system in &self.systems {
            if ctx.is_cancelled() {
                return Err(ActionError::Cancelled);
            }
            ctx.add_executable(system.clone());
            ctx.fire_success(system.id.clone());
        }
        Ok(())
    }

    fn collectors(&self) -> Vec<Arc<dyn Collector>> {
        vec![Arc::new(AttributesCollector {
            kind: self.kind.clone(),
        })]
    }
}

/// Records a system's attributes as one report row.
pub struct AttributesCollector {
    kind: String,
}

#[async_trait]
impl Collector for AttributesCollector {
    fn name(&self) -> &str {
        "attributes"
    }

    async fn collect(&self, ctx: &ActionContext, system_id: &str) -> Result<CollectResult, ActionError> {
        let executables = ctx.executables();
        let Some(system) = executables.get(system_id) else {
            return Ok(CollectResult::Error);
        };
        if system.attributes.is_empty() {
            return Ok(CollectResult::Success);
        }
        let mut report = Report::new();
        for (name, value) in &system.attributes {
            report.set(name.clone(), Scalar::from_json(value));
        }
        let key = ReportKey::for_system(ctx.action_name(), &executables.abstraction, system);
        ctx.report_repository()
            .put_values(ctx.run_id(), &key, &self.kind, &report)?;
        Ok(CollectResult::Success)
    }
}

pub struct CopyAction {
    from: Option<String>,
}

#[async_trait]
impl Action for CopyAction {
    async fn execute(&self, ctx: &ActionContext) -> Result<(), ActionError> {
        forward_upstream(ctx, &self.from).map(|_| ())
    }
}

pub struct FilterAction {
    from: Option<String>,
    kind: String,
    predicate: Predicate,
}

impl FilterAction {
    fn from_configuration(cfg: &ActionConfiguration) -> Result<Self, ActionError> {
        let kind: String = cfg
            .setting("kind")?
            .unwrap_or_else(|| DEFAULT_REPORT_KIND.to_string());
        let text: String = cfg
            .setting("where")?
            .ok_or_else(|| ActionError::Config("Filter requires a 'where' predicate".into()))?;
        let predicate =
            parse_predicate(&text).map_err(|e| ActionError::Config(format!("where: {}", e)))?;
        Ok(Self {
            from: cfg.setting("from")?,
            kind,
            predicate,
        })
    }
}

#[async_trait]
impl Action for FilterAction {
    async fn execute(&self, ctx: &ActionContext) -> Result<(), ActionError> {
        forward_upstream(ctx, &self.from).map(|_| ())
    }

    fn collectors(&self) -> Vec<Arc<dyn Collector>> {
        vec![Arc::new(PredicateCollector {
            kind: self.kind.clone(),
            predicate: self.predicate.clone(),
        })]
    }
}

/// Passes a system when some report row about it satisfies the predicate.
pub struct PredicateCollector {
    kind: String,
    predicate: Predicate,
}

#[async_trait]
impl Collector for PredicateCollector {
    fn name(&self) -> &str {
        "predicate"
    }

    async fn collect(&self, ctx: &ActionContext, system_id: &str) -> Result<CollectResult, ActionError> {
        let scoped = self.predicate.clone().and(Predicate::all_eq([
            (keys::SYSTEM, Scalar::Str(system_id.to_string())),
            (
                keys::ABSTRACTION,
                Scalar::Str(ctx.configuration().abstraction_name().to_string()),
            ),
        ]));
        let hits = ctx
            .report_repository()
            .find(ctx.run_id(), &self.kind, &scoped, &[], Some(1))?;
        Ok(if hits.num_rows() > 0 {
            CollectResult::Success
        } else {
            CollectResult::Error
        })
    }
}
