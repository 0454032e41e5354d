//! Action type registry: factories by type name, plus the instance history
//! of one session.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

use tracing::debug;

use runmesh_core::id::InstanceId;
use runmesh_core::request::ActionConfiguration;

use crate::action::Action;
use crate::error::{ActionError, ExecError, Result};

pub type ActionFactory =
    Arc<dyn Fn(&ActionConfiguration) -> std::result::Result<Box<dyn Action>, ActionError> + Send + Sync>;

/// Static facts about an action type.
///
/// The engine itself only reads `action_type`. The other fields are
/// placement hints kept for schedulers and tools built on the registry
/// (see `ActionRegistry::descriptor`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionDescriptor {
    pub action_type: String,
    /// Runs only on the node that received the request.
    pub local: bool,
    /// Evaluates systems (as opposed to producing them).
    pub tester: bool,
    /// Upper bound on partitions when the work is split; `None` = unbounded.
    pub partitioning_max: Option<usize>,
}

impl ActionDescriptor {
    pub fn new(action_type: impl Into<String>) -> Self {
        Self {
            action_type: action_type.into(),
            ..Self::default()
        }
    }

    pub fn local(mut self) -> Self {
        self.local = true;
        self
    }

    pub fn tester(mut self) -> Self {
        self.tester = true;
        self
    }

    pub fn partitioning_max(mut self, max: usize) -> Self {
        self.partitioning_max = Some(max.max(1));
        self
    }
}

struct Registered {
    descriptor: ActionDescriptor,
    factory: ActionFactory,
}

/// Cloning shares both the registered types and the history; `for_session`
/// shares the types with an empty history.
#[derive(Clone, Default)]
pub struct ActionRegistry {
    types: Arc<RwLock<HashMap<String, Registered>>>,
    history: Arc<Mutex<BTreeMap<String, Vec<InstanceId>>>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&self, descriptor: ActionDescriptor, factory: F)
    where
        F: Fn(&ActionConfiguration) -> std::result::Result<Box<dyn Action>, ActionError>
            + Send
            + Sync
            + 'static,
    {
        let mut types = self.types.write().unwrap_or_else(|e| e.into_inner());
        debug!(action_type = %descriptor.action_type, "action type registered");
        types.insert(
            descriptor.action_type.clone(),
            Registered {
                descriptor,
                factory: Arc::new(factory),
            },
        );
    }

    pub fn contains(&self, action_type: &str) -> bool {
        let types = self.types.read().unwrap_or_else(|e| e.into_inner());
        types.contains_key(action_type)
    }

    pub fn descriptor(&self, action_type: &str) -> Option<ActionDescriptor> {
        let types = self.types.read().unwrap_or_else(|e| e.into_inner());
        types.get(action_type).map(|r| r.descriptor.clone())
    }

    /// Registered type names, sorted.
    pub fn types(&self) -> Vec<String> {
        let types = self.types.read().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = types.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn for_session(&self) -> Self {
        Self {
            types: Arc::clone(&self.types),
            history: Arc::default(),
        }
    }

    /// Validate the configuration and build a new action of `action_type`.
    pub fn create(
        &self,
        name: &str,
        action_type: &str,
        configuration: &ActionConfiguration,
    ) -> Result<(Box<dyn Action>, InstanceId)> {
        let creation_error = |reason: String| ExecError::ActionCreation {
            name: name.to_string(),
            action_type: action_type.to_string(),
            reason,
        };

        let factory = {
            let types = self.types.read().unwrap_or_else(|e| e.into_inner());
            match types.get(action_type) {
                Some(r) => Arc::clone(&r.factory),
                None => return Err(creation_error("unknown action type".to_string())),
            }
        };
        configuration
            .validate()
            .map_err(|e| creation_error(e.to_string()))?;
        let action = factory(configuration).map_err(|e| creation_error(e.to_string()))?;

        let instance_id = InstanceId::for_action(name);
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(name.to_string())
            .or_default()
            .push(instance_id.clone());
        Ok((action, instance_id))
    }

    /// Instance ids created under `name`, oldest first.
    pub fn instances(&self, name: &str) -> Vec<InstanceId> {
        let history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        history.get(name).cloned().unwrap_or_default()
    }
}

impl fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("types", &self.types())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionContext;
    use async_trait::async_trait;
    use serde_json::json;

    struct Noop;

    #[async_trait]
    impl Action for Noop {
        async fn execute(&self, _ctx: &ActionContext) -> std::result::Result<(), ActionError> {
            Ok(())
        }
    }

    fn registry() -> ActionRegistry {
        let r = ActionRegistry::new();
        r.register(ActionDescriptor::new("Noop").local(), |_| {
            Ok(Box::new(Noop) as Box<dyn Action>)
        });
        r.register(ActionDescriptor::new("Picky"), |cfg| {
            match cfg.setting::<u32>("limit")? {
                Some(_) => Ok(Box::new(Noop) as Box<dyn Action>),
                None => Err(ActionError::Config("'limit' is required".into())),
            }
        });
        r
    }

    #[test]
    fn create_records_instances() {
        let r = registry();
        let cfg = ActionConfiguration::default();
        let (_, first) = r.create("crawl", "Noop", &cfg).unwrap();
        let (_, second) = r.create("crawl", "Noop", &cfg).unwrap();
        assert_ne!(first, second);
        assert!(first.as_str().starts_with("crawl_"));
        assert_eq!(r.instances("crawl"), vec![first, second]);
        assert!(r.for_session().instances("crawl").is_empty());
        assert!(r.for_session().contains("Noop"));
    }

    #[test]
    fn creation_errors() {
        let r = registry();
        let cfg = ActionConfiguration::default();
        assert!(matches!(
            r.create("x", "Missing", &cfg),
            Err(ExecError::ActionCreation { .. })
        ));
        assert!(matches!(
            r.create("x", "Picky", &cfg),
            Err(ExecError::ActionCreation { .. })
        ));
        let bad = ActionConfiguration::default().with_setting("dropFailed", json!(3));
        assert!(matches!(
            r.create("x", "Noop", &bad),
            Err(ExecError::ActionCreation { .. })
        ));
        let ok = ActionConfiguration::default().with_setting("limit", json!(2));
        assert!(r.create("x", "Picky", &ok).is_ok());
        assert!(r.instances("Missing").is_empty());
    }

    #[test]
    fn descriptors() {
        let r = registry();
        assert!(r.descriptor("Noop").unwrap().local);
        assert_eq!(r.descriptor("Picky").unwrap().partitioning_max, None);
        assert_eq!(r.types(), vec!["Noop", "Picky"]);
        assert_eq!(ActionDescriptor::new("T").partitioning_max(0).partitioning_max, Some(1));
    }
}
