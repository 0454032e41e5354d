//! Executable repository: the candidate systems each action produced.
//!
//! Layout: `executables/<run>/<action>/<abstraction>/<system-id>`, one JSON
//! document per system. The `ExecutableKey` tuple is the only identity, and
//! writes are whole-value upserts.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use runmesh_core::id::RunId;
use runmesh_core::keys::ExecutableKey;
use runmesh_core::model::{System, Systems};
use runmesh_store::{path, Storage};

use crate::error::{RepoError, Result};

const PREFIX: &str = "executables";

#[derive(Serialize, Deserialize)]
struct StoredSystem {
    abstraction: String,
    #[serde(default)]
    action_instance_id: Option<String>,
    system: System,
}

/// Systems of one action grouped by abstraction, in scan order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionExecutables {
    groups: Vec<Systems>,
}

impl ActionExecutables {
    pub fn get(&self, abstraction: &str) -> Option<&Systems> {
        self.groups.iter().find(|g| g.abstraction == abstraction)
    }

    pub fn abstractions(&self) -> Vec<&str> {
        self.groups.iter().map(|g| g.abstraction.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Systems> {
        self.groups.iter()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    fn entry(&mut self, abstraction: &str) -> &mut Systems {
        let pos = match self.groups.iter().position(|g| g.abstraction == abstraction) {
            Some(pos) => pos,
            None => {
                self.groups.push(Systems::new(abstraction));
                self.groups.len() - 1
            }
        };
        &mut self.groups[pos]
    }
}

impl IntoIterator for ActionExecutables {
    type Item = Systems;
    type IntoIter = std::vec::IntoIter<Systems>;

    fn into_iter(self) -> Self::IntoIter {
        self.groups.into_iter()
    }
}

#[derive(Clone)]
pub struct ExecutableRepository {
    storage: Arc<dyn Storage>,
}

impl ExecutableRepository {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    fn key(key: &ExecutableKey) -> String {
        path::key(
            PREFIX,
            &[
                key.run_id.as_str(),
                key.action.as_str(),
                key.abstraction.as_str(),
                key.system_id.as_str(),
            ],
        )
    }

    fn load(&self, keys: Vec<String>) -> Result<Vec<StoredSystem>> {
        let mut out = Vec::with_capacity(keys.len());
        for k in keys {
            if let Some(bytes) = self.storage.read(&k)? {
                out.push(serde_json::from_slice(&bytes)?);
            }
        }
        Ok(out)
    }

    /// Systems stored for (run, abstraction, action).
    pub fn get(&self, run_id: &RunId, abstraction: &str, action: &str) -> Result<Systems> {
        let dir = path::dir(PREFIX, &[run_id.as_str(), action, abstraction]);
        let mut systems = Systems::new(abstraction);
        for stored in self.load(self.storage.list(&dir)?)? {
            if systems.action_instance_id.is_none() {
                systems.action_instance_id = stored.action_instance_id;
            }
            systems.systems.push(stored.system);
        }
        Ok(systems)
    }

    /// Everything `action` stored in this run, grouped by abstraction.
    pub fn get_all(&self, run_id: &RunId, action: &str) -> Result<ActionExecutables> {
        let dir = path::dir(PREFIX, &[run_id.as_str(), action]);
        let mut grouped = ActionExecutables::default();
        for stored in self.load(self.storage.list(&dir)?)? {
            let group = grouped.entry(&stored.abstraction);
            if group.action_instance_id.is_none() {
                group.action_instance_id = stored.action_instance_id;
            }
            group.systems.push(stored.system);
        }
        Ok(grouped)
    }

    /// Upsert every system under its `ExecutableKey`.
    ///
    /// With `remove_existing`, ids stored earlier for the same
    /// (run, abstraction, action) but absent from `systems` are deleted after
    /// the new values are written. An empty set without `remove_existing` is a
    /// no-op.
    pub fn put(
        &self,
        run_id: &RunId,
        action: &str,
        systems: &Systems,
        remove_existing: bool,
    ) -> Result<()> {
        if systems.is_empty() && !remove_existing {
            return Ok(());
        }

        let stale: Vec<String> = if remove_existing {
            let keep: Vec<&str> = systems.ids();
            self.get(run_id, &systems.abstraction, action)?
                .systems
                .into_iter()
                .map(|s| s.id)
                .filter(|id| !keep.contains(&id.as_str()))
                .collect()
        } else {
            Vec::new()
        };

        for system in &systems.systems {
            let key = ExecutableKey::new(
                run_id.clone(),
                systems.abstraction.clone(),
                action,
                system.id.clone(),
            );
            let doc = StoredSystem {
                abstraction: systems.abstraction.clone(),
                action_instance_id: systems.action_instance_id.clone(),
                system: system.clone(),
            };
            self.storage.write(&Self::key(&key), &serde_json::to_vec(&doc)?)?;
        }

        for id in &stale {
            let key = ExecutableKey::new(run_id.clone(), systems.abstraction.clone(), action, id.clone());
            self.storage.delete(&Self::key(&key))?;
        }

        debug!(
            run_id = %run_id,
            action,
            abstraction = %systems.abstraction,
            written = systems.len(),
            removed = stale.len(),
            "executables stored"
        );
        Ok(())
    }

    /// One named system produced by `action`, under any abstraction.
    pub fn get_by_action_and_id(&self, run_id: &RunId, action: &str, system_id: &str) -> Result<System> {
        let dir = path::dir(PREFIX, &[run_id.as_str(), action]);
        let suffix = format!("/{}", path::segment(system_id));
        let keys: Vec<String> = self
            .storage
            .list(&dir)?
            .into_iter()
            .filter(|k| k.ends_with(&suffix))
            .collect();
        self.load(keys)?
            .into_iter()
            .map(|s| s.system)
            .next()
            .ok_or_else(|| RepoError::NotFound(format!("system '{}' of action '{}' in run {}", system_id, action, run_id)))
    }

    /// Drop every system `action` stored in this run.
    pub fn remove_action(&self, run_id: &RunId, action: &str) -> Result<usize> {
        Ok(self
            .storage
            .delete_prefix(&path::dir(PREFIX, &[run_id.as_str(), action]))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runmesh_store::MemoryStorage;

    fn repo() -> ExecutableRepository {
        ExecutableRepository::new(Arc::new(MemoryStorage::new()))
    }

    fn systems(abstraction: &str, ids: &[&str]) -> Systems {
        Systems::new(abstraction).with_systems(ids.iter().map(|id| System::new(*id, "idx")).collect())
    }

    #[test]
    fn put_then_get_returns_written_set() {
        let repo = repo();
        let run = RunId::new("r1");
        repo.put(&run, "crawl", &systems("Stack", &["s2", "s1"]), false).unwrap();

        let got = repo.get(&run, "Stack", "crawl").unwrap();
        let mut ids = got.ids();
        ids.sort();
        assert_eq!(ids, vec!["s1", "s2"]);
        assert!(repo.get(&run, "Queue", "crawl").unwrap().is_empty());
    }

    #[test]
    fn remove_existing_drops_absent_ids_only() {
        let repo = repo();
        let run = RunId::new("r1");
        repo.put(&run, "crawl", &systems("Stack", &["s1", "s2", "s3"]), true).unwrap();
        repo.put(&run, "crawl", &systems("Stack", &["s2"]), true).unwrap();
        assert_eq!(repo.get(&run, "Stack", "crawl").unwrap().ids(), vec!["s2"]);

        // without the flag nothing is removed
        repo.put(&run, "crawl", &systems("Stack", &["s4"]), false).unwrap();
        assert_eq!(repo.get(&run, "Stack", "crawl").unwrap().len(), 2);

        // an empty replacement clears the group
        repo.put(&run, "crawl", &systems("Stack", &[]), true).unwrap();
        assert!(repo.get(&run, "Stack", "crawl").unwrap().is_empty());
    }

    #[test]
    fn get_all_groups_by_abstraction() {
        let repo = repo();
        let run = RunId::new("r1");
        repo.put(&run, "crawl", &systems("Stack", &["s1"]), false).unwrap();
        repo.put(&run, "crawl", &systems("Queue", &["q1", "q2"]), false).unwrap();
        repo.put(&run, "rank", &systems("Stack", &["s9"]), false).unwrap();

        let all = repo.get_all(&run, "crawl").unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all.get("Queue").unwrap().len(), 2);
        assert_eq!(all.get("Stack").unwrap().ids(), vec!["s1"]);
    }

    #[test]
    fn get_by_action_and_id() {
        let repo = repo();
        let run = RunId::new("r1");
        repo.put(&run, "select", &systems("Stack", &["ref", "other"]), false).unwrap();

        assert_eq!(repo.get_by_action_and_id(&run, "select", "ref").unwrap().id, "ref");
        assert!(matches!(
            repo.get_by_action_and_id(&run, "select", "missing"),
            Err(RepoError::NotFound(_))
        ));
        assert_eq!(repo.remove_action(&run, "select").unwrap(), 2);
    }

    #[test]
    fn ids_with_separators_stay_isolated() {
        let repo = repo();
        let run = RunId::new("r/1");
        repo.put(&run, "crawl", &systems("a/b", &["x/../y"]), false).unwrap();
        assert_eq!(repo.get(&run, "a/b", "crawl").unwrap().ids(), vec!["x/../y"]);
        assert!(repo.get(&RunId::new("r"), "a/b", "crawl").unwrap().is_empty());
    }

    #[test]
    fn unavailable_store_surfaces() {
        let store = MemoryStorage::new();
        let repo = ExecutableRepository::new(Arc::new(store.clone()));
        store.set_available(false);
        assert!(matches!(
            repo.get(&RunId::new("r"), "A", "a"),
            Err(RepoError::StoreUnavailable(_))
        ));
    }
}
