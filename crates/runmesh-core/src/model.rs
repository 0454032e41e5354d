//! Systems (evaluated candidates), their per-abstraction containers, and
//! report payloads.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::Scalar;

/// Verdict of the collection step for one system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SystemStatus {
    #[default]
    Pending,
    Passed,
    Failed,
}

/// One evaluated candidate implementation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct System {
    pub id: String,
    /// Where the candidate came from (index, repository, generator, ...).
    pub data_source: String,
    /// Produced code or artifact reference.
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub status: SystemStatus,
}

impl System {
    pub fn new(id: impl Into<String>, data_source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            data_source: data_source.into(),
            code: None,
            attributes: serde_json::Map::new(),
            status: SystemStatus::Pending,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn passed(&self) -> bool {
        self.status == SystemStatus::Passed
    }
}

/// Systems produced by one action for one abstraction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Systems {
    pub abstraction: String,
    /// Instance id of the producing action, if known.
    #[serde(default)]
    pub action_instance_id: Option<String>,
    pub systems: Vec<System>,
}

impl Systems {
    pub fn new(abstraction: impl Into<String>) -> Self {
        Self {
            abstraction: abstraction.into(),
            action_instance_id: None,
            systems: Vec::new(),
        }
    }

    pub fn with_systems(mut self, systems: Vec<System>) -> Self {
        self.systems = systems;
        self
    }

    pub fn len(&self) -> usize {
        self.systems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.systems.iter().map(|s| s.id.as_str()).collect()
    }

    pub fn get(&self, id: &str) -> Option<&System> {
        self.systems.iter().find(|s| s.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut System> {
        self.systems.iter_mut().find(|s| s.id == id)
    }

    /// Insert or replace by id (last writer wins).
    pub fn upsert(&mut self, system: System) {
        match self.get_mut(&system.id) {
            Some(existing) => *existing = system,
            None => self.systems.push(system),
        }
    }

    /// Remove by id. Returns whether something was removed.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.systems.len();
        self.systems.retain(|s| s.id != id);
        before != self.systems.len()
    }
}

/// The problem under study; systems are candidate solutions to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Abstraction {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl Abstraction {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }
}

/// Field values of one report row, checked against its kind's schema on write.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Report {
    values: BTreeMap<String, Scalar>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: impl Into<String>, value: Scalar) -> Self {
        self.values.insert(field.into(), value);
        self
    }

    pub fn set(&mut self, field: impl Into<String>, value: Scalar) {
        self.values.insert(field.into(), value);
    }

    pub fn get(&self, field: &str) -> Option<&Scalar> {
        self.values.get(field)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(|k| k.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn systems_upsert_replaces_by_id() {
        let mut s = Systems::new("Stack");
        s.upsert(System::new("s1", "idx"));
        s.upsert(System::new("s2", "idx"));
        s.upsert(System::new("s1", "other"));
        assert_eq!(s.ids(), vec!["s1", "s2"]);
        assert_eq!(s.get("s1").unwrap().data_source, "other");
    }

    #[test]
    fn systems_remove_reports_presence() {
        let mut s = Systems::new("Stack").with_systems(vec![System::new("s1", "idx")]);
        assert!(s.remove("s1"));
        assert!(!s.remove("s1"));
        assert!(s.is_empty());
    }
}
