//! Name-keyed collaborators built on first use.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use once_cell::sync::OnceCell;

use runmesh_core::model::{Abstraction, System};

use crate::error::ActionError;

/// Source of candidate systems for an abstraction (a code index, a corpus).
pub trait DataSource: Send + Sync {
    fn name(&self) -> &str;

    fn systems(&self, abstraction: &Abstraction) -> Result<Vec<System>, ActionError>;
}

/// Named set of abstractions an action can be evaluated against.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Benchmark {
    pub name: String,
    pub abstractions: Vec<Abstraction>,
}

type Factory<T> = dyn Fn(&str) -> Option<Arc<T>> + Send + Sync;

/// Lookup map whose entries are constructed once per name, on demand.
///
/// The factory runs at most once per name even under concurrent lookups;
/// a name the factory rejects is retried on the next lookup.
pub struct LazyProviders<T: ?Sized> {
    factory: Arc<Factory<T>>,
    cells: Mutex<HashMap<String, Arc<OnceCell<Arc<T>>>>>,
}

impl<T: ?Sized> LazyProviders<T> {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn(&str) -> Option<Arc<T>> + Send + Sync + 'static,
    {
        Self {
            factory: Arc::new(factory),
            cells: Mutex::new(HashMap::new()),
        }
    }

    /// Provider that knows no names.
    pub fn empty() -> Self
    where
        T: 'static,
    {
        Self::new(|_| None)
    }

    /// Same factory, no cached entries.
    pub fn fresh(&self) -> Self {
        Self {
            factory: Arc::clone(&self.factory),
            cells: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<T>> {
        let cell = {
            let mut cells = self.cells.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(cells.entry(name.to_string()).or_default())
        };
        cell.get_or_try_init(|| (self.factory)(name).ok_or(()))
            .ok()
            .map(Arc::clone)
    }

    /// Names constructed so far, sorted.
    pub fn loaded(&self) -> Vec<String> {
        let cells = self.cells.lock().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = cells
            .iter()
            .filter(|(_, c)| c.get().is_some())
            .map(|(n, _)| n.clone())
            .collect();
        names.sort();
        names
    }
}

impl<T: ?Sized> fmt::Debug for LazyProviders<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyProviders")
            .field("loaded", &self.loaded())
            .finish_non_exhaustive()
    }
}
