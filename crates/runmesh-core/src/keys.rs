//! Composite keys for stored systems and report rows.

use serde::{Deserialize, Serialize};

use crate::id::RunId;
use crate::model::System;

pub const ACTION: &str = "ACTION";
pub const ABSTRACTION: &str = "ABSTRACTION";
pub const SYSTEM: &str = "SYSTEM";
pub const DATASOURCE: &str = "DATASOURCE";
pub const PERMID: &str = "PERMID";
pub const LASTMODIFIED: &str = "LASTMODIFIED";

/// Columns every report table starts with, in table order.
pub const KEY_COLUMNS: [&str; 6] = [ACTION, ABSTRACTION, SYSTEM, DATASOURCE, PERMID, LASTMODIFIED];

/// Identity of one stored system. The tuple is the sole identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExecutableKey {
    pub run_id: RunId,
    pub abstraction: String,
    pub action: String,
    pub system_id: String,
}

impl ExecutableKey {
    pub fn new(
        run_id: RunId,
        abstraction: impl Into<String>,
        action: impl Into<String>,
        system_id: impl Into<String>,
    ) -> Self {
        Self {
            run_id,
            abstraction: abstraction.into(),
            action: action.into(),
            system_id: system_id.into(),
        }
    }
}

/// Identity of one report row (all versions share it).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReportKey {
    pub action: String,
    pub data_source: String,
    pub abstraction: String,
    pub system: String,
    #[serde(default = "no_permutation")]
    pub perm_id: i64,
}

fn no_permutation() -> i64 {
    ReportKey::NO_PERMUTATION
}

impl ReportKey {
    /// Permutation id of reports not tied to a permutation.
    pub const NO_PERMUTATION: i64 = -1;

    pub fn new(
        action: impl Into<String>,
        data_source: impl Into<String>,
        abstraction: impl Into<String>,
        system: impl Into<String>,
    ) -> Self {
        Self {
            action: action.into(),
            data_source: data_source.into(),
            abstraction: abstraction.into(),
            system: system.into(),
            perm_id: Self::NO_PERMUTATION,
        }
    }

    /// Key for a report about `system` produced by `action`.
    pub fn for_system(action: impl Into<String>, abstraction: impl Into<String>, system: &System) -> Self {
        Self::new(action, system.data_source.clone(), abstraction, system.id.clone())
    }

    pub fn with_perm_id(mut self, perm_id: i64) -> Self {
        self.perm_id = perm_id;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_key_defaults_to_no_permutation() {
        let k = ReportKey::new("Crawl", "mvn", "Stack", "s1");
        assert_eq!(k.perm_id, ReportKey::NO_PERMUTATION);

        let parsed: ReportKey = serde_json::from_str(
            r#"{"action":"A","data_source":"d","abstraction":"x","system":"s"}"#,
        )
        .unwrap();
        assert_eq!(parsed.perm_id, -1);
    }

    #[test]
    fn for_system_copies_data_source() {
        let s = System::new("s9", "github");
        let k = ReportKey::for_system("Rank", "Stack", &s).with_perm_id(3);
        assert_eq!(k.data_source, "github");
        assert_eq!(k.system, "s9");
        assert_eq!(k.perm_id, 3);
    }
}
