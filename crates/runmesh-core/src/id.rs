//! Strongly-typed identifiers used across the cluster.
//!
//! Runs, sessions and worker nodes are addressed by opaque strings that other
//! nodes hand us, so the wrappers are string-backed rather than counters.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! new_id {
    ($name:ident) => {
        #[derive(
            Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Ord, PartialOrd,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(v: impl Into<String>) -> Self {
                Self(v.into())
            }

            /// Fresh random id (uuid v4).
            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(v: &str) -> Self {
                Self(v.to_string())
            }
        }

        impl From<String> for $name {
            fn from(v: String) -> Self {
                Self(v)
            }
        }
    };
}

new_id!(RunId);
new_id!(SessionId);
new_id!(WorkerNodeId);
new_id!(InstanceId);

impl InstanceId {
    /// Instance id of a freshly created action: `<name>_<uuid>`.
    ///
    /// The instance id doubles as the id of the action's own pseudo-system.
    pub fn for_action(action_name: &str) -> Self {
        Self(format!("{}_{}", action_name, Uuid::new_v4()))
    }
}
