//! Content fingerprints for execution plans.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// blake3 digest of a value's JSON encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn of<T: Serialize>(value: &T) -> Result<Self> {
        let json = serde_json::to_vec(value)?;
        Ok(Self(*blake3::hash(&json).as_bytes()))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// First 12 hex digits, for log lines.
    pub fn short(&self) -> String {
        self.0[..6].iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_is_a_prefix_of_the_full_digest() {
        let fp = Fingerprint::of(&vec!["crawl", "rank"]).unwrap();
        let full = fp.to_string();
        assert_eq!(full.len(), 64);
        assert!(full.starts_with(&fp.short()));
        assert_ne!(fp, Fingerprint::of(&vec!["rank", "crawl"]).unwrap());
    }
}
