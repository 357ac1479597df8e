//! Repository registry parsing.
//!
//! The registry is a JSON object mapping adapter keys to metadata. Keys
//! starting with `_` carry registry metadata rather than repositories.

use anyhow::{Context, Result, bail};
use serde_json::Value;

use crate::core::types::RepoRef;

/// One registry entry, in registry order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    pub key: String,
    /// URL of the adapter's `io-package.json`, when present.
    pub meta: Option<String>,
}

impl RegistryEntry {
    pub fn is_reserved(&self) -> bool {
        is_reserved(&self.key)
    }

    /// Owning account, taken from the fourth `/`-separated part of `meta`
    /// (`https://raw.githubusercontent.com/<owner>/...`).
    pub fn owner(&self) -> Option<&str> {
        self.meta.as_deref().and_then(owner_from_meta)
    }

    /// The adapter repository, `<owner>/ioBroker.<key>`.
    pub fn repository(&self) -> Option<RepoRef> {
        self.owner().map(|owner| RepoRef {
            owner: owner.to_string(),
            name: format!("ioBroker.{}", self.key),
        })
    }
}

pub fn is_reserved(key: &str) -> bool {
    key.starts_with('_')
}

pub fn owner_from_meta(meta: &str) -> Option<&str> {
    meta.split('/').nth(3).filter(|owner| !owner.is_empty())
}

/// Parse the registry body, keeping key order.
pub fn parse_registry(body: &str) -> Result<Vec<RegistryEntry>> {
    let value: Value = serde_json::from_str(body).context("parse registry json")?;
    let Value::Object(map) = value else {
        bail!("registry is not a JSON object");
    };
    Ok(map
        .into_iter()
        .map(|(key, entry)| RegistryEntry {
            meta: entry
                .get("meta")
                .and_then(Value::as_str)
                .map(str::to_string),
            key,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"{
        "_repoInfo": {"stable": false},
        "zigbee": {"meta": "https://raw.githubusercontent.com/ioBroker/ioBroker.zigbee/master/io-package.json"},
        "admin": {"meta": "https://raw.githubusercontent.com/acme-labs/ioBroker.admin/master/io-package.json"},
        "broken": {"version": "1.0.0"}
    }"#;

    #[test]
    fn keeps_registry_order() {
        let entries = parse_registry(BODY).expect("parse");
        let keys: Vec<&str> = entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, ["_repoInfo", "zigbee", "admin", "broken"]);
        assert!(entries[0].is_reserved());
    }

    #[test]
    fn derives_owner_and_repository() {
        let entries = parse_registry(BODY).expect("parse");
        assert_eq!(entries[2].owner(), Some("acme-labs"));
        assert_eq!(
            entries[2].repository().map(|r| r.to_string()),
            Some("acme-labs/ioBroker.admin".to_string())
        );
        assert_eq!(entries[3].repository(), None);
    }

    #[test]
    fn rejects_non_object_registry() {
        assert!(parse_registry("[1, 2]").is_err());
    }
}
