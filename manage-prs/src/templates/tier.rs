//! Add or repair `common.tier` in `io-package.json`.

use anyhow::Result;
use serde_json::{Value, json};
use tracing::info;

use super::{Invocation, Template, Workspace};
use crate::core::patch::Anchor;

const IO_PACKAGE: &str = "io-package.json";
const VISUALIZATION_TYPES: [&str; 3] = [
    "visualization",
    "visualization-icons",
    "visualization-widgets",
];

#[derive(Debug)]
pub struct AddTier;

/// Tier 3 for visualization adapters, 2 for everything else.
pub fn default_tier(adapter_type: Option<&str>) -> u64 {
    match adapter_type {
        Some(t) if VISUALIZATION_TYPES.contains(&t) => 3,
        _ => 2,
    }
}

fn is_valid_tier(value: &Value) -> bool {
    matches!(value.as_u64(), Some(1..=3))
}

impl Template for AddTier {
    fn name(&self) -> &'static str {
        "W1035-addTier"
    }

    fn description(&self) -> &'static str {
        include_str!("descriptions/W1035-addTier.md")
    }

    fn patch(&self, workspace: &mut Workspace, _invocation: &Invocation) -> Result<()> {
        let Some(doc) = workspace.document(IO_PACKAGE)? else {
            info!("{IO_PACKAGE} does not exist, nothing to do");
            return Ok(());
        };
        let adapter_type = doc.get(&["common", "type"]).ok();
        let tier = default_tier(adapter_type.as_ref().and_then(Value::as_str));

        if let Ok(current) = doc.get(&["common", "tier"]) {
            if is_valid_tier(&current) {
                info!(tier = %current, "tier already valid");
                return Ok(());
            }
            info!(current = %current, tier, "replacing invalid tier");
            doc.set(&["common", "tier"], &json!(tier), &Anchor::End)?;
            return Ok(());
        }

        let anchor = if doc.contains(&["common", "loglevel"]) {
            Anchor::After("loglevel".to_string())
        } else if doc.contains(&["common", "licenseInformation"]) {
            Anchor::Before("licenseInformation".to_string())
        } else if doc.contains(&["common", "license"]) {
            Anchor::Before("license".to_string())
        } else {
            Anchor::End
        };
        doc.set(&["common", "tier"], &json!(tier), &anchor)?;
        info!(tier, "tier added");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::templates::run_template;
    use crate::test_support::{invocation, write_files};

    fn apply(text: &str) -> (bool, String) {
        let temp = tempfile::tempdir().expect("tempdir");
        write_files(temp.path(), &[(IO_PACKAGE, text)]);
        let run = run_template(&AddTier, temp.path(), &invocation("W1035-addTier")).expect("run");
        let out = fs::read_to_string(temp.path().join(IO_PACKAGE)).expect("read");
        (run.result.changed, out)
    }

    #[test]
    fn inserts_after_loglevel() {
        let (changed, out) = apply(
            "{\n    \"common\": {\n        \"type\": \"vis\",\n        \"loglevel\": \"info\",\n        \"mode\": \"daemon\"\n    }\n}\n",
        );
        assert!(changed);
        assert_eq!(
            out,
            "{\n    \"common\": {\n        \"type\": \"vis\",\n        \"loglevel\": \"info\",\n        \"tier\": 2,\n        \"mode\": \"daemon\"\n    }\n}\n"
        );
    }

    #[test]
    fn inserts_before_license_for_visualization() {
        let (_, out) = apply(
            "{\n  \"common\": {\n    \"type\": \"visualization-widgets\",\n    \"license\": \"MIT\"\n  }\n}\n",
        );
        assert_eq!(
            out,
            "{\n  \"common\": {\n    \"type\": \"visualization-widgets\",\n    \"tier\": 3,\n    \"license\": \"MIT\"\n  }\n}\n"
        );
    }

    #[test]
    fn keeps_valid_and_repairs_invalid_tier() {
        let valid = "{\"common\": {\"tier\": 1}}";
        assert_eq!(apply(valid), (false, valid.to_string()));

        let (changed, out) = apply("{\"common\": {\"tier\": 7}}");
        assert!(changed);
        assert_eq!(out, "{\"common\": {\"tier\": 2}}");
    }

    #[test]
    fn missing_io_package_is_not_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let run = run_template(&AddTier, temp.path(), &invocation("W1035-addTier")).expect("run");
        assert!(!run.result.changed);
    }
}
