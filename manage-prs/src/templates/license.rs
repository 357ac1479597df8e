//! Replace `common.license` with a `common.licenseInformation` object.

use anyhow::Result;
use serde_json::{Value, json};
use tracing::info;

use super::{FleetContext, Invocation, Template, Workspace};
use crate::core::patch::Anchor;

const IO_PACKAGE: &str = "io-package.json";
const PACKAGE: &str = "package.json";
const OFFERED: &str = "offered";

#[derive(Debug)]
pub struct AddLicenseInformation;

fn license_string(value: Option<Value>) -> Option<String> {
    value
        .as_ref()
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl Template for AddLicenseInformation {
    fn name(&self) -> &'static str {
        "W1081-addLicenseInformation"
    }

    fn description(&self) -> &'static str {
        include_str!("descriptions/W1081-addLicenseInformation.md")
    }

    fn patch(&self, workspace: &mut Workspace, _invocation: &Invocation) -> Result<()> {
        let Some(doc) = workspace.document(IO_PACKAGE)? else {
            info!("{IO_PACKAGE} does not exist, nothing to do");
            return Ok(());
        };
        if doc.contains(&["common", "licenseInformation"]) {
            info!("licenseInformation already present");
            return Ok(());
        }
        let common_license = license_string(doc.get(&["common", "license"]).ok());

        let license = match common_license.clone() {
            Some(license) => license,
            None => {
                let from_package = match workspace.document(PACKAGE)? {
                    Some(package) => license_string(package.get(&["license"]).ok()),
                    None => None,
                };
                match from_package {
                    Some(license) => license,
                    None => {
                        info!("no license found in {IO_PACKAGE} or {PACKAGE}, nothing to do");
                        return Ok(());
                    }
                }
            }
        };

        let info_value = json!({ "type": "free", "license": license });
        let doc = workspace.require(IO_PACKAGE)?;
        if common_license.is_some() {
            doc.set(
                &["common", "licenseInformation"],
                &info_value,
                &Anchor::After("license".to_string()),
            )?;
            doc.delete(&["common", "license"])?;
        } else {
            doc.set(&["common", "licenseInformation"], &info_value, &Anchor::End)?;
        }
        info!(%license, "licenseInformation added");
        Ok(())
    }

    fn init(&self, ctx: &mut FleetContext) {
        info!(template = %ctx.template, "license migration walk started");
    }

    fn accepts(&self, ctx: &mut FleetContext) -> bool {
        ctx.bump(OFFERED);
        true
    }

    fn finalize(&self, ctx: &mut FleetContext) {
        let offered = ctx.report.get(OFFERED).copied().unwrap_or(0);
        info!(template = %ctx.template, offered, "license migration walk finished");
    }
}
