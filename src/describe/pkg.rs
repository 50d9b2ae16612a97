//! Installed system packages
//!
//! `pkg.list_pkgs` reports `name: version`, or `name: [version, ...]` when
//! several versions are installed side by side. Salt states pin the first
//! reported version; Ansible tasks only ensure presence.

use anyhow::{bail, Result};
use serde_yaml::Value;

use super::{
    ansible_playbook, ansible_task, kind, mapping, scalar_text, single, string, strings,
    Describer, FormatOptions,
};

const STATE_NAME: &str = "installed_packages";

/// Describes installed system packages
pub struct PkgDescriber;

impl PkgDescriber {
    fn packages(value: &Value) -> Result<Vec<(String, Option<String>)>> {
        let Some(pkgs) = value.as_mapping() else {
            bail!("pkg.list_pkgs should return a mapping, got {}", kind(value));
        };

        let mut packages = Vec::with_capacity(pkgs.len());
        for (name, version) in pkgs {
            let Some(name) = scalar_text(name) else {
                continue;
            };
            let version = match version {
                Value::Sequence(versions) => versions.first().and_then(scalar_text),
                other => scalar_text(other),
            };
            packages.push((name, version));
        }
        Ok(packages)
    }
}

impl Describer for PkgDescriber {
    fn name(&self) -> &'static str {
        "pkg"
    }

    fn description(&self) -> &'static str {
        "Installed system packages (pkg.list_pkgs)"
    }

    fn function(&self) -> &'static str {
        "pkg.list_pkgs"
    }

    fn parse_salt(&self, _minion: &str, value: &Value, _opts: &FormatOptions) -> Result<Value> {
        let pkgs = Self::packages(value)?
            .into_iter()
            .map(|(name, version)| match version {
                Some(version) => single(&name, string(version)),
                None => string(name),
            })
            .collect();
        Ok(single(
            STATE_NAME,
            single("pkg.installed", Value::Sequence(vec![single("pkgs", Value::Sequence(pkgs))])),
        ))
    }

    fn parse_ansible(&self, _minion: &str, value: &Value, opts: &FormatOptions) -> Result<Value> {
        let names = Self::packages(value)?.into_iter().map(|(name, _)| name);
        let task = ansible_task(
            STATE_NAME,
            "ansible.builtin.package",
            mapping([("name", strings(names)), ("state", string("present"))]),
        );
        Ok(ansible_playbook(vec![task], opts))
    }
}
