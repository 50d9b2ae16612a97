//! Kernel parameters
//!
//! `sysctl.show` returns every parameter as `key: value`. Values come back
//! as strings, numbers or booleans depending on how the minion parsed them;
//! all are written as text.

use anyhow::{bail, Result};
use serde_yaml::{Mapping, Value};

use super::{
    ansible_playbook, ansible_task, kind, mapping, scalar_text, single, string, Describer,
    FormatOptions,
};

/// Describes kernel parameters
pub struct SysctlDescriber;

impl SysctlDescriber {
    fn parameters(value: &Value) -> Result<Vec<(String, String)>> {
        let Some(params) = value.as_mapping() else {
            bail!("sysctl.show should return a mapping, got {}", kind(value));
        };
        Ok(params
            .iter()
            .filter_map(|(key, value)| Some((scalar_text(key)?, scalar_text(value)?)))
            .collect())
    }
}

impl Describer for SysctlDescriber {
    fn name(&self) -> &'static str {
        "sysctl"
    }

    fn description(&self) -> &'static str {
        "Kernel parameters (sysctl.show)"
    }

    fn function(&self) -> &'static str {
        "sysctl.show"
    }

    fn parse_salt(&self, _minion: &str, value: &Value, _opts: &FormatOptions) -> Result<Value> {
        let mut states = Mapping::new();
        for (key, param) in Self::parameters(value)? {
            states.insert(
                string(key),
                single(
                    "sysctl.present",
                    Value::Sequence(vec![single("value", string(param))]),
                ),
            );
        }
        Ok(Value::Mapping(states))
    }

    fn parse_ansible(&self, _minion: &str, value: &Value, opts: &FormatOptions) -> Result<Value> {
        let tasks = Self::parameters(value)?
            .into_iter()
            .map(|(key, param)| {
                ansible_task(
                    format!("Set {}", key),
                    "ansible.posix.sysctl",
                    mapping([
                        ("name", string(key)),
                        ("value", string(param)),
                        ("state", string("present")),
                    ]),
                )
            })
            .collect();
        Ok(ansible_playbook(tasks, opts))
    }
}
