//! Enabled services
//!
//! Every service reported by `service.get_enabled` becomes a running,
//! enabled service.

use anyhow::{bail, Result};
use serde_yaml::{Mapping, Value};

use super::{
    ansible_playbook, ansible_task, kind, mapping, single, string, Describer, FormatOptions,
};

/// Describes services enabled at boot
pub struct ServiceDescriber;

impl ServiceDescriber {
    fn services(value: &Value) -> Result<Vec<&str>> {
        let Some(items) = value.as_sequence() else {
            bail!("service.get_enabled should return a list, got {}", kind(value));
        };
        Ok(items
            .iter()
            .filter_map(Value::as_str)
            .filter(|name| !name.trim().is_empty())
            .collect())
    }
}

impl Describer for ServiceDescriber {
    fn name(&self) -> &'static str {
        "service"
    }

    fn description(&self) -> &'static str {
        "Services enabled at boot (service.get_enabled)"
    }

    fn function(&self) -> &'static str {
        "service.get_enabled"
    }

    fn parse_salt(&self, _minion: &str, value: &Value, _opts: &FormatOptions) -> Result<Value> {
        let mut states = Mapping::new();
        for name in Self::services(value)? {
            states.insert(
                string(name),
                single(
                    "service.running",
                    Value::Sequence(vec![single("enable", Value::Bool(true))]),
                ),
            );
        }
        Ok(Value::Mapping(states))
    }

    fn parse_ansible(&self, _minion: &str, value: &Value, opts: &FormatOptions) -> Result<Value> {
        let tasks = Self::services(value)?
            .into_iter()
            .map(|name| {
                ansible_task(
                    format!("Start and enable {}", name),
                    "ansible.builtin.service",
                    mapping([
                        ("name", string(name)),
                        ("state", string("started")),
                        ("enabled", Value::Bool(true)),
                    ]),
                )
            })
            .collect();
        Ok(ansible_playbook(tasks, opts))
    }
}
