//! System timezone
//!
//! **Salt:**
//! ```yaml
//! America/Los_Angeles:
//!   timezone.system: []
//! ```
//!
//! **Ansible:**
//! ```yaml
//! - hosts: all
//!   tasks:
//!   - name: Set timezone
//!     community.general.timezone:
//!       name: America/Los_Angeles
//! ```

use anyhow::{bail, Result};
use serde_yaml::Value;

use super::{
    ansible_playbook, ansible_task, kind, mapping, single, string, Describer, FormatOptions,
};

/// Describes the configured system timezone
pub struct TimezoneDescriber;

impl TimezoneDescriber {
    fn zone(value: &Value) -> Result<&str> {
        match value.as_str().map(str::trim) {
            Some(zone) if !zone.is_empty() => Ok(zone),
            Some(_) => bail!("timezone.get_zone returned an empty timezone"),
            None => bail!("timezone.get_zone should return a string, got {}", kind(value)),
        }
    }
}

impl Describer for TimezoneDescriber {
    fn name(&self) -> &'static str {
        "timezone"
    }

    fn description(&self) -> &'static str {
        "System timezone (timezone.get_zone)"
    }

    fn function(&self) -> &'static str {
        "timezone.get_zone"
    }

    fn parse_salt(&self, _minion: &str, value: &Value, _opts: &FormatOptions) -> Result<Value> {
        let zone = Self::zone(value)?;
        Ok(single(zone, single("timezone.system", Value::Sequence(vec![]))))
    }

    fn parse_ansible(&self, _minion: &str, value: &Value, opts: &FormatOptions) -> Result<Value> {
        let zone = Self::zone(value)?;
        let task = ansible_task(
            "Set timezone",
            "community.general.timezone",
            mapping([("name", string(zone))]),
        );
        Ok(ansible_playbook(vec![task], opts))
    }
}
