//! Installed pip libraries
//!
//! Queries `pip.freeze` and pins every reported requirement.
//!
//! # Examples
//!
//! **Salt:**
//! ```yaml
//! installed_pip_libraries:
//!   pip.installed:
//!   - pkgs:
//!     - requests==2.31.0
//!     - urllib3==2.0.7
//! ```
//!
//! **Ansible:**
//! ```yaml
//! - hosts: webservers
//!   tasks:
//!   - name: installed_pip_libraries
//!     ansible.builtin.pip:
//!       name:
//!       - requests==2.31.0
//!       - urllib3==2.0.7
//! ```

use anyhow::{bail, Result};
use serde_yaml::Value;

use super::{
    ansible_playbook, ansible_task, kind, mapping, single, string, strings, Describer,
    DescribeRequest, FormatOptions,
};

const STATE_NAME: &str = "installed_pip_libraries";

/// Describes installed Python libraries
pub struct PipDescriber;

impl PipDescriber {
    fn requirements(value: &Value) -> Result<Vec<String>> {
        let Some(items) = value.as_sequence() else {
            bail!("pip.freeze should return a list, got {}", kind(value));
        };
        Ok(items
            .iter()
            .filter_map(|item| item.as_str())
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }
}

impl Describer for PipDescriber {
    fn name(&self) -> &'static str {
        "pip"
    }

    fn description(&self) -> &'static str {
        "Installed pip libraries (pip.freeze)"
    }

    fn function(&self) -> &'static str {
        "pip.freeze"
    }

    fn kwargs(&self, request: &DescribeRequest) -> Vec<(String, String)> {
        request
            .options
            .bin_env
            .iter()
            .map(|env| ("bin_env".to_string(), env.clone()))
            .collect()
    }

    fn parse_salt(&self, _minion: &str, value: &Value, opts: &FormatOptions) -> Result<Value> {
        let mut args = vec![single("pkgs", strings(Self::requirements(value)?))];
        if let Some(bin_env) = &opts.bin_env {
            args.push(single("bin_env", string(bin_env.clone())));
        }
        Ok(single(STATE_NAME, single("pip.installed", Value::Sequence(args))))
    }

    fn parse_ansible(&self, _minion: &str, value: &Value, opts: &FormatOptions) -> Result<Value> {
        let task = ansible_task(
            STATE_NAME,
            "ansible.builtin.pip",
            mapping([("name", strings(Self::requirements(value)?))]),
        );
        Ok(ansible_playbook(vec![task], opts))
    }
}
