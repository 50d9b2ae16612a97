//! Configuration management for salt-describe
//!
//! This module provides the configuration structures and loading
//! functionality for output locations and the salt client.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Salt client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaltSettings {
    /// Path to the salt binary
    #[serde(default = "default_salt_binary")]
    pub binary: String,
    /// Seconds to wait for minion returns
    #[serde(default)]
    pub timeout: Option<u64>,
    /// Extra arguments passed to salt before the target, split with shell rules
    #[serde(default)]
    pub extra_args: Option<String>,
}

impl Default for SaltSettings {
    fn default() -> Self {
        Self {
            binary: default_salt_binary(),
            timeout: None,
            extra_args: None,
        }
    }
}

/// Top level describe configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescribeConfig {
    /// Salt file roots per environment; the first root of `saltenv` receives output
    #[serde(default = "default_file_roots")]
    pub file_roots: BTreeMap<String, Vec<PathBuf>>,
    /// Salt environment used for output and the top file
    #[serde(default = "default_saltenv")]
    pub saltenv: String,
    /// Directory receiving generated Ansible playbooks
    #[serde(default = "default_ansible_root")]
    pub ansible_root: PathBuf,
    /// Salt client settings
    #[serde(default)]
    pub salt: SaltSettings,
}

impl Default for DescribeConfig {
    fn default() -> Self {
        Self {
            file_roots: default_file_roots(),
            saltenv: default_saltenv(),
            ansible_root: default_ansible_root(),
            salt: SaltSettings::default(),
        }
    }
}

impl DescribeConfig {
    /// Root directory for generated Salt states in the configured environment
    pub fn salt_root(&self) -> PathBuf {
        self.file_roots
            .get(&self.saltenv)
            .and_then(|roots| roots.first())
            .cloned()
            .unwrap_or_else(|| PathBuf::from("/srv/salt"))
    }
}

fn default_salt_binary() -> String {
    "salt".to_string()
}

fn default_saltenv() -> String {
    "base".to_string()
}

fn default_file_roots() -> BTreeMap<String, Vec<PathBuf>> {
    let mut roots = BTreeMap::new();
    roots.insert(default_saltenv(), vec![PathBuf::from("/srv/salt")]);
    roots
}

fn default_ansible_root() -> PathBuf {
    PathBuf::from("/srv/ansible")
}

/// Resolve the configuration directory
///
/// Precedence: explicit path, then `/etc/salt-describe` if it exists, then
/// the user config directory.
pub fn resolve_config_dir(explicit: Option<PathBuf>) -> PathBuf {
    explicit.unwrap_or_else(|| {
        let system_config = PathBuf::from("/etc/salt-describe");
        if system_config.exists() {
            system_config
        } else {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("salt-describe")
        }
    })
}

/// Load describe configuration from the config directory
pub fn load_describe_config(config_dir: &Path) -> Result<DescribeConfig> {
    let yaml_path = config_dir.join("describe.yml");
    let json_path = config_dir.join("describe.json");
    let toml_path = config_dir.join("describe.toml");

    if yaml_path.exists() {
        let contents = std::fs::read_to_string(&yaml_path)
            .with_context(|| format!("Failed to read {}", yaml_path.display()))?;
        serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", yaml_path.display()))
    } else if json_path.exists() {
        let contents = std::fs::read_to_string(&json_path)
            .with_context(|| format!("Failed to read {}", json_path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", json_path.display()))
    } else if toml_path.exists() {
        let contents = std::fs::read_to_string(&toml_path)
            .with_context(|| format!("Failed to read {}", toml_path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", toml_path.display()))
    } else {
        Ok(DescribeConfig::default())
    }
}
