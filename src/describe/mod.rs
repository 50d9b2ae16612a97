//! Describers turn the live state reported by minions into declarative
//! documents.
//!
//! Each describer queries one execution function (`pip.freeze`,
//! `firewalld.list_all`, ...) and knows how to reshape a single minion's
//! return into either a Salt state or an Ansible playbook. Describers are
//! kept in a global registry keyed by their slug, which is also the stem of
//! the file they generate.

use anyhow::Result;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::warn;

use crate::remote::TargetType;

mod firewalld;
mod orchestrator;
mod pip;
mod pkg;
mod service;
mod sysctl;
mod timezone;

pub use firewalld::FirewalldDescriber;
pub use orchestrator::{DescribeOrchestrator, DescribeReport, FailedDescriber, SkippedMinion};
pub use pip::PipDescriber;
pub use pkg::PkgDescriber;
pub use service::ServiceDescriber;
pub use sysctl::SysctlDescriber;
pub use timezone::TimezoneDescriber;

/// Declarative dialect generated documents are written in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSystem {
    /// Salt state files (`.sls`)
    #[default]
    Salt,
    /// Ansible playbooks (`.yml`)
    Ansible,
}

impl ConfigSystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigSystem::Salt => "salt",
            ConfigSystem::Ansible => "ansible",
        }
    }
}

impl fmt::Display for ConfigSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dialect specific options passed through to the formatters
#[derive(Debug, Clone, Default)]
pub struct FormatOptions {
    /// Hosts entry for generated Ansible plays
    pub hosts: Option<String>,
    /// Python environment the pip describer queried
    pub bin_env: Option<String>,
}

/// A single describe invocation
#[derive(Debug, Clone)]
pub struct DescribeRequest {
    pub target: String,
    pub target_type: TargetType,
    pub config_system: ConfigSystem,
    pub options: FormatOptions,
}

impl DescribeRequest {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            target_type: TargetType::default(),
            config_system: ConfigSystem::default(),
            options: FormatOptions::default(),
        }
    }

    pub fn with_target_type(mut self, target_type: TargetType) -> Self {
        self.target_type = target_type;
        self
    }

    pub fn with_config_system(mut self, config_system: ConfigSystem) -> Self {
        self.config_system = config_system;
        self
    }

    pub fn with_hosts(mut self, hosts: impl Into<String>) -> Self {
        self.options.hosts = Some(hosts.into());
        self
    }

    pub fn with_bin_env(mut self, bin_env: impl Into<String>) -> Self {
        self.options.bin_env = Some(bin_env.into());
        self
    }
}

/// Maps one category of minion state to declarative documents
pub trait Describer: Send + Sync {
    /// Slug naming the describer and the generated file
    fn name(&self) -> &'static str;

    /// One line summary shown by `salt-describe list`
    fn description(&self) -> &'static str;

    /// Execution function queried on the minions
    fn function(&self) -> &'static str;

    /// Keyword arguments passed to the execution function
    fn kwargs(&self, _request: &DescribeRequest) -> Vec<(String, String)> {
        Vec::new()
    }

    /// Build a Salt state document from one minion's return
    fn parse_salt(&self, minion: &str, value: &Value, opts: &FormatOptions) -> Result<Value>;

    /// Build an Ansible playbook from one minion's return
    fn parse_ansible(&self, minion: &str, value: &Value, opts: &FormatOptions) -> Result<Value>;

    /// Format a minion's return in the requested dialect
    fn render(
        &self,
        config_system: ConfigSystem,
        minion: &str,
        value: &Value,
        opts: &FormatOptions,
    ) -> Result<Value> {
        match config_system {
            ConfigSystem::Salt => self.parse_salt(minion, value, opts),
            ConfigSystem::Ansible => self.parse_ansible(minion, value, opts),
        }
    }
}

// Global describer registry
static DESCRIBER_REGISTRY: Lazy<RwLock<BTreeMap<String, Arc<dyn Describer>>>> = Lazy::new(|| {
    let mut registry = BTreeMap::new();
    DescriberRegistry::initialize_builtin_describers(&mut registry);
    RwLock::new(registry)
});

/// Registry of available describers
pub struct DescriberRegistry;

impl DescriberRegistry {
    fn initialize_builtin_describers(registry: &mut BTreeMap<String, Arc<dyn Describer>>) {
        let builtins: Vec<Arc<dyn Describer>> = vec![
            Arc::new(PipDescriber),
            Arc::new(FirewalldDescriber),
            Arc::new(TimezoneDescriber),
            Arc::new(PkgDescriber),
            Arc::new(ServiceDescriber),
            Arc::new(SysctlDescriber),
        ];
        for describer in builtins {
            registry.insert(describer.name().to_string(), describer);
        }
    }

    /// Register an additional describer, replacing any with the same name
    pub fn register(describer: Arc<dyn Describer>) {
        let mut registry = DESCRIBER_REGISTRY
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        registry.insert(describer.name().to_string(), describer);
    }

    /// Look up a describer by slug
    pub fn get(name: &str) -> Option<Arc<dyn Describer>> {
        let registry = DESCRIBER_REGISTRY
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        registry.get(name).cloned()
    }

    /// All registered describers ordered by name
    pub fn all() -> Vec<Arc<dyn Describer>> {
        let registry = DESCRIBER_REGISTRY
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        registry.values().cloned().collect()
    }

    /// Names of all registered describers
    pub fn names() -> Vec<String> {
        let registry = DESCRIBER_REGISTRY
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        registry.keys().cloned().collect()
    }
}

/// Build a YAML mapping from key/value pairs, keeping their order
pub(crate) fn mapping<'a>(entries: impl IntoIterator<Item = (&'a str, Value)>) -> Value {
    let mut map = Mapping::new();
    for (key, value) in entries {
        map.insert(Value::String(key.to_string()), value);
    }
    Value::Mapping(map)
}

/// A single-key mapping
pub(crate) fn single(key: &str, value: Value) -> Value {
    mapping([(key, value)])
}

pub(crate) fn string(value: impl Into<String>) -> Value {
    Value::String(value.into())
}

pub(crate) fn strings<I, S>(values: I) -> Value
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Value::Sequence(values.into_iter().map(|v| Value::String(v.into())).collect())
}

/// Render a scalar return value as text
pub(crate) fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Short description of a value's shape for error messages
pub(crate) fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a list",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

/// Wrap tasks into a single-play Ansible playbook
///
/// Without a hosts entry the play is still produced, but needs editing
/// before it can run.
pub(crate) fn ansible_playbook(tasks: Vec<Value>, opts: &FormatOptions) -> Value {
    let mut play = Mapping::new();
    match &opts.hosts {
        Some(hosts) => {
            play.insert(string("hosts"), string(hosts.clone()));
        }
        None => {
            warn!(
                "Hosts was not passed. You will need to manually edit the playbook with the hosts entry"
            );
        }
    }
    play.insert(string("tasks"), Value::Sequence(tasks));
    Value::Sequence(vec![Value::Mapping(play)])
}

/// An Ansible task with a name and one module invocation
pub(crate) fn ansible_task(name: impl Into<String>, module: &str, args: Value) -> Value {
    mapping([("name", string(name)), (module, args)])
}
