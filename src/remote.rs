//! Remote execution against managed minions
//!
//! Describers never talk to minions directly. They ask a [`RemoteExecutor`]
//! to run one execution function on a target and get back a [`FactResult`]
//! keyed by minion id. The default executor shells out to the `salt` CLI on
//! the master:
//!
//! ```text
//! salt --out=json --static -L web1,web2 pip.freeze bin_env=/opt/venv
//! ```

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::fmt;
use tokio::process::Command;
use tracing::debug;

use crate::config::SaltSettings;

/// Raw values returned by a remote function, keyed by minion id
pub type FactResult = BTreeMap<String, Value>;

/// How a target expression selects minions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum TargetType {
    /// Shell-style glob on minion id
    #[default]
    Glob,
    /// Perl-compatible regex on minion id
    Pcre,
    /// Comma separated list of minion ids
    List,
    /// Grain glob (`os:Ubuntu`)
    Grain,
    /// Grain regex
    GrainPcre,
    /// Pillar glob
    Pillar,
    /// Pillar regex
    PillarPcre,
    /// Nodegroup defined on the master
    Nodegroup,
    /// Range cluster expression
    Range,
    /// Compound matcher
    Compound,
    /// Subnet or IP address
    Ipcidr,
}

impl TargetType {
    /// The `salt` CLI flag selecting this matcher, if any
    pub fn cli_flag(&self) -> Option<&'static str> {
        match self {
            TargetType::Glob => None,
            TargetType::Pcre => Some("-E"),
            TargetType::List => Some("-L"),
            TargetType::Grain => Some("-G"),
            TargetType::GrainPcre => Some("-P"),
            TargetType::Pillar => Some("-I"),
            TargetType::PillarPcre => Some("-J"),
            TargetType::Nodegroup => Some("-N"),
            TargetType::Range => Some("-R"),
            TargetType::Compound => Some("-C"),
            TargetType::Ipcidr => Some("-S"),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::Glob => "glob",
            TargetType::Pcre => "pcre",
            TargetType::List => "list",
            TargetType::Grain => "grain",
            TargetType::GrainPcre => "grain_pcre",
            TargetType::Pillar => "pillar",
            TargetType::PillarPcre => "pillar_pcre",
            TargetType::Nodegroup => "nodegroup",
            TargetType::Range => "range",
            TargetType::Compound => "compound",
            TargetType::Ipcidr => "ipcidr",
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runs an execution function on the minions matched by a target
#[async_trait::async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Execute `function` with keyword arguments on `target`
    async fn execute(
        &self,
        target: &str,
        target_type: TargetType,
        function: &str,
        kwargs: &[(String, String)],
    ) -> Result<FactResult>;
}

/// Executor backed by the `salt` command line client
#[derive(Debug, Clone)]
pub struct SaltCliExecutor {
    settings: SaltSettings,
}

impl SaltCliExecutor {
    pub fn new(settings: SaltSettings) -> Self {
        Self { settings }
    }

    /// Build the argument vector passed to the salt binary
    pub fn build_args(
        &self,
        target: &str,
        target_type: TargetType,
        function: &str,
        kwargs: &[(String, String)],
    ) -> Result<Vec<String>> {
        let mut args = vec!["--out=json".to_string(), "--static".to_string()];

        if let Some(timeout) = self.settings.timeout {
            args.push(format!("--timeout={}", timeout));
        }

        if let Some(extra) = &self.settings.extra_args {
            let split = shlex::split(extra)
                .with_context(|| format!("Invalid salt extra_args: {}", extra))?;
            args.extend(split);
        }

        if let Some(flag) = target_type.cli_flag() {
            args.push(flag.to_string());
        }
        args.push(target.to_string());
        args.push(function.to_string());

        for (key, value) in kwargs {
            args.push(format!("{}={}", key, value));
        }

        Ok(args)
    }
}

#[async_trait::async_trait]
impl RemoteExecutor for SaltCliExecutor {
    async fn execute(
        &self,
        target: &str,
        target_type: TargetType,
        function: &str,
        kwargs: &[(String, String)],
    ) -> Result<FactResult> {
        let args = self.build_args(target, target_type, function, kwargs)?;
        debug!(binary = %self.settings.binary, ?args, "running salt");

        let output = Command::new(&self.settings.binary)
            .args(&args)
            .output()
            .await
            .with_context(|| format!("Failed to run {}", self.settings.binary))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        // salt exits non-zero when any minion fails, but still prints every return
        match parse_salt_output(&stdout) {
            Ok(result) => Ok(result),
            Err(_) if !output.status.success() => bail!(
                "salt {} on '{}' failed ({}): {}",
                function,
                target,
                output.status,
                stderr.trim()
            ),
            Err(e) => Err(e),
        }
    }
}

/// Parse the JSON printed by `salt --out=json --static`
pub fn parse_salt_output(stdout: &str) -> Result<FactResult> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        bail!("salt returned no output");
    }

    let json: serde_json::Value =
        serde_json::from_str(trimmed).context("Failed to parse salt JSON output")?;

    let serde_json::Value::Object(minions) = json else {
        bail!("Expected a mapping of minion returns from salt");
    };

    let mut result = FactResult::new();
    for (minion, ret) in minions {
        result.insert(minion, serde_yaml::to_value(ret)?);
    }
    Ok(result)
}

/// Detect the string returns salt uses when a function cannot run
pub fn unavailable_reason(value: &Value) -> Option<&str> {
    let text = value.as_str()?;
    let markers = [
        "__virtual__ returned False",
        "is not available.",
        "Minion did not return",
    ];
    if text.starts_with("ERROR") || markers.iter().any(|m| text.contains(m)) {
        Some(text)
    } else {
        None
    }
}
