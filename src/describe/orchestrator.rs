//! Describe orchestrator
//!
//! Runs the describe pipeline: query the target, format every minion's
//! return in the requested dialect, serialize it and hand it to
//! [`generate_files`].

use anyhow::{Context, Error, Result};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::DescribeConfig;
use crate::describe::{DescribeRequest, Describer, DescriberRegistry};
use crate::generate::{generate_files, minion_slug};
use crate::remote::{unavailable_reason, RemoteExecutor};

/// A minion that produced no document, and why
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedMinion {
    pub minion: String,
    pub describer: String,
    pub reason: String,
}

/// A describer that could not run at all, and why
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedDescriber {
    pub describer: String,
    pub error: String,
}

/// Outcome of one or more describe runs
#[derive(Debug, Clone, Default)]
pub struct DescribeReport {
    /// Documents written
    pub generated: Vec<PathBuf>,
    /// Minions whose return could not be turned into a document
    pub skipped: Vec<SkippedMinion>,
    /// Minions whose document could not be written
    pub failed: Vec<String>,
    /// Describers whose remote call failed
    pub errors: Vec<FailedDescriber>,
}

impl DescribeReport {
    /// False when any document could not be written or any describer failed
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.errors.is_empty()
    }

    pub fn merge(&mut self, other: DescribeReport) {
        self.generated.extend(other.generated);
        self.skipped.extend(other.skipped);
        self.failed.extend(other.failed);
        self.errors.extend(other.errors);
    }
}

impl fmt::Display for DescribeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Generated SLS file locations:")?;
        for path in &self.generated {
            writeln!(f, "  {}", path.display())?;
        }
        if !self.skipped.is_empty() {
            writeln!(f, "Skipped minions:")?;
            for skipped in &self.skipped {
                writeln!(
                    f,
                    "  {} ({}): {}",
                    skipped.minion, skipped.describer, skipped.reason
                )?;
            }
        }
        if !self.failed.is_empty() {
            writeln!(f, "Failed to write files for: {}", self.failed.join(", "))?;
        }
        if !self.errors.is_empty() {
            writeln!(f, "Failed describers:")?;
            for failed in &self.errors {
                writeln!(f, "  {}: {}", failed.describer, failed.error)?;
            }
        }
        Ok(())
    }
}

/// Drives describers against a remote executor
pub struct DescribeOrchestrator {
    executor: Arc<dyn RemoteExecutor>,
    config: DescribeConfig,
}

impl DescribeOrchestrator {
    pub fn new(executor: Arc<dyn RemoteExecutor>, config: DescribeConfig) -> Self {
        Self { executor, config }
    }

    pub fn config(&self) -> &DescribeConfig {
        &self.config
    }

    /// Run the describer registered under `name`
    pub async fn describe_by_name(
        &self,
        name: &str,
        request: &DescribeRequest,
    ) -> Result<DescribeReport> {
        let describer = DescriberRegistry::get(name).with_context(|| {
            format!(
                "Unknown describer '{}'. Available: {}",
                name,
                DescriberRegistry::names().join(", ")
            )
        })?;
        self.describe(describer.as_ref(), request).await
    }

    /// Run every registered describer against the same target
    ///
    /// A describer whose remote call fails is recorded in the report and
    /// the remaining describers still run. When every describer fails the
    /// last error is returned.
    pub async fn describe_all(&self, request: &DescribeRequest) -> Result<DescribeReport> {
        let mut report = DescribeReport::default();
        let mut succeeded = 0;
        let mut last_error: Option<Error> = None;
        for describer in DescriberRegistry::all() {
            match self.describe(describer.as_ref(), request).await {
                Ok(partial) => {
                    succeeded += 1;
                    report.merge(partial);
                }
                Err(e) => {
                    warn!(describer = describer.name(), "describe failed: {:#}", e);
                    report.errors.push(FailedDescriber {
                        describer: describer.name().to_string(),
                        error: format!("{:#}", e),
                    });
                    last_error = Some(e);
                }
            }
        }
        match last_error {
            Some(e) if succeeded == 0 => Err(e.context("Every describer failed")),
            _ => Ok(report),
        }
    }

    /// Query the target and generate one document per minion
    pub async fn describe(
        &self,
        describer: &dyn Describer,
        request: &DescribeRequest,
    ) -> Result<DescribeReport> {
        let kwargs = describer.kwargs(request);
        let returns = self
            .executor
            .execute(
                &request.target,
                request.target_type,
                describer.function(),
                &kwargs,
            )
            .await
            .with_context(|| {
                format!(
                    "Failed to run {} on '{}'",
                    describer.function(),
                    request.target
                )
            })?;

        info!(
            describer = describer.name(),
            minions = returns.len(),
            "received returns"
        );

        let mut report = DescribeReport::default();
        for (minion, value) in &returns {
            if let Err(e) = minion_slug(minion) {
                warn!(minion = %minion, "{:#}", e);
                report.skipped.push(SkippedMinion {
                    minion: minion.clone(),
                    describer: describer.name().to_string(),
                    reason: format!("{:#}", e),
                });
                continue;
            }

            if let Some(reason) = unavailable_reason(value) {
                warn!(minion = %minion, "{} unavailable: {}", describer.function(), reason);
                report.skipped.push(SkippedMinion {
                    minion: minion.clone(),
                    describer: describer.name().to_string(),
                    reason: reason.to_string(),
                });
                continue;
            }

            let document = match describer.render(
                request.config_system,
                minion,
                value,
                &request.options,
            ) {
                Ok(document) => document,
                Err(e) => {
                    warn!(minion = %minion, "unable to describe {}: {:#}", describer.name(), e);
                    report.skipped.push(SkippedMinion {
                        minion: minion.clone(),
                        describer: describer.name().to_string(),
                        reason: format!("{:#}", e),
                    });
                    continue;
                }
            };

            let contents = serde_yaml::to_string(&document)?;
            debug!(minion = %minion, "generated document:\n{}", contents);

            match generate_files(
                &self.config,
                minion,
                &contents,
                describer.name(),
                request.config_system,
            )? {
                Some(path) => report.generated.push(path),
                None => report.failed.push(minion.clone()),
            }
        }

        Ok(report)
    }
}
