//! Reporting of branches the engine could not expand.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use xdeps_core::{Dependency, Package};

/// Why a dependency was left unexpanded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "kebab-case")]
pub enum SkipReason {
    /// The owning resolver exists but its local preconditions are not met.
    Unavailable(String),
    /// No resolver claims the source and there is no usable fallback.
    NoResolver,
    /// The resolver reported an error.
    Failed(String),
    /// The resolver did not answer within the configured timeout (seconds).
    TimedOut(u64),
    /// The dependency lies deeper than the configured depth limit.
    DepthLimit(usize),
    /// The resolver answered but no package satisfied the constraint.
    Unresolved,
    /// A package declared this edge with a requirement that does not parse.
    InvalidConstraint {
        required_by: String,
        requirement: String,
        message: String,
    },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Unavailable(reason) => write!(f, "resolver not available: {reason}"),
            SkipReason::NoResolver => write!(f, "no resolver for this source"),
            SkipReason::Failed(message) => write!(f, "{message}"),
            SkipReason::TimedOut(secs) => write!(f, "timed out after {secs}s"),
            SkipReason::DepthLimit(limit) => write!(f, "beyond depth limit {limit}"),
            SkipReason::Unresolved => write!(f, "no matching package found"),
            SkipReason::InvalidConstraint {
                required_by,
                requirement,
                message,
            } => write!(f, "invalid requirement `{requirement}` of {required_by}: {message}"),
        }
    }
}

/// A dependency the engine gave up on, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedBranch {
    pub dependency: Dependency,
    pub reason: SkipReason,
}

impl fmt::Display for SkippedBranch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason {
            // The placeholder `*` constraint was never requested.
            SkipReason::InvalidConstraint { .. } => write!(
                f,
                "{}:{}: {}",
                self.dependency.source(),
                self.dependency.name(),
                self.reason
            ),
            _ => write!(f, "{}: {}", self.dependency, self.reason),
        }
    }
}

/// Non-fatal problems collected over one resolution run.
#[derive(Debug, Default, Clone)]
pub struct ResolutionReport {
    pub skipped: Vec<SkippedBranch>,
    /// Resolvers found unavailable, with the reason each gave.
    pub unavailable: BTreeMap<String, String>,
    /// Failures that do not concern a single dependency, such as augmentation errors.
    pub warnings: Vec<String>,
}

impl ResolutionReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn skip(&mut self, dependency: Dependency, reason: SkipReason) {
        self.skipped.push(SkippedBranch { dependency, reason });
    }

    /// Record every edge `package` dropped while its metadata was read.
    pub fn skip_invalid_edges(&mut self, package: &Package) {
        for edge in package.invalid_edges() {
            tracing::warn!("Skipping {edge} (required by {package})");
            self.skip(
                edge.dependency(),
                SkipReason::InvalidConstraint {
                    required_by: package.to_string(),
                    requirement: edge.requirement.clone(),
                    message: edge.message.clone(),
                },
            );
        }
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.skipped.is_empty() && self.unavailable.is_empty() && self.warnings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.skipped.len() + self.unavailable.len() + self.warnings.len()
    }
}

impl fmt::Display for ResolutionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "No skipped branches.");
        }
        if !self.skipped.is_empty() {
            writeln!(f, "Skipped branches ({}):", self.skipped.len())?;
            for branch in &self.skipped {
                writeln!(f, "  {branch}")?;
            }
        }
        for (name, reason) in &self.unavailable {
            writeln!(f, "Resolver `{name}` not available: {reason}")?;
        }
        for warning in &self.warnings {
            writeln!(f, "warning: {warning}")?;
        }
        Ok(())
    }
}
