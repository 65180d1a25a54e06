use miette::Diagnostic;
use thiserror::Error;

/// Unified error type for all xdeps operations.
#[derive(Debug, Error, Diagnostic)]
pub enum DependsError {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A dependency was handed to a resolver for a different ecosystem.
    #[error("Resolver `{resolver}` cannot resolve dependencies from other sources ({dependency})")]
    UnsupportedSource {
        resolver: String,
        dependency: String,
    },

    /// A resolver's local preconditions are not met (tool missing, wrong OS).
    #[error("Resolver `{name}` is not available: {reason}")]
    ResolverUnavailable { name: String, reason: String },

    /// An external query for one dependency failed or returned garbage.
    #[error("Failed to query {dependency}: {message}")]
    BackendQuery { dependency: String, message: String },

    /// A version constraint string could not be parsed.
    #[error("Invalid version constraint `{input}`: {message}")]
    #[diagnostic(help("Supported operators: *, =, ==, !=, >, >=, <, <=, ~, ~=, ^, <<, >>"))]
    ConstraintParse { input: String, message: String },

    /// A version string could not be parsed.
    #[error("Invalid version `{input}`: {message}")]
    VersionParse { input: String, message: String },

    /// A `source:name@constraint` string could not be parsed.
    #[error("Invalid dependency specifier `{input}`: {message}")]
    #[diagnostic(help("Use the form SOURCE:NAME[@CONSTRAINT], e.g. pip:numpy@>=1.20"))]
    DependencyParse { input: String, message: String },

    /// No resolver is registered under the given name.
    #[error("`{name}` is not a known resolver")]
    #[diagnostic(help("Run `xdeps list` to see the available resolvers"))]
    ResolverNotFound { name: String },

    /// An external command or request exceeded its time budget.
    #[error("Timed out after {seconds}s: {operation}")]
    Timeout { operation: String, seconds: u64 },

    /// An external command could not be spawned or exited unsuccessfully.
    #[error("Command `{program}` failed: {message}")]
    Command { program: String, message: String },

    /// Network request or download failed.
    #[error("Network error: {message}")]
    Network { message: String },

    /// A project manifest inside a source tree is malformed.
    #[error("Manifest error: {message}")]
    Manifest { message: String },

    /// The engine's own data is inconsistent; aborts the run.
    #[error("Internal error: {message}")]
    Fatal { message: String },

    /// Dependency resolution produced no usable result.
    #[error("Dependency resolution failed: {message}")]
    Resolution { message: String },

    /// Catch-all for miscellaneous errors.
    #[error("{message}")]
    Generic { message: String },
}

impl DependsError {
    /// Whether this error must abort the whole resolution run instead of
    /// only abandoning the branch that produced it.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DependsError::Fatal { .. } | DependsError::UnsupportedSource { .. }
        )
    }

    /// Wrap any error raised while querying `dependency` as a [`DependsError::BackendQuery`].
    pub fn query(dependency: impl ToString, message: impl ToString) -> Self {
        DependsError::BackendQuery {
            dependency: dependency.to_string(),
            message: message.to_string(),
        }
    }
}

/// Convenience alias for `miette::Result<T>`.
pub type DependsResult<T> = miette::Result<T>;
