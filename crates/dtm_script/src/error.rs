use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Faults raised by the harness.
///
/// `SourceNotFound`, `Io`, `CompileError` and `ModuleNotFound` only come out
/// of `initialize`. Everything else is reported by the call that hit it.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("source file not found: {}", path.display())]
    SourceNotFound { path: PathBuf },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}:{line}: {message}", path.display())]
    CompileError {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("cannot resolve module '{specifier}' imported at {}:{line}", importer.display())]
    ModuleNotFound {
        specifier: String,
        importer: PathBuf,
        line: usize,
    },

    #[error("function '{name}' is not exported by the smart function")]
    FunctionNotFound { name: String },

    #[error("execution exceeded the {}ms time budget", budget.as_millis())]
    Timeout { budget: Duration, elapsed: Duration },

    #[error("resource limit exceeded: {message}")]
    ResourceExceeded { message: String },

    /// The script threw. `message` is the thrown error's own message.
    #[error("{message}")]
    ExecutionError {
        message: String,
        stack: Option<String>,
    },

    #[error("harness has been disposed")]
    Disposed,

    #[error("harness is not initialized")]
    NotInitialized,

    #[error("sandbox is unusable after a timeout; dispose and rebuild the harness")]
    Poisoned,

    #[error("invalid options: {0}")]
    InvalidOptions(String),

    #[error("invalid input: {0}")]
    InvalidInput(#[source] dtm_core::ModelError),

    #[error("'{function}' returned an invalid result: {reason}")]
    InvalidOutput {
        function: String,
        #[source]
        reason: dtm_core::ModelError,
    },

    #[error("sandbox failure: {0}")]
    Sandbox(String),
}

impl HarnessError {
    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            HarnessError::SourceNotFound { .. } => "source_not_found",
            HarnessError::Io { .. } => "io",
            HarnessError::CompileError { .. } => "compile_error",
            HarnessError::ModuleNotFound { .. } => "module_not_found",
            HarnessError::FunctionNotFound { .. } => "function_not_found",
            HarnessError::Timeout { .. } => "timeout",
            HarnessError::ResourceExceeded { .. } => "resource_exceeded",
            HarnessError::ExecutionError { .. } => "execution_error",
            HarnessError::Disposed => "disposed",
            HarnessError::NotInitialized => "not_initialized",
            HarnessError::Poisoned => "poisoned",
            HarnessError::InvalidOptions(_) => "invalid_options",
            HarnessError::InvalidInput(_) => "invalid_input",
            HarnessError::InvalidOutput { .. } => "invalid_output",
            HarnessError::Sandbox(_) => "sandbox",
        }
    }

    pub(crate) fn compile(path: impl Into<PathBuf>, line: usize, message: impl Into<String>) -> Self {
        HarnessError::CompileError {
            path: path.into(),
            line,
            message: message.into(),
        }
    }
}

pub type Result<T, E = HarnessError> = std::result::Result<T, E>;
