//! Runner and compiler configuration

use crate::error::{HarnessError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default time budget for artifact evaluation and for each invocation.
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;

/// Options for the source-to-executable transform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompilerOptions {
    /// Emit `"use strict"` at the top of every module.
    pub always_strict: bool,
    /// Blank out comments in the emitted code.
    pub remove_comments: bool,
    /// Drop import bindings that are only used as types.
    pub elide_unused_imports: bool,
    /// Extensions tried, in order, when resolving a relative import.
    pub extensions: Vec<String>,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            always_strict: true,
            remove_comments: false,
            elide_unused_imports: true,
            extensions: vec![".ts".to_string(), ".js".to_string()],
        }
    }
}

/// Construction options for [`crate::SmartFunctionsRunner`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunnerOptions {
    /// Entry source file, relative to `base_dir` when not absolute.
    pub source_file: PathBuf,
    pub base_dir: Option<PathBuf>,
    /// Time budget in milliseconds.
    #[serde(rename = "timeout")]
    pub timeout_ms: u64,
    pub memory_limit_mb: Option<u64>,
    pub stack_size_mb: Option<u64>,
    /// Record console output instead of forwarding it to the sink.
    pub capture_console: bool,
    pub compiler_options: CompilerOptions,
    /// Default `context.params` for invocations that do not set their own.
    pub params: Option<Map<String, Value>>,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            source_file: PathBuf::new(),
            base_dir: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            memory_limit_mb: None,
            stack_size_mb: None,
            capture_console: false,
            compiler_options: CompilerOptions::default(),
            params: None,
        }
    }
}

impl RunnerOptions {
    pub fn new(source_file: impl Into<PathBuf>) -> Self {
        Self {
            source_file: source_file.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(base_dir.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn with_memory_limit_mb(mut self, limit: u64) -> Self {
        self.memory_limit_mb = Some(limit);
        self
    }

    #[must_use]
    pub fn with_stack_size_mb(mut self, size: u64) -> Self {
        self.stack_size_mb = Some(size);
        self
    }

    #[must_use]
    pub fn with_capture_console(mut self, capture: bool) -> Self {
        self.capture_console = capture;
        self
    }

    #[must_use]
    pub fn with_compiler_options(mut self, options: CompilerOptions) -> Self {
        self.compiler_options = options;
        self
    }

    #[must_use]
    pub fn with_params(mut self, params: Map<String, Value>) -> Self {
        self.params = Some(params);
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Directory relative imports of the entry file start from.
    pub fn resolution_root(&self) -> PathBuf {
        match &self.base_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    pub fn entry_path(&self) -> PathBuf {
        resolve_against(&self.resolution_root(), &self.source_file)
    }

    pub fn validate(&self) -> Result<()> {
        if self.source_file.as_os_str().is_empty() {
            return Err(HarnessError::InvalidOptions("sourceFile is required".into()));
        }
        if self.timeout_ms == 0 {
            return Err(HarnessError::InvalidOptions(
                "timeout must be a positive number of milliseconds".into(),
            ));
        }
        if self.memory_limit_mb == Some(0) {
            return Err(HarnessError::InvalidOptions("memoryLimitMb must be positive".into()));
        }
        if self.stack_size_mb == Some(0) {
            return Err(HarnessError::InvalidOptions("stackSizeMb must be positive".into()));
        }
        if self.compiler_options.extensions.iter().any(|ext| !ext.starts_with('.')) {
            return Err(HarnessError::InvalidOptions(
                "compilerOptions.extensions entries must start with '.'".into(),
            ));
        }
        Ok(())
    }
}

fn resolve_against(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_uses_camel_case_and_defaults() {
        let options: RunnerOptions = serde_json::from_str(
            r#"{
                "sourceFile": "onmessage.fn.ts",
                "baseDir": "/srv/functions",
                "captureConsole": true,
                "timeout": 250,
                "compilerOptions": { "removeComments": true }
            }"#,
        )
        .unwrap();

        assert_eq!(options.timeout(), Duration::from_millis(250));
        assert!(options.capture_console);
        assert!(options.compiler_options.remove_comments);
        assert!(options.compiler_options.always_strict);
        assert_eq!(options.entry_path(), PathBuf::from("/srv/functions/onmessage.fn.ts"));
        assert!(options.validate().is_ok());
    }

    #[test]
    fn zero_timeout_is_invalid() {
        let options = RunnerOptions::new("a.ts").with_timeout(Duration::ZERO);
        assert!(matches!(options.validate(), Err(HarnessError::InvalidOptions(_))));
    }

    #[test]
    fn missing_source_is_invalid() {
        assert!(matches!(
            RunnerOptions::default().validate(),
            Err(HarnessError::InvalidOptions(_))
        ));
    }
}
