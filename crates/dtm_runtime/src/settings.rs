//! Settings management

use anyhow::{Context, Result};
use dtm_script::{CompilerOptions, RunnerOptions, DEFAULT_TIMEOUT_MS};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

/// Harness settings, read from the `--config` file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub sandbox: SandboxSettings,
    pub compiler: CompilerOptions,
    /// Default `context.params`.
    pub params: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SandboxSettings {
    pub timeout: u64,
    pub memory_limit_mb: Option<u64>,
    pub stack_size_mb: Option<u64>,
    pub capture_console: bool,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT_MS,
            memory_limit_mb: None,
            stack_size_mb: None,
            capture_console: false,
        }
    }
}

/// Values given on the command line. They win over the settings file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub timeout: Option<u64>,
    pub memory_limit_mb: Option<u64>,
    pub stack_size_mb: Option<u64>,
    pub capture_console: bool,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading settings {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing settings {}", path.display()))
    }

    /// Settings from `path` when given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn runner_options(
        &self,
        source_file: PathBuf,
        base_dir: Option<PathBuf>,
        overrides: &Overrides,
    ) -> RunnerOptions {
        let sandbox = &self.sandbox;
        RunnerOptions {
            source_file,
            base_dir,
            timeout_ms: overrides.timeout.unwrap_or(sandbox.timeout),
            memory_limit_mb: overrides.memory_limit_mb.or(sandbox.memory_limit_mb),
            stack_size_mb: overrides.stack_size_mb.or(sandbox.stack_size_mb),
            capture_console: overrides.capture_console || sandbox.capture_console,
            compiler_options: self.compiler.clone(),
            params: self.params.clone(),
        }
    }
}
