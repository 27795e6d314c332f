//! Smart function harness
//!
//! [`SmartFunctionsRunner`] ties the pipeline together: prepare the source
//! into a [`CompiledArtifact`], start a sandbox that evaluates it, then call
//! exported functions by name until disposed.
//!
//! Console output of every operation is accumulated for the lifetime of the
//! runner (until [`SmartFunctionsRunner::clear_console_logs`]);
//! [`SmartFunctionsRunner::execute_with_logs`] additionally returns the
//! entries of that one call.

use crate::console::{ConsoleLog, ConsoleMode, ConsoleSink, TracingConsole};
use crate::error::{HarnessError, Result};
use crate::options::RunnerOptions;
use crate::runtime::RuntimeLimits;
use crate::sandbox::{Sandbox, SandboxConfig, Started};
use crate::source::{CompiledArtifact, SourceArtifact};
use dtm_metrics::{LatencyWindow, OutcomeCounter, PhaseTimer};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

const LATENCY_WINDOW: usize = 128;

/// Result of one invocation together with its console output.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionReport {
    pub value: Value,
    pub logs: Vec<ConsoleLog>,
    pub elapsed: Duration,
}

/// Invocation statistics (empty unless the `metrics` feature is on).
#[derive(Debug)]
pub struct RunnerStats {
    pub latency: LatencyWindow,
    pub outcomes: OutcomeCounter,
    pub phases: PhaseTimer,
}

impl Default for RunnerStats {
    fn default() -> Self {
        Self {
            latency: LatencyWindow::new(LATENCY_WINDOW),
            outcomes: OutcomeCounter::new(),
            phases: PhaseTimer::new(),
        }
    }
}

pub struct SmartFunctionsRunner {
    options: RunnerOptions,
    console: ConsoleMode,
    artifact: Option<Arc<CompiledArtifact>>,
    sandbox: Option<Sandbox>,
    exports: Vec<String>,
    logs: Vec<ConsoleLog>,
    disposed: bool,
    stats: RunnerStats,
}

impl SmartFunctionsRunner {
    /// Console output is captured when `options.capture_console` is set and
    /// forwarded to `tracing` otherwise.
    pub fn new(options: RunnerOptions) -> Self {
        let console = if options.capture_console {
            ConsoleMode::Capture
        } else {
            ConsoleMode::PassThrough(Arc::new(TracingConsole))
        };
        Self::with_mode(options, console)
    }

    /// Like [`Self::new`], with `sink` receiving console output when it is
    /// not captured.
    pub fn with_console(options: RunnerOptions, sink: Arc<dyn ConsoleSink>) -> Self {
        let console = if options.capture_console {
            ConsoleMode::Capture
        } else {
            ConsoleMode::PassThrough(sink)
        };
        Self::with_mode(options, console)
    }

    fn with_mode(options: RunnerOptions, console: ConsoleMode) -> Self {
        Self {
            options,
            console,
            artifact: None,
            sandbox: None,
            exports: Vec::new(),
            logs: Vec::new(),
            disposed: false,
            stats: RunnerStats::default(),
        }
    }

    pub fn options(&self) -> &RunnerOptions {
        &self.options
    }

    /// Prepares the source and evaluates it in a fresh sandbox. Does nothing
    /// when already initialized.
    pub fn initialize(&mut self) -> Result<()> {
        if self.disposed {
            return Err(HarnessError::Disposed);
        }
        if self.sandbox.is_some() {
            return Ok(());
        }
        self.options.validate()?;

        // A failed sandbox start keeps the prepared artifact; retries reuse it.
        let artifact = match &self.artifact {
            Some(artifact) => artifact.clone(),
            None => {
                let source = SourceArtifact::from_options(&self.options);
                let artifact = self
                    .stats
                    .phases
                    .time("prepare", || source.prepare())
                    .map(Arc::new)?;
                tracing::debug!(
                    entry = artifact.entry(),
                    modules = artifact.modules().len(),
                    "smart function prepared"
                );
                self.artifact = Some(artifact.clone());
                artifact
            }
        };

        let config = SandboxConfig {
            timeout: self.options.timeout(),
            limits: RuntimeLimits {
                memory_limit_mb: self.options.memory_limit_mb,
                stack_size_mb: self.options.stack_size_mb,
            },
            console: self.console.clone(),
            params: self.options.params.clone(),
        };
        let (started, logs) = self
            .stats
            .phases
            .time("sandbox", || Sandbox::start(artifact, config));
        self.logs.extend(logs);
        let Started { sandbox, exports } = started?;

        tracing::info!(
            source = %self.options.source_file.display(),
            exports = ?exports,
            "smart function initialized"
        );
        self.sandbox = Some(sandbox);
        self.exports = exports;
        Ok(())
    }

    /// Calls the exported function `name` with `(input, context)` and
    /// returns its result as JSON.
    pub fn execute(&mut self, name: &str, input: Value, context: Option<Value>) -> Result<Value> {
        self.execute_with_logs(name, input, context)
            .map(|report| report.value)
    }

    pub fn execute_with_logs(
        &mut self,
        name: &str,
        input: Value,
        context: Option<Value>,
    ) -> Result<ExecutionReport> {
        if self.disposed {
            return Err(HarnessError::Disposed);
        }
        let Some(sandbox) = self.sandbox.as_mut() else {
            return Err(HarnessError::NotInitialized);
        };

        let reply = sandbox.call(name, input, context);
        self.logs.extend(reply.logs.iter().cloned());
        self.stats.latency.record(reply.elapsed);

        match reply.outcome {
            Ok(value) => {
                self.stats.outcomes.record("ok");
                tracing::debug!(function = name, elapsed = ?reply.elapsed, "smart function returned");
                Ok(ExecutionReport {
                    value,
                    logs: reply.logs,
                    elapsed: reply.elapsed,
                })
            }
            Err(error) => {
                self.stats.outcomes.record(error.kind());
                if matches!(error, HarnessError::Timeout { .. }) {
                    tracing::warn!(function = name, "{error}; sandbox is now unusable");
                } else {
                    tracing::debug!(function = name, kind = error.kind(), "{error}");
                }
                Err(error)
            }
        }
    }

    /// Everything logged since construction or the last clear, in call order.
    pub fn console_logs(&self) -> &[ConsoleLog] {
        &self.logs
    }

    pub fn clear_console_logs(&mut self) {
        self.logs.clear();
    }

    /// Executable text of the prepared smart function.
    pub fn transpiled_code(&self) -> Option<&str> {
        self.artifact.as_deref().map(CompiledArtifact::code)
    }

    pub fn artifact(&self) -> Option<&CompiledArtifact> {
        self.artifact.as_deref()
    }

    /// Callable exports of the entry module.
    pub fn exported_functions(&self) -> &[String] {
        &self.exports
    }

    pub fn is_initialized(&self) -> bool {
        self.sandbox.is_some()
    }

    pub fn is_poisoned(&self) -> bool {
        self.sandbox.as_ref().is_some_and(Sandbox::is_poisoned)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn stats(&self) -> &RunnerStats {
        &self.stats
    }

    /// Stops the sandbox and releases the artifact and logs. Idempotent.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        if let Some(mut sandbox) = self.sandbox.take() {
            sandbox.shutdown();
        }
        self.artifact = None;
        self.exports.clear();
        self.logs.clear();
        tracing::info!(source = %self.options.source_file.display(), "smart function disposed");
    }
}

impl Drop for SmartFunctionsRunner {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::LogLevel;
    use serde_json::json;
    use std::fs;
    use std::sync::Mutex;
    use std::time::Instant;
    use tempfile::TempDir;

    fn script(source: &str) -> (TempDir, RunnerOptions) {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("fn.ts"), source).unwrap();
        let options = RunnerOptions::new("fn.ts")
            .with_base_dir(dir.path())
            .with_capture_console(true)
            .with_timeout(Duration::from_secs(2));
        (dir, options)
    }

    fn runner(source: &str) -> (TempDir, SmartFunctionsRunner) {
        let (dir, options) = script(source);
        let mut runner = SmartFunctionsRunner::new(options);
        runner.initialize().unwrap();
        (dir, runner)
    }

    #[test]
    fn lifecycle_errors() {
        let (_dir, options) = script("export function f() { return 1; }\n");
        let mut runner = SmartFunctionsRunner::new(options);
        assert!(matches!(
            runner.execute("f", Value::Null, None),
            Err(HarnessError::NotInitialized)
        ));
        runner.initialize().unwrap();
        runner.initialize().unwrap();
        assert_eq!(runner.execute("f", Value::Null, None).unwrap(), json!(1));

        runner.dispose();
        runner.dispose();
        assert!(runner.is_disposed());
        assert!(runner.transpiled_code().is_none());
        assert!(matches!(runner.execute("f", Value::Null, None), Err(HarnessError::Disposed)));
        assert!(matches!(runner.initialize(), Err(HarnessError::Disposed)));
    }

    #[test]
    fn missing_source_fails_initialize() {
        let dir = TempDir::new().unwrap();
        let mut runner =
            SmartFunctionsRunner::new(RunnerOptions::new("absent.ts").with_base_dir(dir.path()));
        assert!(matches!(runner.initialize(), Err(HarnessError::SourceNotFound { .. })));
        assert!(!runner.is_initialized());
    }

    #[test]
    fn compile_errors_carry_the_source_line() {
        let (_dir, options) = script("export const a = 1;\n\nenum Mode { On }\n");
        let mut runner = SmartFunctionsRunner::new(options);
        match runner.initialize() {
            Err(HarnessError::CompileError { line, .. }) => assert_eq!(line, 3),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unknown_function_leaves_the_runner_usable() {
        let (_dir, mut runner) = runner("export function f() { return 'ok'; }\n");
        assert_eq!(runner.exported_functions(), ["f"]);
        assert!(matches!(
            runner.execute("g", Value::Null, None),
            Err(HarnessError::FunctionNotFound { ref name }) if name == "g"
        ));
        assert_eq!(runner.execute("f", Value::Null, None).unwrap(), json!("ok"));
    }

    #[test]
    fn timeouts_poison_the_runner() {
        let (_dir, options) = script(
            "export function spin() { while (true) {} }\nexport function ok() { return 1; }\n",
        );
        let mut runner = SmartFunctionsRunner::new(options.with_timeout(Duration::from_millis(150)));
        runner.initialize().unwrap();
        let started = Instant::now();
        let outcome = runner.execute("spin", Value::Null, None);
        let wall = started.elapsed();
        let floor = Duration::from_millis(150 - 5);
        match outcome {
            Err(HarnessError::Timeout { budget, elapsed }) => {
                assert_eq!(budget, Duration::from_millis(150));
                assert!(elapsed >= floor, "reported {elapsed:?}");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(wall >= floor, "wall {wall:?}");
        assert!(runner.is_poisoned());
        assert!(matches!(runner.execute("ok", Value::Null, None), Err(HarnessError::Poisoned)));
        runner.dispose();
    }

    #[test]
    fn evaluation_timeout_fails_initialize() {
        let (_dir, options) = script("while (true) {}\nexport const a = 1;\n");
        let mut runner = SmartFunctionsRunner::new(options.with_timeout(Duration::from_millis(100)));
        assert!(matches!(runner.initialize(), Err(HarnessError::Timeout { .. })));
    }

    #[test]
    fn retrying_a_failed_start_reuses_the_prepared_artifact() {
        let (dir, options) = script("while (true) {}\nexport const a = 1;\n");
        let mut runner = SmartFunctionsRunner::new(options.with_timeout(Duration::from_millis(100)));
        assert!(matches!(runner.initialize(), Err(HarnessError::Timeout { .. })));
        let first = runner.artifact().unwrap() as *const CompiledArtifact;
        let prepare = runner.stats().phases.get("prepare");

        // The source is gone, so a second prepare would fail with SourceNotFound.
        fs::remove_dir_all(dir.path()).unwrap();
        assert!(matches!(runner.initialize(), Err(HarnessError::Timeout { .. })));
        assert!(std::ptr::eq(first, runner.artifact().unwrap()));
        assert_eq!(runner.stats().phases.get("prepare"), prepare);
    }

    #[test]
    fn logs_accumulate_and_reports_hold_one_call() {
        let (_dir, mut runner) = runner(
            "console.log('loaded');\n\
             export function greet(name: string) { console.info('hi', name); console.error('e'); return name; }\n\
             export function fail() { console.warn('about to fail'); throw new Error('nope'); }\n",
        );
        let report = runner.execute_with_logs("greet", json!("ada"), None).unwrap();
        assert_eq!(report.value, json!("ada"));
        assert_eq!(report.logs.len(), 2);
        assert_eq!(report.logs[0].args, [json!("hi"), json!("ada")]);
        assert_eq!(report.logs[1].level, LogLevel::Error);

        assert!(runner.execute("fail", Value::Null, None).is_err());
        let messages: Vec<String> = runner.console_logs().iter().map(ConsoleLog::message).collect();
        assert_eq!(messages, ["loaded", "hi ada", "e", "about to fail"]);

        runner.clear_console_logs();
        assert!(runner.console_logs().is_empty());
    }

    #[derive(Default)]
    struct Collect(Mutex<Vec<String>>);

    impl ConsoleSink for Collect {
        fn emit(&self, level: LogLevel, args: &[Value]) {
            self.0
                .lock()
                .unwrap()
                .push(format!("{level}:{}", crate::console::render_args(args)));
        }
    }

    #[test]
    fn pass_through_console_reaches_the_sink() {
        let (_dir, options) = script("export function f() { console.debug('x', 1); return null; }\n");
        let sink = Arc::new(Collect::default());
        let mut runner = SmartFunctionsRunner::with_console(options.with_capture_console(false), sink.clone());
        runner.initialize().unwrap();
        assert_eq!(runner.execute("f", Value::Null, None).unwrap(), Value::Null);
        assert!(runner.console_logs().is_empty());
        assert_eq!(*sink.0.lock().unwrap(), ["debug:x 1"]);
    }

    #[test]
    fn params_from_options_reach_the_context() {
        let (_dir, options) = script("export function f(_: unknown, ctx: any) { return [ctx.runtime, ctx.params.limit]; }\n");
        let params = serde_json::Map::from_iter([("limit".to_string(), json!(3))]);
        let mut runner = SmartFunctionsRunner::new(options.with_params(params));
        runner.initialize().unwrap();
        assert_eq!(
            runner.execute("f", Value::Null, None).unwrap(),
            json!(["cumulocity-dtm", 3])
        );
    }

    #[test]
    fn separate_runners_share_nothing() {
        let source = "let count = 0;\nexport function bump() { count += 1; return count; }\n";
        let (_a_dir, mut a) = runner(source);
        let (_b_dir, mut b) = runner(source);
        assert_eq!(a.execute("bump", Value::Null, None).unwrap(), json!(1));
        assert_eq!(a.execute("bump", Value::Null, None).unwrap(), json!(2));
        assert_eq!(b.execute("bump", Value::Null, None).unwrap(), json!(1));
    }

    #[test]
    fn relative_imports_are_resolved() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("lib")).unwrap();
        fs::write(
            dir.path().join("lib/scale.ts"),
            "export interface Scaled { value: number }\nexport const scale = (v: number): Scaled => ({ value: v * 10 });\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("main.ts"),
            "import { scale, type Scaled } from './lib/scale';\nexport function run(v: number): Scaled { return scale(v); }\n",
        )
        .unwrap();
        let options = RunnerOptions::new("main.ts").with_base_dir(dir.path());
        let mut runner = SmartFunctionsRunner::new(options);
        runner.initialize().unwrap();
        assert_eq!(runner.execute("run", json!(4), None).unwrap(), json!({ "value": 40 }));
        assert!(runner.transpiled_code().unwrap().contains("__dtm_define(\"lib/scale.ts\""));
    }
}
