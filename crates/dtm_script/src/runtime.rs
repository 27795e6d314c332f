//! Script runtime management
//!
//! One QuickJS runtime and context per smart function. The runtime is not
//! `Send`; [`crate::sandbox`] creates and drives it on its own thread.

use crate::console::{ConsoleLog, ConsoleMode};
use crate::error::{HarnessError, Result};
use crate::ffi::{self, LogBuffer};
use crate::source::CompiledArtifact;
use rquickjs::context::EvalOptions;
use rquickjs::promise::PromiseState;
use rquickjs::{
    CatchResultExt, CaughtError, Coerced, Context, Ctx, Function, Object, Persistent, Runtime,
    Value,
};
use serde_json::{Map, Value as Json};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const MIB: usize = 1024 * 1024;

/// Limits applied to a runtime once its context is set up.
#[derive(Debug, Clone, Default)]
pub(crate) struct RuntimeLimits {
    pub memory_limit_mb: Option<u64>,
    pub stack_size_mb: Option<u64>,
}

/// Deadline checked by the interrupt handler.
#[derive(Debug)]
struct Budget {
    origin: Instant,
    /// Nanoseconds after `origin`; 0 when disarmed.
    deadline: AtomicU64,
    tripped: AtomicBool,
}

impl Budget {
    fn new() -> Self {
        Self {
            origin: Instant::now(),
            deadline: AtomicU64::new(0),
            tripped: AtomicBool::new(false),
        }
    }

    fn arm(&self, timeout: Duration) {
        let at = (self.origin.elapsed() + timeout).as_nanos().max(1);
        self.deadline
            .store(u64::try_from(at).unwrap_or(u64::MAX), Ordering::Release);
    }

    fn disarm(&self) {
        self.deadline.store(0, Ordering::Release);
    }

    /// Called by the engine between bytecode instructions.
    fn expired(&self) -> bool {
        let deadline = self.deadline.load(Ordering::Acquire);
        if deadline == 0 {
            return false;
        }
        let now = u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX);
        if now >= deadline {
            self.tripped.store(true, Ordering::Release);
            return true;
        }
        false
    }

    fn tripped(&self) -> bool {
        self.tripped.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Evaluate,
    Call,
}

/// A running operation: what to blame when it fails.
struct Watch<'a> {
    stage: Stage,
    timeout: Duration,
    started: Instant,
    budget: &'a Budget,
    artifact: &'a CompiledArtifact,
}

impl Watch<'_> {
    fn fault<'js>(&self, ctx: &Ctx<'js>, error: CaughtError<'js>) -> HarnessError {
        if self.budget.tripped() {
            return HarnessError::Timeout {
                budget: self.timeout,
                elapsed: self.started.elapsed(),
            };
        }
        match error {
            CaughtError::Error(rquickjs::Error::Allocation) => HarnessError::ResourceExceeded {
                message: "out of memory".into(),
            },
            CaughtError::Error(rquickjs::Error::WouldBlock) => HarnessError::ExecutionError {
                message: "promise never settled".into(),
                stack: None,
            },
            CaughtError::Error(other) => HarnessError::ExecutionError {
                message: other.to_string(),
                stack: None,
            },
            CaughtError::Exception(exception) => {
                let message = exception.message().unwrap_or_default();
                let name = exception
                    .get::<_, Coerced<String>>("name")
                    .map(|n| n.0)
                    .unwrap_or_default();
                if is_engine_limit(&name, &message) {
                    return HarnessError::ResourceExceeded { message };
                }
                let stack = exception.stack();
                if self.stage == Stage::Evaluate && name == "SyntaxError" {
                    return self.compile_error(stack.as_deref(), message);
                }
                HarnessError::ExecutionError {
                    message,
                    stack: stack.map(|s| self.artifact.map_stack(&s)),
                }
            }
            CaughtError::Value(value) => HarnessError::ExecutionError {
                message: ffi::thrown_value_message(ctx, value),
                stack: None,
            },
        }
    }

    fn compile_error(&self, stack: Option<&str>, message: String) -> HarnessError {
        let located = stack
            .and_then(CompiledArtifact::first_script_line)
            .and_then(|line| self.artifact.locate(line));
        match located {
            Some((module, line)) => HarnessError::compile(&module.path, line, message),
            None => {
                let path = self
                    .artifact
                    .modules()
                    .last()
                    .map(|m| m.path.clone())
                    .unwrap_or_default();
                HarnessError::compile(path, 0, message)
            }
        }
    }
}

/// Errors QuickJS raises itself when the allocator or the stack limit gives
/// out. Script errors never match on message text alone.
fn is_engine_limit(name: &str, message: &str) -> bool {
    matches!(
        (name, message),
        ("InternalError", "out of memory")
            | ("InternalError", "stack overflow")
            | ("RangeError", "Maximum call stack size exceeded")
    )
}

/// Script execution context
pub(crate) struct ScriptRuntime {
    // Persistent handles must be released before the context and runtime.
    exports: Option<Persistent<Object<'static>>>,
    console: Persistent<Object<'static>>,
    context: Context,
    runtime: Runtime,
    logs: LogBuffer,
    budget: Arc<Budget>,
    artifact: Option<Arc<CompiledArtifact>>,
    params: Option<Map<String, Json>>,
}

impl ScriptRuntime {
    pub(crate) fn new(
        limits: &RuntimeLimits,
        console: &ConsoleMode,
        params: Option<Map<String, Json>>,
    ) -> Result<Self> {
        let runtime = Runtime::new().map_err(sandbox_error)?;
        let context = Context::full(&runtime).map_err(sandbox_error)?;
        let logs: LogBuffer = Rc::new(RefCell::new(Vec::new()));

        let console = context
            .with(|ctx| {
                let console = ffi::install_console(&ctx, console, &logs)?;
                Ok::<_, rquickjs::Error>(Persistent::save(&ctx, console))
            })
            .map_err(sandbox_error)?;

        let budget = Arc::new(Budget::new());
        let interrupt = budget.clone();
        runtime.set_interrupt_handler(Some(Box::new(move || interrupt.expired())));

        // Limits go on last so that setting up the context never trips them.
        if let Some(mb) = limits.memory_limit_mb {
            runtime.set_memory_limit(mib(mb));
        }
        if let Some(mb) = limits.stack_size_mb {
            runtime.set_max_stack_size(mib(mb));
        }

        Ok(Self {
            exports: None,
            console,
            context,
            runtime,
            logs,
            budget,
            artifact: None,
            params,
        })
    }

    /// Evaluates the bundled smart function and keeps its exports. Returns
    /// the names of the exported functions.
    pub(crate) fn evaluate(
        &mut self,
        artifact: Arc<CompiledArtifact>,
        timeout: Duration,
    ) -> Result<Vec<String>> {
        let watch = Watch {
            stage: Stage::Evaluate,
            timeout,
            started: Instant::now(),
            budget: &self.budget,
            artifact: &artifact,
        };
        self.budget.arm(timeout);
        let outcome = self.context.with(|ctx| {
            let mut options = EvalOptions::default();
            // strictness comes from the module wrappers
            options.strict = false;
            options.backtrace_barrier = true;
            let exports: Object = ctx
                .eval_with_options(artifact.code(), options)
                .catch(&ctx)
                .map_err(|e| watch.fault(&ctx, e))?;
            drain_jobs(&ctx, &watch)?;
            let names = exported_functions(&ctx, &exports);
            Ok::<_, HarnessError>((names, Persistent::save(&ctx, exports)))
        });
        self.budget.disarm();

        let (names, exports) = outcome?;
        self.exports = Some(exports);
        self.artifact = Some(artifact);
        tracing::debug!(
            exports = ?names,
            memory_used = self.runtime.memory_usage().memory_used_size,
            "smart function evaluated"
        );
        Ok(names)
    }

    /// Calls an exported function with `(input, context)`. A returned
    /// promise is driven to completion within the same time budget.
    pub(crate) fn call(
        &mut self,
        function: &str,
        input: &Json,
        context: Option<&Json>,
        timeout: Duration,
    ) -> Result<Json> {
        let (Some(exports), Some(artifact)) = (self.exports.clone(), self.artifact.clone()) else {
            return Err(HarnessError::NotInitialized);
        };
        let watch = Watch {
            stage: Stage::Call,
            timeout,
            started: Instant::now(),
            budget: &self.budget,
            artifact: &artifact,
        };
        let console = self.console.clone();
        let params = self.params.as_ref();

        self.budget.arm(timeout);
        let outcome = self.context.with(|ctx| {
            let exports = exports.restore(&ctx).map_err(sandbox_error)?;
            let Some(function) = exported_function(&ctx, &exports, function) else {
                return Err(HarnessError::FunctionNotFound {
                    name: function.to_string(),
                });
            };
            let console = console.restore(&ctx).map_err(sandbox_error)?;
            let arguments = ffi::to_js(&ctx, input)
                .and_then(|input| {
                    ffi::prepare_context(&ctx, context, params, &console).map(|c| (input, c))
                })
                .catch(&ctx)
                .map_err(|e| watch.fault(&ctx, e))?;

            let result: Value = function
                .call(arguments)
                .catch(&ctx)
                .map_err(|e| watch.fault(&ctx, e))?;
            let result = match result.as_promise().cloned() {
                Some(promise) => {
                    drain_jobs(&ctx, &watch)?;
                    match promise.state() {
                        PromiseState::Pending => Err(watch.fault(
                            &ctx,
                            CaughtError::Error(rquickjs::Error::WouldBlock),
                        )),
                        _ => promise
                            .result::<Value>()
                            .unwrap_or(Err(rquickjs::Error::WouldBlock))
                            .catch(&ctx)
                            .map_err(|e| watch.fault(&ctx, e)),
                    }?
                }
                None => {
                    drain_jobs(&ctx, &watch)?;
                    result
                }
            };
            ffi::from_js(&ctx, result)
                .catch(&ctx)
                .map_err(|e| watch.fault(&ctx, e))
        });
        self.budget.disarm();
        outcome
    }

    /// Console entries recorded since the last call.
    pub(crate) fn take_logs(&self) -> Vec<ConsoleLog> {
        std::mem::take(&mut *self.logs.borrow_mut())
    }
}

/// Runs queued promise jobs until none are left or the budget trips.
fn drain_jobs<'js>(ctx: &Ctx<'js>, watch: &Watch<'_>) -> Result<()> {
    while ctx.execute_pending_job() {
        if watch.budget.tripped() {
            let _ = ctx.catch();
            return Err(watch.fault(ctx, CaughtError::Error(rquickjs::Error::Unknown)));
        }
    }
    Ok(())
}

/// Own enumerable exports whose value is a function. Exports whose getter
/// throws (an uninitialized `let`, say) are skipped.
fn exported_functions<'js>(ctx: &Ctx<'js>, exports: &Object<'js>) -> Vec<String> {
    let mut names: Vec<String> = exports.keys::<String>().filter_map(|k| k.ok()).collect();
    names.retain(|name| exported_function(ctx, exports, name).is_some());
    names
}

fn exported_function<'js>(
    ctx: &Ctx<'js>,
    exports: &Object<'js>,
    name: &str,
) -> Option<Function<'js>> {
    let listed = exports
        .keys::<String>()
        .filter_map(|k| k.ok())
        .any(|key| key == name);
    if !listed {
        return None;
    }
    match exports.get::<_, Value>(name) {
        Ok(value) => value.into_function(),
        Err(_) => {
            let _ = ctx.catch();
            None
        }
    }
}

fn mib(mb: u64) -> usize {
    usize::try_from(mb).unwrap_or(usize::MAX / MIB).saturating_mul(MIB)
}

fn sandbox_error(error: rquickjs::Error) -> HarnessError {
    HarnessError::Sandbox(error.to_string())
}
