//! Sandbox worker
//!
//! Each harness owns one worker thread that owns the script runtime. The
//! caller talks to it over channels and never waits longer than the time
//! budget plus a grace period: the interrupt handler stops runaway scripts
//! on the worker, the receive timeout covers a worker stuck where the
//! interrupt handler cannot reach.
//!
//! A timed-out runtime may have been interrupted anywhere, so the worker
//! exits after reporting the timeout and the sandbox refuses further calls.

use crate::console::{ConsoleLog, ConsoleMode};
use crate::error::{HarnessError, Result};
use crate::runtime::{RuntimeLimits, ScriptRuntime};
use crate::source::CompiledArtifact;
use serde_json::{Map, Value as Json};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const BACKSTOP_GRACE: Duration = Duration::from_millis(500);
const DEFAULT_THREAD_STACK: usize = 8 * 1024 * 1024;
const THREAD_STACK_HEADROOM: usize = 4 * 1024 * 1024;

#[derive(Debug, Clone)]
pub(crate) struct SandboxConfig {
    pub timeout: Duration,
    pub limits: RuntimeLimits,
    pub console: ConsoleMode,
    pub params: Option<Map<String, Json>>,
}

enum Command {
    Call {
        function: String,
        input: Json,
        context: Option<Json>,
        reply: Sender<CallReply>,
    },
    Shutdown,
}

pub(crate) struct CallReply {
    pub outcome: Result<Json>,
    pub logs: Vec<ConsoleLog>,
    pub elapsed: Duration,
}

struct InitReply {
    outcome: Result<Vec<String>>,
    logs: Vec<ConsoleLog>,
}

pub(crate) struct Started {
    pub sandbox: Sandbox,
    pub exports: Vec<String>,
}

pub(crate) struct Sandbox {
    commands: Sender<Command>,
    worker: Option<JoinHandle<()>>,
    timeout: Duration,
    poisoned: bool,
    /// The worker stopped answering; it is detached instead of joined.
    wedged: bool,
}

impl Sandbox {
    /// Spawns the worker and evaluates the artifact on it. Console output
    /// produced during evaluation is returned whether or not it succeeded.
    pub(crate) fn start(
        artifact: Arc<CompiledArtifact>,
        config: SandboxConfig,
    ) -> (Result<Started>, Vec<ConsoleLog>) {
        let timeout = config.timeout;
        let stack = match config.limits.stack_size_mb {
            Some(mb) => usize::try_from(mb)
                .unwrap_or(usize::MAX)
                .saturating_mul(1024 * 1024)
                .saturating_add(THREAD_STACK_HEADROOM),
            None => DEFAULT_THREAD_STACK,
        };

        let (init_tx, init_rx) = mpsc::channel();
        let (commands, command_rx) = mpsc::channel();
        let spawned = thread::Builder::new()
            .name("dtm-sandbox".into())
            .stack_size(stack)
            .spawn(move || worker(artifact, config, init_tx, command_rx));
        let worker = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                return (
                    Err(HarnessError::Sandbox(format!("failed to spawn worker: {e}"))),
                    Vec::new(),
                )
            }
        };

        let started = Instant::now();
        match init_rx.recv_timeout(timeout + BACKSTOP_GRACE) {
            Ok(InitReply {
                outcome: Ok(exports),
                logs,
            }) => {
                let sandbox = Sandbox {
                    commands,
                    worker: Some(worker),
                    timeout,
                    poisoned: false,
                    wedged: false,
                };
                (Ok(Started { sandbox, exports }), logs)
            }
            Ok(InitReply {
                outcome: Err(e),
                logs,
            }) => {
                let _ = worker.join();
                (Err(e), logs)
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!("sandbox worker unresponsive during evaluation; detaching it");
                (
                    Err(HarnessError::Timeout {
                        budget: timeout,
                        elapsed: started.elapsed(),
                    }),
                    Vec::new(),
                )
            }
            Err(RecvTimeoutError::Disconnected) => {
                let _ = worker.join();
                (
                    Err(HarnessError::Sandbox("worker exited during start-up".into())),
                    Vec::new(),
                )
            }
        }
    }

    pub(crate) fn call(&mut self, function: &str, input: Json, context: Option<Json>) -> CallReply {
        let failed = |error| CallReply {
            outcome: Err(error),
            logs: Vec::new(),
            elapsed: Duration::ZERO,
        };
        if self.poisoned {
            return failed(HarnessError::Poisoned);
        }

        let (reply, reply_rx) = mpsc::channel();
        let command = Command::Call {
            function: function.to_string(),
            input,
            context,
            reply,
        };
        if self.commands.send(command).is_err() {
            self.poisoned = true;
            return failed(HarnessError::Sandbox("worker is gone".into()));
        }

        let started = Instant::now();
        match reply_rx.recv_timeout(self.timeout + BACKSTOP_GRACE) {
            Ok(reply) => {
                if matches!(reply.outcome, Err(HarnessError::Timeout { .. })) {
                    self.poisoned = true;
                }
                reply
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(function, "sandbox worker unresponsive; detaching it");
                self.poisoned = true;
                self.wedged = true;
                CallReply {
                    outcome: Err(HarnessError::Timeout {
                        budget: self.timeout,
                        elapsed: started.elapsed(),
                    }),
                    logs: Vec::new(),
                    elapsed: started.elapsed(),
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                self.poisoned = true;
                failed(HarnessError::Sandbox("worker exited during a call".into()))
            }
        }
    }

    pub(crate) fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Stops the worker. Idempotent.
    pub(crate) fn shutdown(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        let _ = self.commands.send(Command::Shutdown);
        if self.wedged {
            drop(worker);
            return;
        }
        if worker.join().is_err() {
            tracing::warn!("sandbox worker panicked");
        }
    }
}

impl Drop for Sandbox {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker(
    artifact: Arc<CompiledArtifact>,
    config: SandboxConfig,
    init: Sender<InitReply>,
    commands: Receiver<Command>,
) {
    let mut runtime = match ScriptRuntime::new(&config.limits, &config.console, config.params) {
        Ok(runtime) => runtime,
        Err(e) => {
            let _ = init.send(InitReply {
                outcome: Err(e),
                logs: Vec::new(),
            });
            return;
        }
    };

    let outcome = runtime.evaluate(artifact, config.timeout);
    let failed = outcome.is_err();
    let _ = init.send(InitReply {
        outcome,
        logs: runtime.take_logs(),
    });
    if failed {
        return;
    }

    while let Ok(command) = commands.recv() {
        match command {
            Command::Call {
                function,
                input,
                context,
                reply,
            } => {
                let started = Instant::now();
                let outcome = runtime.call(&function, &input, context.as_ref(), config.timeout);
                let timed_out = matches!(outcome, Err(HarnessError::Timeout { .. }));
                let _ = reply.send(CallReply {
                    outcome,
                    logs: runtime.take_logs(),
                    elapsed: started.elapsed(),
                });
                if timed_out {
                    tracing::debug!(function, "retiring sandbox worker after timeout");
                    break;
                }
            }
            Command::Shutdown => break,
        }
    }
}
