//! DTM Smart Function Harness
//!
//! Runs TypeScript smart functions inside a QuickJS sandbox.
//!
//! ## Architecture
//!
//! - **Transpile:** type erasure that keeps every line where it was, so
//!   engine line numbers are source line numbers
//! - **Bundle:** the entry module plus its relative imports, wrapped in a
//!   small CommonJS-style loader
//! - **Sandbox:** one worker thread per harness owning the QuickJS runtime,
//!   with a time budget, memory and stack limits
//! - **FFI:** values cross the boundary as JSON; `console` is captured or
//!   forwarded to a [`ConsoleSink`]
//!
//! ```no_run
//! use dtm_script::{RunnerOptions, SmartFunctionsRunner};
//! use serde_json::json;
//!
//! let mut runner = SmartFunctionsRunner::new(RunnerOptions::new("onmessage.fn.ts"));
//! runner.initialize()?;
//! let out = runner.execute("onMessage", json!({ "cumulocityType": "measurement" }), None)?;
//! println!("{out}");
//! # Ok::<(), dtm_script::HarnessError>(())
//! ```

pub mod console;
pub mod error;
mod ffi;
pub mod options;
pub mod runner;
mod runtime;
mod sandbox;
mod smart;
pub mod source;
pub mod transpile;

pub use console::{ConsoleLog, ConsoleMode, ConsoleSink, LogLevel, TracingConsole};
pub use error::{HarnessError, Result};
pub use options::{CompilerOptions, RunnerOptions, DEFAULT_TIMEOUT_MS};
pub use runner::{ExecutionReport, RunnerStats, SmartFunctionsRunner};
pub use source::{CompiledArtifact, ModuleInfo, SourceArtifact};
pub use transpile::{transpile_module, ModuleRequest, TranspiledModule};

pub use rquickjs;
