//! DTM Smart Function Runtime
//!
//! Command-line front end for the harness: run a smart function on a JSON
//! input, print the transpiled bundle, or check a manifest.

mod settings;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use dtm_core::{DtmSmartFunctionManifest, ON_MESSAGE_FN_NAME};
use dtm_script::{RunnerStats, SmartFunctionsRunner, SourceArtifact};
use serde_json::Value;
use settings::{Overrides, Settings};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dtm")]
#[command(about = "Run DTM smart functions in a QuickJS sandbox", version = dtm_core::VERSION)]
struct Cli {
    /// JSON settings file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Call an exported function with a JSON input
    Run {
        /// Smart function source file
        source: PathBuf,
        /// Directory relative imports are resolved against
        #[arg(long)]
        base_dir: Option<PathBuf>,
        /// Exported function to call
        #[arg(short, long, default_value = ON_MESSAGE_FN_NAME)]
        function: String,
        /// JSON file holding the first argument
        #[arg(short, long)]
        input: PathBuf,
        /// JSON file holding the context argument
        #[arg(short, long)]
        context: Option<PathBuf>,
        /// Time budget in milliseconds
        #[arg(long)]
        timeout: Option<u64>,
        #[arg(long)]
        memory_limit_mb: Option<u64>,
        #[arg(long)]
        stack_size_mb: Option<u64>,
        /// Capture console output and print it after the result
        #[arg(long)]
        capture: bool,
        /// Print timing and outcome statistics
        #[arg(long)]
        stats: bool,
    },
    /// Print the bundled JavaScript for a source file
    Transpile {
        source: PathBuf,
        #[arg(long)]
        base_dir: Option<PathBuf>,
    },
    /// List the entries of a manifest
    Manifest {
        manifest: PathBuf,
        /// Load every enabled function and report its exports
        #[arg(long)]
        check: bool,
    },
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_env("DTM_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Settings::load_or_default(cli.config.as_deref())?;
    tracing::debug!("DTM runtime v{}", dtm_core::VERSION);

    match cli.command {
        Commands::Run {
            source,
            base_dir,
            function,
            input,
            context,
            timeout,
            memory_limit_mb,
            stack_size_mb,
            capture,
            stats,
        } => {
            let overrides = Overrides {
                timeout,
                memory_limit_mb,
                stack_size_mb,
                capture_console: capture,
            };
            let options = settings.runner_options(source, base_dir, &overrides);
            let input = read_json(&input)?;
            let context = context.as_deref().map(read_json).transpose()?;
            run(SmartFunctionsRunner::new(options), &function, input, context, stats)
        }
        Commands::Transpile { source, base_dir } => {
            let options = settings.runner_options(source, base_dir, &Overrides::default());
            let artifact = SourceArtifact::from_options(&options).prepare()?;
            for module in artifact.modules() {
                tracing::info!(
                    module = %module.id,
                    first_line = module.first_line,
                    lines = module.line_count,
                    "bundled"
                );
            }
            println!("{}", artifact.code());
            Ok(())
        }
        Commands::Manifest { manifest, check } => list_manifest(&settings, &manifest, check),
    }
}

fn read_json(path: &Path) -> Result<Value> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn run(
    mut runner: SmartFunctionsRunner,
    function: &str,
    input: Value,
    context: Option<Value>,
    stats: bool,
) -> Result<()> {
    runner.initialize()?;
    let outcome = runner.execute(function, input, context);

    if let Ok(value) = &outcome {
        println!("{}", serde_json::to_string_pretty(value)?);
    }
    for log in runner.console_logs() {
        println!("[{}] {}", log.level, log.message());
    }
    if stats {
        print_stats(runner.stats());
    }
    runner.dispose();

    outcome.with_context(|| format!("calling {function}"))?;
    Ok(())
}

fn print_stats(stats: &RunnerStats) {
    eprintln!("=== Runner stats ===");
    for (phase, elapsed) in stats.phases.iter() {
        eprintln!("  {phase:<10} {:.2}ms", elapsed.as_secs_f64() * 1000.0);
    }
    eprintln!(
        "  calls      {} (avg {:.2}ms, max {:.2}ms)",
        stats.outcomes.total(),
        stats.latency.average_ms(),
        stats.latency.max_ms()
    );
    for (outcome, count) in stats.outcomes.iter() {
        eprintln!("  {outcome:<10} {count}");
    }
}

fn list_manifest(settings: &Settings, path: &Path, check: bool) -> Result<()> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let entries = DtmSmartFunctionManifest::parse_all(&text)
        .with_context(|| format!("parsing {}", path.display()))?;
    let base_dir = path.parent().map(Path::to_path_buf);

    let mut failures = 0;
    for entry in &entries {
        let state = if entry.is_enabled() { "enabled" } else { "disabled" };
        println!(
            "{:<24} {:<28} {:<12} {state}",
            entry.name,
            entry.smart_function_file,
            entry.input.kind.as_str()
        );
        if !check || !entry.is_enabled() {
            continue;
        }

        let mut options = settings.runner_options(
            PathBuf::from(&entry.smart_function_file),
            base_dir.clone(),
            &Overrides::default(),
        );
        if entry.params.is_some() {
            options.params = entry.params.clone();
        }
        let mut runner = SmartFunctionsRunner::new(options);
        match runner.initialize() {
            Ok(()) if runner.exported_functions().iter().any(|f| f == ON_MESSAGE_FN_NAME) => {
                println!("    exports: {}", runner.exported_functions().join(", "));
            }
            Ok(()) => {
                failures += 1;
                println!("    error: {ON_MESSAGE_FN_NAME} is not exported");
            }
            Err(e) => {
                failures += 1;
                println!("    error: {e}");
            }
        }
        runner.dispose();
    }

    if failures > 0 {
        bail!("{failures} of {} manifest entries failed to load", entries.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn bundled_manifest_loads() {
        let manifest = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../functions/manifest.json");
        list_manifest(&Settings::default(), &manifest, true).unwrap();
    }

    #[test]
    fn manifest_check_reports_broken_entries() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("ok.ts"), "export function onMessage() { return null; }\n").unwrap();
        fs::write(dir.path().join("other.ts"), "export function handle() {}\n").unwrap();
        let manifest = dir.path().join("manifest.json");
        fs::write(
            &manifest,
            r#"[
                { "name": "ok", "smartFunctionFile": "ok.ts", "input": { "type": "measurement" } },
                { "name": "other", "smartFunctionFile": "other.ts", "input": { "type": "event" } },
                { "name": "gone", "smartFunctionFile": "gone.ts", "input": { "type": "alarm" }, "disabled": true }
            ]"#,
        )
        .unwrap();

        let err = list_manifest(&Settings::default(), &manifest, true).unwrap_err();
        assert_eq!(err.to_string(), "1 of 3 manifest entries failed to load");
        assert!(list_manifest(&Settings::default(), &manifest, false).is_ok());
    }
}
