//! `mgraph apply` — Evaluate every instance in dependency order.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Args;
use modgraph_common::config::EngineConfig;
use modgraph_common::constants::{APP_NAME, DEFAULT_DECLARATION_FILE};
use modgraph_common::types::Variables;
use modgraph_runtime::Engine;
use modgraph_runtime::executor::{EchoExecutor, ModuleExecutor, ProcessExecutor};
use modgraph_runtime::report::RunReport;

use crate::output::{BOLD, DIM, GREEN, RED, RESET, format_elapsed, format_outputs, plural, state_marker};

/// Executor name that echoes arguments back as outputs.
const ECHO_EXECUTOR: &str = "echo";

/// Arguments for the `apply` command.
#[derive(Args, Debug)]
pub struct ApplyArgs {
    /// Declaration file, or a directory containing `main.mg`.
    #[arg(default_value = DEFAULT_DECLARATION_FILE)]
    pub file: PathBuf,

    /// Program run once per instance, or `echo` to return arguments as
    /// outputs. The program receives the request as JSON on stdin, runs in
    /// the module's source directory, and prints a JSON object of outputs.
    #[arg(short, long, default_value = ECHO_EXECUTOR)]
    pub executor: String,

    /// Extra arguments passed to the executor program.
    #[arg(last = true)]
    pub executor_args: Vec<String>,

    /// Print the run report as JSON instead of a summary.
    #[arg(long)]
    pub json: bool,
}

/// Executes the `apply` command.
///
/// # Errors
///
/// Returns an error if planning fails or any instance fails to evaluate.
pub fn execute(args: &ApplyArgs, config: EngineConfig, variables: Variables) -> anyhow::Result<()> {
    let declarations = super::load_declarations(&args.file)?;
    let engine = Engine::new(config)?.with_variables(variables);
    let executor = build_executor(args);

    let runtime = tokio::runtime::Runtime::new()?;
    let report = runtime.block_on(engine.apply(&declarations, executor))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if !report.is_success() {
        anyhow::bail!(
            "{} failed",
            plural(report.origin_failures().count(), "instance")
        );
    }
    Ok(())
}

fn build_executor(args: &ApplyArgs) -> Arc<dyn ModuleExecutor> {
    if args.executor == ECHO_EXECUTOR {
        return Arc::new(EchoExecutor);
    }
    let base_dir = base_dir(&super::declaration_path(&args.file));
    tracing::debug!(program = %args.executor, base_dir = %base_dir.display(), "using process executor");
    Arc::new(ProcessExecutor::new(&args.executor, base_dir).with_args(args.executor_args.clone()))
}

/// Module sources resolve against the declaration file's directory.
fn base_dir(file: &Path) -> PathBuf {
    match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn print_report(report: &RunReport) {
    eprintln!();
    eprintln!("  {BOLD}{APP_NAME}{RESET} {DIM}v{}{RESET}", env!("CARGO_PKG_VERSION"));
    eprintln!();

    for (id, state) in &report.states {
        let color = if report.failure(id).is_some() { RED } else { GREEN };
        println!("  {color}{}{RESET} {BOLD}{id}{RESET}", state_marker(*state));
        if let Some(outputs) = report.outputs.get(id) {
            for line in format_outputs(outputs) {
                println!("      {line}");
            }
        }
        if let Some(error) = report.failure(id) {
            println!("      {RED}{error}{RESET}");
        }
    }

    eprintln!();
    eprintln!(
        "  {} done, {} failed in {}",
        plural(report.outputs.len(), "instance"),
        report.failures.len(),
        format_elapsed(report.elapsed_ms)
    );
}
