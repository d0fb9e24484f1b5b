//! `mgraph plan` — Display the evaluation order before applying.

use std::path::PathBuf;

use clap::Args;
use modgraph_common::config::EngineConfig;
use modgraph_common::constants::DEFAULT_DECLARATION_FILE;
use modgraph_common::types::Variables;
use modgraph_compose::graph::DependencyGraph;
use modgraph_runtime::Engine;

use crate::output::{BOLD, DIM, RESET, plural};

/// Arguments for the `plan` command.
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Declaration file, or a directory containing `main.mg`.
    #[arg(default_value = DEFAULT_DECLARATION_FILE)]
    pub file: PathBuf,
}

/// Executes the `plan` command.
///
/// Parses the declarations, expands every module into instances, resolves
/// references into the dependency graph, and lists instances in an order
/// where each appears after everything it depends on.
///
/// # Errors
///
/// Returns an error if parsing, expansion, or resolution fails.
pub fn execute(args: &PlanArgs, config: EngineConfig, variables: Variables) -> anyhow::Result<()> {
    let declarations = super::load_declarations(&args.file)?;
    let graph = Engine::new(config)?
        .with_variables(variables)
        .plan(&declarations)?;

    println!("Evaluation plan for: {}", args.file.display());
    println!();
    for line in plan_lines(&graph)? {
        println!("{line}");
    }
    println!();
    println!(
        "  {BOLD}{}{RESET} in {} will be evaluated.",
        plural(graph.node_count(), "instance"),
        plural(declarations.len(), "module")
    );
    Ok(())
}

/// One `+ instance (source)` line per instance in evaluation order, each
/// followed by the instances it waits on.
fn plan_lines(graph: &DependencyGraph) -> anyhow::Result<Vec<String>> {
    let registry = graph.registry();
    let mut lines = Vec::new();
    for idx in graph.resolve_order()? {
        let Some(instance) = registry.get(idx) else {
            continue;
        };
        lines.push(format!(
            "  + {} {DIM}({}){RESET}",
            instance.id, instance.source
        ));
        let deps: Vec<String> = graph
            .dependencies(idx)
            .into_iter()
            .filter_map(|dep| registry.get(dep).map(|d| d.id.to_string()))
            .collect();
        if !deps.is_empty() {
            lines.push(format!("      after: {}", deps.join(", ")));
        }
    }
    Ok(lines)
}
