//! CLI command definitions and dispatch.

pub mod apply;
pub mod plan;
pub mod tree;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use modgraph_common::config::EngineConfig;
use modgraph_common::constants::{
    BIN_NAME, DECLARATION_EXTENSION, DEFAULT_DECLARATION_FILE, JSON_VARIABLES_EXTENSION,
};
use modgraph_common::types::Variables;
use modgraph_compose::parser::ast::ModuleDeclaration;

/// modgraph — expand, resolve, and evaluate module graphs.
#[derive(Parser, Debug)]
#[command(name = "mgraph", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Maximum number of instances evaluated concurrently.
    #[arg(long, global = true, env = "MGRAPH_PARALLELISM")]
    pub parallelism: Option<usize>,

    /// Per-instance evaluation deadline in seconds.
    #[arg(long, global = true, env = "MGRAPH_TIMEOUT")]
    pub timeout: Option<u64>,

    /// JSON engine configuration file; flags override its values.
    #[arg(long, global = true, env = "MGRAPH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Root input variable as `name=value`, readable as `var.<name>`.
    #[arg(long = "var", global = true, value_name = "NAME=VALUE")]
    pub vars: Vec<String>,

    /// File of `name = value` assignments, or a JSON object when the file
    /// ends in `.json`. Later files and `--var` flags take precedence.
    #[arg(long = "var-file", global = true, value_name = "FILE")]
    pub var_files: Vec<PathBuf>,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Expand and resolve declarations, then print the evaluation order.
    Plan(plan::PlanArgs),
    /// Print the declared module structure as a tree.
    Tree(tree::TreeArgs),
    /// Evaluate every instance and print its outputs.
    Apply(apply::ApplyArgs),
}

impl Cli {
    /// Builds the engine configuration from the config file and flags.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be loaded or the result
    /// is invalid.
    pub fn engine_config(&self) -> anyhow::Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::from_json_file(path)?,
            None => EngineConfig::default(),
        };
        if let Some(parallelism) = self.parallelism {
            config.parallelism = parallelism;
        }
        if let Some(timeout) = self.timeout {
            config.instance_timeout_secs = Some(timeout);
        }
        config.validate()?;
        Ok(config)
    }

    /// Collects root input variables from `--var-file` and `--var`.
    ///
    /// # Errors
    ///
    /// Returns an error if a variables file cannot be loaded or a `--var`
    /// flag is not of the form `name=value`.
    pub fn variables(&self) -> anyhow::Result<Variables> {
        let mut variables = Variables::new();
        for path in &self.var_files {
            variables.extend(load_variables(path)?);
        }
        for raw in &self.vars {
            let Some((name, value)) = raw.split_once('=') else {
                anyhow::bail!("invalid --var {raw:?}: expected name=value");
            };
            let name = name.trim();
            if name.is_empty() {
                anyhow::bail!("invalid --var {raw:?}: variable name is empty");
            }
            let _ = variables.insert(
                name.to_owned(),
                modgraph_compose::parser::parse_variable_value(value),
            );
        }
        Ok(variables)
    }
}

/// Reads a variables file, as a JSON object or as `name = value` lines.
///
/// # Errors
///
/// Returns an error if the file cannot be read or does not parse.
pub fn load_variables(path: &Path) -> anyhow::Result<Variables> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read variables file {}", path.display()))?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext == JSON_VARIABLES_EXTENSION);
    let variables: Variables = if is_json {
        serde_json::from_str(&content)
            .with_context(|| format!("{} must hold a JSON object", path.display()))?
    } else {
        modgraph_compose::parser::parse_variables(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?
    };
    tracing::debug!(file = %path.display(), variables = variables.len(), "loaded variables");
    Ok(variables)
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let config = cli.engine_config()?;
    let variables = cli.variables()?;
    match cli.command {
        Command::Plan(args) => plan::execute(&args, config, variables),
        Command::Tree(args) => tree::execute(&args, &variables),
        Command::Apply(args) => apply::execute(&args, config, variables),
    }
}

/// Resolves a CLI path argument to a declaration file.
///
/// A directory is searched for the default declaration file.
pub fn declaration_path(path: &Path) -> PathBuf {
    if path.is_dir() {
        path.join(DEFAULT_DECLARATION_FILE)
    } else {
        path.to_path_buf()
    }
}

/// Reads and parses the declarations at `path`.
///
/// # Errors
///
/// Returns an error if the file is missing or does not parse.
pub fn load_declarations(path: &Path) -> anyhow::Result<Vec<ModuleDeclaration>> {
    let file = declaration_path(path);
    if !file.exists() {
        anyhow::bail!(
            "declaration file not found: {}\n\
             Create a {DECLARATION_EXTENSION} file or specify a path: {BIN_NAME} <command> <file>",
            file.display()
        );
    }
    let parsed = modgraph_compose::parser::parse_file(&file)
        .with_context(|| format!("failed to load {}", file.display()))?;
    tracing::debug!(file = %file.display(), modules = parsed.modules.len(), "loaded declarations");
    Ok(parsed.modules)
}

#[cfg(test)]
mod tests {
    use modgraph_common::types::Value;

    use super::*;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).expect("should parse")
    }

    #[test]
    fn flags_override_defaults() {
        let cli = cli(&["mgraph", "--parallelism", "3", "--timeout", "20", "plan"]);
        let config = cli.engine_config().expect("config");
        assert_eq!(config.parallelism, 3);
        assert_eq!(config.instance_timeout_secs, Some(20));
    }

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{ "parallelism": 4, "instance_timeout_secs": 9 }"#)
            .expect("write");
        let path = path.to_string_lossy().into_owned();
        let cli = cli(&["mgraph", "--config", &path, "--parallelism", "2", "tree"]);
        let config = cli.engine_config().expect("config");
        assert_eq!(config.parallelism, 2);
        assert_eq!(config.instance_timeout_secs, Some(9));
    }

    #[test]
    fn zero_parallelism_is_rejected() {
        let cli = cli(&["mgraph", "--parallelism", "0", "plan"]);
        assert!(cli.engine_config().is_err());
    }

    #[test]
    fn var_flags_override_var_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let text = dir.path().join("prod.vars");
        std::fs::write(&text, "region = \"eu\"\nreplicas = 2\n").expect("write");
        let json = dir.path().join("zones.json");
        std::fs::write(&json, r#"{ "replicas": 3, "zones": { "a": "eu-1a" } }"#).expect("write");
        let text = text.to_string_lossy().into_owned();
        let json = json.to_string_lossy().into_owned();
        let cli = cli(&[
            "mgraph", "--var-file", &text, "--var-file", &json, "--var", "region=us", "plan",
        ]);
        let variables = cli.variables().expect("variables");
        assert_eq!(variables["region"], Value::from("us"));
        assert_eq!(variables["replicas"], Value::Int(3));
        assert!(matches!(&variables["zones"], Value::Map(zones) if zones.len() == 1));
    }

    #[test]
    fn var_flag_values_keep_literal_types() {
        let cli = cli(&["mgraph", "--var", "replicas=4", "--var", "name=db-main", "tree"]);
        let variables = cli.variables().expect("variables");
        assert_eq!(variables["replicas"], Value::Int(4));
        assert_eq!(variables["name"], Value::from("db-main"));
    }

    #[test]
    fn var_flag_without_equals_is_rejected() {
        let cli = cli(&["mgraph", "--var", "region", "plan"]);
        let err = cli.variables().unwrap_err();
        assert!(err.to_string().contains("expected name=value"), "got: {err}");
    }

    #[test]
    fn json_var_file_must_be_an_object() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "[1, 2]").expect("write");
        assert!(load_variables(&path).is_err());
    }

    #[test]
    fn directory_resolves_to_default_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert_eq!(
            declaration_path(dir.path()),
            dir.path().join(DEFAULT_DECLARATION_FILE)
        );
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = load_declarations(&dir.path().join("absent.mg")).unwrap_err();
        assert!(err.to_string().contains("not found"), "got: {err}");
    }

    #[test]
    fn declarations_load_from_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join(DEFAULT_DECLARATION_FILE),
            "module \"a\" {\n  source = \"./a\"\n}\n",
        )
        .expect("write");
        let decls = load_declarations(dir.path()).expect("load");
        assert_eq!(decls.len(), 1);
        assert_eq!(decls[0].name, "a");
    }
}
