//! Engine that wires expansion, resolution, and evaluation together.

use std::sync::Arc;

use modgraph_common::config::EngineConfig;
use modgraph_common::error::Result;
use modgraph_common::types::Variables;
use modgraph_compose::graph::DependencyGraph;
use modgraph_compose::parser::ast::ModuleDeclaration;

use crate::executor::ModuleExecutor;
use crate::report::RunReport;
use crate::scheduler::Scheduler;

/// The engine that coordinates a full run over a set of declarations.
///
/// Structural errors (declaration, expansion, reference, cycle) abort
/// before any module executes. Evaluation errors are collected in the
/// returned [`RunReport`].
#[derive(Debug, Clone, Default)]
pub struct Engine {
    config: EngineConfig,
    variables: Variables,
}

impl Engine {
    /// Creates an engine with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            variables: Variables::new(),
        })
    }

    /// Sets the root input variables readable as `var.<name>`.
    #[must_use]
    pub fn with_variables(mut self, variables: Variables) -> Self {
        self.variables = variables;
        self
    }

    /// The configuration the engine runs with.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Root input variables the engine plans with.
    #[must_use]
    pub const fn variables(&self) -> &Variables {
        &self.variables
    }

    /// Expands declarations and resolves their dependency graph.
    ///
    /// # Errors
    ///
    /// Returns a declaration, expansion, reference, or cycle error.
    pub fn plan(&self, declarations: &[ModuleDeclaration]) -> Result<DependencyGraph> {
        let registry = modgraph_compose::expand_with_variables(declarations, &self.variables)?;
        modgraph_compose::resolve(Arc::new(registry))
    }

    /// Plans and evaluates the declarations.
    ///
    /// # Errors
    ///
    /// Returns an error if planning fails. Per-instance failures are
    /// reported in the returned report instead.
    pub async fn apply(
        &self,
        declarations: &[ModuleDeclaration],
        executor: Arc<dyn ModuleExecutor>,
    ) -> Result<RunReport> {
        let graph = self.plan(declarations)?;
        Scheduler::new(&self.config)?.run(&graph, executor).await
    }
}

#[cfg(test)]
mod tests {
    use modgraph_common::error::ModgraphError;
    use modgraph_common::types::InstanceId;
    use modgraph_compose::parser::ast::Expression;

    use super::*;
    use crate::executor::EchoExecutor;

    #[test]
    fn plan_builds_graph() {
        let decls = vec![
            ModuleDeclaration::new("a", "./a").with_argument("v", Expression::literal(1_i64)),
            ModuleDeclaration::new("b", "./b").with_argument("v", Expression::attr("a", "v")),
        ];
        let graph = Engine::default().plan(&decls).expect("plan");
        assert_eq!(
            graph.edges(),
            vec![(InstanceId::singleton("b"), InstanceId::singleton("a"))]
        );
    }

    #[tokio::test]
    async fn apply_aborts_on_structural_error() {
        let decls = vec![
            ModuleDeclaration::new("b", "./b").with_argument("v", Expression::attr("a", "v")),
        ];
        let err = Engine::default()
            .apply(&decls, Arc::new(EchoExecutor))
            .await
            .unwrap_err();
        assert!(matches!(err, ModgraphError::Reference { .. }), "got: {err}");
    }

    #[tokio::test]
    async fn apply_chains_echoed_outputs() {
        let decls = vec![
            ModuleDeclaration::new("a", "./a").with_argument("v", Expression::literal("hello")),
            ModuleDeclaration::new("b", "./b").with_argument(
                "n",
                Expression::call("length", vec![Expression::attr("a", "v")]),
            ),
        ];
        let report = Engine::default()
            .apply(&decls, Arc::new(EchoExecutor))
            .await
            .expect("apply");
        assert!(report.is_success());
        let b = &report.outputs[&InstanceId::singleton("b")];
        assert_eq!(b["n"], modgraph_common::types::Value::Int(5));
    }

    #[tokio::test]
    async fn apply_passes_variables_to_arguments() {
        let mut variables = Variables::new();
        let _ = variables.insert("replicas".into(), modgraph_common::types::Value::Int(2));
        let _ = variables.insert("region".into(), modgraph_common::types::Value::from("eu"));
        let decls = vec![
            ModuleDeclaration::new("db", "./db")
                .with_count(Expression::var("replicas"))
                .with_argument("region", Expression::var("region")),
        ];
        let engine = Engine::default().with_variables(variables);
        assert_eq!(engine.variables().len(), 2);
        let report = engine
            .apply(&decls, Arc::new(EchoExecutor))
            .await
            .expect("apply");
        assert!(report.is_success());
        assert_eq!(report.outputs.len(), 2);
        let db1 = &report.outputs[&InstanceId::keyed("db", modgraph_common::types::InstanceKey::Index(1))];
        assert_eq!(db1["region"], modgraph_common::types::Value::from("eu"));
    }

    #[test]
    fn engine_rejects_invalid_config() {
        let config = EngineConfig {
            parallelism: 0,
            ..EngineConfig::default()
        };
        assert!(Engine::new(config).is_err());
    }
}
