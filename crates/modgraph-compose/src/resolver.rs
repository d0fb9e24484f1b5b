//! Reference discovery and dependency graph construction.
//!
//! Walks every instance's argument expressions, resolves each attribute
//! reference to concrete target instances, and records one dependency
//! edge per target.

use std::sync::Arc;

use modgraph_common::error::{ModgraphError, ReferenceError, Result};
use modgraph_common::types::{InstanceId, InstanceKey};

use crate::graph::DependencyGraph;
use crate::parser::ast::Expression;
use crate::registry::InstanceRegistry;

/// A reference to another module or a root variable found inside an
/// expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    /// `module.<module>[<key>].<path>`: reads from one instance.
    Instance {
        /// Referenced module.
        module: String,
        /// Selected instance key, if any.
        key: Option<InstanceKey>,
    },
    /// `module.<module>`, optionally indexed by a constant key.
    Module {
        /// Referenced module.
        module: String,
        /// Constant index applied to the whole module value.
        index: Option<InstanceKey>,
    },
    /// `var.<name>`: reads a root input variable, never an instance.
    Variable {
        /// Variable name.
        name: String,
    },
}

/// Collects every module reference contained in an expression.
#[must_use]
pub fn references(expr: &Expression) -> Vec<Reference> {
    let mut out = Vec::new();
    collect(expr, &mut out);
    out
}

fn collect(expr: &Expression, out: &mut Vec<Reference>) {
    match expr {
        Expression::Literal(_) => {}
        Expression::VariableRef { name, .. } => out.push(Reference::Variable { name: name.clone() }),
        Expression::AttributeRef { module, key, path } => {
            if key.is_none() && path.is_empty() {
                out.push(Reference::Module {
                    module: module.clone(),
                    index: None,
                });
            } else {
                out.push(Reference::Instance {
                    module: module.clone(),
                    key: key.clone(),
                });
            }
        }
        Expression::Indexed { target, key } => {
            if let (
                Expression::AttributeRef {
                    module,
                    key: None,
                    path,
                },
                Some(literal),
            ) = (target.as_ref(), key.as_literal())
            {
                if path.is_empty() {
                    out.push(Reference::Module {
                        module: module.clone(),
                        index: InstanceKey::from_value(literal),
                    });
                    return;
                }
            }
            collect(target, out);
            collect(key, out);
        }
        Expression::FunctionCall { args, .. } => {
            for arg in args {
                collect(arg, out);
            }
        }
    }
}

/// Resolves a reference to the arena indices of the instances it reads.
///
/// # Errors
///
/// Returns a [`ReferenceError`] if the module or variable is unknown, a key
/// is missing or does not exist, or a key is used against a non-expanded
/// module.
pub fn targets(
    registry: &InstanceRegistry,
    reference: &Reference,
) -> std::result::Result<Vec<usize>, ReferenceError> {
    let module = match reference {
        Reference::Instance { module, .. } | Reference::Module { module, .. } => module,
        Reference::Variable { name } => {
            return if registry.variables().contains_key(name) {
                Ok(Vec::new())
            } else {
                Err(ReferenceError::UnknownVariable { name: name.clone() })
            };
        }
    };
    let expanded = registry
        .is_expanded(module)
        .ok_or_else(|| ReferenceError::UnknownModule {
            module: module.clone(),
        })?;

    match (reference, expanded) {
        (Reference::Instance { key: None, .. }, true) => Err(ReferenceError::MissingKey {
            module: module.clone(),
        }),
        (
            Reference::Instance { key: Some(key), .. } | Reference::Module { index: Some(key), .. },
            true,
        ) => registry
            .index_of(&InstanceId::keyed(module.clone(), key.clone()))
            .map(|idx| vec![idx])
            .ok_or_else(|| ReferenceError::UnknownKey {
                module: module.clone(),
                key: key.clone(),
            }),
        (Reference::Module { index: None, .. }, true) => Ok(registry.instances_of(module).to_vec()),
        (Reference::Instance { key: Some(_), .. }, false) => Err(ReferenceError::NotKeyed {
            module: module.clone(),
        }),
        (Reference::Instance { key: None, .. } | Reference::Module { .. }, false) => Ok(registry
            .index_of(&InstanceId::singleton(module.clone()))
            .into_iter()
            .collect()),
        (Reference::Variable { .. }, _) => Ok(Vec::new()),
    }
}

/// Builds the dependency graph over every instance and checks it is acyclic.
///
/// # Errors
///
/// Returns [`ModgraphError::Reference`] for the first unresolvable reference
/// and [`ModgraphError::Cycle`] if the instances depend on each other
/// circularly.
pub fn resolve(registry: Arc<InstanceRegistry>) -> Result<DependencyGraph> {
    tracing::info!(instances = registry.len(), "resolving references");
    let mut graph = DependencyGraph::new(Arc::clone(&registry));

    for (idx, instance) in registry.iter().enumerate() {
        for expr in instance.arguments.values() {
            for reference in references(expr) {
                let deps = targets(&registry, &reference).map_err(|source| {
                    ModgraphError::Reference {
                        instance: instance.id.clone(),
                        source,
                    }
                })?;
                for dep in deps {
                    tracing::debug!(
                        from = %instance.id,
                        to = %registry.get(dep).map_or_else(String::new, |i| i.id.to_string()),
                        "dependency"
                    );
                    graph.add_dependency(idx, dep);
                }
            }
        }
    }

    let _ = graph.resolve_order()?;
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use modgraph_common::types::Value;

    use super::*;
    use crate::expander::{expand, expand_with_variables};
    use crate::parser::ast::ModuleDeclaration;

    fn for_each_xyz() -> Expression {
        let mut map = BTreeMap::new();
        let _ = map.insert("x".to_string(), Value::Int(2));
        let _ = map.insert("y".to_string(), Value::Int(3));
        let _ = map.insert("z".to_string(), Value::Int(5));
        Expression::literal(Value::Map(map))
    }

    fn bar_and_foo(reference: Expression) -> Vec<ModuleDeclaration> {
        vec![
            ModuleDeclaration::new("bar", "./bar").with_for_each(for_each_xyz()),
            ModuleDeclaration::new("foo", "./foo")
                .with_argument("length", Expression::call("length", vec![reference])),
        ]
    }

    fn resolve_decls(decls: &[ModuleDeclaration]) -> Result<DependencyGraph> {
        resolve(Arc::new(expand(decls)?))
    }

    fn key(k: &str) -> InstanceKey {
        InstanceKey::Name(k.into())
    }

    #[test]
    fn references_are_collected_from_nested_expressions() {
        let expr = Expression::call(
            "length",
            vec![Expression::indexed(
                Expression::keyed_attr("bar", key("x"), "tags"),
                Expression::attr("foo", "name"),
            )],
        );
        assert_eq!(
            references(&expr),
            vec![
                Reference::Instance {
                    module: "bar".into(),
                    key: Some(key("x")),
                },
                Reference::Instance {
                    module: "foo".into(),
                    key: None,
                },
            ]
        );
    }

    #[test]
    fn literal_has_no_references() {
        assert!(references(&Expression::literal("a")).is_empty());
    }

    #[test]
    fn single_edge_from_foo_to_bar_x() {
        let graph = resolve_decls(&bar_and_foo(Expression::keyed_attr("bar", key("x"), "digest")))
            .expect("should resolve");
        assert_eq!(
            graph.edges(),
            vec![(InstanceId::singleton("foo"), InstanceId::named("bar", "x"))]
        );
        for k in ["x", "y", "z"] {
            let idx = graph
                .registry()
                .index_of(&InstanceId::named("bar", k))
                .expect("instance");
            assert!(graph.dependencies(idx).is_empty());
        }
    }

    #[test]
    fn unknown_instance_key_names_the_key() {
        let err = resolve_decls(&bar_and_foo(Expression::keyed_attr("bar", key("w"), "digest")))
            .unwrap_err();
        assert!(
            matches!(
                &err,
                ModgraphError::Reference {
                    source: ReferenceError::UnknownKey { key, .. },
                    ..
                } if *key == InstanceKey::Name("w".into())
            ),
            "got: {err}"
        );
        assert!(err.to_string().contains("\"w\""), "got: {err}");
    }

    #[test]
    fn unknown_module_is_rejected() {
        let err = resolve_decls(&bar_and_foo(Expression::attr("baz", "digest"))).unwrap_err();
        assert!(err.to_string().contains("unknown module baz"), "got: {err}");
    }

    #[test]
    fn expanded_module_requires_key() {
        let err = resolve_decls(&bar_and_foo(Expression::attr("bar", "digest"))).unwrap_err();
        assert!(
            err.to_string().contains("missing instance key for module bar"),
            "got: {err}"
        );
    }

    #[test]
    fn key_against_singleton_is_rejected() {
        let decls = vec![
            ModuleDeclaration::new("bar", "./bar"),
            ModuleDeclaration::new("foo", "./foo")
                .with_argument("d", Expression::keyed_attr("bar", key("x"), "digest")),
        ];
        let err = resolve_decls(&decls).unwrap_err();
        assert!(
            err.to_string().contains("module bar has no keyed instances"),
            "got: {err}"
        );
    }

    #[test]
    fn whole_module_depends_on_every_instance() {
        let graph = resolve_decls(&bar_and_foo(Expression::whole_module("bar")))
            .expect("should resolve");
        assert_eq!(graph.edges().len(), 3);
    }

    #[test]
    fn constant_index_on_whole_module_narrows_dependency() {
        let expr = Expression::indexed(Expression::whole_module("bar"), Expression::literal("y"));
        let graph = resolve_decls(&bar_and_foo(expr)).expect("should resolve");
        assert_eq!(
            graph.edges(),
            vec![(InstanceId::singleton("foo"), InstanceId::named("bar", "y"))]
        );
    }

    #[test]
    fn computed_index_on_whole_module_depends_on_all() {
        let expr = Expression::indexed(
            Expression::whole_module("bar"),
            Expression::call("length", vec![Expression::literal("x")]),
        );
        let graph = resolve_decls(&bar_and_foo(expr)).expect("should resolve");
        assert_eq!(graph.edges().len(), 3);
    }

    #[test]
    fn known_variable_adds_no_edge() {
        let mut variables = modgraph_common::types::Variables::new();
        let _ = variables.insert("region".into(), Value::from("eu"));
        let decls = vec![
            ModuleDeclaration::new("foo", "./foo").with_argument("r", Expression::var("region")),
        ];
        let graph = resolve(Arc::new(
            expand_with_variables(&decls, &variables).expect("should expand"),
        ))
        .expect("should resolve");
        assert!(graph.edges().is_empty());
    }

    #[test]
    fn unknown_variable_is_rejected() {
        let decls = vec![
            ModuleDeclaration::new("foo", "./foo").with_argument("r", Expression::var("region")),
        ];
        let err = resolve_decls(&decls).unwrap_err();
        assert!(
            matches!(
                &err,
                ModgraphError::Reference {
                    source: ReferenceError::UnknownVariable { name },
                    ..
                } if name == "region"
            ),
            "got: {err}"
        );
    }

    #[test]
    fn mutual_references_form_a_cycle() {
        let decls = vec![
            ModuleDeclaration::new("a", "./a").with_argument("v", Expression::attr("b", "out")),
            ModuleDeclaration::new("b", "./b").with_argument("v", Expression::attr("a", "out")),
        ];
        let err = resolve_decls(&decls).unwrap_err();
        let ModgraphError::Cycle { path } = err else {
            panic!("expected cycle, got {err}");
        };
        let rendered: Vec<String> = path.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["a", "b", "a"]);
    }
}
