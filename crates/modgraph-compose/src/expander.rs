//! Multiplicity expansion of declarations into concrete instances.
//!
//! A declaration with `for_each` becomes one instance per mapping entry,
//! one with `count` becomes one instance per index, and any other
//! declaration becomes a single keyless instance.

use modgraph_common::error::{ModgraphError, Result};
use modgraph_common::types::{InstanceId, InstanceKey, Value, Variables};

use crate::eval::{self, VariableScope};
use crate::parser::ast::{Expression, ModuleDeclaration};
use crate::parser::validator;
use crate::registry::{InstanceRegistry, ModuleInstance};
use crate::resolver::{Reference, references};

/// Expands declarations into the instance registry.
///
/// # Errors
///
/// Returns a declaration error if the declarations are malformed, and an
/// expansion error if a `for_each` does not evaluate to a mapping or a
/// `count` does not evaluate to a non-negative integer.
pub fn expand(declarations: &[ModuleDeclaration]) -> Result<InstanceRegistry> {
    expand_with_variables(declarations, &Variables::new())
}

/// Expands declarations with root input variables in scope.
///
/// `for_each` and `count` may read `var.<name>`; the registry keeps the
/// variables for later resolution and evaluation.
///
/// # Errors
///
/// Same as [`expand`].
pub fn expand_with_variables(
    declarations: &[ModuleDeclaration],
    variables: &Variables,
) -> Result<InstanceRegistry> {
    validator::validate(declarations)?;
    let mut registry = InstanceRegistry::with_variables(variables.clone());

    for decl in declarations {
        registry.declare(decl);
        let entries = multiplicity(decl, variables)?;
        tracing::debug!(
            module = %decl.name,
            instances = entries.as_ref().map_or(1, Vec::len),
            "expanded module"
        );
        match entries {
            None => {
                let _ = registry.push(instance(decl, InstanceId::singleton(&decl.name), None));
            }
            Some(entries) => {
                for (key, each_value) in entries {
                    let id = InstanceId::keyed(&decl.name, key);
                    let _ = registry.push(instance(decl, id, each_value));
                }
            }
        }
    }

    tracing::info!(
        modules = declarations.len(),
        instances = registry.len(),
        "expansion complete"
    );
    Ok(registry)
}

fn instance(decl: &ModuleDeclaration, id: InstanceId, each_value: Option<Value>) -> ModuleInstance {
    ModuleInstance {
        id,
        source: decl.source.clone(),
        arguments: decl.arguments.clone(),
        each_value,
    }
}

type Entries = Vec<(InstanceKey, Option<Value>)>;

fn multiplicity(decl: &ModuleDeclaration, variables: &Variables) -> Result<Option<Entries>> {
    if let Some(expr) = &decl.for_each {
        return match evaluate_meta(decl, "for_each", expr, variables)? {
            Value::Map(map) => Ok(Some(
                map.into_iter()
                    .map(|(k, v)| (InstanceKey::Name(k), Some(v)))
                    .collect(),
            )),
            other => Err(expansion_err(
                decl,
                format!("for_each must be a mapping, got {}", other.type_name()),
            )),
        };
    }
    if let Some(expr) = &decl.count {
        return match evaluate_meta(decl, "count", expr, variables)? {
            Value::Int(n) => u64::try_from(n)
                .map(|n| Some((0..n).map(|i| (InstanceKey::Index(i), None)).collect()))
                .map_err(|_| expansion_err(decl, format!("count must not be negative, got {n}"))),
            other => Err(expansion_err(
                decl,
                format!("count must be a number, got {}", other.type_name()),
            )),
        };
    }
    Ok(None)
}

/// Evaluates `for_each`/`count`, which may read variables but not other
/// instances.
fn evaluate_meta(
    decl: &ModuleDeclaration,
    attribute: &str,
    expr: &Expression,
    variables: &Variables,
) -> Result<Value> {
    let reads_modules = references(expr)
        .iter()
        .any(|r| !matches!(r, Reference::Variable { .. }));
    if reads_modules {
        return Err(expansion_err(
            decl,
            format!("{attribute} must not reference other modules"),
        ));
    }
    eval::evaluate(expr, &VariableScope::new(variables))
        .map_err(|e| expansion_err(decl, format!("{attribute}: {e}")))
}

fn expansion_err(decl: &ModuleDeclaration, message: String) -> ModgraphError {
    ModgraphError::Expansion {
        module: decl.name.clone(),
        message,
    }
}
