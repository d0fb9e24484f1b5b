//! Expression evaluation against already-computed instance outputs.
//!
//! Evaluation is a pure function of the expression and a [`Scope`]. The
//! scheduler guarantees that every instance an expression references has
//! been evaluated before the expression is; a missing output is reported
//! as [`EvalError::Internal`] rather than as a user error.

use std::collections::BTreeMap;
use std::sync::Arc;

use modgraph_common::error::EvalError;
use modgraph_common::types::{InstanceId, InstanceKey, Outputs, Value, Variables};

use crate::parser::ast::Expression;
use crate::registry::Shape;

/// Read access to module shapes and instance outputs during evaluation.
pub trait Scope {
    /// Returns how the named module was expanded, or `None` if unknown.
    fn shape(&self, module: &str) -> Option<Shape>;

    /// Returns the recorded outputs of an instance, if it has been evaluated.
    fn outputs(&self, id: &InstanceId) -> Option<Arc<Outputs>>;

    /// Returns the value of a root input variable.
    fn variable(&self, _name: &str) -> Option<&Value> {
        None
    }
}

/// Scope with no modules, used for `for_each` and `count` expressions.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyScope;

impl Scope for EmptyScope {
    fn shape(&self, _module: &str) -> Option<Shape> {
        None
    }

    fn outputs(&self, _id: &InstanceId) -> Option<Arc<Outputs>> {
        None
    }
}

/// Scope exposing only root input variables, used for `for_each` and
/// `count` expressions.
#[derive(Debug, Clone, Copy)]
pub struct VariableScope<'a> {
    variables: &'a Variables,
}

impl<'a> VariableScope<'a> {
    /// Wraps the supplied variables.
    #[must_use]
    pub const fn new(variables: &'a Variables) -> Self {
        Self { variables }
    }
}

impl Scope for VariableScope<'_> {
    fn shape(&self, _module: &str) -> Option<Shape> {
        None
    }

    fn outputs(&self, _id: &InstanceId) -> Option<Arc<Outputs>> {
        None
    }

    fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }
}

/// Evaluates an expression to a value.
///
/// # Errors
///
/// Returns an [`EvalError`] if an attribute or key is missing, a function is
/// unknown or misused, or a referenced instance has not been evaluated.
pub fn evaluate(expr: &Expression, scope: &dyn Scope) -> Result<Value, EvalError> {
    match expr {
        Expression::Literal(value) => Ok(value.clone()),
        Expression::AttributeRef { module, key, path } => {
            if key.is_none() && path.is_empty() {
                return whole_module(module, scope);
            }
            let id = InstanceId {
                module: module.clone(),
                key: key.clone(),
            };
            let outputs = instance_outputs(&id, scope)?;
            project(&id, &outputs, path)
        }
        Expression::VariableRef { name, path } => {
            let mut current = scope.variable(name).ok_or_else(|| EvalError::UnsetVariable {
                name: name.clone(),
            })?;
            for segment in path {
                current = current
                    .as_map()
                    .and_then(|map| map.get(segment))
                    .ok_or_else(|| EvalError::MissingKey {
                        key: format!("{segment:?}"),
                        target: current.type_name(),
                    })?;
            }
            Ok(current.clone())
        }
        Expression::Indexed { target, key } => {
            let key = evaluate(key, scope)?;
            if let Some(id) = keyed_instance(target, &key, scope)? {
                let outputs = instance_outputs(&id, scope)?;
                return Ok(Value::Map((*outputs).clone()));
            }
            let target = evaluate(target, scope)?;
            index(&target, &key)
        }
        Expression::FunctionCall { name, args } => {
            let values = args
                .iter()
                .map(|arg| evaluate(arg, scope))
                .collect::<Result<Vec<_>, _>>()?;
            call(name, &values)
        }
    }
}

/// `module.<m>[<key>]` where `m` is expanded selects one instance directly,
/// so only that instance needs to have been evaluated. A key naming no
/// instance of `m` is a missing key, not an unevaluated instance.
fn keyed_instance(
    target: &Expression,
    key: &Value,
    scope: &dyn Scope,
) -> Result<Option<InstanceId>, EvalError> {
    let Expression::AttributeRef {
        module,
        key: None,
        path,
    } = target
    else {
        return Ok(None);
    };
    if !path.is_empty() {
        return Ok(None);
    }
    let Some(Shape::Keyed(keys)) = scope.shape(module) else {
        return Ok(None);
    };
    let Some(instance_key) = InstanceKey::from_value(key) else {
        return Ok(None);
    };
    if !keys.contains(&instance_key) {
        return Err(EvalError::MissingKey {
            key: instance_key.to_string(),
            target: "module",
        });
    }
    Ok(Some(InstanceId::keyed(module.clone(), instance_key)))
}

fn instance_outputs(id: &InstanceId, scope: &dyn Scope) -> Result<Arc<Outputs>, EvalError> {
    scope.outputs(id).ok_or_else(|| EvalError::Internal {
        message: format!("instance {id} has not been evaluated"),
    })
}

fn whole_module(module: &str, scope: &dyn Scope) -> Result<Value, EvalError> {
    match scope.shape(module) {
        Some(Shape::Single) => {
            let outputs = instance_outputs(&InstanceId::singleton(module), scope)?;
            Ok(Value::Map((*outputs).clone()))
        }
        Some(Shape::Keyed(keys)) => {
            let mut map = BTreeMap::new();
            for key in keys {
                let map_key = key.as_map_key();
                let outputs = instance_outputs(&InstanceId::keyed(module, key), scope)?;
                let _ = map.insert(map_key, Value::Map((*outputs).clone()));
            }
            Ok(Value::Map(map))
        }
        None => Err(EvalError::Internal {
            message: format!("module {module} is not declared"),
        }),
    }
}

fn project(id: &InstanceId, outputs: &Outputs, path: &[String]) -> Result<Value, EvalError> {
    let Some((first, rest)) = path.split_first() else {
        return Ok(Value::Map(outputs.clone()));
    };
    let mut current = outputs
        .get(first)
        .ok_or_else(|| EvalError::MissingAttribute {
            instance: id.clone(),
            attribute: first.clone(),
        })?;
    for segment in rest {
        current = current
            .as_map()
            .and_then(|map| map.get(segment))
            .ok_or_else(|| EvalError::MissingAttribute {
                instance: id.clone(),
                attribute: segment.clone(),
            })?;
    }
    Ok(current.clone())
}

fn index(target: &Value, key: &Value) -> Result<Value, EvalError> {
    match (target, key) {
        (Value::Map(map), Value::Str(_) | Value::Int(_)) => {
            let lookup = match key {
                Value::Str(s) => s.clone(),
                other => other.to_string(),
            };
            map.get(&lookup).cloned().ok_or_else(|| EvalError::MissingKey {
                key: key.to_string(),
                target: target.type_name(),
            })
        }
        (Value::List(items), Value::Int(n)) => usize::try_from(*n)
            .ok()
            .and_then(|i| items.get(i))
            .cloned()
            .ok_or_else(|| EvalError::MissingKey {
                key: n.to_string(),
                target: target.type_name(),
            }),
        _ => Err(EvalError::NotIndexable {
            target: target.type_name(),
            key: key.type_name(),
        }),
    }
}

fn call(name: &str, args: &[Value]) -> Result<Value, EvalError> {
    match name {
        "length" => {
            let [arg] = args else {
                return Err(EvalError::Arity {
                    name: name.to_owned(),
                    expected: 1,
                    found: args.len(),
                });
            };
            let len = match arg {
                Value::Str(s) => s.chars().count(),
                Value::List(items) => items.len(),
                Value::Map(map) => map.len(),
                other => {
                    return Err(EvalError::Unsized {
                        found: other.type_name(),
                    });
                }
            };
            Ok(Value::Int(i64::try_from(len).unwrap_or(i64::MAX)))
        }
        _ => Err(EvalError::UnknownFunction {
            name: name.to_owned(),
        }),
    }
}
