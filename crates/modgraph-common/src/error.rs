//! Unified error types for the modgraph workspace.
//!
//! Structural errors (declaration, expansion, reference, cycle) abort a run
//! before any module executes. Evaluation errors are scoped to a single
//! instance and the instances that depend on it.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::types::{InstanceId, InstanceKey};

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum ModgraphError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// Declaration text could not be tokenized or parsed.
    #[error("parse error: {message}")]
    Parse {
        /// Description of the syntax problem.
        message: String,
    },

    /// Declarations are malformed: duplicate names, duplicate keys,
    /// conflicting meta-arguments.
    #[error("declaration error: {message}")]
    Declaration {
        /// Description of the problem.
        message: String,
    },

    /// A multiplicity expression did not produce a usable collection.
    #[error("expansion error in module \"{module}\": {message}")]
    Expansion {
        /// Module whose expansion failed.
        module: String,
        /// Description of the problem.
        message: String,
    },

    /// An attribute reference does not resolve to a known instance.
    #[error("reference error in {instance}: {source}")]
    Reference {
        /// Instance whose arguments contain the reference.
        instance: InstanceId,
        /// What was wrong with the reference.
        source: ReferenceError,
    },

    /// The instance dependency graph contains a cycle.
    #[error("dependency cycle: {}", format_cycle(.path))]
    Cycle {
        /// Instances forming the cycle, first element repeated at the end.
        path: Vec<InstanceId>,
    },

    /// One or more instances failed during the evaluation phase.
    #[error("{} instance(s) failed: {}", .failures.len(), format_failures(.failures))]
    Evaluation {
        /// Every failed instance with its cause.
        failures: Vec<InstanceFailure>,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

/// An attribute reference that cannot be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReferenceError {
    /// No declaration has the referenced name.
    #[error("unknown module {module}")]
    UnknownModule {
        /// Referenced module name.
        module: String,
    },

    /// An expanded module was referenced without selecting an instance.
    #[error("missing instance key for module {module}")]
    MissingKey {
        /// Referenced module name.
        module: String,
    },

    /// The selected key is not one of the module's instance keys.
    #[error("unknown instance key {key} for module {module}")]
    UnknownKey {
        /// Referenced module name.
        module: String,
        /// Key that matched no instance.
        key: InstanceKey,
    },

    /// A key was used against a module that was not expanded.
    #[error("module {module} has no keyed instances")]
    NotKeyed {
        /// Referenced module name.
        module: String,
    },

    /// A `var.<name>` reference names a variable that was not supplied.
    #[error("unknown variable var.{name}")]
    UnknownVariable {
        /// Referenced variable name.
        name: String,
    },
}

/// Failure while evaluating a single instance.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    /// The referenced instance produced no such output attribute.
    #[error("{instance} has no attribute \"{attribute}\"")]
    MissingAttribute {
        /// Instance whose outputs were projected.
        instance: InstanceId,
        /// Attribute that was absent.
        attribute: String,
    },

    /// A `var.<name>` reference names a variable with no value.
    #[error("variable var.{name} is not set")]
    UnsetVariable {
        /// Referenced variable name.
        name: String,
    },

    /// An index lookup did not find its key.
    #[error("key {key} not found in {target}")]
    MissingKey {
        /// Rendered key.
        key: String,
        /// Kind of value that was indexed.
        target: &'static str,
    },

    /// The indexed value does not support indexing with this key.
    #[error("cannot index {target} with {key}")]
    NotIndexable {
        /// Kind of value that was indexed.
        target: &'static str,
        /// Kind of value used as the key.
        key: &'static str,
    },

    /// `length()` was applied to a value without a size.
    #[error("length() requires a sized value, got {found}")]
    Unsized {
        /// Kind of value that was passed.
        found: &'static str,
    },

    /// The function name is not one the evaluator knows.
    #[error("unknown function {name}")]
    UnknownFunction {
        /// Called function name.
        name: String,
    },

    /// A function received the wrong number of arguments.
    #[error("{name}() takes {expected} argument(s), got {found}")]
    Arity {
        /// Called function name.
        name: String,
        /// Expected argument count.
        expected: usize,
        /// Supplied argument count.
        found: usize,
    },

    /// The module executor reported a failure.
    #[error("module execution failed: {message}")]
    Executor {
        /// Executor-provided description.
        message: String,
    },

    /// The instance exceeded its evaluation deadline.
    #[error("timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    /// A dependency failed, so the instance was never executed.
    #[error("dependency {failed} failed")]
    Upstream {
        /// The failed instance this one (transitively) depends on.
        failed: InstanceId,
    },

    /// A scheduling precondition was violated. Not a user error.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the violated precondition.
        message: String,
    },
}

impl EvalError {
    /// Whether this failure originated in the instance itself rather than
    /// being inherited from a failed dependency.
    #[must_use]
    pub const fn is_origin(&self) -> bool {
        !matches!(self, Self::Upstream { .. })
    }
}

/// A failed instance together with the cause of its failure.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct InstanceFailure {
    /// Instance that failed.
    pub instance: InstanceId,
    /// Cause of the failure.
    #[serde(serialize_with = "serialize_display")]
    pub error: EvalError,
}

fn serialize_display<S: serde::Serializer>(
    error: &EvalError,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

fn format_cycle(path: &[InstanceId]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

fn format_failures(failures: &[InstanceFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{}: {}", f.instance, f.error))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, ModgraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_error_messages_name_the_offender() {
        let err = ReferenceError::UnknownKey {
            module: "bar".into(),
            key: InstanceKey::Name("w".into()),
        };
        assert_eq!(err.to_string(), "unknown instance key \"w\" for module bar");
        let err = ReferenceError::NotKeyed {
            module: "foo".into(),
        };
        assert_eq!(err.to_string(), "module foo has no keyed instances");
        let err = ReferenceError::UnknownVariable {
            name: "region".into(),
        };
        assert_eq!(err.to_string(), "unknown variable var.region");
    }

    #[test]
    fn cycle_error_renders_path() {
        let err = ModgraphError::Cycle {
            path: vec![
                InstanceId::singleton("a"),
                InstanceId::singleton("b"),
                InstanceId::singleton("a"),
            ],
        };
        assert_eq!(err.to_string(), "dependency cycle: a -> b -> a");
    }

    #[test]
    fn evaluation_error_lists_every_failure() {
        let err = ModgraphError::Evaluation {
            failures: vec![
                InstanceFailure {
                    instance: InstanceId::named("bar", "x"),
                    error: EvalError::Executor {
                        message: "boom".into(),
                    },
                },
                InstanceFailure {
                    instance: InstanceId::singleton("foo"),
                    error: EvalError::Upstream {
                        failed: InstanceId::named("bar", "x"),
                    },
                },
            ],
        };
        let msg = err.to_string();
        assert!(msg.starts_with("2 instance(s) failed"), "got: {msg}");
        assert!(msg.contains("boom"), "got: {msg}");
        assert!(msg.contains("foo: dependency bar[\"x\"] failed"), "got: {msg}");
    }

    #[test]
    fn timeout_is_an_origin_failure() {
        let err = EvalError::Timeout(Duration::from_millis(1500));
        assert!(err.is_origin());
        assert_eq!(err.to_string(), "timed out after 1.5s");
        let upstream = EvalError::Upstream {
            failed: InstanceId::singleton("a"),
        };
        assert!(!upstream.is_origin());
    }

    #[test]
    fn length_error_message() {
        let err = EvalError::Unsized { found: "number" };
        assert_eq!(
            err.to_string(),
            "length() requires a sized value, got number"
        );
    }
}
