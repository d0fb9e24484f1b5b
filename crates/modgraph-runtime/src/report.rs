//! Outcome of an evaluation run.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use modgraph_common::error::{EvalError, InstanceFailure, ModgraphError, Result};
use modgraph_common::types::{InstanceId, InstanceState, Outputs};
use serde::Serialize;

/// Terminal state of every instance after a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// When evaluation began.
    pub started_at: DateTime<Utc>,
    /// Wall-clock duration of the run in milliseconds.
    pub elapsed_ms: u64,
    /// Final state of each instance.
    pub states: BTreeMap<InstanceId, InstanceState>,
    /// Outputs of every instance that reached the done state.
    pub outputs: BTreeMap<InstanceId, Outputs>,
    /// Every failed instance with its cause, ordered by instance.
    pub failures: Vec<InstanceFailure>,
}

impl RunReport {
    pub(crate) fn start() -> Self {
        Self {
            started_at: Utc::now(),
            elapsed_ms: 0,
            states: BTreeMap::new(),
            outputs: BTreeMap::new(),
            failures: Vec::new(),
        }
    }

    /// Whether every instance reached the done state.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.states.values().all(|s| *s == InstanceState::Done)
    }

    /// Final state of one instance.
    #[must_use]
    pub fn state(&self, id: &InstanceId) -> Option<InstanceState> {
        self.states.get(id).copied()
    }

    /// Cause of an instance's failure, if it failed.
    #[must_use]
    pub fn failure(&self, id: &InstanceId) -> Option<&EvalError> {
        self.failures
            .iter()
            .find(|f| f.instance == *id)
            .map(|f| &f.error)
    }

    /// Failures that originated in the instance itself, excluding
    /// dependents skipped because of them.
    pub fn origin_failures(&self) -> impl Iterator<Item = &InstanceFailure> {
        self.failures.iter().filter(|f| f.error.is_origin())
    }

    /// Converts the report into the complete output map.
    ///
    /// # Errors
    ///
    /// Returns [`ModgraphError::Evaluation`] listing every failed instance
    /// if the run did not fully succeed.
    pub fn into_outputs(self) -> Result<BTreeMap<InstanceId, Outputs>> {
        if self.is_success() {
            Ok(self.outputs)
        } else {
            Err(ModgraphError::Evaluation {
                failures: self.failures,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use modgraph_common::types::Value;

    use super::*;

    fn report() -> RunReport {
        let mut report = RunReport::start();
        let bar = InstanceId::named("bar", "x");
        let foo = InstanceId::singleton("foo");
        let _ = report.states.insert(bar.clone(), InstanceState::Failed);
        let _ = report.states.insert(foo.clone(), InstanceState::Failed);
        report.failures = vec![
            InstanceFailure {
                instance: bar.clone(),
                error: EvalError::Executor {
                    message: "boom".into(),
                },
            },
            InstanceFailure {
                instance: foo,
                error: EvalError::Upstream { failed: bar },
            },
        ];
        report
    }

    #[test]
    fn empty_report_is_success() {
        let report = RunReport::start();
        assert!(report.is_success());
        assert!(report.into_outputs().expect("outputs").is_empty());
    }

    #[test]
    fn failed_report_lists_failures() {
        let report = report();
        assert!(!report.is_success());
        assert_eq!(report.origin_failures().count(), 1);
        assert!(matches!(
            report.failure(&InstanceId::singleton("foo")),
            Some(EvalError::Upstream { .. })
        ));
        let err = report.into_outputs().unwrap_err();
        let ModgraphError::Evaluation { failures } = err else {
            panic!("expected evaluation error");
        };
        assert_eq!(failures.len(), 2);
    }

    #[test]
    fn report_serializes_with_string_keys() {
        let mut report = RunReport::start();
        let id = InstanceId::named("bar", "x");
        let mut outputs = Outputs::new();
        let _ = outputs.insert("digest".into(), Value::from("d2"));
        let _ = report.states.insert(id.clone(), InstanceState::Done);
        let _ = report.outputs.insert(id, outputs);

        let json = serde_json::to_value(&report).expect("serialize");
        assert_eq!(json["states"]["bar[\"x\"]"], "done");
        assert_eq!(json["outputs"]["bar[\"x\"]"]["digest"], "d2");
        assert!(json["failures"].as_array().expect("array").is_empty());
    }
}
