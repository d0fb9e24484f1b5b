//! Module executor abstraction and built-in executors.
//!
//! The scheduler hands each instance's resolved arguments to a
//! [`ModuleExecutor`] and records whatever outputs it returns. What a
//! module does with its arguments is entirely up to the executor.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use modgraph_common::types::{InstanceId, Outputs, Value};
use serde::Serialize;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

/// Failure reported by a module executor.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The module ran and reported a failure.
    #[error("{message}")]
    Failed {
        /// Module-provided description.
        message: String,
    },

    /// The module process could not be started or waited on.
    #[error("failed to run `{program}`: {source}")]
    Spawn {
        /// Program that was launched.
        program: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The module produced outputs in an unusable form.
    #[error("invalid module output: {message}")]
    InvalidOutput {
        /// Description of the problem.
        message: String,
    },
}

/// The `each` context of an expanded instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EachContext {
    /// Map key (`for_each`) or index (`count`).
    pub key: Value,
    /// Map entry value; absent for `count` instances.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

/// Everything an executor receives for one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionRequest {
    /// Instance being evaluated.
    pub instance: InstanceId,
    /// Source locator from the declaration.
    pub source: String,
    /// Arguments with every expression already evaluated.
    pub arguments: BTreeMap<String, Value>,
    /// Key and value for expanded instances.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub each: Option<EachContext>,
}

/// Computes an instance's outputs from its resolved arguments.
///
/// Implementations must be deterministic for a given request if runs are
/// expected to be reproducible; the scheduler may call them concurrently
/// and in any order for instances that do not depend on each other.
#[async_trait]
pub trait ModuleExecutor: Send + Sync {
    /// Executes one instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the module fails or produces unusable outputs.
    async fn execute(&self, request: &ExecutionRequest) -> Result<Outputs, ExecutorError>;
}

/// Returns the resolved arguments unchanged as outputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoExecutor;

#[async_trait]
impl ModuleExecutor for EchoExecutor {
    async fn execute(&self, request: &ExecutionRequest) -> Result<Outputs, ExecutorError> {
        Ok(request.arguments.clone())
    }
}

/// Adapts a synchronous closure into an executor.
pub struct FnExecutor<F> {
    func: F,
}

impl<F> FnExecutor<F>
where
    F: Fn(&ExecutionRequest) -> Result<Outputs, ExecutorError> + Send + Sync,
{
    /// Wraps `func`.
    pub const fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F> ModuleExecutor for FnExecutor<F>
where
    F: Fn(&ExecutionRequest) -> Result<Outputs, ExecutorError> + Send + Sync,
{
    async fn execute(&self, request: &ExecutionRequest) -> Result<Outputs, ExecutorError> {
        (self.func)(request)
    }
}

/// Runs an external program once per instance.
///
/// The request is written to the program's stdin as JSON, the working
/// directory is the module source resolved against `base_dir`, and stdout
/// must be a JSON object of outputs. A non-zero exit status fails the
/// instance with stderr (or stdout when stderr is empty) as the message.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    program: String,
    args: Vec<String>,
    base_dir: PathBuf,
}

impl ProcessExecutor {
    /// Creates an executor running `program` for every instance.
    #[must_use]
    pub fn new(program: impl Into<String>, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            base_dir: base_dir.into(),
        }
    }

    /// Appends fixed command-line arguments.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    fn spawn_err(&self, source: std::io::Error) -> ExecutorError {
        ExecutorError::Spawn {
            program: self.program.clone(),
            source,
        }
    }
}

#[async_trait]
impl ModuleExecutor for ProcessExecutor {
    async fn execute(&self, request: &ExecutionRequest) -> Result<Outputs, ExecutorError> {
        let workdir = self.base_dir.join(&request.source);
        let payload = serde_json::to_vec(request).map_err(|e| ExecutorError::InvalidOutput {
            message: format!("cannot encode request: {e}"),
        })?;
        tracing::debug!(
            instance = %request.instance,
            program = %self.program,
            workdir = %workdir.display(),
            "spawning module process"
        );

        let mut child = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .current_dir(&workdir)
            .env("MGRAPH_INSTANCE", request.instance.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.spawn_err(e))?;

        // Feed stdin while draining stdout/stderr; a module may exit without
        // reading its request, which closes the pipe early.
        let stdin = child.stdin.take();
        let feed = async move {
            let Some(mut stdin) = stdin else {
                return Ok(());
            };
            match stdin.write_all(&payload).await {
                Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => Err(e),
                _ => Ok(()),
            }
        };
        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        let output = output.map_err(|e| self.spawn_err(e))?;
        fed.map_err(|e| self.spawn_err(e))?;
        let stdout = String::from_utf8(output.stdout).map_err(|_| ExecutorError::InvalidOutput {
            message: "output not utf-8".into(),
        })?;

        if !output.status.success() {
            let message = if output.stderr.is_empty() {
                stdout
            } else {
                String::from_utf8_lossy(&output.stderr).into_owned()
            };
            return Err(ExecutorError::Failed {
                message: message.trim().to_owned(),
            });
        }

        if stdout.trim().is_empty() {
            return Ok(Outputs::new());
        }
        match serde_json::from_str::<Value>(&stdout) {
            Ok(Value::Map(outputs)) => Ok(outputs),
            Ok(other) => Err(ExecutorError::InvalidOutput {
                message: format!("expected a JSON object, got {}", other.type_name()),
            }),
            Err(e) => Err(ExecutorError::InvalidOutput {
                message: e.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ExecutionRequest {
        let mut arguments = BTreeMap::new();
        let _ = arguments.insert("value".to_string(), Value::Int(2));
        ExecutionRequest {
            instance: InstanceId::named("bar", "x"),
            source: ".".into(),
            arguments,
            each: Some(EachContext {
                key: Value::from("x"),
                value: Some(Value::Int(2)),
            }),
        }
    }

    #[tokio::test]
    async fn echo_returns_arguments() {
        let outputs = EchoExecutor.execute(&request()).await.expect("execute");
        assert_eq!(outputs.get("value"), Some(&Value::Int(2)));
    }

    #[tokio::test]
    async fn fn_executor_calls_closure() {
        let executor = FnExecutor::new(|req: &ExecutionRequest| {
            let mut out = Outputs::new();
            let _ = out.insert("id".to_string(), Value::Str(req.instance.to_string()));
            Ok(out)
        });
        let outputs = executor.execute(&request()).await.expect("execute");
        assert_eq!(outputs["id"], Value::from("bar[\"x\"]"));
    }

    #[test]
    fn request_serializes_each_context() {
        let json = serde_json::to_value(request()).expect("serialize");
        assert_eq!(json["instance"], "bar[\"x\"]");
        assert_eq!(json["each"]["key"], "x");
        assert_eq!(json["each"]["value"], 2);
        assert_eq!(json["arguments"]["value"], 2);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn process_executor_reads_json_outputs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let executor = ProcessExecutor::new("sh", dir.path())
            .with_args(["-c", r#"cat > /dev/null; echo '{"digest": "d2"}'"#]);
        let outputs = executor.execute(&request()).await.expect("execute");
        assert_eq!(outputs["digest"], Value::from("d2"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn process_executor_reports_stderr_on_failure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let executor = ProcessExecutor::new("sh", dir.path())
            .with_args(["-c", "cat > /dev/null; echo 'module exploded' >&2; exit 3"]);
        let err = executor.execute(&request()).await.unwrap_err();
        assert_eq!(err.to_string(), "module exploded");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn process_executor_rejects_non_object_output() {
        let dir = tempfile::tempdir().expect("tempdir");
        let executor =
            ProcessExecutor::new("sh", dir.path()).with_args(["-c", "cat > /dev/null; echo 5"]);
        let err = executor.execute(&request()).await.unwrap_err();
        assert!(err.to_string().contains("expected a JSON object"), "got: {err}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn process_executor_tolerates_unread_request() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut request = request();
        let _ = request
            .arguments
            .insert("blob".to_string(), Value::Str("a".repeat(300 * 1024)));
        let executor = ProcessExecutor::new("sh", dir.path())
            .with_args(["-c", r#"echo '{"digest": "d2"}'"#]);
        let outputs = executor.execute(&request).await.expect("execute");
        assert_eq!(outputs["digest"], Value::from("d2"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn process_executor_drains_output_before_reading_request() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut request = request();
        let _ = request
            .arguments
            .insert("blob".to_string(), Value::Str("a".repeat(300 * 1024)));
        // 200 KiB of stderr before stdin is read fills both pipes unless
        // the request is written while output is collected.
        let script = r#"head -c 204800 /dev/zero | tr '\0' x >&2; cat > /dev/null; echo '{"ok": true}'"#;
        let executor = ProcessExecutor::new("sh", dir.path()).with_args(["-c", script]);
        let outputs = executor.execute(&request).await.expect("execute");
        assert_eq!(outputs["ok"], Value::Bool(true));
    }

    #[tokio::test]
    async fn process_executor_missing_program_is_spawn_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let executor = ProcessExecutor::new("mgraph-no-such-program", dir.path());
        let err = executor.execute(&request()).await.unwrap_err();
        assert!(matches!(err, ExecutorError::Spawn { .. }));
    }
}
