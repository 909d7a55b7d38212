//! Notebook execution engines
//!
//! The engine runs the cells of a notebook in order inside a working
//! directory and stops at the first one that raises. That failure surfaces as
//! [`Error::CellExecution`]; the notebook still holds the outputs of every cell
//! that did run, so callers can export partial results.

use crate::error::{Error, Result};
use crate::notebook::Notebook;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// What to execute and where
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    /// Kernel to start (from the notebook's kernelspec)
    pub kernel_name: String,
    /// Directory the kernel runs in; side-effect files land here
    pub working_dir: PathBuf,
    /// Persist interactive widget state into the notebook metadata
    pub store_widget_state: bool,
}

/// Trait for notebook execution backends
#[async_trait]
pub trait NotebookEngine: Send + Sync {
    /// Execute `notebook` in place
    ///
    /// # Errors
    ///
    /// - [`Error::CellExecution`] if a cell raised; `notebook` keeps the partial outputs
    /// - any other variant if the engine could not run at all
    async fn execute(&self, notebook: &mut Notebook, request: &ExecutionRequest) -> Result<()>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Drives nbclient inside the Python interpreter
///
/// The notebook arrives on stdin and the executed notebook is written to
/// stdout even when a cell raises, since the write sits in a `finally`.
/// argv: kernel name, then "1" to store widget state.
const NBCLIENT_SCRIPT: &str = r#"
import sys
import nbformat
from nbclient import NotebookClient

nb = nbformat.read(sys.stdin, as_version=4)
client = NotebookClient(
    nb,
    kernel_name=sys.argv[1],
    store_widget_state=sys.argv[2] == "1",
    resources={"metadata": {"path": "."}},
)
try:
    client.execute()
finally:
    nbformat.write(nb, sys.stdout)
"#;

/// Engine backed by nbclient, run through an external Python interpreter
///
/// Execution stops at the first failing cell; later cells never run. The
/// partially executed notebook still comes back, and its first `error`
/// output is reported as the cell failure.
pub struct NbclientEngine {
    python_path: PathBuf,
}

impl NbclientEngine {
    /// Create an engine with an explicit path to the Python interpreter
    pub fn new(python_path: PathBuf) -> Self {
        Self { python_path }
    }

    /// Attempt to find `python3` (or `python`) in PATH
    pub fn from_path() -> Option<Self> {
        which::which("python3")
            .or_else(|_| which::which("python"))
            .ok()
            .map(Self::new)
    }

    /// Path to the Python interpreter in use
    pub fn python_path(&self) -> &Path {
        &self.python_path
    }
}

#[async_trait]
impl NotebookEngine for NbclientEngine {
    async fn execute(&self, notebook: &mut Notebook, request: &ExecutionRequest) -> Result<()> {
        tracing::debug!(
            kernel = %request.kernel_name,
            working_dir = ?request.working_dir,
            "executing notebook via nbclient"
        );

        let args = [
            "-c".to_string(),
            NBCLIENT_SCRIPT.to_string(),
            request.kernel_name.clone(),
            if request.store_widget_state { "1" } else { "0" }.to_string(),
        ];

        let input = notebook.to_vec_pretty()?;
        let output =
            spawn_with_stdin(&self.python_path, &args, &request.working_dir, input).await?;
        apply_executed(notebook, &self.python_path, output)
    }

    fn name(&self) -> &'static str {
        "nbclient"
    }
}

/// Fold the interpreter's result back into `notebook`
///
/// Whatever notebook came back on stdout replaces the input, so partial
/// outputs survive. A recorded cell error wins over the exit status; a
/// non-zero exit with no cell error (missing kernel, missing nbclient, ...)
/// is an engine failure.
fn apply_executed(notebook: &mut Notebook, binary: &Path, output: Output) -> Result<()> {
    match Notebook::from_slice(&output.stdout) {
        Ok(executed) => {
            *notebook = executed;
            if let Some(error) = notebook.first_error() {
                return Err(Error::CellExecution(error));
            }
            if !output.status.success() {
                return Err(exit_error(binary, &output));
            }
            Ok(())
        }
        Err(_) if !output.status.success() => Err(exit_error(binary, &output)),
        Err(e) => Err(e),
    }
}

fn exit_error(binary: &Path, output: &Output) -> Error {
    Error::Engine(format!(
        "{} exited with {}: {}",
        binary.display(),
        output.status,
        String::from_utf8_lossy(&output.stderr).trim()
    ))
}

/// Run `binary args..` in `cwd`, feed `input` on stdin and collect stdout
///
/// A non-zero exit becomes [`Error::Engine`] carrying stderr.
pub(crate) async fn run_with_stdin(
    binary: &Path,
    args: &[String],
    cwd: &Path,
    input: Vec<u8>,
) -> Result<Vec<u8>> {
    let output = spawn_with_stdin(binary, args, cwd, input).await?;
    if !output.status.success() {
        return Err(exit_error(binary, &output));
    }
    Ok(output.stdout)
}

/// Run `binary args..` in `cwd` with `input` on stdin, whatever its exit status
async fn spawn_with_stdin(
    binary: &Path,
    args: &[String],
    cwd: &Path,
    input: Vec<u8>,
) -> Result<Output> {
    let mut child = Command::new(binary)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::Engine(format!("failed to start {}: {}", binary.display(), e)))?;

    // Write stdin from a separate task so a full stdout pipe can't deadlock us
    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| Error::Engine("child stdin unavailable".to_string()))?;
    let writer = tokio::spawn(async move {
        let result = stdin.write_all(&input).await;
        drop(stdin);
        result
    });

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| Error::Engine(format!("failed to wait for {}: {}", binary.display(), e)))?;

    let written = writer
        .await
        .map_err(|e| Error::Engine(format!("stdin writer task panicked: {}", e)))?;

    // A child that dies early also breaks the pipe; the exit status says more
    if output.status.success() {
        written?;
    }

    Ok(output)
}
