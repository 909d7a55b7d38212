//! Shared test doubles and fixtures for execution manager tests.

use crate::db::Database;
use crate::engine::{ExecutionRequest, NotebookEngine};
use crate::error::{CellExecutionError, Error, Result};
use crate::execution::ExecutionContext;
use crate::export::Exporter;
use crate::notebook::{Cell, Notebook};
use crate::staging::{ARCHIVE, INPUT, StagingPaths};
use crate::types::{NewJob, Parameters};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// In-process engine that interprets a tiny cell language:
///
/// - `raise <message>` fails the cell with a `RuntimeError`
/// - `write <name> <content>` creates `<name>` in the working directory
/// - anything else prints `ran: <source>`
///
/// Execution stops at the first failing cell, like a real kernel run.
#[derive(Default)]
pub(crate) struct ScriptedEngine {
    pub(crate) requests: Mutex<Vec<ExecutionRequest>>,
}

#[async_trait]
impl NotebookEngine for ScriptedEngine {
    async fn execute(&self, notebook: &mut Notebook, request: &ExecutionRequest) -> Result<()> {
        self.requests.lock().unwrap().push(request.clone());

        for (index, cell) in notebook.cells.iter_mut().enumerate() {
            if cell.cell_type != "code" {
                continue;
            }
            let source = cell.source.text();
            cell.extra
                .insert("execution_count".to_string(), json!(index + 1));

            if let Some(message) = source.strip_prefix("raise ") {
                cell.push_output(json!({
                    "output_type": "error",
                    "ename": "RuntimeError",
                    "evalue": message,
                    "traceback": [],
                }));
                return Err(Error::CellExecution(CellExecutionError {
                    cell_index: index,
                    ename: "RuntimeError".to_string(),
                    evalue: message.to_string(),
                }));
            }

            if let Some(rest) = source.strip_prefix("write ") {
                let (name, content) = rest.split_once(' ').unwrap_or((rest, ""));
                std::fs::write(request.working_dir.join(name), content)?;
            }

            cell.push_output(json!({
                "output_type": "stream",
                "name": "stdout",
                "text": format!("ran: {}\n", source),
            }));
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Engine that cannot start at all
pub(crate) struct BrokenEngine;

#[async_trait]
impl NotebookEngine for BrokenEngine {
    async fn execute(&self, _notebook: &mut Notebook, _request: &ExecutionRequest) -> Result<()> {
        Err(Error::Engine("kernel python3 not installed".to_string()))
    }

    fn name(&self) -> &'static str {
        "broken"
    }
}

/// Engine that panics mid-run
pub(crate) struct PanickingEngine;

#[async_trait]
impl NotebookEngine for PanickingEngine {
    async fn execute(&self, _notebook: &mut Notebook, _request: &ExecutionRequest) -> Result<()> {
        panic!("engine bug");
    }

    fn name(&self) -> &'static str {
        "panicking"
    }
}

/// Exporter that renders every stream output as text
///
/// `ipynb` is the notebook JSON; `html` wraps the text in a minimal page;
/// `fail` always errors.
pub(crate) struct TextExporter;

#[async_trait]
impl Exporter for TextExporter {
    async fn export(&self, notebook: &Notebook, format: &str) -> Result<Vec<u8>> {
        let text: String = notebook
            .cells
            .iter()
            .flat_map(|cell| cell.outputs().iter())
            .filter_map(|output| output.get("text").and_then(Value::as_str))
            .collect();

        match format {
            "ipynb" => notebook.to_vec_pretty(),
            "html" => Ok(format!("<html><body><pre>{}</pre></body></html>", text).into_bytes()),
            "fail" => Err(Error::Export {
                format: format.to_string(),
                reason: "renderer crashed".to_string(),
            }),
            _ => Ok(text.into_bytes()),
        }
    }

    fn name(&self) -> &'static str {
        "text"
    }
}

/// A job laid out on disk: root with `staging/<job>` and `jobs/<job>` output
pub(crate) struct JobFixture {
    pub(crate) _root: TempDir,
    pub(crate) root_dir: PathBuf,
    pub(crate) staging_dir: PathBuf,
    pub(crate) output_dir: PathBuf,
    pub(crate) context: ExecutionContext,
    pub(crate) db: Arc<Database>,
}

/// Build a notebook from cell sources, with a python3 kernelspec
pub(crate) fn notebook_with(cells: &[&str]) -> Notebook {
    let mut metadata = serde_json::Map::new();
    metadata.insert(
        "kernelspec".to_string(),
        json!({"name": "python3", "display_name": "Python 3", "language": "python"}),
    );
    Notebook {
        cells: cells.iter().map(|source| Cell::code(*source)).collect(),
        metadata,
        nbformat: 4,
        nbformat_minor: 5,
    }
}

/// Create a `CREATED` job `job_id` whose staged input is `notebook`
pub(crate) async fn create_job_fixture(
    job_id: &str,
    notebook: &Notebook,
    output_formats: &[&str],
    parameters: Option<Parameters>,
) -> JobFixture {
    let root = tempfile::tempdir().unwrap();
    let root_dir = root.path().to_path_buf();
    let staging_dir = root_dir.join("staging").join(job_id);
    let output_dir = root_dir.join("jobs").join(job_id);
    std::fs::create_dir_all(&staging_dir).unwrap();

    let input = staging_dir.join("notebook.ipynb");
    std::fs::write(&input, notebook.to_vec_pretty().unwrap()).unwrap();

    let mut paths = vec![(INPUT.to_string(), input)];
    for format in output_formats {
        paths.push((format.to_string(), staging_dir.join(format!("notebook.{}", format))));
    }
    paths.push((ARCHIVE.to_string(), staging_dir.join("notebook.tar.gz")));
    let staging_paths: StagingPaths = paths.into_iter().collect();

    let db = Arc::new(Database::new(&root_dir.join("jobs.db")).await.unwrap());
    db.insert_job(&NewJob {
        job_id: job_id.to_string(),
        name: format!("{} job", job_id),
        parameters,
        output_formats: output_formats.iter().map(|f| f.to_string()).collect(),
        job_files: vec![],
    })
    .await
    .unwrap();

    let context = ExecutionContext {
        job_id: job_id.to_string(),
        root_dir: root_dir.clone(),
        output_dir: output_dir.clone(),
        staging_paths,
        db: db.clone(),
    };

    JobFixture {
        _root: root,
        root_dir,
        staging_dir,
        output_dir,
        context,
        db,
    }
}
