//! Fixtures: an in-process engine, a copying download handler and staged jobs

use async_trait::async_trait;
use notebook_jobs::notebook::Cell;
use notebook_jobs::{
    CellExecutionError, Config, DownloadHandler, DownloadRecord, Error, ExecutionRequest,
    NewJob, Notebook, NotebookEngine, Result, StagingPaths,
};
use serde_json::json;
use std::path::{Path, PathBuf};

/// Engine that "runs" each code cell by echoing it; a cell starting with
/// `fail` raises, and `touch <name>` creates a side-effect file
pub struct EchoEngine;

#[async_trait]
impl NotebookEngine for EchoEngine {
    async fn execute(&self, notebook: &mut Notebook, request: &ExecutionRequest) -> Result<()> {
        for (index, cell) in notebook.cells.iter_mut().enumerate() {
            let source = cell.source.text();
            if source.starts_with("fail") {
                cell.push_output(json!({
                    "output_type": "error",
                    "ename": "AssertionError",
                    "evalue": source,
                    "traceback": [],
                }));
                return Err(Error::CellExecution(CellExecutionError {
                    cell_index: index,
                    ename: "AssertionError".to_string(),
                    evalue: source,
                }));
            }
            if let Some(name) = source.strip_prefix("touch ") {
                std::fs::write(request.working_dir.join(name), b"")?;
            }
            cell.push_output(json!({"output_type": "stream", "name": "stdout", "text": source}));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "echo"
    }
}

/// Download handler that copies a job's output directory under `destination`
pub struct CopyHandler {
    pub jobs_dir: PathBuf,
    pub destination: PathBuf,
}

#[async_trait]
impl DownloadHandler for CopyHandler {
    async fn download(&self, record: &DownloadRecord) -> Result<()> {
        let source = self.jobs_dir.join(&record.job_id);
        let target = self.destination.join(&record.job_id);
        tokio::fs::create_dir_all(&target).await?;

        let mut entries = tokio::fs::read_dir(&source).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                tokio::fs::copy(entry.path(), target.join(entry.file_name())).await?;
            }
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "copy"
    }
}

/// Configuration rooted at `root` with no jupyter lookup
pub fn test_config(root: &Path, archive_outputs: bool) -> Config {
    let mut config = Config::default();
    config.persistence.database_path = root.join("notebook-jobs.db");
    config.execution.root_dir = root.to_path_buf();
    config.execution.archive_outputs = archive_outputs;
    config.execution.search_path = false;
    config
}

/// A python3 notebook with one code cell per source
pub fn notebook(sources: &[&str]) -> Notebook {
    let mut notebook: Notebook = serde_json::from_value(json!({
        "cells": [],
        "metadata": {"kernelspec": {"name": "python3", "display_name": "Python 3"}},
        "nbformat": 4,
        "nbformat_minor": 5,
    }))
    .expect("valid notebook");
    notebook.cells = sources.iter().map(|s| Cell::code(*s)).collect();
    notebook
}

/// Stage `notebook` as `root/staging/<job_id>/input.ipynb` and describe the job
///
/// The executed notebook is exported to `output.ipynb` and the archive to
/// `<job_id>.tar.gz`.
pub fn stage(root: &Path, job_id: &str, notebook: &Notebook) -> (NewJob, StagingPaths) {
    let staging = root.join("staging").join(job_id);
    std::fs::create_dir_all(&staging).expect("create staging dir");
    let input = staging.join("input.ipynb");
    std::fs::write(&input, notebook.to_vec_pretty().expect("serialize")).expect("write input");

    let job = NewJob {
        job_id: job_id.to_string(),
        name: format!("{} report", job_id),
        output_formats: vec!["ipynb".to_string()],
        ..Default::default()
    };
    let paths = [
        ("input", input),
        ("ipynb", staging.join("output.ipynb")),
        ("tar.gz", staging.join(format!("{}.tar.gz", job_id))),
    ]
    .into_iter()
    .collect();

    (job, paths)
}
