//! Rendering executed notebooks to output formats

use crate::engine::run_with_stdin;
use crate::error::{Error, Result};
use crate::notebook::Notebook;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Trait for notebook renderers
#[async_trait]
pub trait Exporter: Send + Sync {
    /// Render `notebook` to `format` (e.g. "html", "ipynb", "pdf")
    async fn export(&self, notebook: &Notebook, format: &str) -> Result<Vec<u8>>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Whether `format` names the notebook document itself
fn is_notebook_format(format: &str) -> bool {
    matches!(format, "ipynb" | "notebook")
}

/// Native exporter for the notebook format only
pub struct NotebookExporter;

#[async_trait]
impl Exporter for NotebookExporter {
    async fn export(&self, notebook: &Notebook, format: &str) -> Result<Vec<u8>> {
        if !is_notebook_format(format) {
            return Err(Error::NotSupported(format!(
                "{} can only render ipynb, not {}",
                self.name(),
                format
            )));
        }
        notebook.to_vec_pretty().map_err(|e| Error::Export {
            format: format.to_string(),
            reason: e.to_string(),
        })
    }

    fn name(&self) -> &'static str {
        "notebook"
    }
}

/// Exporter backed by the external `jupyter nbconvert` command
///
/// The notebook format is rendered natively; everything else is piped through
/// `nbconvert --to <format> --stdin --stdout`.
pub struct NbconvertExporter {
    binary_path: PathBuf,
}

impl NbconvertExporter {
    /// Create an exporter with an explicit path to the `jupyter` executable
    pub fn new(binary_path: PathBuf) -> Self {
        Self { binary_path }
    }

    /// Attempt to find `jupyter` in PATH
    pub fn from_path() -> Option<Self> {
        which::which("jupyter").ok().map(Self::new)
    }

    /// Path to the `jupyter` executable in use
    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }
}

#[async_trait]
impl Exporter for NbconvertExporter {
    async fn export(&self, notebook: &Notebook, format: &str) -> Result<Vec<u8>> {
        if is_notebook_format(format) {
            return NotebookExporter.export(notebook, format).await;
        }

        let args = [
            "nbconvert".to_string(),
            "--to".to_string(),
            format.to_string(),
            "--stdin".to_string(),
            "--stdout".to_string(),
        ];
        let input = notebook.to_vec_pretty()?;

        run_with_stdin(&self.binary_path, &args, &std::env::temp_dir(), input)
            .await
            .map_err(|e| Error::Export {
                format: format.to_string(),
                reason: e.to_string(),
            })
    }

    fn name(&self) -> &'static str {
        "nbconvert"
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn notebook() -> Notebook {
        serde_json::from_value(json!({
            "cells": [{"cell_type": "code", "metadata": {}, "source": "1", "outputs": [], "execution_count": null}],
            "metadata": {"kernelspec": {"name": "python3"}},
            "nbformat": 4,
            "nbformat_minor": 5
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn notebook_exporter_renders_ipynb() {
        let bytes = NotebookExporter.export(&notebook(), "ipynb").await.unwrap();
        assert_eq!(Notebook::from_slice(&bytes).unwrap(), notebook());
    }

    #[tokio::test]
    async fn notebook_exporter_rejects_other_formats() {
        let err = NotebookExporter.export(&notebook(), "html").await.unwrap_err();
        assert!(matches!(err, Error::NotSupported(_)));
    }

    #[tokio::test]
    async fn nbconvert_exporter_renders_ipynb_without_binary() {
        let exporter = NbconvertExporter::new(PathBuf::from("/definitely/not/here/jupyter"));
        let bytes = exporter.export(&notebook(), "notebook").await.unwrap();
        assert!(!bytes.is_empty());
    }

    #[tokio::test]
    async fn nbconvert_exporter_reports_missing_binary_as_export_error() {
        let exporter = NbconvertExporter::new(PathBuf::from("/definitely/not/here/jupyter"));
        let err = exporter.export(&notebook(), "html").await.unwrap_err();
        assert!(matches!(err, Error::Export { ref format, .. } if format == "html"));
    }
}
