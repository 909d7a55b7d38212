//! Notebook documents (nbformat v4)
//!
//! Only the parts this crate reads are typed; every other field is carried
//! through untouched so a notebook survives a read/execute/write cycle intact.

use crate::error::{CellExecutionError, Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

/// Cell source: nbformat allows a single string or a list of lines
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Source {
    /// Whole source as one string
    Text(String),
    /// Source split into lines (each keeps its trailing newline)
    Lines(Vec<String>),
}

impl Source {
    /// The full source text
    pub fn text(&self) -> String {
        match self {
            Source::Text(text) => text.clone(),
            Source::Lines(lines) => lines.concat(),
        }
    }
}

impl Default for Source {
    fn default() -> Self {
        Source::Text(String::new())
    }
}

/// A single notebook cell
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    /// "code", "markdown" or "raw"
    pub cell_type: String,
    /// Cell id (nbformat >= 4.5)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Cell metadata (tags live under "tags")
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Cell source
    #[serde(default)]
    pub source: Source,
    /// Outputs, execution count, attachments, ...
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Cell {
    /// A fresh, unexecuted code cell
    pub fn code(source: impl Into<String>) -> Self {
        let mut extra = Map::new();
        extra.insert("outputs".to_string(), Value::Array(Vec::new()));
        extra.insert("execution_count".to_string(), Value::Null);
        Self {
            cell_type: "code".to_string(),
            id: None,
            metadata: Map::new(),
            source: Source::Text(source.into()),
            extra,
        }
    }

    /// Whether the cell carries `tag` in its metadata
    pub fn has_tag(&self, tag: &str) -> bool {
        self.metadata
            .get("tags")
            .and_then(Value::as_array)
            .is_some_and(|tags| tags.iter().any(|t| t.as_str() == Some(tag)))
    }

    /// Replace the cell's tags
    pub fn set_tags(&mut self, tags: &[&str]) {
        self.metadata.insert(
            "tags".to_string(),
            Value::Array(tags.iter().map(|t| Value::String(t.to_string())).collect()),
        );
    }

    /// Outputs recorded by the last execution (empty for non-code cells)
    pub fn outputs(&self) -> &[Value] {
        self.extra
            .get("outputs")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Append an output to a code cell
    pub fn push_output(&mut self, output: Value) {
        let outputs = self
            .extra
            .entry("outputs")
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(outputs) = outputs {
            outputs.push(output);
        }
    }
}

/// A notebook document
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Notebook {
    /// Cells in execution order
    pub cells: Vec<Cell>,
    /// Notebook metadata (kernelspec, language_info, widgets, ...)
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Major format version
    pub nbformat: u32,
    /// Minor format version
    pub nbformat_minor: u32,
}

impl Notebook {
    /// Parse a notebook from JSON bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let notebook: Notebook = serde_json::from_slice(bytes)
            .map_err(|e| Error::InvalidNotebook(format!("failed to parse notebook: {}", e)))?;

        if notebook.nbformat != 4 {
            return Err(Error::InvalidNotebook(format!(
                "unsupported nbformat version {}",
                notebook.nbformat
            )));
        }

        Ok(notebook)
    }

    /// Read a notebook from disk
    pub async fn read(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        Self::from_slice(&bytes)
    }

    /// Serialize as indented JSON, the way notebooks are stored on disk
    pub fn to_vec_pretty(&self) -> Result<Vec<u8>> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// Name of the kernel the notebook asks for (`metadata.kernelspec.name`)
    pub fn kernel_name(&self) -> Option<&str> {
        self.metadata
            .get("kernelspec")
            .and_then(|spec| spec.get("name"))
            .and_then(Value::as_str)
    }

    /// The first error output recorded in any cell
    pub fn first_error(&self) -> Option<CellExecutionError> {
        self.cells.iter().enumerate().find_map(|(index, cell)| {
            cell.outputs()
                .iter()
                .find(|output| output.get("output_type").and_then(Value::as_str) == Some("error"))
                .map(|output| CellExecutionError {
                    cell_index: index,
                    ename: string_field(output, "ename"),
                    evalue: string_field(output, "evalue"),
                })
        })
    }
}

fn string_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}
