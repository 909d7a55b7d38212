//! Parameter injection
//!
//! Materializes job parameters as a code cell tagged `injected-parameters`.
//! The cell goes right after the notebook's own `parameters` cell so injected
//! values override the defaults, or first when there is no such cell.

use crate::notebook::{Cell, Notebook};
use crate::types::Parameters;
use serde_json::Value;
use uuid::Uuid;

/// Tag that marks the user's default-parameters cell
pub const PARAMETERS_TAG: &str = "parameters";
/// Tag carried by the cell this module generates
pub const INJECTED_TAG: &str = "injected-parameters";

/// Return a copy of `notebook` with `parameters` injected as a code cell
///
/// A cell injected by an earlier run is replaced rather than stacked.
pub fn add_parameters(notebook: &Notebook, parameters: &Parameters) -> Notebook {
    let mut notebook = notebook.clone();
    notebook.cells.retain(|cell| !cell.has_tag(INJECTED_TAG));

    let mut cell = Cell::code(parameters_source(parameters));
    cell.set_tags(&[INJECTED_TAG]);
    // Cell ids are mandatory from nbformat 4.5 on
    if (notebook.nbformat, notebook.nbformat_minor) >= (4, 5) {
        cell.id = Some(Uuid::new_v4().to_string());
    }

    let position = notebook
        .cells
        .iter()
        .position(|cell| cell.has_tag(PARAMETERS_TAG))
        .map_or(0, |index| index + 1);
    notebook.cells.insert(position, cell);

    notebook
}

fn parameters_source(parameters: &Parameters) -> String {
    let mut source = String::from("# Parameters\n");
    for (name, value) in parameters {
        source.push_str(name);
        source.push_str(" = ");
        source.push_str(&python_literal(value));
        source.push('\n');
    }
    source
}

/// Render a JSON value as the equivalent Python literal
fn python_literal(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => n.to_string(),
        // JSON string escapes are valid Python string escapes
        Value::String(s) => Value::String(s.clone()).to_string(),
        Value::Array(items) => {
            let items: Vec<_> = items.iter().map(python_literal).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Object(map) => {
            let entries: Vec<_> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", Value::String(k.clone()), python_literal(v)))
                .collect();
            format!("{{{}}}", entries.join(", "))
        }
    }
}
