//! `normalize_information`: canonical es-CO forms of supplied values

use super::{stringify_values, ToolOutput};
use crate::normalize::normalize_map;
use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct NormalizeInformationInput {
    #[serde(default)]
    pub data: Map<String, Value>,
}

/// Pure: nothing is persisted
pub(super) fn run(input: &NormalizeInformationInput) -> ToolOutput {
    let data = stringify_values(&input.data);
    if data.is_empty() {
        return ToolOutput::error(
            "normalize_information needs a non-empty 'data' object of field names and values.",
        );
    }

    match serde_json::to_string_pretty(&normalize_map(&data)) {
        Ok(text) => ToolOutput::success(text),
        Err(e) => ToolOutput::error(format!("Could not serialize normalized values: {e}")),
    }
}
