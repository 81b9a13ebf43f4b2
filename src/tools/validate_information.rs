//! `validate_information`: report which required fields are still missing

use super::{derive_mapping, stringify_values, ToolContext, ToolOutput};
use crate::synthesis::resolve_field;
use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ValidateInformationInput {
    /// Values to check on top of what the session already holds
    #[serde(default)]
    pub data: Map<String, Value>,
}

pub(super) async fn run(input: &ValidateInformationInput, ctx: &ToolContext) -> ToolOutput {
    let record = match ctx.load_session().await {
        Ok(record) => record,
        Err(output) => return output,
    };

    let (mut collected, mut mapping) = record
        .map(|r| (r.collected_data, r.placeholder_mapping))
        .unwrap_or_default();
    let supplied = stringify_values(&input.data);
    mapping.extend(derive_mapping(ctx.fields(), &supplied));
    collected.extend(supplied);

    let missing: Vec<String> = ctx
        .fields()
        .iter()
        .filter(|f| f.required && resolve_field(f, &collected, &mapping).is_none())
        .map(|f| {
            if f.prompt.trim().is_empty() {
                format!("- {}", f.name)
            } else {
                format!("- {} ({})", f.prompt.trim(), f.name)
            }
        })
        .collect();

    if missing.is_empty() {
        ToolOutput::success("All required information has been collected.")
    } else {
        ToolOutput::success(format!(
            "Missing required information:\n{}",
            missing.join("\n")
        ))
    }
}
