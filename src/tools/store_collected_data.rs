//! `store_collected_data`: the only handler that writes collected data

use super::{derive_mapping, stringify_values, ToolContext, ToolOutput};
use crate::db::StateDelta;
use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StoreCollectedDataInput {
    #[serde(default)]
    pub data: Map<String, Value>,
    /// Merge into existing data (default) or replace it entirely
    #[serde(default = "default_merge")]
    pub merge: bool,
}

fn default_merge() -> bool {
    true
}

const EMPTY_PAYLOAD: &str = "store_collected_data was called without any values. Nothing was \
    saved. Call it again with the collected values in 'data', for example \
    {\"data\": {\"NOMBRE\": \"Ana Gómez\", \"CIUDAD\": \"Cali\"}}.";

pub(super) async fn run(input: &StoreCollectedDataInput, ctx: &ToolContext) -> ToolOutput {
    let data = stringify_values(&input.data);
    if data.is_empty() {
        return ToolOutput::error(EMPTY_PAYLOAD);
    }

    let mapping = derive_mapping(ctx.fields(), &data);
    let keys: Vec<&str> = data.keys().map(String::as_str).collect();
    let summary = format!("Stored {} value(s): {}.", keys.len(), keys.join(", "));

    match ctx
        .store()
        .merge_write(&ctx.session, &StateDelta::data(data.clone(), mapping, input.merge))
        .await
    {
        Ok(record) => {
            tracing::debug!(
                thread_id = %ctx.session.thread_id,
                stored = data.len(),
                total = record.collected_data.len(),
                merge = input.merge,
                "Collected data stored"
            );
            ToolOutput::success(summary)
        }
        Err(e) => ToolOutput::error(format!("Could not save the collected data: {e}")),
    }
}
