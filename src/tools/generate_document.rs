//! `generate_document`: synthesize the final document and hand it off for tracking

use super::{derive_mapping, stringify_values, ToolContext, ToolOutput};
use crate::collaborators::{TrackingReceipt, TrackingRequest};
use crate::db::{SessionRecord, SessionStatus, StateDelta};
use crate::normalize::{group_thousands, FieldKind};
use crate::synthesis::synthesize;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GenerateDocumentInput {
    /// Values that take precedence over the stored ones when non-empty
    #[serde(default)]
    pub data: Map<String, Value>,
    /// Free text appended after the rendered template
    #[serde(default)]
    pub observations: Option<String>,
}

/// Requester identity needed before a document can be issued
struct Requester {
    name: String,
    address: String,
}

/// Contact on the record, then the caller's identity, then collected values
fn find_requester(
    record: Option<&SessionRecord>,
    ctx: &ToolContext,
    collected: &BTreeMap<String, String>,
) -> Option<Requester> {
    let contact = record.and_then(|r| r.user_contact.as_ref());
    let user = ctx.user.as_ref();
    let collected_of = |kind: FieldKind| {
        collected
            .iter()
            .find(|(key, value)| FieldKind::classify(key) == kind && !value.trim().is_empty())
            .map(|(_, value)| value.trim().to_string())
    };

    let name = contact
        .map(|c| c.name.clone())
        .filter(|n| !n.trim().is_empty())
        .or_else(|| user.and_then(|u| u.name.clone()).filter(|n| !n.trim().is_empty()))
        .or_else(|| collected_of(FieldKind::ProperName))?;
    let address = contact
        .map(|c| c.email.clone())
        .filter(|e| !e.trim().is_empty())
        .or_else(|| user.and_then(|u| u.email.clone()).filter(|e| !e.trim().is_empty()))
        .or_else(|| collected_of(FieldKind::Email))?;

    Some(Requester { name, address })
}

pub(super) async fn run(input: &GenerateDocumentInput, ctx: &ToolContext) -> ToolOutput {
    let record = match ctx.load_session().await {
        Ok(record) => record,
        Err(output) => return output,
    };

    let (mut collected, mut mapping) = record
        .as_ref()
        .map(|r| (r.collected_data.clone(), r.placeholder_mapping.clone()))
        .unwrap_or_default();
    let supplied = stringify_values(&input.data);
    if !supplied.is_empty() {
        mapping.extend(derive_mapping(ctx.fields(), &supplied));
        collected.extend(supplied);
    }

    let Some(requester) = find_requester(record.as_ref(), ctx, &collected) else {
        return ToolOutput::error(
            "The document cannot be generated yet: the requester's full name and contact email \
             are required. Ask the user for them, save them with request_contact_info, then call \
             generate_document again.",
        );
    };

    let template = &ctx.agent.template;
    let synthesis = synthesize(template, &collected, &mapping, input.observations.as_deref());
    let missing = synthesis.missing_required(&template.fields);
    if !missing.is_empty() {
        let described: Vec<String> = missing
            .iter()
            .map(|token| {
                template
                    .fields
                    .iter()
                    .find(|f| &f.placeholder == token)
                    .filter(|f| !f.prompt.trim().is_empty())
                    .map_or_else(|| token.clone(), |f| format!("{} ({token})", f.prompt.trim()))
            })
            .collect();
        return ToolOutput::error(format!(
            "The document cannot be generated: required information is missing for {}. Ask the \
             user for these values, save them with store_collected_data, then call \
             generate_document again.",
            described.join(", ")
        ));
    }

    let request = TrackingRequest {
        agent_id: ctx.agent.id.clone(),
        content: synthesis.text,
        document_type: ctx.agent.document_type.clone(),
        contact_name: requester.name,
        contact_address: requester.address,
        sla_hours: ctx.agent.sla_hours.unwrap_or(ctx.default_sla_hours),
    };
    let receipt = match ctx.collaborators().tracker.track(&request).await {
        Ok(receipt) => receipt,
        Err(e) => {
            tracing::warn!(error = %e, thread_id = %ctx.session.thread_id, "Document tracking failed");
            return ToolOutput::error(format!(
                "The document was generated but could not be submitted ({e}). Please try again."
            ));
        }
    };

    let completed = StateDelta {
        status: Some(SessionStatus::Completed),
        ..StateDelta::default()
    };
    if let Err(e) = ctx.store().merge_write(&ctx.session, &completed).await {
        tracing::warn!(error = %e, thread_id = %ctx.session.thread_id, "Failed to mark session completed");
    }

    tracing::info!(
        thread_id = %ctx.session.thread_id,
        tracking_id = %receipt.tracking_id,
        "Document generated"
    );
    ToolOutput::success(confirmation(&receipt, &request))
}

fn confirmation(receipt: &TrackingReceipt, request: &TrackingRequest) -> String {
    let price = if receipt.price < 0 {
        format!("-${}", group_thousands(&receipt.price.unsigned_abs().to_string()))
    } else {
        format!("${}", group_thousands(&receipt.price.to_string()))
    };
    format!(
        "Document generated successfully.\n\
         Tracking ID: {}\n\
         Price: {price} COP\n\
         Estimated delivery: {}\n\
         A confirmation will be sent to {}.",
        receipt.tracking_id,
        receipt.sla_deadline.format("%Y-%m-%d %H:%M UTC"),
        request.contact_address,
    )
}
