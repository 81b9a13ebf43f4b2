//! Tool handlers invoked while a run is `requires_action`
//!
//! The set of tools is closed: every name the assistant may call has a
//! typed input variant and an arm in [`dispatch`]. Handlers never fail
//! the turn; every problem becomes a [`ToolOutput`] the assistant can
//! read and recover from.

mod generate_document;
mod normalize_information;
mod request_clarification;
mod request_contact_info;
mod search_sources;
mod store_collected_data;
mod validate_information;

pub use generate_document::GenerateDocumentInput;
pub use normalize_information::NormalizeInformationInput;
pub use request_clarification::RequestClarificationInput;
pub use request_contact_info::RequestContactInfoInput;
pub use search_sources::SearchSourcesInput;
pub use store_collected_data::StoreCollectedDataInput;
pub use validate_information::ValidateInformationInput;

use crate::assistant::{ToolCallRequest, ToolOutputSubmission};
use crate::collaborators::Collaborators;
use crate::db::{AgentRecord, FieldDescriptor, SessionKey, SessionRecord};
use crate::normalize::{fold, normalize_value};
use crate::runtime::{SessionStore, UserContext};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Result from tool execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub success: bool,
    pub output: String,
}

impl ToolOutput {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            output: message.into(),
        }
    }
}

/// Typed tool input
#[derive(Debug, Clone, PartialEq)]
pub enum ToolInput {
    SearchSources(SearchSourcesInput),
    ValidateInformation(ValidateInformationInput),
    NormalizeInformation(NormalizeInformationInput),
    StoreCollectedData(StoreCollectedDataInput),
    GenerateDocument(GenerateDocumentInput),
    RequestContactInfo(RequestContactInfoInput),
    RequestClarification(RequestClarificationInput),
    /// A name with no handler
    Unknown { name: String, input: Value },
    /// A known tool whose arguments did not parse
    Malformed { name: String, error: String },
}

fn parse_input<T: DeserializeOwned>(
    name: &str,
    value: Value,
    wrap: impl FnOnce(T) -> ToolInput,
) -> ToolInput {
    serde_json::from_value(value).map_or_else(
        |e| ToolInput::Malformed {
            name: name.to_string(),
            error: e.to_string(),
        },
        wrap,
    )
}

impl ToolInput {
    /// Get the tool name
    pub fn tool_name(&self) -> &str {
        match self {
            ToolInput::SearchSources(_) => "search_sources",
            ToolInput::ValidateInformation(_) => "validate_information",
            ToolInput::NormalizeInformation(_) => "normalize_information",
            ToolInput::StoreCollectedData(_) => "store_collected_data",
            ToolInput::GenerateDocument(_) => "generate_document",
            ToolInput::RequestContactInfo(_) => "request_contact_info",
            ToolInput::RequestClarification(_) => "request_clarification",
            ToolInput::Unknown { name, .. } | ToolInput::Malformed { name, .. } => name,
        }
    }

    /// Parse from tool name and JSON value
    pub fn from_name_and_value(name: &str, value: Value) -> Self {
        match name {
            "search_sources" => parse_input(name, value, ToolInput::SearchSources),
            "validate_information" => parse_input(name, value, ToolInput::ValidateInformation),
            "normalize_information" => parse_input(name, value, ToolInput::NormalizeInformation),
            "store_collected_data" => parse_input(name, value, ToolInput::StoreCollectedData),
            "generate_document" => parse_input(name, value, ToolInput::GenerateDocument),
            "request_contact_info" => parse_input(name, value, ToolInput::RequestContactInfo),
            "request_clarification" => parse_input(name, value, ToolInput::RequestClarification),
            _ => ToolInput::Unknown {
                name: name.to_string(),
                input: value,
            },
        }
    }
}

/// A tool call with its arguments decoded
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub input: ToolInput,
}

impl ToolCall {
    pub fn from_request(request: &ToolCallRequest) -> Self {
        let raw = request.arguments.trim();
        let input = if raw.is_empty() {
            ToolInput::from_name_and_value(&request.name, Value::Object(Map::new()))
        } else {
            match serde_json::from_str::<Value>(raw) {
                Ok(value) => ToolInput::from_name_and_value(&request.name, value),
                Err(e) => ToolInput::Malformed {
                    name: request.name.clone(),
                    error: format!("arguments are not valid JSON: {e}"),
                },
            }
        };
        Self {
            id: request.id.clone(),
            input,
        }
    }

    pub fn name(&self) -> &str {
        self.input.tool_name()
    }
}

/// All context needed for a tool invocation
///
/// Created once per tool batch. Handlers are stateless and share nothing
/// except what goes through the session store.
#[derive(Clone)]
pub struct ToolContext {
    /// The session this tool is executing within
    pub session: SessionKey,
    /// Owning agent: template, field metadata, price and SLA
    pub agent: Arc<AgentRecord>,
    /// Identity supplied by the caller for this turn
    pub user: Option<UserContext>,
    /// Used when the agent declares no SLA of its own
    pub default_sla_hours: u32,
    store: Arc<dyn SessionStore>,
    collaborators: Collaborators,
}

impl ToolContext {
    pub fn new(
        session: SessionKey,
        agent: Arc<AgentRecord>,
        user: Option<UserContext>,
        store: Arc<dyn SessionStore>,
        collaborators: Collaborators,
        default_sla_hours: u32,
    ) -> Self {
        Self {
            session,
            agent,
            user,
            default_sla_hours,
            store,
            collaborators,
        }
    }

    pub fn store(&self) -> &dyn SessionStore {
        self.store.as_ref()
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.agent.template.fields
    }

    /// Authenticated identity from the caller, if any
    pub fn authenticated_user(&self) -> Option<&UserContext> {
        self.user.as_ref().filter(|u| u.is_authenticated)
    }

    /// Load the session record, or a tool error explaining why it could not be read
    async fn load_session(&self) -> Result<Option<SessionRecord>, ToolOutput> {
        self.store
            .get_session(&self.session)
            .await
            .map_err(|e| ToolOutput::error(format!("Could not load the session data: {e}")))
    }
}

/// Execute one tool call
pub async fn dispatch(call: &ToolCall, ctx: &ToolContext) -> ToolOutput {
    let output = match &call.input {
        ToolInput::SearchSources(input) => search_sources::run(input, ctx).await,
        ToolInput::ValidateInformation(input) => validate_information::run(input, ctx).await,
        ToolInput::NormalizeInformation(input) => normalize_information::run(input),
        ToolInput::StoreCollectedData(input) => store_collected_data::run(input, ctx).await,
        ToolInput::GenerateDocument(input) => generate_document::run(input, ctx).await,
        ToolInput::RequestContactInfo(input) => request_contact_info::run(input, ctx).await,
        ToolInput::RequestClarification(input) => request_clarification::run(input),
        ToolInput::Unknown { name, .. } => ToolOutput::error(format!(
            "Tool '{name}' is not implemented. Continue the conversation without it."
        )),
        ToolInput::Malformed { name, error } => ToolOutput::error(format!(
            "Invalid arguments for '{name}': {error}. Call it again with valid arguments."
        )),
    };

    tracing::info!(
        tool = %call.name(),
        tool_call_id = %call.id,
        thread_id = %ctx.session.thread_id,
        success = output.success,
        "Tool executed"
    );
    output
}

/// Answer every call of a `requires_action` batch, one output per call
pub async fn dispatch_batch(
    requests: &[ToolCallRequest],
    ctx: &ToolContext,
) -> Vec<ToolOutputSubmission> {
    let mut outputs = Vec::with_capacity(requests.len());
    for request in requests {
        let call = ToolCall::from_request(request);
        let output = dispatch(&call, ctx).await;
        outputs.push(ToolOutputSubmission {
            tool_call_id: request.id.clone(),
            output: output.output,
        });
    }
    outputs
}

/// Flatten tool-supplied JSON values to strings
///
/// Nulls and blank strings are dropped; numbers and booleans use their
/// JSON text; nested values are kept as compact JSON.
pub fn stringify_values(data: &Map<String, Value>) -> BTreeMap<String, String> {
    data.iter()
        .filter_map(|(key, value)| {
            let text = match value {
                Value::Null => return None,
                Value::String(s) => s.trim().to_string(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Array(_) | Value::Object(_) => value.to_string(),
            };
            let key = key.trim();
            (!text.is_empty() && !key.is_empty()).then(|| (key.to_string(), text))
        })
        .collect()
}

/// Field declared for a collected key: by name, placeholder or prompt text
pub fn field_for_key<'a>(fields: &'a [FieldDescriptor], key: &str) -> Option<&'a FieldDescriptor> {
    let folded = fold(key.trim());
    fields.iter().find(|f| {
        fold(&f.name) == folded
            || fold(&f.placeholder) == folded
            || (!f.prompt.trim().is_empty() && fold(f.prompt.trim()) == folded)
    })
}

/// Placeholder → canonical value for newly collected data
///
/// Keys that match no declared field map under the raw key.
pub fn derive_mapping(
    fields: &[FieldDescriptor],
    data: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    data.iter()
        .map(|(key, value)| match field_for_key(fields, key) {
            Some(field) => (field.placeholder.clone(), normalize_value(&field.name, value)),
            None => (key.clone(), normalize_value(key, value)),
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::db::{Database, DocumentTemplate, NewAgent};
    use crate::runtime::testing::{MockSearch, MockTracker};
    use crate::runtime::DatabaseStorage;

    pub fn agent() -> AgentRecord {
        let db = Database::open_in_memory().unwrap();
        db.create_agent(&NewAgent {
            id: Some("agent-1".to_string()),
            name: "Derecho de petición".to_string(),
            assistant_id: "asst_1".to_string(),
            document_type: "derecho_peticion".to_string(),
            template: DocumentTemplate {
                body: "Yo, {{NAME}}, residente en {{CITY}}, solicito.".to_string(),
                fields: vec![
                    FieldDescriptor {
                        name: "NAME".to_string(),
                        placeholder: "NAME".to_string(),
                        prompt: "Nombre completo".to_string(),
                        required: true,
                    },
                    FieldDescriptor {
                        name: "CITY".to_string(),
                        placeholder: "CITY".to_string(),
                        prompt: "Ciudad de residencia".to_string(),
                        required: true,
                    },
                ],
            },
            price: 50_000,
            sla_hours: Some(48),
        })
        .unwrap()
    }

    pub struct Fixture {
        pub db: Database,
        pub tracker: Arc<MockTracker>,
        pub search: Arc<MockSearch>,
        pub ctx: ToolContext,
    }

    pub fn fixture(user: Option<UserContext>) -> Fixture {
        let db = Database::open_in_memory().unwrap();
        let tracker = Arc::new(MockTracker::new());
        let search = Arc::new(MockSearch::new());
        let collaborators = Collaborators {
            search: Some(search.clone()),
            tracker: tracker.clone(),
        };
        let ctx = ToolContext::new(
            SessionKey::new("thread-1", "agent-1"),
            Arc::new(agent()),
            user,
            Arc::new(DatabaseStorage::new(db.clone())),
            collaborators,
            24,
        );
        Fixture {
            db,
            tracker,
            search,
            ctx,
        }
    }

    pub fn authenticated() -> UserContext {
        UserContext {
            is_authenticated: true,
            name: Some("Ana Gómez".to_string()),
            email: Some("ana@example.com".to_string()),
        }
    }
}
