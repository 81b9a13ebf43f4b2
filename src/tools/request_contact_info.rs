//! `request_contact_info`: record the requester's identity for anonymous sessions

use super::{ToolContext, ToolOutput};
use crate::db::{StateDelta, UserContact};
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RequestContactInfoInput {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, alias = "address")]
    pub email: Option<String>,
}

fn email_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern is valid"))
}

pub(super) async fn run(input: &RequestContactInfoInput, ctx: &ToolContext) -> ToolOutput {
    let record = match ctx.load_session().await {
        Ok(record) => record,
        Err(output) => return output,
    };

    let known = record
        .as_ref()
        .filter(|r| r.is_authenticated())
        .and_then(|r| r.user_contact.clone())
        .map(|c| (c.name, c.email))
        .or_else(|| {
            ctx.authenticated_user().map(|u| {
                (
                    u.name.clone().unwrap_or_default(),
                    u.email.clone().unwrap_or_default(),
                )
            })
        });
    if let Some((name, email)) = known {
        return ToolOutput::error(format!(
            "The user is already signed in as {name} <{email}>. Do not ask for contact \
             information; use the known identity and continue."
        ));
    }

    let name = input.name.as_deref().map(str::trim).unwrap_or_default();
    let email = input.email.as_deref().map(str::trim).unwrap_or_default();
    if name.is_empty() || email.is_empty() {
        return ToolOutput::error(
            "request_contact_info needs both 'name' and 'email'. Ask the user for whichever \
             is missing, then call it again.",
        );
    }
    if !email_pattern().is_match(email) {
        return ToolOutput::error(format!(
            "'{email}' is not a valid email address. Ask the user to confirm it."
        ));
    }

    let contact = UserContact {
        name: name.to_string(),
        email: email.to_string(),
        authenticated: false,
    };
    match ctx
        .store()
        .merge_write(&ctx.session, &StateDelta::contact(contact))
        .await
    {
        Ok(_) => ToolOutput::success(format!("Contact information saved: {name} <{email}>.")),
        Err(e) => ToolOutput::error(format!("Could not save the contact information: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::{authenticated, fixture};

    fn input(name: &str, email: &str) -> RequestContactInfoInput {
        RequestContactInfoInput {
            name: Some(name.to_string()),
            email: Some(email.to_string()),
        }
    }

    #[tokio::test]
    async fn test_saves_contact() {
        let f = fixture(None);
        let output = run(&input("Ana Gómez", "ana@example.com"), &f.ctx).await;
        assert!(output.success, "{}", output.output);

        let record = f.db.get_session(&f.ctx.session).unwrap().unwrap();
        let contact = record.user_contact.unwrap();
        assert_eq!(contact.email, "ana@example.com");
        assert!(!contact.authenticated);
    }

    #[tokio::test]
    async fn test_authenticated_record_is_rejected_without_write() {
        let f = fixture(None);
        let signed_in = UserContact {
            name: "Ana".to_string(),
            email: "ana@example.com".to_string(),
            authenticated: true,
        };
        f.db.merge_write(&f.ctx.session, &StateDelta::contact(signed_in.clone()))
            .unwrap();
        let before = f.db.get_session(&f.ctx.session).unwrap().unwrap();

        let output = run(&input("Otra", "otra@example.com"), &f.ctx).await;
        assert!(!output.success);
        assert!(output.output.contains("already signed in"));

        let after = f.db.get_session(&f.ctx.session).unwrap().unwrap();
        assert_eq!(after.user_contact, Some(signed_in));
        assert_eq!(after.updated_at, before.updated_at);
    }

    #[tokio::test]
    async fn test_authenticated_caller_is_rejected() {
        let f = fixture(Some(authenticated()));
        let output = run(&input("Otra", "otra@example.com"), &f.ctx).await;
        assert!(!output.success);
        assert!(f.db.get_session(&f.ctx.session).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_requires_both_fields() {
        let f = fixture(None);
        let output = run(
            &RequestContactInfoInput {
                name: Some("Ana".to_string()),
                email: None,
            },
            &f.ctx,
        )
        .await;
        assert!(!output.success);
        assert!(f.db.get_session(&f.ctx.session).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejects_invalid_email() {
        let f = fixture(None);
        let output = run(&input("Ana", "ana-at-example"), &f.ctx).await;
        assert!(!output.success);
        assert!(output.output.contains("not a valid email"));
    }

    #[test]
    fn test_address_alias() {
        let parsed: RequestContactInfoInput =
            serde_json::from_str(r#"{"name": "Ana", "address": "ana@example.com"}"#).unwrap();
        assert_eq!(parsed.email.as_deref(), Some("ana@example.com"));
    }
}
