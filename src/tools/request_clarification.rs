//! `request_clarification`: pass a question through to the user

use super::ToolOutput;
use serde::Deserialize;
use std::fmt::Write as _;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RequestClarificationInput {
    #[serde(default)]
    pub question: String,
    /// Suggested answers, if the question is multiple choice
    #[serde(default)]
    pub options: Vec<String>,
    /// Field the answer is for
    #[serde(default)]
    pub field: Option<String>,
}

pub(super) fn run(input: &RequestClarificationInput) -> ToolOutput {
    let question = input.question.trim();
    if question.is_empty() {
        return ToolOutput::error("request_clarification needs a non-empty 'question'.");
    }

    let mut out = String::from("Ask the user: ");
    out.push_str(question);
    if let Some(field) = input.field.as_deref().map(str::trim).filter(|f| !f.is_empty()) {
        let _ = write!(out, "\n(for field {field})");
    }
    let options: Vec<&str> = input
        .options
        .iter()
        .map(|o| o.trim())
        .filter(|o| !o.is_empty())
        .collect();
    if !options.is_empty() {
        out.push_str("\nOptions:");
        for (i, option) in options.iter().enumerate() {
            let _ = write!(out, "\n{}. {option}", i + 1);
        }
    }
    ToolOutput::success(out)
}
