//! Document synthesis
//!
//! Resolves a template's placeholders against the data collected for a
//! session. Pure: the caller decides what to do with unresolved tokens.

use crate::db::{DocumentTemplate, FieldDescriptor};
use crate::normalize::{fold, normalize_value};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Shortest key or field name considered by the fuzzy fallback
const FUZZY_MIN_LEN: usize = 3;

/// Rendered document text plus any tokens left bracketed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Synthesis {
    pub text: String,
    /// Tokens still present as `{{TOKEN}}`, in order of first appearance
    pub unresolved: Vec<String>,
}

impl Synthesis {
    /// Unresolved tokens that are not declared optional
    pub fn missing_required(&self, fields: &[FieldDescriptor]) -> Vec<String> {
        self.unresolved
            .iter()
            .filter(|token| {
                fields
                    .iter()
                    .find(|f| f.placeholder == **token)
                    .map_or(true, |f| f.required)
            })
            .cloned()
            .collect()
    }
}

fn token_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}").expect("token pattern is valid"))
}

fn non_empty<'a>(map: &'a BTreeMap<String, String>, key: &str) -> Option<&'a str> {
    map.get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

/// Find the raw value for a declared field
///
/// Priority: explicit placeholder mapping, collected data keyed by field
/// name, by placeholder token, by prompt text, then the first collected
/// key that contains (or is contained in) the field name once folded.
pub fn resolve_field<'a>(
    field: &FieldDescriptor,
    collected: &'a BTreeMap<String, String>,
    mapping: &'a BTreeMap<String, String>,
) -> Option<&'a str> {
    non_empty(mapping, &field.placeholder)
        .or_else(|| non_empty(collected, &field.name))
        .or_else(|| non_empty(collected, &field.placeholder))
        .or_else(|| {
            if field.prompt.trim().is_empty() {
                None
            } else {
                non_empty(collected, field.prompt.trim())
            }
        })
        .or_else(|| fuzzy_match(&field.name, collected))
}

fn fuzzy_match<'a>(name: &str, collected: &'a BTreeMap<String, String>) -> Option<&'a str> {
    let name = fold(name).replace([' ', '-'], "_");
    if name.chars().count() < FUZZY_MIN_LEN {
        return None;
    }

    collected.iter().find_map(|(key, value)| {
        let key = fold(key).replace([' ', '-'], "_");
        let matches = key.chars().count() >= FUZZY_MIN_LEN
            && (key.contains(&name) || name.contains(&key));
        let value = value.trim();
        (matches && !value.is_empty()).then_some(value)
    })
}

/// Substitute every resolvable token in `template`
///
/// Each resolved value is canonicalized for its field before substitution.
/// A token's bare form (`TOKEN` as a whole word) is only replaced when the
/// template has no bracketed occurrence of it. All occurrences are located
/// in the template body before anything is written, so a substituted value
/// is never scanned again. `observations` are appended verbatim after
/// substitution.
pub fn synthesize(
    template: &DocumentTemplate,
    collected: &BTreeMap<String, String>,
    mapping: &BTreeMap<String, String>,
    observations: Option<&str>,
) -> Synthesis {
    let body = template.body.as_str();

    // First resolvable field wins for a shared placeholder
    let mut values: BTreeMap<&str, String> = BTreeMap::new();
    for field in &template.fields {
        let token = field.placeholder.trim();
        if token.is_empty() || values.contains_key(token) {
            continue;
        }
        if let Some(raw) = resolve_field(field, collected, mapping) {
            values.insert(token, normalize_value(&field.name, raw));
        }
    }

    let bracketed = bracketed_spans(body);
    let mut spans: Vec<Span> = Vec::new();
    let mut unresolved: Vec<String> = Vec::new();

    for (range, token) in &bracketed {
        // Tokens with no declared field still resolve by exact key
        let value = values.get(token.as_str()).cloned().or_else(|| {
            non_empty(mapping, token)
                .or_else(|| non_empty(collected, token))
                .map(|raw| normalize_value(token, raw))
        });
        match value {
            Some(value) => spans.push(Span {
                start: range.start,
                end: range.end,
                value,
            }),
            None if !unresolved.contains(token) => unresolved.push(token.clone()),
            None => {}
        }
    }

    for (token, value) in &values {
        if bracketed.iter().any(|(_, t)| t == token) {
            continue;
        }
        let Ok(bare) = Regex::new(&format!(r"\b{}\b", regex::escape(token))) else {
            continue;
        };
        for m in bare.find_iter(body) {
            let inside_token = bracketed
                .iter()
                .any(|(range, _)| m.start() < range.end && range.start < m.end());
            if !inside_token {
                spans.push(Span {
                    start: m.start(),
                    end: m.end(),
                    value: value.clone(),
                });
            }
        }
    }

    let mut text = render(body, spans);

    if let Some(obs) = observations.map(str::trim).filter(|o| !o.is_empty()) {
        text.push_str("\n\n");
        text.push_str(obs);
    }

    Synthesis { text, unresolved }
}

/// A byte range of the template body and its replacement
struct Span {
    start: usize,
    end: usize,
    value: String,
}

/// Write `body` with every span replaced; overlaps keep the earliest, longest span
fn render(body: &str, mut spans: Vec<Span>) -> String {
    spans.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));

    let mut out = String::with_capacity(body.len());
    let mut cursor = 0;
    for span in spans {
        if span.start < cursor {
            continue;
        }
        out.push_str(body.get(cursor..span.start).unwrap_or_default());
        out.push_str(&span.value);
        cursor = span.end;
    }
    out.push_str(body.get(cursor..).unwrap_or_default());
    out
}

/// Every `{{TOKEN}}` occurrence with its trimmed token
fn bracketed_spans(text: &str) -> Vec<(std::ops::Range<usize>, String)> {
    token_pattern()
        .captures_iter(text)
        .filter_map(|cap| {
            let whole = cap.get(0)?;
            let token = cap.get(1)?;
            Some((whole.range(), token.as_str().to_string()))
        })
        .collect()
}
