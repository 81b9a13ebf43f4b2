//! Deterministic es-CO canonicalization of collected values
//!
//! The kind of a value is inferred from the field name it was collected
//! under; each kind has its own canonical form. Every function here is
//! pure.

mod currency;
mod dates;
mod places;

pub use currency::format_pesos;
pub use dates::format_date;
pub use places::{canonical_address, canonical_city};

use std::collections::BTreeMap;

/// What a collected value represents, for canonicalization purposes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Email,
    Date,
    Currency,
    DocumentNumber,
    City,
    Address,
    ProperName,
    Text,
}

const KIND_KEYWORDS: &[(FieldKind, &[&str])] = &[
    (FieldKind::Email, &["EMAIL", "CORREO"]),
    (FieldKind::Date, &["FECHA", "DATE"]),
    (
        FieldKind::Currency,
        &[
            "VALOR", "MONTO", "CUANTIA", "AMOUNT", "PRECIO", "PRICE", "CANON", "SALARIO",
        ],
    ),
    (
        FieldKind::DocumentNumber,
        &["CEDULA", "DOCUMENTO", "IDENTIFICACION", "NIT", "ID_NUMBER"],
    ),
    (FieldKind::City, &["CIUDAD", "CITY", "MUNICIPIO"]),
    (FieldKind::Address, &["DIRECCION", "ADDRESS", "DOMICILIO"]),
    (
        FieldKind::ProperName,
        &["NOMBRE", "NAME", "APELLIDO", "RAZON_SOCIAL"],
    ),
];

impl FieldKind {
    /// Infer the kind from a field or key name
    ///
    /// Short keywords must match a whole `_`/space separated token so that
    /// e.g. `NIT` does not fire inside `UNIT`.
    pub fn classify(field_name: &str) -> Self {
        let name = fold(field_name).to_uppercase().replace([' ', '-'], "_");
        let tokens: Vec<&str> = name.split('_').filter(|t| !t.is_empty()).collect();

        KIND_KEYWORDS
            .iter()
            .find(|(_, keywords)| {
                keywords.iter().any(|kw| {
                    tokens.contains(kw) || (kw.len() >= 5 && name.contains(kw))
                })
            })
            .map_or(Self::Text, |(kind, _)| *kind)
    }
}

/// Lower-case and strip Spanish diacritics, for comparisons only
pub fn fold(s: &str) -> String {
    s.to_lowercase()
        .chars()
        .map(|c| match c {
            'á' | 'à' | 'ä' | 'â' => 'a',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'ó' | 'ò' | 'ö' | 'ô' => 'o',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            'ñ' => 'n',
            other => other,
        })
        .collect()
}

/// Canonical form of `raw` collected under `field_name`
pub fn normalize_value(field_name: &str, raw: &str) -> String {
    let value = raw.trim();
    if value.is_empty() {
        return String::new();
    }

    match FieldKind::classify(field_name) {
        FieldKind::Email | FieldKind::Text => value.to_string(),
        FieldKind::Date => format_date(value).unwrap_or_else(|| value.to_string()),
        FieldKind::Currency => format_pesos(value).unwrap_or_else(|| value.to_string()),
        FieldKind::DocumentNumber => document_number(value),
        FieldKind::City => canonical_city(value),
        FieldKind::Address => canonical_address(value),
        FieldKind::ProperName => proper_name(value),
    }
}

/// Normalize every entry of a collected-data map
pub fn normalize_map(data: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    data.iter()
        .map(|(k, v)| (k.clone(), normalize_value(k, v)))
        .collect()
}

/// Upper case with diacritics preserved and whitespace collapsed
fn proper_name(value: &str) -> String {
    value
        .split_whitespace()
        .map(str::to_uppercase)
        .collect::<Vec<_>>()
        .join(" ")
}

fn document_number(value: &str) -> String {
    if value.chars().any(char::is_alphabetic) {
        return value.to_uppercase();
    }
    let digits: String = value.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return value.to_string();
    }
    group_thousands(&digits)
}

/// Group a run of ASCII digits by three from the right, separated by `.`
pub(crate) fn group_thousands(digits: &str) -> String {
    let len = digits.chars().count();
    let mut out = String::with_capacity(len + len / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push('.');
        }
        out.push(c);
    }
    out
}
