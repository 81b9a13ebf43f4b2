//! Colombian cities and street addresses

use super::fold;
use regex::Regex;
use std::sync::OnceLock;

/// Folded city name → `CITY, DEPARTMENT`
const CITIES: &[(&str, &str)] = &[
    ("bogota", "BOGOTÁ, D.C."),
    ("bogota d.c.", "BOGOTÁ, D.C."),
    ("bogota dc", "BOGOTÁ, D.C."),
    ("medellin", "MEDELLÍN, ANTIOQUIA"),
    ("cali", "CALI, VALLE DEL CAUCA"),
    ("santiago de cali", "CALI, VALLE DEL CAUCA"),
    ("barranquilla", "BARRANQUILLA, ATLÁNTICO"),
    ("cartagena", "CARTAGENA, BOLÍVAR"),
    ("cartagena de indias", "CARTAGENA, BOLÍVAR"),
    ("bucaramanga", "BUCARAMANGA, SANTANDER"),
    ("cucuta", "CÚCUTA, NORTE DE SANTANDER"),
    ("pereira", "PEREIRA, RISARALDA"),
    ("manizales", "MANIZALES, CALDAS"),
    ("armenia", "ARMENIA, QUINDÍO"),
    ("ibague", "IBAGUÉ, TOLIMA"),
    ("santa marta", "SANTA MARTA, MAGDALENA"),
    ("villavicencio", "VILLAVICENCIO, META"),
    ("pasto", "PASTO, NARIÑO"),
    ("neiva", "NEIVA, HUILA"),
    ("monteria", "MONTERÍA, CÓRDOBA"),
    ("popayan", "POPAYÁN, CAUCA"),
    ("tunja", "TUNJA, BOYACÁ"),
    ("valledupar", "VALLEDUPAR, CESAR"),
    ("sincelejo", "SINCELEJO, SUCRE"),
    ("riohacha", "RIOHACHA, LA GUAJIRA"),
    ("quibdo", "QUIBDÓ, CHOCÓ"),
    ("florencia", "FLORENCIA, CAQUETÁ"),
    ("yopal", "YOPAL, CASANARE"),
    ("envigado", "ENVIGADO, ANTIOQUIA"),
    ("bello", "BELLO, ANTIOQUIA"),
    ("itagui", "ITAGÜÍ, ANTIOQUIA"),
    ("soacha", "SOACHA, CUNDINAMARCA"),
    ("palmira", "PALMIRA, VALLE DEL CAUCA"),
    ("soledad", "SOLEDAD, ATLÁNTICO"),
];

/// Folded abbreviation → expansion
const ADDRESS_TERMS: &[(&str, &str)] = &[
    ("cra", "CARRERA"),
    ("cr", "CARRERA"),
    ("kr", "CARRERA"),
    ("kra", "CARRERA"),
    ("carrera", "CARRERA"),
    ("cl", "CALLE"),
    ("cll", "CALLE"),
    ("calle", "CALLE"),
    ("av", "AVENIDA"),
    ("avda", "AVENIDA"),
    ("avenida", "AVENIDA"),
    ("ak", "AVENIDA CARRERA"),
    ("ac", "AVENIDA CALLE"),
    ("dg", "DIAGONAL"),
    ("diag", "DIAGONAL"),
    ("tv", "TRANSVERSAL"),
    ("tr", "TRANSVERSAL"),
    ("trans", "TRANSVERSAL"),
    ("#", "No."),
    ("apto", "APARTAMENTO"),
    ("apt", "APARTAMENTO"),
    ("ap", "APARTAMENTO"),
    ("int", "INTERIOR"),
    ("bl", "BLOQUE"),
    ("blq", "BLOQUE"),
    ("of", "OFICINA"),
    ("ofi", "OFICINA"),
    ("br", "BARRIO"),
    ("mz", "MANZANA"),
    ("cs", "CASA"),
    ("km", "KILÓMETRO"),
];

fn number_sign() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:nro|num|no|n°)\.?\s*(\d)").expect("number sign pattern is valid")
    })
}

/// `CITY, DEPARTMENT` for known cities, upper case otherwise
pub fn canonical_city(raw: &str) -> String {
    let value = raw.trim();
    let head = value.split(',').next().unwrap_or(value);
    let key = fold(head).split_whitespace().collect::<Vec<_>>().join(" ");

    CITIES
        .iter()
        .find(|(name, _)| *name == key)
        .map_or_else(|| value.to_uppercase(), |(_, canonical)| (*canonical).to_string())
}

/// Expand street abbreviations and upper-case the rest
pub fn canonical_address(raw: &str) -> String {
    let marked = number_sign().replace_all(raw.trim(), "# $1");
    let spaced = marked.replace('#', " # ");

    spaced
        .split_whitespace()
        .map(|token| {
            let key = fold(token);
            let key = key.trim_end_matches('.');
            ADDRESS_TERMS
                .iter()
                .find(|(abbr, _)| *abbr == key)
                .map_or_else(|| token.to_uppercase(), |(_, full)| (*full).to_string())
        })
        .collect::<Vec<_>>()
        .join(" ")
}
