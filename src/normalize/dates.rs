//! Dates in the long Spanish form: `5 de marzo de 2024`

use super::fold;
use chrono::{Datelike, NaiveDate};

const MONTHS: [&str; 12] = [
    "enero",
    "febrero",
    "marzo",
    "abril",
    "mayo",
    "junio",
    "julio",
    "agosto",
    "septiembre",
    "octubre",
    "noviembre",
    "diciembre",
];

const NUMERIC_FORMATS: [&str; 4] = ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%Y/%m/%d"];

/// Canonical `D de mes de YYYY`, or `None` if `raw` is not a recognizable date
pub fn format_date(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let date = NUMERIC_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .or_else(|| parse_long_form(raw))?;
    Some(long_form(date))
}

fn long_form(date: NaiveDate) -> String {
    let month = MONTHS
        .get(date.month0() as usize)
        .copied()
        .unwrap_or_default();
    format!("{} de {month} de {}", date.day(), date.year())
}

/// Already-written `5 de Marzo de 2024` / `5 de marzo del 2024`
fn parse_long_form(raw: &str) -> Option<NaiveDate> {
    let folded = fold(raw);
    let words: Vec<&str> = folded.split_whitespace().collect();
    let [day, "de", month, "de" | "del", year] = words.as_slice() else {
        return None;
    };

    let day: u32 = day.parse().ok()?;
    let year: i32 = year.parse().ok()?;
    let month = match *month {
        "setiembre" => 9,
        m => MONTHS.iter().position(|name| *name == m)? + 1,
    };
    NaiveDate::from_ymd_opt(year, u32::try_from(month).ok()?, day)
}
