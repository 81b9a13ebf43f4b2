//! Peso amounts: grouped figures plus the amount spelled out in words

use super::group_thousands;

const UNITS: [&str; 30] = [
    "CERO",
    "UNO",
    "DOS",
    "TRES",
    "CUATRO",
    "CINCO",
    "SEIS",
    "SIETE",
    "OCHO",
    "NUEVE",
    "DIEZ",
    "ONCE",
    "DOCE",
    "TRECE",
    "CATORCE",
    "QUINCE",
    "DIECISÉIS",
    "DIECISIETE",
    "DIECIOCHO",
    "DIECINUEVE",
    "VEINTE",
    "VEINTIUNO",
    "VEINTIDÓS",
    "VEINTITRÉS",
    "VEINTICUATRO",
    "VEINTICINCO",
    "VEINTISÉIS",
    "VEINTISIETE",
    "VEINTIOCHO",
    "VEINTINUEVE",
];

const TENS: [&str; 10] = [
    "", "", "", "TREINTA", "CUARENTA", "CINCUENTA", "SESENTA", "SETENTA", "OCHENTA", "NOVENTA",
];

const HUNDREDS: [&str; 10] = [
    "",
    "CIENTO",
    "DOSCIENTOS",
    "TRESCIENTOS",
    "CUATROCIENTOS",
    "QUINIENTOS",
    "SEISCIENTOS",
    "SETECIENTOS",
    "OCHOCIENTOS",
    "NOVECIENTOS",
];

const SCALES: [(u64, &str, &str); 2] = [
    (1_000_000_000_000, "BILLÓN", "BILLONES"),
    (1_000_000, "MILLÓN", "MILLONES"),
];

/// Spell a whole number in upper-case Spanish
///
/// With `apocope` the trailing one takes its pre-noun form (`UN`,
/// `VEINTIÚN`), as in `VEINTIÚN MIL PESOS`.
pub fn spell_number(n: u64, apocope: bool) -> String {
    for (scale, singular, plural) in SCALES {
        if n >= scale {
            let high = n / scale;
            let rest = n % scale;
            let mut words = if high == 1 {
                format!("UN {singular}")
            } else {
                format!("{} {plural}", spell_number(high, true))
            };
            if rest > 0 {
                words.push(' ');
                words.push_str(&spell_number(rest, apocope));
            }
            return words;
        }
    }
    below_million(n, apocope)
}

fn below_million(n: u64, apocope: bool) -> String {
    let thousands = n / 1000;
    let rest = n % 1000;
    let mut parts = Vec::new();

    match thousands {
        0 => {}
        1 => parts.push("MIL".to_string()),
        t => parts.push(format!("{} MIL", below_thousand(t, true))),
    }
    if rest > 0 || n == 0 {
        parts.push(below_thousand(rest, apocope));
    }
    parts.join(" ")
}

fn below_thousand(n: u64, apocope: bool) -> String {
    if n == 100 {
        return "CIEN".to_string();
    }
    let hundreds = n / 100;
    let rest = n % 100;
    let mut parts = Vec::new();
    if hundreds > 0 {
        parts.push(index(&HUNDREDS, hundreds).to_string());
    }
    if rest > 0 || n == 0 {
        parts.push(below_hundred(rest, apocope));
    }
    parts.join(" ")
}

fn below_hundred(n: u64, apocope: bool) -> String {
    if n < 30 {
        return match (n, apocope) {
            (1, true) => "UN".to_string(),
            (21, true) => "VEINTIÚN".to_string(),
            _ => index(&UNITS, n).to_string(),
        };
    }
    let tens = index(&TENS, n / 10);
    match n % 10 {
        0 => tens.to_string(),
        1 if apocope => format!("{tens} Y UN"),
        unit => format!("{tens} Y {}", index(&UNITS, unit)),
    }
}

fn index<'a>(table: &[&'a str], n: u64) -> &'a str {
    usize::try_from(n)
        .ok()
        .and_then(|i| table.get(i))
        .copied()
        .unwrap_or_default()
}

/// Parse a peso amount written with either separator convention
///
/// Returns whole pesos and cents. When both `.` and `,` appear the last
/// one is the decimal mark; a lone separator followed by exactly three
/// digits is a thousands mark.
fn parse_amount(raw: &str) -> Option<(u64, u32)> {
    let cleaned: String = raw
        .trim()
        .trim_start_matches('$')
        .trim_end_matches("M/CTE")
        .trim_end_matches("COP")
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '$')
        .collect();
    if cleaned.is_empty()
        || !cleaned
            .chars()
            .all(|c| c.is_ascii_digit() || c == '.' || c == ',')
    {
        return None;
    }

    let decimal_mark = match (cleaned.rfind('.'), cleaned.rfind(',')) {
        (Some(dot), Some(comma)) => Some(if dot > comma { '.' } else { ',' }),
        (Some(_), None) => lone_decimal_mark(&cleaned, '.'),
        (None, Some(_)) => lone_decimal_mark(&cleaned, ','),
        (None, None) => None,
    };

    let (whole, fraction) = match decimal_mark.and_then(|mark| cleaned.rsplit_once(mark)) {
        Some((whole, fraction)) => (whole.to_string(), fraction.to_string()),
        None => (cleaned.clone(), String::new()),
    };

    let whole_digits: String = whole.chars().filter(char::is_ascii_digit).collect();
    if whole_digits.is_empty() && fraction.is_empty() {
        return None;
    }
    let pesos = if whole_digits.is_empty() {
        0
    } else {
        whole_digits.parse::<u64>().ok()?
    };

    let mut cent_digits: String = fraction.chars().take(2).collect();
    while cent_digits.len() < 2 {
        cent_digits.push('0');
    }
    let cents = cent_digits.parse::<u32>().ok()?;

    Some((pesos, cents))
}

fn lone_decimal_mark(cleaned: &str, mark: char) -> Option<char> {
    let occurrences = cleaned.matches(mark).count();
    let trailing = cleaned
        .rsplit_once(mark)
        .map_or(0, |(_, tail)| tail.chars().count());
    if occurrences == 1 && trailing != 3 {
        Some(mark)
    } else {
        None
    }
}

/// `$1.500.000 (UN MILLÓN QUINIENTOS MIL PESOS M/CTE)`
pub fn format_pesos(raw: &str) -> Option<String> {
    let (pesos, cents) = parse_amount(raw)?;

    let mut figure = format!("${}", group_thousands(&pesos.to_string()));
    if cents > 0 {
        figure.push_str(&format!(",{cents:02}"));
    }

    let mut words = match pesos {
        1 => "UN PESO".to_string(),
        p if p >= 1_000_000 && p % 1_000_000 == 0 => format!("{} DE PESOS", spell_number(p, true)),
        p => format!("{} PESOS", spell_number(p, true)),
    };
    if cents > 0 {
        words.push_str(&format!(" CON {cents:02}/100"));
    }

    Some(format!("{figure} ({words} M/CTE)"))
}
