// 🧹 Normalization helpers shared by extraction, reconciliation and display
//
// - Amount: raw extracted text or an already-numeric value
// - clean_amount: tolerant text → f64 (NaN when nothing numeric remains)
// - parse_loose_date: day-granularity date from common free-form spellings
// - format_currency: "$1,234.56" display, None for non-numeric amounts

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel stored when a field could not be extracted
pub const UNKNOWN: &str = "Unknown";

// ============================================================================
// AMOUNT
// ============================================================================

/// A currency value as it was captured.
///
/// Receipts keep the raw text (`"$1,234.56"` or `"Unknown"`) until something
/// needs a number; see [`clean_amount`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Amount {
    Number(f64),
    Text(String),
}

impl Amount {
    pub fn unknown() -> Self {
        Amount::Text(UNKNOWN.to_string())
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Amount::Text(t) if t == UNKNOWN)
    }

    /// Numeric value, NaN when the text holds no number
    pub fn value(&self) -> f64 {
        clean_amount(self)
    }
}

impl From<f64> for Amount {
    fn from(value: f64) -> Self {
        Amount::Number(value)
    }
}

impl From<&str> for Amount {
    fn from(value: &str) -> Self {
        Amount::Text(value.to_string())
    }
}

impl From<String> for Amount {
    fn from(value: String) -> Self {
        Amount::Text(value)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Amount::Number(n) => write!(f, "{}", n),
            Amount::Text(t) => write!(f, "{}", t),
        }
    }
}

/// Normalize an amount to a float.
///
/// Numbers pass through. Empty text is `0`. Otherwise every character that is
/// not a digit, `-` or `.` is dropped and the longest leading float literal is
/// parsed, so `"$1,234.56"` → `1234.56`, `"1.2.3"` → `1.2`, `"Unknown"` → NaN.
pub fn clean_amount(value: &Amount) -> f64 {
    match value {
        Amount::Number(n) => *n,
        Amount::Text(text) => clean_amount_str(text),
    }
}

pub fn clean_amount_str(text: &str) -> f64 {
    if text.is_empty() {
        return 0.0;
    }

    let stripped: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '-' || *c == '.')
        .collect();

    parse_float_prefix(&stripped)
}

/// Parse the longest prefix of `s` that is a float literal (`-12.5` from `-12.5-3`)
fn parse_float_prefix(s: &str) -> f64 {
    let bytes = s.as_bytes();
    let mut end = 0;

    if bytes.first() == Some(&b'-') {
        end = 1;
    }

    let int_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let int_digits = end - int_start;

    if end < bytes.len() && bytes[end] == b'.' {
        let mut frac_end = end + 1;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        if frac_end > end + 1 {
            end = frac_end;
        }
    }

    if int_digits == 0 && !s[int_start..end].contains('.') {
        return f64::NAN;
    }

    s[..end].parse().unwrap_or(f64::NAN)
}

/// Two-decimal key used for amount equality (`NaN` never equals anything).
///
/// Negative zero keys as `0.00`. Exact binary ties round half-to-even
/// (`0.125` keys as `0.12`).
pub fn amount_key(value: f64) -> Option<String> {
    if value.is_nan() {
        None
    } else {
        Some(format!("{:.2}", value + 0.0))
    }
}

// ============================================================================
// DATES
// ============================================================================

const NAMED_MONTH_FORMATS: &[&str] = &["%b %d, %Y", "%B %d, %Y", "%d %b %Y", "%d %B %Y", "%b %d %Y"];

/// Parse a free-form date down to the calendar day.
///
/// Accepts `YYYY-MM-DD`, `YYYY/MM/DD`, `MM/DD/YYYY`, `MM-DD-YYYY`, `MM/DD/YY`,
/// RFC 3339 timestamps and month-name spellings (`Jan 5, 2024`, `5 January 2024`).
/// Anything else is `None`.
pub fn parse_loose_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Some(date) = parse_numeric_date(text) {
        return Some(date);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.date_naive());
    }

    if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt.date());
    }

    NAMED_MONTH_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
}

/// Three digit groups split on `/` or `-`
fn parse_numeric_date(text: &str) -> Option<NaiveDate> {
    let parts: Vec<&str> = text.split(|c| c == '/' || c == '-').collect();
    if parts.len() != 3 || parts.iter().any(|p| p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit())) {
        return None;
    }

    let nums: Vec<u32> = parts.iter().map(|p| p.parse().ok()).collect::<Option<_>>()?;

    if parts[0].len() == 4 {
        // YYYY-MM-DD
        return NaiveDate::from_ymd_opt(nums[0] as i32, nums[1], nums[2]);
    }

    // MM/DD/YYYY or MM/DD/YY
    let year = match parts[2].len() {
        4 => nums[2] as i32,
        1 | 2 if nums[2] < 50 => 2000 + nums[2] as i32,
        1 | 2 => 1900 + nums[2] as i32,
        _ => return None,
    };

    NaiveDate::from_ymd_opt(year, nums[0], nums[1])
}

/// True when both strings parse to the same calendar day
pub fn same_day(a: &str, b: &str) -> bool {
    match (parse_loose_date(a), parse_loose_date(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

// ============================================================================
// DISPLAY
// ============================================================================

/// `$1,234.56`, or `None` for NaN/infinite amounts (shown as "Invalid")
pub fn format_currency(value: f64) -> Option<String> {
    if !value.is_finite() {
        return None;
    }

    let fixed = format!("{:.2}", value.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if value < 0.0 && fixed != "0.00" { "-" } else { "" };
    Some(format!("{}${}.{}", sign, grouped, frac_part))
}

pub fn display_amount(value: f64) -> String {
    format_currency(value).unwrap_or_else(|| "Invalid".to_string())
}
