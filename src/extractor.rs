// 🧾 Receipt Extractor - unstructured document text → Receipt
//
// Pattern based and deliberately modest: each field takes the first match of
// its pattern and falls back to "Unknown". Extraction never fails.

use crate::normalize::{Amount, UNKNOWN};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

// ============================================================================
// RECEIPT
// ============================================================================

/// Receipt - one record extracted from a document attachment.
///
/// Immutable once built: fields are private and only readable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    date: String,
    amount: Amount,
    vendor: String,
    raw_text: String,
}

impl Receipt {
    pub fn new(
        date: impl Into<String>,
        amount: impl Into<Amount>,
        vendor: impl Into<String>,
        raw_text: impl Into<String>,
    ) -> Self {
        Receipt {
            date: date.into(),
            amount: amount.into(),
            vendor: vendor.into(),
            raw_text: raw_text.into(),
        }
    }

    pub fn date(&self) -> &str {
        &self.date
    }

    pub fn amount(&self) -> &Amount {
        &self.amount
    }

    pub fn vendor(&self) -> &str {
        &self.vendor
    }

    /// Full source text, kept verbatim for audit and manual correction
    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }

    /// Number of fields that fell back to "Unknown"
    pub fn unknown_fields(&self) -> usize {
        [
            self.date == UNKNOWN,
            self.amount.is_unknown(),
            self.vendor == UNKNOWN,
        ]
        .iter()
        .filter(|missing| **missing)
        .count()
    }
}

// ============================================================================
// POLICY
// ============================================================================

/// Which currency-looking substring becomes the receipt amount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AmountPolicy {
    /// First `$d,ddd.dd` in document order. Picks the subtotal on itemized
    /// receipts; kept as the default for compatibility with stored ledgers.
    #[default]
    FirstOccurrence,

    /// First amount on a line mentioning "total", else first occurrence
    PreferTotal,
}

// ============================================================================
// EXTRACTOR
// ============================================================================

/// FieldExtractor - text → Receipt.
///
/// The reconciler only ever sees `Receipt`, so template-based or
/// vendor-specific extractors can replace [`PatternExtractor`] freely.
pub trait FieldExtractor: Send + Sync {
    fn extract_fields(&self, text: &str) -> Receipt;

    /// Version string recorded with stored receipts
    fn version(&self) -> &str {
        "1.0.0"
    }
}

fn amount_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$[0-9,]+\.[0-9]{2}").expect("invalid amount regex"))
}

fn vendor_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(?:Vendor|Store|From):?\s*(.+)").expect("invalid vendor regex"))
}

fn date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)Date:?\s*([0-9/\-]+)").expect("invalid date regex"))
}

/// Regex heuristics: amount, vendor and date extracted independently
#[derive(Debug, Clone, Default)]
pub struct PatternExtractor {
    pub amount_policy: AmountPolicy,
}

impl PatternExtractor {
    pub fn new() -> Self {
        PatternExtractor::default()
    }

    pub fn with_policy(amount_policy: AmountPolicy) -> Self {
        PatternExtractor { amount_policy }
    }

    fn extract_amount(&self, text: &str) -> Option<String> {
        match self.amount_policy {
            AmountPolicy::FirstOccurrence => first_amount(text),
            AmountPolicy::PreferTotal => text
                .lines()
                .filter(|line| line.to_lowercase().contains("total"))
                .find_map(first_amount)
                .or_else(|| first_amount(text)),
        }
    }

    fn extract_vendor(&self, text: &str) -> Option<String> {
        // `.` stops at a newline, so the capture is the rest of the line
        vendor_re()
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn extract_date(&self, text: &str) -> Option<String> {
        date_re()
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }
}

fn first_amount(text: &str) -> Option<String> {
    amount_re().find(text).map(|m| m.as_str().to_string())
}

impl FieldExtractor for PatternExtractor {
    fn extract_fields(&self, text: &str) -> Receipt {
        let amount = self
            .extract_amount(text)
            .map(Amount::Text)
            .unwrap_or_else(Amount::unknown);

        Receipt {
            date: self.extract_date(text).unwrap_or_else(|| UNKNOWN.to_string()),
            amount,
            vendor: self.extract_vendor(text).unwrap_or_else(|| UNKNOWN.to_string()),
            raw_text: text.to_string(),
        }
    }

    fn version(&self) -> &str {
        match self.amount_policy {
            AmountPolicy::FirstOccurrence => "pattern-1.0.0",
            AmountPolicy::PreferTotal => "pattern-total-1.0.0",
        }
    }
}

/// Extract with the default pattern extractor
pub fn extract_fields(text: &str) -> Receipt {
    PatternExtractor::new().extract_fields(text)
}
