// ⚖️ Reconciliation Engine - match ledger receipts against a bank feed
//
// Greedy, first-eligible-wins:
//   for each receipt (input order) → first unclaimed bank record (input order)
//   with the same amount to the cent, the same calendar day, and a description
//   containing the receipt vendor.
// Unclaimed bank records are appended afterwards as bank_only.
//
// Pure: same inputs, same output sequence.

use crate::extractor::Receipt;
use crate::normalize::{amount_key, clean_amount, parse_loose_date};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ============================================================================
// RECORD SHAPES
// ============================================================================

/// One line of a bank statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankTransaction {
    pub date: String,
    pub description: String,
    pub amount: f64,
}

impl BankTransaction {
    pub fn new(date: impl Into<String>, description: impl Into<String>, amount: f64) -> Self {
        BankTransaction {
            date: date.into(),
            description: description.into(),
            amount,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Ledger,
    Bank,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Ledger => "ledger",
            Source::Bank => "bank",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Match,
    LedgerOnly,
    BankOnly,
}

impl MatchStatus {
    /// Display label ("LEDGER ONLY")
    pub fn label(&self) -> &'static str {
        match self {
            MatchStatus::Match => "MATCH",
            MatchStatus::LedgerOnly => "LEDGER ONLY",
            MatchStatus::BankOnly => "BANK ONLY",
        }
    }
}

/// Reconciliation output - one per receipt, plus one per unclaimed bank record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparedTransaction {
    pub source: Source,
    /// Receipt vendor, or the bank description for bank_only rows
    pub vendor: String,
    pub date: String,
    pub amount: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: MatchStatus,
}

impl ComparedTransaction {
    fn from_receipt(receipt: &Receipt, amount: f64, status: MatchStatus) -> Self {
        ComparedTransaction {
            source: Source::Ledger,
            vendor: receipt.vendor().to_string(),
            date: receipt.date().to_string(),
            amount,
            description: None,
            status,
        }
    }

    fn from_bank(tx: &BankTransaction) -> Self {
        ComparedTransaction {
            source: Source::Bank,
            vendor: tx.description.clone(),
            date: tx.date.clone(),
            amount: tx.amount,
            description: Some(String::new()),
            status: MatchStatus::BankOnly,
        }
    }
}

// ============================================================================
// BANK POOL
// ============================================================================

/// Match key precomputed once per side
struct Candidate {
    amount: Option<String>,
    day: Option<NaiveDate>,
    description: String,
}

impl Candidate {
    fn new(amount: f64, date: &str, text: &str) -> Self {
        Candidate {
            amount: amount_key(amount),
            day: parse_loose_date(date),
            description: text.to_lowercase(),
        }
    }

    /// NaN amounts and unparsable dates never compare equal
    fn accepts(&self, ledger: &Candidate) -> bool {
        self.amount.is_some()
            && self.amount == ledger.amount
            && self.day.is_some()
            && self.day == ledger.day
            && self.description.contains(&ledger.description)
    }
}

struct Slot<'a> {
    record: &'a BankTransaction,
    key: Candidate,
    consumed: bool,
}

/// Bank records available for matching.
///
/// A slot can only be consumed through [`BankPool::claim_first`], which flips
/// it exactly once; claimed records are never offered again.
pub struct BankPool<'a> {
    slots: Vec<Slot<'a>>,
}

impl<'a> BankPool<'a> {
    pub fn new(bank: &'a [BankTransaction]) -> Self {
        let slots = bank
            .iter()
            .map(|record| Slot {
                record,
                key: Candidate::new(record.amount, &record.date, &record.description),
                consumed: false,
            })
            .collect();

        BankPool { slots }
    }

    /// Claim the lowest-index unconsumed record eligible for this receipt
    pub fn claim_first(&mut self, receipt: &Receipt) -> Option<usize> {
        let ledger = Candidate::new(clean_amount(receipt.amount()), receipt.date(), receipt.vendor());

        let index = self
            .slots
            .iter()
            .position(|slot| !slot.consumed && slot.key.accepts(&ledger))?;

        self.slots[index].consumed = true;
        Some(index)
    }

    pub fn remaining(&self) -> usize {
        self.slots.iter().filter(|slot| !slot.consumed).count()
    }

    /// Unclaimed records in input order
    pub fn into_unclaimed(self) -> impl Iterator<Item = &'a BankTransaction> {
        self.slots
            .into_iter()
            .filter(|slot| !slot.consumed)
            .map(|slot| slot.record)
    }
}

// ============================================================================
// COMPARE
// ============================================================================

/// Classify every receipt and bank record as match / ledger_only / bank_only
pub fn compare(ledger: &[Receipt], bank: &[BankTransaction]) -> Vec<ComparedTransaction> {
    let mut pool = BankPool::new(bank);
    let mut results = Vec::with_capacity(ledger.len() + bank.len());

    for receipt in ledger {
        let amount = clean_amount(receipt.amount());
        let status = match pool.claim_first(receipt) {
            Some(_) => MatchStatus::Match,
            None => MatchStatus::LedgerOnly,
        };
        results.push(ComparedTransaction::from_receipt(receipt, amount, status));
    }

    results.extend(pool.into_unclaimed().map(ComparedTransaction::from_bank));
    results
}

// ============================================================================
// SUMMARY
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationSummary {
    pub matched: usize,
    pub ledger_only: usize,
    pub bank_only: usize,
    pub total: usize,
}

impl ReconciliationSummary {
    pub fn from_results(results: &[ComparedTransaction]) -> Self {
        let mut summary = ReconciliationSummary {
            total: results.len(),
            ..Default::default()
        };

        for result in results {
            match result.status {
                MatchStatus::Match => summary.matched += 1,
                MatchStatus::LedgerOnly => summary.ledger_only += 1,
                MatchStatus::BankOnly => summary.bank_only += 1,
            }
        }

        summary
    }

    /// Output length == ledger + bank - matches
    pub fn is_complete(&self, ledger_len: usize, bank_len: usize) -> bool {
        self.matched + self.ledger_only == ledger_len
            && self.total + self.matched == ledger_len + bank_len
    }

    pub fn summary(&self) -> String {
        format!(
            "{} rows: {} matched, {} ledger only, {} bank only",
            self.total, self.matched, self.ledger_only, self.bank_only
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================
