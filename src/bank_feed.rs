// 🏦 Bank Feed - statement CSV → BankTransaction
//
// Exports differ per bank, so each canonical field has a list of column
// aliases. The first alias with a non-empty value wins.

use crate::normalize::clean_amount_str;
use crate::reconciliation::BankTransaction;
use anyhow::{Context, Result};
use csv::{ReaderBuilder, StringRecord};
use std::fs::File;
use std::io::Read;
use std::path::Path;

pub const DATE_ALIASES: &[&str] = &["Date", "Transaction Date"];
pub const DESCRIPTION_ALIASES: &[&str] = &["Description", "Details"];
pub const AMOUNT_ALIASES: &[&str] = &["Amount", "Value"];

/// Header positions for each alias list
struct ColumnMap {
    date: Vec<usize>,
    description: Vec<usize>,
    amount: Vec<usize>,
}

impl ColumnMap {
    fn from_headers(headers: &StringRecord) -> Self {
        let positions = |aliases: &[&str]| -> Vec<usize> {
            aliases
                .iter()
                .filter_map(|alias| headers.iter().position(|h| h.trim() == *alias))
                .collect()
        };

        ColumnMap {
            date: positions(DATE_ALIASES),
            description: positions(DESCRIPTION_ALIASES),
            amount: positions(AMOUNT_ALIASES),
        }
    }

    fn first_value<'r>(record: &'r StringRecord, columns: &[usize]) -> Option<&'r str> {
        columns
            .iter()
            .filter_map(|&i| record.get(i))
            .find(|value| !value.is_empty())
    }

    fn to_transaction(&self, record: &StringRecord) -> BankTransaction {
        let date = Self::first_value(record, &self.date).unwrap_or("");
        let description = Self::first_value(record, &self.description).unwrap_or("");
        let amount = Self::first_value(record, &self.amount)
            .map(clean_amount_str)
            .unwrap_or(0.0);

        BankTransaction::new(date, description, amount)
    }
}

/// Parse a bank statement CSV from any reader
pub fn parse_bank_csv<R: Read>(reader: R) -> Result<Vec<BankTransaction>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader.headers().context("Failed to read CSV headers")?.clone();
    let columns = ColumnMap::from_headers(&headers);

    let mut transactions = Vec::new();

    for (line_num, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("Failed to parse CSV line {}", line_num + 2))?;

        if record.iter().all(|field| field.is_empty()) {
            continue;
        }

        transactions.push(columns.to_transaction(&record));
    }

    tracing::debug!(count = transactions.len(), "parsed bank feed");
    Ok(transactions)
}

pub fn load_bank_csv(csv_path: &Path) -> Result<Vec<BankTransaction>> {
    let file = File::open(csv_path)
        .with_context(|| format!("Failed to open bank CSV: {}", csv_path.display()))?;

    parse_bank_csv(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_canonical_headers() {
        let csv = "Date,Description,Amount\n2024-01-05,ACME HARDWARE STORE,50.00\n";
        let txs = parse_bank_csv(csv.as_bytes()).unwrap();

        assert_eq!(txs, vec![BankTransaction::new("2024-01-05", "ACME HARDWARE STORE", 50.0)]);
    }

    #[test]
    fn test_alias_headers() {
        let csv = "Transaction Date,Details,Value\n01/05/2024,Corner Deli,-8.25\n";
        let txs = parse_bank_csv(csv.as_bytes()).unwrap();

        assert_eq!(txs[0].date, "01/05/2024");
        assert_eq!(txs[0].description, "Corner Deli");
        assert_eq!(txs[0].amount, -8.25);
    }

    #[test]
    fn test_first_non_empty_alias_wins() {
        let csv = "Date,Transaction Date,Description,Details,Amount,Value\n\
                   ,2024-02-01,,Fallback details,,\"$1,234.56\"\n\
                   2024-02-02,2024-02-03,Primary,Ignored,10,20\n";
        let txs = parse_bank_csv(csv.as_bytes()).unwrap();

        assert_eq!(txs[0].date, "2024-02-01");
        assert_eq!(txs[0].description, "Fallback details");
        assert_eq!(txs[0].amount, 1234.56);

        assert_eq!(txs[1].date, "2024-02-02");
        assert_eq!(txs[1].description, "Primary");
        assert_eq!(txs[1].amount, 10.0);
    }

    #[test]
    fn test_missing_columns_default() {
        let csv = "Memo,Reference\nhello,123\n";
        let txs = parse_bank_csv(csv.as_bytes()).unwrap();

        assert_eq!(txs, vec![BankTransaction::new("", "", 0.0)]);
    }

    #[test]
    fn test_blank_rows_skipped() {
        let csv = "Date,Description,Amount\n2024-01-05,Acme,1.00\n,,\n2024-01-06,Deli,2.00\n";
        let txs = parse_bank_csv(csv.as_bytes()).unwrap();

        assert_eq!(txs.len(), 2);
        assert_eq!(txs[1].description, "Deli");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Date,Description,Amount").unwrap();
        writeln!(file, "2024-01-05,Acme,50.00").unwrap();

        let txs = load_bank_csv(file.path()).unwrap();
        assert_eq!(txs.len(), 1);

        assert!(load_bank_csv(Path::new("/definitely/not/here.csv")).is_err());
    }
}
