// Receipt Ledger - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod bank_feed;
pub mod batch;
pub mod config;
pub mod db;
pub mod document;
pub mod error;
pub mod extractor;
pub mod mailbox;
pub mod normalize;
pub mod reconciliation;

// Re-export commonly used types
pub use bank_feed::{load_bank_csv, parse_bank_csv};
pub use batch::{AttachmentFailure, BatchReport, ExtractedReceipt, ExtractionBatch, MarkSeenFailure};
pub use config::{AppConfig, MailboxConfig};
pub use db::{
    get_all_receipts, get_events_for_entity, get_receipt, insert_receipts, setup_database,
    verify_count, verify_integrity, Event, NewReceipt, ReceiptSource, StoredReceipt,
};
pub use document::{DocumentDecoder, PdfTextDecoder, PlainTextDecoder};
pub use error::{BatchError, ConfigError, DecodeError, MailboxError};
pub use extractor::{extract_fields, AmountPolicy, FieldExtractor, PatternExtractor, Receipt};
pub use mailbox::{AttachmentDescriptor, Disposition, EmlDirectoryMailbox, MailMessage, Mailbox};
pub use normalize::{clean_amount, display_amount, format_currency, parse_loose_date, Amount};
pub use reconciliation::{
    compare, BankPool, BankTransaction, ComparedTransaction, MatchStatus, ReconciliationSummary,
    Source,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Install the fmt subscriber used by both binaries (`RUST_LOG`, default `info`)
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Stored receipts projected to the shape the reconciler consumes
pub fn ledger_receipts(stored: &[StoredReceipt]) -> Vec<Receipt> {
    stored.iter().map(|s| s.receipt.clone()).collect()
}
