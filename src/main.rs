// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{bail, Context, Result};
use rusqlite::Connection;
use std::env;
use std::path::Path;
use tracing::info;

use receipt_ledger::{
    compare, display_amount, extract_fields, get_all_receipts, ledger_receipts, load_bank_csv,
    setup_database, verify_count, verify_integrity, AppConfig, DocumentDecoder, EmlDirectoryMailbox,
    ExtractionBatch, MailboxConfig, PatternExtractor, PdfTextDecoder, PlainTextDecoder,
    ReconciliationSummary,
};

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    receipt_ledger::init_tracing();

    let args: Vec<String> = env::args().collect();
    let config = AppConfig::from_env();

    match args.get(1).map(String::as_str) {
        Some("fetch") => run_fetch(&config),
        Some("list") => run_list(&config),
        Some("extract") => run_extract(args.get(2)),
        Some("compare") => run_compare(&config, args.get(2)),
        Some("verify") => run_verify(&config),
        Some("ui") => run_ui_mode(&config, args.get(2)),
        None => run_ui_mode(&config, None),
        Some(other) => {
            eprintln!("Unknown command: {}", other);
            eprintln!("Usage: receipt-ledger [fetch | list | extract <file> | compare <bank.csv> | verify | ui [bank.csv]]");
            std::process::exit(2);
        }
    }
}

fn open_database(config: &AppConfig) -> Result<Connection> {
    let conn = Connection::open(&config.db_path)
        .with_context(|| format!("Failed to open database {}", config.db_path.display()))?;
    setup_database(&conn)?;
    Ok(conn)
}

fn run_fetch(config: &AppConfig) -> Result<()> {
    println!("📬 Fetch & Insert Receipts");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let mailbox_config = MailboxConfig::from_env()
        .context("Mailbox is not configured (IMAP_EMAIL / IMAP_PASSWORD)")?;
    let mut mailbox = EmlDirectoryMailbox::connect(&mailbox_config)?;
    let conn = open_database(config)?;

    let decoder = PdfTextDecoder;
    let extractor = PatternExtractor::new();
    let report = ExtractionBatch::new(&decoder, &extractor).run(&mut mailbox, &conn)?;

    println!("\n✓ {}", report.summary());
    for extracted in &report.receipts {
        println!(
            "  {} | {} | {} ({})",
            extracted.receipt.date(),
            extracted.receipt.vendor(),
            extracted.receipt.amount(),
            extracted.source.filename
        );
    }
    for failure in &report.failures {
        println!("  ⚠️  {} / {}: {}", failure.message_id, failure.filename, failure.reason);
    }
    for unmarked in &report.unmarked {
        println!("  ⚠️  {} stored but still unseen: {}", unmarked.message_id, unmarked.reason);
    }

    println!("\n✓ Ledger now holds {} receipts", verify_count(&conn)?);
    Ok(())
}

fn run_list(config: &AppConfig) -> Result<()> {
    let conn = open_database(config)?;
    let receipts = get_all_receipts(&conn)?;

    if receipts.is_empty() {
        println!("No receipts found.");
        return Ok(());
    }

    println!("{:<36}  {:<30}  {:>14}  {:<12}", "Id", "Vendor", "Amount", "Date");
    for stored in &receipts {
        println!(
            "{:<36}  {:<30}  {:>14}  {:<12}",
            stored.id,
            stored.receipt.vendor(),
            display_amount(stored.receipt.amount().value()),
            stored.receipt.date()
        );
    }

    Ok(())
}

fn run_extract(path: Option<&String>) -> Result<()> {
    let Some(path) = path else {
        bail!("Usage: receipt-ledger extract <file.pdf|file.txt>");
    };

    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path))?;
    let text = if PdfTextDecoder.accepts(path) {
        PdfTextDecoder.decode(&bytes)?
    } else {
        PlainTextDecoder.decode(&bytes)?
    };

    let receipt = extract_fields(&text);
    println!("{}", serde_json::to_string_pretty(&receipt)?);
    Ok(())
}

fn run_compare(config: &AppConfig, csv_path: Option<&String>) -> Result<()> {
    let Some(csv_path) = csv_path else {
        bail!("Usage: receipt-ledger compare <bank.csv>");
    };

    let conn = open_database(config)?;
    let ledger = ledger_receipts(&get_all_receipts(&conn)?);
    let bank = load_bank_csv(Path::new(csv_path))?;
    info!(receipts = ledger.len(), bank = bank.len(), "comparing");

    let compared = compare(&ledger, &bank);
    let summary = ReconciliationSummary::from_results(&compared);

    println!("🔍 Transaction Comparison");
    println!("{:<7}  {:<32}  {:<12}  {:>14}  {}", "Source", "Vendor", "Date", "Amount", "Status");
    for tx in &compared {
        println!(
            "{:<7}  {:<32}  {:<12}  {:>14}  {}",
            tx.source.as_str(),
            tx.vendor,
            tx.date,
            display_amount(tx.amount),
            tx.status.label()
        );
    }

    println!("\n{}", summary.summary());
    Ok(())
}

fn run_verify(config: &AppConfig) -> Result<()> {
    let conn = open_database(config)?;
    let count = verify_count(&conn)?;
    let tampered = verify_integrity(&conn)?;

    if tampered.is_empty() {
        println!("✅ {} receipts verified, raw text unchanged", count);
        return Ok(());
    }

    for id in &tampered {
        println!("❌ raw text changed after extraction: {}", id);
    }
    bail!("{} of {} receipts failed verification", tampered.len(), count)
}

#[cfg(feature = "tui")]
fn run_ui_mode(config: &AppConfig, csv_path: Option<&String>) -> Result<()> {
    let conn = open_database(config)?;
    let receipts = get_all_receipts(&conn)?;

    let compared = match csv_path {
        Some(path) => compare(&ledger_receipts(&receipts), &load_bank_csv(Path::new(path))?),
        None => Vec::new(),
    };

    let mut app = ui::App::new(receipts, compared);
    ui::run_ui(&mut app)?;

    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_config: &AppConfig, _csv_path: Option<&String>) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use the web API: cargo run --bin ledger-server --features server");
    std::process::exit(1);
}
