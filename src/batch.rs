// 📥 Extraction Batch - unseen mail → decoded attachments → receipts
//
// Failure policy:
// - a part that is missing or unparsable, or a document that cannot be
//   decoded → recorded in `failures`, logged, batch continues
// - mailbox unreachable or I/O failure (listing or fetching bytes), storage
//   write fails → whole batch fails, nothing stored, nothing marked seen
// - once receipts are committed the batch succeeds; a message that cannot be
//   marked seen is recorded in `unmarked` and its receipts are skipped as
//   duplicates when it comes back

use crate::db::{insert_receipts, NewReceipt, ReceiptSource};
use crate::document::DocumentDecoder;
use crate::error::BatchError;
use crate::extractor::{FieldExtractor, Receipt};
use crate::mailbox::{AttachmentDescriptor, Disposition, MailMessage, Mailbox};
use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, info, warn};

/// A receipt with the attachment it came from
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedReceipt {
    pub source: ReceiptSource,
    pub receipt: Receipt,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttachmentFailure {
    pub message_id: String,
    pub filename: String,
    pub reason: String,
}

/// Message whose receipts were stored but which is still unseen
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkSeenFailure {
    pub message_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub messages_scanned: usize,
    pub attachments_skipped: usize,
    pub receipts: Vec<ExtractedReceipt>,
    pub failures: Vec<AttachmentFailure>,
    /// Receipts already in the ledger from an earlier run
    pub duplicates_skipped: usize,
    pub unmarked: Vec<MarkSeenFailure>,
}

impl BatchReport {
    pub fn summary(&self) -> String {
        format!(
            "{} messages scanned, {} receipts extracted ({} already stored), {} attachments failed, {} skipped, {} messages left unseen",
            self.messages_scanned,
            self.receipts.len(),
            self.duplicates_skipped,
            self.failures.len(),
            self.attachments_skipped,
            self.unmarked.len()
        )
    }

    fn record_failure(&mut self, message: &MailMessage, attachment: &AttachmentDescriptor, reason: String) {
        warn!(
            message = %message.id,
            filename = %attachment.filename,
            %reason,
            "attachment extraction failed"
        );
        self.failures.push(AttachmentFailure {
            message_id: message.id.clone(),
            filename: attachment.filename.clone(),
            reason,
        });
    }
}

pub struct ExtractionBatch<'a> {
    decoder: &'a dyn DocumentDecoder,
    extractor: &'a dyn FieldExtractor,
}

impl<'a> ExtractionBatch<'a> {
    pub fn new(decoder: &'a dyn DocumentDecoder, extractor: &'a dyn FieldExtractor) -> Self {
        ExtractionBatch { decoder, extractor }
    }

    /// Document attachments only: attachment disposition + decoder suffix
    pub fn qualifies(&self, attachment: &AttachmentDescriptor) -> bool {
        attachment.disposition == Disposition::Attachment && self.decoder.accepts(&attachment.filename)
    }

    /// Extract receipts from every unseen message without storing or marking anything
    pub fn extract<M: Mailbox>(&self, mailbox: &mut M) -> Result<(BatchReport, Vec<MailMessage>), BatchError> {
        let messages = mailbox.fetch_unseen()?;
        info!(count = messages.len(), "fetched unseen messages");

        let mut report = BatchReport {
            messages_scanned: messages.len(),
            ..Default::default()
        };

        for message in &messages {
            for attachment in &message.attachments {
                if !self.qualifies(attachment) {
                    debug!(message = %message.id, filename = %attachment.filename, "skipping attachment");
                    report.attachments_skipped += 1;
                    continue;
                }

                let bytes = match mailbox.attachment_bytes(message, attachment) {
                    Ok(bytes) => bytes,
                    Err(e) if e.is_transport() => return Err(e.into()),
                    Err(e) => {
                        report.record_failure(message, attachment, e.to_string());
                        continue;
                    }
                };

                match self.decoder.decode(&bytes) {
                    Ok(text) => report.receipts.push(ExtractedReceipt {
                        source: ReceiptSource {
                            message_id: message.id.clone(),
                            filename: attachment.filename.clone(),
                        },
                        receipt: self.extractor.extract_fields(&text),
                    }),
                    Err(e) => report.record_failure(message, attachment, e.to_string()),
                }
            }
        }

        Ok((report, messages))
    }

    /// Store the extracted receipts, then mark the messages seen
    pub fn store<M: Mailbox>(
        &self,
        mut report: BatchReport,
        messages: &[MailMessage],
        mailbox: &mut M,
        conn: &Connection,
    ) -> Result<BatchReport, BatchError> {
        let new_receipts: Vec<NewReceipt> = report
            .receipts
            .iter()
            .map(|r| NewReceipt {
                receipt: &r.receipt,
                source: Some(&r.source),
                extractor_version: self.extractor.version(),
            })
            .collect();
        let attempted = new_receipts.len();
        let inserted = insert_receipts(conn, &new_receipts)?.len();
        report.duplicates_skipped = attempted - inserted;

        for message in messages {
            if let Err(e) = mailbox.mark_seen(message) {
                warn!(message = %message.id, error = %e, "could not mark message seen");
                report.unmarked.push(MarkSeenFailure {
                    message_id: message.id.clone(),
                    reason: e.to_string(),
                });
            }
        }

        info!("{}", report.summary());
        Ok(report)
    }

    /// Extract, store every receipt, then mark the messages seen
    pub fn run<M: Mailbox>(&self, mailbox: &mut M, conn: &Connection) -> Result<BatchReport, BatchError> {
        let (report, messages) = self.extract(mailbox)?;
        self.store(report, &messages, mailbox, conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{get_all_receipts, setup_database};
    use crate::document::PlainTextDecoder;
    use crate::error::MailboxError;
    use crate::extractor::PatternExtractor;
    use crate::mailbox::tests::build_eml;
    use crate::mailbox::EmlDirectoryMailbox;
    use crate::normalize::Amount;
    use std::collections::HashMap;

    /// In-memory mailbox; attachment bodies keyed by (message, part)
    #[derive(Default)]
    struct FakeMailbox {
        messages: Vec<MailMessage>,
        bodies: HashMap<(String, usize), Vec<u8>>,
        seen: Vec<String>,
        unavailable: bool,
        /// Attachment fetches fail with an I/O error
        broken_pipe: bool,
        /// `mark_seen` fails for this message id
        sticky: Option<String>,
    }

    impl FakeMailbox {
        fn add(&mut self, id: &str, attachments: &[(&str, Disposition, &str)]) {
            let descriptors = attachments
                .iter()
                .enumerate()
                .map(|(i, (filename, disposition, body))| {
                    self.bodies.insert((id.to_string(), i), body.as_bytes().to_vec());
                    AttachmentDescriptor {
                        filename: filename.to_string(),
                        disposition: *disposition,
                        content_type: "application/octet-stream".to_string(),
                        part_index: i,
                    }
                })
                .collect();

            self.messages.push(MailMessage {
                id: id.to_string(),
                subject: None,
                attachments: descriptors,
            });
        }
    }

    impl Mailbox for FakeMailbox {
        fn fetch_unseen(&mut self) -> Result<Vec<MailMessage>, MailboxError> {
            if self.unavailable {
                return Err(MailboxError::Unavailable("connection refused".to_string()));
            }
            Ok(self
                .messages
                .iter()
                .filter(|m| !self.seen.contains(&m.id))
                .cloned()
                .collect())
        }

        fn attachment_bytes(
            &mut self,
            message: &MailMessage,
            attachment: &AttachmentDescriptor,
        ) -> Result<Vec<u8>, MailboxError> {
            if self.broken_pipe {
                return Err(MailboxError::Io(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "connection reset",
                )));
            }
            self.bodies
                .get(&(message.id.clone(), attachment.part_index))
                .cloned()
                .ok_or_else(|| MailboxError::MissingPart {
                    message_id: message.id.clone(),
                    part_index: attachment.part_index,
                })
        }

        fn mark_seen(&mut self, message: &MailMessage) -> Result<(), MailboxError> {
            if self.sticky.as_deref() == Some(message.id.as_str()) {
                return Err(MailboxError::Unavailable("flag update rejected".to_string()));
            }
            self.seen.push(message.id.clone());
            Ok(())
        }
    }

    #[test]
    fn test_bad_attachment_is_isolated() {
        let mut mailbox = FakeMailbox::default();
        mailbox.add(
            "m1",
            &[
                ("a.txt", Disposition::Attachment, "From: Acme\nTotal: $50.00"),
                ("broken.txt", Disposition::Attachment, ""),
                ("b.txt", Disposition::Attachment, "Store: Deli\n$8.25"),
            ],
        );

        let decoder = PlainTextDecoder;
        let extractor = PatternExtractor::new();
        let (report, _) = ExtractionBatch::new(&decoder, &extractor).extract(&mut mailbox).unwrap();

        assert_eq!(report.receipts.len(), 2);
        assert_eq!(report.receipts[0].receipt.vendor(), "Acme");
        assert_eq!(report.receipts[1].receipt.vendor(), "Deli");
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].filename, "broken.txt");
        assert_eq!(report.failures[0].reason, "document is empty");
    }

    #[test]
    fn test_non_document_and_inline_attachments_skipped() {
        let mut mailbox = FakeMailbox::default();
        mailbox.add(
            "m1",
            &[
                ("logo.png", Disposition::Attachment, "PNG"),
                ("inline.txt", Disposition::Inline, "From: Inline\n$1.00"),
                ("receipt.txt", Disposition::Attachment, "From: Real\n$2.00"),
            ],
        );

        let decoder = PlainTextDecoder;
        let extractor = PatternExtractor::new();
        let (report, _) = ExtractionBatch::new(&decoder, &extractor).extract(&mut mailbox).unwrap();

        assert_eq!(report.attachments_skipped, 2);
        assert_eq!(report.receipts.len(), 1);
        assert_eq!(report.receipts[0].receipt.vendor(), "Real");
        assert_eq!(report.receipts[0].source.filename, "receipt.txt");
    }

    #[test]
    fn test_order_follows_messages_then_attachments() {
        let mut mailbox = FakeMailbox::default();
        mailbox.add("m1", &[("1.txt", Disposition::Attachment, "From: One"), ("2.txt", Disposition::Attachment, "From: Two")]);
        mailbox.add("m2", &[("3.txt", Disposition::Attachment, "From: Three")]);

        let decoder = PlainTextDecoder;
        let extractor = PatternExtractor::new();
        let (report, messages) = ExtractionBatch::new(&decoder, &extractor).extract(&mut mailbox).unwrap();

        let vendors: Vec<&str> = report.receipts.iter().map(|r| r.receipt.vendor()).collect();
        assert_eq!(vendors, vec!["One", "Two", "Three"]);
        assert_eq!(messages.len(), 2);
        assert_eq!(report.messages_scanned, 2);
    }

    #[test]
    fn test_unavailable_mailbox_fails_batch() {
        let mut mailbox = FakeMailbox {
            unavailable: true,
            ..Default::default()
        };
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let decoder = PlainTextDecoder;
        let extractor = PatternExtractor::new();
        let err = ExtractionBatch::new(&decoder, &extractor)
            .run(&mut mailbox, &conn)
            .unwrap_err();

        assert!(matches!(err, BatchError::Mailbox(MailboxError::Unavailable(_))));
    }

    #[test]
    fn test_missing_part_is_isolated() {
        let mut mailbox = FakeMailbox::default();
        mailbox.add("m1", &[("a.txt", Disposition::Attachment, "From: Acme\n$5.00")]);
        mailbox.messages[0].attachments.push(AttachmentDescriptor {
            filename: "ghost.txt".to_string(),
            disposition: Disposition::Attachment,
            content_type: "text/plain".to_string(),
            part_index: 9,
        });

        let decoder = PlainTextDecoder;
        let extractor = PatternExtractor::new();
        let (report, _) = ExtractionBatch::new(&decoder, &extractor).extract(&mut mailbox).unwrap();

        assert_eq!(report.receipts.len(), 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].filename, "ghost.txt");
    }

    #[test]
    fn test_attachment_io_failure_fails_batch() {
        let mut mailbox = FakeMailbox {
            broken_pipe: true,
            ..Default::default()
        };
        mailbox.add("m1", &[("a.txt", Disposition::Attachment, "From: Acme\n$5.00")]);

        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let decoder = PlainTextDecoder;
        let extractor = PatternExtractor::new();
        let err = ExtractionBatch::new(&decoder, &extractor)
            .run(&mut mailbox, &conn)
            .unwrap_err();

        assert!(matches!(err, BatchError::Mailbox(MailboxError::Io(_))));
        assert!(get_all_receipts(&conn).unwrap().is_empty());
        assert!(mailbox.seen.is_empty());
    }

    #[test]
    fn test_mark_seen_failure_keeps_stored_receipts() {
        let mut mailbox = FakeMailbox {
            sticky: Some("m2".to_string()),
            ..Default::default()
        };
        mailbox.add("m1", &[("r.txt", Disposition::Attachment, "Vendor: Vendor m1\n$1.00")]);
        mailbox.add("m2", &[("r.txt", Disposition::Attachment, "Vendor: Vendor m2\n$2.00")]);

        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let decoder = PlainTextDecoder;
        let extractor = PatternExtractor::new();
        let batch = ExtractionBatch::new(&decoder, &extractor);

        let report = batch.run(&mut mailbox, &conn).unwrap();
        assert_eq!(report.receipts.len(), 2);
        assert_eq!(report.unmarked.len(), 1);
        assert_eq!(report.unmarked[0].message_id, "m2");
        assert_eq!(mailbox.seen, vec!["m1".to_string()]);
        assert_eq!(get_all_receipts(&conn).unwrap().len(), 2);

        // m2 comes back on the next run but is not stored twice
        mailbox.sticky = None;
        let report = batch.run(&mut mailbox, &conn).unwrap();
        assert_eq!(report.messages_scanned, 1);
        assert_eq!(report.duplicates_skipped, 1);
        assert!(report.unmarked.is_empty());

        let vendors: Vec<String> = get_all_receipts(&conn)
            .unwrap()
            .iter()
            .map(|s| s.receipt.vendor().to_string())
            .collect();
        assert_eq!(vendors, vec!["Vendor m1", "Vendor m2"]);
    }

    #[test]
    fn test_run_stores_and_marks_seen() {
        let mut mailbox = FakeMailbox::default();
        mailbox.add("m1", &[("r.txt", Disposition::Attachment, "From: Acme\nDate: 2024-01-05\n$50.00")]);

        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let decoder = PlainTextDecoder;
        let extractor = PatternExtractor::new();
        let batch = ExtractionBatch::new(&decoder, &extractor);
        let report = batch.run(&mut mailbox, &conn).unwrap();

        assert_eq!(report.receipts.len(), 1);
        assert_eq!(mailbox.seen, vec!["m1".to_string()]);

        let stored = get_all_receipts(&conn).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].receipt.amount(), &Amount::from("$50.00"));
        assert_eq!(stored[0].source.as_ref().map(|s| s.message_id.as_str()), Some("m1"));

        // Second run sees nothing new
        let report = batch.run(&mut mailbox, &conn).unwrap();
        assert_eq!(report.messages_scanned, 0);
        assert_eq!(get_all_receipts(&conn).unwrap().len(), 1);
    }

    #[test]
    fn test_eml_directory_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("001.eml"),
            build_eml(
                "Receipt",
                &[("receipt.txt", "attachment", "Vendor: Acme Hardware\nDate: 2024-01-05\nTotal: $50.00")],
            ),
        )
        .unwrap();

        let mut mailbox = EmlDirectoryMailbox::new(dir.path());
        let decoder = PlainTextDecoder;
        let extractor = PatternExtractor::new();
        let (report, _) = ExtractionBatch::new(&decoder, &extractor).extract(&mut mailbox).unwrap();

        assert_eq!(report.receipts.len(), 1);
        let receipt = &report.receipts[0].receipt;
        assert_eq!(receipt.vendor(), "Acme Hardware");
        assert_eq!(receipt.date(), "2024-01-05");
        assert_eq!(receipt.amount(), &Amount::from("$50.00"));
    }
}
