// 📬 Mailbox collaborator - unread messages and their attachments
//
// The extraction batch only needs three things from a mailbox: the unseen
// messages with their attachment descriptors, raw bytes for a chosen part,
// and a way to mark a message as processed.

use crate::config::MailboxConfig;
use crate::error::MailboxError;
use mailparse::{parse_mail, DispositionType, MailHeaderMap, ParsedMail};
use std::fs;
use std::path::{Path, PathBuf};

const EML_SUFFIX: &str = "eml";
const SEEN_SUFFIX: &str = "eml.seen";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Attachment,
    Inline,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentDescriptor {
    pub filename: String,
    pub disposition: Disposition,
    pub content_type: String,
    /// Depth-first index of the MIME part within its message
    pub part_index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    /// Opaque id, stable for the lifetime of the message in the mailbox
    pub id: String,
    pub subject: Option<String>,
    pub attachments: Vec<AttachmentDescriptor>,
}

pub trait Mailbox {
    fn fetch_unseen(&mut self) -> Result<Vec<MailMessage>, MailboxError>;

    fn attachment_bytes(
        &mut self,
        message: &MailMessage,
        attachment: &AttachmentDescriptor,
    ) -> Result<Vec<u8>, MailboxError>;

    fn mark_seen(&mut self, message: &MailMessage) -> Result<(), MailboxError>;
}

// ============================================================================
// EML DIRECTORY MAILBOX
// ============================================================================

/// Mailbox backed by a directory of `.eml` files.
///
/// Unseen = `*.eml`; marking seen renames the file to `*.eml.seen`.
pub struct EmlDirectoryMailbox {
    dir: PathBuf,
}

impl EmlDirectoryMailbox {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        EmlDirectoryMailbox { dir: dir.into() }
    }

    /// Validate the config and open its maildir
    pub fn connect(config: &MailboxConfig) -> Result<Self, MailboxError> {
        config
            .validate()
            .map_err(|e| MailboxError::Unavailable(e.to_string()))?;

        if !config.maildir.is_dir() {
            return Err(MailboxError::Unavailable(format!(
                "maildir not found: {}",
                config.maildir.display()
            )));
        }

        Ok(EmlDirectoryMailbox::new(&config.maildir))
    }

    fn message_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", id, EML_SUFFIX))
    }

    fn read_message(&self, id: &str) -> Result<Vec<u8>, MailboxError> {
        Ok(fs::read(self.message_path(id))?)
    }
}

impl Mailbox for EmlDirectoryMailbox {
    fn fetch_unseen(&mut self) -> Result<Vec<MailMessage>, MailboxError> {
        let mut paths: Vec<PathBuf> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| is_unseen_eml(path))
            .collect();
        paths.sort();

        let mut messages = Vec::with_capacity(paths.len());

        for path in paths {
            let id = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();

            let bytes = fs::read(&path)?;
            let mail = parse_mail(&bytes).map_err(|e| MailboxError::Parse {
                message_id: id.clone(),
                reason: e.to_string(),
            })?;

            messages.push(MailMessage {
                subject: mail.headers.get_first_value("Subject"),
                attachments: describe_attachments(&mail),
                id,
            });
        }

        Ok(messages)
    }

    fn attachment_bytes(
        &mut self,
        message: &MailMessage,
        attachment: &AttachmentDescriptor,
    ) -> Result<Vec<u8>, MailboxError> {
        let bytes = self.read_message(&message.id)?;
        let mail = parse_mail(&bytes).map_err(|e| MailboxError::Parse {
            message_id: message.id.clone(),
            reason: e.to_string(),
        })?;

        let part = flatten_parts(&mail)
            .into_iter()
            .nth(attachment.part_index)
            .ok_or_else(|| MailboxError::MissingPart {
                message_id: message.id.clone(),
                part_index: attachment.part_index,
            })?;

        part.get_body_raw().map_err(|e| MailboxError::Parse {
            message_id: message.id.clone(),
            reason: e.to_string(),
        })
    }

    fn mark_seen(&mut self, message: &MailMessage) -> Result<(), MailboxError> {
        let from = self.message_path(&message.id);
        let to = self.dir.join(format!("{}.{}", message.id, SEEN_SUFFIX));
        fs::rename(from, to)?;
        Ok(())
    }
}

fn is_unseen_eml(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext == EML_SUFFIX)
            .unwrap_or(false)
}

/// All MIME parts, depth-first, root included
fn flatten_parts<'a>(mail: &'a ParsedMail<'a>) -> Vec<&'a ParsedMail<'a>> {
    fn walk<'a>(part: &'a ParsedMail<'a>, out: &mut Vec<&'a ParsedMail<'a>>) {
        out.push(part);
        for sub in &part.subparts {
            walk(sub, out);
        }
    }

    let mut parts = Vec::new();
    walk(mail, &mut parts);
    parts
}

/// Parts with a filename (from Content-Disposition or the Content-Type name)
fn describe_attachments(mail: &ParsedMail) -> Vec<AttachmentDescriptor> {
    flatten_parts(mail)
        .into_iter()
        .enumerate()
        .filter_map(|(part_index, part)| {
            let disposition = part.get_content_disposition();
            let filename = disposition
                .params
                .get("filename")
                .or_else(|| part.ctype.params.get("name"))?
                .clone();

            let disposition = match disposition.disposition {
                DispositionType::Attachment => Disposition::Attachment,
                _ => Disposition::Inline,
            };

            Some(AttachmentDescriptor {
                filename,
                disposition,
                content_type: part.ctype.mimetype.to_ascii_lowercase(),
                part_index,
            })
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Multipart message with one attachment per `(filename, disposition, body)`
    pub(crate) fn build_eml(subject: &str, parts: &[(&str, &str, &str)]) -> String {
        let mut eml = format!(
            "From: receipts@example.com\r\n\
             Subject: {}\r\n\
             MIME-Version: 1.0\r\n\
             Content-Type: multipart/mixed; boundary=\"XBOUNDARY\"\r\n\
             \r\n\
             --XBOUNDARY\r\n\
             Content-Type: text/plain\r\n\
             \r\n\
             See attached.\r\n",
            subject
        );

        for (filename, disposition, body) in parts {
            eml.push_str(&format!(
                "--XBOUNDARY\r\n\
                 Content-Type: application/octet-stream; name=\"{0}\"\r\n\
                 Content-Disposition: {1}; filename=\"{0}\"\r\n\
                 \r\n\
                 {2}\r\n",
                filename, disposition, body
            ));
        }

        eml.push_str("--XBOUNDARY--\r\n");
        eml
    }

    #[test]
    fn test_fetch_unseen_lists_attachments() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("001.eml"),
            build_eml("Your receipt", &[("receipt.pdf", "attachment", "PDFDATA"), ("logo.png", "inline", "PNG")]),
        )
        .unwrap();
        fs::write(dir.path().join("notes.txt"), "not a message").unwrap();

        let mut mailbox = EmlDirectoryMailbox::new(dir.path());
        let messages = mailbox.fetch_unseen().unwrap();

        assert_eq!(messages.len(), 1);
        let message = &messages[0];
        assert_eq!(message.id, "001");
        assert_eq!(message.subject.as_deref(), Some("Your receipt"));
        assert_eq!(message.attachments.len(), 2);
        assert_eq!(message.attachments[0].filename, "receipt.pdf");
        assert_eq!(message.attachments[0].disposition, Disposition::Attachment);
        assert_eq!(message.attachments[1].disposition, Disposition::Inline);

        let bytes = mailbox.attachment_bytes(message, &message.attachments[0]).unwrap();
        assert_eq!(String::from_utf8_lossy(&bytes).trim_end(), "PDFDATA");
    }

    #[test]
    fn test_mark_seen_hides_message() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.eml"), build_eml("A", &[])).unwrap();
        fs::write(dir.path().join("b.eml"), build_eml("B", &[])).unwrap();

        let mut mailbox = EmlDirectoryMailbox::new(dir.path());
        let messages = mailbox.fetch_unseen().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].id, "a");

        mailbox.mark_seen(&messages[0]).unwrap();

        let remaining = mailbox.fetch_unseen().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, "b");
        assert!(dir.path().join("a.eml.seen").exists());
    }

    #[test]
    fn test_missing_part_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.eml"), build_eml("A", &[])).unwrap();

        let mut mailbox = EmlDirectoryMailbox::new(dir.path());
        let messages = mailbox.fetch_unseen().unwrap();
        let bogus = AttachmentDescriptor {
            filename: "ghost.pdf".to_string(),
            disposition: Disposition::Attachment,
            content_type: "application/pdf".to_string(),
            part_index: 42,
        };

        let err = mailbox.attachment_bytes(&messages[0], &bogus).unwrap_err();
        assert!(matches!(err, MailboxError::MissingPart { part_index: 42, .. }));
    }

    #[test]
    fn test_connect_validates_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = MailboxConfig::new("me@example.com", "secret").with_maildir(dir.path());
        assert!(EmlDirectoryMailbox::connect(&config).is_ok());

        let missing = MailboxConfig::new("me@example.com", "secret").with_maildir(dir.path().join("nope"));
        assert!(matches!(
            EmlDirectoryMailbox::connect(&missing),
            Err(MailboxError::Unavailable(_))
        ));

        let no_password = MailboxConfig::new("me@example.com", "").with_maildir(dir.path());
        assert!(EmlDirectoryMailbox::connect(&no_password).is_err());
    }
}
