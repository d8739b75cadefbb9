// 📄 Document decoding - attachment bytes → plain text
//
// The extractor treats decoder output as opaque text.

use crate::error::DecodeError;

pub trait DocumentDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<String, DecodeError>;

    /// Filename suffix this decoder handles (lower-case, with the dot)
    fn suffix(&self) -> &str;

    /// Whether an attachment with this filename should be decoded
    fn accepts(&self, filename: &str) -> bool {
        filename.to_ascii_lowercase().ends_with(self.suffix())
    }
}

/// PDF text layer via `pdf-extract`
#[derive(Debug, Clone, Default)]
pub struct PdfTextDecoder;

impl DocumentDecoder for PdfTextDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<String, DecodeError> {
        if bytes.is_empty() {
            return Err(DecodeError::Empty);
        }

        // pdf-extract can panic on malformed streams; keep that inside this attachment
        let bytes = bytes.to_vec();
        let result = std::panic::catch_unwind(move || pdf_extract::extract_text_from_mem(&bytes));

        match result {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => Err(DecodeError::Pdf(e.to_string())),
            Err(_) => Err(DecodeError::Pdf("decoder panicked on malformed document".to_string())),
        }
    }

    fn suffix(&self) -> &str {
        ".pdf"
    }
}

/// Plain-text attachments (`.txt`), decoded as lossy UTF-8
#[derive(Debug, Clone, Default)]
pub struct PlainTextDecoder;

impl DocumentDecoder for PlainTextDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<String, DecodeError> {
        if bytes.is_empty() {
            return Err(DecodeError::Empty);
        }
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    fn suffix(&self) -> &str {
        ".txt"
    }
}
