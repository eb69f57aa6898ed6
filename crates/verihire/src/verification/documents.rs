//! Candidate document references.
//!
//! Every document travels as a single data URI (`data:<mime>;base64,<payload>`) so the
//! language model receives the bytes inline. Inputs are checked here, before any remote
//! call is made.

use base64::Engine;
use mime::Mime;
use serde::{Deserialize, Serialize};

/// Slot a document occupies in a verification request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Resume,
    ExperienceLetter,
    IdProof,
}

impl DocumentKind {
    pub const fn label(self) -> &'static str {
        match self {
            DocumentKind::Resume => "resume",
            DocumentKind::ExperienceLetter => "experience letter",
            DocumentKind::IdProof => "ID proof",
        }
    }
}

/// A validated data URI. Keeps the original string so it can be forwarded untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentPayload {
    kind: DocumentKind,
    mime: Mime,
    data_uri: String,
    decoded_len: usize,
}

impl DocumentPayload {
    pub fn parse(kind: DocumentKind, data_uri: &str) -> Result<Self, DocumentError> {
        let trimmed = data_uri.trim();
        if trimmed.is_empty() {
            return Err(DocumentError::Missing(kind));
        }

        let rest = trimmed
            .strip_prefix("data:")
            .ok_or(DocumentError::NotADataUri(kind))?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or(DocumentError::NotADataUri(kind))?;
        let media_type = header
            .strip_suffix(";base64")
            .ok_or(DocumentError::NotBase64(kind))?;

        let mime: Mime = media_type
            .parse()
            .map_err(|_| DocumentError::InvalidMediaType {
                kind,
                media_type: media_type.to_string(),
            })?;
        if !is_supported(&mime) {
            return Err(DocumentError::UnsupportedMediaType {
                kind,
                media_type: mime.essence_str().to_string(),
            });
        }

        if payload.is_empty() {
            return Err(DocumentError::EmptyPayload(kind));
        }
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(payload)
            .map_err(|_| DocumentError::NotBase64(kind))?;
        if decoded.is_empty() {
            return Err(DocumentError::EmptyPayload(kind));
        }

        Ok(Self {
            kind,
            mime,
            data_uri: trimmed.to_string(),
            decoded_len: decoded.len(),
        })
    }

    /// Build a data URI from raw bytes, e.g. a file read from disk.
    pub fn from_bytes(kind: DocumentKind, mime: &Mime, bytes: &[u8]) -> Result<Self, DocumentError> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        Self::parse(kind, &format!("data:{};base64,{encoded}", mime.essence_str()))
    }

    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    pub fn mime(&self) -> &Mime {
        &self.mime
    }

    pub fn data_uri(&self) -> &str {
        &self.data_uri
    }

    pub fn decoded_len(&self) -> usize {
        self.decoded_len
    }

    pub fn is_image(&self) -> bool {
        self.mime.type_() == mime::IMAGE
    }
}

fn is_supported(mime: &Mime) -> bool {
    matches!(
        mime.essence_str(),
        "application/pdf" | "image/png" | "image/jpeg" | "image/webp" | "text/plain"
    )
}

/// Raw upload as it arrives from the client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSubmission {
    pub resume: String,
    pub experience_letter: String,
    #[serde(default)]
    pub id_proof: Option<String>,
}

/// Validated document set handed to the extraction stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateDocuments {
    pub resume: DocumentPayload,
    pub experience_letter: DocumentPayload,
    pub id_proof: Option<DocumentPayload>,
}

impl CandidateDocuments {
    /// Resume and letter are required. A blank ID proof counts as not provided.
    pub fn from_submission(submission: &DocumentSubmission) -> Result<Self, DocumentError> {
        let resume = DocumentPayload::parse(DocumentKind::Resume, &submission.resume)?;
        let experience_letter =
            DocumentPayload::parse(DocumentKind::ExperienceLetter, &submission.experience_letter)?;
        let id_proof = match submission.id_proof.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => Some(DocumentPayload::parse(DocumentKind::IdProof, raw)?),
            _ => None,
        };

        Ok(Self {
            resume,
            experience_letter,
            id_proof,
        })
    }
}

/// Malformed or missing stage input, detected before any remote call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DocumentError {
    #[error("{} document is required", .0.label())]
    Missing(DocumentKind),
    #[error("{} document must be a data URI", .0.label())]
    NotADataUri(DocumentKind),
    #[error("{} document must carry a base64 payload", .0.label())]
    NotBase64(DocumentKind),
    #[error("{} document payload is empty", .0.label())]
    EmptyPayload(DocumentKind),
    #[error("{} document has an invalid media type '{media_type}'", .kind.label())]
    InvalidMediaType { kind: DocumentKind, media_type: String },
    #[error("{} document type '{media_type}' is not supported", .kind.label())]
    UnsupportedMediaType { kind: DocumentKind, media_type: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    const PDF_URI: &str = "data:application/pdf;base64,JVBERi0xLjQK";

    #[test]
    fn parses_pdf_data_uri() {
        let payload = DocumentPayload::parse(DocumentKind::Resume, PDF_URI).expect("valid uri");
        assert_eq!(payload.mime().essence_str(), "application/pdf");
        assert_eq!(payload.decoded_len(), 9);
        assert!(!payload.is_image());
    }

    #[test]
    fn rejects_plain_urls_and_bad_payloads() {
        assert_eq!(
            DocumentPayload::parse(DocumentKind::Resume, "https://example.com/cv.pdf"),
            Err(DocumentError::NotADataUri(DocumentKind::Resume))
        );
        assert_eq!(
            DocumentPayload::parse(DocumentKind::Resume, "data:application/pdf,JVBERi0xLjQK"),
            Err(DocumentError::NotBase64(DocumentKind::Resume))
        );
        assert_eq!(
            DocumentPayload::parse(DocumentKind::Resume, "data:application/pdf;base64,***"),
            Err(DocumentError::NotBase64(DocumentKind::Resume))
        );
        assert!(matches!(
            DocumentPayload::parse(DocumentKind::Resume, "data:application/zip;base64,UEsDBA=="),
            Err(DocumentError::UnsupportedMediaType { .. })
        ));
    }

    #[test]
    fn blank_id_proof_is_treated_as_absent() {
        let submission = DocumentSubmission {
            resume: PDF_URI.to_string(),
            experience_letter: PDF_URI.to_string(),
            id_proof: Some("   ".to_string()),
        };
        let documents = CandidateDocuments::from_submission(&submission).expect("valid set");
        assert!(documents.id_proof.is_none());
    }

    #[test]
    fn missing_letter_is_a_validation_error() {
        let submission = DocumentSubmission {
            resume: PDF_URI.to_string(),
            experience_letter: String::new(),
            id_proof: None,
        };
        assert_eq!(
            CandidateDocuments::from_submission(&submission),
            Err(DocumentError::Missing(DocumentKind::ExperienceLetter))
        );
    }
}
