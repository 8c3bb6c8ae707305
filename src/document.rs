//! Document records, their lifecycle status and the draft builder
use super::error::{ApprovalError, Result};
use super::types::TimeStamp;
use super::utils::{DOCUMENT_HRP, new_uuid_to_bech32};
use chrono::Utc;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentStatus {
    #[n(0)]
    Active,
    #[n(1)]
    PendingDelete,
    #[n(2)]
    PendingReplace,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Document {
    #[n(0)]
    pub id: String, // bech32, hrp doc_
    #[n(1)]
    pub title: String,
    #[n(2)]
    pub description: Option<String>,
    #[n(3)]
    pub document_type: String,
    #[n(4)]
    pub file_url: String, // reference handed out by the file storage
    #[n(5)]
    pub version: u32,
    #[n(6)]
    pub status: DocumentStatus,
    #[n(7)]
    pub created_by: String,
    #[n(8)]
    pub created_at: TimeStamp<Utc>,
}

// Used for constructing new documents before upload is attached
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DocumentDraft {
    title: Option<String>,
    description: Option<String>,
    document_type: Option<String>,
}

/// Metadata an admin may overwrite while replacing a file directly.
/// Omitted fields keep the document's current values.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FieldOverrides {
    pub title: Option<String>,
    pub description: Option<String>,
    pub document_type: Option<String>,
}

impl Document {
    pub fn is_active(&self) -> bool {
        self.status == DocumentStatus::Active
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.created_by == user_id
    }

    /// Swap in a new file and bump the version. Leaves the document active.
    pub fn apply_replacement(&mut self, file_url: String) {
        self.file_url = file_url;
        self.version += 1;
        self.status = DocumentStatus::Active;
    }

    pub fn apply_overrides(&mut self, overrides: &FieldOverrides) {
        if let Some(title) = &overrides.title {
            self.title = title.clone();
        }
        if let Some(description) = &overrides.description {
            self.description = Some(description.clone());
        }
        if let Some(document_type) = &overrides.document_type {
            self.document_type = document_type.clone();
        }
    }
}

impl DocumentDraft {
    /// Construct a new builder object, this becomes the basis for a document
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }
    pub fn set_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }
    pub fn set_document_type(mut self, document_type: &str) -> Self {
        self.document_type = Some(document_type.to_string());
        self
    }
    // Checks fields and returns the finished record, owned by `created_by`, version 1
    pub fn validate_and_finalise(&self, created_by: &str, file_url: &str) -> Result<Document> {
        let title = non_blank(self.title.as_deref(), "title")?;
        let document_type = non_blank(self.document_type.as_deref(), "document type")?;
        if file_url.trim().is_empty() {
            return Err(ApprovalError::InvalidInput("file is required".into()));
        }

        Ok(Document {
            id: new_uuid_to_bech32(DOCUMENT_HRP)?,
            title,
            description: self
                .description
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string),
            document_type,
            file_url: file_url.to_string(),
            version: 1,
            status: DocumentStatus::Active,
            created_by: created_by.to_string(),
            created_at: TimeStamp::new(),
        })
    }
}

impl FieldOverrides {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }
    pub fn set_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }
    pub fn set_document_type(mut self, document_type: &str) -> Self {
        self.document_type = Some(document_type.to_string());
        self
    }
}

fn non_blank(value: Option<&str>, field: &str) -> Result<String> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(ApprovalError::InvalidInput(format!("{field} is required"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Document {
        DocumentDraft::new()
            .set_title("Quarterly report")
            .set_description("Q3 numbers")
            .set_document_type("report")
            .validate_and_finalise("user_owner", "/uploads/a.pdf")
            .unwrap()
    }

    #[test]
    fn draft_finalises_as_active_version_one() {
        let doc = sample();
        assert_eq!(doc.version, 1);
        assert_eq!(doc.status, DocumentStatus::Active);
        assert!(doc.is_owned_by("user_owner"));
        assert!(doc.id.starts_with("doc_1"));
    }

    #[test]
    fn draft_rejects_missing_fields() {
        let missing_title = DocumentDraft::new()
            .set_document_type("report")
            .validate_and_finalise("u", "/uploads/a.pdf");
        assert!(matches!(missing_title, Err(ApprovalError::InvalidInput(_))));

        let blank_type = DocumentDraft::new()
            .set_title("t")
            .set_document_type("   ")
            .validate_and_finalise("u", "/uploads/a.pdf");
        assert!(blank_type.is_err());

        let missing_file = DocumentDraft::new()
            .set_title("t")
            .set_document_type("report")
            .validate_and_finalise("u", "");
        assert!(missing_file.is_err());
    }

    #[test]
    fn overrides_fall_back_to_existing_values() {
        let mut doc = sample();
        doc.apply_overrides(&FieldOverrides::new().set_title("Renamed"));

        assert_eq!(doc.title, "Renamed");
        assert_eq!(doc.description.as_deref(), Some("Q3 numbers"));
        assert_eq!(doc.document_type, "report");
    }

    #[test]
    fn replacement_bumps_version_once() {
        let mut doc = sample();
        doc.status = DocumentStatus::PendingReplace;
        doc.apply_replacement("/uploads/b.pdf".into());

        assert_eq!(doc.version, 2);
        assert_eq!(doc.file_url, "/uploads/b.pdf");
        assert!(doc.is_active());
    }

    #[test]
    fn document_cbor_roundtrip() {
        let doc = sample();
        let encoded = minicbor::to_vec(&doc).unwrap();
        let decoded: Document = minicbor::decode(&encoded).unwrap();
        assert_eq!(doc, decoded);
    }
}
