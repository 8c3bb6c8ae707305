//! Permission requests raised against documents
use super::error::Result;
use super::types::TimeStamp;
use super::utils::{REQUEST_HRP, new_uuid_to_bech32};
use chrono::Utc;
use std::fmt;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub enum PermissionType {
    #[n(0)]
    Delete,
    #[n(1)]
    Replace,
    // kinds written by newer releases; resolved without touching the document
    #[n(2)]
    Other(#[n(0)] String),
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Approved,
    #[n(2)]
    Rejected,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct PermissionRequest {
    #[n(0)]
    pub id: String, // bech32, hrp req_
    #[n(1)]
    pub request_type: PermissionType,
    #[n(2)]
    pub status: RequestStatus,
    #[n(3)]
    pub document_id: String,
    #[n(4)]
    pub requested_by: String,
    #[n(5)]
    pub replace_file_url: Option<String>, // staged file, only for Replace
    #[n(6)]
    pub created_at: TimeStamp<Utc>,
}

impl PermissionRequest {
    fn new(
        request_type: PermissionType,
        document_id: &str,
        requested_by: &str,
        replace_file_url: Option<String>,
    ) -> Result<Self> {
        Ok(Self {
            id: new_uuid_to_bech32(REQUEST_HRP)?,
            request_type,
            status: RequestStatus::Pending,
            document_id: document_id.to_string(),
            requested_by: requested_by.to_string(),
            replace_file_url,
            created_at: TimeStamp::new(),
        })
    }

    pub fn delete(document_id: &str, requested_by: &str) -> Result<Self> {
        Self::new(PermissionType::Delete, document_id, requested_by, None)
    }

    pub fn replace(document_id: &str, requested_by: &str, file_url: &str) -> Result<Self> {
        Self::new(
            PermissionType::Replace,
            document_id,
            requested_by,
            Some(file_url.to_string()),
        )
    }

    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }

    /// Terminal transition. The staged file is dropped either way.
    pub fn resolve(&mut self, status: RequestStatus) {
        self.status = status;
        self.replace_file_url = None;
    }
}

impl fmt::Display for PermissionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PermissionType::Delete => f.write_str("DELETE"),
            PermissionType::Replace => f.write_str("REPLACE"),
            PermissionType::Other(tag) => f.write_str(tag),
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestStatus::Pending => f.write_str("PENDING"),
            RequestStatus::Approved => f.write_str("APPROVED"),
            RequestStatus::Rejected => f.write_str("REJECTED"),
        }
    }
}
