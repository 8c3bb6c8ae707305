//! Approval-gated document lifecycle.
//!
//! Owners ask for their documents to be deleted or replaced; administrators
//! approve or reject those requests. Each transition commits the document,
//! the request and the requester's notification in one sled transaction.

pub mod config;
pub mod document;
pub mod error;
pub mod files;
pub mod notification;
pub mod policy;
pub mod request;
pub mod service;
pub mod store;
pub mod types;
pub mod utils;

pub use error::{ApprovalError, ErrorKind, Result};
pub use service::{ApprovalService, DeleteOutcome, PendingRequest, ReplaceOutcome, Resolution};
