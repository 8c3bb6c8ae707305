//! Notifications recorded for requesters when their requests are resolved
use super::error::Result;
use super::request::{PermissionRequest, RequestStatus};
use super::types::TimeStamp;
use super::utils::{NOTIFICATION_HRP, new_uuid_to_bech32};
use chrono::Utc;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    #[n(0)]
    pub id: String, // bech32, hrp note_
    #[n(1)]
    pub user_id: String,
    #[n(2)]
    pub message: String,
    #[n(3)]
    pub read: bool,
    #[n(4)]
    pub created_at: TimeStamp<Utc>,
}

/// Append-only destination for user-facing messages.
///
/// Implementations must make the write part of whatever unit of work the
/// caller is in, so a committed resolution always has its notification.
/// Returns the id of the recorded notification.
pub trait NotificationSink {
    type Error;

    fn record(&self, user_id: &str, message: &str) -> std::result::Result<String, Self::Error>;
}

impl Notification {
    pub fn new(user_id: &str, message: &str) -> Result<Self> {
        Ok(Self {
            id: new_uuid_to_bech32(NOTIFICATION_HRP)?,
            user_id: user_id.to_string(),
            message: message.to_string(),
            read: false,
            created_at: TimeStamp::new(),
        })
    }
}

pub fn resolution_message(request: &PermissionRequest, title: &str, outcome: RequestStatus) -> String {
    format!(
        "Your request {} for document \"{}\" has been {}",
        request.request_type, title, outcome
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_type_title_and_outcome() {
        let req = PermissionRequest::delete("doc_x", "user_x").unwrap();
        assert_eq!(
            resolution_message(&req, "Budget", RequestStatus::Approved),
            "Your request DELETE for document \"Budget\" has been APPROVED"
        );
    }

    #[test]
    fn new_notifications_are_unread() {
        let n = Notification::new("user_x", "hello").unwrap();
        assert!(!n.read);
        assert!(n.id.starts_with("note_1"));
    }
}
