use std::fmt;

#[derive(thiserror::Error, Debug)]
pub enum ApprovalError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: Entity, id: String },
    #[error("{0}")]
    Forbidden(String),
    #[error("document {document_id} already has a pending request ({request_id})")]
    AlreadyPending {
        document_id: String,
        request_id: String,
    },
    #[error(
        "replace_file_url is missing on permission request {request_id}; the document was reverted to active"
    )]
    MissingReplacement { request_id: String },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("failed to encode record: {0}")]
    Encoding(String),
    #[error("failed to decode record: {0}")]
    Decoding(#[from] minicbor::decode::Error),
    #[error("storage error: {0}")]
    Store(#[from] sled::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// The record family an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Document,
    Request,
    Notification,
    User,
}

/// Coarse classes a client can act on: re-navigate, stop, accept, fix input, or retry later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Forbidden,
    Conflict,
    BadRequest,
    System,
}

pub type Result<T> = std::result::Result<T, ApprovalError>;

impl ApprovalError {
    pub fn not_found(kind: Entity, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::AlreadyPending { .. } => ErrorKind::Conflict,
            Self::MissingReplacement { .. } | Self::InvalidInput(_) => ErrorKind::BadRequest,
            Self::Encoding(_)
            | Self::Decoding(_)
            | Self::Store(_)
            | Self::Io(_)
            | Self::Other(_) => ErrorKind::System,
        }
    }
}

impl<W> From<minicbor::encode::Error<W>> for ApprovalError
where
    W: fmt::Display,
{
    fn from(value: minicbor::encode::Error<W>) -> Self {
        Self::Encoding(value.to_string())
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Entity::Document => "Document",
            Entity::Request => "Request",
            Entity::Notification => "Notification",
            Entity::User => "User",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_classify_for_clients() {
        assert_eq!(
            ApprovalError::not_found(Entity::Document, "doc_1").kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            ApprovalError::Forbidden("Admin only".into()).kind(),
            ErrorKind::Forbidden
        );
        assert_eq!(
            ApprovalError::MissingReplacement {
                request_id: "req_1".into()
            }
            .kind(),
            ErrorKind::BadRequest
        );
        assert_eq!(
            ApprovalError::not_found(Entity::Request, "req_1").to_string(),
            "Request not found: req_1"
        );
    }
}
