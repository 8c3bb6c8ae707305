//! Authorization decisions, evaluated once per operation
use super::error::ApprovalError;
use super::types::Caller;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action<'a> {
    RequestDelete { owner: &'a str },
    RequestReplace { owner: &'a str },
    Resolve,
    ListPending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grant {
    /// Admin applies the change directly, no request is raised.
    AdminBypass,
    /// Owner may raise a request for an admin to resolve.
    Owner,
    /// Admin acting on the request queue.
    Resolver,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow(Grant),
    Deny(String),
}

pub fn authorize(caller: &Caller, action: Action<'_>) -> Decision {
    match action {
        Action::RequestDelete { .. } | Action::RequestReplace { .. } if caller.is_admin() => {
            Decision::Allow(Grant::AdminBypass)
        }
        Action::RequestDelete { owner } if owner == caller.id => Decision::Allow(Grant::Owner),
        Action::RequestDelete { .. } => Decision::Deny("Only owner can request delete".into()),
        Action::RequestReplace { owner } if owner == caller.id => Decision::Allow(Grant::Owner),
        Action::RequestReplace { .. } => Decision::Deny("Only owner can request replace".into()),
        Action::Resolve | Action::ListPending if caller.is_admin() => {
            Decision::Allow(Grant::Resolver)
        }
        Action::Resolve | Action::ListPending => Decision::Deny("Admin only".into()),
    }
}

impl Decision {
    pub fn into_grant(self) -> Result<Grant, ApprovalError> {
        match self {
            Decision::Allow(grant) => Ok(grant),
            Decision::Deny(reason) => Err(ApprovalError::Forbidden(reason)),
        }
    }
}
