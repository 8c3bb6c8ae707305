//! Service layer API for the document approval workflow
use super::config::StoreConfig;
use super::document::{Document, DocumentDraft, DocumentStatus, FieldOverrides};
use super::error::{ApprovalError, Entity, Result};
use super::files::FileStorage;
use super::notification::{Notification, NotificationSink, resolution_message};
use super::policy::{self, Action, Grant};
use super::request::{PermissionRequest, PermissionType, RequestStatus};
use super::store::{Store, TxResult, UnitOfWork, abort, tx};
use super::types::{Caller, Role, User};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const ALREADY_PROCESSED: &str = "Request already processed";
pub const DELETED_BY_ADMIN: &str = "Deleted by admin";
pub const DELETE_APPROVED: &str = "Delete approved & document deleted";
pub const REPLACE_APPROVED: &str = "Replace approved & document updated";
pub const APPROVED: &str = "Approved";
pub const REJECTED: &str = "Rejected";

/// Outcome of approve/reject. `ok: false` means the request was already
/// resolved and nothing changed, so resubmitting is safe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub ok: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Admin bypass, the document and its requests are gone.
    Deleted { message: String },
    Requested(PermissionRequest),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplaceOutcome {
    /// Admin bypass, the returned document already carries the new file.
    Replaced(Document),
    Requested(PermissionRequest),
}

/// A pending request as shown in the admin queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    pub request: PermissionRequest,
    pub document: Document,
    // None when the requester never registered with the user directory
    pub requested_by: Option<User>,
}

// what a resolving transaction committed
enum Committed {
    Applied(&'static str),
    AlreadyProcessed,
    RevertedMissingReplacement,
}

pub struct ApprovalService {
    store: Store,
}

impl Resolution {
    fn applied(message: &str) -> Self {
        Self {
            ok: true,
            message: message.to_string(),
        }
    }
    fn already_processed() -> Self {
        Self {
            ok: false,
            message: ALREADY_PROCESSED.to_string(),
        }
    }
}

impl ApprovalService {
    pub fn new(instance: Arc<sled::Db>) -> Result<Self> {
        Ok(Self {
            store: Store::new(instance)?,
        })
    }

    pub fn open(config: &StoreConfig) -> Result<Self> {
        Ok(Self {
            store: Store::open(config)?,
        })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Register a user so pending requests can show who raised them
    pub fn register_user(&self, email: &str, role: Role) -> Result<User> {
        let user = self.store.register_user(email, role)?;
        info!(user = %user.id, role = ?user.role, "registered user");
        Ok(user)
    }

    #[tracing::instrument(skip(self, caller, draft), fields(caller = %caller.id))]
    pub fn create_document(
        &self,
        caller: &Caller,
        draft: &DocumentDraft,
        file_url: &str,
    ) -> Result<Document> {
        let document = draft.validate_and_finalise(&caller.id, file_url)?;
        self.store.insert_document(&document)?;
        info!(document = %document.id, "created document");
        Ok(document)
    }

    /// Store the upload through `storage`, then create the document pointing at it
    pub fn create_document_from_upload<S: FileStorage>(
        &self,
        caller: &Caller,
        draft: &DocumentDraft,
        storage: &S,
        original_name: &str,
        bytes: &[u8],
    ) -> Result<Document> {
        let file_url = storage.put(original_name, bytes)?;
        self.create_document(caller, draft, &file_url)
    }

    pub fn get_user(&self, id: &str) -> Result<User> {
        self.store
            .user(id)?
            .ok_or_else(|| ApprovalError::not_found(Entity::User, id))
    }

    pub fn get_document(&self, id: &str) -> Result<Document> {
        self.store
            .document(id)?
            .ok_or_else(|| ApprovalError::not_found(Entity::Document, id))
    }

    pub fn get_request(&self, id: &str) -> Result<PermissionRequest> {
        self.store
            .request(id)?
            .ok_or_else(|| ApprovalError::not_found(Entity::Request, id))
    }

    /// Request history of a document, oldest first
    pub fn requests_for_document(&self, document_id: &str) -> Result<Vec<PermissionRequest>> {
        self.get_document(document_id)?;
        self.store.requests_for_document(document_id)
    }

    /// Ask for a document to be deleted. Admins delete straight away.
    #[tracing::instrument(skip(self, caller), fields(caller = %caller.id))]
    pub fn request_delete(&self, caller: &Caller, document_id: &str) -> Result<DeleteOutcome> {
        let document = self.get_document(document_id)?;
        let grant = policy::authorize(
            caller,
            Action::RequestDelete {
                owner: &document.created_by,
            },
        )
        .into_grant()?;

        if grant == Grant::AdminBypass {
            let removed = self.store.with_transaction(|uow| {
                load_document(uow, document_id)?;
                uow.delete_document(document_id)
            })?;
            info!(document = %document_id, removed_requests = removed, "document deleted by admin");
            return Ok(DeleteOutcome::Deleted {
                message: DELETED_BY_ADMIN.to_string(),
            });
        }

        let request = self.store.with_transaction(|uow| {
            let mut document = load_document(uow, document_id)?;
            ensure_no_pending(uow, document_id)?;

            let request = tx(PermissionRequest::delete(document_id, &caller.id))?;
            document.status = DocumentStatus::PendingDelete;
            uow.put_document(&document)?;
            uow.put_request(&request)?;
            Ok(request)
        })?;

        info!(document = %document_id, request = %request.id, "delete requested");
        Ok(DeleteOutcome::Requested(request))
    }

    /// Ask for a document's file to be replaced by `new_file_url`.
    /// Admins replace straight away, applying `overrides` over the current metadata.
    #[tracing::instrument(skip(self, caller, overrides), fields(caller = %caller.id))]
    pub fn request_replace(
        &self,
        caller: &Caller,
        document_id: &str,
        new_file_url: &str,
        overrides: &FieldOverrides,
    ) -> Result<ReplaceOutcome> {
        let document = self.get_document(document_id)?;
        let grant = policy::authorize(
            caller,
            Action::RequestReplace {
                owner: &document.created_by,
            },
        )
        .into_grant()?;
        if new_file_url.trim().is_empty() {
            return Err(ApprovalError::InvalidInput("File is required".into()));
        }

        if grant == Grant::AdminBypass {
            let document = self.store.with_transaction(|uow| {
                let mut document = load_document(uow, document_id)?;
                ensure_no_pending(uow, document_id)?;

                document.apply_replacement(new_file_url.to_string());
                document.apply_overrides(overrides);
                uow.put_document(&document)?;
                Ok(document)
            })?;
            info!(document = %document_id, version = document.version, "document replaced by admin");
            return Ok(ReplaceOutcome::Replaced(document));
        }

        let request = self.store.with_transaction(|uow| {
            let mut document = load_document(uow, document_id)?;
            ensure_no_pending(uow, document_id)?;

            let request = tx(PermissionRequest::replace(
                document_id,
                &caller.id,
                new_file_url,
            ))?;
            document.status = DocumentStatus::PendingReplace;
            uow.put_document(&document)?;
            uow.put_request(&request)?;
            Ok(request)
        })?;

        info!(document = %document_id, request = %request.id, "replace requested");
        Ok(ReplaceOutcome::Requested(request))
    }

    /// Store the upload through `storage`, then request the replacement with it
    pub fn request_replace_from_upload<S: FileStorage>(
        &self,
        caller: &Caller,
        document_id: &str,
        storage: &S,
        original_name: &str,
        bytes: &[u8],
        overrides: &FieldOverrides,
    ) -> Result<ReplaceOutcome> {
        // refuse before writing anything to storage
        let document = self.get_document(document_id)?;
        policy::authorize(
            caller,
            Action::RequestReplace {
                owner: &document.created_by,
            },
        )
        .into_grant()?;
        self.store.with_transaction(|uow| {
            load_document(uow, document_id)?;
            ensure_no_pending(uow, document_id)
        })?;
        let file_url = storage.put(original_name, bytes)?;
        self.request_replace(caller, document_id, &file_url, overrides)
    }

    /// Resolve a pending request in the requester's favour.
    #[tracing::instrument(skip(self, caller), fields(caller = %caller.id))]
    pub fn approve(&self, caller: &Caller, request_id: &str) -> Result<Resolution> {
        policy::authorize(caller, Action::Resolve).into_grant()?;

        let committed = self.store.with_transaction(|uow| {
            let Some(mut request) = uow.request(request_id)? else {
                return abort(ApprovalError::not_found(Entity::Request, request_id));
            };
            if !request.is_pending() {
                return Ok(Committed::AlreadyProcessed);
            }
            let mut document = load_document(uow, &request.document_id)?;
            let message = resolution_message(&request, &document.title, RequestStatus::Approved);

            match request.request_type {
                PermissionType::Delete => {
                    // recorded first, the title goes with the document
                    uow.record(&request.requested_by, &message)?;
                    request.resolve(RequestStatus::Approved);
                    uow.put_request(&request)?;
                    uow.delete_document(&document.id)?;
                    Ok(Committed::Applied(DELETE_APPROVED))
                }
                PermissionType::Replace => {
                    let Some(file_url) = request.replace_file_url.clone() else {
                        // do not leave the document stuck in PendingReplace
                        document.status = DocumentStatus::Active;
                        uow.put_document(&document)?;
                        return Ok(Committed::RevertedMissingReplacement);
                    };
                    document.apply_replacement(file_url);
                    uow.put_document(&document)?;
                    request.resolve(RequestStatus::Approved);
                    uow.put_request(&request)?;
                    uow.record(&request.requested_by, &message)?;
                    Ok(Committed::Applied(REPLACE_APPROVED))
                }
                PermissionType::Other(_) => {
                    request.resolve(RequestStatus::Approved);
                    uow.put_request(&request)?;
                    uow.record(&request.requested_by, &message)?;
                    Ok(Committed::Applied(APPROVED))
                }
            }
        })?;

        match committed {
            Committed::Applied(message) => {
                info!(request = %request_id, "request approved");
                Ok(Resolution::applied(message))
            }
            Committed::AlreadyProcessed => {
                debug!(request = %request_id, "approve skipped, request already processed");
                Ok(Resolution::already_processed())
            }
            Committed::RevertedMissingReplacement => {
                warn!(request = %request_id, "replace request had no staged file, document reverted to active");
                Err(ApprovalError::MissingReplacement {
                    request_id: request_id.to_string(),
                })
            }
        }
    }

    /// Resolve a pending request against the requester. The document goes back to active.
    #[tracing::instrument(skip(self, caller), fields(caller = %caller.id))]
    pub fn reject(&self, caller: &Caller, request_id: &str) -> Result<Resolution> {
        policy::authorize(caller, Action::Resolve).into_grant()?;

        let applied = self.store.with_transaction(|uow| {
            let Some(mut request) = uow.request(request_id)? else {
                return abort(ApprovalError::not_found(Entity::Request, request_id));
            };
            if !request.is_pending() {
                return Ok(false);
            }
            let mut document = load_document(uow, &request.document_id)?;
            let message = resolution_message(&request, &document.title, RequestStatus::Rejected);

            document.status = DocumentStatus::Active;
            uow.put_document(&document)?;
            request.resolve(RequestStatus::Rejected);
            uow.put_request(&request)?;
            uow.record(&request.requested_by, &message)?;
            Ok(true)
        })?;

        if !applied {
            debug!(request = %request_id, "reject skipped, request already processed");
            return Ok(Resolution::already_processed());
        }
        info!(request = %request_id, "request rejected");
        Ok(Resolution::applied(REJECTED))
    }

    /// The admin queue: every pending request, newest first.
    #[tracing::instrument(skip(self, caller), fields(caller = %caller.id))]
    pub fn list_pending(&self, caller: &Caller) -> Result<Vec<PendingRequest>> {
        policy::authorize(caller, Action::ListPending).into_grant()?;

        let mut pending: Vec<PermissionRequest> = self
            .store
            .all_requests()?
            .into_iter()
            .filter(PermissionRequest::is_pending)
            .collect();
        pending.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let mut out = Vec::with_capacity(pending.len());
        for request in pending {
            let Some(document) = self.store.document(&request.document_id)? else {
                warn!(request = %request.id, "pending request without document");
                continue;
            };
            let requested_by = self.store.user(&request.requested_by)?;
            out.push(PendingRequest {
                request,
                document,
                requested_by,
            });
        }
        Ok(out)
    }

    /// The caller's notifications, newest first
    pub fn notifications_for(&self, caller: &Caller) -> Result<Vec<Notification>> {
        self.store.notifications_for(&caller.id)
    }

    pub fn mark_read(&self, caller: &Caller, notification_id: &str) -> Result<Notification> {
        self.store.mark_notification_read(&caller.id, notification_id)
    }
}

fn load_document(uow: &UnitOfWork<'_>, id: &str) -> TxResult<Document> {
    match uow.document(id)? {
        Some(document) => Ok(document),
        None => abort(ApprovalError::not_found(Entity::Document, id)),
    }
}

// one outstanding request per document
fn ensure_no_pending(uow: &UnitOfWork<'_>, document_id: &str) -> TxResult<()> {
    match uow.pending_request_for(document_id)? {
        Some(existing) => abort(ApprovalError::AlreadyPending {
            document_id: document_id.to_string(),
            request_id: existing.id,
        }),
        None => Ok(()),
    }
}
