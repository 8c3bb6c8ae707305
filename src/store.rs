//! sled-backed persistence and the transactional unit of work
use super::config::StoreConfig;
use super::document::Document;
use super::error::{ApprovalError, Entity, Result};
use super::notification::{Notification, NotificationSink};
use super::request::PermissionRequest;
use super::types::{Role, User};
use super::utils::{USER_HRP, new_uuid_to_bech32};
use sled::Transactional;
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
    TransactionalTree,
};
use std::sync::Arc;

const DOCUMENTS: &str = "documents";
const REQUESTS: &str = "requests";
const DOCUMENT_REQUESTS: &str = "document_requests";
const NOTIFICATIONS: &str = "notifications";
const USERS: &str = "users";
const USERS_BY_EMAIL: &str = "users_by_email";

pub type TxResult<T> = ConflictableTransactionResult<T, ApprovalError>;

pub struct Store {
    instance: Arc<sled::Db>,
    documents: sled::Tree,
    requests: sled::Tree,
    // document id -> cbor list of request ids, used for cascade and the pending guard
    document_requests: sled::Tree,
    notifications: sled::Tree,
    users: sled::Tree,
    users_by_email: sled::Tree,
}

/// Transactional view over the workflow trees.
///
/// Every write made through one `UnitOfWork` commits together or not at all.
/// sled may run the enclosing closure more than once on conflict, so callers
/// must not cause side effects outside of it.
pub struct UnitOfWork<'a> {
    documents: &'a TransactionalTree,
    requests: &'a TransactionalTree,
    document_requests: &'a TransactionalTree,
    notifications: &'a TransactionalTree,
}

impl Store {
    pub fn new(instance: Arc<sled::Db>) -> Result<Self> {
        Ok(Self {
            documents: instance.open_tree(DOCUMENTS)?,
            requests: instance.open_tree(REQUESTS)?,
            document_requests: instance.open_tree(DOCUMENT_REQUESTS)?,
            notifications: instance.open_tree(NOTIFICATIONS)?,
            users: instance.open_tree(USERS)?,
            users_by_email: instance.open_tree(USERS_BY_EMAIL)?,
            instance,
        })
    }

    pub fn open(config: &StoreConfig) -> Result<Self> {
        let db = config.to_sled().open()?;
        Self::new(Arc::new(db))
    }

    /// Run `f` as one all-or-nothing transaction over documents, requests and notifications.
    pub fn with_transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: Fn(&UnitOfWork<'_>) -> TxResult<T>,
    {
        (
            &self.documents,
            &self.requests,
            &self.document_requests,
            &self.notifications,
        )
            .transaction(|(documents, requests, document_requests, notifications)| {
                let uow = UnitOfWork {
                    documents,
                    requests,
                    document_requests,
                    notifications,
                };
                f(&uow)
            })
            .map_err(unwrap_abort)
    }

    /// Force pending writes to disk instead of waiting for `flush_every_ms`
    pub fn flush(&self) -> Result<()> {
        self.instance.flush()?;
        Ok(())
    }

    pub fn insert_document(&self, document: &Document) -> Result<()> {
        self.documents
            .insert(document.id.as_bytes(), minicbor::to_vec(document)?)?;
        Ok(())
    }

    pub fn document(&self, id: &str) -> Result<Option<Document>> {
        get_decoded(&self.documents, id)
    }

    pub fn request(&self, id: &str) -> Result<Option<PermissionRequest>> {
        get_decoded(&self.requests, id)
    }

    /// Every request ever raised against the document, oldest first.
    pub fn requests_for_document(&self, document_id: &str) -> Result<Vec<PermissionRequest>> {
        let ids: Vec<String> = get_decoded(&self.document_requests, document_id)?.unwrap_or_default();

        let mut requests = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(request) = self.request(&id)? {
                requests.push(request);
            }
        }
        requests.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(requests)
    }

    pub fn all_requests(&self) -> Result<Vec<PermissionRequest>> {
        scan_decoded(&self.requests)
    }

    pub fn notification(&self, id: &str) -> Result<Option<Notification>> {
        get_decoded(&self.notifications, id)
    }

    pub fn notifications_for(&self, user_id: &str) -> Result<Vec<Notification>> {
        let mut notes: Vec<Notification> = scan_decoded(&self.notifications)?
            .into_iter()
            .filter(|n: &Notification| n.user_id == user_id)
            .collect();
        notes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(notes)
    }

    /// Flip the read flag on a notification owned by `user_id`.
    pub fn mark_notification_read(&self, user_id: &str, id: &str) -> Result<Notification> {
        self.notifications
            .transaction(|notifications| {
                let bytes = notifications.get(id.as_bytes())?;
                let mut note: Notification = match bytes {
                    Some(b) => tx(minicbor::decode(&b))?,
                    None => return abort(ApprovalError::not_found(Entity::Notification, id)),
                };
                // other users' notifications are reported as missing
                if note.user_id != user_id {
                    return abort(ApprovalError::not_found(Entity::Notification, id));
                }
                if !note.read {
                    note.read = true;
                    notifications.insert(id.as_bytes(), tx(minicbor::to_vec(&note))?)?;
                }
                Ok(note)
            })
            .map_err(unwrap_abort)
    }

    pub fn register_user(&self, email: &str, role: Role) -> Result<User> {
        let email = email.trim().to_ascii_lowercase();
        if email.is_empty() {
            return Err(ApprovalError::InvalidInput("email is required".into()));
        }
        let user = User {
            id: new_uuid_to_bech32(USER_HRP)?,
            email,
            role,
        };
        let encoded = minicbor::to_vec(&user)?;

        (&self.users, &self.users_by_email)
            .transaction(|(users, by_email)| {
                if by_email.get(user.email.as_bytes())?.is_some() {
                    return abort(ApprovalError::InvalidInput(format!(
                        "email {} is already registered",
                        user.email
                    )));
                }
                by_email.insert(user.email.as_bytes(), user.id.as_bytes())?;
                users.insert(user.id.as_bytes(), encoded.clone())?;
                Ok(())
            })
            .map_err(unwrap_abort)?;

        Ok(user)
    }

    pub fn user(&self, id: &str) -> Result<Option<User>> {
        get_decoded(&self.users, id)
    }
}

impl UnitOfWork<'_> {
    pub fn document(&self, id: &str) -> TxResult<Option<Document>> {
        tx_get_decoded(self.documents, id)
    }

    pub fn put_document(&self, document: &Document) -> TxResult<()> {
        self.documents
            .insert(document.id.as_bytes(), tx(minicbor::to_vec(document))?)?;
        Ok(())
    }

    /// Remove the document and every request referencing it.
    /// Returns how many requests went with it.
    pub fn delete_document(&self, id: &str) -> TxResult<usize> {
        let request_ids = self.request_ids(id)?;
        for request_id in &request_ids {
            self.requests.remove(request_id.as_bytes())?;
        }
        self.document_requests.remove(id.as_bytes())?;
        self.documents.remove(id.as_bytes())?;
        Ok(request_ids.len())
    }

    pub fn request(&self, id: &str) -> TxResult<Option<PermissionRequest>> {
        tx_get_decoded(self.requests, id)
    }

    /// Insert or update a request, keeping the document's request index in step.
    pub fn put_request(&self, request: &PermissionRequest) -> TxResult<()> {
        let mut ids = self.request_ids(&request.document_id)?;
        if !ids.contains(&request.id) {
            ids.push(request.id.clone());
            self.document_requests
                .insert(request.document_id.as_bytes(), tx(minicbor::to_vec(&ids))?)?;
        }
        self.requests
            .insert(request.id.as_bytes(), tx(minicbor::to_vec(request))?)?;
        Ok(())
    }

    /// The outstanding request against a document, if there is one.
    pub fn pending_request_for(&self, document_id: &str) -> TxResult<Option<PermissionRequest>> {
        for id in self.request_ids(document_id)? {
            if let Some(request) = self.request(&id)? {
                if request.is_pending() {
                    return Ok(Some(request));
                }
            }
        }
        Ok(None)
    }

    fn request_ids(&self, document_id: &str) -> TxResult<Vec<String>> {
        Ok(tx_get_decoded(self.document_requests, document_id)?.unwrap_or_default())
    }
}

impl NotificationSink for UnitOfWork<'_> {
    type Error = ConflictableTransactionError<ApprovalError>;

    fn record(&self, user_id: &str, message: &str) -> TxResult<String> {
        let note = tx(Notification::new(user_id, message))?;
        self.notifications
            .insert(note.id.as_bytes(), tx(minicbor::to_vec(&note))?)?;
        Ok(note.id)
    }
}

fn unwrap_abort(err: TransactionError<ApprovalError>) -> ApprovalError {
    match err {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => ApprovalError::Store(e),
    }
}

/// Abort the surrounding transaction with `err`.
pub fn abort<T>(err: ApprovalError) -> TxResult<T> {
    Err(ConflictableTransactionError::Abort(err))
}

// lift a fallible non-sled step into the transaction, aborting on failure
pub(crate) fn tx<T, E: Into<ApprovalError>>(result: std::result::Result<T, E>) -> TxResult<T> {
    result.map_err(|e| ConflictableTransactionError::Abort(e.into()))
}

fn tx_get_decoded<T>(tree: &TransactionalTree, id: &str) -> TxResult<Option<T>>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    match tree.get(id.as_bytes())? {
        Some(bytes) => Ok(Some(tx(minicbor::decode(&bytes))?)),
        None => Ok(None),
    }
}

fn get_decoded<T>(tree: &sled::Tree, id: &str) -> Result<Option<T>>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    match tree.get(id.as_bytes())? {
        Some(bytes) => Ok(Some(minicbor::decode(&bytes)?)),
        None => Ok(None),
    }
}

fn scan_decoded<T>(tree: &sled::Tree) -> Result<Vec<T>>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    let mut out = Vec::new();
    for entry in tree.iter() {
        let (_, bytes) = entry?;
        out.push(minicbor::decode(&bytes)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentDraft;

    fn temp_store() -> Store {
        Store::open(&StoreConfig::temporary()).unwrap()
    }

    fn draft_document(owner: &str) -> Document {
        DocumentDraft::new()
            .set_title("Handbook")
            .set_document_type("policy")
            .validate_and_finalise(owner, "/uploads/handbook.pdf")
            .unwrap()
    }

    #[test]
    fn delete_cascades_to_requests() {
        let store = temp_store();
        let doc = draft_document("user_a");
        store.insert_document(&doc).unwrap();

        let first = PermissionRequest::delete(&doc.id, "user_a").unwrap();
        let second = PermissionRequest::replace(&doc.id, "user_a", "/uploads/v2.pdf").unwrap();
        store
            .with_transaction(|uow| {
                uow.put_request(&first)?;
                uow.put_request(&second)
            })
            .unwrap();
        assert_eq!(store.requests_for_document(&doc.id).unwrap().len(), 2);

        let removed = store
            .with_transaction(|uow| uow.delete_document(&doc.id))
            .unwrap();

        assert_eq!(removed, 2);
        assert!(store.document(&doc.id).unwrap().is_none());
        assert!(store.request(&first.id).unwrap().is_none());
        assert!(store.request(&second.id).unwrap().is_none());
        assert!(store.requests_for_document(&doc.id).unwrap().is_empty());
    }

    #[test]
    fn aborted_transactions_leave_no_writes() {
        let store = temp_store();
        let doc = draft_document("user_a");

        let result: Result<()> = store.with_transaction(|uow| {
            uow.put_document(&doc)?;
            uow.record("user_a", "should not survive")?;
            abort(ApprovalError::InvalidInput("boom".into()))
        });

        assert!(matches!(result, Err(ApprovalError::InvalidInput(_))));
        assert!(store.document(&doc.id).unwrap().is_none());
        assert!(store.notifications_for("user_a").unwrap().is_empty());
    }

    #[test]
    fn pending_lookup_ignores_resolved_requests() {
        let store = temp_store();
        let doc = draft_document("user_a");
        store.insert_document(&doc).unwrap();

        let mut resolved = PermissionRequest::delete(&doc.id, "user_a").unwrap();
        resolved.resolve(crate::request::RequestStatus::Rejected);
        store
            .with_transaction(|uow| uow.put_request(&resolved))
            .unwrap();

        let pending = store
            .with_transaction(|uow| uow.pending_request_for(&doc.id))
            .unwrap();
        assert!(pending.is_none());
    }

    #[test]
    fn duplicate_emails_are_refused() {
        let store = temp_store();
        let user = store.register_user("Admin@Mail.com", Role::Admin).unwrap();
        assert_eq!(user.email, "admin@mail.com");
        assert_eq!(store.user(&user.id).unwrap(), Some(user));

        let again = store.register_user("admin@mail.com", Role::User);
        assert!(matches!(again, Err(ApprovalError::InvalidInput(_))));
    }

    #[test]
    fn flushed_writes_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::at(dir.path().join("flush.db"));
        let doc = draft_document("user_a");

        let store = Store::open(&config).unwrap();
        store.insert_document(&doc).unwrap();
        store.flush().unwrap();
        drop(store);

        let reopened = Store::open(&config).unwrap();
        assert_eq!(reopened.document(&doc.id).unwrap(), Some(doc));
    }

    #[test]
    fn notifications_are_read_only_by_their_owner() {
        let store = temp_store();
        let id = store
            .with_transaction(|uow| uow.record("user_a", "hello"))
            .unwrap();

        let other = store.mark_notification_read("user_b", &id);
        assert!(matches!(other, Err(ApprovalError::NotFound { .. })));

        let note = store.mark_notification_read("user_a", &id).unwrap();
        assert!(note.read);
        assert!(store.notification(&id).unwrap().unwrap().read);
    }
}
