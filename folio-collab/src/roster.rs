//! Document roster: the user's live view of accessible documents.
//!
//! `watch` partitions every collection snapshot into documents the user
//! owns and documents shared with them — both halves replace atomically
//! because each view is computed from one snapshot. Create, delete and
//! share are the roster's mutations; delete and share are owner-only.

use std::sync::Arc;
use uuid::Uuid;

use folio_core::{
    CollabError, DocumentRecord, Permission, RecordDraft, RecordPatch, ShareEntry, UserIdentity,
};

use crate::store::{CollectionSubscription, RecordStore};

/// Policy for sharing with an email that already has an entry.
///
/// The observed-legacy behavior (silent duplicate appends) is not
/// offered; callers pick one of the two normalized outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SharePolicy {
    /// Fail with a validation error
    Reject,
    /// Replace the existing entry's permission in place (order preserved)
    Overwrite,
}

/// One atomically replaced partition of the collection.
///
/// Disjoint cover: a record the user can see appears in exactly one
/// half — ownership takes precedence over share membership.
#[derive(Debug, Clone, Default)]
pub struct RosterView {
    pub owned: Vec<DocumentRecord>,
    pub shared_with_me: Vec<DocumentRecord>,
}

impl RosterView {
    fn partition(snapshot: &[DocumentRecord], email: &str) -> Self {
        let mut view = RosterView::default();
        for record in snapshot {
            if record.is_owner(email) {
                view.owned.push(record.clone());
            } else if record.share_for(email).is_some() {
                view.shared_with_me.push(record.clone());
            }
        }
        view
    }

    pub fn is_empty(&self) -> bool {
        self.owned.is_empty() && self.shared_with_me.is_empty()
    }

    /// Total records visible to the user.
    pub fn len(&self) -> usize {
        self.owned.len() + self.shared_with_me.len()
    }
}

/// Live roster subscription for one user.
pub struct RosterSubscription {
    email: String,
    inner: CollectionSubscription,
}

impl RosterSubscription {
    /// Next view; the initial view is delivered immediately. `None` once
    /// the store is gone.
    pub async fn recv(&mut self) -> Option<RosterView> {
        let snapshot = self.inner.recv().await?;
        Some(RosterView::partition(&snapshot, &self.email))
    }
}

/// Roster operations over the shared record store.
#[derive(Clone)]
pub struct Roster {
    store: Arc<RecordStore>,
}

impl Roster {
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self { store }
    }

    /// Live partition of the collection for `user`.
    pub async fn watch(&self, user: &UserIdentity) -> RosterSubscription {
        RosterSubscription {
            email: user.email.clone(),
            inner: self.store.subscribe_collection().await,
        }
    }

    /// Create a new document owned by `user`, with empty content and
    /// nothing shared. A store failure surfaces as the error and leaves
    /// no partial record.
    pub async fn create(
        &self,
        user: &UserIdentity,
        title: &str,
    ) -> Result<Arc<DocumentRecord>, CollabError> {
        self.store
            .create(RecordDraft::new(title, user.email.clone()))
            .await
    }

    /// Delete a document. Owner-only: any non-owner gets `Unauthorized`
    /// before the store is touched.
    pub async fn delete(&self, user: &UserIdentity, id: Uuid) -> Result<(), CollabError> {
        let record = self.store.get(id).await?;
        if !record.is_owner(&user.email) {
            return Err(CollabError::Unauthorized(format!(
                "only the owner may delete document {id}"
            )));
        }
        self.store.delete(id).await
    }

    /// Share a document with `email` at `permission`. Owner-only.
    ///
    /// An existing entry for the email is governed by `policy`; there is
    /// no silent-duplicate path. Sharing with the owner (or an empty
    /// email) is a validation error.
    pub async fn share(
        &self,
        user: &UserIdentity,
        id: Uuid,
        email: &str,
        permission: Permission,
        policy: SharePolicy,
    ) -> Result<Arc<DocumentRecord>, CollabError> {
        let email = email.trim();
        if email.is_empty() {
            return Err(CollabError::Validation("share email must not be empty".into()));
        }

        let record = self.store.get(id).await?;
        if !record.is_owner(&user.email) {
            return Err(CollabError::Unauthorized(format!(
                "only the owner may share document {id}"
            )));
        }
        if record.is_owner(email) {
            return Err(CollabError::Validation(
                "the owner already has write access".into(),
            ));
        }

        match record.share_for(email) {
            None => {
                log::info!("document {id} shared with '{email}' ({permission:?})");
                self.store
                    .append_share(id, ShareEntry::new(email, permission))
                    .await
            }
            Some(existing) => match policy {
                SharePolicy::Reject => Err(CollabError::Validation(format!(
                    "'{email}' already has {:?} access",
                    existing.permission
                ))),
                SharePolicy::Overwrite => {
                    let shared_with: Vec<ShareEntry> = record
                        .shared_with
                        .iter()
                        .map(|e| {
                            if e.email == email {
                                ShareEntry::new(email, permission)
                            } else {
                                e.clone()
                            }
                        })
                        .collect();
                    log::info!("document {id} share for '{email}' overwritten ({permission:?})");
                    self.store
                        .update_fields(id, RecordPatch::shared_with(shared_with))
                        .await
                }
            },
        }
    }
}
