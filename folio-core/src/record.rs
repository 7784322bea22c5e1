//! Document records, share entries and permission resolution.
//!
//! A `DocumentRecord` is the unit of collaboration. The owner implicitly
//! holds write permission; everyone else goes through the `shared_with`
//! list. Title and owner are fixed at creation — `RecordPatch` can only
//! touch `content` and `shared_with`, so a content-only update can never
//! clobber the share list and vice versa.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::content::RichText;

/// The acting user, resolved by the identity service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub email: String,
}

impl UserIdentity {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
        }
    }
}

/// Access level granted by a share entry.
///
/// The UI default when no level is picked is `Read`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    #[default]
    Read,
    Write,
}

impl Permission {
    pub fn can_write(self) -> bool {
        matches!(self, Permission::Write)
    }
}

/// One grant: an email and the permission it was given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareEntry {
    pub email: String,
    pub permission: Permission,
}

impl ShareEntry {
    pub fn new(email: impl Into<String>, permission: Permission) -> Self {
        Self {
            email: email.into(),
            permission,
        }
    }
}

/// A collaborative document record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Assigned by the store on creation
    pub id: Uuid,
    /// Display title — immutable after creation
    pub title: String,
    /// Creating user — set once, never reassigned
    pub owner_email: String,
    /// Rich-text payload, mutable by any principal with write permission
    pub content: RichText,
    /// Grants for non-owners, ordered, one entry per email
    pub shared_with: Vec<ShareEntry>,
    /// Creation timestamp (seconds since epoch), stamped by the store
    pub created_at: u64,
    /// Last modification timestamp (seconds since epoch)
    pub updated_at: u64,
}

impl DocumentRecord {
    pub fn is_owner(&self, email: &str) -> bool {
        self.owner_email == email
    }

    /// Resolve the effective permission for an email.
    ///
    /// The owner always resolves to `Write`, independent of the share
    /// list — a lookup against `shared_with` alone would deny the owner.
    /// An email with no entry and not the owner resolves to `None`
    /// (no access).
    pub fn permission_for(&self, email: &str) -> Option<Permission> {
        if self.is_owner(email) {
            return Some(Permission::Write);
        }
        self.shared_with
            .iter()
            .find(|e| e.email == email)
            .map(|e| e.permission)
    }

    /// The share entry for an email, if one exists.
    pub fn share_for(&self, email: &str) -> Option<&ShareEntry> {
        self.shared_with.iter().find(|e| e.email == email)
    }
}

/// Fields fixed by the caller at creation time.
///
/// The store stamps `id`, `created_at` and `updated_at` itself.
#[derive(Debug, Clone)]
pub struct RecordDraft {
    pub title: String,
    pub owner_email: String,
    pub content: RichText,
    pub shared_with: Vec<ShareEntry>,
}

impl RecordDraft {
    /// A fresh document: empty content, nothing shared.
    pub fn new(title: impl Into<String>, owner_email: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            owner_email: owner_email.into(),
            content: RichText::new(),
            shared_with: Vec::new(),
        }
    }
}

/// Field-level partial update.
///
/// Only `content` and `shared_with` are patchable; absent fields are left
/// untouched by the store's merge. Title and owner have no patch field by
/// construction.
#[derive(Debug, Clone, Default)]
pub struct RecordPatch {
    pub content: Option<RichText>,
    pub shared_with: Option<Vec<ShareEntry>>,
}

impl RecordPatch {
    /// Patch carrying only a content replacement.
    pub fn content(content: RichText) -> Self {
        Self {
            content: Some(content),
            ..Default::default()
        }
    }

    /// Patch carrying only a share-list replacement.
    pub fn shared_with(shared_with: Vec<ShareEntry>) -> Self {
        Self {
            shared_with: Some(shared_with),
            ..Default::default()
        }
    }

    /// True when the patch would change nothing.
    pub fn is_empty(&self) -> bool {
        self.content.is_none() && self.shared_with.is_none()
    }

    /// Apply the patch to a record in place.
    pub fn apply(self, record: &mut DocumentRecord) {
        if let Some(content) = self.content {
            record.content = content;
        }
        if let Some(shared_with) = self.shared_with {
            record.shared_with = shared_with;
        }
    }
}
