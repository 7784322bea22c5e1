//! # folio-collab — Collaboration layer for Folio documents
//!
//! Users authenticate, create documents, share them at read or write
//! permission, and edit them with debounced autosave. Persistence and
//! live sync are provided by the in-process record store.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   identity    ┌─────────────┐
//! │ AuthService │ ────────────► │   Roster    │
//! │  (Session)  │               │ (partition) │
//! └─────────────┘               └──────┬──────┘
//!                                      │ create / share / delete
//!                                      ▼
//! ┌─────────────┐  snapshots    ┌─────────────┐
//! │EditorSession│ ◄───────────► │ RecordStore │
//! │ (debounce)  │  write-backs  │ (authority) │
//! └──────┬──────┘               └──────┬──────┘
//!        │ export                      │ write-through
//!        ▼                             ▼
//! ┌─────────────┐               ┌─────────────┐
//! │  BlobStore  │               │  RocksDB    │
//! └─────────────┘               └─────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`auth`] — identity service and session gate
//! - [`store`] — record store with live snapshot subscriptions
//! - [`roster`] — per-user document partition and mutations
//! - [`editor`] — bound editor session with debounced autosave
//! - [`export`] — portable-format rendering and blob upload

pub mod auth;
pub mod editor;
pub mod export;
pub mod roster;
pub mod store;

// Re-exports for convenience
pub use auth::{AuthService, Session};
pub use editor::{EditorConfig, EditorEvent, EditorSession, EditorState, EventReceiver};
pub use export::{
    BlobStore, ExportDocument, ExportFormat, UploadHandle, UploadProgress,
    UploadProgressReceiver, UploadReceipt,
};
pub use folio_core::{
    CollabError, DocumentRecord, Permission, RecordDraft, RecordPatch, RichText, ShareEntry,
    UserIdentity,
};
pub use roster::{Roster, RosterSubscription, RosterView, SharePolicy};
pub use store::{
    CollectionSubscription, PersistedMeta, RecordDb, RecordStore, RecordSubscription,
    StoreConfig, StoreStats,
};
