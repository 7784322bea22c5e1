//! # folio-core — Domain model for the Folio collaboration workspace
//!
//! Carries the types every other crate agrees on:
//!
//! - [`record`] — document records, share entries, permission resolution
//! - [`content`] — the rich-text payload (block/span model, JSON interchange)
//! - [`error`] — the shared four-class error taxonomy
//!
//! The model is deliberately plain data: no I/O, no async, no store
//! coupling, so permission and partition logic stays testable without a
//! live session or backend.

pub mod content;
pub mod error;
pub mod record;

pub use content::{Block, RichText, Span, SpanStyle};
pub use error::CollabError;
pub use record::{
    DocumentRecord, Permission, RecordDraft, RecordPatch, ShareEntry, UserIdentity,
};
