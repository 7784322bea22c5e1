//! Editor session: one open document, mirrored live, saved on a
//! debounce timer.
//!
//! State machine per session: `Loading → Bound → (Editing ⇄ Saving) →
//! Closed`. The acting user's permission is computed once at bind time
//! (the owner implicitly resolves to write); a read-only viewer's edits
//! are rejected at the input layer and never reach the store.
//!
//! A background task owns the record subscription, the debounce timer
//! and the write-back path. Write-backs are awaited inline in that task,
//! so per-document saves are serialized and snapshots/write-backs are
//! observed in store order. Closing the session terminates the task's
//! select loop, which drops the pending timer — explicit cancellation, a
//! scheduled save cannot fire after close.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use futures_util::Stream;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use uuid::Uuid;

use folio_core::{CollabError, Permission, RecordPatch, RichText, UserIdentity};

use crate::export::{BlobStore, ExportDocument, ExportFormat, UploadHandle, UploadProgressReceiver};
use crate::store::{RecordStore, RecordSubscription};

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorState {
    /// Subscription issued, first snapshot not yet received
    Loading,
    /// Local state mirrors the remote record
    Bound,
    /// A local edit is pending write-back
    Editing,
    /// A write-back is in flight
    Saving,
    /// Subscription torn down, no further effects
    Closed,
}

/// Editor configuration.
#[derive(Debug, Clone)]
pub struct EditorConfig {
    /// Quiet period before a pending edit is written back
    pub debounce: Duration,
    /// Event channel capacity
    pub event_capacity: usize,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(1000),
            event_capacity: 64,
        }
    }
}

/// Events emitted by an editor session.
#[derive(Debug, Clone)]
pub enum EditorEvent {
    /// A remote snapshot overwrote the local title and content
    RemoteUpdated { title: String, content: RichText },
    /// Write-back succeeded (transient confirmation)
    Saved,
    /// Write-back failed; no automatic retry
    SaveFailed { reason: String },
    /// The record was deleted mid-session; the session closes
    Deleted,
    /// The session closed
    Closed,
}

/// Event receiver; also a [`Stream`] of [`EditorEvent`].
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::Receiver<EditorEvent>,
}

impl EventReceiver {
    pub async fn recv(&mut self) -> Option<EditorEvent> {
        self.rx.recv().await
    }
}

impl Stream for EventReceiver {
    type Item = EditorEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[derive(Debug)]
struct LocalDoc {
    title: String,
    content: RichText,
}

enum Command {
    Edit(RichText),
    Close,
}

/// An open editor session for one document.
#[derive(Debug)]
pub struct EditorSession {
    id: Uuid,
    permission: Permission,
    state: Arc<RwLock<EditorState>>,
    local: Arc<RwLock<LocalDoc>>,
    cmd_tx: mpsc::Sender<Command>,
    event_rx: Option<EventReceiver>,
    task: JoinHandle<()>,
}

impl EditorSession {
    /// Bind to a document.
    ///
    /// Awaits the first snapshot: an absent record is `NotFound`, a user
    /// with no access is `Unauthorized` (the subscription is dropped
    /// without the session ever accepting edits).
    pub async fn open(
        store: Arc<RecordStore>,
        user: &UserIdentity,
        id: Uuid,
        config: EditorConfig,
    ) -> Result<Self, CollabError> {
        let state = Arc::new(RwLock::new(EditorState::Loading));

        let mut sub = store.subscribe_record(id).await;
        let first = sub
            .recv()
            .await
            .flatten()
            .ok_or_else(|| CollabError::NotFound(format!("record {id}")))?;

        let permission = first.permission_for(&user.email).ok_or_else(|| {
            CollabError::Unauthorized(format!("'{}' has no access to document {id}", user.email))
        })?;

        let local = Arc::new(RwLock::new(LocalDoc {
            title: first.title.clone(),
            content: first.content.clone(),
        }));
        *state.write().await = EditorState::Bound;
        log::info!(
            "editor session bound to record {id} for '{}' ({permission:?})",
            user.email
        );

        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let (event_tx, event_rx) = mpsc::channel(config.event_capacity);

        let task = tokio::spawn(run_session(
            id,
            sub,
            cmd_rx,
            event_tx,
            state.clone(),
            local.clone(),
            store,
            config.debounce,
        ));

        Ok(Self {
            id,
            permission,
            state,
            local,
            cmd_tx,
            event_rx: Some(EventReceiver { rx: event_rx }),
            task,
        })
    }

    /// Apply a local content edit.
    ///
    /// Local render state updates immediately; the debounce timer
    /// (re)starts, and only the most recent scheduled write survives.
    /// Rejected with `Unauthorized` for read-only viewers and with
    /// `Validation` once closed — neither reaches the store.
    pub async fn edit(&self, content: RichText) -> Result<(), CollabError> {
        if *self.state.read().await == EditorState::Closed {
            return Err(CollabError::Validation("editor session is closed".into()));
        }
        if !self.permission.can_write() {
            return Err(CollabError::Unauthorized(
                "read-only access: edits are not permitted".into(),
            ));
        }

        self.local.write().await.content = content.clone();
        *self.state.write().await = EditorState::Editing;

        self.cmd_tx
            .send(Command::Edit(content))
            .await
            .map_err(|_| CollabError::Validation("editor session is closed".into()))
    }

    /// Close the session. Idempotent.
    ///
    /// Any pending debounce timer is cancelled; an in-flight write-back
    /// is not — its result surfaces only as a final event.
    pub async fn close(&self) {
        {
            let mut state = self.state.write().await;
            if *state == EditorState::Closed {
                return;
            }
            *state = EditorState::Closed;
        }
        let _ = self.cmd_tx.send(Command::Close).await;
        log::info!("editor session for record {} closed", self.id);
    }

    /// Take the event receiver (can only be called once).
    pub fn take_events(&mut self) -> Option<EventReceiver> {
        self.event_rx.take()
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The permission computed at bind time.
    pub fn permission(&self) -> Permission {
        self.permission
    }

    pub fn is_read_only(&self) -> bool {
        !self.permission.can_write()
    }

    pub async fn state(&self) -> EditorState {
        *self.state.read().await
    }

    pub async fn title(&self) -> String {
        self.local.read().await.title.clone()
    }

    pub async fn content(&self) -> RichText {
        self.local.read().await.content.clone()
    }

    /// Serialize the current local content into a portable document.
    ///
    /// Reads the editor's in-memory state and never mutates it.
    pub async fn export(&self, format: ExportFormat) -> ExportDocument {
        let doc = self.local.read().await;
        ExportDocument::render(self.id, &doc.title, &doc.content, format)
    }

    /// Export and upload to blob storage under a path keyed by the
    /// document title. Upload failures are reported through the handle
    /// and leave editor state untouched.
    pub async fn export_to_blob(
        &self,
        blob: &BlobStore,
        format: ExportFormat,
    ) -> (UploadProgressReceiver, UploadHandle) {
        let doc = self.export(format).await;
        blob.upload(&doc.file_name, doc.bytes)
    }
}

impl Drop for EditorSession {
    fn drop(&mut self) {
        // An unclosed session must not keep saving in the background
        self.task.abort();
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_session(
    id: Uuid,
    mut sub: RecordSubscription,
    mut cmd_rx: mpsc::Receiver<Command>,
    event_tx: mpsc::Sender<EditorEvent>,
    state: Arc<RwLock<EditorState>>,
    local: Arc<RwLock<LocalDoc>>,
    store: Arc<RecordStore>,
    debounce: Duration,
) {
    // The scheduled write's value — always the last edit's content.
    // A remote snapshot overwrites local state but not a pending save.
    let mut pending: Option<RichText> = None;
    let timer = sleep(Duration::ZERO);
    tokio::pin!(timer);
    let mut armed = false;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(Command::Edit(content)) => {
                    pending = Some(content);
                    timer.as_mut().reset(Instant::now() + debounce);
                    armed = true;
                    log::debug!("save scheduled for record {id}");
                }
                Some(Command::Close) | None => break,
            },
            snapshot = sub.recv() => match snapshot {
                Some(Some(record)) => {
                    {
                        let mut doc = local.write().await;
                        doc.title = record.title.clone();
                        doc.content = record.content.clone();
                    }
                    emit(&event_tx, EditorEvent::RemoteUpdated {
                        title: record.title.clone(),
                        content: record.content.clone(),
                    });
                }
                Some(None) => {
                    log::info!("record {id} deleted mid-session");
                    emit(&event_tx, EditorEvent::Deleted);
                    break;
                }
                None => break,
            },
            _ = &mut timer, if armed => {
                armed = false;
                let content = pending.take().unwrap_or_default();
                if content.is_empty() {
                    // Validation absence: no write attempted
                    log::warn!("skipping write-back of empty content for record {id}");
                    *state.write().await = EditorState::Bound;
                    continue;
                }

                *state.write().await = EditorState::Saving;
                match store.update_fields(id, RecordPatch::content(content)).await {
                    Ok(_) => {
                        *state.write().await = EditorState::Bound;
                        emit(&event_tx, EditorEvent::Saved);
                    }
                    Err(e) => {
                        // No automatic retry — the next edit schedules a
                        // fresh attempt
                        log::warn!("write-back failed for record {id}: {e}");
                        *state.write().await = EditorState::Editing;
                        emit(&event_tx, EditorEvent::SaveFailed { reason: e.to_string() });
                    }
                }
            }
        }
    }

    *state.write().await = EditorState::Closed;
    emit(&event_tx, EditorEvent::Closed);
}

/// Non-blocking event delivery; a full or abandoned receiver drops the
/// event rather than stalling the session task.
fn emit(tx: &mpsc::Sender<EditorEvent>, event: EditorEvent) {
    if let Err(e) = tx.try_send(event) {
        log::debug!("editor event dropped: {e}");
    }
}
