//! In-process record store with live subscriptions.
//!
//! The backend collaborator every other module talks to. One authority
//! map of `DocumentRecord`s, two kinds of push channels:
//!
//! - a collection-wide broadcast carrying full-collection snapshots,
//!   re-published on every mutation
//! - per-record broadcasts carrying single-record snapshots (`None`
//!   means the record was deleted)
//!
//! Consumers replace their entire local view on each snapshot rather
//! than diffing. Snapshots are published while the authority map's write
//! lock is held, so subscribers observe them in mutation order; a lagged
//! subscriber skips forward to newer snapshots but never sees them
//! reordered. Concurrent writers resolve via last-write-wins — no
//! locking across operations, no optimistic concurrency.
//!
//! With `persist_path` set, every mutation writes through to RocksDB and
//! `open` replays the persisted records into the authority map.

pub mod persist;

pub use persist::{PersistedMeta, RecordDb};

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use folio_core::{CollabError, DocumentRecord, RecordDraft, RecordPatch, ShareEntry};

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Broadcast capacity (snapshots buffered per subscriber)
    pub channel_capacity: usize,
    /// Write-through RocksDB directory; `None` keeps the store in memory
    pub persist_path: Option<PathBuf>,
    /// Enable fsync on every persisted write
    pub sync_writes: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 64,
            persist_path: None,
            sync_writes: false,
        }
    }
}

impl StoreConfig {
    /// Config for tests: small buffers, persistence under `path`.
    pub fn for_testing(path: impl Into<PathBuf>) -> Self {
        Self {
            channel_capacity: 16,
            persist_path: Some(path.into()),
            sync_writes: false,
        }
    }
}

/// Point-in-time store counters.
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    pub records: usize,
    pub creates: u64,
    pub updates: u64,
    pub deletes: u64,
    pub snapshots_published: u64,
}

/// Atomic counters — lock-free on the mutation path, read via snapshot.
#[derive(Default)]
struct AtomicStoreStats {
    creates: AtomicU64,
    updates: AtomicU64,
    deletes: AtomicU64,
    snapshots_published: AtomicU64,
}

struct StoreInner {
    records: HashMap<Uuid, Arc<DocumentRecord>>,
    /// Per-record channels, lazily created, removed on delete
    record_channels: HashMap<Uuid, broadcast::Sender<Option<Arc<DocumentRecord>>>>,
}

/// The shared record store.
pub struct RecordStore {
    inner: RwLock<StoreInner>,
    collection_tx: broadcast::Sender<Arc<Vec<DocumentRecord>>>,
    db: Option<RecordDb>,
    config: StoreConfig,
    stats: AtomicStoreStats,
}

impl RecordStore {
    /// Open a store, replaying persisted records when configured.
    pub fn open(config: StoreConfig) -> Result<Arc<Self>, CollabError> {
        let mut records = HashMap::new();

        let db = match &config.persist_path {
            Some(path) => {
                let db = RecordDb::open(path, config.sync_writes)?;
                let recovered = db.load_all()?;
                log::info!(
                    "record store opened at {} ({} records recovered)",
                    path.display(),
                    recovered.len()
                );
                for record in recovered {
                    records.insert(record.id, Arc::new(record));
                }
                Some(db)
            }
            None => {
                log::info!("record store opened in memory");
                None
            }
        };

        let (collection_tx, _) = broadcast::channel(config.channel_capacity);

        Ok(Arc::new(Self {
            inner: RwLock::new(StoreInner {
                records,
                record_channels: HashMap::new(),
            }),
            collection_tx,
            db,
            config,
            stats: AtomicStoreStats::default(),
        }))
    }

    /// Create a record from a draft: stamps id and timestamps.
    ///
    /// A persistence failure leaves no partial record — the write-through
    /// happens before the record becomes visible.
    pub async fn create(&self, draft: RecordDraft) -> Result<Arc<DocumentRecord>, CollabError> {
        let now = now_secs();
        let record = Arc::new(DocumentRecord {
            id: Uuid::new_v4(),
            title: draft.title,
            owner_email: draft.owner_email,
            content: draft.content,
            shared_with: draft.shared_with,
            created_at: now,
            updated_at: now,
        });

        let mut inner = self.inner.write().await;
        self.write_through(&record)?;
        inner.records.insert(record.id, record.clone());
        self.stats.creates.fetch_add(1, Ordering::Relaxed);
        log::info!("record {} created by {}", record.id, record.owner_email);

        self.publish_collection(&inner);
        self.publish_record(&inner, record.id, Some(record.clone()));
        Ok(record)
    }

    /// Fetch the current state of one record.
    pub async fn get(&self, id: Uuid) -> Result<Arc<DocumentRecord>, CollabError> {
        let inner = self.inner.read().await;
        inner
            .records
            .get(&id)
            .cloned()
            .ok_or_else(|| CollabError::NotFound(format!("record {id}")))
    }

    /// Subscribe to full-collection snapshots.
    ///
    /// The current snapshot is delivered immediately, then every
    /// subsequent one in publish order.
    pub async fn subscribe_collection(&self) -> CollectionSubscription {
        let inner = self.inner.read().await;
        let rx = self.collection_tx.subscribe();
        CollectionSubscription {
            initial: Some(Arc::new(collection_snapshot(&inner))),
            rx,
        }
    }

    /// Subscribe to one record's snapshots.
    ///
    /// Initial delivery is the record's current state — `None` when it
    /// doesn't exist (or no longer exists).
    pub async fn subscribe_record(&self, id: Uuid) -> RecordSubscription {
        let mut inner = self.inner.write().await;
        let current = inner.records.get(&id).cloned();
        let rx = inner
            .record_channels
            .entry(id)
            .or_insert_with(|| broadcast::channel(self.config.channel_capacity).0)
            .subscribe();
        RecordSubscription {
            id,
            initial: Some(current),
            rx,
        }
    }

    /// Field-level merge update. Bumps `updated_at` and publishes to the
    /// collection channel and the record's own channel.
    pub async fn update_fields(
        &self,
        id: Uuid,
        patch: RecordPatch,
    ) -> Result<Arc<DocumentRecord>, CollabError> {
        let mut inner = self.inner.write().await;
        let current = inner
            .records
            .get(&id)
            .cloned()
            .ok_or_else(|| CollabError::NotFound(format!("record {id}")))?;

        if patch.is_empty() {
            log::debug!("empty patch for record {id}, skipping");
            return Ok(current);
        }

        let mut updated = (*current).clone();
        patch.apply(&mut updated);
        updated.updated_at = now_secs();
        let updated = Arc::new(updated);

        self.write_through(&updated)?;
        inner.records.insert(id, updated.clone());
        self.stats.updates.fetch_add(1, Ordering::Relaxed);
        log::debug!("record {id} updated");

        self.publish_collection(&inner);
        self.publish_record(&inner, id, Some(updated.clone()));
        Ok(updated)
    }

    /// Set-union append to `shared_with`.
    ///
    /// An identical `{email, permission}` entry is not duplicated (the
    /// append becomes a no-op); no same-email/different-permission
    /// suppression is guaranteed here — callers that need normalization
    /// read the record and use `update_fields`.
    pub async fn append_share(
        &self,
        id: Uuid,
        entry: ShareEntry,
    ) -> Result<Arc<DocumentRecord>, CollabError> {
        let mut inner = self.inner.write().await;
        let current = inner
            .records
            .get(&id)
            .cloned()
            .ok_or_else(|| CollabError::NotFound(format!("record {id}")))?;

        if current.shared_with.contains(&entry) {
            return Ok(current);
        }

        let mut updated = (*current).clone();
        updated.shared_with.push(entry);
        updated.updated_at = now_secs();
        let updated = Arc::new(updated);

        self.write_through(&updated)?;
        inner.records.insert(id, updated.clone());
        self.stats.updates.fetch_add(1, Ordering::Relaxed);

        self.publish_collection(&inner);
        self.publish_record(&inner, id, Some(updated.clone()));
        Ok(updated)
    }

    /// Delete a record. Publishes a collection snapshot and a final
    /// `None` on the record's channel, then closes that channel.
    pub async fn delete(&self, id: Uuid) -> Result<(), CollabError> {
        let mut inner = self.inner.write().await;
        if !inner.records.contains_key(&id) {
            return Err(CollabError::NotFound(format!("record {id}")));
        }

        if let Some(db) = &self.db {
            db.remove(id)?;
        }
        inner.records.remove(&id);
        self.stats.deletes.fetch_add(1, Ordering::Relaxed);
        log::info!("record {id} deleted");

        self.publish_collection(&inner);
        self.publish_record(&inner, id, None);
        // Dropping the sender closes the channel once buffered snapshots drain
        inner.record_channels.remove(&id);
        Ok(())
    }

    /// Current counters.
    pub async fn stats(&self) -> StoreStats {
        let inner = self.inner.read().await;
        StoreStats {
            records: inner.records.len(),
            creates: self.stats.creates.load(Ordering::Relaxed),
            updates: self.stats.updates.load(Ordering::Relaxed),
            deletes: self.stats.deletes.load(Ordering::Relaxed),
            snapshots_published: self.stats.snapshots_published.load(Ordering::Relaxed),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn write_through(&self, record: &DocumentRecord) -> Result<(), CollabError> {
        if let Some(db) = &self.db {
            if let Err(e) = db.put(record) {
                log::error!("write-through failed for record {}: {e}", record.id);
                return Err(e);
            }
        }
        Ok(())
    }

    fn publish_collection(&self, inner: &StoreInner) {
        let snapshot = Arc::new(collection_snapshot(inner));
        let _ = self.collection_tx.send(snapshot);
        self.stats.snapshots_published.fetch_add(1, Ordering::Relaxed);
    }

    fn publish_record(&self, inner: &StoreInner, id: Uuid, snapshot: Option<Arc<DocumentRecord>>) {
        if let Some(tx) = inner.record_channels.get(&id) {
            let _ = tx.send(snapshot);
            self.stats.snapshots_published.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Records sorted by `(created_at, id)` for deterministic snapshot order.
fn collection_snapshot(inner: &StoreInner) -> Vec<DocumentRecord> {
    let mut records: Vec<DocumentRecord> =
        inner.records.values().map(|r| (**r).clone()).collect();
    records.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
    records
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Live sequence of full-collection snapshots.
pub struct CollectionSubscription {
    initial: Option<Arc<Vec<DocumentRecord>>>,
    rx: broadcast::Receiver<Arc<Vec<DocumentRecord>>>,
}

impl CollectionSubscription {
    /// Next snapshot; `None` once the store is gone.
    ///
    /// A lagged subscriber skips to newer snapshots (coalescing, never
    /// reordering).
    pub async fn recv(&mut self) -> Option<Arc<Vec<DocumentRecord>>> {
        if let Some(snapshot) = self.initial.take() {
            return Some(snapshot);
        }
        loop {
            match self.rx.recv().await {
                Ok(snapshot) => return Some(snapshot),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!("collection subscriber lagged, skipped {skipped} snapshots");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Live sequence of single-record snapshots.
///
/// Each item is the record's full state; `Some(None)` means deleted. The
/// outer `None` means the channel closed (store dropped, or the final
/// deletion snapshot was already delivered).
pub struct RecordSubscription {
    id: Uuid,
    initial: Option<Option<Arc<DocumentRecord>>>,
    rx: broadcast::Receiver<Option<Arc<DocumentRecord>>>,
}

impl RecordSubscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub async fn recv(&mut self) -> Option<Option<Arc<DocumentRecord>>> {
        if let Some(snapshot) = self.initial.take() {
            return Some(snapshot);
        }
        loop {
            match self.rx.recv().await {
                Ok(snapshot) => return Some(snapshot),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!(
                        "record {} subscriber lagged, skipped {skipped} snapshots",
                        self.id
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_core::{Permission, RichText};

    fn draft(title: &str, owner: &str) -> RecordDraft {
        RecordDraft::new(title, owner)
    }

    #[tokio::test]
    async fn test_create_stamps_fields() {
        let store = RecordStore::open(StoreConfig::default()).unwrap();
        let rec = store.create(draft("Spec", "a@x.com")).await.unwrap();

        assert_eq!(rec.title, "Spec");
        assert_eq!(rec.owner_email, "a@x.com");
        assert!(rec.shared_with.is_empty());
        assert!(rec.content.is_empty());
        assert!(rec.created_at > 0);
        assert_eq!(rec.created_at, rec.updated_at);

        let stats = store.stats().await;
        assert_eq!(stats.records, 1);
        assert_eq!(stats.creates, 1);
    }

    #[tokio::test]
    async fn test_get_not_found() {
        let store = RecordStore::open(StoreConfig::default()).unwrap();
        assert!(matches!(
            store.get(Uuid::new_v4()).await,
            Err(CollabError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_content_patch_preserves_shares() {
        let store = RecordStore::open(StoreConfig::default()).unwrap();
        let rec = store.create(draft("Spec", "a@x.com")).await.unwrap();
        store
            .append_share(rec.id, ShareEntry::new("b@x.com", Permission::Read))
            .await
            .unwrap();

        let updated = store
            .update_fields(rec.id, RecordPatch::content(RichText::plain("hello")))
            .await
            .unwrap();

        assert_eq!(updated.content.plain_text(), "hello");
        assert_eq!(updated.shared_with.len(), 1);
        assert_eq!(updated.shared_with[0].email, "b@x.com");
    }

    #[tokio::test]
    async fn test_share_patch_preserves_content() {
        let store = RecordStore::open(StoreConfig::default()).unwrap();
        let rec = store.create(draft("Spec", "a@x.com")).await.unwrap();
        store
            .update_fields(rec.id, RecordPatch::content(RichText::plain("body")))
            .await
            .unwrap();

        let updated = store
            .update_fields(
                rec.id,
                RecordPatch::shared_with(vec![ShareEntry::new("b@x.com", Permission::Write)]),
            )
            .await
            .unwrap();

        assert_eq!(updated.content.plain_text(), "body");
        assert_eq!(updated.shared_with.len(), 1);
    }

    #[tokio::test]
    async fn test_append_share_dedupes_identical() {
        let store = RecordStore::open(StoreConfig::default()).unwrap();
        let rec = store.create(draft("Spec", "a@x.com")).await.unwrap();

        let entry = ShareEntry::new("b@x.com", Permission::Read);
        store.append_share(rec.id, entry.clone()).await.unwrap();
        let after = store.append_share(rec.id, entry).await.unwrap();

        assert_eq!(after.shared_with.len(), 1);
        // Second append was a no-op, not a second update
        assert_eq!(store.stats().await.updates, 1);
    }

    #[tokio::test]
    async fn test_collection_subscription_initial_and_updates() {
        let store = RecordStore::open(StoreConfig::default()).unwrap();
        store.create(draft("First", "a@x.com")).await.unwrap();

        let mut sub = store.subscribe_collection().await;
        let initial = sub.recv().await.unwrap();
        assert_eq!(initial.len(), 1);
        assert_eq!(initial[0].title, "First");

        store.create(draft("Second", "a@x.com")).await.unwrap();
        let next = sub.recv().await.unwrap();
        assert_eq!(next.len(), 2);
    }

    #[tokio::test]
    async fn test_collection_snapshot_deterministic_order() {
        let store = RecordStore::open(StoreConfig::default()).unwrap();
        for i in 0..5 {
            store.create(draft(&format!("Doc {i}"), "a@x.com")).await.unwrap();
        }

        let mut sub = store.subscribe_collection().await;
        let snap = sub.recv().await.unwrap();
        let mut sorted = snap.as_ref().clone();
        sorted.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        assert_eq!(*snap, sorted);
    }

    #[tokio::test]
    async fn test_record_subscription_lifecycle() {
        let store = RecordStore::open(StoreConfig::default()).unwrap();
        let rec = store.create(draft("Spec", "a@x.com")).await.unwrap();

        let mut sub = store.subscribe_record(rec.id).await;
        let initial = sub.recv().await.unwrap().unwrap();
        assert_eq!(initial.id, rec.id);

        store
            .update_fields(rec.id, RecordPatch::content(RichText::plain("v2")))
            .await
            .unwrap();
        let updated = sub.recv().await.unwrap().unwrap();
        assert_eq!(updated.content.plain_text(), "v2");

        store.delete(rec.id).await.unwrap();
        // Final None snapshot, then the channel closes
        assert!(sub.recv().await.unwrap().is_none());
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_subscribe_absent_record() {
        let store = RecordStore::open(StoreConfig::default()).unwrap();
        let mut sub = store.subscribe_record(Uuid::new_v4()).await;
        assert!(sub.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_not_found() {
        let store = RecordStore::open(StoreConfig::default()).unwrap();
        assert!(matches!(
            store.delete(Uuid::new_v4()).await,
            Err(CollabError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_counter() {
        let store = RecordStore::open(StoreConfig::default()).unwrap();
        let rec = store.create(draft("Spec", "a@x.com")).await.unwrap();

        for i in 0..3 {
            store
                .update_fields(
                    rec.id,
                    RecordPatch::content(RichText::plain(format!("v{i}"))),
                )
                .await
                .unwrap();
        }
        assert_eq!(store.stats().await.updates, 3);
    }
}
