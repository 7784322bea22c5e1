//! RocksDB-backed record persistence.
//!
//! Column families:
//! - `records` — bincode-encoded `DocumentRecord`, LZ4 compressed
//! - `meta`    — bincode-encoded `PersistedMeta` (revision, sizes, timestamps)
//!
//! The in-memory `RecordStore` writes through on every mutation and
//! replays `load_all()` into its authority map on open. All RocksDB
//! errors surface as `CollabError::Transient` at the store boundary —
//! persistence being unreachable is the same failure class as the
//! network being down.

use rocksdb::{
    BlockBasedOptions, Cache, ColumnFamilyDescriptor, DBCompressionType, DBWithThreadMode,
    IteratorMode, Options, SingleThreaded, WriteBatch, WriteOptions,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

use folio_core::{CollabError, DocumentRecord};

const CF_RECORDS: &str = "records";
const CF_META: &str = "meta";

const COLUMN_FAMILIES: &[&str] = &[CF_RECORDS, CF_META];

/// Per-record persistence metadata, stored alongside the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedMeta {
    /// Record UUID
    pub id: Uuid,
    /// Monotonically increasing write counter
    pub revision: u64,
    /// Uncompressed encoded size in bytes
    pub encoded_size: u64,
    /// LZ4-compressed size in bytes
    pub compressed_size: u64,
    /// Creation timestamp (seconds since epoch)
    pub created_at: u64,
    /// Last write timestamp (seconds since epoch)
    pub updated_at: u64,
}

impl PersistedMeta {
    fn encode(&self) -> Result<Vec<u8>, CollabError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| CollabError::Transient(format!("meta encode: {e}")))
    }

    fn decode(bytes: &[u8]) -> Result<Self, CollabError> {
        let (meta, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| CollabError::Transient(format!("meta decode: {e}")))?;
        Ok(meta)
    }
}

/// Durable record database.
pub struct RecordDb {
    /// RocksDB instance (single-threaded mode — concurrency via tokio)
    db: DBWithThreadMode<SingleThreaded>,
    sync_writes: bool,
}

impl RecordDb {
    /// Open (or create) the database at `path`.
    pub fn open(path: &Path, sync_writes: bool) -> Result<Self, CollabError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_open_files(128);
        db_opts.set_keep_log_file_num(5);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Self::cf_options()))
            .collect();

        let db =
            DBWithThreadMode::<SingleThreaded>::open_cf_descriptors(&db_opts, path, cf_descriptors)
                .map_err(transient)?;

        Ok(Self { db, sync_writes })
    }

    /// Column family options: bloom filter + block cache for point lookups.
    fn cf_options() -> Options {
        let mut opts = Options::default();

        let mut block_opts = BlockBasedOptions::default();
        let cache = Cache::new_lru_cache(16 * 1024 * 1024); // 16MB
        block_opts.set_block_cache(&cache);
        block_opts.set_bloom_filter(10.0, false);
        block_opts.set_block_size(16 * 1024);
        opts.set_block_based_table_factory(&block_opts);

        // Payloads are LZ4'd by us already; keep the CF itself uncompressed
        opts.set_compression_type(DBCompressionType::None);
        opts.optimize_for_point_lookup(16 * 1024 * 1024);
        opts
    }

    /// Write a record through, bumping its persisted revision.
    ///
    /// Payload and metadata go in one atomic batch.
    pub fn put(&self, record: &DocumentRecord) -> Result<PersistedMeta, CollabError> {
        let cf_records = self.cf(CF_RECORDS)?;
        let cf_meta = self.cf(CF_META)?;

        let encoded = bincode::serde::encode_to_vec(record, bincode::config::standard())
            .map_err(|e| CollabError::Transient(format!("record encode: {e}")))?;
        let compressed = lz4_flex::compress_prepend_size(&encoded);

        let revision = match self.load_meta(record.id) {
            Ok(prev) => prev.revision + 1,
            Err(_) => 1,
        };
        let meta = PersistedMeta {
            id: record.id,
            revision,
            encoded_size: encoded.len() as u64,
            compressed_size: compressed.len() as u64,
            created_at: record.created_at,
            updated_at: record.updated_at,
        };

        let key = record.id.as_bytes().to_vec();
        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_records, &key, &compressed);
        batch.put_cf(&cf_meta, &key, &meta.encode()?);

        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.sync_writes);
        self.db.write_opt(batch, &write_opts).map_err(transient)?;

        Ok(meta)
    }

    /// Remove a record and its metadata atomically.
    pub fn remove(&self, id: Uuid) -> Result<(), CollabError> {
        let cf_records = self.cf(CF_RECORDS)?;
        let cf_meta = self.cf(CF_META)?;

        let key = id.as_bytes().to_vec();
        let mut batch = WriteBatch::default();
        batch.delete_cf(&cf_records, &key);
        batch.delete_cf(&cf_meta, &key);

        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.sync_writes);
        self.db.write_opt(batch, &write_opts).map_err(transient)
    }

    /// Load every persisted record, for replay into the authority map.
    pub fn load_all(&self) -> Result<Vec<DocumentRecord>, CollabError> {
        let cf = self.cf(CF_RECORDS)?;
        let mut records = Vec::new();

        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item.map_err(transient)?;
            let encoded = lz4_flex::decompress_size_prepended(&value)
                .map_err(|e| CollabError::Transient(format!("record decompress: {e}")))?;
            let (record, _): (DocumentRecord, _) =
                bincode::serde::decode_from_slice(&encoded, bincode::config::standard())
                    .map_err(|e| CollabError::Transient(format!("record decode: {e}")))?;
            records.push(record);
        }

        Ok(records)
    }

    /// Load persistence metadata for a record.
    pub fn load_meta(&self, id: Uuid) -> Result<PersistedMeta, CollabError> {
        let cf = self.cf(CF_META)?;
        match self.db.get_cf(&cf, id.as_bytes()).map_err(transient)? {
            Some(bytes) => PersistedMeta::decode(&bytes),
            None => Err(CollabError::NotFound(format!("record {id}"))),
        }
    }

    /// Number of persisted records.
    pub fn len(&self) -> Result<usize, CollabError> {
        let cf = self.cf(CF_META)?;
        let mut count = 0;
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            item.map_err(transient)?;
            count += 1;
        }
        Ok(count)
    }

    pub fn is_empty(&self) -> Result<bool, CollabError> {
        Ok(self.len()? == 0)
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily, CollabError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| CollabError::Transient(format!("column family '{name}' not found")))
    }
}

fn transient(e: rocksdb::Error) -> CollabError {
    CollabError::Transient(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_core::{Permission, RichText, ShareEntry};
    use std::path::PathBuf;

    fn temp_db_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("folio_test_persist_{name}_{}", Uuid::new_v4()))
    }

    fn cleanup(path: &Path) {
        let _ = std::fs::remove_dir_all(path);
    }

    fn sample_record() -> DocumentRecord {
        DocumentRecord {
            id: Uuid::new_v4(),
            title: "Persisted".into(),
            owner_email: "a@x.com".into(),
            content: RichText::plain("body text"),
            shared_with: vec![ShareEntry::new("b@x.com", Permission::Read)],
            created_at: 100,
            updated_at: 100,
        }
    }

    #[test]
    fn test_put_load_roundtrip() {
        let path = temp_db_path("roundtrip");
        let db = RecordDb::open(&path, false).unwrap();

        let rec = sample_record();
        let meta = db.put(&rec).unwrap();
        assert_eq!(meta.id, rec.id);
        assert_eq!(meta.revision, 1);
        assert!(meta.encoded_size > 0);

        let all = db.load_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0], rec);

        drop(db);
        cleanup(&path);
    }

    #[test]
    fn test_revision_bumps_on_rewrite() {
        let path = temp_db_path("revision");
        let db = RecordDb::open(&path, false).unwrap();

        let mut rec = sample_record();
        assert_eq!(db.put(&rec).unwrap().revision, 1);
        rec.content = RichText::plain("edited");
        assert_eq!(db.put(&rec).unwrap().revision, 2);
        assert_eq!(db.put(&rec).unwrap().revision, 3);

        drop(db);
        cleanup(&path);
    }

    #[test]
    fn test_remove() {
        let path = temp_db_path("remove");
        let db = RecordDb::open(&path, false).unwrap();

        let rec = sample_record();
        db.put(&rec).unwrap();
        assert_eq!(db.len().unwrap(), 1);

        db.remove(rec.id).unwrap();
        assert_eq!(db.len().unwrap(), 0);
        assert!(db.load_meta(rec.id).is_err());

        drop(db);
        cleanup(&path);
    }

    #[test]
    fn test_survives_reopen() {
        let path = temp_db_path("reopen");
        let rec = sample_record();

        {
            let db = RecordDb::open(&path, false).unwrap();
            db.put(&rec).unwrap();
        }
        {
            let db = RecordDb::open(&path, false).unwrap();
            let all = db.load_all().unwrap();
            assert_eq!(all.len(), 1);
            assert_eq!(all[0], rec);
            // Revision continues from the persisted value
            assert_eq!(db.put(&rec).unwrap().revision, 2);
        }

        cleanup(&path);
    }

    #[test]
    fn test_meta_not_found() {
        let path = temp_db_path("meta_missing");
        let db = RecordDb::open(&path, false).unwrap();
        assert!(matches!(
            db.load_meta(Uuid::new_v4()),
            Err(CollabError::NotFound(_))
        ));
        drop(db);
        cleanup(&path);
    }
}
