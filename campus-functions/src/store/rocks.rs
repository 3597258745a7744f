//! RocksDB-backed row store.
//!
//! Column families:
//! - `notifications` — keyed by `user_id \0 notification_id`
//! - `achievements`  — keyed by `user_id \0 achievement_id` (uniqueness key)
//! - `certificates`  — keyed by certificate id
//! - `certificate_owners` — `user_id \0 course_id` to certificate id
//! - `activity`      — keyed by `user_id`
//!
//! Values are bincode-encoded rows.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rocksdb::{
    BlockBasedOptions, Cache, ColumnFamilyDescriptor, DBCompressionType, DBWithThreadMode,
    Direction, IteratorMode, Options, SingleThreaded, WriteBatch, WriteOptions,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::{
    AchievementRecord, ActivityCounts, ActivityKind, CertificateRecord, InsertOutcome,
    NotificationRecord, Store, StoreError,
};

const CF_NOTIFICATIONS: &str = "notifications";
const CF_ACHIEVEMENTS: &str = "achievements";
const CF_CERTIFICATES: &str = "certificates";
const CF_CERTIFICATE_OWNERS: &str = "certificate_owners";
const CF_ACTIVITY: &str = "activity";

const COLUMN_FAMILIES: &[&str] = &[
    CF_NOTIFICATIONS,
    CF_ACHIEVEMENTS,
    CF_CERTIFICATES,
    CF_CERTIFICATE_OWNERS,
    CF_ACTIVITY,
];

#[derive(Debug, Clone)]
pub struct RocksStoreConfig {
    /// Database directory path
    pub path: PathBuf,
    /// Block cache size in bytes (default: 64MB)
    pub block_cache_size: usize,
    /// fsync every write (default: false)
    pub sync_writes: bool,
    /// Max open files for RocksDB (default: 256)
    pub max_open_files: i32,
}

impl RocksStoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            block_cache_size: 64 * 1024 * 1024,
            sync_writes: false,
            max_open_files: 256,
        }
    }

    /// Small caches for tests.
    pub fn for_testing(path: impl Into<PathBuf>) -> Self {
        Self {
            block_cache_size: 4 * 1024 * 1024,
            max_open_files: 64,
            ..Self::new(path)
        }
    }
}

pub struct RocksStore {
    db: DBWithThreadMode<SingleThreaded>,
    config: RocksStoreConfig,
    /// Serializes read-modify-write sequences
    write_lock: Mutex<()>,
}

impl RocksStore {
    /// Open the store, creating the database and column families if missing.
    pub fn open(config: RocksStoreConfig) -> Result<Self, StoreError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_open_files(config.max_open_files);
        db_opts.set_keep_log_file_num(5);

        let cache = Cache::new_lru_cache(config.block_cache_size);
        let cf_descriptors: Vec<ColumnFamilyDescriptor> = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Self::cf_options(name, &cache)))
            .collect();

        let db = DBWithThreadMode::<SingleThreaded>::open_cf_descriptors(
            &db_opts,
            &config.path,
            cf_descriptors,
        )?;
        log::info!("Opened row store at {}", config.path.display());

        Ok(Self {
            db,
            config,
            write_lock: Mutex::new(()),
        })
    }

    fn cf_options(name: &str, cache: &Cache) -> Options {
        let mut opts = Options::default();
        let mut block_opts = BlockBasedOptions::default();
        block_opts.set_block_cache(cache);
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);
        opts.set_compression_type(DBCompressionType::Lz4);

        if name == CF_NOTIFICATIONS {
            // Append-mostly, scanned per user
            opts.set_max_write_buffer_number(4);
        }
        opts
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily, StoreError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("Column family '{name}' not found")))
    }

    fn write_opts(&self) -> WriteOptions {
        let mut opts = WriteOptions::default();
        opts.set_sync(self.config.sync_writes);
        opts
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn get<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>, StoreError> {
        let cf = self.cf(cf_name)?;
        match self.db.get_cf(&cf, key)? {
            Some(bytes) => decode(&bytes).map(Some),
            None => Ok(None),
        }
    }

    fn put<T: Serialize>(&self, cf_name: &str, key: &[u8], value: &T) -> Result<(), StoreError> {
        let cf = self.cf(cf_name)?;
        self.db.put_cf_opt(&cf, key, encode(value)?, &self.write_opts())?;
        Ok(())
    }

    /// All values whose key starts with `prefix`.
    fn scan_prefix<T: DeserializeOwned>(
        &self,
        cf_name: &str,
        prefix: &[u8],
    ) -> Result<Vec<T>, StoreError> {
        let cf = self.cf(cf_name)?;
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(prefix, Direction::Forward));

        let mut rows = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            rows.push(decode(&value)?);
        }
        Ok(rows)
    }
}

/// `user_id \0` so that `u1` never matches rows of `u10`.
fn user_prefix(user_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(user_id.len() + 1);
    key.extend_from_slice(user_id.as_bytes());
    key.push(0);
    key
}

fn user_key(user_id: &str, suffix: &[u8]) -> Vec<u8> {
    let mut key = user_prefix(user_id);
    key.extend_from_slice(suffix);
    key
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    let (value, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map_err(|e| StoreError::Deserialization(e.to_string()))?;
    Ok(value)
}

#[async_trait]
impl Store for RocksStore {
    async fn insert_notification(&self, record: &NotificationRecord) -> Result<(), StoreError> {
        let key = user_key(&record.user_id, record.id.as_bytes());
        self.put(CF_NOTIFICATIONS, &key, record)
    }

    async fn list_notifications(
        &self,
        user_id: &str,
    ) -> Result<Vec<NotificationRecord>, StoreError> {
        let mut list: Vec<NotificationRecord> =
            self.scan_prefix(CF_NOTIFICATIONS, &user_prefix(user_id))?;
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(list)
    }

    async fn mark_notification_read(
        &self,
        user_id: &str,
        id: Uuid,
    ) -> Result<Option<NotificationRecord>, StoreError> {
        let key = user_key(user_id, id.as_bytes());
        let _guard = self.lock();
        let Some(mut record) = self.get::<NotificationRecord>(CF_NOTIFICATIONS, &key)? else {
            return Ok(None);
        };
        record.read = true;
        self.put(CF_NOTIFICATIONS, &key, &record)?;
        Ok(Some(record))
    }

    async fn list_achievements(
        &self,
        user_id: &str,
    ) -> Result<Vec<AchievementRecord>, StoreError> {
        let mut list: Vec<AchievementRecord> =
            self.scan_prefix(CF_ACHIEVEMENTS, &user_prefix(user_id))?;
        list.sort_by(|a, b| a.earned_at.cmp(&b.earned_at));
        Ok(list)
    }

    async fn insert_achievement(
        &self,
        record: &AchievementRecord,
    ) -> Result<InsertOutcome, StoreError> {
        let key = user_key(&record.user_id, record.achievement_id.as_bytes());
        let cf = self.cf(CF_ACHIEVEMENTS)?;
        let _guard = self.lock();
        if self.db.get_pinned_cf(&cf, &key)?.is_some() {
            return Ok(InsertOutcome::AlreadyExists);
        }
        self.put(CF_ACHIEVEMENTS, &key, record)?;
        Ok(InsertOutcome::Inserted)
    }

    async fn activity_counts(&self, user_id: &str) -> Result<ActivityCounts, StoreError> {
        Ok(self
            .get(CF_ACTIVITY, user_id.as_bytes())?
            .unwrap_or_default())
    }

    async fn record_activity(
        &self,
        user_id: &str,
        kind: ActivityKind,
    ) -> Result<ActivityCounts, StoreError> {
        let _guard = self.lock();
        let mut counts: ActivityCounts = self
            .get(CF_ACTIVITY, user_id.as_bytes())?
            .unwrap_or_default();
        counts.bump(kind);
        self.put(CF_ACTIVITY, user_id.as_bytes(), &counts)?;
        Ok(counts)
    }

    async fn issue_certificate(
        &self,
        record: &CertificateRecord,
    ) -> Result<CertificateRecord, StoreError> {
        let owner_key = user_key(&record.user_id, record.course_id.as_bytes());
        let owners = self.cf(CF_CERTIFICATE_OWNERS)?;
        let certificates = self.cf(CF_CERTIFICATES)?;
        let _guard = self.lock();

        if let Some(id) = self.db.get_cf(&owners, &owner_key)? {
            if let Some(existing) = self.get::<CertificateRecord>(CF_CERTIFICATES, &id)? {
                return Ok(existing);
            }
        }

        // Row and owner index land together
        let mut batch = WriteBatch::default();
        batch.put_cf(&certificates, record.id.as_bytes(), encode(record)?);
        batch.put_cf(&owners, &owner_key, record.id.as_bytes());
        self.db.write_opt(batch, &self.write_opts())?;
        Ok(record.clone())
    }

    async fn get_certificate(&self, id: Uuid) -> Result<Option<CertificateRecord>, StoreError> {
        self.get(CF_CERTIFICATES, id.as_bytes())
    }

    async fn set_certificate_fingerprint(
        &self,
        id: Uuid,
        hash: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<CertificateRecord>, StoreError> {
        let _guard = self.lock();
        let Some(mut record) = self.get::<CertificateRecord>(CF_CERTIFICATES, id.as_bytes())? else {
            return Ok(None);
        };
        record.blockchain_hash = Some(hash.to_string());
        record.blockchain_timestamp = Some(at);
        self.put(CF_CERTIFICATES, id.as_bytes(), &record)?;
        Ok(Some(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::NotificationKind;
    use tempfile::TempDir;

    fn open_temp() -> (RocksStore, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = RocksStore::open(RocksStoreConfig::for_testing(dir.path())).unwrap();
        (store, dir)
    }

    fn achievement(user: &str, id: &str) -> AchievementRecord {
        AchievementRecord {
            id: Uuid::new_v4(),
            user_id: user.into(),
            achievement_id: id.into(),
            title: "Quiz Master".into(),
            description: "Completed 10 quizzes".into(),
            earned_at: Utc::now(),
        }
    }

    #[test]
    fn test_store_open() {
        let (store, dir) = open_temp();
        assert_eq!(store.path(), dir.path());
    }

    #[tokio::test]
    async fn test_notifications_scoped_by_user() {
        let (store, _dir) = open_temp();
        let mine = NotificationRecord::new("u1", "A", "a", NotificationKind::Info);
        let other = NotificationRecord::new("u10", "B", "b", NotificationKind::Info);
        store.insert_notification(&mine).await.unwrap();
        store.insert_notification(&other).await.unwrap();

        let list = store.list_notifications("u1").await.unwrap();
        assert_eq!(list, vec![mine.clone()]);

        assert!(store.mark_notification_read("u10", mine.id).await.unwrap().is_none());
        assert!(store.mark_notification_read("u1", mine.id).await.unwrap().unwrap().read);
    }

    #[tokio::test]
    async fn test_achievement_uniqueness() {
        let (store, _dir) = open_temp();
        let first = store.insert_achievement(&achievement("u1", "quiz_master")).await.unwrap();
        let second = store.insert_achievement(&achievement("u1", "quiz_master")).await.unwrap();
        assert_eq!(first, InsertOutcome::Inserted);
        assert_eq!(second, InsertOutcome::AlreadyExists);
        assert_eq!(store.list_achievements("u1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_certificate_roundtrip() {
        let (store, _dir) = open_temp();
        let cert = CertificateRecord::new("u1", "rust-101", "XYZ");
        assert_eq!(store.issue_certificate(&cert).await.unwrap(), cert);
        assert_eq!(store.get_certificate(cert.id).await.unwrap(), Some(cert.clone()));

        let at = Utc::now();
        let updated = store
            .set_certificate_fingerprint(cert.id, "abc", at)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.blockchain_hash.as_deref(), Some("abc"));
        assert_eq!(store.get_certificate(cert.id).await.unwrap(), Some(updated));
    }

    #[tokio::test]
    async fn test_certificate_issued_once_per_course() {
        let (store, _dir) = open_temp();
        let first = CertificateRecord::new("u1", "rust-101", "A");
        store.issue_certificate(&first).await.unwrap();

        let again = store
            .issue_certificate(&CertificateRecord::new("u1", "rust-101", "B"))
            .await
            .unwrap();
        assert_eq!(again, first);

        let other_course = CertificateRecord::new("u1", "rust-102", "C");
        assert_eq!(store.issue_certificate(&other_course).await.unwrap(), other_course);
        let other_user = CertificateRecord::new("u10", "rust-101", "D");
        assert_eq!(store.issue_certificate(&other_user).await.unwrap(), other_user);
    }

    #[tokio::test]
    async fn test_reopen_preserves_rows() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = RocksStore::open(RocksStoreConfig::for_testing(dir.path())).unwrap();
            store.record_activity("u1", ActivityKind::Lesson).await.unwrap();
            store.record_activity("u1", ActivityKind::Lesson).await.unwrap();
        }
        let store = RocksStore::open(RocksStoreConfig::for_testing(dir.path())).unwrap();
        assert_eq!(store.activity_counts("u1").await.unwrap().lessons_completed, 2);
    }
}
