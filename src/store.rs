use std::{collections::BTreeMap, path::PathBuf, sync::Arc, time::Instant};

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use parking_lot::Mutex;
use rocksdb::{DBWithThreadMode, Direction, IteratorMode, MultiThreaded, Options, WriteBatch};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    encryption::{self, Encryptor},
    error::{EventError, Result},
    merkle::{compute_merkle_root, empty_root},
    snowflake::{SnowflakeGenerator, SnowflakeId, MAX_WORKER_ID},
};

pub(crate) const SEP: u8 = 0x1F;
const PREFIX_EVENT: &str = "evt";
const PREFIX_META: &str = "meta";
const PREFIX_SNAPSHOT: &str = "snap";

pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: SnowflakeId,
    pub tenant_id: String,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    pub event_version: u32,
    pub sequence_number: u64,
    pub event_data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_metadata: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub causation_id: Option<SnowflakeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub hash: String,
    pub merkle_root: String,
}

#[derive(Debug, Clone)]
pub struct AppendEvent {
    pub tenant_id: String,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    pub event_version: Option<u32>,
    pub payload: Value,
    pub metadata: Option<Value>,
    pub causation_id: Option<SnowflakeId>,
    pub correlation_id: Option<String>,
    pub expected_sequence: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateMeta {
    pub tenant_id: String,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub last_sequence: u64,
    pub event_hashes: Vec<String>,
    pub merkle_root: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AggregateMeta {
    fn new(tenant_id: String, aggregate_type: String, aggregate_id: String) -> Self {
        let now = Utc::now();
        Self {
            tenant_id,
            aggregate_type,
            aggregate_id,
            last_sequence: 0,
            event_hashes: Vec::new(),
            merkle_root: empty_root(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Superseded snapshots are retained; retrieval picks the highest
/// `last_event_sequence`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub tenant_id: String,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub snapshot_version: u32,
    pub snapshot_data: Map<String, Value>,
    pub last_event_sequence: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_event_id: Option<SnowflakeId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
    pub aggregate_count: usize,
    pub event_count: u64,
    pub events_by_type: BTreeMap<String, u64>,
}

pub struct EventStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    write_lock: Mutex<()>,
    read_only: bool,
    encryptor: Option<Encryptor>,
    id_generator: Mutex<SnowflakeGenerator>,
}

impl EventStore {
    pub fn open(path: PathBuf, encryptor: Option<Encryptor>, worker_id: u16) -> Result<Self> {
        let mut options = Options::default();
        options.create_if_missing(true);
        let db = Arc::new(
            DBWithThreadMode::<MultiThreaded>::open(&options, path)
                .map_err(|err| EventError::Storage(err.to_string()))?,
        );

        if worker_id > MAX_WORKER_ID {
            return Err(EventError::Config(format!(
                "snowflake worker id {} exceeds maximum {}",
                worker_id, MAX_WORKER_ID
            )));
        }

        Ok(Self {
            db,
            write_lock: Mutex::new(()),
            read_only: false,
            encryptor,
            id_generator: Mutex::new(SnowflakeGenerator::new(worker_id)),
        })
    }

    pub fn open_read_only(path: PathBuf, encryptor: Option<Encryptor>) -> Result<Self> {
        let mut options = Options::default();
        options.create_if_missing(false);
        let db = Arc::new(
            DBWithThreadMode::<MultiThreaded>::open_for_read_only(&options, path, false)
                .map_err(|err| EventError::Storage(err.to_string()))?,
        );

        Ok(Self {
            db,
            write_lock: Mutex::new(()),
            read_only: true,
            encryptor,
            id_generator: Mutex::new(SnowflakeGenerator::new(0)),
        })
    }

    /// Shared handle to the deployment database. Read model rows live in
    /// the same keyspace under their own prefix.
    pub(crate) fn db_handle(&self) -> Arc<DBWithThreadMode<MultiThreaded>> {
        self.db.clone()
    }

    fn next_event_id(&self) -> SnowflakeId {
        let mut guard = self.id_generator.lock();
        guard.next_id()
    }

    /// Appends one event to its aggregate stream and commits the event row
    /// together with the updated aggregate metadata in a single batch.
    ///
    /// Sequence numbers are assigned here, under the write lock, as
    /// `last_sequence + 1`. An occupied event key or a stale
    /// `expected_sequence` fails with [`EventError::SequenceConflict`] and
    /// leaves the stream untouched.
    pub fn append(&self, input: AppendEvent) -> Result<EventRecord> {
        self.ensure_writable()?;
        let _guard = self.write_lock.lock();

        let AppendEvent {
            tenant_id,
            aggregate_type,
            aggregate_id,
            event_type,
            event_version,
            payload,
            metadata,
            causation_id,
            correlation_id,
            expected_sequence,
        } = input;

        let event_data = match payload {
            Value::Object(map) => map,
            _ => {
                return Err(EventError::Validation(
                    "event payload must be a JSON object".into(),
                ));
            }
        };

        let mut meta = match self.load_meta(&tenant_id, &aggregate_id)? {
            Some(meta) => {
                if meta.aggregate_type != aggregate_type {
                    return Err(EventError::Validation(format!(
                        "aggregate {} already exists with type {}, cannot append as {}",
                        aggregate_id, meta.aggregate_type, aggregate_type
                    )));
                }
                meta
            }
            None => AggregateMeta::new(
                tenant_id.clone(),
                aggregate_type.clone(),
                aggregate_id.clone(),
            ),
        };

        if let Some(expected) = expected_sequence {
            if meta.last_sequence != expected {
                return Err(EventError::SequenceConflict {
                    aggregate_id,
                    expected,
                    actual: meta.last_sequence,
                });
            }
        }

        let sequence_number = meta.last_sequence + 1;
        let key = event_key(&tenant_id, &aggregate_id, sequence_number);
        let occupied = self
            .db
            .get(&key)
            .map_err(|err| EventError::Storage(err.to_string()))?
            .is_some();
        if occupied {
            return Err(EventError::SequenceConflict {
                aggregate_id,
                expected: meta.last_sequence,
                actual: sequence_number,
            });
        }

        let event_id = self.next_event_id();
        let timestamp = Utc::now();
        let hash = hash_event(
            &tenant_id,
            &aggregate_id,
            sequence_number,
            &event_type,
            &payload_to_map(&event_data),
        );

        meta.event_hashes.push(hash.clone());
        meta.last_sequence = sequence_number;
        meta.merkle_root = compute_merkle_root(&meta.event_hashes);
        meta.updated_at = timestamp;

        let record = EventRecord {
            id: event_id,
            tenant_id,
            aggregate_type,
            aggregate_id,
            event_type,
            event_version: event_version.unwrap_or(1),
            sequence_number,
            event_data,
            event_metadata: metadata,
            causation_id,
            correlation_id,
            timestamp,
            hash,
            merkle_root: meta.merkle_root.clone(),
        };
        let stored_record = self.encode_record(&record)?;

        let mut batch = WriteBatch::default();
        batch_put(&mut batch, key, serde_json::to_vec(&stored_record)?)?;
        batch_put(
            &mut batch,
            meta_key(&record.tenant_id, &record.aggregate_id),
            serde_json::to_vec(&meta)?,
        )?;
        self.write_batch(batch)?;

        Ok(record)
    }

    /// Events of one aggregate in ascending sequence order. Bounds are
    /// inclusive; an unknown aggregate reads as an empty stream.
    pub fn events(
        &self,
        tenant_id: &str,
        aggregate_id: &str,
        from_sequence: Option<u64>,
        to_sequence: Option<u64>,
    ) -> Result<Vec<EventRecord>> {
        self.scan_events(
            tenant_id,
            aggregate_id,
            from_sequence.unwrap_or(1),
            to_sequence,
            None,
        )
    }

    /// Events with `sequence_number > after_sequence`, at most `limit` of
    /// them. Replay uses this to page through long streams.
    pub fn events_after(
        &self,
        tenant_id: &str,
        aggregate_id: &str,
        after_sequence: u64,
        limit: Option<usize>,
    ) -> Result<Vec<EventRecord>> {
        let start_sequence = match after_sequence.checked_add(1) {
            Some(sequence) => sequence,
            None => return Ok(Vec::new()),
        };
        self.scan_events(tenant_id, aggregate_id, start_sequence, None, limit)
    }

    fn scan_events(
        &self,
        tenant_id: &str,
        aggregate_id: &str,
        start_sequence: u64,
        to_sequence: Option<u64>,
        limit: Option<usize>,
    ) -> Result<Vec<EventRecord>> {
        let start = Instant::now();
        let result = (|| {
            if matches!(limit, Some(0)) {
                return Ok(Vec::new());
            }

            let start_key = event_key(tenant_id, aggregate_id, start_sequence);
            let prefix = event_prefix(tenant_id, aggregate_id);
            let iter = self
                .db
                .iterator(IteratorMode::From(start_key.as_slice(), Direction::Forward));

            let mut events = Vec::new();
            for item in iter {
                let (key, value) = item.map_err(|err| EventError::Storage(err.to_string()))?;
                if !key.starts_with(prefix.as_slice()) {
                    break;
                }
                if let Some(to) = to_sequence {
                    if parse_event_sequence(&key)? > to {
                        break;
                    }
                }
                let record: EventRecord = serde_json::from_slice(&value)?;
                let record = self.decode_record(record)?;
                events.push(record);
                if let Some(limit) = limit {
                    if events.len() >= limit {
                        break;
                    }
                }
            }

            Ok(events)
        })();
        let duration = start.elapsed().as_secs_f64();
        record_store_op(
            "rocksdb_iter_events",
            if result.is_ok() { "ok" } else { "err" },
            duration,
        );
        result
    }

    pub fn aggregate_meta(
        &self,
        tenant_id: &str,
        aggregate_id: &str,
    ) -> Result<Option<AggregateMeta>> {
        self.load_meta(tenant_id, aggregate_id)
    }

    pub fn list_aggregate_ids(&self, tenant_id: &str) -> Result<Vec<String>> {
        let start = Instant::now();
        let result = (|| {
            let prefix = meta_prefix(tenant_id);
            let iter = self
                .db
                .iterator(IteratorMode::From(prefix.as_slice(), Direction::Forward));

            let mut ids = Vec::new();
            for item in iter {
                let (key, value) = item.map_err(|err| EventError::Storage(err.to_string()))?;
                if !key.starts_with(prefix.as_slice()) {
                    break;
                }
                if key.len() > prefix.len() && key[prefix.len()] != SEP {
                    break;
                }
                let meta: AggregateMeta = serde_json::from_slice(&value)?;
                ids.push(meta.aggregate_id);
            }

            Ok(ids)
        })();
        let duration = start.elapsed().as_secs_f64();
        record_store_op(
            "rocksdb_iter_meta_ids",
            if result.is_ok() { "ok" } else { "err" },
            duration,
        );
        result
    }

    /// Tenant-wide totals: aggregates, events, and events per event type.
    /// Both scans stay inside the tenant's key range.
    pub fn stats(&self, tenant_id: &str) -> Result<StoreStats> {
        let aggregate_count = self.count_aggregates(tenant_id)?;
        let (event_count, events_by_type) = self.count_events_by_type(tenant_id)?;

        Ok(StoreStats {
            aggregate_count,
            event_count,
            events_by_type,
        })
    }

    fn count_aggregates(&self, tenant_id: &str) -> Result<usize> {
        let start = Instant::now();
        let result = (|| {
            let prefix = meta_prefix(tenant_id);
            let iter = self
                .db
                .iterator(IteratorMode::From(prefix.as_slice(), Direction::Forward));

            let mut aggregates = 0usize;
            for item in iter {
                let (key, _) = item.map_err(|err| EventError::Storage(err.to_string()))?;
                if !key.starts_with(prefix.as_slice()) {
                    break;
                }
                if key.len() > prefix.len() && key[prefix.len()] != SEP {
                    break;
                }
                aggregates += 1;
            }

            Ok(aggregates)
        })();
        let duration = start.elapsed().as_secs_f64();
        record_store_op(
            "rocksdb_iter_meta_count",
            if result.is_ok() { "ok" } else { "err" },
            duration,
        );
        result
    }

    fn count_events_by_type(&self, tenant_id: &str) -> Result<(u64, BTreeMap<String, u64>)> {
        let start = Instant::now();
        let result = (|| {
            let prefix = tenant_event_prefix(tenant_id);
            let iter = self
                .db
                .iterator(IteratorMode::From(prefix.as_slice(), Direction::Forward));

            let mut total = 0u64;
            let mut by_type = BTreeMap::new();
            for item in iter {
                let (key, value) = item.map_err(|err| EventError::Storage(err.to_string()))?;
                if !key.starts_with(prefix.as_slice()) {
                    break;
                }
                if key.len() > prefix.len() && key[prefix.len()] != SEP {
                    break;
                }
                // The event type column is stored in the clear, so this scan
                // never needs the encryption key.
                let record: EventRecord = serde_json::from_slice(&value)?;
                total += 1;
                *by_type.entry(record.event_type).or_insert(0u64) += 1;
            }

            Ok((total, by_type))
        })();
        let duration = start.elapsed().as_secs_f64();
        record_store_op(
            "rocksdb_iter_event_types",
            if result.is_ok() { "ok" } else { "err" },
            duration,
        );
        result
    }

    /// Recomputes every event hash in the stream and the merkle root over
    /// them, then compares against the stored aggregate metadata. Returns
    /// the verified root.
    pub fn verify(&self, tenant_id: &str, aggregate_id: &str) -> Result<String> {
        let meta = self
            .load_meta(tenant_id, aggregate_id)?
            .ok_or(EventError::AggregateNotFound)?;

        let events = self.events(tenant_id, aggregate_id, None, None)?;
        let mut hashes = Vec::with_capacity(events.len());
        for record in &events {
            let computed = hash_event(
                tenant_id,
                aggregate_id,
                record.sequence_number,
                &record.event_type,
                &payload_to_map(&record.event_data),
            );
            if computed != record.hash {
                return Err(EventError::Storage(format!(
                    "hash mismatch for aggregate {} at sequence {}",
                    aggregate_id, record.sequence_number
                )));
            }
            hashes.push(computed);
        }

        let root = compute_merkle_root(&hashes);
        if root != meta.merkle_root {
            return Err(EventError::Storage(format!(
                "merkle root mismatch for aggregate {}",
                aggregate_id
            )));
        }

        Ok(root)
    }

    pub fn put_snapshot(&self, record: &SnapshotRecord) -> Result<()> {
        self.ensure_writable()?;
        let _guard = self.write_lock.lock();

        let stored = self.encode_snapshot(record)?;
        let key = snapshot_key(
            &record.tenant_id,
            &record.aggregate_id,
            record.last_event_sequence,
        );
        self.db
            .put(key, serde_json::to_vec(&stored)?)
            .map_err(|err| EventError::Storage(err.to_string()))?;

        Ok(())
    }

    /// The snapshot with the highest `last_event_sequence`, if any.
    pub fn latest_snapshot(
        &self,
        tenant_id: &str,
        aggregate_id: &str,
    ) -> Result<Option<SnapshotRecord>> {
        Ok(self.scan_snapshots(tenant_id, aggregate_id)?.pop())
    }

    /// All snapshots of one aggregate, newest first.
    pub fn snapshots(&self, tenant_id: &str, aggregate_id: &str) -> Result<Vec<SnapshotRecord>> {
        let mut snapshots = self.scan_snapshots(tenant_id, aggregate_id)?;
        snapshots.reverse();
        Ok(snapshots)
    }

    fn scan_snapshots(&self, tenant_id: &str, aggregate_id: &str) -> Result<Vec<SnapshotRecord>> {
        let start = Instant::now();
        let result = (|| {
            let prefix = snapshot_prefix(tenant_id, aggregate_id);
            let iter = self
                .db
                .iterator(IteratorMode::From(prefix.as_slice(), Direction::Forward));

            let mut snapshots = Vec::new();
            for item in iter {
                let (key, value) = item.map_err(|err| EventError::Storage(err.to_string()))?;
                if !key.starts_with(prefix.as_slice()) {
                    break;
                }
                let record: SnapshotRecord = serde_json::from_slice(&value)?;
                snapshots.push(self.decode_snapshot(record)?);
            }

            Ok(snapshots)
        })();
        let duration = start.elapsed().as_secs_f64();
        record_store_op(
            "rocksdb_iter_snapshots",
            if result.is_ok() { "ok" } else { "err" },
            duration,
        );
        result
    }

    fn load_meta(&self, tenant_id: &str, aggregate_id: &str) -> Result<Option<AggregateMeta>> {
        let start = Instant::now();
        let result = (|| {
            let key = meta_key(tenant_id, aggregate_id);
            let value = self
                .db
                .get(key)
                .map_err(|err| EventError::Storage(err.to_string()))?;
            if let Some(value) = value {
                Ok(Some(serde_json::from_slice(&value)?))
            } else {
                Ok(None)
            }
        })();
        let duration = start.elapsed().as_secs_f64();
        record_store_op(
            "rocksdb_get_meta",
            if result.is_ok() { "ok" } else { "err" },
            duration,
        );
        result
    }

    fn encode_record(&self, record: &EventRecord) -> Result<EventRecord> {
        if let Some(enc) = &self.encryptor {
            if encryption::extract_encrypted_map(&record.event_data).is_some() {
                return Ok(record.clone());
            }
            let payload_bytes = serde_json::to_vec(&record.event_data)?;
            let ciphertext = enc.encrypt_to_string(&payload_bytes)?;
            let mut stored = record.clone();
            stored.event_data = encryption::wrap_encrypted_map(ciphertext);
            Ok(stored)
        } else {
            Ok(record.clone())
        }
    }

    fn decode_record(&self, mut record: EventRecord) -> Result<EventRecord> {
        if let Some(enc) = &self.encryptor {
            if let Some(ciphertext) = encryption::extract_encrypted_map(&record.event_data) {
                let bytes = enc.decrypt_from_str(ciphertext)?;
                record.event_data = serde_json::from_slice(&bytes)?;
            }
            Ok(record)
        } else {
            if encryption::extract_encrypted_map(&record.event_data).is_some() {
                return Err(EventError::Config(
                    "data encryption key must be configured to read encrypted events".to_string(),
                ));
            }
            Ok(record)
        }
    }

    fn encode_snapshot(&self, record: &SnapshotRecord) -> Result<SnapshotRecord> {
        if let Some(enc) = &self.encryptor {
            if encryption::extract_encrypted_map(&record.snapshot_data).is_some() {
                return Ok(record.clone());
            }
            let state_bytes = serde_json::to_vec(&record.snapshot_data)?;
            let ciphertext = enc.encrypt_to_string(&state_bytes)?;
            let mut stored = record.clone();
            stored.snapshot_data = encryption::wrap_encrypted_map(ciphertext);
            Ok(stored)
        } else {
            Ok(record.clone())
        }
    }

    fn decode_snapshot(&self, mut record: SnapshotRecord) -> Result<SnapshotRecord> {
        if let Some(enc) = &self.encryptor {
            if let Some(ciphertext) = encryption::extract_encrypted_map(&record.snapshot_data) {
                let bytes = enc.decrypt_from_str(ciphertext)?;
                record.snapshot_data = serde_json::from_slice(&bytes)?;
            }
            Ok(record)
        } else {
            if encryption::extract_encrypted_map(&record.snapshot_data).is_some() {
                return Err(EventError::Config(
                    "data encryption key must be configured to read encrypted snapshots"
                        .to_string(),
                ));
            }
            Ok(record)
        }
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.read_only {
            Err(EventError::Storage(
                "event store opened in read-only mode".into(),
            ))
        } else {
            Ok(())
        }
    }

    fn write_batch(&self, batch: WriteBatch) -> Result<()> {
        let start = Instant::now();
        let result = self
            .db
            .write(batch)
            .map_err(|err| EventError::Storage(err.to_string()));
        let duration = start.elapsed().as_secs_f64();
        record_store_op(
            "rocksdb_write",
            if result.is_ok() { "ok" } else { "err" },
            duration,
        );
        result
    }
}

fn batch_put(batch: &mut WriteBatch, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
    batch.put(key, value);
    Ok(())
}

fn meta_key(tenant_id: &str, aggregate_id: &str) -> Vec<u8> {
    key_with_segments(&[PREFIX_META, tenant_id, aggregate_id])
}

fn meta_prefix(tenant_id: &str) -> Vec<u8> {
    key_with_segments(&[PREFIX_META, tenant_id])
}

fn event_prefix(tenant_id: &str, aggregate_id: &str) -> Vec<u8> {
    let mut key = key_with_segments(&[PREFIX_EVENT, tenant_id, aggregate_id]);
    key.push(SEP);
    key
}

fn tenant_event_prefix(tenant_id: &str) -> Vec<u8> {
    key_with_segments(&[PREFIX_EVENT, tenant_id])
}

fn event_key(tenant_id: &str, aggregate_id: &str, sequence: u64) -> Vec<u8> {
    let mut key = event_prefix(tenant_id, aggregate_id);
    key.extend_from_slice(&sequence.to_be_bytes());
    key
}

fn snapshot_prefix(tenant_id: &str, aggregate_id: &str) -> Vec<u8> {
    let mut key = key_with_segments(&[PREFIX_SNAPSHOT, tenant_id, aggregate_id]);
    key.push(SEP);
    key
}

fn snapshot_key(tenant_id: &str, aggregate_id: &str, last_event_sequence: u64) -> Vec<u8> {
    let mut key = snapshot_prefix(tenant_id, aggregate_id);
    key.extend_from_slice(&last_event_sequence.to_be_bytes());
    key
}

fn parse_event_sequence(key: &[u8]) -> Result<u64> {
    if key.len() < 8 {
        return Err(EventError::Storage("event key too short".into()));
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&key[key.len() - 8..]);
    Ok(u64::from_be_bytes(buf))
}

pub(crate) fn key_with_segments(parts: &[&str]) -> Vec<u8> {
    let mut key = Vec::new();
    let mut iter = parts.iter();
    if let Some(first) = iter.next() {
        key.extend_from_slice(first.as_bytes());
    }
    for part in iter {
        key.push(SEP);
        key.extend_from_slice(part.as_bytes());
    }
    key
}

pub(crate) fn record_store_op(operation: &'static str, status: &'static str, duration: f64) {
    let labels = [("operation", operation), ("status", status)];
    counter!("callvault_store_operations_total", &labels).increment(1);
    histogram!("callvault_store_operation_duration_seconds", &labels).record(duration);
}

fn hash_event(
    tenant_id: &str,
    aggregate_id: &str,
    sequence: u64,
    event_type: &str,
    payload: &BTreeMap<String, String>,
) -> String {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(tenant_id.as_bytes());
    hasher.update(aggregate_id.as_bytes());
    hasher.update(sequence.to_be_bytes());
    hasher.update(event_type.as_bytes());

    for (key, value) in payload {
        hasher.update(key.as_bytes());
        hasher.update(value.as_bytes());
    }

    hex::encode(hasher.finalize())
}

fn payload_to_map(data: &Map<String, Value>) -> BTreeMap<String, String> {
    fn normalize(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            _ => value.to_string(),
        }
    }

    data.iter()
        .map(|(k, v)| (k.clone(), normalize(v)))
        .collect::<BTreeMap<_, _>>()
}
