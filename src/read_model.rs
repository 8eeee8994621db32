use std::{sync::Arc, time::Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rocksdb::{DBWithThreadMode, Direction, IteratorMode, MultiThreaded};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    encryption::{self, Encryptor},
    error::{EventError, Result},
    snowflake::SnowflakeId,
    store::{key_with_segments, record_store_op, SEP},
};

const PREFIX_READ_MODEL: &str = "rm";

/// Denormalized projection row. `data` is replaced wholesale on every
/// upsert; `version` counts data revisions starting at 1. Deletes are
/// soft: the row keeps its history fields and stays point-readable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadModelRecord {
    pub tenant_id: String,
    pub model_type: String,
    pub model_id: String,
    pub data: Value,
    pub version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_event_id: Option<SnowflakeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_event_sequence: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub is_deleted: bool,
}

#[derive(Debug, Clone)]
pub struct UpsertReadModel {
    pub tenant_id: String,
    pub model_type: String,
    pub model_id: String,
    pub data: Value,
    pub last_event_id: Option<SnowflakeId>,
    pub last_event_sequence: Option<u64>,
}

pub struct ReadModelStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    write_lock: Mutex<()>,
    encryptor: Option<Encryptor>,
}

impl ReadModelStore {
    /// Attaches to the deployment's shared database. The `rm` key prefix
    /// keeps read model rows apart from the event streams.
    pub(crate) fn attach(
        db: Arc<DBWithThreadMode<MultiThreaded>>,
        encryptor: Option<Encryptor>,
    ) -> Self {
        Self {
            db,
            write_lock: Mutex::new(()),
            encryptor,
        }
    }

    /// Creates the row at `version` 1 or replaces `data` wholesale and
    /// bumps `version` by one. Upserting a soft-deleted row revives it.
    /// A lower `last_event_sequence` than the stored one is accepted;
    /// ordering discipline belongs to the caller.
    pub fn upsert(&self, input: UpsertReadModel) -> Result<ReadModelRecord> {
        let _guard = self.write_lock.lock();

        let UpsertReadModel {
            tenant_id,
            model_type,
            model_id,
            data,
            last_event_id,
            last_event_sequence,
        } = input;

        let now = Utc::now();
        let record = match self.load(&tenant_id, &model_type, &model_id)? {
            Some(mut current) => {
                current.data = data;
                current.version += 1;
                current.last_event_id = last_event_id;
                current.last_event_sequence = last_event_sequence;
                current.updated_at = now;
                current.is_deleted = false;
                current
            }
            None => ReadModelRecord {
                tenant_id,
                model_type,
                model_id,
                data,
                version: 1,
                last_event_id,
                last_event_sequence,
                created_at: now,
                updated_at: now,
                is_deleted: false,
            },
        };

        self.persist(&record)?;
        Ok(record)
    }

    /// Point read. Soft-deleted rows are returned with `is_deleted` set;
    /// a missing row is [`EventError::ReadModelNotFound`].
    pub fn get(&self, tenant_id: &str, model_type: &str, model_id: &str) -> Result<ReadModelRecord> {
        self.load(tenant_id, model_type, model_id)?
            .ok_or(EventError::ReadModelNotFound)
    }

    /// Live rows of one model type, ordered by `model_id`. Soft-deleted
    /// rows are skipped.
    pub fn list(
        &self,
        tenant_id: &str,
        model_type: &str,
        skip: usize,
        take: Option<usize>,
    ) -> Result<Vec<ReadModelRecord>> {
        let start = Instant::now();
        let result = (|| {
            if matches!(take, Some(0)) {
                return Ok(Vec::new());
            }

            let prefix = model_type_prefix(tenant_id, model_type);
            let iter = self
                .db
                .iterator(IteratorMode::From(prefix.as_slice(), Direction::Forward));

            let mut records = Vec::new();
            let mut skipped = 0usize;
            for item in iter {
                let (key, value) = item.map_err(|err| EventError::Storage(err.to_string()))?;
                if !key.starts_with(prefix.as_slice()) {
                    break;
                }
                let record: ReadModelRecord = serde_json::from_slice(&value)?;
                let record = self.decode_record(record)?;
                if record.is_deleted {
                    continue;
                }
                if skipped < skip {
                    skipped += 1;
                    continue;
                }
                records.push(record);
                if let Some(limit) = take {
                    if records.len() >= limit {
                        break;
                    }
                }
            }

            Ok(records)
        })();
        let duration = start.elapsed().as_secs_f64();
        record_store_op(
            "rocksdb_iter_read_models",
            if result.is_ok() { "ok" } else { "err" },
            duration,
        );
        result
    }

    /// Soft delete. The row is kept, flagged, and disappears from `list`;
    /// `version` is not bumped because `data` did not change.
    pub fn mark_deleted(
        &self,
        tenant_id: &str,
        model_type: &str,
        model_id: &str,
    ) -> Result<ReadModelRecord> {
        let _guard = self.write_lock.lock();

        let mut record = self
            .load(tenant_id, model_type, model_id)?
            .ok_or(EventError::ReadModelNotFound)?;
        record.is_deleted = true;
        record.updated_at = Utc::now();

        self.persist(&record)?;
        Ok(record)
    }

    fn load(
        &self,
        tenant_id: &str,
        model_type: &str,
        model_id: &str,
    ) -> Result<Option<ReadModelRecord>> {
        let start = Instant::now();
        let result = (|| {
            let key = model_key(tenant_id, model_type, model_id);
            let value = self
                .db
                .get(key)
                .map_err(|err| EventError::Storage(err.to_string()))?;
            match value {
                Some(value) => {
                    let record: ReadModelRecord = serde_json::from_slice(&value)?;
                    Ok(Some(self.decode_record(record)?))
                }
                None => Ok(None),
            }
        })();
        let duration = start.elapsed().as_secs_f64();
        record_store_op(
            "rocksdb_get_read_model",
            if result.is_ok() { "ok" } else { "err" },
            duration,
        );
        result
    }

    fn persist(&self, record: &ReadModelRecord) -> Result<()> {
        let stored = self.encode_record(record)?;
        let key = model_key(&record.tenant_id, &record.model_type, &record.model_id);
        let start = Instant::now();
        let result = self
            .db
            .put(key, serde_json::to_vec(&stored)?)
            .map_err(|err| EventError::Storage(err.to_string()));
        let duration = start.elapsed().as_secs_f64();
        record_store_op(
            "rocksdb_put_read_model",
            if result.is_ok() { "ok" } else { "err" },
            duration,
        );
        result
    }

    fn encode_record(&self, record: &ReadModelRecord) -> Result<ReadModelRecord> {
        if let Some(enc) = &self.encryptor {
            if encryption::extract_encrypted_value(&record.data).is_some() {
                return Ok(record.clone());
            }
            let data_bytes = serde_json::to_vec(&record.data)?;
            let ciphertext = enc.encrypt_to_string(&data_bytes)?;
            let mut stored = record.clone();
            stored.data = encryption::wrap_encrypted_value(ciphertext);
            Ok(stored)
        } else {
            Ok(record.clone())
        }
    }

    fn decode_record(&self, mut record: ReadModelRecord) -> Result<ReadModelRecord> {
        if let Some(enc) = &self.encryptor {
            if let Some(ciphertext) = encryption::extract_encrypted_value(&record.data) {
                let bytes = enc.decrypt_from_str(ciphertext)?;
                record.data = serde_json::from_slice(&bytes)?;
            }
            Ok(record)
        } else {
            if encryption::extract_encrypted_value(&record.data).is_some() {
                return Err(EventError::Config(
                    "data encryption key must be configured to read encrypted read models"
                        .to_string(),
                ));
            }
            Ok(record)
        }
    }
}

fn model_key(tenant_id: &str, model_type: &str, model_id: &str) -> Vec<u8> {
    key_with_segments(&[PREFIX_READ_MODEL, tenant_id, model_type, model_id])
}

fn model_type_prefix(tenant_id: &str, model_type: &str) -> Vec<u8> {
    let mut key = key_with_segments(&[PREFIX_READ_MODEL, tenant_id, model_type]);
    key.push(SEP);
    key
}
