use std::{collections::HashMap, sync::Arc};

use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::{
    error::{EventError, Result},
    snowflake::SnowflakeId,
    store::{EventRecord, EventStore, SnapshotRecord, SNAPSHOT_FORMAT_VERSION},
};

const REPLAY_BATCH: usize = 512;

/// Folds one event into the running aggregate state. Implementations must
/// be deterministic: snapshot-seeded and full replays of the same stream
/// go through the same reducer and have to agree.
pub trait Reducer: Send + Sync {
    fn name(&self) -> &str;
    fn fold(&self, state: &mut Map<String, Value>, event: &EventRecord);
}

/// Default fold policy: later events overwrite earlier values of the same
/// top-level key, untouched keys survive.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShallowMergeReducer;

impl Reducer for ShallowMergeReducer {
    fn name(&self) -> &str {
        "shallow_merge"
    }

    fn fold(&self, state: &mut Map<String, Value>, event: &EventRecord) {
        for (key, value) in &event.event_data {
            state.insert(key.clone(), value.clone());
        }
    }
}

pub struct ReducerRegistry {
    reducers: HashMap<String, Arc<dyn Reducer>>,
    fallback: Arc<dyn Reducer>,
}

impl Default for ReducerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ReducerRegistry {
    pub fn new() -> Self {
        Self {
            reducers: HashMap::new(),
            fallback: Arc::new(ShallowMergeReducer),
        }
    }

    pub fn register(&mut self, aggregate_type: impl Into<String>, reducer: Arc<dyn Reducer>) {
        self.reducers.insert(aggregate_type.into(), reducer);
    }

    pub fn reducer_for(&self, aggregate_type: &str) -> &Arc<dyn Reducer> {
        self.reducers.get(aggregate_type).unwrap_or(&self.fallback)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplayedState {
    pub tenant_id: String,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub data: Map<String, Value>,
    pub last_sequence: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_event_id: Option<SnowflakeId>,
}

impl ReplayedState {
    fn empty(tenant_id: &str, aggregate_type: &str, aggregate_id: &str) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            aggregate_type: aggregate_type.to_string(),
            aggregate_id: aggregate_id.to_string(),
            data: Map::new(),
            last_sequence: 0,
            last_event_id: None,
        }
    }
}

/// Single authority for fold semantics. Snapshot creation and state reads
/// both come through here, so the two can never drift apart.
pub struct ReplayEngine {
    store: Arc<EventStore>,
    reducers: ReducerRegistry,
}

impl ReplayEngine {
    pub fn new(store: Arc<EventStore>, reducers: ReducerRegistry) -> Self {
        Self { store, reducers }
    }

    /// Rebuilds aggregate state, seeded from the latest snapshot when one
    /// exists, then folding every event past it. An aggregate with no
    /// events and no snapshot replays to the empty state at sequence 0.
    pub fn replay(
        &self,
        tenant_id: &str,
        aggregate_type: &str,
        aggregate_id: &str,
    ) -> Result<ReplayedState> {
        let seed = match self.store.latest_snapshot(tenant_id, aggregate_id)? {
            Some(snapshot) => {
                if snapshot.aggregate_type != aggregate_type {
                    return Err(EventError::Validation(format!(
                        "aggregate {} belongs to type {}, not {}",
                        aggregate_id, snapshot.aggregate_type, aggregate_type
                    )));
                }
                ReplayedState {
                    tenant_id: tenant_id.to_string(),
                    aggregate_type: aggregate_type.to_string(),
                    aggregate_id: aggregate_id.to_string(),
                    data: snapshot.snapshot_data,
                    last_sequence: snapshot.last_event_sequence,
                    last_event_id: snapshot.last_event_id,
                }
            }
            None => ReplayedState::empty(tenant_id, aggregate_type, aggregate_id),
        };
        self.fold_tail(seed)
    }

    /// Rebuilds aggregate state from sequence 1, ignoring snapshots.
    pub fn replay_full(
        &self,
        tenant_id: &str,
        aggregate_type: &str,
        aggregate_id: &str,
    ) -> Result<ReplayedState> {
        self.fold_tail(ReplayedState::empty(tenant_id, aggregate_type, aggregate_id))
    }

    fn fold_tail(&self, mut state: ReplayedState) -> Result<ReplayedState> {
        let reducer = self.reducers.reducer_for(&state.aggregate_type);
        loop {
            let batch = self.store.events_after(
                &state.tenant_id,
                &state.aggregate_id,
                state.last_sequence,
                Some(REPLAY_BATCH),
            )?;
            if batch.is_empty() {
                break;
            }
            for event in &batch {
                if event.aggregate_type != state.aggregate_type {
                    return Err(EventError::Validation(format!(
                        "aggregate {} belongs to type {}, not {}",
                        state.aggregate_id, event.aggregate_type, state.aggregate_type
                    )));
                }
                reducer.fold(&mut state.data, event);
                state.last_sequence = event.sequence_number;
                state.last_event_id = Some(event.id);
            }
            if batch.len() < REPLAY_BATCH {
                break;
            }
        }
        Ok(state)
    }

    /// Folds current state and persists it as a snapshot. The stored
    /// `last_event_sequence`/`last_event_id` are the fold's own tail
    /// bookkeeping, never recomputed from the log.
    pub fn snapshot(
        &self,
        tenant_id: &str,
        aggregate_type: &str,
        aggregate_id: &str,
    ) -> Result<SnapshotRecord> {
        let state = self.replay(tenant_id, aggregate_type, aggregate_id)?;
        if state.last_sequence == 0 {
            return Err(EventError::AggregateNotFound);
        }

        let record = SnapshotRecord {
            tenant_id: state.tenant_id,
            aggregate_type: state.aggregate_type,
            aggregate_id: state.aggregate_id,
            snapshot_version: SNAPSHOT_FORMAT_VERSION,
            snapshot_data: state.data,
            last_event_sequence: state.last_sequence,
            last_event_id: state.last_event_id,
            created_at: Utc::now(),
        };
        self.store.put_snapshot(&record)?;
        debug!(
            tenant_id = %record.tenant_id,
            aggregate_id = %record.aggregate_id,
            last_event_sequence = record.last_event_sequence,
            "snapshot persisted"
        );
        Ok(record)
    }
}
