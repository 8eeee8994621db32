use std::sync::Arc;

use tracing::warn;

use crate::{
    config::CoreConfig,
    dispatch::HandlerRegistry,
    error::Result,
    read_model::{ReadModelRecord, ReadModelStore, UpsertReadModel},
    replay::{ReducerRegistry, ReplayEngine, ReplayedState},
    store::{
        AggregateMeta, AppendEvent, EventRecord, EventStore, SnapshotRecord, StoreStats,
    },
    tenant::normalize_tenant_id,
    validation::{
        ensure_aggregate_id, ensure_event_type, ensure_metadata_object, ensure_model_id,
        ensure_payload_object, ensure_read_model_data, ensure_snake_case,
    },
};

pub const AGGREGATE_CALL: &str = "call";
pub const AGGREGATE_CUSTOMER: &str = "customer";
pub const AGGREGATE_TRANSACTION: &str = "transaction";

/// Owning façade over the event log, snapshot store, replay engine, read
/// model store and handler registry. Construction wires everything from
/// one [`CoreConfig`]; registries are injected so callers control which
/// handlers and reducers exist per instance.
pub struct EventCore {
    store: Arc<EventStore>,
    read_models: ReadModelStore,
    replay_engine: ReplayEngine,
    handlers: HandlerRegistry,
    snapshot_frequency: u64,
    list_page_size: usize,
    page_limit: usize,
}

impl EventCore {
    pub fn open(
        config: &CoreConfig,
        handlers: HandlerRegistry,
        reducers: ReducerRegistry,
    ) -> Result<Self> {
        config.validate()?;
        config.ensure_data_dir()?;
        let encryptor = config.encryptor()?;

        let store = Arc::new(EventStore::open(
            config.event_store_path(),
            encryptor.clone(),
            config.snowflake_worker_id,
        )?);
        let read_models = ReadModelStore::attach(store.db_handle(), encryptor);
        let replay_engine = ReplayEngine::new(store.clone(), reducers);

        Ok(Self {
            store,
            read_models,
            replay_engine,
            handlers,
            snapshot_frequency: config.snapshot_frequency,
            list_page_size: config.list_page_size,
            page_limit: config.page_limit,
        })
    }

    /// Validates, appends, dispatches handlers, and snapshots on the
    /// configured cadence. Validation failures reject the input before
    /// anything is persisted; handler failures and snapshot failures are
    /// logged and never unwind the committed event.
    pub fn append_event(&self, mut input: AppendEvent) -> Result<EventRecord> {
        input.tenant_id = normalize_tenant_id(&input.tenant_id)?;
        ensure_snake_case("aggregate_type", &input.aggregate_type)?;
        ensure_aggregate_id(&input.aggregate_id)?;
        ensure_event_type(&input.event_type)?;
        ensure_payload_object(&input.payload)?;
        if let Some(metadata) = input.metadata.as_ref() {
            ensure_metadata_object(metadata)?;
        }

        let record = self.store.append(input)?;

        let failures = self.handlers.dispatch(&record);
        if !failures.is_empty() {
            warn!(
                event_id = %record.id,
                event_type = %record.event_type,
                failed_handlers = failures.len(),
                "event committed with handler failures"
            );
        }

        self.maybe_snapshot(&record);
        Ok(record)
    }

    pub fn append_call_event(&self, mut input: AppendEvent) -> Result<EventRecord> {
        input.aggregate_type = AGGREGATE_CALL.into();
        self.append_event(input)
    }

    pub fn append_customer_event(&self, mut input: AppendEvent) -> Result<EventRecord> {
        input.aggregate_type = AGGREGATE_CUSTOMER.into();
        self.append_event(input)
    }

    pub fn append_transaction_event(&self, mut input: AppendEvent) -> Result<EventRecord> {
        input.aggregate_type = AGGREGATE_TRANSACTION.into();
        self.append_event(input)
    }

    fn maybe_snapshot(&self, record: &EventRecord) {
        if self.snapshot_frequency == 0 || record.sequence_number % self.snapshot_frequency != 0 {
            return;
        }
        if let Err(err) = self.replay_engine.snapshot(
            &record.tenant_id,
            &record.aggregate_type,
            &record.aggregate_id,
        ) {
            warn!(
                aggregate_id = %record.aggregate_id,
                sequence = record.sequence_number,
                "automatic snapshot failed: {err}"
            );
        }
    }

    pub fn events(
        &self,
        tenant_id: &str,
        aggregate_id: &str,
        from_sequence: Option<u64>,
        to_sequence: Option<u64>,
    ) -> Result<Vec<EventRecord>> {
        let tenant_id = normalize_tenant_id(tenant_id)?;
        self.store
            .events(&tenant_id, aggregate_id, from_sequence, to_sequence)
    }

    pub fn replay(
        &self,
        tenant_id: &str,
        aggregate_type: &str,
        aggregate_id: &str,
    ) -> Result<ReplayedState> {
        let tenant_id = normalize_tenant_id(tenant_id)?;
        self.replay_engine
            .replay(&tenant_id, aggregate_type, aggregate_id)
    }

    pub fn replay_full(
        &self,
        tenant_id: &str,
        aggregate_type: &str,
        aggregate_id: &str,
    ) -> Result<ReplayedState> {
        let tenant_id = normalize_tenant_id(tenant_id)?;
        self.replay_engine
            .replay_full(&tenant_id, aggregate_type, aggregate_id)
    }

    pub fn create_snapshot(
        &self,
        tenant_id: &str,
        aggregate_type: &str,
        aggregate_id: &str,
    ) -> Result<SnapshotRecord> {
        let tenant_id = normalize_tenant_id(tenant_id)?;
        self.replay_engine
            .snapshot(&tenant_id, aggregate_type, aggregate_id)
    }

    pub fn latest_snapshot(
        &self,
        tenant_id: &str,
        aggregate_id: &str,
    ) -> Result<Option<SnapshotRecord>> {
        let tenant_id = normalize_tenant_id(tenant_id)?;
        self.store.latest_snapshot(&tenant_id, aggregate_id)
    }

    pub fn snapshots(&self, tenant_id: &str, aggregate_id: &str) -> Result<Vec<SnapshotRecord>> {
        let tenant_id = normalize_tenant_id(tenant_id)?;
        self.store.snapshots(&tenant_id, aggregate_id)
    }

    pub fn update_read_model(&self, mut input: UpsertReadModel) -> Result<ReadModelRecord> {
        input.tenant_id = normalize_tenant_id(&input.tenant_id)?;
        ensure_snake_case("model_type", &input.model_type)?;
        ensure_model_id(&input.model_id)?;
        ensure_read_model_data(&input.data)?;
        self.read_models.upsert(input)
    }

    pub fn read_model(
        &self,
        tenant_id: &str,
        model_type: &str,
        model_id: &str,
    ) -> Result<ReadModelRecord> {
        let tenant_id = normalize_tenant_id(tenant_id)?;
        self.read_models.get(&tenant_id, model_type, model_id)
    }

    /// Live rows of one model type. `take` defaults to the configured page
    /// size and is capped by the configured page limit.
    pub fn read_models(
        &self,
        tenant_id: &str,
        model_type: &str,
        skip: usize,
        take: Option<usize>,
    ) -> Result<Vec<ReadModelRecord>> {
        let tenant_id = normalize_tenant_id(tenant_id)?;
        let take = take.unwrap_or(self.list_page_size).min(self.page_limit);
        self.read_models.list(&tenant_id, model_type, skip, Some(take))
    }

    pub fn delete_read_model(
        &self,
        tenant_id: &str,
        model_type: &str,
        model_id: &str,
    ) -> Result<ReadModelRecord> {
        let tenant_id = normalize_tenant_id(tenant_id)?;
        self.read_models.mark_deleted(&tenant_id, model_type, model_id)
    }

    pub fn aggregate_meta(
        &self,
        tenant_id: &str,
        aggregate_id: &str,
    ) -> Result<Option<AggregateMeta>> {
        let tenant_id = normalize_tenant_id(tenant_id)?;
        self.store.aggregate_meta(&tenant_id, aggregate_id)
    }

    pub fn list_aggregates(&self, tenant_id: &str) -> Result<Vec<String>> {
        let tenant_id = normalize_tenant_id(tenant_id)?;
        self.store.list_aggregate_ids(&tenant_id)
    }

    pub fn stats(&self, tenant_id: &str) -> Result<StoreStats> {
        let tenant_id = normalize_tenant_id(tenant_id)?;
        self.store.stats(&tenant_id)
    }

    pub fn verify(&self, tenant_id: &str, aggregate_id: &str) -> Result<String> {
        let tenant_id = normalize_tenant_id(tenant_id)?;
        self.store.verify(&tenant_id, aggregate_id)
    }
}
