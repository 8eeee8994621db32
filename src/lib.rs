pub mod config;
pub mod dispatch;
pub mod encryption;
pub mod error;
pub mod logging;
pub mod merkle;
pub mod read_model;
pub mod replay;
pub mod service;
pub mod snowflake;
pub mod store;
pub mod tenant;
pub mod validation;

pub use config::CoreConfig;
pub use dispatch::{EventHandler, HandlerFailure, HandlerRegistry};
pub use error::{EventError, Result};
pub use read_model::{ReadModelRecord, ReadModelStore, UpsertReadModel};
pub use replay::{Reducer, ReducerRegistry, ReplayEngine, ReplayedState, ShallowMergeReducer};
pub use service::{EventCore, AGGREGATE_CALL, AGGREGATE_CUSTOMER, AGGREGATE_TRANSACTION};
pub use snowflake::SnowflakeId;
pub use store::{AggregateMeta, AppendEvent, EventRecord, EventStore, SnapshotRecord, StoreStats};
