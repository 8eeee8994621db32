use std::{collections::HashMap, sync::Arc};

use metrics::counter;
use tracing::error;

use crate::{error::Result, snowflake::SnowflakeId, store::EventRecord};

/// Side-effect hook invoked after an event has been committed. Handlers
/// run on the appending thread and must not assume exactly-once delivery
/// across process restarts.
pub trait EventHandler: Send + Sync {
    fn name(&self) -> &str;
    fn handle(&self, record: &EventRecord) -> Result<()>;
}

/// One handler invocation that returned an error. Failures are reported
/// as values; the append they follow has already been committed and is
/// never rolled back.
#[derive(Debug, Clone)]
pub struct HandlerFailure {
    pub handler: String,
    pub event_id: SnowflakeId,
    pub event_type: String,
    pub message: String,
}

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Vec<Arc<dyn EventHandler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registers a handler for one event type. Handlers for the same type
    /// run in registration order.
    pub fn register(&mut self, event_type: impl Into<String>, handler: Arc<dyn EventHandler>) {
        self.handlers
            .entry(event_type.into())
            .or_default()
            .push(handler);
    }

    pub fn handler_count(&self, event_type: &str) -> usize {
        self.handlers.get(event_type).map_or(0, Vec::len)
    }

    /// Invokes every handler registered for the record's event type. A
    /// failing handler is logged and counted, and the remaining handlers
    /// still run.
    pub fn dispatch(&self, record: &EventRecord) -> Vec<HandlerFailure> {
        let Some(handlers) = self.handlers.get(&record.event_type) else {
            return Vec::new();
        };

        let mut failures = Vec::new();
        for handler in handlers {
            if let Err(err) = handler.handle(record) {
                error!(
                    handler = handler.name(),
                    event_type = %record.event_type,
                    event_id = %record.id,
                    "event handler failed: {err}"
                );
                counter!(
                    "callvault_handler_failures_total",
                    "handler" => handler.name().to_string(),
                    "event_type" => record.event_type.clone()
                )
                .increment(1);
                failures.push(HandlerFailure {
                    handler: handler.name().to_string(),
                    event_id: record.id,
                    event_type: record.event_type.clone(),
                    message: err.to_string(),
                });
            }
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use parking_lot::Mutex;
    use serde_json::Map;

    use crate::error::EventError;

    struct RecordingHandler {
        label: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    impl EventHandler for RecordingHandler {
        fn name(&self) -> &str {
            self.label
        }

        fn handle(&self, record: &EventRecord) -> Result<()> {
            self.log
                .lock()
                .push(format!("{}:{}", self.label, record.event_type));
            if self.fail {
                Err(EventError::Validation("handler refused".into()))
            } else {
                Ok(())
            }
        }
    }

    fn sample_record(event_type: &str) -> EventRecord {
        EventRecord {
            id: SnowflakeId::from_u64(42),
            tenant_id: "acme".into(),
            aggregate_type: "call".into(),
            aggregate_id: "call-1".into(),
            event_type: event_type.into(),
            event_version: 1,
            sequence_number: 1,
            event_data: Map::new(),
            event_metadata: None,
            causation_id: None,
            correlation_id: None,
            timestamp: Utc::now(),
            hash: String::new(),
            merkle_root: String::new(),
        }
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HandlerRegistry::new();
        for label in ["first", "second", "third"] {
            registry.register(
                "call.initiated",
                Arc::new(RecordingHandler {
                    label,
                    log: log.clone(),
                    fail: false,
                }),
            );
        }

        let failures = registry.dispatch(&sample_record("call.initiated"));
        assert!(failures.is_empty());
        assert_eq!(
            log.lock().as_slice(),
            [
                "first:call.initiated",
                "second:call.initiated",
                "third:call.initiated"
            ]
        );
    }

    #[test]
    fn failing_handler_does_not_stop_the_rest() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HandlerRegistry::new();
        registry.register(
            "call.ended",
            Arc::new(RecordingHandler {
                label: "broken",
                log: log.clone(),
                fail: true,
            }),
        );
        registry.register(
            "call.ended",
            Arc::new(RecordingHandler {
                label: "billing",
                log: log.clone(),
                fail: false,
            }),
        );

        let failures = registry.dispatch(&sample_record("call.ended"));
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].handler, "broken");
        assert_eq!(failures[0].event_type, "call.ended");
        assert!(failures[0].message.contains("handler refused"));
        assert_eq!(log.lock().len(), 2);
    }

    #[test]
    fn handlers_only_fire_for_their_event_type() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HandlerRegistry::new();
        registry.register(
            "call.initiated",
            Arc::new(RecordingHandler {
                label: "first",
                log: log.clone(),
                fail: false,
            }),
        );

        let failures = registry.dispatch(&sample_record("call.ended"));
        assert!(failures.is_empty());
        assert!(log.lock().is_empty());
        assert_eq!(registry.handler_count("call.initiated"), 1);
        assert_eq!(registry.handler_count("call.ended"), 0);
    }
}
