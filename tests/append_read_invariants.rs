use anyhow::{Context, Result};
use callvault::{
    AppendEvent, CoreConfig, EventCore, EventError, HandlerRegistry, ReducerRegistry,
};
use serde_json::{Value, json};
use tempfile::TempDir;

fn open_core(dir: &TempDir) -> Result<EventCore> {
    let config = CoreConfig {
        data_dir: dir.path().to_path_buf(),
        ..CoreConfig::default()
    };
    let core = EventCore::open(&config, HandlerRegistry::new(), ReducerRegistry::new())
        .context("failed to open event core")?;
    Ok(core)
}

fn call_event(aggregate_id: &str, event_type: &str, payload: Value) -> AppendEvent {
    AppendEvent {
        tenant_id: "acme".into(),
        aggregate_type: "call".into(),
        aggregate_id: aggregate_id.into(),
        event_type: event_type.into(),
        event_version: None,
        payload,
        metadata: None,
        causation_id: None,
        correlation_id: None,
        expected_sequence: None,
    }
}

#[test]
fn appended_events_read_back_in_order() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let core = open_core(&dir)?;

    let first = core.append_event(call_event(
        "call-100",
        "call.initiated",
        json!({ "caller": "+15550100", "status": "ringing" }),
    ))?;

    let mut second = call_event("call-100", "call.connected", json!({ "status": "connected" }));
    second.metadata = Some(json!({ "ingest_node": "pbx-3" }));
    second.causation_id = Some(first.id);
    second.correlation_id = Some("corr-7".into());
    let second = core.append_event(second)?;

    let third = core.append_event(call_event(
        "call-100",
        "call.ended",
        json!({ "status": "completed", "duration": 300 }),
    ))?;

    assert_eq!(first.sequence_number, 1);
    assert_eq!(second.sequence_number, 2);
    assert_eq!(third.sequence_number, 3);

    let events = core.events("acme", "call-100", None, None)?;
    assert_eq!(
        events.iter().map(|e| e.sequence_number).collect::<Vec<_>>(),
        [1, 2, 3]
    );
    assert_eq!(events[1].event_metadata, Some(json!({ "ingest_node": "pbx-3" })));
    assert_eq!(events[1].causation_id, Some(first.id));
    assert_eq!(events[1].correlation_id.as_deref(), Some("corr-7"));

    let middle = core.events("acme", "call-100", Some(2), Some(2))?;
    assert_eq!(middle.len(), 1);
    assert_eq!(middle[0].event_type, "call.connected");

    let tail = core.events("acme", "call-100", Some(2), None)?;
    assert_eq!(
        tail.iter().map(|e| e.sequence_number).collect::<Vec<_>>(),
        [2, 3]
    );

    Ok(())
}

#[test]
fn stored_records_come_back_verbatim() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let core = open_core(&dir)?;

    let written = core.append_event(call_event(
        "call-200",
        "call.initiated",
        json!({ "caller": "+15550100" }),
    ))?;
    core.append_event(call_event("call-200", "call.ended", json!({ "duration": 45 })))?;

    let events = core.events("acme", "call-200", Some(1), Some(1))?;
    let stored = &events[0];
    assert_eq!(stored.id, written.id);
    assert_eq!(stored.hash, written.hash);
    assert_eq!(stored.timestamp, written.timestamp);
    assert_eq!(stored.event_data, written.event_data);
    assert_eq!(stored.merkle_root, written.merkle_root);

    Ok(())
}

#[test]
fn mutated_return_values_leave_the_log_untouched() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let core = open_core(&dir)?;

    let mut written = core.append_event(call_event(
        "call-250",
        "call.initiated",
        json!({ "caller": "+15550100", "status": "ringing" }),
    ))?;
    let original = written.clone();

    written.event_data.insert("status".into(), json!("hijacked"));
    written.event_data.insert("injected".into(), json!(true));
    written.event_type = "call.rewritten".into();
    written.hash = "0".repeat(64);
    written.sequence_number = 99;

    let mut fetched = core.events("acme", "call-250", None, None)?;
    assert_eq!(fetched.len(), 1);
    assert_eq!(fetched[0].event_data, original.event_data);
    assert_eq!(fetched[0].event_type, original.event_type);
    assert_eq!(fetched[0].hash, original.hash);
    assert_eq!(fetched[0].sequence_number, 1);

    fetched[0].event_data.insert("status".into(), json!("redacted"));
    fetched[0].sequence_number = 7;

    let reread = core.events("acme", "call-250", None, None)?;
    assert_eq!(reread[0].event_data, original.event_data);
    assert_eq!(reread[0].sequence_number, 1);
    assert_eq!(core.verify("acme", "call-250")?, original.merkle_root);

    Ok(())
}

#[test]
fn stale_writers_get_retryable_conflicts() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let core = open_core(&dir)?;

    let mut input = call_event("call-300", "call.initiated", json!({ "status": "ringing" }));
    input.expected_sequence = Some(0);
    core.append_event(input)?;

    let mut stale = call_event("call-300", "call.connected", json!({ "status": "connected" }));
    stale.expected_sequence = Some(0);
    let err = core.append_event(stale.clone()).unwrap_err();
    assert!(matches!(
        err,
        EventError::SequenceConflict {
            expected: 0,
            actual: 1,
            ..
        }
    ));
    assert!(err.is_retryable());

    stale.expected_sequence = Some(1);
    let retried = core.append_event(stale)?;
    assert_eq!(retried.sequence_number, 2);

    let events = core.events("acme", "call-300", None, None)?;
    assert_eq!(events.len(), 2);

    Ok(())
}

#[test]
fn rejected_inputs_leave_the_log_untouched() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let core = open_core(&dir)?;

    let bad_type = core
        .append_event(call_event("call-400", "CallInitiated", json!({})))
        .unwrap_err();
    assert!(matches!(bad_type, EventError::Validation(_)));
    assert!(!bad_type.is_retryable());

    let bad_payload = core
        .append_event(call_event("call-400", "call.initiated", json!([1, 2])))
        .unwrap_err();
    assert!(matches!(bad_payload, EventError::Validation(_)));

    let bad_tenant = core
        .append_event(AppendEvent {
            tenant_id: "   ".into(),
            ..call_event("call-400", "call.initiated", json!({}))
        })
        .unwrap_err();
    assert!(matches!(bad_tenant, EventError::Validation(_)));

    assert!(core.events("acme", "call-400", None, None)?.is_empty());
    assert!(core.aggregate_meta("acme", "call-400")?.is_none());
    assert_eq!(core.stats("acme")?.event_count, 0);

    Ok(())
}

#[test]
fn snapshot_cadence_writes_one_snapshot_per_boundary() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = CoreConfig {
        data_dir: dir.path().to_path_buf(),
        snapshot_frequency: 10,
        ..CoreConfig::default()
    };
    let core = EventCore::open(&config, HandlerRegistry::new(), ReducerRegistry::new())?;

    for step in 1..=10u64 {
        core.append_event(call_event(
            "call-600",
            "call.updated",
            json!({ "step": step }),
        ))?;
    }

    let snapshots = core.snapshots("acme", "call-600")?;
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].last_event_sequence, 10);

    for step in 11..=15u64 {
        core.append_event(call_event(
            "call-600",
            "call.updated",
            json!({ "step": step }),
        ))?;
    }

    let state = core.replay("acme", "call", "call-600")?;
    assert_eq!(state.last_sequence, 15);
    assert_eq!(state.data["step"], 15);
    assert_eq!(core.snapshots("acme", "call-600")?.len(), 1);

    Ok(())
}

#[test]
fn reopened_stores_preserve_history() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = CoreConfig {
        data_dir: dir.path().to_path_buf(),
        ..CoreConfig::default()
    };

    {
        let core = EventCore::open(&config, HandlerRegistry::new(), ReducerRegistry::new())?;
        for event_type in ["call.initiated", "call.connected", "call.ended"] {
            core.append_event(call_event(
                "call-500",
                event_type,
                json!({ "at": event_type }),
            ))?;
        }
        core.create_snapshot("acme", "call", "call-500")?;
    }

    let core = EventCore::open(&config, HandlerRegistry::new(), ReducerRegistry::new())?;
    let events = core.events("acme", "call-500", None, None)?;
    assert_eq!(events.len(), 3);
    assert_eq!(events[2].event_type, "call.ended");

    let snapshot = core
        .latest_snapshot("acme", "call-500")?
        .context("snapshot should survive reopen")?;
    assert_eq!(snapshot.last_event_sequence, 3);

    core.verify("acme", "call-500")
        .context("verification should pass after reopen")?;

    Ok(())
}
