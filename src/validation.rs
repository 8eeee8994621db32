use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::{
    encryption::ENCRYPTED_FIELD,
    error::{EventError, Result},
};

pub const MAX_AGGREGATE_ID_LENGTH: usize = 128;
pub const MAX_EVENT_PAYLOAD_BYTES: usize = 256 * 1024;
pub const MAX_EVENT_METADATA_BYTES: usize = 64 * 1024;

static SNAKE_CASE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("valid snake_case regex"));
static EVENT_TYPE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z][a-z0-9_]*(?:\.[a-z][a-z0-9_]*)*$").expect("valid event_type regex")
});
static AGGREGATE_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9](?:[A-Za-z0-9_-]{0,127})?$").expect("valid aggregate_id regex")
});

pub fn ensure_snake_case(label: &str, value: &str) -> Result<()> {
    if SNAKE_CASE_RE.is_match(value) {
        Ok(())
    } else {
        Err(EventError::Validation(format!(
            "{label} must be lowercase snake_case"
        )))
    }
}

/// Event types are dotted tags such as `call.initiated` or
/// `payment.completed`; each segment is lowercase snake_case. The tag is
/// stored exactly as given and is the key handlers register under.
pub fn ensure_event_type(value: &str) -> Result<()> {
    if EVENT_TYPE_RE.is_match(value) {
        Ok(())
    } else {
        Err(EventError::Validation(
            "event_type must be lowercase snake_case; dots may be used as separators".into(),
        ))
    }
}

pub fn ensure_aggregate_id(value: &str) -> Result<()> {
    if value.trim() != value {
        return Err(EventError::Validation(
            "aggregate_id cannot include leading or trailing whitespace".into(),
        ));
    }
    if value.is_empty() {
        return Err(EventError::Validation(
            "aggregate_id must not be empty".into(),
        ));
    }
    if value.len() > MAX_AGGREGATE_ID_LENGTH {
        return Err(EventError::Validation(format!(
            "aggregate_id cannot exceed {} characters",
            MAX_AGGREGATE_ID_LENGTH
        )));
    }
    if !AGGREGATE_ID_RE.is_match(value) {
        return Err(EventError::Validation(
            "aggregate_id may only contain letters, numbers, underscores, or hyphens".into(),
        ));
    }
    Ok(())
}

pub fn ensure_model_id(value: &str) -> Result<()> {
    if value.trim() != value
        || value.is_empty()
        || value.len() > MAX_AGGREGATE_ID_LENGTH
        || !AGGREGATE_ID_RE.is_match(value)
    {
        return Err(EventError::Validation(format!(
            "model_id must be 1-{} letters, numbers, underscores, or hyphens",
            MAX_AGGREGATE_ID_LENGTH
        )));
    }
    Ok(())
}

pub fn ensure_payload_object(payload: &Value) -> Result<()> {
    if !payload.is_object() {
        return Err(EventError::Validation(
            "event payload must be a JSON object".into(),
        ));
    }
    // The encryption envelope claims this field; a payload carrying it
    // would be mistaken for an already-encrypted row.
    if payload.get(ENCRYPTED_FIELD).is_some() {
        return Err(EventError::Validation(format!(
            "event payload may not use the reserved field {ENCRYPTED_FIELD}"
        )));
    }
    let size = serde_json::to_vec(payload)
        .map_err(|err| EventError::Serialization(err.to_string()))?
        .len();
    if size > MAX_EVENT_PAYLOAD_BYTES {
        return Err(EventError::Validation(format!(
            "event payload exceeds maximum size of {} bytes",
            MAX_EVENT_PAYLOAD_BYTES
        )));
    }
    Ok(())
}

pub fn ensure_metadata_object(metadata: &Value) -> Result<()> {
    if !metadata.is_object() {
        return Err(EventError::Validation(
            "event metadata must be a JSON object".into(),
        ));
    }
    let size = serde_json::to_vec(metadata)
        .map_err(|err| EventError::Serialization(err.to_string()))?
        .len();
    if size > MAX_EVENT_METADATA_BYTES {
        return Err(EventError::Validation(format!(
            "event metadata exceeds maximum size of {} bytes",
            MAX_EVENT_METADATA_BYTES
        )));
    }
    Ok(())
}

pub fn ensure_read_model_data(data: &Value) -> Result<()> {
    if !data.is_object() {
        return Err(EventError::Validation(
            "read model data must be a JSON object".into(),
        ));
    }
    if data.get(ENCRYPTED_FIELD).is_some() {
        return Err(EventError::Validation(format!(
            "read model data may not use the reserved field {ENCRYPTED_FIELD}"
        )));
    }
    let size = serde_json::to_vec(data)
        .map_err(|err| EventError::Serialization(err.to_string()))?
        .len();
    if size > MAX_EVENT_PAYLOAD_BYTES {
        return Err(EventError::Validation(format!(
            "read model data exceeds maximum size of {} bytes",
            MAX_EVENT_PAYLOAD_BYTES
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn snake_case_validation_allows_valid_names() {
        ensure_snake_case("aggregate_type", "customer").expect("valid snake case");
    }

    #[test]
    fn snake_case_validation_rejects_invalid_names() {
        let err = ensure_snake_case("aggregate_type", "Customer").unwrap_err();
        assert!(matches!(err, EventError::Validation(_)));
    }

    #[test]
    fn event_type_accepts_dotted_segments() {
        ensure_event_type("call.initiated").expect("dotted tag is valid");
        ensure_event_type("payment.completed").expect("dotted tag is valid");
        ensure_event_type("customer_updated").expect("plain snake_case is valid");
    }

    #[test]
    fn event_type_rejects_uppercase_and_hyphens() {
        let err = ensure_event_type("Call.Initiated").unwrap_err();
        assert!(matches!(err, EventError::Validation(_)));

        let err = ensure_event_type("call-initiated").unwrap_err();
        assert!(matches!(err, EventError::Validation(_)));
    }

    #[test]
    fn event_type_rejects_empty_segments() {
        let err = ensure_event_type("call..initiated").unwrap_err();
        assert!(matches!(err, EventError::Validation(_)));

        let err = ensure_event_type("call.").unwrap_err();
        assert!(matches!(err, EventError::Validation(_)));
    }

    #[test]
    fn aggregate_id_validation_rejects_whitespace() {
        let err = ensure_aggregate_id(" bad").unwrap_err();
        assert!(matches!(err, EventError::Validation(_)));
    }

    #[test]
    fn payload_must_be_an_object() {
        let err = ensure_payload_object(&json!(["not", "an", "object"])).unwrap_err();
        assert!(matches!(err, EventError::Validation(_)));

        ensure_payload_object(&json!({"caller": "+15550100"})).expect("object payload is valid");
    }

    #[test]
    fn payload_size_enforces_limit() {
        let oversized = "x".repeat(MAX_EVENT_PAYLOAD_BYTES + 1);
        let err = ensure_payload_object(&json!({ "blob": oversized })).unwrap_err();
        assert!(matches!(err, EventError::Validation(_)));
    }

    #[test]
    fn reserved_envelope_field_is_rejected() {
        let err = ensure_payload_object(&json!({ (ENCRYPTED_FIELD): "ENCv1:abc" })).unwrap_err();
        assert!(matches!(err, EventError::Validation(_)));

        let err = ensure_read_model_data(&json!({ (ENCRYPTED_FIELD): true })).unwrap_err();
        assert!(matches!(err, EventError::Validation(_)));
    }

    #[test]
    fn model_ids_follow_identifier_rules() {
        ensure_model_id("call-123").expect("valid model id");
        ensure_model_id("cust_42").expect("valid model id");

        let err = ensure_model_id("").unwrap_err();
        assert!(matches!(err, EventError::Validation(_)));

        let err = ensure_model_id("bad id").unwrap_err();
        assert!(matches!(err, EventError::Validation(_)));
    }

    #[test]
    fn read_model_data_must_be_an_object() {
        ensure_read_model_data(&json!({"duration": 300})).expect("object data is valid");

        let err = ensure_read_model_data(&json!(42)).unwrap_err();
        assert!(matches!(err, EventError::Validation(_)));
    }

    #[test]
    fn metadata_validates_shape_and_size() {
        ensure_metadata_object(&json!({"source": "ivr"})).expect("valid metadata");

        let err = ensure_metadata_object(&json!("ivr")).unwrap_err();
        assert!(matches!(err, EventError::Validation(_)));

        let huge_value = "x".repeat(MAX_EVENT_METADATA_BYTES + 1);
        let err = ensure_metadata_object(&json!({"trace": huge_value})).unwrap_err();
        assert!(matches!(err, EventError::Validation(_)));
    }
}
