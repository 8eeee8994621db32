use crate::error::{EventError, Result};

/// Lowercases and validates a caller-supplied tenant id. Every public
/// operation passes its tenant through here before touching storage, so
/// `Acme` and `acme` resolve to the same keyspace.
pub fn normalize_tenant_id(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(EventError::Validation(
            "tenant id cannot be empty".to_string(),
        ));
    }

    let lower = trimmed.to_ascii_lowercase();
    if !matches!(lower.chars().next(), Some(ch) if ch.is_ascii_alphanumeric()) {
        return Err(EventError::Validation(
            "tenant id must begin with an ASCII letter or digit".to_string(),
        ));
    }
    if !lower
        .chars()
        .skip(1)
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
    {
        return Err(EventError::Validation(
            "tenant id may only contain letters, numbers, '-' or '_'".to_string(),
        ));
    }
    Ok(lower)
}
