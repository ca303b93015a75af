//! Input validation for maintenance operations
//!
//! Key fields are interpolated into `$group` value references and into match
//! filters, so operator injection has to be rejected before a pipeline is
//! built.

use mongosweep_common::{Result, SweepError};

/// Maximum allowed length for field names
const MAX_FIELD_NAME_LENGTH: usize = 1024;

/// Validates the key-field set for a maintenance operation
///
/// # Errors
/// Returns a validation error if the set is empty or any name fails
/// [`validate_field_name`]. An empty key set would place the whole
/// collection in a single group.
pub fn validate_key_fields<S: AsRef<str>>(keys: &[S]) -> Result<()> {
    if keys.is_empty() {
        return Err(SweepError::Validation(
            "At least one key field is required".to_string(),
        ));
    }
    for key in keys {
        validate_field_name(key.as_ref())?;
    }
    Ok(())
}

/// Validates a single field name
///
/// # Errors
/// Returns a validation error if:
/// - Name is empty
/// - Name exceeds MAX_FIELD_NAME_LENGTH
/// - Name contains null bytes
/// - Name starts with `$` (reserved for operators)
pub fn validate_field_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(SweepError::Validation(
            "Field name cannot be empty".to_string(),
        ));
    }

    if name.len() > MAX_FIELD_NAME_LENGTH {
        return Err(SweepError::Validation(format!(
            "Field name exceeds maximum length of {} characters",
            MAX_FIELD_NAME_LENGTH
        )));
    }

    if name.contains('\0') {
        return Err(SweepError::Validation(
            "Field name cannot contain null bytes".to_string(),
        ));
    }

    if name.starts_with('$') {
        return Err(SweepError::Validation(format!(
            "Field name cannot start with '$' (reserved for operators): '{}'",
            name
        )));
    }

    Ok(())
}
