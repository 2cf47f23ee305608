//! Validation helpers for DTOs.

use validator::ValidationError;

/// Rejects text that is empty or whitespace only.
///
/// ```ignore
/// validate_not_blank("tabs beat spaces") // Ok
/// validate_not_blank("   ")              // Err
/// ```
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("must not be empty".into());
        return Err(err);
    }
    Ok(())
}
