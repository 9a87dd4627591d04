//! Validation helpers for DTOs.

use validator::ValidationError;

use crate::error::ServiceError;

/// Longest room, player or track list identifier accepted.
pub const MAX_IDENTIFIER_LEN: usize = 64;

/// Validates that an identifier is 1 to 64 ASCII letters, digits, `-` or `_`.
///
/// Identifiers end up in store paths, so separators are refused.
///
/// # Examples
///
/// ```ignore
/// validate_identifier("lobby-1")   // Ok
/// validate_identifier("")          // Err - empty
/// validate_identifier("a/b")       // Err - separator
/// ```
pub fn validate_identifier(id: &str) -> Result<(), ValidationError> {
    if id.is_empty() || id.len() > MAX_IDENTIFIER_LEN {
        let mut err = ValidationError::new("identifier_length");
        err.message = Some(
            format!(
                "Identifier must be 1 to {MAX_IDENTIFIER_LEN} characters (got {})",
                id.len()
            )
            .into(),
        );
        return Err(err);
    }

    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        let mut err = ValidationError::new("identifier_format");
        err.message = Some("Identifier may only contain letters, digits, '-' and '_'".into());
        return Err(err);
    }

    Ok(())
}

/// Path-parameter flavour of [`validate_identifier`].
pub fn ensure_identifier(kind: &str, id: &str) -> Result<(), ServiceError> {
    validate_identifier(id).map_err(|err| {
        let reason = err
            .message
            .map(|message| message.into_owned())
            .unwrap_or_else(|| err.code.into_owned());
        ServiceError::InvalidInput(format!("invalid {kind} id `{id}`: {reason}"))
    })
}
