pub mod files;
pub mod subjects;
pub mod users;

use uuid::Uuid;

use crate::web::ApiError;

/// Trim a request field and reject the request with the given message when
/// nothing is left. Handlers use one message per endpoint, so a blank field
/// and an absent field read the same to clients.
pub(crate) fn require_field<'a>(value: &'a str, message: &str) -> Result<&'a str, ApiError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::validation(message));
    }
    Ok(trimmed)
}

pub(crate) fn parse_record_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw.trim()).map_err(|_| ApiError::validation("Invalid id"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_field_trims_and_rejects_blanks() {
        assert_eq!(
            require_field("  alice  ", "All fields are required").expect("field"),
            "alice"
        );

        let err = require_field("   ", "All fields are required").expect_err("blank field");
        assert!(matches!(err, ApiError::Validation(message) if message == "All fields are required"));
    }

    #[test]
    fn parse_record_id_accepts_uuids_only() {
        let id = Uuid::new_v4();
        assert_eq!(parse_record_id(&id.to_string()).expect("uuid"), id);
        assert!(parse_record_id("64f1c0de99").is_err());
    }
}
