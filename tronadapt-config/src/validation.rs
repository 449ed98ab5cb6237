// tronadapt-config/src/validation.rs
//! Custom validation functions for configuration.

use validator::ValidationError;

/// Validate that a host is a plausible DNS name or IP literal.
pub fn validate_host(host: &str) -> Result<(), ValidationError> {
    let re = regex::Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9\-\.:]*[A-Za-z0-9])?$")
        .map_err(|_| ValidationError::new("invalid_regex"))?;
    if host.len() <= 253 && re.is_match(host) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_host"))
    }
}

/// Validate log level.
pub fn validate_level(level: &str) -> Result<(), ValidationError> {
    let valid = ["trace", "debug", "info", "warn", "error"]
        .contains(&level.to_lowercase().as_str());
    if valid {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_level"))
    }
}
