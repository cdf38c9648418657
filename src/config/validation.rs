use super::models::Config;
use axum::http::HeaderValue;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("limits.max_upload_bytes must be positive")]
    ZeroUploadLimit,

    #[error("Duration must be positive: {field}")]
    ZeroDuration { field: &'static str },

    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: u8,
        min: u8,
        max: u8,
    },

    #[error("server.public_base_url must be an http(s) URL without trailing slash, got '{0}'")]
    InvalidPublicBaseUrl(String),

    #[error("server.allowed_origins contains an invalid origin '{0}'")]
    InvalidOrigin(String),
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_server(config)?;
    validate_limits(config)?;
    validate_retention(config)?;
    validate_conversion(config)?;
    Ok(())
}

fn validate_server(config: &Config) -> Result<(), ValidationError> {
    let base = &config.server.public_base_url;
    if !base.is_empty() {
        let has_scheme = base.starts_with("http://") || base.starts_with("https://");
        if !has_scheme || base.ends_with('/') {
            return Err(ValidationError::InvalidPublicBaseUrl(base.clone()));
        }
    }

    for origin in &config.server.allowed_origins {
        if origin.is_empty() || HeaderValue::from_str(origin).is_err() {
            return Err(ValidationError::InvalidOrigin(origin.clone()));
        }
    }

    Ok(())
}

fn validate_limits(config: &Config) -> Result<(), ValidationError> {
    if config.limits.max_upload_bytes.as_u64() == 0 {
        return Err(ValidationError::ZeroUploadLimit);
    }
    Ok(())
}

fn validate_retention(config: &Config) -> Result<(), ValidationError> {
    if config.retention.delay.is_zero() {
        return Err(ValidationError::ZeroDuration {
            field: "retention.delay",
        });
    }

    if config.retention.sweep_interval.is_zero() {
        return Err(ValidationError::ZeroDuration {
            field: "retention.sweep_interval",
        });
    }

    Ok(())
}

fn validate_conversion(config: &Config) -> Result<(), ValidationError> {
    let conversion = &config.conversion;

    if conversion.encode_timeout.is_zero() {
        return Err(ValidationError::ZeroDuration {
            field: "conversion.encode_timeout",
        });
    }

    check_range("conversion.jpeg_quality", conversion.jpeg_quality, 1, 100)?;
    check_range("conversion.avif_quality", conversion.avif_quality, 1, 100)?;
    check_range("conversion.avif_speed", conversion.avif_speed, 1, 10)?;

    Ok(())
}

fn check_range(field: &'static str, value: u8, min: u8, max: u8) -> Result<(), ValidationError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::OutOfRange {
            field,
            value,
            min,
            max,
        })
    }
}
