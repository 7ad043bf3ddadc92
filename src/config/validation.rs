use super::models::Settings;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("At least one worker is required")]
    NoWorkers,

    #[error("Timeout must be positive: {field} = 0")]
    ZeroTimeout { field: &'static str },

    #[error("Command template '{command}' is missing the {placeholder} placeholder")]
    MissingPlaceholder {
        command: &'static str,
        placeholder: &'static str,
    },

    #[error("User agent must not be empty")]
    EmptyUserAgent,
}

/// Validate the entire settings tree
pub fn validate(settings: &Settings) -> Result<(), ValidationError> {
    validate_sync(settings)?;
    validate_http(settings)?;
    validate_commands(settings)?;
    Ok(())
}

fn validate_sync(settings: &Settings) -> Result<(), ValidationError> {
    if settings.sync.workers == 0 {
        return Err(ValidationError::NoWorkers);
    }
    Ok(())
}

fn validate_http(settings: &Settings) -> Result<(), ValidationError> {
    let http = &settings.http;
    if http.timeout_secs == 0 {
        return Err(ValidationError::ZeroTimeout {
            field: "http.timeout_secs",
        });
    }
    if http.download_timeout_secs == 0 {
        return Err(ValidationError::ZeroTimeout {
            field: "http.download_timeout_secs",
        });
    }
    if http.user_agent.trim().is_empty() {
        return Err(ValidationError::EmptyUserAgent);
    }
    Ok(())
}

fn validate_commands(settings: &Settings) -> Result<(), ValidationError> {
    let required = [
        ("upload", settings.commands.upload.as_str(), "{path}"),
        ("upload", settings.commands.upload.as_str(), "{repo}"),
        ("reindex", settings.commands.reindex.as_str(), "{repo}"),
    ];

    for (command, template, placeholder) in required {
        if !template.contains(placeholder) {
            return Err(ValidationError::MissingPlaceholder {
                command,
                placeholder,
            });
        }
    }
    Ok(())
}
