//! Configuration validation

use tracing::debug;

use crate::error::{ConfigError, Result};

use super::types::Config;

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    debug!("validating configuration");
    validate_project(config)?;
    validate_execution(config)?;
    validate_cache(config)?;
    validate_dispatch(config)?;
    validate_fingerprint(config)?;
    debug!("configuration validation passed");
    Ok(())
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        message: message.into(),
    }
}

fn validate_project(config: &Config) -> Result<()> {
    if config.project.executable.is_empty() {
        return Err(invalid("project.executable", "executable cannot be empty"));
    }

    if let Err(e) = regex::Regex::new(&config.project.completion_marker) {
        return Err(invalid(
            "project.completion_marker",
            format!("not a valid regex: {}", e),
        ));
    }

    Ok(())
}

fn validate_execution(config: &Config) -> Result<()> {
    if config.execution.concurrency == 0 {
        return Err(invalid("execution.concurrency", "must be at least 1"));
    }
    Ok(())
}

fn validate_cache(config: &Config) -> Result<()> {
    if config.cache.enabled {
        if config.cache.artifact.is_empty() {
            return Err(invalid("cache.artifact", "artifact path cannot be empty"));
        }
        if config.cache.build_steps.is_empty() {
            return Err(invalid("cache.build_steps", "at least one build step is required"));
        }
    }
    Ok(())
}

fn validate_dispatch(config: &Config) -> Result<()> {
    if config.dispatch.poll_interval_ms == 0 {
        return Err(invalid("dispatch.poll_interval_ms", "must be greater than zero"));
    }
    if config.dispatch.job_timeout_secs == 0 {
        return Err(invalid("dispatch.job_timeout_secs", "must be greater than zero"));
    }
    Ok(())
}

fn validate_fingerprint(config: &Config) -> Result<()> {
    if config.fingerprint.ingredients.is_empty() {
        return Err(invalid("fingerprint.ingredients", "at least one ingredient set is required"));
    }
    if config
        .fingerprint
        .ingredients
        .iter()
        .any(|i| i.is_empty() || i.contains('/'))
    {
        return Err(invalid(
            "fingerprint.ingredients",
            "ingredient sets must be non-empty and cannot contain '/'",
        ));
    }
    Ok(())
}
