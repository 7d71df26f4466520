use crate::config::types::{Config, IndexerConfig, OutputConfig, ScraperConfig};
use crate::crawler::PageSize;
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_scraper_config(&config.scraper)?;
    validate_indexer_config(&config.indexer)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates the remote source and network settings
fn validate_scraper_config(config: &ScraperConfig) -> Result<(), ConfigError> {
    if config.parallelism < 1 || config.parallelism > 100 {
        return Err(ConfigError::Validation(format!(
            "parallelism must be between 1 and 100, got {}",
            config.parallelism
        )));
    }

    if config.delay_ms > 60_000 {
        return Err(ConfigError::Validation(format!(
            "delay-ms must be <= 60000, got {}ms",
            config.delay_ms
        )));
    }

    if config.request_timeout_secs < 1 || config.request_timeout_secs > 300 {
        return Err(ConfigError::Validation(format!(
            "request-timeout-secs must be between 1 and 300, got {}",
            config.request_timeout_secs
        )));
    }

    if config.row_concurrency < 1 || config.row_concurrency > 1000 {
        return Err(ConfigError::Validation(format!(
            "row-concurrency must be between 1 and 1000, got {}",
            config.row_concurrency
        )));
    }

    if config.allowed_domains.is_empty() {
        return Err(ConfigError::Validation(
            "allowed-domains must list at least one host".to_string(),
        ));
    }
    for domain in &config.allowed_domains {
        validate_domain_string(domain)?;
    }

    if config.user_agents.iter().any(|ua| ua.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "user-agents cannot contain empty entries".to_string(),
        ));
    }

    validate_template(
        "listing-url",
        &config.listing_url,
        &["{page_size}", "{page}"],
        &config.allowed_domains,
    )?;
    validate_template(
        "content-url",
        &config.content_url,
        &["{id}"],
        &config.allowed_domains,
    )?;

    Ok(())
}

/// Validates job defaults
fn validate_indexer_config(config: &IndexerConfig) -> Result<(), ConfigError> {
    PageSize::try_from(config.page_size).map_err(|_| {
        ConfigError::Validation(format!(
            "page-size must be one of {:?}, got {}",
            PageSize::ALLOWED,
            config.page_size
        ))
    })?;

    if config.batch_size < 1 {
        return Err(ConfigError::Validation(
            "batch-size must be >= 1, got 0".to_string(),
        ));
    }

    if config.update_interval < 1 {
        return Err(ConfigError::Validation(
            "update-interval must be >= 1, got 0".to_string(),
        ));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }

    if config.progress_path.is_empty() {
        return Err(ConfigError::Validation(
            "progress-path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Checks that a URL template carries its placeholders and targets an allowed host
fn validate_template(
    key: &str,
    template: &str,
    placeholders: &[&str],
    allowed_domains: &[String],
) -> Result<(), ConfigError> {
    let mut sample = template.to_string();
    for placeholder in placeholders {
        if !template.contains(placeholder) {
            return Err(ConfigError::Validation(format!(
                "{} must contain the {} placeholder",
                key, placeholder
            )));
        }
        sample = sample.replace(placeholder, "1");
    }

    let url = Url::parse(&sample)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", key, template, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "{} must use http or https, got '{}'",
            key,
            url.scheme()
        )));
    }

    let host = url.host_str().unwrap_or_default();
    if !allowed_domains.iter().any(|domain| domain == host) {
        return Err(ConfigError::Validation(format!(
            "{} host '{}' is not in allowed-domains",
            key, host
        )));
    }

    Ok(())
}

/// Validates a host name or address
fn validate_domain_string(domain: &str) -> Result<(), ConfigError> {
    if domain.is_empty() {
        return Err(ConfigError::Validation(
            "Domain cannot be empty".to_string(),
        ));
    }

    if !domain
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "Domain '{}' contains invalid characters",
            domain
        )));
    }

    if domain.starts_with('.')
        || domain.ends_with('.')
        || domain.starts_with('-')
        || domain.ends_with('-')
    {
        return Err(ConfigError::Validation(format!(
            "Domain '{}' cannot start or end with '.' or '-'",
            domain
        )));
    }

    if domain.contains("..") {
        return Err(ConfigError::Validation(format!(
            "Domain '{}' cannot contain consecutive dots",
            domain
        )));
    }

    Ok(())
}
