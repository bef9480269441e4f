use crate::config::types::{Config, CrawlerConfig, OutputConfig, UserAgentConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_output_config(&config.output)?;
    validate_seeds(&config.seeds)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.worker_count < 1 || config.worker_count > 1000 {
        return Err(ConfigError::Validation(format!(
            "worker-count must be between 1 and 1000, got {}",
            config.worker_count
        )));
    }

    if config.fetch_timeout < 100 {
        return Err(ConfigError::Validation(format!(
            "fetch-timeout must be >= 100ms, got {}ms",
            config.fetch_timeout
        )));
    }

    if config.backoff_base > config.backoff_cap {
        return Err(ConfigError::Validation(format!(
            "backoff-base ({}ms) cannot exceed backoff-cap ({}ms)",
            config.backoff_base, config.backoff_cap
        )));
    }

    if config.url_budget == Some(0) {
        return Err(ConfigError::Validation(
            "url-budget must be >= 1 when set".to_string(),
        ));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler-name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler-name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact-url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.outbox_path.is_empty() {
        return Err(ConfigError::Validation(
            "outbox-path cannot be empty".to_string(),
        ));
    }

    if config.summary_path.is_empty() {
        return Err(ConfigError::Validation(
            "summary-path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Seeds must be absolute http(s) URLs with a host
fn validate_seeds(seeds: &[String]) -> Result<(), ConfigError> {
    for seed in seeds {
        let url = Url::parse(seed)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed, e)))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::Validation(format!(
                "Seed URL '{}' must use http or https",
                seed
            )));
        }

        if url.host_str().is_none() {
            return Err(ConfigError::InvalidUrl(format!(
                "Seed URL '{}' has no host",
                seed
            )));
        }
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact-email cannot be empty".to_string(),
        ));
    }

    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !parts[1].contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email() {
        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email("admin@sub.example.com").is_ok());

        assert!(validate_email("").is_err());
        assert!(validate_email("invalid").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("user@").is_err());
        assert!(validate_email("user@domain").is_err());
    }

    #[test]
    fn test_validate_seeds() {
        assert!(validate_seeds(&["https://example.com/".to_string()]).is_ok());
        assert!(validate_seeds(&["http://a.test/".to_string()]).is_ok());
        assert!(validate_seeds(&[]).is_ok());

        assert!(validate_seeds(&["ftp://example.com/".to_string()]).is_err());
        assert!(validate_seeds(&["not a url".to_string()]).is_err());
    }

    #[test]
    fn test_validate_backoff_ordering() {
        let config = CrawlerConfig {
            backoff_base: 10_000,
            backoff_cap: 5_000,
            ..CrawlerConfig::default()
        };
        assert!(matches!(
            validate_crawler_config(&config),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_validate_default_crawler_config() {
        assert!(validate_crawler_config(&CrawlerConfig::default()).is_ok());
    }

    #[test]
    fn test_validate_zero_url_budget() {
        let config = CrawlerConfig {
            url_budget: Some(0),
            ..CrawlerConfig::default()
        };
        assert!(validate_crawler_config(&config).is_err());
    }
}
