//! Configuration validation

use url::Url;

use super::types::Config;

/// Outcome of validating a configuration
#[derive(Debug, Default)]
pub struct ConfigValidationResult {
    /// Problems that prevent running
    pub errors: Vec<String>,
    /// Suspicious but non-fatal findings
    pub warnings: Vec<String>,
}

impl ConfigValidationResult {
    /// Whether the configuration is usable
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validate a configuration, collecting every finding
pub fn validate_config(config: &Config) -> ConfigValidationResult {
    let mut result = ConfigValidationResult::default();

    if config.llm.model.trim().is_empty() {
        result.errors.push("llm.model must not be empty".to_string());
    }
    if Url::parse(&config.llm.base_url).is_err() {
        result
            .errors
            .push(format!("llm.base_url is not a valid URL: {}", config.llm.base_url));
    }
    if config.llm.timeout_s == 0 {
        result
            .warnings
            .push("llm.timeout_s is 0; requests will never time out".to_string());
    }

    if config.agent.max_steps == 0
        && config.agent.max_tokens == 0
        && config.agent.max_duration.is_zero()
    {
        result
            .warnings
            .push("agent budget is unlimited (all limits are 0)".to_string());
    }

    for (name, server) in &config.mcp.servers {
        match Url::parse(&server.url) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
            Ok(url) => result.errors.push(format!(
                "mcp.servers.{} has unsupported scheme '{}'",
                name,
                url.scheme()
            )),
            Err(e) => result
                .errors
                .push(format!("mcp.servers.{} has invalid url: {}", name, e)),
        }
    }

    result
}
