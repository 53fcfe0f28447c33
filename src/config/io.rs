//! Configuration I/O - loading and saving
//!
//! Files parse as JSON5 or TOML by extension; environment variables
//! override the common knobs afterwards.

use secrecy::SecretString;
use std::path::Path;

use super::types::Config;
use crate::error::{Error, Result};

/// Load configuration from the default path, falling back to
/// environment variables when no file exists.
pub fn load_config() -> Result<Config> {
    let config_path = super::paths::config_path();

    let mut config = if config_path.exists() {
        load_config_from_path(&config_path)?
    } else {
        Config::default()
    };

    apply_env_overrides(&mut config);
    Ok(config)
}

/// Load configuration from a specific path
pub fn load_config_from_path(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!(
            "Failed to read config file {}: {}",
            path.display(),
            e
        ))
    })?;

    // Detect format by extension
    let config: Config = if path.extension().is_some_and(|ext| ext == "toml") {
        toml::from_str(&content).map_err(|e| Error::Config(format!("Invalid TOML config: {}", e)))?
    } else if path.extension().is_some_and(|ext| ext == "json") {
        // Parse as JSON5 (more lenient than strict JSON)
        json5::from_str(&content)
            .map_err(|e| Error::Config(format!("Invalid JSON config: {}", e)))?
    } else {
        // Try TOML first, then JSON5
        toml::from_str(&content)
            .or_else(|_| {
                json5::from_str(&content).map_err(|e| Error::Config(e.to_string()))
            })
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?
    };

    Ok(config)
}

/// Apply environment-variable overrides on top of a loaded config
pub fn apply_env_overrides(config: &mut Config) {
    // Load .env file if it exists
    dotenvy::dotenv().ok();

    if let Ok(api_key) = std::env::var("LLM_API_KEY") {
        config.llm.api_key = SecretString::from(api_key);
    }
    if let Ok(base_url) = std::env::var("LLM_BASE_URL") {
        config.llm.base_url = base_url;
    }
    if let Ok(model) = std::env::var("LLM_MODEL") {
        config.llm.model = model;
    }
    if let Ok(max_steps) = std::env::var("AGENTFLOW_MAX_STEPS") {
        if let Ok(max_steps) = max_steps.parse() {
            config.agent.max_steps = max_steps;
        }
    }
    if let Ok(base_path) = std::env::var("AGENTFLOW_STORAGE_PATH") {
        config.storage.base_path = base_path.into();
    }
}

/// Save configuration to a file (API keys are never written)
pub fn save_config(config: &Config, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_toml_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
            [llm]
            model = "test-model"
            base_url = "http://localhost:8000/v1"

            [agent]
            max_steps = 7
            "#,
        )
        .unwrap();

        let config = load_config_from_path(&path).unwrap();
        assert_eq!(config.llm.model, "test-model");
        assert_eq!(config.agent.max_steps, 7);
        // Unset sections fall back to defaults.
        assert_eq!(config.agent.reflection_steps, 5);
    }

    #[test]
    fn test_load_json5_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                // comments are allowed
                llm: { model: "json-model" },
                agent: { max_steps: 3 },
            }"#,
        )
        .unwrap();

        let config = load_config_from_path(&path).unwrap();
        assert_eq!(config.llm.model, "json-model");
        assert_eq!(config.agent.max_steps, 3);
    }

    #[test]
    fn test_save_round_trips_without_secrets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.llm.model = "saved-model".to_string();
        config.llm.api_key = SecretString::from("sk-secret");
        save_config(&config, &path).unwrap();

        let loaded = load_config_from_path(&path).unwrap();
        assert_eq!(loaded.llm.model, "saved-model");
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("sk-secret"));
    }
}
