//! Default configuration and state locations

use std::path::PathBuf;

/// Directory holding the configuration file
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("agentflow"))
        .unwrap_or_else(|| PathBuf::from(".agentflow"))
}

/// Default configuration file path
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Directory for runtime state (trace files, etc.)
pub fn state_dir() -> PathBuf {
    dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .map(|d| d.join("agentflow"))
        .unwrap_or_else(|| PathBuf::from(".agentflow/state"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_end_with_app_dir() {
        assert!(config_dir().ends_with("agentflow"));
        assert_eq!(config_path().file_name().unwrap(), "config.toml");
    }
}
