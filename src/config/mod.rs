//! Configuration module
//!
//! Split into focused files:
//! - types.rs: configuration structs and defaults
//! - io.rs: loading and saving
//! - paths.rs: default file locations
//! - validation.rs: sanity checks

mod io;
mod paths;
mod types;
mod validation;

pub use io::{apply_env_overrides, load_config, load_config_from_path, save_config};
pub use paths::{config_dir, config_path, state_dir};
pub use types::{
    AgentConfig, Config, LlmConfig, McpConfig, McpServerConfig, StorageBackendType, StorageConfig,
};
pub use validation::{validate_config, ConfigValidationResult};

impl Config {
    /// Load configuration from the default path and environment
    pub fn load() -> crate::error::Result<Self> {
        load_config()
    }
}
