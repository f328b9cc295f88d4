//! Configuration module for the live session client
//!
//! This module handles client configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//!
//! # Example
//! ```rust,no_run
//! use live_session::config::ClientConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ClientConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("live.yaml");
//! let config = ClientConfig::from_file(&config_path)?;
//!
//! println!("Relay at {}", config.server_url);
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::time::Duration;

mod env;
mod yaml;

pub use yaml::YamlConfig;

use crate::core::session::{
    DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_SERVER_URL, ResponseModality, SetupConfig,
};
use crate::utils::url_validation::validate_ws_url;
use env::{
    ENV_CONNECT_TIMEOUT_SECONDS, ENV_INPUT_TRANSCRIPTION, ENV_OUTPUT_TRANSCRIPTION,
    ENV_RESPONSE_MODALITY, ENV_SERVER_URL, env_bool, env_string, env_u64,
};

/// Client configuration
///
/// Contains everything needed to open a session:
/// - Relay address
/// - Bound for waiting on the transport
/// - Setup sent once the relay is ready
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// WebSocket address of the relay (`ws://` or `wss://`)
    pub server_url: String,
    /// Upper bound for `ensure_connected`
    pub connect_timeout: Duration,
    /// Session setup payload
    pub setup: SetupConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            setup: SetupConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables
    ///
    /// The `.env` file is loaded by the binary at startup, so its values are
    /// visible here as ordinary environment variables.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable fallbacks
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        // The configuration priority is: YAML > Environment Variables (.env + actual ENV) > Defaults
        let yaml_config = YamlConfig::from_file(path)?;

        let mut config = Self::default();
        config.apply_env()?;
        config.apply_yaml(yaml_config)?;
        config.validate()?;

        Ok(config)
    }

    fn apply_env(&mut self) -> Result<(), String> {
        if let Some(url) = env_string(ENV_SERVER_URL) {
            self.server_url = url;
        }
        if let Some(seconds) = env_u64(ENV_CONNECT_TIMEOUT_SECONDS)? {
            self.connect_timeout = Duration::from_secs(seconds);
        }
        if let Some(modality) = env_string(ENV_RESPONSE_MODALITY) {
            self.setup.modality = parse_modality(&modality)?;
        }
        if let Some(enabled) = env_bool(ENV_INPUT_TRANSCRIPTION)? {
            self.setup.input_audio_transcription = enabled;
        }
        if let Some(enabled) = env_bool(ENV_OUTPUT_TRANSCRIPTION)? {
            self.setup.output_audio_transcription = enabled;
        }
        Ok(())
    }

    fn apply_yaml(&mut self, yaml: YamlConfig) -> Result<(), String> {
        if let Some(url) = yaml.server.and_then(|s| s.url) {
            self.server_url = url;
        }
        if let Some(seconds) = yaml.connection.and_then(|c| c.connect_timeout_seconds) {
            self.connect_timeout = Duration::from_secs(seconds);
        }
        if let Some(session) = yaml.session {
            if let Some(modality) = session.modality {
                self.setup.modality = parse_modality(&modality)?;
            }
            if let Some(enabled) = session.input_audio_transcription {
                self.setup.input_audio_transcription = enabled;
            }
            if let Some(enabled) = session.output_audio_transcription {
                self.setup.output_audio_transcription = enabled;
            }
        }
        Ok(())
    }

    /// Check that the configuration can be used to open a session
    pub fn validate(&self) -> Result<(), String> {
        validate_ws_url(&self.server_url)
            .map_err(|e| format!("Invalid server URL '{}': {e}", self.server_url))?;

        if self.connect_timeout.is_zero() {
            return Err("Connect timeout must be greater than zero".to_string());
        }
        Ok(())
    }
}

fn parse_modality(value: &str) -> Result<ResponseModality, String> {
    ResponseModality::parse(value)
        .ok_or_else(|| format!("Invalid response modality: {value} (expected AUDIO or TEXT)"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use std::fs;
    use tempfile::TempDir;

    // Helper to clean up environment variables
    fn cleanup_env_vars() {
        unsafe {
            env::remove_var("LIVE_SERVER_URL");
            env::remove_var("LIVE_CONNECT_TIMEOUT_SECONDS");
            env::remove_var("LIVE_RESPONSE_MODALITY");
            env::remove_var("LIVE_INPUT_TRANSCRIPTION");
            env::remove_var("LIVE_OUTPUT_TRANSCRIPTION");
        }
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.server_url, "ws://localhost:8081");
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.setup.modality, ResponseModality::Audio);
        assert!(!config.setup.input_audio_transcription);
        assert!(!config.setup.output_audio_transcription);
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        cleanup_env_vars();

        let config = ClientConfig::from_env().unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    #[serial]
    fn test_from_env_values() {
        cleanup_env_vars();

        unsafe {
            env::set_var("LIVE_SERVER_URL", "wss://relay.example.com/live");
            env::set_var("LIVE_CONNECT_TIMEOUT_SECONDS", "12");
            env::set_var("LIVE_RESPONSE_MODALITY", "text");
            env::set_var("LIVE_INPUT_TRANSCRIPTION", "true");
            env::set_var("LIVE_OUTPUT_TRANSCRIPTION", "1");
        }

        let config = ClientConfig::from_env().unwrap();
        assert_eq!(config.server_url, "wss://relay.example.com/live");
        assert_eq!(config.connect_timeout, Duration::from_secs(12));
        assert_eq!(config.setup.modality, ResponseModality::Text);
        assert!(config.setup.input_audio_transcription);
        assert!(config.setup.output_audio_transcription);

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_invalid_modality() {
        cleanup_env_vars();

        unsafe {
            env::set_var("LIVE_RESPONSE_MODALITY", "video");
        }
        let err = ClientConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("Invalid response modality"));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_http_url() {
        cleanup_env_vars();

        unsafe {
            env::set_var("LIVE_SERVER_URL", "http://localhost:8081");
        }
        let err = ClientConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("Invalid server URL"));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_zero_timeout() {
        cleanup_env_vars();

        unsafe {
            env::set_var("LIVE_CONNECT_TIMEOUT_SECONDS", "0");
        }
        let err = ClientConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("greater than zero"));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_yaml_only() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("live.yaml");

        let yaml_content = r#"
server:
  url: "ws://127.0.0.1:9000"

connection:
  connect_timeout_seconds: 3

session:
  modality: "TEXT"
  output_audio_transcription: true
"#;

        fs::write(&config_path, yaml_content).unwrap();

        let config = ClientConfig::from_file(&config_path).unwrap();

        assert_eq!(config.server_url, "ws://127.0.0.1:9000");
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.setup.modality, ResponseModality::Text);
        assert!(!config.setup.input_audio_transcription);
        assert!(config.setup.output_audio_transcription);

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_yaml_overrides_env() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("live.yaml");

        let yaml_content = r#"
server:
  url: "ws://127.0.0.1:9000"
"#;

        fs::write(&config_path, yaml_content).unwrap();

        unsafe {
            env::set_var("LIVE_SERVER_URL", "ws://127.0.0.1:7000");
            env::set_var("LIVE_INPUT_TRANSCRIPTION", "yes");
        }

        let config = ClientConfig::from_file(&config_path).unwrap();

        // YAML overrides ENV
        assert_eq!(config.server_url, "ws://127.0.0.1:9000");
        // ENV value where YAML is silent
        assert!(config.setup.input_audio_transcription);

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_missing_file() {
        cleanup_env_vars();

        let config_path = Path::new("/nonexistent/live.yaml");
        let result = ClientConfig::from_file(config_path);

        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to read config file")
        );

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_invalid_yaml() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("invalid.yaml");

        fs::write(&config_path, "invalid: yaml: [content").unwrap();

        let result = ClientConfig::from_file(&config_path);

        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to parse YAML")
        );

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_invalid_url() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("live.yaml");
        fs::write(&config_path, "server:\n  url: \"ftp://relay\"\n").unwrap();

        let err = ClientConfig::from_file(&config_path).unwrap_err();
        assert!(err.to_string().contains("ws or wss"));

        cleanup_env_vars();
    }
}
