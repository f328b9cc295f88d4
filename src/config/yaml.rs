use serde::Deserialize;
use std::path::Path;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present in
/// the file override environment variables.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   url: "wss://relay.example.com/live"
///
/// connection:
///   connect_timeout_seconds: 5
///
/// session:
///   modality: "AUDIO"
///   input_audio_transcription: true
///   output_audio_transcription: true
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub connection: Option<ConnectionYaml>,
    pub session: Option<SessionYaml>,
}

/// Relay address from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub url: Option<String>,
}

/// Connection behaviour from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ConnectionYaml {
    pub connect_timeout_seconds: Option<u64>,
}

/// Session setup defaults from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SessionYaml {
    /// "AUDIO" or "TEXT"
    pub modality: Option<String>,
    pub input_audio_transcription: Option<bool>,
    pub output_audio_transcription: Option<bool>,
}

impl YamlConfig {
    /// Load YAML configuration from a file
    pub fn from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_yaml_config_full() {
        let yaml = r#"
server:
  url: "wss://relay.example.com/live"

connection:
  connect_timeout_seconds: 10

session:
  modality: "TEXT"
  input_audio_transcription: true
  output_audio_transcription: false
"#;

        let config: YamlConfig = serde_yaml::from_str(yaml).unwrap();

        let server = config.server.unwrap();
        assert_eq!(server.url, Some("wss://relay.example.com/live".to_string()));

        let connection = config.connection.unwrap();
        assert_eq!(connection.connect_timeout_seconds, Some(10));

        let session = config.session.unwrap();
        assert_eq!(session.modality, Some("TEXT".to_string()));
        assert_eq!(session.input_audio_transcription, Some(true));
        assert_eq!(session.output_audio_transcription, Some(false));
    }

    #[test]
    fn test_yaml_config_partial() {
        let yaml = r#"
session:
  output_audio_transcription: true
"#;

        let config: YamlConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.server.is_none());
        assert!(config.connection.is_none());

        let session = config.session.unwrap();
        assert!(session.modality.is_none());
        assert_eq!(session.output_audio_transcription, Some(true));
    }

    #[test]
    fn test_yaml_config_empty() {
        let config: YamlConfig = serde_yaml::from_str("{}").unwrap();
        assert!(config.server.is_none());
        assert!(config.session.is_none());
    }

    #[test]
    fn test_yaml_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("live.yaml");
        fs::write(&path, "server:\n  url: \"ws://127.0.0.1:9000\"\n").unwrap();

        let config = YamlConfig::from_file(&path).unwrap();
        assert_eq!(
            config.server.unwrap().url,
            Some("ws://127.0.0.1:9000".to_string())
        );
    }

    #[test]
    fn test_yaml_from_file_invalid() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.yaml");
        fs::write(&path, "server: [unclosed").unwrap();

        let err = YamlConfig::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse YAML config"));
    }

    #[test]
    fn test_yaml_wrong_type_rejected() {
        let yaml = r#"
connection:
  connect_timeout_seconds: "soon"
"#;
        assert!(serde_yaml::from_str::<YamlConfig>(yaml).is_err());
    }
}
