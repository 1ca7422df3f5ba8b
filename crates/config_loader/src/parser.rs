//! Configuration parsing
//!
//! TOML is the primary format, JSON is accepted.

use contracts::{ContractError, MonitorBlueprint};

/// Configuration file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML (recommended)
    Toml,
    /// JSON
    Json,
}

impl ConfigFormat {
    /// Infer format from file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Parse TOML configuration
pub fn parse_toml(content: &str) -> Result<MonitorBlueprint, ContractError> {
    toml::from_str(content)
        .map_err(|e| ContractError::config_parse_with(format!("TOML parse error: {e}"), e))
}

/// Parse JSON configuration
pub fn parse_json(content: &str) -> Result<MonitorBlueprint, ContractError> {
    serde_json::from_str(content)
        .map_err(|e| ContractError::config_parse_with(format!("JSON parse error: {e}"), e))
}

/// Parse configuration in the given format
pub fn parse(content: &str, format: ConfigFormat) -> Result<MonitorBlueprint, ContractError> {
    match format {
        ConfigFormat::Toml => parse_toml(content),
        ConfigFormat::Json => parse_json(content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::DeviceMode;

    #[test]
    fn test_parse_toml_sections() {
        let content = r#"
[device]
mode = "simulated"

[simulator]
interval_ms = 500
seed = 7

[pipeline]
queue_capacity = 16

[alerts]
temperature_high = 38.0
"#;
        let bp = parse_toml(content).unwrap();
        assert_eq!(bp.device.mode, DeviceMode::Simulated);
        assert_eq!(bp.simulator.seed, Some(7));
        assert_eq!(bp.pipeline.queue_capacity, 16);
        assert_eq!(bp.pipeline.poll_interval_ms, 250);
        assert_eq!(bp.alerts.temperature_high, 38.0);
        assert_eq!(bp.alerts.temperature_low, 15.0);
    }

    #[test]
    fn test_parse_empty_is_default() {
        let bp = parse_toml("").unwrap();
        assert_eq!(bp, MonitorBlueprint::default());
    }

    #[test]
    fn test_parse_json_minimal() {
        let content = r#"{
            "device": { "mode": "live", "address": "tcp://127.0.0.1:9000" },
            "storage": { "path": "/tmp/soil.db" }
        }"#;
        let bp = parse_json(content).unwrap();
        assert_eq!(bp.device.address, "tcp://127.0.0.1:9000");
        assert_eq!(bp.device.baud_rate, 115_200);
    }

    #[test]
    fn test_parse_toml_syntax_error() {
        let result = parse_toml("invalid toml [[[");
        assert!(matches!(
            result.unwrap_err(),
            ContractError::ConfigParse { .. }
        ));
    }

    #[test]
    fn test_unknown_mode_rejected() {
        let result = parse_toml("[device]\nmode = \"bluetooth\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            ConfigFormat::from_extension("TOML"),
            Some(ConfigFormat::Toml)
        );
        assert_eq!(
            ConfigFormat::from_extension("json"),
            Some(ConfigFormat::Json)
        );
        assert_eq!(ConfigFormat::from_extension("yaml"), None);
    }
}
