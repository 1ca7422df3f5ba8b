//! Configuration validation
//!
//! Field-level rules come from the `validator` derive on the blueprint types.
//! Cross-field rules:
//! - live mode needs a device address (`tcp://` addresses must carry a port)
//! - replay mode needs a capture file
//! - every low alert threshold sits below its high counterpart
//! - the link stop bound does not exceed the overall shutdown bound

use contracts::{AlertThresholds, ContractError, DeviceMode, MonitorBlueprint};
use validator::{Validate, ValidationErrors, ValidationErrorsKind};

/// Validate a MonitorBlueprint
///
/// Returns the first error encountered, or Ok(()).
pub fn validate(blueprint: &MonitorBlueprint) -> Result<(), ContractError> {
    blueprint.validate().map_err(|e| first_field_error(&e))?;
    validate_device(blueprint)?;
    validate_thresholds(&blueprint.alerts)?;
    validate_timeouts(blueprint)?;
    Ok(())
}

/// Flatten derive errors into a single dotted-path error
fn first_field_error(errors: &ValidationErrors) -> ContractError {
    fn walk(prefix: &str, errors: &ValidationErrors) -> Option<ContractError> {
        for (field, kind) in errors.errors() {
            let path = if prefix.is_empty() {
                field.to_string()
            } else {
                format!("{prefix}.{field}")
            };
            match kind {
                ValidationErrorsKind::Field(list) => {
                    if let Some(err) = list.first() {
                        let message = err
                            .message
                            .as_ref()
                            .map(|m| m.to_string())
                            .unwrap_or_else(|| format!("failed rule '{}'", err.code));
                        return Some(ContractError::config_validation(path, message));
                    }
                }
                ValidationErrorsKind::Struct(inner) => {
                    if let Some(err) = walk(&path, inner) {
                        return Some(err);
                    }
                }
                ValidationErrorsKind::List(items) => {
                    for (idx, inner) in items {
                        if let Some(err) = walk(&format!("{path}[{idx}]"), inner) {
                            return Some(err);
                        }
                    }
                }
            }
        }
        None
    }

    walk("", errors)
        .unwrap_or_else(|| ContractError::config_validation("<root>", errors.to_string()))
}

/// Validate the selected device link has what it needs
fn validate_device(blueprint: &MonitorBlueprint) -> Result<(), ContractError> {
    match blueprint.device.mode {
        DeviceMode::Live => {
            let address = blueprint.device.address.trim();
            if address.is_empty() {
                return Err(ContractError::config_validation(
                    "device.address",
                    "live mode requires a serial device path or tcp://host:port",
                ));
            }
            if let Some(rest) = address.strip_prefix("tcp://") {
                let has_port = rest
                    .rsplit_once(':')
                    .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok());
                if !has_port {
                    return Err(ContractError::config_validation(
                        "device.address",
                        format!("'{address}' is not a valid tcp://host:port address"),
                    ));
                }
            }
        }
        DeviceMode::Replay => {
            let has_path = blueprint
                .replay
                .path
                .as_ref()
                .is_some_and(|p| !p.as_os_str().is_empty());
            if !has_path {
                return Err(ContractError::config_validation(
                    "replay.path",
                    "replay mode requires a capture file path",
                ));
            }
        }
        DeviceMode::Simulated => {}
    }
    Ok(())
}

/// Validate threshold pairs are ordered
fn validate_thresholds(t: &AlertThresholds) -> Result<(), ContractError> {
    let pairs = [
        ("temperature", t.temperature_low, t.temperature_high),
        ("ph", t.ph_low, t.ph_high),
        ("ph_critical", t.ph_critical_low, t.ph_critical_high),
        ("humidity", t.humidity_low, t.humidity_high),
    ];
    for (name, low, high) in pairs {
        if !low.is_finite() || !high.is_finite() {
            return Err(ContractError::config_validation(
                format!("alerts.{name}"),
                "thresholds must be finite numbers",
            ));
        }
        if low >= high {
            return Err(ContractError::config_validation(
                format!("alerts.{name}_low / alerts.{name}_high"),
                format!("low ({low}) must be < high ({high})"),
            ));
        }
    }
    if t.ph_critical_low > t.ph_low || t.ph_critical_high < t.ph_high {
        return Err(ContractError::config_validation(
            "alerts.ph_critical_low / alerts.ph_critical_high",
            "critical pH band must enclose the warning band",
        ));
    }
    Ok(())
}

/// Validate shutdown bounds
fn validate_timeouts(blueprint: &MonitorBlueprint) -> Result<(), ContractError> {
    let pipeline = &blueprint.pipeline;
    if pipeline.link_stop_timeout_ms > pipeline.shutdown_timeout_ms {
        return Err(ContractError::config_validation(
            "pipeline.link_stop_timeout_ms",
            format!(
                "link_stop_timeout_ms ({}) must be <= shutdown_timeout_ms ({})",
                pipeline.link_stop_timeout_ms, pipeline.shutdown_timeout_ms
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn field_of(err: ContractError) -> String {
        match err {
            ContractError::ConfigValidation { field, .. } => field,
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_default_is_valid() {
        assert!(validate(&MonitorBlueprint::default()).is_ok());
        assert!(validate(&MonitorBlueprint::simulated()).is_ok());
    }

    #[test]
    fn test_live_requires_address() {
        let mut bp = MonitorBlueprint::default();
        bp.device.address = "  ".into();
        assert_eq!(field_of(validate(&bp).unwrap_err()), "device.address");
    }

    #[test]
    fn test_tcp_address_needs_port() {
        let mut bp = MonitorBlueprint::default();
        bp.device.address = "tcp://localhost".into();
        assert!(validate(&bp).is_err());
        bp.device.address = "tcp://localhost:7000".into();
        assert!(validate(&bp).is_ok());
    }

    #[test]
    fn test_replay_requires_path() {
        let mut bp = MonitorBlueprint::default();
        bp.device.mode = DeviceMode::Replay;
        assert_eq!(field_of(validate(&bp).unwrap_err()), "replay.path");
        bp.replay.path = Some(PathBuf::from("capture.log"));
        assert!(validate(&bp).is_ok());
    }

    #[test]
    fn test_derive_rule_reports_nested_path() {
        let mut bp = MonitorBlueprint::simulated();
        bp.pipeline.queue_capacity = 0;
        assert_eq!(
            field_of(validate(&bp).unwrap_err()),
            "pipeline.queue_capacity"
        );
    }

    #[test]
    fn test_thresholds_ordered() {
        let mut bp = MonitorBlueprint::simulated();
        bp.alerts.humidity_low = 80.0;
        let err = validate(&bp).unwrap_err();
        assert!(err.to_string().contains("humidity"));
    }

    #[test]
    fn test_link_timeout_bounded_by_shutdown() {
        let mut bp = MonitorBlueprint::simulated();
        bp.pipeline.link_stop_timeout_ms = 10_000;
        bp.pipeline.shutdown_timeout_ms = 1_000;
        assert_eq!(
            field_of(validate(&bp).unwrap_err()),
            "pipeline.link_stop_timeout_ms"
        );
    }
}
