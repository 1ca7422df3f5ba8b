//! Threshold alert derivation
//!
//! Pure function of one reading and the configured limits.

use contracts::{Alert, AlertKind, AlertThresholds, SensorReadings, Severity};

/// Alerts raised by a single reading
pub fn derive_alerts(sensors: &SensorReadings, limits: &AlertThresholds) -> Vec<Alert> {
    let mut alerts = Vec::new();

    let temperature = sensors.temperature;
    if temperature > limits.temperature_high {
        alerts.push(Alert {
            kind: AlertKind::HighTemperature,
            severity: Severity::Warning,
            message: format!("high temperature: {temperature:.1}°C"),
            sensor_value: temperature,
            threshold_value: limits.temperature_high,
        });
    } else if temperature < limits.temperature_low {
        alerts.push(Alert {
            kind: AlertKind::LowTemperature,
            severity: Severity::Warning,
            message: format!("low temperature: {temperature:.1}°C"),
            sensor_value: temperature,
            threshold_value: limits.temperature_low,
        });
    }

    let ph = sensors.ph;
    if ph < limits.ph_low || ph > limits.ph_high {
        let severity = if ph < limits.ph_critical_low || ph > limits.ph_critical_high {
            Severity::Critical
        } else {
            Severity::Warning
        };
        alerts.push(Alert {
            kind: AlertKind::PhOutOfRange,
            severity,
            message: format!(
                "pH out of range: {ph:.1} (ideal {:.1}-{:.1})",
                limits.ph_low, limits.ph_high
            ),
            sensor_value: ph,
            threshold_value: limits.ph_target,
        });
    }

    let humidity = sensors.humidity;
    if humidity < limits.humidity_low {
        alerts.push(Alert {
            kind: AlertKind::LowHumidity,
            severity: Severity::Warning,
            message: format!("low soil moisture: {humidity:.1}%"),
            sensor_value: humidity,
            threshold_value: limits.humidity_low,
        });
    } else if humidity > limits.humidity_high {
        alerts.push(Alert {
            kind: AlertKind::HighHumidity,
            severity: Severity::Info,
            message: format!("high soil moisture: {humidity:.1}%"),
            sensor_value: humidity,
            threshold_value: limits.humidity_high,
        });
    }

    for alert in &alerts {
        metrics::counter!(
            "soil_monitor_alerts_raised_total",
            "kind" => alert.kind.as_str(),
            "severity" => alert.severity.as_str()
        )
        .increment(1);
    }
    alerts
}
