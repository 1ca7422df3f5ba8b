//! Irrigation session tracker

use chrono::{DateTime, Utc};
use contracts::{IrrigationEvent, TelemetryRecord, Trigger};
use tracing::{debug, info};

/// Soil moisture (%) below which a start is attributed to the controller
pub const DEFAULT_DRY_SOIL_THRESHOLD: f64 = 30.0;

/// Two-state irrigation tracker
///
/// Owned by a single consumer; not shared across tasks.
#[derive(Debug, Clone)]
pub struct StateTracker {
    last_active: Option<bool>,
    session_start: Option<DateTime<Utc>>,
    dry_soil_threshold: f64,
}

impl Default for StateTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StateTracker {
    pub fn new() -> Self {
        Self::with_dry_threshold(DEFAULT_DRY_SOIL_THRESHOLD)
    }

    /// Tracker using a custom auto-trigger moisture threshold
    pub fn with_dry_threshold(dry_soil_threshold: f64) -> Self {
        Self {
            last_active: None,
            session_start: None,
            dry_soil_threshold,
        }
    }

    /// Feed one record, returning the event its transition produced
    ///
    /// The first record ever only seeds the state: the pump may have been
    /// running long before we started listening, so no `start` is emitted.
    pub fn observe(&mut self, record: &TelemetryRecord) -> Option<IrrigationEvent> {
        let active = record.irrigation.active;
        let now = record.received_at;
        let moisture = record.sensors.humidity;

        let previous = self.last_active.replace(active);
        let event = match previous {
            None => {
                if active {
                    self.session_start = Some(now);
                }
                debug!(active, "irrigation state seeded");
                None
            }
            Some(false) if active => {
                let trigger = if moisture < self.dry_soil_threshold {
                    Trigger::Auto
                } else {
                    Trigger::Manual
                };
                self.session_start = Some(now);
                info!(%trigger, moisture, "irrigation started");
                Some(IrrigationEvent::start(now, trigger, Some(moisture)))
            }
            Some(true) if !active => {
                let duration = self
                    .session_start
                    .take()
                    .map(|start| (now - start).num_seconds().max(0) as u64);
                info!(duration_seconds = ?duration, moisture, "irrigation stopped");
                Some(IrrigationEvent::stop(now, duration, Some(moisture)))
            }
            Some(_) => None,
        };

        if let Some(event) = &event {
            metrics::counter!(
                "soil_monitor_irrigation_events_total",
                "event_type" => event.event_type.as_str()
            )
            .increment(1);
        }
        event
    }

    /// Back to the cold state
    pub fn reset(&mut self) {
        self.last_active = None;
        self.session_start = None;
    }

    /// Last observed pump state, `false` before any record
    pub fn is_active(&self) -> bool {
        self.last_active.unwrap_or(false)
    }

    /// Whether any record has been observed since the last reset
    pub fn is_seeded(&self) -> bool {
        self.last_active.is_some()
    }

    /// Start of the open session, if any
    pub fn session_start(&self) -> Option<DateTime<Utc>> {
        self.session_start
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use contracts::{
        IrrigationEventType, IrrigationStatus, SensorReadings, SystemStatus,
    };

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()
    }

    fn record(active: bool, humidity: f64, at: DateTime<Utc>) -> TelemetryRecord {
        TelemetryRecord {
            sensors: SensorReadings {
                temperature: 22.0,
                humidity,
                ph: 6.5,
                phosphorus_present: false,
                potassium_present: false,
                device_timestamp: None,
            },
            irrigation: IrrigationStatus {
                active,
                ..Default::default()
            },
            system: SystemStatus::default(),
            received_at: at,
            inferred_fields: Vec::new(),
        }
    }

    #[test]
    fn test_off_on_on_off_sequence() {
        let mut tracker = StateTracker::new();
        let times: Vec<_> = (0..4).map(|i| t0() + Duration::seconds(i * 30)).collect();

        assert!(tracker.observe(&record(false, 40.0, times[0])).is_none());

        let start = tracker.observe(&record(true, 25.0, times[1])).unwrap();
        assert_eq!(start.event_type, IrrigationEventType::Start);
        assert_eq!(start.trigger, Trigger::Auto);
        assert_eq!(start.moisture_at_event, Some(25.0));
        assert_eq!(start.timestamp, times[1]);

        assert!(tracker.observe(&record(true, 35.0, times[2])).is_none());

        let stop = tracker.observe(&record(false, 55.0, times[3])).unwrap();
        assert_eq!(stop.event_type, IrrigationEventType::Stop);
        assert_eq!(stop.duration_seconds, Some(60));
        assert_eq!(stop.trigger, Trigger::Unknown);
        assert_eq!(stop.moisture_at_event, Some(55.0));
        assert!(tracker.session_start().is_none());
    }

    #[test]
    fn test_first_record_active_only_seeds() {
        let mut tracker = StateTracker::new();
        assert!(tracker.observe(&record(true, 20.0, t0())).is_none());
        assert!(tracker.is_active());
        assert_eq!(tracker.session_start(), Some(t0()));

        let stop = tracker
            .observe(&record(false, 50.0, t0() + Duration::seconds(90)))
            .unwrap();
        assert_eq!(stop.duration_seconds, Some(90));
    }

    #[test]
    fn test_manual_trigger_when_soil_not_dry() {
        let mut tracker = StateTracker::new();
        tracker.observe(&record(false, 45.0, t0()));
        let start = tracker.observe(&record(true, 45.0, t0())).unwrap();
        assert_eq!(start.trigger, Trigger::Manual);

        let mut tracker = StateTracker::new();
        tracker.observe(&record(false, 30.0, t0()));
        let start = tracker.observe(&record(true, 30.0, t0())).unwrap();
        assert_eq!(start.trigger, Trigger::Manual, "threshold is exclusive");
    }

    #[test]
    fn test_clock_going_backwards_clamps_duration() {
        let mut tracker = StateTracker::new();
        tracker.observe(&record(false, 40.0, t0()));
        tracker.observe(&record(true, 40.0, t0()));
        let stop = tracker
            .observe(&record(false, 40.0, t0() - Duration::seconds(5)))
            .unwrap();
        assert_eq!(stop.duration_seconds, Some(0));
    }

    #[test]
    fn test_reset_returns_to_cold_state() {
        let mut tracker = StateTracker::new();
        tracker.observe(&record(false, 40.0, t0()));
        tracker.observe(&record(true, 40.0, t0()));
        tracker.reset();
        assert!(!tracker.is_seeded());
        assert!(tracker.session_start().is_none());
        // After reset the next active record only seeds again
        assert!(tracker.observe(&record(true, 40.0, t0())).is_none());
    }

    #[test]
    fn test_custom_threshold() {
        let mut tracker = StateTracker::with_dry_threshold(50.0);
        tracker.observe(&record(false, 45.0, t0()));
        let start = tracker.observe(&record(true, 45.0, t0())).unwrap();
        assert_eq!(start.trigger, Trigger::Auto);
    }

    #[test]
    fn test_events_serialize_snake_case() {
        let mut tracker = StateTracker::new();
        tracker.observe(&record(false, 20.0, t0()));
        let start = tracker.observe(&record(true, 20.0, t0())).unwrap();
        let json = serde_json::to_value(&start).unwrap();
        assert_eq!(json["event_type"], "start");
        assert_eq!(json["trigger"], "auto");
    }
}
