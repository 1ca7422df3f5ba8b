//! # Integration Tests
//!
//! End-to-end tests across crates.
//!
//! Covers:
//! - Blueprint defaults and loader round trip
//! - Simulated, replayed and TCP-bridged runs through the coordinator
//! - Store failures while the pipeline keeps running
//! - Live back-pressure and device hang-up

#[cfg(test)]
mod contract_tests {
    use config_loader::ConfigLoader;
    use contracts::MonitorBlueprint;

    #[test]
    fn test_default_blueprint_round_trip() {
        let blueprint = MonitorBlueprint::default();
        ConfigLoader::validate(&blueprint).unwrap();

        let toml = ConfigLoader::to_toml(&blueprint).unwrap();
        let parsed = ConfigLoader::load_from_str(&toml, config_loader::ConfigFormat::Toml).unwrap();
        assert_eq!(parsed, blueprint);
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::io::Write;
    use std::net::TcpListener;
    use std::sync::Arc;
    use std::time::Duration;

    use contracts::{
        DeviceMode, IrrigationEvent, IrrigationEventType, MonitorBlueprint, StorageError,
        StorageStatistics, StoredAlert, StoredIrrigationEvent, StoredReading, TelemetryRecord,
        TelemetryStore, Trigger,
    };
    use pipeline::{Coordinator, PipelineStatistics, ShutdownStatus, StartOutcome};
    use storage::{MemoryStore, SqliteStore};
    use tokio::sync::watch;

    const WAIT: Duration = Duration::from_secs(10);

    fn fast_blueprint(mode: DeviceMode) -> MonitorBlueprint {
        let mut blueprint = MonitorBlueprint::simulated();
        blueprint.device.mode = mode;
        blueprint.device.read_timeout_ms = 50;
        blueprint.simulator.interval_ms = 200;
        blueprint.simulator.seed = Some(7);
        blueprint.replay.interval_ms = 5;
        blueprint.pipeline.poll_interval_ms = 20;
        blueprint
    }

    async fn wait_until(
        rx: &mut watch::Receiver<PipelineStatistics>,
        done: impl FnMut(&PipelineStatistics) -> bool,
    ) -> PipelineStatistics {
        tokio::time::timeout(WAIT, rx.wait_for(done))
            .await
            .expect("pipeline did not reach the expected state")
            .expect("statistics publisher dropped")
            .clone()
    }

    fn line(temperature: f64, humidity: f64, active: bool) -> String {
        format!(
            r#"{{"sensors":{{"temperature":{temperature},"humidity":{humidity},"ph":6.8,"phosphorus":true,"potassium":true}},"irrigation":{{"active":{active},"uptime":10,"dailyActivations":1}},"system":{{"freeHeap":150000,"uptime":3600,"wifi":"Connected"}}}}"#
        )
    }

    /// Simulated link at 2 records/s for 3 s -> worker -> memory store
    #[tokio::test]
    async fn test_e2e_simulated_pipeline() {
        let mut blueprint = fast_blueprint(DeviceMode::Simulated);
        blueprint.simulator.interval_ms = 500;
        let store = Arc::new(MemoryStore::new("memory"));
        let mut coordinator = Coordinator::from_blueprint(&blueprint, store.clone());

        assert_eq!(coordinator.start().await.unwrap(), StartOutcome::Started);
        tokio::time::sleep(Duration::from_secs(3)).await;
        let stats = coordinator.stop().await;

        assert!(stats.readings_received >= 5, "received {}", stats.readings_received);
        assert_eq!(stats.errors, 0);
        assert_eq!(stats.readings_stored, stats.readings_received - stats.errors);
        assert_eq!(store.reading_count() as u64, stats.readings_stored);
        assert_eq!(stats.sensors.temperature.count, stats.readings_stored);
        assert_eq!(coordinator.shutdown_status(), Some(&ShutdownStatus::Clean));

        let history = store.latest_readings(100).await.unwrap();
        assert_eq!(history.len() as u64, stats.readings_stored);
    }

    /// Store rejecting writes: every reading counts as an error, the worker survives
    #[tokio::test]
    async fn test_e2e_store_unavailable() {
        let store = Arc::new(MemoryStore::new("memory"));
        store.set_unavailable(true);
        let mut coordinator =
            Coordinator::from_blueprint(&fast_blueprint(DeviceMode::Simulated), store.clone());

        coordinator.start().await.unwrap();
        let mut rx = coordinator.subscribe();
        wait_until(&mut rx, |s| s.errors >= 2).await;

        store.set_unavailable(false);
        wait_until(&mut rx, |s| s.readings_stored >= 1).await;
        let stats = coordinator.stop().await;

        assert!(stats.errors >= 2);
        assert_eq!(stats.readings_stored, stats.readings_received - stats.errors);
        assert_eq!(store.reading_count() as u64, stats.readings_stored);
    }

    /// Store whose reading inserts take longer than the shutdown budget
    struct SlowStore {
        inner: MemoryStore,
        delay: Duration,
    }

    impl TelemetryStore for SlowStore {
        fn name(&self) -> &str {
            "slow"
        }

        async fn insert_sensor_reading(&self, record: &TelemetryRecord) -> Result<i64, StorageError> {
            tokio::time::sleep(self.delay).await;
            self.inner.insert_sensor_reading(record).await
        }

        async fn insert_irrigation_event(&self, event: &IrrigationEvent) -> Result<i64, StorageError> {
            self.inner.insert_irrigation_event(event).await
        }

        async fn insert_system_stats(&self, record: &TelemetryRecord) -> Result<i64, StorageError> {
            self.inner.insert_system_stats(record).await
        }

        async fn get_statistics(&self, period: Duration) -> Result<StorageStatistics, StorageError> {
            self.inner.get_statistics(period).await
        }

        async fn active_alerts(&self) -> Result<Vec<StoredAlert>, StorageError> {
            self.inner.active_alerts().await
        }

        async fn resolve_alert(&self, alert_id: i64) -> Result<bool, StorageError> {
            self.inner.resolve_alert(alert_id).await
        }

        async fn irrigation_history(
            &self,
            period: Duration,
        ) -> Result<Vec<StoredIrrigationEvent>, StorageError> {
            self.inner.irrigation_history(period).await
        }

        async fn latest_readings(&self, limit: usize) -> Result<Vec<StoredReading>, StorageError> {
            self.inner.latest_readings(limit).await
        }

        async fn cleanup(&self, retention: Duration) -> Result<u64, StorageError> {
            self.inner.cleanup(retention).await
        }
    }

    /// Worker stuck in a write past the shutdown budget: stop completes degraded
    #[tokio::test]
    async fn test_e2e_slow_store_degraded_shutdown() {
        let mut blueprint = fast_blueprint(DeviceMode::Simulated);
        blueprint.simulator.interval_ms = 20;
        blueprint.pipeline.shutdown_timeout_ms = 100;
        let store = Arc::new(SlowStore {
            inner: MemoryStore::new("memory"),
            delay: Duration::from_secs(5),
        });
        let mut coordinator = Coordinator::from_blueprint(&blueprint, store.clone());

        coordinator.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let started = std::time::Instant::now();
        let stats = coordinator.stop().await;
        assert!(started.elapsed() < Duration::from_secs(3));
        assert!(matches!(
            coordinator.shutdown_status(),
            Some(ShutdownStatus::Degraded(_))
        ));
        assert_eq!(stats.readings_stored, 0);
        assert!(!coordinator.is_running());

        // a second stop returns the same snapshot
        assert_eq!(coordinator.stop().await, stats);
    }

    /// TCP serial bridge with device logs, noise and a malformed frame
    #[tokio::test]
    async fn test_e2e_tcp_live_link() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let frames = vec![
            "[INFO] WiFi connected".to_string(),
            "ESP32 boot ok".to_string(),
            line(22.0, 45.0, false),
            line(23.0, 25.0, true),
            r#"{"sensors":{"temperature":"hot","humidity":45.0,"ph":6.5}}"#.to_string(),
            line(23.5, 38.0, false),
        ];
        let device = std::thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            for frame in frames {
                socket.write_all(frame.as_bytes()).unwrap();
                socket.write_all(b"\r\n").unwrap();
            }
            socket.flush().unwrap();
            std::thread::sleep(Duration::from_millis(500));
        });

        let mut blueprint = fast_blueprint(DeviceMode::Live);
        blueprint.device.address = format!("tcp://127.0.0.1:{port}");
        let store = Arc::new(MemoryStore::new("memory"));
        let mut coordinator = Coordinator::from_blueprint(&blueprint, store.clone());

        coordinator.start().await.unwrap();
        let mut rx = coordinator.subscribe();
        wait_until(&mut rx, |s| s.readings_received >= 4 && s.events_stored >= 2).await;
        let stats = coordinator.stop().await;
        device.join().unwrap();

        assert_eq!(stats.readings_received, 4);
        assert_eq!(stats.readings_stored, 3);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.lines_ignored, 1);
        assert_eq!(stats.events_stored, 2);

        let events = store.events();
        assert_eq!(events[0].event_type, IrrigationEventType::Start);
        assert_eq!(events[0].trigger, Trigger::Auto);
        assert_eq!(events[1].event_type, IrrigationEventType::Stop);
        assert!(events[1].duration_seconds.is_some());
    }

    /// TCP device sending one frame per line, closed once every frame is written
    fn tcp_device(frames: Vec<String>) -> (u16, std::thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let device = std::thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            for frame in frames {
                socket.write_all(frame.as_bytes()).unwrap();
                socket.write_all(b"\n").unwrap();
            }
            socket.flush().unwrap();
        });
        (port, device)
    }

    /// Live link backs off on a full queue instead of dropping frames
    #[tokio::test]
    async fn test_e2e_live_backpressure_keeps_every_frame() {
        let frames: Vec<String> = (0..20)
            .map(|i| line(20.0 + f64::from(i) / 10.0, 45.0, false))
            .collect();
        let (port, device) = tcp_device(frames);

        let mut blueprint = fast_blueprint(DeviceMode::Live);
        blueprint.device.address = format!("tcp://127.0.0.1:{port}");
        blueprint.pipeline.queue_capacity = 2;
        let store = Arc::new(MemoryStore::new("memory"));
        store.set_write_delay(Duration::from_millis(30));
        let mut coordinator = Coordinator::from_blueprint(&blueprint, store.clone());

        coordinator.start().await.unwrap();
        let mut rx = coordinator.subscribe();
        wait_until(&mut rx, |s| s.readings_stored >= 20).await;
        let stats = coordinator.stop().await;
        device.join().unwrap();

        assert_eq!(stats.readings_received, 20);
        assert_eq!(stats.readings_stored, 20);
        assert_eq!(stats.items_dropped, 0);
        assert_eq!(store.reading_count(), 20);
    }

    /// Device hanging up: the loop ends on its own, buffered frames still land
    #[tokio::test]
    async fn test_e2e_device_hangup_is_visible() {
        let frames = vec![line(22.0, 45.0, false), line(22.5, 44.0, false)];
        let (port, device) = tcp_device(frames);

        let mut blueprint = fast_blueprint(DeviceMode::Live);
        blueprint.device.address = format!("tcp://127.0.0.1:{port}");
        let store = Arc::new(MemoryStore::new("memory"));
        let mut coordinator = Coordinator::from_blueprint(&blueprint, store.clone());

        coordinator.start().await.unwrap();
        device.join().unwrap();
        tokio::time::timeout(WAIT, async {
            while coordinator.link_alive() {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("link stayed alive after the device hung up");
        assert!(coordinator.is_running());

        let stats = coordinator.stop().await;
        assert_eq!(stats.readings_stored, 2);
        assert_eq!(coordinator.shutdown_status(), Some(&ShutdownStatus::Clean));
    }

    /// Replayed capture into a SQLite file, then a report
    #[tokio::test]
    async fn test_e2e_replay_into_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let capture = dir.path().join("capture.log");
        let lines: Vec<String> = (0..10)
            .map(|i| line(20.0 + f64::from(i), 45.0, false))
            .chain(std::iter::once(line(40.0, 45.0, false)))
            .collect();
        std::fs::write(&capture, lines.join("\n")).unwrap();

        let mut blueprint = fast_blueprint(DeviceMode::Replay);
        blueprint.replay.path = Some(capture);
        blueprint.storage.path = dir.path().join("soil.db");
        let store = Arc::new(
            SqliteStore::open(&blueprint.storage.path, blueprint.alerts)
                .await
                .unwrap(),
        );
        let mut coordinator = Coordinator::from_blueprint(&blueprint, store.clone());

        coordinator.start().await.unwrap();
        let mut rx = coordinator.subscribe();
        wait_until(&mut rx, |s| s.readings_stored >= 11).await;
        coordinator.stop().await;

        let stats = store.get_statistics(Duration::from_secs(3600)).await.unwrap();
        assert_eq!(stats.total_readings, 11);
        assert_eq!(stats.max_temperature, Some(40.0));

        let report = coordinator
            .generate_report(Duration::from_secs(3600))
            .await
            .unwrap();
        assert_eq!(report.statistics.total_readings, 11);
        assert!(report.active_alerts >= 1);
        assert_eq!(report.top_alerts[0].alert.kind, contracts::AlertKind::HighTemperature);
        assert!(report.pipeline.is_some());

        let path = report.write_to_dir(dir.path().join("reports")).unwrap();
        assert!(path.exists());
    }
}
