// End-to-end tests against a stubbed MTConnect agent over HTTP
use mtconnect_stream::export::export_csv;
use mtconnect_stream::{
    discover, DocumentSource, HttpSource, MonitorConfig, StreamError, StreamMonitor,
};
use std::thread;
use std::time::{Duration, Instant};

const CURRENT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<MTConnectStreams xmlns:m="urn:mtconnect.org:MTConnectStreams:1.3" xmlns="urn:mtconnect.org:MTConnectStreams:1.3">
  <Header creationTime="2025-03-01T10:00:00Z" sender="mazak" instanceId="1" version="1.3.0.18" bufferSize="131072"/>
  <Streams>
    <DeviceStream name="Mazak" uuid="M80104K162N">
      <ComponentStream component="Device" name="Mazak" componentId="d1">
        <Events>
          <Availability dataItemId="avail" timestamp="2025-03-01T09:00:00Z" sequence="1">AVAILABLE</Availability>
          <EmergencyStop dataItemId="estop" timestamp="2025-03-01T09:00:00Z" sequence="2">ARMED</EmergencyStop>
        </Events>
      </ComponentStream>
      <ComponentStream component="Rotary" name="C" componentId="c1">
        <Samples>
          <RotaryVelocity dataItemId="Srpm" name="Srpm" subType="ACTUAL" timestamp="2025-03-01T09:59:59Z" sequence="3">1500</RotaryVelocity>
        </Samples>
      </ComponentStream>
      <ComponentStream component="Linear" name="X" componentId="x1">
        <Samples>
          <Position dataItemId="Xabs" name="Xabs" subType="ACTUAL" timestamp="2025-03-01T09:59:59Z" sequence="4">UNAVAILABLE</Position>
        </Samples>
      </ComponentStream>
      <ComponentStream component="Path" name="path" componentId="p1">
        <Events>
          <Execution dataItemId="execution" timestamp="2025-03-01T09:59:00Z" sequence="5">ACTIVE</Execution>
          <PartCount dataItemId="PartCountAct" timestamp="2025-03-01T09:59:00Z" sequence="6">17</PartCount>
        </Events>
        <Condition>
          <Normal dataItemId="path_system" type="SYSTEM" timestamp="2025-03-01T09:00:00Z" sequence="7"/>
        </Condition>
      </ComponentStream>
    </DeviceStream>
  </Streams>
</MTConnectStreams>"#;

fn wait_for(condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn test_http_source_and_discovery() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("GET", "/current")
        .with_status(200)
        .with_header("content-type", "application/xml")
        .with_body(CURRENT)
        .expect(2)
        .create();

    let url = format!("{}/current", server.url());
    let source = HttpSource::new(Duration::from_secs(2)).unwrap();

    let body = source.fetch(&url).unwrap();
    assert!(body.contains("MTConnectStreams"));

    let catalog = discover(&source, &url, None);
    mock.assert();

    let numeric: Vec<&str> = catalog.numeric_signals().labels().collect();
    let status: Vec<&str> = catalog.status_signals().labels().collect();
    assert_eq!(numeric, vec!["Srpm (C - Mazak)", "Part Count Act (path - Mazak)"]);
    assert_eq!(
        status,
        vec!["Avail (Mazak - Mazak)", "Estop (Mazak - Mazak)", "Execution (path - Mazak)"]
    );
}

#[test]
fn test_http_error_status() {
    let mut server = mockito::Server::new();
    let _mock = server.mock("GET", "/current").with_status(503).create();

    let url = format!("{}/current", server.url());
    let source = HttpSource::new(Duration::from_secs(2)).unwrap();

    assert!(matches!(source.fetch(&url), Err(StreamError::Fetch(_))));
    assert!(discover(&source, &url, None).is_empty());
}

#[test]
fn test_monitor_poll_and_export() {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut server = mockito::Server::new();
    let _mock = server
        .mock("GET", "/current")
        .with_status(200)
        .with_body(CURRENT)
        .create();

    let config = MonitorConfig::new(format!("{}/current", server.url()))
        .with_poll_interval(Duration::from_millis(20))
        .with_max_history(3);
    let monitor = StreamMonitor::connect_http(config).unwrap();

    monitor
        .set_selection(["Srpm (C - Mazak)", "Execution (path - Mazak)", "Estop (Mazak - Mazak)"])
        .unwrap();
    wait_for(|| monitor.get_latest_snapshot().len() == 3);

    let panel = monitor.status_panel();
    assert_eq!(panel.execution_state.as_deref(), Some("ACTIVE"));
    assert_eq!(panel.emergency_stop.as_deref(), Some("ARMED"));
    assert_eq!(panel.availability, None);

    let snapshot = monitor.get_latest_snapshot();
    assert!(snapshot.len() <= 3);
    assert!(snapshot.iter().all(|r| r.key_count() == 4));
    assert!(monitor.stop());

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("machine_state_log.csv");
    let selection = mtconnect_stream::SelectionSet::from_pairs(vec![
        ("Srpm (C - Mazak)", "Srpm"),
        ("Execution (path - Mazak)", "execution"),
        ("Estop (Mazak - Mazak)", "estop"),
    ]);
    let rows = export_csv(&path, &selection, &snapshot).unwrap();
    assert_eq!(rows, snapshot.len());

    let content = std::fs::read_to_string(&path).unwrap();
    let mut lines = content.lines();
    assert_eq!(
        lines.next(),
        Some("Timestamp,Srpm (C - Mazak),Execution (path - Mazak),Estop (Mazak - Mazak)")
    );
    assert_eq!(lines.next(), Some("2025-03-01T10:00:00Z,1500,ACTIVE,ARMED"));
}

#[test]
fn test_invalid_scheme_is_fatal() {
    let config = MonitorConfig::new("mtconnect://agent/current");
    assert!(matches!(
        StreamMonitor::connect_http(config),
        Err(StreamError::Config(_))
    ));
}
