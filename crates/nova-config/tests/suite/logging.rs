use nova_config::{init_tracing, LoggingConfig};
use tempfile::tempdir;

#[test]
fn file_sink_receives_nova_events() {
    let dir = tempdir().unwrap();
    let log = dir.path().join("nova.log");
    init_tracing(&LoggingConfig {
        level: "info".into(),
        stderr: false,
        file: Some(log.clone()),
        ..LoggingConfig::default()
    });

    tracing::warn!(target: "nova.config", "log file sink online");
    let contents = std::fs::read_to_string(&log).unwrap();
    assert!(contents.contains("log file sink online"), "{contents}");

    // Later calls keep the first subscriber.
    init_tracing(&LoggingConfig::default());
    tracing::warn!(target: "nova.config", "still the same sink");
    let contents = std::fs::read_to_string(&log).unwrap();
    assert!(contents.contains("still the same sink"), "{contents}");
}
