//! Integration tests for telemetry initialization and span helpers.

use workgroup::State;
use workgroup::telemetry::group::{record_state_transition, start_group_span};
use workgroup::telemetry::metrics::GroupInstruments;
use workgroup::telemetry::{TelemetryConfig, init_telemetry};

#[test]
fn telemetry_initializes_without_endpoint() {
    let config = TelemetryConfig {
        endpoint: None,
        service_name: "workgroup-test".to_string(),
    };
    // Err is acceptable if another test already set the global subscriber.
    if let Ok(guard) = init_telemetry(config) {
        assert!(!guard.is_exporting());
        guard.force_flush();
    }
}

#[test]
fn telemetry_config_defaults_service_name() {
    let config = TelemetryConfig::from_env();
    assert!(!config.service_name.is_empty());
}

#[test]
fn group_span_records_transitions() {
    let span = start_group_span("test/1/4", 4);
    record_state_transition(&span, State::Configured, State::Running);
    record_state_transition(&span, State::Running, State::Draining);
    record_state_transition(&span, State::Draining, State::Completed);
    record_state_transition(&span, State::Completed, State::Closed);
}

#[test]
fn instruments_record_without_a_provider() {
    let instruments = GroupInstruments::new("test/1/4");
    instruments.record_processed();
    instruments.record_idle_timeout();
    instruments.record_panic();
    instruments.record_duration(std::time::Duration::from_millis(3));
}
