use chp_telemetry::{metrics, record_heartbeat_sent, record_read_latency_ms, record_retry};

#[test]
fn global_counters_increase() {
    let before = metrics().snapshot();
    record_retry();
    record_heartbeat_sent();
    record_read_latency_ms(40);
    let after = metrics().snapshot();

    assert!(after.retries > before.retries);
    assert!(after.heartbeats_sent > before.heartbeats_sent);
    assert!(after.read_latency_ms_total >= before.read_latency_ms_total + 40);
    assert!(after.read_latency_ms_count > before.read_latency_ms_count);
}
