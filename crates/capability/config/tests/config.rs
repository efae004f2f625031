use chp_config::AgentConfig;

#[test]
fn load_config_from_env() {
    // Rust 2024 中 set_var 需要显式标注 unsafe（测试进程内可控）。
    unsafe {
        std::env::set_var("CHP_HOST", "192.168.1.50");
        std::env::set_var("CHP_POLL_INTERVAL_SECONDS", "30");
        std::env::set_var("CHP_GLT_PIN", "4711");
    }

    let config = AgentConfig::from_env().expect("config");
    assert_eq!(config.host, "192.168.1.50");
    assert_eq!(config.poll_interval_seconds, 30);
    assert_eq!(config.glt_pin, Some(4711));
    assert!(config.heartbeat_active());
}
