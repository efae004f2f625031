//! CHP 代理运行配置加载。

use std::env;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env: {0}")]
    Missing(String),
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// 代理运行配置。
#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    pub host: String,
    pub port: u16,
    pub unit_id: u8,
    pub poll_interval_seconds: u64,
    pub heartbeat_interval_seconds: u64,
    pub glt_pin: Option<u16>,
    pub heartbeat_enabled: bool,
    pub heartbeat_throttle: bool,
    pub heartbeat_min_interval_seconds: u64,
    /// 轮询的 key 列表；None 表示使用默认快速集合
    pub keys: Option<Vec<String>>,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub request_gap_ms: u64,
    pub retry_base_delay_ms: u64,
    pub per_key_reads: bool,
    pub electrical_setpoint_w: Option<f64>,
}

impl AgentConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 从任意键值来源读取配置（测试中用 HashMap 代替进程环境）。
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = read_optional(&lookup, "CHP_HOST")
            .ok_or_else(|| ConfigError::Missing("CHP_HOST".to_string()))?;
        let port = read_with_default(&lookup, "CHP_PORT", 502u16)?;
        let unit_id = read_with_default(&lookup, "CHP_UNIT_ID", 1u8)?;
        let poll_interval_seconds =
            read_positive_u64(&lookup, "CHP_POLL_INTERVAL_SECONDS", 60)?;
        let heartbeat_interval_seconds =
            read_positive_u64(&lookup, "CHP_HEARTBEAT_INTERVAL_SECONDS", 300)?;
        let glt_pin = read_parsed_optional::<u16, _>(&lookup, "CHP_GLT_PIN")?;
        let heartbeat_enabled = read_bool_with_default(&lookup, "CHP_HEARTBEAT_ENABLED", true);
        let heartbeat_throttle = read_bool_with_default(&lookup, "CHP_HEARTBEAT_THROTTLE", false);
        let heartbeat_min_interval_seconds =
            read_with_default(&lookup, "CHP_HEARTBEAT_MIN_INTERVAL_SECONDS", 10u64)?;
        let keys = read_optional(&lookup, "CHP_KEYS").map(|value| split_keys(&value));
        let keys = keys.filter(|keys| !keys.is_empty());
        let connect_timeout_ms = read_positive_u64(&lookup, "CHP_CONNECT_TIMEOUT_MS", 5000)?;
        let request_timeout_ms = read_positive_u64(&lookup, "CHP_REQUEST_TIMEOUT_MS", 3000)?;
        let request_gap_ms = read_with_default(&lookup, "CHP_REQUEST_GAP_MS", 20u64)?;
        let retry_base_delay_ms = read_with_default(&lookup, "CHP_RETRY_BASE_DELAY_MS", 200u64)?;
        let per_key_reads = read_bool_with_default(&lookup, "CHP_PER_KEY_READS", false);
        let electrical_setpoint_w =
            read_parsed_optional::<f64, _>(&lookup, "CHP_ELECTRICAL_SETPOINT_W")?;
        if let Some(watts) = electrical_setpoint_w {
            if !watts.is_finite() {
                return Err(ConfigError::Invalid(
                    "CHP_ELECTRICAL_SETPOINT_W".to_string(),
                    watts.to_string(),
                ));
            }
        }

        Ok(Self {
            host,
            port,
            unit_id,
            poll_interval_seconds,
            heartbeat_interval_seconds,
            glt_pin,
            heartbeat_enabled,
            heartbeat_throttle,
            heartbeat_min_interval_seconds,
            keys,
            connect_timeout_ms,
            request_timeout_ms,
            request_gap_ms,
            retry_base_delay_ms,
            per_key_reads,
            electrical_setpoint_w,
        })
    }

    /// 是否需要运行心跳任务。
    pub fn heartbeat_active(&self) -> bool {
        self.heartbeat_enabled && self.glt_pin.is_some()
    }
}

fn split_keys(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(str::to_string)
        .collect()
}

fn read_optional<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => Some(value.trim().to_string()),
        _ => None,
    }
}

fn read_with_default<T, F>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    Ok(read_parsed_optional(lookup, key)?.unwrap_or(default))
}

fn read_parsed_optional<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match read_optional(lookup, key) {
        Some(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid(key.to_string(), value)),
        None => Ok(None),
    }
}

fn read_positive_u64<F>(lookup: &F, key: &str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = read_with_default(lookup, key, default)?;
    if value == 0 {
        return Err(ConfigError::Invalid(key.to_string(), "0".to_string()));
    }
    Ok(value)
}

fn read_bool_with_default<F>(lookup: &F, key: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    match read_optional(lookup, key) {
        Some(value) => matches!(
            value.to_ascii_lowercase().as_str(),
            "1" | "true" | "on" | "yes"
        ),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<AgentConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        AgentConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_host_is_set() {
        let config = load(&[("CHP_HOST", "192.168.1.50")]).unwrap();
        assert_eq!(config.host, "192.168.1.50");
        assert_eq!(config.port, 502);
        assert_eq!(config.unit_id, 1);
        assert_eq!(config.poll_interval_seconds, 60);
        assert_eq!(config.heartbeat_interval_seconds, 300);
        assert_eq!(config.glt_pin, None);
        assert!(config.heartbeat_enabled);
        assert!(!config.heartbeat_throttle);
        assert_eq!(config.heartbeat_min_interval_seconds, 10);
        assert_eq!(config.keys, None);
        assert_eq!(config.request_gap_ms, 20);
        assert!(!config.heartbeat_active());
    }

    #[test]
    fn host_is_required() {
        let err = load(&[("CHP_PORT", "502")]).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(key) if key == "CHP_HOST"));
    }

    #[test]
    fn parses_overrides() {
        let config = load(&[
            ("CHP_HOST", "chp.local"),
            ("CHP_UNIT_ID", "3"),
            ("CHP_GLT_PIN", "1234"),
            ("CHP_HEARTBEAT_THROTTLE", "on"),
            ("CHP_KEYS", " plant_status, temp_in_c ,,"),
            ("CHP_ELECTRICAL_SETPOINT_W", "5500"),
        ])
        .unwrap();
        assert_eq!(config.unit_id, 3);
        assert_eq!(config.glt_pin, Some(1234));
        assert!(config.heartbeat_throttle);
        assert!(config.heartbeat_active());
        assert_eq!(
            config.keys,
            Some(vec!["plant_status".to_string(), "temp_in_c".to_string()])
        );
        assert_eq!(config.electrical_setpoint_w, Some(5500.0));
    }

    #[test]
    fn rejects_invalid_numbers() {
        let err = load(&[("CHP_HOST", "h"), ("CHP_UNIT_ID", "300")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(key, _) if key == "CHP_UNIT_ID"));

        let err = load(&[("CHP_HOST", "h"), ("CHP_POLL_INTERVAL_SECONDS", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(..)));

        let err = load(&[("CHP_HOST", "h"), ("CHP_GLT_PIN", "pin")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(..)));
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let config = load(&[("CHP_HOST", "h"), ("CHP_PORT", " "), ("CHP_KEYS", ",")]).unwrap();
        assert_eq!(config.port, 502);
        assert_eq!(config.keys, None);
    }

    #[test]
    fn heartbeat_can_be_disabled() {
        let config = load(&[
            ("CHP_HOST", "h"),
            ("CHP_GLT_PIN", "1"),
            ("CHP_HEARTBEAT_ENABLED", "false"),
        ])
        .unwrap();
        assert!(!config.heartbeat_active());
    }
}
