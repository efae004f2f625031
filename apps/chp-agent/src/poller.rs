//! 轮询与心跳任务
//!
//! 每个轮询周期读取一次 key 集合并合并到最近有效值；读取失败不清除已知值。

use chp_config::AgentConfig;
use chp_protocol::catalog::{FAST_KEYS, enum_label};
use chp_protocol::{ChpClient, ClientConfig, HeartbeatOutcome, RegisterCatalog};
use chp_telemetry::new_cycle_id;
use domain::{Readings, RegisterValue};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// 由代理配置生成客户端配置。
pub fn client_config(config: &AgentConfig) -> ClientConfig {
    let mut client = ClientConfig::new(config.host.clone(), config.port, config.unit_id);
    client.connect_timeout_ms = config.connect_timeout_ms;
    client.request_timeout_ms = config.request_timeout_ms;
    client.request_gap_ms = config.request_gap_ms;
    client.retry_base_delay_ms = config.retry_base_delay_ms;
    client.per_key_reads = config.per_key_reads;
    client.heartbeat_throttle = config.heartbeat_throttle;
    client.heartbeat_min_interval_secs = config.heartbeat_min_interval_seconds;
    client
}

/// 确定轮询的 key：配置中未知的 key 被丢弃，全部无效时回退到快速集合。
pub fn resolve_keys(catalog: &RegisterCatalog, configured: Option<&[String]>) -> Vec<String> {
    if let Some(configured) = configured {
        let keys = catalog.sanitize_read_keys(configured);
        let dropped = configured.len() - keys.len();
        if dropped > 0 {
            warn!(target: "chp.agent", dropped, "ignoring unknown or duplicate keys from CHP_KEYS");
        }
        if !keys.is_empty() {
            return keys;
        }
    }
    catalog.sanitize_read_keys(FAST_KEYS)
}

/// 最近有效值
#[derive(Debug, Default, Clone)]
pub struct LastGood {
    values: BTreeMap<String, RegisterValue>,
}

impl LastGood {
    /// 合并一次读取结果，`None` 不覆盖已知值。返回更新的 key 数量。
    pub fn merge(&mut self, readings: &Readings) -> usize {
        let mut updated = 0;
        for (key, value) in readings {
            if let Some(value) = value {
                self.values.insert(key.clone(), *value);
                updated += 1;
            }
        }
        updated
    }

    pub fn get(&self, key: &str) -> Option<RegisterValue> {
        self.values.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }
}

/// 执行一次轮询，失败只记录日志。
pub async fn poll_once(client: &ChpClient, keys: &[String], last_good: &mut LastGood) {
    let cycle_id = new_cycle_id();
    let readings = match client.read_keys(keys).await {
        Ok(readings) => readings,
        Err(err) => {
            warn!(
                target: "chp.agent",
                cycle_id = %cycle_id,
                error = %err,
                known = last_good.len(),
                "poll failed, keeping last known values"
            );
            return;
        }
    };

    let updated = last_good.merge(&readings);
    for (key, value) in &readings {
        match value {
            Some(value) => {
                let label = value.as_i64().and_then(|raw| enum_label(key, raw));
                debug!(target: "chp.agent", cycle_id = %cycle_id, key = %key, value = %value, label, "reading");
            }
            None => debug!(target: "chp.agent", cycle_id = %cycle_id, key = %key, "reading unavailable"),
        }
    }
    info!(
        target: "chp.agent",
        cycle_id = %cycle_id,
        requested = keys.len(),
        updated,
        "poll completed"
    );
}

/// 发送一次心跳，失败只记录日志。
pub async fn heartbeat_once(client: &ChpClient, pin: u16) {
    match client.heartbeat(Some(pin)).await {
        Ok(HeartbeatOutcome::Sent) => debug!(target: "chp.control", "heartbeat sent"),
        Ok(HeartbeatOutcome::Throttled) => debug!(target: "chp.control", "heartbeat throttled"),
        Err(err) => warn!(target: "chp.control", error = %err, "heartbeat failed"),
    }
}
