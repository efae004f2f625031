//! Modbus TCP 客户端配置与 tokio-modbus 传输实现
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! let config = ClientConfig::from_json(r#"{"host": "192.168.1.50", "unit_id": 1}"#)?;
//! let connector = ModbusTcpConnector::new(&config);
//! let client = ChpClient::new(config, RegisterCatalog::dachs()?, connector);
//! ```

use crate::error::ProtocolError;
use crate::planner::DEFAULT_MAX_BLOCK_WIDTH;
use crate::transport::{Connector, RegisterTransport};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;
use tokio_modbus::client::{Client, Context, Reader, Writer};
use tokio_modbus::prelude::{Slave, tcp};
use tracing::debug;

/// 客户端配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// 设备主机地址
    pub host: String,
    /// Modbus TCP 端口（默认 502）
    #[serde(default = "default_modbus_port")]
    pub port: u16,
    /// 从站 ID（默认 1）
    #[serde(default = "default_unit_id")]
    pub unit_id: u8,
    /// 连接超时（毫秒）
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    /// 单次请求超时（毫秒）
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
    /// 同一次读取中相邻请求的间隔（毫秒）
    #[serde(default = "default_request_gap")]
    pub request_gap_ms: u64,
    /// 重试退避基数（毫秒）
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_ms: u64,
    /// 单次读请求最大寄存器数
    #[serde(default = "default_max_block_width")]
    pub max_block_width: u16,
    /// 逐 key 读取（不合并区间）
    #[serde(default)]
    pub per_key_reads: bool,
    /// 心跳节流开关
    #[serde(default)]
    pub heartbeat_throttle: bool,
    /// 心跳节流最小间隔（秒）
    #[serde(default = "default_heartbeat_min_interval")]
    pub heartbeat_min_interval_secs: u64,
}

fn default_modbus_port() -> u16 {
    502
}

fn default_unit_id() -> u8 {
    1
}

fn default_connect_timeout() -> u64 {
    5000
}

fn default_request_timeout() -> u64 {
    3000
}

fn default_request_gap() -> u64 {
    20
}

fn default_retry_base_delay() -> u64 {
    200
}

fn default_max_block_width() -> u16 {
    DEFAULT_MAX_BLOCK_WIDTH
}

fn default_heartbeat_min_interval() -> u64 {
    10
}

impl ClientConfig {
    /// 使用默认参数创建配置。
    pub fn new(host: impl Into<String>, port: u16, unit_id: u8) -> Self {
        Self {
            host: host.into(),
            port,
            unit_id,
            connect_timeout_ms: default_connect_timeout(),
            request_timeout_ms: default_request_timeout(),
            request_gap_ms: default_request_gap(),
            retry_base_delay_ms: default_retry_base_delay(),
            max_block_width: default_max_block_width(),
            per_key_reads: false,
            heartbeat_throttle: false,
            heartbeat_min_interval_secs: default_heartbeat_min_interval(),
        }
    }

    /// 从 JSON 配置字符串解析
    pub fn from_json(json: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(json).map_err(|e| ProtocolError::ConfigParse(e.to_string()))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn request_gap(&self) -> Duration {
        Duration::from_millis(self.request_gap_ms)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn heartbeat_min_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_min_interval_secs)
    }
}

/// 基于 tokio-modbus 的连接器
#[derive(Debug, Clone)]
pub struct ModbusTcpConnector {
    host: String,
    port: u16,
    unit_id: u8,
}

impl ModbusTcpConnector {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            unit_id: config.unit_id,
        }
    }

    async fn resolve(&self) -> Result<SocketAddr, ProtocolError> {
        let mut addrs = tokio::net::lookup_host((self.host.as_str(), self.port))
            .await
            .map_err(|e| {
                ProtocolError::ConnectionUnavailable(format!("resolve {}: {}", self.host, e))
            })?;
        addrs.next().ok_or_else(|| {
            ProtocolError::ConnectionUnavailable(format!("no address for {}", self.host))
        })
    }
}

#[async_trait]
impl Connector for ModbusTcpConnector {
    async fn connect(&self) -> Result<Box<dyn RegisterTransport>, ProtocolError> {
        let addr = self.resolve().await?;
        let ctx = tcp::connect_slave(addr, Slave(self.unit_id))
            .await
            .map_err(|e| ProtocolError::ConnectionUnavailable(format!("{}: {}", addr, e)))?;
        debug!(target: "chp.protocol", %addr, unit_id = self.unit_id, "modbus tcp socket opened");
        Ok(Box::new(ModbusTcpTransport { ctx }))
    }
}

/// 基于 tokio-modbus `Context` 的寄存器会话
pub struct ModbusTcpTransport {
    ctx: Context,
}

fn map_modbus_error(err: tokio_modbus::Error) -> ProtocolError {
    match err {
        tokio_modbus::Error::Transport(io) => ProtocolError::from(io),
        // 帧错乱后连接状态不可信，按瞬时错误处理以触发重连
        other => ProtocolError::TransientIo(format!("protocol: {}", other)),
    }
}

#[async_trait]
impl RegisterTransport for ModbusTcpTransport {
    async fn read_input_registers(
        &mut self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, ProtocolError> {
        self.ctx
            .read_input_registers(address, count)
            .await
            .map_err(map_modbus_error)?
            .map_err(|code| ProtocolError::DeviceException {
                address,
                code: format!("{:?}", code),
            })
    }

    async fn write_single_register(
        &mut self,
        address: u16,
        value: u16,
    ) -> Result<(), ProtocolError> {
        self.ctx
            .write_single_register(address, value)
            .await
            .map_err(map_modbus_error)?
            .map_err(|code| ProtocolError::DeviceException {
                address,
                code: format!("{:?}", code),
            })
    }

    async fn disconnect(&mut self) {
        let _ = self.ctx.disconnect().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_defaults() {
        let config = ClientConfig::from_json(r#"{"host": "192.168.1.50"}"#).unwrap();
        assert_eq!(config, ClientConfig::new("192.168.1.50", 502, 1));
        assert_eq!(config.request_gap(), Duration::from_millis(20));
        assert_eq!(config.heartbeat_min_interval(), Duration::from_secs(10));
        assert_eq!(config.max_block_width, 50);
    }

    #[test]
    fn test_parse_config_overrides() {
        let json = r#"{"host": "chp.local", "port": 1502, "unit_id": 7, "per_key_reads": true, "heartbeat_throttle": true}"#;
        let config = ClientConfig::from_json(json).unwrap();
        assert_eq!(config.port, 1502);
        assert_eq!(config.unit_id, 7);
        assert!(config.per_key_reads);
        assert!(config.heartbeat_throttle);
    }

    #[test]
    fn test_parse_config_requires_host() {
        let err = ClientConfig::from_json(r#"{"port": 502}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::ConfigParse(_)));
    }
}
