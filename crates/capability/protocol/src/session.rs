//! TCP 会话管理
//!
//! 持有唯一的设备连接（或者没有连接）。`ensure_connected` 是唯一的
//! `Disconnected → Connected` 转换入口，进入 Connected 时补发已记住的心跳 PIN。

use crate::error::ProtocolError;
use crate::heartbeat::HeartbeatState;
use crate::transport::{Connector, RegisterTransport};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, error::Elapsed, timeout};
use tracing::{debug, info, warn};

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected,
}

/// 会话管理器
pub struct SessionManager {
    connector: Arc<dyn Connector>,
    transport: Option<Box<dyn RegisterTransport>>,
    heartbeat_address: Option<u16>,
    connect_timeout: Duration,
    request_timeout: Duration,
}

impl SessionManager {
    pub fn new(
        connector: Arc<dyn Connector>,
        heartbeat_address: Option<u16>,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Self {
        Self {
            connector,
            transport: None,
            heartbeat_address,
            connect_timeout,
            request_timeout,
        }
    }

    pub fn state(&self) -> SessionState {
        if self.transport.is_some() {
            SessionState::Connected
        } else {
            SessionState::Disconnected
        }
    }

    /// 确保连接可用。
    ///
    /// 新建连接且已记住 PIN 时，先写入 PIN 再返回，返回值表示是否发生了这次补发。
    /// 补发失败（瞬时错误或设备异常）都会关闭连接并原样返回错误。
    pub async fn ensure_connected(
        &mut self,
        heartbeat: &mut HeartbeatState,
    ) -> Result<bool, ProtocolError> {
        if self.transport.is_some() {
            return Ok(false);
        }

        let transport = match timeout(self.connect_timeout, self.connector.connect()).await {
            Ok(Ok(transport)) => transport,
            Ok(Err(err)) => return Err(connect_failed(err)),
            Err(_) => {
                return Err(connect_failed(ProtocolError::ConnectionUnavailable(
                    format!("connect timed out after {:?}", self.connect_timeout),
                )));
            }
        };
        self.transport = Some(transport);
        chp_telemetry::record_connect();
        info!(target: "chp.protocol", "connected to chp unit");

        let (Some(address), Some(pin)) = (self.heartbeat_address, heartbeat.pin()) else {
            return Ok(false);
        };
        if let Err(err) = self.write_on_open(address, pin).await {
            // 未补发心跳的连接不可继续使用
            self.close().await;
            warn!(target: "chp.protocol", address, error = %err, "heartbeat re-arm failed");
            return Err(err);
        }
        heartbeat.mark_sent(pin, Instant::now());
        chp_telemetry::record_rearm();
        info!(target: "chp.protocol", address, "heartbeat pin re-armed after connect");
        Ok(true)
    }

    /// FC=04 读取；未连接时先建立连接。
    pub async fn read_input_registers(
        &mut self,
        heartbeat: &mut HeartbeatState,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, ProtocolError> {
        self.ensure_connected(heartbeat).await?;
        chp_telemetry::record_read_request();
        let result = match self.transport.as_mut() {
            Some(transport) => {
                timeout(
                    self.request_timeout,
                    transport.read_input_registers(address, count),
                )
                .await
            }
            None => return Err(not_connected()),
        };
        let words = self.settle(result).await?;
        debug!(target: "chp.protocol", address, count, received = words.len(), "read input registers");
        Ok(words)
    }

    /// FC=06 写入；未连接时先建立连接（并补发心跳）。
    pub async fn write_single_register(
        &mut self,
        heartbeat: &mut HeartbeatState,
        address: u16,
        value: u16,
    ) -> Result<(), ProtocolError> {
        self.ensure_connected(heartbeat).await?;
        self.write_on_open(address, value).await
    }

    /// 关闭连接；可重复调用。
    pub async fn close(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.disconnect().await;
            info!(target: "chp.protocol", "connection closed");
        }
    }

    async fn write_on_open(&mut self, address: u16, value: u16) -> Result<(), ProtocolError> {
        let result = match self.transport.as_mut() {
            Some(transport) => {
                timeout(
                    self.request_timeout,
                    transport.write_single_register(address, value),
                )
                .await
            }
            None => return Err(not_connected()),
        };
        self.settle(result).await?;
        debug!(target: "chp.protocol", address, value, "wrote single register");
        Ok(())
    }

    /// 统一处理请求结果：瞬时错误关闭连接，设备异常保留连接。
    async fn settle<T>(
        &mut self,
        result: Result<Result<T, ProtocolError>, Elapsed>,
    ) -> Result<T, ProtocolError> {
        let err = match result {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(err)) => err,
            Err(_) => ProtocolError::TransientIo(format!(
                "request timed out after {:?}",
                self.request_timeout
            )),
        };
        match &err {
            ProtocolError::DeviceException { address, code } => {
                chp_telemetry::record_device_exception();
                warn!(target: "chp.protocol", address = *address, code = %code, "device answered with exception");
            }
            err if err.is_transient() => {
                chp_telemetry::record_transient_failure();
                warn!(target: "chp.protocol", error = %err, "socket error, dropping connection");
                self.close().await;
            }
            _ => {}
        }
        Err(err)
    }
}

fn connect_failed(err: ProtocolError) -> ProtocolError {
    chp_telemetry::record_connect_failure();
    let err = match err {
        ProtocolError::ConnectionUnavailable(_) => err,
        other => ProtocolError::ConnectionUnavailable(other.to_string()),
    };
    warn!(target: "chp.protocol", error = %err, "failed to connect to chp unit");
    err
}

fn not_connected() -> ProtocolError {
    ProtocolError::TransientIo("connection dropped before request".to_string())
}
