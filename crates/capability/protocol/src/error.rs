//! 协议错误类型定义

/// Modbus 寄存器客户端错误
///
/// 只有 [`ProtocolError::TransientIo`] 会在客户端内部重试，其余错误原样返回给调用方。
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// 请求的 key 不在寄存器表中（配置错误）
    #[error("unknown register key: {0}")]
    UnknownKey(String),

    /// 寄存器表校验失败
    #[error("invalid register catalog: {0}")]
    InvalidCatalog(String),

    /// 设备返回的寄存器数量不足
    #[error("short read for {key}: expected {expected} registers, got {actual}")]
    ShortRead {
        key: String,
        expected: usize,
        actual: usize,
    },

    /// 值超出寄存器可表示范围
    #[error("value out of range for {key}: {value}")]
    OutOfRange { key: String, value: String },

    /// 无法建立 TCP 会话
    #[error("connection unavailable: {0}")]
    ConnectionUnavailable(String),

    /// 通信过程中的 socket 错误（超时、复位、断管），可重试
    #[error("transient io error: {0}")]
    TransientIo(String),

    /// 设备返回 Modbus 异常响应
    #[error("device exception at register {address}: {code}")]
    DeviceException { address: u16, code: String },

    /// 未设置心跳 PIN
    #[error("no heartbeat pin configured")]
    NoHeartbeatConfigured,

    /// 配置解析错误
    #[error("config parse error: {0}")]
    ConfigParse(String),
}

impl ProtocolError {
    /// 是否属于可在内部重试的瞬时错误。
    pub fn is_transient(&self) -> bool {
        matches!(self, ProtocolError::TransientIo(_))
    }
}

impl From<std::io::Error> for ProtocolError {
    fn from(err: std::io::Error) -> Self {
        ProtocolError::TransientIo(err.to_string())
    }
}
