//! 传输层抽象
//!
//! 会话管理器只依赖这两个 trait；生产实现见 `modbus_tcp`，测试使用内存脚本实现。

use crate::error::ProtocolError;
use async_trait::async_trait;

/// 建立到设备的 TCP 会话。
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn RegisterTransport>, ProtocolError>;
}

/// 已建立的寄存器会话。
///
/// 实现方需要把 socket 级错误映射为 [`ProtocolError::TransientIo`]，
/// 把设备异常响应映射为 [`ProtocolError::DeviceException`]。
#[async_trait]
pub trait RegisterTransport: Send {
    /// FC=04 读输入寄存器。设备返回的寄存器数量可能少于 `count`。
    async fn read_input_registers(
        &mut self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, ProtocolError>;

    /// FC=06 写单个寄存器。
    async fn write_single_register(&mut self, address: u16, value: u16)
    -> Result<(), ProtocolError>;

    /// 关闭会话，错误忽略。
    async fn disconnect(&mut self);
}
