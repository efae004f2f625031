//! # Dachs GLT 寄存器客户端
//!
//! 通过 Modbus TCP 读取 CHP 机组遥测寄存器（FC=04），写入 GLT 心跳 PIN、
//! 电功率设定值与锁定标志（FC=06）。
//!
//! ## 架构设计
//!
//! ```text
//! ChpClient（单锁门面：重试、退避、心跳）
//!       │
//!       ├── RegisterCatalog  key → 地址/字数/类型/格式
//!       ├── BlockPlanner     key 集合 → 连续读取区间
//!       ├── codec            寄存器字 ⇄ 逻辑值
//!       │
//!       ▼
//! SessionManager（连接状态机，重连时补发心跳）
//!       │
//!       ▼
//! Connector / RegisterTransport（tokio-modbus 或测试脚本）
//! ```
//!
//! ## 配置格式
//!
//! ```json
//! { "host": "192.168.1.50", "port": 502, "unit_id": 1, "request_gap_ms": 20 }
//! ```

pub mod catalog;
pub mod codec;
mod client;
mod error;
mod heartbeat;
mod modbus_tcp;
pub mod planner;
mod retry;
mod session;
mod transport;
mod types;

pub use catalog::RegisterCatalog;
pub use client::ChpClient;
pub use error::ProtocolError;
pub use heartbeat::{HeartbeatOutcome, HeartbeatState};
pub use modbus_tcp::{ClientConfig, ModbusTcpConnector, ModbusTcpTransport};
pub use planner::{BlockPlanner, ReadBlock};
pub use retry::RetryPolicy;
pub use session::{SessionManager, SessionState};
pub use transport::{Connector, RegisterTransport};
pub use types::*;
