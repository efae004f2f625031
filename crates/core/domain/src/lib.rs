//! CHP 设备各模块共享的值类型。

pub mod data;

pub use data::{Readings, RegisterValue};
