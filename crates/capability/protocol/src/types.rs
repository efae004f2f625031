//! 寄存器相关类型定义

use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 寄存器原始数值类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RawType {
    /// 16位无符号整数
    U16,
    /// 16位有符号整数
    S16,
    /// 32位无符号整数（2个寄存器）
    U32,
    /// 32位有符号整数（2个寄存器）
    S32,
    /// 64位无符号整数（4个寄存器）
    U64,
}

impl RawType {
    pub fn is_signed(self) -> bool {
        matches!(self, RawType::S16 | RawType::S32)
    }
}

/// 显示/缩放格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterFormat {
    /// 定点数：除以 10^n
    Fix(u8),
    /// 温度：除以 10 并保留一位小数
    Temp,
    /// 枚举值，原样透传
    Enum,
    /// 原始值，原样透传
    Raw,
    /// 日期时间，原样透传（由调用方解释）
    DateTime,
}

impl RegisterFormat {
    /// 缩放位数（FIXn 为 n，TEMP 为 1，其余为 0）。
    pub fn decimals(self) -> u8 {
        match self {
            RegisterFormat::Fix(n) => n,
            RegisterFormat::Temp => 1,
            RegisterFormat::Enum | RegisterFormat::Raw | RegisterFormat::DateTime => 0,
        }
    }
}

impl FromStr for RegisterFormat {
    type Err = ProtocolError;

    /// 解析格式标记。`FIX` 之后只取前导数字串，`FIX-DAW` 之类的后缀视为 FIX0。
    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let normalized = token.trim().to_ascii_uppercase();
        if let Some(rest) = normalized.strip_prefix("FIX") {
            let digits: String = rest
                .trim_start()
                .chars()
                .take_while(|ch| ch.is_ascii_digit())
                .collect();
            if digits.is_empty() {
                return Ok(RegisterFormat::Fix(0));
            }
            let decimals = digits
                .parse::<u8>()
                .ok()
                .filter(|n| *n <= 9)
                .ok_or_else(|| {
                    ProtocolError::InvalidCatalog(format!("unsupported format: {}", token))
                })?;
            return Ok(RegisterFormat::Fix(decimals));
        }
        match normalized.as_str() {
            "TEMP" => Ok(RegisterFormat::Temp),
            "ENUM" => Ok(RegisterFormat::Enum),
            "RAW" | "" => Ok(RegisterFormat::Raw),
            "DT" => Ok(RegisterFormat::DateTime),
            _ => Err(ProtocolError::InvalidCatalog(format!(
                "unsupported format: {}",
                token
            ))),
        }
    }
}

impl fmt::Display for RegisterFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegisterFormat::Fix(n) => write!(f, "FIX{}", n),
            RegisterFormat::Temp => f.write_str("TEMP"),
            RegisterFormat::Enum => f.write_str("ENUM"),
            RegisterFormat::Raw => f.write_str("RAW"),
            RegisterFormat::DateTime => f.write_str("DT"),
        }
    }
}

/// 访问权限
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// 只读（FC=04）
    ReadOnly,
    /// 可写（FC=06）
    ReadWrite,
}

/// 单个寄存器定义
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterSpec {
    /// 逻辑名称（全表唯一）
    pub key: String,
    /// 寄存器起始地址（字偏移）
    pub address: u16,
    /// 占用寄存器数量
    pub word_count: u16,
    /// 原始数值类型
    pub raw_type: RawType,
    /// 缩放格式
    pub format: RegisterFormat,
    /// 访问权限
    pub access: Access,
}

impl RegisterSpec {
    /// 最后一个寄存器地址（含）。
    pub fn end_address(&self) -> u16 {
        self.address.saturating_add(self.word_count.saturating_sub(1))
    }
}

/// 连续寄存器地址区间（闭区间）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressRange {
    pub start: u16,
    pub end: u16,
}

impl AddressRange {
    pub fn new(start: u16, end: u16) -> Self {
        Self { start, end }
    }

    /// 区间内寄存器数量。
    pub fn len(&self) -> u16 {
        self.end - self.start + 1
    }

    pub fn contains(&self, address: u16) -> bool {
        address >= self.start && address <= self.end
    }
}

impl fmt::Display for AddressRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}
