use std::collections::BTreeMap;
use std::fmt;

/// 解码后的寄存器逻辑值。
///
/// 整数类格式（ENUM/RAW/DT/FIX0）得到 `I64`，带缩放的格式（FIXn/TEMP）得到 `F64`。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RegisterValue {
    I64(i64),
    F64(f64),
}

impl RegisterValue {
    /// 以浮点数读取（用于编码与展示）。
    pub fn as_f64(&self) -> f64 {
        match self {
            RegisterValue::I64(value) => *value as f64,
            RegisterValue::F64(value) => *value,
        }
    }

    /// 以整数读取；浮点值仅在没有小数部分时返回。
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            RegisterValue::I64(value) => Some(*value),
            RegisterValue::F64(value) if value.fract() == 0.0 && value.is_finite() => {
                Some(*value as i64)
            }
            RegisterValue::F64(_) => None,
        }
    }
}

impl From<i64> for RegisterValue {
    fn from(value: i64) -> Self {
        RegisterValue::I64(value)
    }
}

impl From<u16> for RegisterValue {
    fn from(value: u16) -> Self {
        RegisterValue::I64(i64::from(value))
    }
}

impl From<f64> for RegisterValue {
    fn from(value: f64) -> Self {
        RegisterValue::F64(value)
    }
}

impl From<bool> for RegisterValue {
    fn from(value: bool) -> Self {
        RegisterValue::I64(i64::from(value))
    }
}

impl fmt::Display for RegisterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegisterValue::I64(value) => write!(f, "{}", value),
            RegisterValue::F64(value) => write!(f, "{}", value),
        }
    }
}

/// 一次读取的结果：key -> 值，`None` 表示该 key 读取失败。
pub type Readings = BTreeMap<String, Option<RegisterValue>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integral_float_converts_to_i64() {
        assert_eq!(RegisterValue::F64(42.0).as_i64(), Some(42));
        assert_eq!(RegisterValue::F64(42.5).as_i64(), None);
        assert_eq!(RegisterValue::from(true), RegisterValue::I64(1));
    }
}
