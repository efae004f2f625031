//! 寄存器编解码
//!
//! 纯函数：多个大端 16 位字合并为整数，再按格式缩放为逻辑值；写入时做逆变换。

use crate::catalog::ELECTRICAL_SETPOINT_KEY;
use crate::error::ProtocolError;
use crate::types::{RegisterFormat, RegisterSpec};
use domain::RegisterValue;

/// 电功率设定值下限（W）
pub const SETPOINT_MIN_W: f64 = 0.0;
/// 电功率设定值上限（W）
pub const SETPOINT_MAX_W: f64 = 20_000.0;
/// 设定值寄存器每个原始计数对应 10 W
pub const SETPOINT_STEP_W: f64 = 10.0;

/// 按高位字在前合并寄存器；有符号类型按 `16 * words.len()` 位补码解释。
pub fn combine_words(words: &[u16], signed: bool) -> i128 {
    let bits = 16 * words.len() as u32;
    let unsigned = words
        .iter()
        .fold(0u128, |acc, word| (acc << 16) | u128::from(*word));
    if signed && bits > 0 && unsigned & (1u128 << (bits - 1)) != 0 {
        unsigned as i128 - (1i128 << bits)
    } else {
        unsigned as i128
    }
}

/// 把寄存器原始字解码为逻辑值。
pub fn decode(spec: &RegisterSpec, words: &[u16]) -> Result<RegisterValue, ProtocolError> {
    let count = usize::from(spec.word_count);
    if words.len() < count {
        return Err(ProtocolError::ShortRead {
            key: spec.key.clone(),
            expected: count,
            actual: words.len(),
        });
    }

    let raw = combine_words(&words[..count], spec.raw_type.is_signed());
    match spec.format {
        RegisterFormat::Fix(0)
        | RegisterFormat::Enum
        | RegisterFormat::Raw
        | RegisterFormat::DateTime => i64::try_from(raw)
            .map(RegisterValue::I64)
            .map_err(|_| ProtocolError::OutOfRange {
                key: spec.key.clone(),
                value: raw.to_string(),
            }),
        RegisterFormat::Fix(decimals) => Ok(RegisterValue::F64(
            raw as f64 / 10f64.powi(i32::from(decimals)),
        )),
        RegisterFormat::Temp => {
            let celsius = raw as f64 / 10.0;
            Ok(RegisterValue::F64((celsius * 10.0).round() / 10.0))
        }
    }
}

/// 把逻辑值编码为寄存器原始位模式（有符号类型返回补码）。
pub fn encode(spec: &RegisterSpec, value: RegisterValue) -> Result<u64, ProtocolError> {
    let out_of_range = || ProtocolError::OutOfRange {
        key: spec.key.clone(),
        value: value.to_string(),
    };

    let raw: i128 = match (spec.format, value) {
        (RegisterFormat::Fix(decimals), _) => {
            scaled_to_int(value.as_f64() * 10f64.powi(i32::from(decimals)), true)
                .ok_or_else(out_of_range)?
        }
        (RegisterFormat::Temp, _) => {
            scaled_to_int(value.as_f64() * 10.0, true).ok_or_else(out_of_range)?
        }
        (_, RegisterValue::I64(integer)) => i128::from(integer),
        (_, RegisterValue::F64(float)) => scaled_to_int(float, false).ok_or_else(out_of_range)?,
    };

    let bits = 16 * u32::from(spec.word_count);
    let (min, max) = if spec.raw_type.is_signed() {
        (-(1i128 << (bits - 1)), (1i128 << (bits - 1)) - 1)
    } else {
        (0, (1i128 << bits) - 1)
    };
    if raw < min || raw > max {
        return Err(out_of_range());
    }

    let pattern = if raw < 0 { raw + (1i128 << bits) } else { raw };
    u64::try_from(pattern).map_err(|_| out_of_range())
}

/// 浮点转整数：缩放格式四舍五入，透传格式向零截断。
fn scaled_to_int(value: f64, round: bool) -> Option<i128> {
    if !value.is_finite() {
        return None;
    }
    let value = if round { value.round() } else { value.trunc() };
    if value.abs() > 1e30 {
        return None;
    }
    Some(value as i128)
}

/// 电功率设定值量化：限幅到 [0, 20000] W 后按 10 W 步进取整。
///
/// 返回 (寄存器原始值, 实际下发的瓦数)。
pub fn quantize_setpoint(watts: f64) -> Result<(u16, f64), ProtocolError> {
    if !watts.is_finite() {
        return Err(ProtocolError::OutOfRange {
            key: ELECTRICAL_SETPOINT_KEY.to_string(),
            value: watts.to_string(),
        });
    }
    let clamped = watts.clamp(SETPOINT_MIN_W, SETPOINT_MAX_W);
    let steps = (clamped / SETPOINT_STEP_W).round() as u16;
    Ok((steps, f64::from(steps) * SETPOINT_STEP_W))
}
