//! Helpers for packing engineering values into 16-bit registers.

use crate::DecodeError;

/// Order of the two registers that carry a 32-bit value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum WordOrder {
    /// High word in the lower register address.
    #[default]
    BigEndian,
    /// Low word in the lower register address.
    LittleEndian,
}

/// Splits `value` into two registers in wire order.
pub const fn split_u32(value: u32, order: WordOrder) -> [u16; 2] {
    let high = (value >> 16) as u16;
    let low = value as u16;
    match order {
        WordOrder::BigEndian => [high, low],
        WordOrder::LittleEndian => [low, high],
    }
}

/// Joins two registers read in wire order into one value.
pub const fn combine_u32(first: u16, second: u16, order: WordOrder) -> u32 {
    let (high, low) = match order {
        WordOrder::BigEndian => (first, second),
        WordOrder::LittleEndian => (second, first),
    };
    ((high as u32) << 16) | low as u32
}

pub const fn to_signed16(raw: u16) -> i16 {
    raw as i16
}

pub const fn from_signed16(value: i16) -> u16 {
    value as u16
}

pub const fn to_signed32(raw: u32) -> i32 {
    raw as i32
}

pub const fn from_signed32(value: i32) -> u32 {
    value as u32
}

/// `value * factor`, truncated toward zero and saturated to the `i64` range.
pub fn scale_to_raw(value: f64, factor: f64) -> i64 {
    (value * factor) as i64
}

/// `raw / factor`; a zero factor cannot be inverted.
pub fn scale_from_raw(raw: i64, factor: f64) -> Result<f64, DecodeError> {
    if factor == 0.0 {
        return Err(DecodeError::InvalidValue);
    }
    Ok(raw as f64 / factor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_and_combines_words() {
        assert_eq!(split_u32(0xABCD_1234, WordOrder::BigEndian), [0xABCD, 0x1234]);
        assert_eq!(split_u32(0xABCD_1234, WordOrder::LittleEndian), [0x1234, 0xABCD]);
        assert_eq!(combine_u32(0x1234, 0x5678, WordOrder::BigEndian), 0x1234_5678);
        assert_eq!(combine_u32(0x1234, 0x5678, WordOrder::LittleEndian), 0x5678_1234);
    }

    #[test]
    fn signed_conversions() {
        assert_eq!(to_signed16(0xFFFE), -2);
        assert_eq!(to_signed16(0x8000), i16::MIN);
        assert_eq!(from_signed16(-1), 0xFFFF);
        assert_eq!(to_signed32(0x8000_0000), i32::MIN);
        assert_eq!(from_signed32(-2), 0xFFFF_FFFE);
    }

    #[test]
    fn scaling() {
        assert_eq!(scale_to_raw(1.259, 100.0), 125);
        assert_eq!(scale_to_raw(-1.259, 100.0), -125);
        assert_eq!(scale_to_raw(1.25, 0.0), 0);
        assert_eq!(from_signed16(scale_to_raw(-0.01, 100.0) as i16), 0xFFFF);
        assert_eq!(scale_from_raw(125, 100.0).unwrap(), 1.25);
        assert_eq!(scale_from_raw(125, 0.0).unwrap_err(), DecodeError::InvalidValue);
    }
}
