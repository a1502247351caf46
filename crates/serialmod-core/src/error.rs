use core::fmt;

/// Errors that can occur while encoding a request into wire bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EncodeError {
    BufferTooSmall,
    ValueOutOfRange,
    EmptyPdu,
    /// PDU longer than [`crate::MAX_PDU_LEN`].
    PduTooLarge { len: usize },
    /// Slave address in the reserved 248..=255 range.
    InvalidAddress(u8),
    /// Function code with the exception bit set.
    InvalidFunctionCode(u8),
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BufferTooSmall => f.write_str("buffer too small"),
            Self::ValueOutOfRange => f.write_str("value out of range"),
            Self::EmptyPdu => f.write_str("empty pdu"),
            Self::PduTooLarge { len } => {
                write!(f, "pdu of {len} bytes exceeds {} bytes", crate::MAX_PDU_LEN)
            }
            Self::InvalidAddress(address) => write!(f, "invalid slave address {address}"),
            Self::InvalidFunctionCode(code) => write!(f, "invalid function code 0x{code:02X}"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for EncodeError {}

/// Errors that can occur while decoding a received frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DecodeError {
    UnexpectedEof,
    InvalidLength,
    InvalidFunctionCode,
    InvalidValue,
    InvalidCrc { expected: u16, got: u16 },
    InvalidLrc { expected: u8, got: u8 },
    /// Missing or misplaced ASCII delimiter.
    InvalidFrame(&'static str),
    InvalidHexDigit(u8),
}

impl DecodeError {
    /// The frame arrived intact in shape but its checksum does not match.
    pub const fn is_checksum(&self) -> bool {
        matches!(self, Self::InvalidCrc { .. } | Self::InvalidLrc { .. })
    }

    /// The frame is malformed: bad delimiters, bad hex, bad length or layout.
    pub const fn is_framing(&self) -> bool {
        !self.is_checksum()
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEof => f.write_str("unexpected end of input"),
            Self::InvalidLength => f.write_str("invalid length"),
            Self::InvalidFunctionCode => f.write_str("invalid function code"),
            Self::InvalidValue => f.write_str("invalid value"),
            Self::InvalidCrc { expected, got } => {
                write!(f, "crc mismatch: expected 0x{expected:04X}, got 0x{got:04X}")
            }
            Self::InvalidLrc { expected, got } => {
                write!(f, "lrc mismatch: expected 0x{expected:02X}, got 0x{got:02X}")
            }
            Self::InvalidFrame(reason) => f.write_str(reason),
            Self::InvalidHexDigit(byte) => write!(f, "invalid hex digit 0x{byte:02X}"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for DecodeError {}

#[cfg(test)]
mod tests {
    use super::DecodeError;

    #[test]
    fn checksum_and_framing_are_disjoint() {
        let crc = DecodeError::InvalidCrc {
            expected: 1,
            got: 2,
        };
        let lrc = DecodeError::InvalidLrc {
            expected: 1,
            got: 2,
        };
        assert!(crc.is_checksum() && !crc.is_framing());
        assert!(lrc.is_checksum() && !lrc.is_framing());
        assert!(DecodeError::InvalidFrame("missing ':'").is_framing());
        assert!(DecodeError::InvalidHexDigit(b'G').is_framing());
        assert!(DecodeError::InvalidLength.is_framing());
    }
}
