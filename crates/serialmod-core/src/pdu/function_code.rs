use crate::DecodeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FunctionCode {
    ReadCoils,
    ReadDiscreteInputs,
    ReadHoldingRegisters,
    ReadInputRegisters,
    WriteSingleCoil,
    WriteSingleRegister,
    WriteMultipleCoils,
    WriteMultipleRegisters,
    MaskWriteRegister,
    ReadWriteMultipleRegisters,
    Custom(u8),
}

/// How long the data part of a normal (non-exception) response must be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseLength {
    /// Exactly `n` data bytes, e.g. the address/value echo of a write.
    Fixed(usize),
    /// A leading byte count followed by that many bytes.
    ByteCount,
    /// Not known for this function code; any length is accepted.
    Unknown,
}

impl ResponseLength {
    pub fn matches(self, data: &[u8]) -> bool {
        match self {
            Self::Fixed(len) => data.len() == len,
            Self::ByteCount => data
                .split_first()
                .is_some_and(|(count, rest)| usize::from(*count) == rest.len()),
            Self::Unknown => true,
        }
    }
}

impl FunctionCode {
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::ReadCoils => 0x01,
            Self::ReadDiscreteInputs => 0x02,
            Self::ReadHoldingRegisters => 0x03,
            Self::ReadInputRegisters => 0x04,
            Self::WriteSingleCoil => 0x05,
            Self::WriteSingleRegister => 0x06,
            Self::WriteMultipleCoils => 0x0F,
            Self::WriteMultipleRegisters => 0x10,
            Self::MaskWriteRegister => 0x16,
            Self::ReadWriteMultipleRegisters => 0x17,
            Self::Custom(code) => code,
        }
    }

    /// Fails for bytes with the exception bit set; they never name a request.
    pub fn from_u8(value: u8) -> Result<Self, DecodeError> {
        if Self::is_exception(value) {
            return Err(DecodeError::InvalidFunctionCode);
        }
        match value {
            0x01 => Ok(Self::ReadCoils),
            0x02 => Ok(Self::ReadDiscreteInputs),
            0x03 => Ok(Self::ReadHoldingRegisters),
            0x04 => Ok(Self::ReadInputRegisters),
            0x05 => Ok(Self::WriteSingleCoil),
            0x06 => Ok(Self::WriteSingleRegister),
            0x0F => Ok(Self::WriteMultipleCoils),
            0x10 => Ok(Self::WriteMultipleRegisters),
            0x16 => Ok(Self::MaskWriteRegister),
            0x17 => Ok(Self::ReadWriteMultipleRegisters),
            _ => Ok(Self::Custom(value)),
        }
    }

    pub const fn is_exception(value: u8) -> bool {
        (value & 0x80) != 0
    }

    pub const fn expected_response(self) -> ResponseLength {
        match self {
            Self::ReadCoils
            | Self::ReadDiscreteInputs
            | Self::ReadHoldingRegisters
            | Self::ReadInputRegisters
            | Self::ReadWriteMultipleRegisters => ResponseLength::ByteCount,
            Self::WriteSingleCoil
            | Self::WriteSingleRegister
            | Self::WriteMultipleCoils
            | Self::WriteMultipleRegisters => ResponseLength::Fixed(4),
            Self::MaskWriteRegister => ResponseLength::Fixed(6),
            Self::Custom(_) => ResponseLength::Unknown,
        }
    }
}
