use crate::encoding::{Reader, Writer};
use crate::pdu::FunctionCode;
use crate::{DecodeError, EncodeError, MAX_PDU_LEN};

pub const MAX_READ_BITS: u16 = 2000;
pub const MAX_READ_REGISTERS: u16 = 125;
pub const MAX_WRITE_COILS: u16 = 1968;
pub const MAX_WRITE_REGISTERS: u16 = 123;

const COIL_ON: u16 = 0xFF00;
const COIL_OFF: u16 = 0x0000;

fn checked_quantity(len: usize, max: u16) -> Result<u16, EncodeError> {
    let quantity = u16::try_from(len).map_err(|_| EncodeError::ValueOutOfRange)?;
    if quantity == 0 || quantity > max {
        return Err(EncodeError::ValueOutOfRange);
    }
    Ok(quantity)
}

fn decoded_quantity(quantity: u16, max: u16) -> Result<u16, DecodeError> {
    if quantity == 0 || quantity > max {
        return Err(DecodeError::InvalidValue);
    }
    Ok(quantity)
}

/// A request PDU built by the client. Data slices are borrowed from the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request<'a> {
    ReadCoils { start: u16, quantity: u16 },
    ReadDiscreteInputs { start: u16, quantity: u16 },
    ReadHoldingRegisters { start: u16, quantity: u16 },
    ReadInputRegisters { start: u16, quantity: u16 },
    WriteSingleCoil { address: u16, value: bool },
    WriteSingleRegister { address: u16, value: u16 },
    WriteMultipleCoils { start: u16, values: &'a [bool] },
    WriteMultipleRegisters { start: u16, values: &'a [u16] },
    MaskWriteRegister { address: u16, and_mask: u16, or_mask: u16 },
    Custom { function_code: u8, data: &'a [u8] },
}

impl<'a> Request<'a> {
    pub fn function_code(&self) -> FunctionCode {
        match self {
            Self::ReadCoils { .. } => FunctionCode::ReadCoils,
            Self::ReadDiscreteInputs { .. } => FunctionCode::ReadDiscreteInputs,
            Self::ReadHoldingRegisters { .. } => FunctionCode::ReadHoldingRegisters,
            Self::ReadInputRegisters { .. } => FunctionCode::ReadInputRegisters,
            Self::WriteSingleCoil { .. } => FunctionCode::WriteSingleCoil,
            Self::WriteSingleRegister { .. } => FunctionCode::WriteSingleRegister,
            Self::WriteMultipleCoils { .. } => FunctionCode::WriteMultipleCoils,
            Self::WriteMultipleRegisters { .. } => FunctionCode::WriteMultipleRegisters,
            Self::MaskWriteRegister { .. } => FunctionCode::MaskWriteRegister,
            Self::Custom { function_code, .. } => FunctionCode::Custom(*function_code),
        }
    }

    /// Writes the data part of the PDU, without the function code byte.
    pub fn encode_payload(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        match *self {
            Self::ReadCoils { start, quantity } | Self::ReadDiscreteInputs { start, quantity } => {
                checked_quantity(usize::from(quantity), MAX_READ_BITS)?;
                w.write_be_u16(start)?;
                w.write_be_u16(quantity)
            }
            Self::ReadHoldingRegisters { start, quantity }
            | Self::ReadInputRegisters { start, quantity } => {
                checked_quantity(usize::from(quantity), MAX_READ_REGISTERS)?;
                w.write_be_u16(start)?;
                w.write_be_u16(quantity)
            }
            Self::WriteSingleCoil { address, value } => {
                w.write_be_u16(address)?;
                w.write_be_u16(if value { COIL_ON } else { COIL_OFF })
            }
            Self::WriteSingleRegister { address, value } => {
                w.write_be_u16(address)?;
                w.write_be_u16(value)
            }
            Self::WriteMultipleCoils { start, values } => {
                let quantity = checked_quantity(values.len(), MAX_WRITE_COILS)?;
                let mut packed = [0u8; (MAX_WRITE_COILS as usize).div_ceil(8)];
                let used = pack_bits(values, &mut packed);
                w.write_be_u16(start)?;
                w.write_be_u16(quantity)?;
                w.write_u8(used as u8)?;
                w.write_all(&packed[..used])
            }
            Self::WriteMultipleRegisters { start, values } => {
                let quantity = checked_quantity(values.len(), MAX_WRITE_REGISTERS)?;
                w.write_be_u16(start)?;
                w.write_be_u16(quantity)?;
                w.write_u8((values.len() * 2) as u8)?;
                for value in values {
                    w.write_be_u16(*value)?;
                }
                Ok(())
            }
            Self::MaskWriteRegister {
                address,
                and_mask,
                or_mask,
            } => {
                w.write_be_u16(address)?;
                w.write_be_u16(and_mask)?;
                w.write_be_u16(or_mask)
            }
            Self::Custom { function_code, data } => {
                if FunctionCode::is_exception(function_code) {
                    return Err(EncodeError::InvalidFunctionCode(function_code));
                }
                if data.len() >= MAX_PDU_LEN {
                    return Err(EncodeError::PduTooLarge {
                        len: data.len() + 1,
                    });
                }
                w.write_all(data)
            }
        }
    }

    /// Writes the complete PDU: function code followed by the payload.
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        w.write_u8(self.function_code().as_u8())?;
        self.encode_payload(w)
    }
}

/// Packs bits LSB-first into `out`, returning the number of bytes used.
pub fn pack_bits(values: &[bool], out: &mut [u8]) -> usize {
    let used = values.len().div_ceil(8);
    out[..used].fill(0);
    for (i, value) in values.iter().enumerate() {
        if *value {
            out[i / 8] |= 1u8 << (i % 8);
        }
    }
    used
}

/// A request PDU as seen by a serving device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodedRequest<'a> {
    ReadCoils { start: u16, quantity: u16 },
    ReadDiscreteInputs { start: u16, quantity: u16 },
    ReadHoldingRegisters { start: u16, quantity: u16 },
    ReadInputRegisters { start: u16, quantity: u16 },
    WriteSingleCoil { address: u16, value: bool },
    WriteSingleRegister { address: u16, value: u16 },
    /// `packed` holds `quantity` bits, LSB first.
    WriteMultipleCoils { start: u16, quantity: u16, packed: &'a [u8] },
    /// `data` holds big-endian register values.
    WriteMultipleRegisters { start: u16, data: &'a [u8] },
    Other { function_code: FunctionCode, data: &'a [u8] },
}

impl<'a> DecodedRequest<'a> {
    pub fn function_code(&self) -> FunctionCode {
        match self {
            Self::ReadCoils { .. } => FunctionCode::ReadCoils,
            Self::ReadDiscreteInputs { .. } => FunctionCode::ReadDiscreteInputs,
            Self::ReadHoldingRegisters { .. } => FunctionCode::ReadHoldingRegisters,
            Self::ReadInputRegisters { .. } => FunctionCode::ReadInputRegisters,
            Self::WriteSingleCoil { .. } => FunctionCode::WriteSingleCoil,
            Self::WriteSingleRegister { .. } => FunctionCode::WriteSingleRegister,
            Self::WriteMultipleCoils { .. } => FunctionCode::WriteMultipleCoils,
            Self::WriteMultipleRegisters { .. } => FunctionCode::WriteMultipleRegisters,
            Self::Other { function_code, .. } => *function_code,
        }
    }

    pub fn decode(pdu: &'a [u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(pdu);
        let function_code = FunctionCode::from_u8(r.read_u8()?)?;
        let request = match function_code {
            FunctionCode::ReadCoils
            | FunctionCode::ReadDiscreteInputs
            | FunctionCode::ReadHoldingRegisters
            | FunctionCode::ReadInputRegisters => {
                let start = r.read_be_u16()?;
                let quantity = r.read_be_u16()?;
                match function_code {
                    FunctionCode::ReadCoils => Self::ReadCoils {
                        start,
                        quantity: decoded_quantity(quantity, MAX_READ_BITS)?,
                    },
                    FunctionCode::ReadDiscreteInputs => Self::ReadDiscreteInputs {
                        start,
                        quantity: decoded_quantity(quantity, MAX_READ_BITS)?,
                    },
                    FunctionCode::ReadHoldingRegisters => Self::ReadHoldingRegisters {
                        start,
                        quantity: decoded_quantity(quantity, MAX_READ_REGISTERS)?,
                    },
                    _ => Self::ReadInputRegisters {
                        start,
                        quantity: decoded_quantity(quantity, MAX_READ_REGISTERS)?,
                    },
                }
            }
            FunctionCode::WriteSingleCoil => {
                let address = r.read_be_u16()?;
                let value = match r.read_be_u16()? {
                    COIL_ON => true,
                    COIL_OFF => false,
                    _ => return Err(DecodeError::InvalidValue),
                };
                Self::WriteSingleCoil { address, value }
            }
            FunctionCode::WriteSingleRegister => Self::WriteSingleRegister {
                address: r.read_be_u16()?,
                value: r.read_be_u16()?,
            },
            FunctionCode::WriteMultipleCoils => {
                let start = r.read_be_u16()?;
                let quantity = decoded_quantity(r.read_be_u16()?, MAX_WRITE_COILS)?;
                let byte_count = usize::from(r.read_u8()?);
                if byte_count != usize::from(quantity).div_ceil(8) {
                    return Err(DecodeError::InvalidLength);
                }
                Self::WriteMultipleCoils {
                    start,
                    quantity,
                    packed: r.read_exact(byte_count)?,
                }
            }
            FunctionCode::WriteMultipleRegisters => {
                let start = r.read_be_u16()?;
                let quantity = decoded_quantity(r.read_be_u16()?, MAX_WRITE_REGISTERS)?;
                let byte_count = usize::from(r.read_u8()?);
                if byte_count != usize::from(quantity) * 2 {
                    return Err(DecodeError::InvalidLength);
                }
                Self::WriteMultipleRegisters {
                    start,
                    data: r.read_exact(byte_count)?,
                }
            }
            other => {
                return Ok(Self::Other {
                    function_code: other,
                    data: r.rest(),
                });
            }
        };
        if !r.is_empty() {
            return Err(DecodeError::InvalidLength);
        }
        Ok(request)
    }
}
