use crate::DecodeError;
use crate::encoding::Reader;
use crate::pdu::{ExceptionResponse, FunctionCode};

/// A response PDU split into its function code and data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response<'a> {
    Data {
        function_code: FunctionCode,
        data: &'a [u8],
    },
    Exception(ExceptionResponse),
}

impl<'a> Response<'a> {
    pub fn decode(pdu: &'a [u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(pdu);
        let function_byte = r.read_u8()?;
        if FunctionCode::is_exception(function_byte) {
            return ExceptionResponse::decode(function_byte, &mut r).map(Self::Exception);
        }
        Ok(Self::Data {
            function_code: FunctionCode::from_u8(function_byte)?,
            data: r.rest(),
        })
    }

    /// The function code byte as it appeared on the wire, exception bit included.
    pub fn raw_function_code(&self) -> u8 {
        match self {
            Self::Data { function_code, .. } => function_code.as_u8(),
            Self::Exception(exception) => exception.function_code | 0x80,
        }
    }
}

fn byte_counted(data: &[u8]) -> Result<&[u8], DecodeError> {
    let mut r = Reader::new(data);
    let count = usize::from(r.read_u8()?);
    let body = r.read_exact(count)?;
    if !r.is_empty() {
        return Err(DecodeError::InvalidLength);
    }
    Ok(body)
}

/// Register values from a read-registers response (`byte count` + big-endian words).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterData<'a> {
    bytes: &'a [u8],
}

impl<'a> RegisterData<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self, DecodeError> {
        let bytes = byte_counted(data)?;
        if bytes.len() % 2 != 0 {
            return Err(DecodeError::InvalidLength);
        }
        Ok(Self { bytes })
    }

    pub fn len(&self) -> usize {
        self.bytes.len() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<u16> {
        let hi = *self.bytes.get(index * 2)?;
        let lo = *self.bytes.get(index * 2 + 1)?;
        Some(u16::from_be_bytes([hi, lo]))
    }

    pub fn iter(&self) -> impl Iterator<Item = u16> + 'a {
        self.bytes
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
    }
}

/// Bit values from a read-coils or read-discrete-inputs response, LSB first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitData<'a> {
    packed: &'a [u8],
}

impl<'a> BitData<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self, DecodeError> {
        Ok(Self {
            packed: byte_counted(data)?,
        })
    }

    /// Number of bits carried, including padding in the last byte.
    pub fn capacity(&self) -> usize {
        self.packed.len() * 8
    }

    pub fn get(&self, index: usize) -> Option<bool> {
        let byte = self.packed.get(index / 8)?;
        Some((byte >> (index % 8)) & 0x01 == 0x01)
    }

    /// The first `quantity` bits; `None` when the response carries fewer.
    pub fn take(&self, quantity: usize) -> Option<impl Iterator<Item = bool> + '_> {
        if quantity > self.capacity() {
            return None;
        }
        Some((0..quantity).filter_map(|i| self.get(i)))
    }
}

/// The `address, value` echo returned by single and multiple write functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteEcho {
    pub address: u16,
    pub value: u16,
}

impl WriteEcho {
    pub fn parse(data: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(data);
        let echo = Self {
            address: r.read_be_u16()?,
            value: r.read_be_u16()?,
        };
        if !r.is_empty() {
            return Err(DecodeError::InvalidLength);
        }
        Ok(echo)
    }
}
