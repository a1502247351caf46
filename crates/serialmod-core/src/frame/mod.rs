//! Serial application data unit framing: `address + pdu + checksum`.

pub mod ascii;
pub mod rtu;

use crate::encoding::Writer;
use crate::{DecodeError, EncodeError, MAX_PDU_LEN};
use core::fmt;

/// Wire framing used on the serial line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum FramingMode {
    /// Binary framing, CRC-16, frames delimited by line silence.
    #[default]
    Rtu,
    /// Hex text framing, LRC, frames delimited by `:` and CR LF.
    Ascii,
}

impl FramingMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Rtu => "rtu",
            Self::Ascii => "ascii",
        }
    }

    /// Case-insensitive parse of `"rtu"` / `"ascii"`.
    pub fn parse(input: &str) -> Option<Self> {
        if input.eq_ignore_ascii_case("rtu") {
            Some(Self::Rtu)
        } else if input.eq_ignore_ascii_case("ascii") {
            Some(Self::Ascii)
        } else {
            None
        }
    }

    /// Largest frame this framing can put on the wire.
    pub const fn max_frame_len(self) -> usize {
        match self {
            Self::Rtu => rtu::MAX_FRAME_LEN,
            Self::Ascii => ascii::MAX_FRAME_LEN,
        }
    }

    pub fn encode(self, w: &mut Writer<'_>, address: u8, pdu: &[u8]) -> Result<(), EncodeError> {
        match self {
            Self::Rtu => rtu::encode_frame(w, address, pdu),
            Self::Ascii => ascii::encode_frame(w, address, pdu),
        }
    }

    /// Validates a received frame and returns `(address, pdu)`.
    ///
    /// RTU frames are validated in place; ASCII frames are hex-decoded into
    /// `scratch`, which must hold at least [`ascii::MAX_DECODED_LEN`] bytes.
    pub fn decode<'a>(
        self,
        data: &'a [u8],
        scratch: &'a mut [u8],
    ) -> Result<(u8, &'a [u8]), DecodeError> {
        match self {
            Self::Rtu => rtu::decode_frame(data),
            Self::Ascii => ascii::decode_frame(data, scratch),
        }
    }
}

impl fmt::Display for FramingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) fn check_pdu(pdu: &[u8]) -> Result<(), EncodeError> {
    if pdu.is_empty() {
        return Err(EncodeError::EmptyPdu);
    }
    if pdu.len() > MAX_PDU_LEN {
        return Err(EncodeError::PduTooLarge { len: pdu.len() });
    }
    Ok(())
}
