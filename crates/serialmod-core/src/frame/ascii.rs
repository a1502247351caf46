//! Modbus ASCII: `:` + hex(address, pdu, lrc) + CR LF.

use super::check_pdu;
use crate::encoding::{Reader, Writer};
use crate::{DecodeError, EncodeError, MAX_PDU_LEN};

pub const START: u8 = b':';
pub const END: [u8; 2] = *b"\r\n";

/// Address + function code + LRC, hex encoded, plus delimiters.
pub const MIN_FRAME_LEN: usize = 1 + 2 * 3 + 2;
/// Raw bytes carried by the largest frame: address + pdu + lrc.
pub const MAX_DECODED_LEN: usize = MAX_PDU_LEN + 2;
pub const MAX_FRAME_LEN: usize = 1 + 2 * MAX_DECODED_LEN + 2;

/// Two's complement of the byte sum, modulo 256.
pub fn lrc(data: &[u8]) -> u8 {
    byte_sum(0, data).wrapping_neg()
}

fn byte_sum(seed: u8, data: &[u8]) -> u8 {
    data.iter().fold(seed, |acc, byte| acc.wrapping_add(*byte))
}

pub fn encode_frame(w: &mut Writer<'_>, address: u8, pdu: &[u8]) -> Result<(), EncodeError> {
    check_pdu(pdu)?;
    if w.remaining() < 1 + 2 * (pdu.len() + 2) + END.len() {
        return Err(EncodeError::BufferTooSmall);
    }

    w.write_u8(START)?;
    w.write_hex_u8(address)?;
    for byte in pdu {
        w.write_hex_u8(*byte)?;
    }
    w.write_hex_u8(byte_sum(address, pdu).wrapping_neg())?;
    w.write_all(&END)?;
    Ok(())
}

/// Hex-decodes `data` into `scratch`, verifies the LRC and returns `(address, pdu)`.
pub fn decode_frame<'a>(data: &[u8], scratch: &'a mut [u8]) -> Result<(u8, &'a [u8]), DecodeError> {
    let body = data
        .strip_prefix(&[START])
        .ok_or(DecodeError::InvalidFrame("missing ':' start delimiter"))?;
    let hex = body
        .strip_suffix(&END)
        .ok_or(DecodeError::InvalidFrame("missing CR LF terminator"))?;
    if hex.len() % 2 != 0 {
        return Err(DecodeError::InvalidFrame("odd number of hex digits"));
    }

    let len = hex.len() / 2;
    if len < 3 || len > MAX_DECODED_LEN {
        return Err(DecodeError::InvalidLength);
    }
    if len > scratch.len() {
        return Err(DecodeError::InvalidLength);
    }

    let mut r = Reader::new(hex);
    for slot in &mut scratch[..len] {
        *slot = r.read_hex_u8()?;
    }

    let scratch: &'a [u8] = scratch;
    let (message, checksum) = scratch[..len].split_at(len - 1);
    let expected = lrc(message);
    let got = checksum[0];
    if expected != got {
        return Err(DecodeError::InvalidLrc { expected, got });
    }

    Ok((message[0], &message[1..]))
}
