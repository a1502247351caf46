use super::check_pdu;
use crate::encoding::Writer;
use crate::{DecodeError, EncodeError};

/// Address + function code + CRC.
pub const MIN_FRAME_LEN: usize = 4;
/// Address + 253-byte PDU + CRC.
pub const MAX_FRAME_LEN: usize = 256;

const fn build_crc16_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u16;
        let mut bit = 0;
        while bit < 8 {
            if (crc & 0x0001) != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

const CRC16_TABLE: [u16; 256] = build_crc16_table();

fn crc16_update(mut crc: u16, data: &[u8]) -> u16 {
    for byte in data {
        let idx = ((crc ^ u16::from(*byte)) & 0x00FF) as usize;
        crc = (crc >> 8) ^ CRC16_TABLE[idx];
    }
    crc
}

/// CRC-16/MODBUS: initial value 0xFFFF, reflected polynomial 0xA001.
pub fn crc16(data: &[u8]) -> u16 {
    crc16_update(0xFFFF, data)
}

/// Writes `[address][pdu][crc lo][crc hi]`.
pub fn encode_frame(w: &mut Writer<'_>, address: u8, pdu: &[u8]) -> Result<(), EncodeError> {
    check_pdu(pdu)?;

    let crc = crc16_update(crc16(&[address]), pdu);
    w.write_u8(address)?;
    w.write_all(pdu)?;
    w.write_all(&crc.to_le_bytes())?;
    Ok(())
}

/// Checks the trailing CRC over everything before it and splits off the address.
pub fn decode_frame(data: &[u8]) -> Result<(u8, &[u8]), DecodeError> {
    if data.len() < MIN_FRAME_LEN {
        return Err(DecodeError::InvalidLength);
    }

    let (body, tail) = data.split_at(data.len() - 2);
    let expected = crc16(body);
    let got = u16::from_le_bytes([tail[0], tail[1]]);
    if expected != got {
        return Err(DecodeError::InvalidCrc { expected, got });
    }

    Ok((body[0], &body[1..]))
}

#[cfg(test)]
mod tests {
    use super::{crc16, decode_frame, encode_frame};
    use crate::encoding::Writer;
    use crate::{DecodeError, EncodeError};

    #[test]
    fn crc16_known_vectors() {
        assert_eq!(crc16(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x0A]), 0xCDC5);
        assert_eq!(crc16(&[0x11, 0x03, 0x00, 0x6B, 0x00, 0x03]), 0x8776);
        assert_eq!(crc16(&[]), 0xFFFF);
    }

    #[test]
    fn encodes_read_holding_registers_request() {
        let mut buf = [0u8; 16];
        let mut w = Writer::new(&mut buf);
        encode_frame(&mut w, 0x11, &[0x03, 0x00, 0x6B, 0x00, 0x03]).unwrap();
        assert_eq!(
            w.as_written(),
            &[0x11, 0x03, 0x00, 0x6B, 0x00, 0x03, 0x76, 0x87]
        );
    }

    #[test]
    fn rejects_empty_and_oversized_pdus() {
        let mut buf = [0u8; 300];
        let mut w = Writer::new(&mut buf);
        assert_eq!(encode_frame(&mut w, 1, &[]).unwrap_err(), EncodeError::EmptyPdu);
        assert_eq!(
            encode_frame(&mut w, 1, &[0u8; 254]).unwrap_err(),
            EncodeError::PduTooLarge { len: 254 }
        );
        assert_eq!(w.position(), 0);
    }

    #[test]
    fn accepts_largest_pdu() {
        let mut buf = [0u8; 256];
        let mut w = Writer::new(&mut buf);
        let mut pdu = [0xA5u8; 253];
        pdu[0] = 0x10;
        encode_frame(&mut w, 1, &pdu).unwrap();
        assert_eq!(w.position(), 256);
        let (_, decoded) = decode_frame(w.as_written()).unwrap();
        assert_eq!(decoded, &pdu[..]);
    }

    #[test]
    fn detects_bad_crc() {
        let bad = [0x11u8, 0x03, 0x00, 0x6B, 0x00, 0x03, 0x00, 0x00];
        assert_eq!(
            decode_frame(&bad).unwrap_err(),
            DecodeError::InvalidCrc {
                expected: 0x8776,
                got: 0x0000,
            }
        );
    }

    #[test]
    fn rejects_short_frames() {
        assert_eq!(decode_frame(&[0x11, 0x03, 0x76]).unwrap_err(), DecodeError::InvalidLength);
    }
}
