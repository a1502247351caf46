use super::hex_pair;
use crate::EncodeError;

/// A byte writer that encodes into a caller-owned buffer.
#[derive(Debug)]
pub struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub const fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    pub fn as_written(&self) -> &[u8] {
        &self.buf[..self.pos]
    }

    pub fn write_u8(&mut self, value: u8) -> Result<(), EncodeError> {
        self.write_all(&[value])
    }

    pub fn write_all(&mut self, data: &[u8]) -> Result<(), EncodeError> {
        if self.remaining() < data.len() {
            return Err(EncodeError::BufferTooSmall);
        }
        let end = self.pos + data.len();
        self.buf[self.pos..end].copy_from_slice(data);
        self.pos = end;
        Ok(())
    }

    pub fn write_be_u16(&mut self, value: u16) -> Result<(), EncodeError> {
        self.write_all(&value.to_be_bytes())
    }

    /// Writes `value` as two upper-case ASCII hex digits.
    pub fn write_hex_u8(&mut self, value: u8) -> Result<(), EncodeError> {
        self.write_all(&hex_pair(value))
    }
}

#[cfg(test)]
mod tests {
    use super::Writer;
    use crate::EncodeError;

    #[test]
    fn writes_binary_fields() {
        let mut buf = [0u8; 3];
        let mut w = Writer::new(&mut buf);
        w.write_u8(0x11).unwrap();
        w.write_be_u16(0x006B).unwrap();
        assert_eq!(w.as_written(), &[0x11, 0x00, 0x6B]);
        assert_eq!(w.write_u8(0).unwrap_err(), EncodeError::BufferTooSmall);
    }

    #[test]
    fn writes_upper_case_hex() {
        let mut buf = [0u8; 4];
        let mut w = Writer::new(&mut buf);
        w.write_hex_u8(0x0A).unwrap();
        w.write_hex_u8(0xF7).unwrap();
        assert_eq!(w.as_written(), b"0AF7");
        assert_eq!(w.remaining(), 0);
    }
}
