//! Cursor-style byte reader and writer over borrowed buffers.

pub mod reader;
pub mod writer;

pub use reader::Reader;
pub use writer::Writer;

const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

pub(crate) const fn hex_pair(value: u8) -> [u8; 2] {
    [HEX_DIGITS[(value >> 4) as usize], HEX_DIGITS[(value & 0x0F) as usize]]
}

pub(crate) const fn hex_value(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - b'0'),
        b'A'..=b'F' => Some(digit - b'A' + 10),
        b'a'..=b'f' => Some(digit - b'a' + 10),
        _ => None,
    }
}
