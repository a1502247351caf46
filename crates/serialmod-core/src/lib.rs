//! Modbus serial framing in pure Rust.
//!
//! `serialmod-core` encodes and validates Modbus RTU and ASCII frames and
//! models the PDUs they carry. It performs no I/O and no timing, so every
//! function here can be exercised with synthetic byte buffers.

#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]

#[cfg(feature = "std")]
extern crate std;

pub mod encoding;
pub mod error;
pub mod frame;
pub mod numeric;
pub mod pdu;

pub use error::{DecodeError, EncodeError};
pub use frame::FramingMode;

/// Slave address that addresses every device on the line. Never answered.
pub const BROADCAST_ADDRESS: u8 = 0;

/// Highest assignable slave address; 248..=255 are reserved.
pub const MAX_SLAVE_ADDRESS: u8 = 247;

/// Largest PDU (function code + data) a serial frame may carry.
pub const MAX_PDU_LEN: usize = 253;

/// Returns `true` for addresses a request may target (broadcast included).
pub const fn is_valid_slave_address(address: u8) -> bool {
    address <= MAX_SLAVE_ADDRESS
}
