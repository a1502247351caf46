//! Serial transport for Modbus RTU and ASCII.
//!
//! This crate owns the byte stream: opening ports, reading whole frames off
//! a half-duplex line, and noticing when the line dies. It also carries a
//! slave-side [`SerialServer`], an in-memory device, and a
//! [`VirtualNetwork`] bus for tests.

#![forbid(unsafe_code)]

use serialmod_core::{DecodeError, EncodeError};
use thiserror::Error;

pub mod channel;
pub mod network;
pub mod server;
pub mod settings;
pub mod sim;

#[cfg(feature = "serial")]
pub use channel::available_ports;
pub use channel::{
    ASCII_CHAR_TIMEOUT, ChannelState, FrameBoundary, LinkState, SerialChannel, StreamChannel,
    virtual_pair,
};
pub use network::{NetworkError, VirtualNetwork, virtual_network};
pub use server::{ModbusService, SerialServer, ServiceError};
pub use settings::{DataBits, Parity, SerialSettings, SettingsError, StopBits};
pub use sim::{CoilBank, InMemoryModbusService, PointModel, RegisterBank};

#[cfg(feature = "serial")]
pub type SerialPortChannel = StreamChannel<tokio_serial::SerialStream>;

#[derive(Debug, Error)]
pub enum DataLinkError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error("channel closed")]
    ChannelClosed,
    #[error("timed out waiting for a complete frame")]
    Timeout,
    #[error("frame longer than {max} bytes")]
    FrameTooLong { max: usize },
    #[error("invalid serial settings: {0}")]
    Settings(#[from] SettingsError),
}
