//! Arbitrated, retrying Modbus client for a shared serial line.
//!
//! [`ModbusClient::request`] is the single entry point: it encodes the frame,
//! waits for exclusive use of the line, and runs one [`Transaction`] with the
//! retry policy resolved from [`ClientConfig`] and [`RequestOptions`]. The
//! typed helpers are thin wrappers over it.

#![forbid(unsafe_code)]

pub mod arbiter;
pub mod config;
pub mod error;
pub mod sync;
pub mod transaction;

#[cfg(test)]
mod mock;

pub use arbiter::{LineArbiter, LineGrant};
pub use config::{Backoff, ClientConfig, RequestOptions, RetryPolicy};
pub use error::{ClientError, ErrorKind};
pub use sync::{SyncClientError, SyncModbusClient};
pub use transaction::{ModbusResponse, Transaction, TransactionState, decode_response};

use serialmod_core::encoding::Writer;
use serialmod_core::frame::ascii;
use serialmod_core::numeric::{
    WordOrder, combine_u32, from_signed16, from_signed32, scale_from_raw, scale_to_raw,
    split_u32, to_signed16, to_signed32,
};
use serialmod_core::pdu::{BitData, FunctionCode, RegisterData, Request, WriteEcho};
use serialmod_core::{BROADCAST_ADDRESS, EncodeError, MAX_PDU_LEN, is_valid_slave_address};
use serialmod_datalink::SerialChannel;
use tracing::debug;

const COIL_ON: u16 = 0xFF00;

/// Modbus master over one serial channel.
///
/// Shareable by reference across tasks; concurrent requests queue on the
/// line in arrival order and never interleave on the wire.
#[derive(Debug)]
pub struct ModbusClient<C> {
    line: LineArbiter<C>,
    config: ClientConfig,
}

impl<C: SerialChannel> ModbusClient<C> {
    pub fn new(channel: C) -> Self {
        Self::with_config(channel, ClientConfig::default())
    }

    pub fn with_config(channel: C, config: ClientConfig) -> Self {
        Self {
            line: LineArbiter::new(channel),
            config,
        }
    }

    pub fn config(&self) -> ClientConfig {
        self.config
    }

    /// The arbiter guarding the channel, for callers that need the line itself.
    pub fn line(&self) -> &LineArbiter<C> {
        &self.line
    }

    pub fn into_channel(self) -> C {
        self.line.into_inner()
    }

    /// Sends `function_code + payload` to `slave` and returns the validated reply.
    ///
    /// The frame is built before the line is requested, so encoding errors
    /// never touch the wire. Broadcasts (`slave == 0`) return an empty payload
    /// once the turnaround delay has passed.
    pub async fn request(
        &self,
        slave: u8,
        function_code: FunctionCode,
        payload: &[u8],
        options: RequestOptions,
    ) -> Result<ModbusResponse, ClientError> {
        if !is_valid_slave_address(slave) {
            return Err(EncodeError::InvalidAddress(slave).into());
        }
        let function = function_code.as_u8();
        if function == 0 || FunctionCode::is_exception(function) {
            return Err(EncodeError::InvalidFunctionCode(function).into());
        }
        if payload.len() >= MAX_PDU_LEN {
            return Err(EncodeError::PduTooLarge {
                len: payload.len() + 1,
            }
            .into());
        }

        let mut pdu = [0u8; MAX_PDU_LEN];
        pdu[0] = function;
        pdu[1..=payload.len()].copy_from_slice(payload);
        let mut frame_buf = [0u8; ascii::MAX_FRAME_LEN];
        let mut w = Writer::new(&mut frame_buf);
        self.config
            .framing
            .encode(&mut w, slave, &pdu[..=payload.len()])?;
        let frame = w.as_written();

        let mut grant = self.line.acquire().await;
        debug!(
            grant = grant.id(),
            slave,
            function,
            frame_len = frame.len(),
            "dispatching modbus request"
        );
        let policy = self.config.resolve(&options, &grant.state().settings);
        Transaction::new(slave, function_code, frame, policy)
            .run(&mut *grant)
            .await
    }

    async fn send(
        &self,
        slave: u8,
        request: Request<'_>,
    ) -> Result<ModbusResponse, ClientError> {
        let mut buf = [0u8; MAX_PDU_LEN];
        let mut w = Writer::new(&mut buf);
        request.encode_payload(&mut w)?;
        self.request(
            slave,
            request.function_code(),
            w.as_written(),
            RequestOptions::default(),
        )
        .await
    }

    async fn read_bits(
        &self,
        slave: u8,
        request: Request<'_>,
        quantity: u16,
    ) -> Result<Vec<bool>, ClientError> {
        reject_broadcast(slave)?;
        let response = self.send(slave, request).await?;
        let bits = BitData::parse(&response.payload)?;
        bits.take(usize::from(quantity))
            .map(Iterator::collect)
            .ok_or(ClientError::UnexpectedResponse(
                "bit payload shorter than requested",
            ))
    }

    async fn read_registers(
        &self,
        slave: u8,
        request: Request<'_>,
        quantity: u16,
    ) -> Result<Vec<u16>, ClientError> {
        reject_broadcast(slave)?;
        let response = self.send(slave, request).await?;
        let registers = RegisterData::parse(&response.payload)?;
        if registers.len() != usize::from(quantity) {
            return Err(ClientError::UnexpectedResponse(
                "register count differs from request",
            ));
        }
        Ok(registers.iter().collect())
    }

    async fn write(
        &self,
        slave: u8,
        request: Request<'_>,
        expected: WriteEcho,
    ) -> Result<(), ClientError> {
        let response = self.send(slave, request).await?;
        if slave == BROADCAST_ADDRESS {
            return Ok(());
        }
        if WriteEcho::parse(&response.payload)? != expected {
            return Err(ClientError::UnexpectedResponse("write echo mismatch"));
        }
        Ok(())
    }

    pub async fn read_coils(
        &self,
        slave: u8,
        start: u16,
        quantity: u16,
    ) -> Result<Vec<bool>, ClientError> {
        self.read_bits(slave, Request::ReadCoils { start, quantity }, quantity)
            .await
    }

    pub async fn read_discrete_inputs(
        &self,
        slave: u8,
        start: u16,
        quantity: u16,
    ) -> Result<Vec<bool>, ClientError> {
        self.read_bits(slave, Request::ReadDiscreteInputs { start, quantity }, quantity)
            .await
    }

    pub async fn read_holding_registers(
        &self,
        slave: u8,
        start: u16,
        quantity: u16,
    ) -> Result<Vec<u16>, ClientError> {
        self.read_registers(slave, Request::ReadHoldingRegisters { start, quantity }, quantity)
            .await
    }

    pub async fn read_input_registers(
        &self,
        slave: u8,
        start: u16,
        quantity: u16,
    ) -> Result<Vec<u16>, ClientError> {
        self.read_registers(slave, Request::ReadInputRegisters { start, quantity }, quantity)
            .await
    }

    /// Reads two consecutive holding registers as one 32-bit value.
    pub async fn read_holding_u32(
        &self,
        slave: u8,
        start: u16,
        order: WordOrder,
    ) -> Result<u32, ClientError> {
        let words = self.read_holding_registers(slave, start, 2).await?;
        match words.as_slice() {
            [first, second] => Ok(combine_u32(*first, *second, order)),
            _ => Err(ClientError::UnexpectedResponse(
                "register count differs from request",
            )),
        }
    }

    /// Reads two consecutive input registers as one 32-bit value.
    pub async fn read_input_u32(
        &self,
        slave: u8,
        start: u16,
        order: WordOrder,
    ) -> Result<u32, ClientError> {
        let words = self.read_input_registers(slave, start, 2).await?;
        match words.as_slice() {
            [first, second] => Ok(combine_u32(*first, *second, order)),
            _ => Err(ClientError::UnexpectedResponse(
                "register count differs from request",
            )),
        }
    }

    pub async fn read_holding_i16(&self, slave: u8, address: u16) -> Result<i16, ClientError> {
        let words = self.read_holding_registers(slave, address, 1).await?;
        words
            .first()
            .map(|raw| to_signed16(*raw))
            .ok_or(ClientError::UnexpectedResponse(
                "register count differs from request",
            ))
    }

    pub async fn read_holding_i32(
        &self,
        slave: u8,
        start: u16,
        order: WordOrder,
    ) -> Result<i32, ClientError> {
        self.read_holding_u32(slave, start, order)
            .await
            .map(to_signed32)
    }

    /// Reads one signed holding register and divides it by `factor`.
    pub async fn read_scaled(
        &self,
        slave: u8,
        address: u16,
        factor: f64,
    ) -> Result<f64, ClientError> {
        check_factor(factor)?;
        let raw = self.read_holding_i16(slave, address).await?;
        Ok(scale_from_raw(i64::from(raw), factor)?)
    }

    pub async fn write_single_coil(
        &self,
        slave: u8,
        address: u16,
        value: bool,
    ) -> Result<(), ClientError> {
        let echo = WriteEcho {
            address,
            value: if value { COIL_ON } else { 0 },
        };
        self.write(slave, Request::WriteSingleCoil { address, value }, echo)
            .await
    }

    pub async fn write_single_register(
        &self,
        slave: u8,
        address: u16,
        value: u16,
    ) -> Result<(), ClientError> {
        let echo = WriteEcho { address, value };
        self.write(slave, Request::WriteSingleRegister { address, value }, echo)
            .await
    }

    pub async fn write_multiple_coils(
        &self,
        slave: u8,
        start: u16,
        values: &[bool],
    ) -> Result<(), ClientError> {
        let echo = WriteEcho {
            address: start,
            value: echoed_quantity(values.len())?,
        };
        self.write(slave, Request::WriteMultipleCoils { start, values }, echo)
            .await
    }

    pub async fn write_multiple_registers(
        &self,
        slave: u8,
        start: u16,
        values: &[u16],
    ) -> Result<(), ClientError> {
        let echo = WriteEcho {
            address: start,
            value: echoed_quantity(values.len())?,
        };
        self.write(slave, Request::WriteMultipleRegisters { start, values }, echo)
            .await
    }

    /// Writes a 32-bit value across two holding registers with FC16.
    pub async fn write_u32(
        &self,
        slave: u8,
        start: u16,
        value: u32,
        order: WordOrder,
    ) -> Result<(), ClientError> {
        self.write_multiple_registers(slave, start, &split_u32(value, order))
            .await
    }

    pub async fn write_i16(&self, slave: u8, address: u16, value: i16) -> Result<(), ClientError> {
        self.write_single_register(slave, address, from_signed16(value))
            .await
    }

    pub async fn write_i32(
        &self,
        slave: u8,
        start: u16,
        value: i32,
        order: WordOrder,
    ) -> Result<(), ClientError> {
        self.write_u32(slave, start, from_signed32(value), order)
            .await
    }

    /// Multiplies `value` by `factor` and stores it as one signed register.
    ///
    /// The product is truncated toward zero and must fit an `i16`.
    pub async fn write_scaled(
        &self,
        slave: u8,
        address: u16,
        value: f64,
        factor: f64,
    ) -> Result<(), ClientError> {
        check_factor(factor)?;
        let raw = i16::try_from(scale_to_raw(value, factor))
            .map_err(|_| ClientError::Encode(EncodeError::ValueOutOfRange))?;
        self.write_i16(slave, address, raw).await
    }
}

fn check_factor(factor: f64) -> Result<(), ClientError> {
    if factor == 0.0 || !factor.is_finite() {
        return Err(ClientError::InvalidRequest("scale factor must be finite and non-zero"));
    }
    Ok(())
}

fn reject_broadcast(slave: u8) -> Result<(), ClientError> {
    if slave == BROADCAST_ADDRESS {
        return Err(ClientError::InvalidRequest("reads cannot be broadcast"));
    }
    Ok(())
}

fn echoed_quantity(len: usize) -> Result<u16, ClientError> {
    u16::try_from(len).map_err(|_| ClientError::Encode(EncodeError::ValueOutOfRange))
}
