//! Blocking facade over [`ModbusClient`] for callers without a runtime.

use crate::{ClientConfig, ClientError, ModbusClient, ModbusResponse, RequestOptions};
use serialmod_core::numeric::WordOrder;
use serialmod_core::pdu::FunctionCode;
use serialmod_datalink::{DataLinkError, SerialChannel};
use thiserror::Error;
use tokio::runtime::Runtime;

#[derive(Debug, Error)]
pub enum SyncClientError {
    #[error("runtime init error: {0}")]
    RuntimeInit(std::io::Error),
    #[error("datalink error: {0}")]
    DataLink(#[from] DataLinkError),
    #[error("client error: {0}")]
    Client(#[from] ClientError),
}

/// Drives a [`ModbusClient`] on a private runtime.
///
/// Must not be used from inside another Tokio runtime.
pub struct SyncModbusClient<C> {
    runtime: Runtime,
    client: ModbusClient<C>,
}

#[cfg(feature = "serial")]
impl SyncModbusClient<serialmod_datalink::SerialPortChannel> {
    /// Opens the port described by `settings`.
    pub fn open(
        settings: serialmod_datalink::SerialSettings,
        config: ClientConfig,
    ) -> Result<Self, SyncClientError> {
        let runtime = build_runtime()?;
        // Registering the stream with the reactor needs a runtime context.
        let channel = {
            let _enter = runtime.enter();
            serialmod_datalink::SerialPortChannel::open(settings)?
        };
        Ok(Self {
            runtime,
            client: ModbusClient::with_config(channel, config),
        })
    }
}

impl<C: SerialChannel> SyncModbusClient<C> {
    pub fn new(channel: C, config: ClientConfig) -> Result<Self, SyncClientError> {
        Ok(Self {
            runtime: build_runtime()?,
            client: ModbusClient::with_config(channel, config),
        })
    }

    pub fn config(&self) -> ClientConfig {
        self.client.config()
    }

    pub fn into_channel(self) -> C {
        self.client.into_channel()
    }

    pub fn request(
        &self,
        slave: u8,
        function_code: FunctionCode,
        payload: &[u8],
        options: RequestOptions,
    ) -> Result<ModbusResponse, SyncClientError> {
        self.runtime
            .block_on(self.client.request(slave, function_code, payload, options))
            .map_err(SyncClientError::Client)
    }

    pub fn read_coils(
        &self,
        slave: u8,
        start: u16,
        quantity: u16,
    ) -> Result<Vec<bool>, SyncClientError> {
        self.runtime
            .block_on(self.client.read_coils(slave, start, quantity))
            .map_err(SyncClientError::Client)
    }

    pub fn read_discrete_inputs(
        &self,
        slave: u8,
        start: u16,
        quantity: u16,
    ) -> Result<Vec<bool>, SyncClientError> {
        self.runtime
            .block_on(self.client.read_discrete_inputs(slave, start, quantity))
            .map_err(SyncClientError::Client)
    }

    pub fn read_holding_registers(
        &self,
        slave: u8,
        start: u16,
        quantity: u16,
    ) -> Result<Vec<u16>, SyncClientError> {
        self.runtime
            .block_on(self.client.read_holding_registers(slave, start, quantity))
            .map_err(SyncClientError::Client)
    }

    pub fn read_input_registers(
        &self,
        slave: u8,
        start: u16,
        quantity: u16,
    ) -> Result<Vec<u16>, SyncClientError> {
        self.runtime
            .block_on(self.client.read_input_registers(slave, start, quantity))
            .map_err(SyncClientError::Client)
    }

    pub fn read_holding_u32(
        &self,
        slave: u8,
        start: u16,
        order: WordOrder,
    ) -> Result<u32, SyncClientError> {
        self.runtime
            .block_on(self.client.read_holding_u32(slave, start, order))
            .map_err(SyncClientError::Client)
    }

    pub fn read_input_u32(
        &self,
        slave: u8,
        start: u16,
        order: WordOrder,
    ) -> Result<u32, SyncClientError> {
        self.runtime
            .block_on(self.client.read_input_u32(slave, start, order))
            .map_err(SyncClientError::Client)
    }

    pub fn read_holding_i16(&self, slave: u8, address: u16) -> Result<i16, SyncClientError> {
        self.runtime
            .block_on(self.client.read_holding_i16(slave, address))
            .map_err(SyncClientError::Client)
    }

    pub fn read_holding_i32(
        &self,
        slave: u8,
        start: u16,
        order: WordOrder,
    ) -> Result<i32, SyncClientError> {
        self.runtime
            .block_on(self.client.read_holding_i32(slave, start, order))
            .map_err(SyncClientError::Client)
    }

    pub fn read_scaled(&self, slave: u8, address: u16, factor: f64) -> Result<f64, SyncClientError> {
        self.runtime
            .block_on(self.client.read_scaled(slave, address, factor))
            .map_err(SyncClientError::Client)
    }

    pub fn write_single_coil(
        &self,
        slave: u8,
        address: u16,
        value: bool,
    ) -> Result<(), SyncClientError> {
        self.runtime
            .block_on(self.client.write_single_coil(slave, address, value))
            .map_err(SyncClientError::Client)
    }

    pub fn write_single_register(
        &self,
        slave: u8,
        address: u16,
        value: u16,
    ) -> Result<(), SyncClientError> {
        self.runtime
            .block_on(self.client.write_single_register(slave, address, value))
            .map_err(SyncClientError::Client)
    }

    pub fn write_multiple_coils(
        &self,
        slave: u8,
        start: u16,
        values: &[bool],
    ) -> Result<(), SyncClientError> {
        self.runtime
            .block_on(self.client.write_multiple_coils(slave, start, values))
            .map_err(SyncClientError::Client)
    }

    pub fn write_multiple_registers(
        &self,
        slave: u8,
        start: u16,
        values: &[u16],
    ) -> Result<(), SyncClientError> {
        self.runtime
            .block_on(self.client.write_multiple_registers(slave, start, values))
            .map_err(SyncClientError::Client)
    }

    pub fn write_u32(
        &self,
        slave: u8,
        start: u16,
        value: u32,
        order: WordOrder,
    ) -> Result<(), SyncClientError> {
        self.runtime
            .block_on(self.client.write_u32(slave, start, value, order))
            .map_err(SyncClientError::Client)
    }

    pub fn write_i16(&self, slave: u8, address: u16, value: i16) -> Result<(), SyncClientError> {
        self.runtime
            .block_on(self.client.write_i16(slave, address, value))
            .map_err(SyncClientError::Client)
    }

    pub fn write_i32(
        &self,
        slave: u8,
        start: u16,
        value: i32,
        order: WordOrder,
    ) -> Result<(), SyncClientError> {
        self.runtime
            .block_on(self.client.write_i32(slave, start, value, order))
            .map_err(SyncClientError::Client)
    }

    pub fn write_scaled(
        &self,
        slave: u8,
        address: u16,
        value: f64,
        factor: f64,
    ) -> Result<(), SyncClientError> {
        self.runtime
            .block_on(self.client.write_scaled(slave, address, value, factor))
            .map_err(SyncClientError::Client)
    }
}

fn build_runtime() -> Result<Runtime, SyncClientError> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(SyncClientError::RuntimeInit)
}
