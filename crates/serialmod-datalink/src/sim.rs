//! An in-memory slave device for tests and simulations.

use crate::server::{ModbusService, ServiceError};
use serialmod_core::EncodeError;
use serialmod_core::encoding::Writer;
use serialmod_core::pdu::{DecodedRequest, ExceptionCode, FunctionCode};
use std::ops::Range;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

const ILLEGAL_ADDRESS: ServiceError = ServiceError::Exception(ExceptionCode::IllegalDataAddress);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoilBank {
    values: Vec<bool>,
}

impl CoilBank {
    pub fn new(size: usize) -> Self {
        Self {
            values: vec![false; size],
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<bool> {
        self.values.get(index).copied()
    }

    pub fn set(&mut self, index: usize, value: bool) -> Result<(), ServiceError> {
        let slot = self.values.get_mut(index).ok_or(ILLEGAL_ADDRESS)?;
        *slot = value;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterBank {
    values: Vec<u16>,
}

impl RegisterBank {
    pub fn new(size: usize) -> Self {
        Self {
            values: vec![0u16; size],
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<u16> {
        self.values.get(index).copied()
    }

    pub fn set(&mut self, index: usize, value: u16) -> Result<(), ServiceError> {
        let slot = self.values.get_mut(index).ok_or(ILLEGAL_ADDRESS)?;
        *slot = value;
        Ok(())
    }
}

/// The four Modbus data tables of one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointModel {
    pub coils: CoilBank,
    pub discrete_inputs: CoilBank,
    pub holding_registers: RegisterBank,
    pub input_registers: RegisterBank,
}

impl PointModel {
    pub fn new(
        coil_count: usize,
        discrete_input_count: usize,
        holding_register_count: usize,
        input_register_count: usize,
    ) -> Self {
        Self {
            coils: CoilBank::new(coil_count),
            discrete_inputs: CoilBank::new(discrete_input_count),
            holding_registers: RegisterBank::new(holding_register_count),
            input_registers: RegisterBank::new(input_register_count),
        }
    }
}

/// A slave that answers function codes 0x01-0x06, 0x0F and 0x10 from a [`PointModel`].
///
/// Without a unit id the service answers every address; with one it only
/// answers its own.
#[derive(Debug)]
pub struct InMemoryModbusService {
    unit_id: Option<u8>,
    model: RwLock<PointModel>,
}

impl InMemoryModbusService {
    pub fn new(
        coil_count: usize,
        discrete_input_count: usize,
        holding_register_count: usize,
        input_register_count: usize,
    ) -> Self {
        Self::with_model(PointModel::new(
            coil_count,
            discrete_input_count,
            holding_register_count,
            input_register_count,
        ))
    }

    pub fn with_model(model: PointModel) -> Self {
        Self {
            unit_id: None,
            model: RwLock::new(model),
        }
    }

    pub fn with_unit_id(mut self, unit_id: u8) -> Self {
        self.unit_id = Some(unit_id);
        self
    }

    fn read(&self) -> RwLockReadGuard<'_, PointModel> {
        self.model.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, PointModel> {
        self.model.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> PointModel {
        self.read().clone()
    }

    pub fn set_coil(&self, address: u16, value: bool) -> Result<(), ServiceError> {
        self.write().coils.set(usize::from(address), value)
    }

    pub fn set_discrete_input(&self, address: u16, value: bool) -> Result<(), ServiceError> {
        self.write().discrete_inputs.set(usize::from(address), value)
    }

    pub fn set_holding_register(&self, address: u16, value: u16) -> Result<(), ServiceError> {
        self.write().holding_registers.set(usize::from(address), value)
    }

    pub fn set_input_register(&self, address: u16, value: u16) -> Result<(), ServiceError> {
        self.write().input_registers.set(usize::from(address), value)
    }

    pub fn coil(&self, address: u16) -> Option<bool> {
        self.read().coils.get(usize::from(address))
    }

    pub fn holding_register(&self, address: u16) -> Option<u16> {
        self.read().holding_registers.get(usize::from(address))
    }
}

impl ModbusService for InMemoryModbusService {
    fn serves(&self, unit_id: u8) -> bool {
        self.unit_id.is_none_or(|own| own == unit_id)
    }

    fn handle(
        &self,
        _unit_id: u8,
        request: DecodedRequest<'_>,
        response_pdu: &mut [u8],
    ) -> Result<usize, ServiceError> {
        let mut w = Writer::new(response_pdu);
        w.write_u8(request.function_code().as_u8()).map_err(map_encode)?;

        match request {
            DecodedRequest::ReadCoils { start, quantity } => {
                let model = self.read();
                let range = checked_range(start, quantity, model.coils.len())?;
                write_bits(&mut w, range.map(|i| model.coils.get(i).unwrap_or(false)))?;
            }
            DecodedRequest::ReadDiscreteInputs { start, quantity } => {
                let model = self.read();
                let range = checked_range(start, quantity, model.discrete_inputs.len())?;
                write_bits(
                    &mut w,
                    range.map(|i| model.discrete_inputs.get(i).unwrap_or(false)),
                )?;
            }
            DecodedRequest::ReadHoldingRegisters { start, quantity } => {
                let model = self.read();
                let range = checked_range(start, quantity, model.holding_registers.len())?;
                write_registers(
                    &mut w,
                    range.map(|i| model.holding_registers.get(i).unwrap_or(0)),
                )?;
            }
            DecodedRequest::ReadInputRegisters { start, quantity } => {
                let model = self.read();
                let range = checked_range(start, quantity, model.input_registers.len())?;
                write_registers(
                    &mut w,
                    range.map(|i| model.input_registers.get(i).unwrap_or(0)),
                )?;
            }
            DecodedRequest::WriteSingleCoil { address, value } => {
                self.write().coils.set(usize::from(address), value)?;
                w.write_be_u16(address).map_err(map_encode)?;
                w.write_be_u16(if value { 0xFF00 } else { 0x0000 })
                    .map_err(map_encode)?;
            }
            DecodedRequest::WriteSingleRegister { address, value } => {
                self.write()
                    .holding_registers
                    .set(usize::from(address), value)?;
                w.write_be_u16(address).map_err(map_encode)?;
                w.write_be_u16(value).map_err(map_encode)?;
            }
            DecodedRequest::WriteMultipleCoils {
                start,
                quantity,
                packed,
            } => {
                let mut model = self.write();
                let range = checked_range(start, quantity, model.coils.len())?;
                for (i, address) in range.enumerate() {
                    let value = (packed[i / 8] >> (i % 8)) & 0x01 == 0x01;
                    model.coils.set(address, value)?;
                }
                w.write_be_u16(start).map_err(map_encode)?;
                w.write_be_u16(quantity).map_err(map_encode)?;
            }
            DecodedRequest::WriteMultipleRegisters { start, data } => {
                let quantity = u16::try_from(data.len() / 2)
                    .map_err(|_| ServiceError::InvalidRequest("register quantity too large"))?;
                let mut model = self.write();
                let range = checked_range(start, quantity, model.holding_registers.len())?;
                for (address, pair) in range.zip(data.chunks_exact(2)) {
                    model
                        .holding_registers
                        .set(address, u16::from_be_bytes([pair[0], pair[1]]))?;
                }
                w.write_be_u16(start).map_err(map_encode)?;
                w.write_be_u16(quantity).map_err(map_encode)?;
            }
            DecodedRequest::Other { .. } => {
                return Err(ServiceError::Exception(ExceptionCode::IllegalFunction));
            }
        }

        Ok(w.position())
    }
}

fn checked_range(start: u16, quantity: u16, len: usize) -> Result<Range<usize>, ServiceError> {
    let start = usize::from(start);
    let end = start
        .checked_add(usize::from(quantity))
        .ok_or(ILLEGAL_ADDRESS)?;
    if quantity == 0 || end > len {
        return Err(ILLEGAL_ADDRESS);
    }
    Ok(start..end)
}

fn write_bits(w: &mut Writer<'_>, bits: impl ExactSizeIterator<Item = bool>) -> Result<(), ServiceError> {
    let byte_count = u8::try_from(bits.len().div_ceil(8))
        .map_err(|_| ServiceError::Internal("bit response too large"))?;
    w.write_u8(byte_count).map_err(map_encode)?;
    let mut current = 0u8;
    for (i, bit) in bits.enumerate() {
        if bit {
            current |= 1 << (i % 8);
        }
        if i % 8 == 7 {
            w.write_u8(current).map_err(map_encode)?;
            current = 0;
        }
    }
    if w.as_written().len() < 2 + usize::from(byte_count) {
        w.write_u8(current).map_err(map_encode)?;
    }
    Ok(())
}

fn write_registers(
    w: &mut Writer<'_>,
    values: impl ExactSizeIterator<Item = u16>,
) -> Result<(), ServiceError> {
    let byte_count = u8::try_from(values.len() * 2)
        .map_err(|_| ServiceError::Internal("register response too large"))?;
    w.write_u8(byte_count).map_err(map_encode)?;
    for value in values {
        w.write_be_u16(value).map_err(map_encode)?;
    }
    Ok(())
}

fn map_encode(err: EncodeError) -> ServiceError {
    let msg = match err {
        EncodeError::BufferTooSmall => "response buffer too small",
        _ => "response encode failed",
    };
    ServiceError::Internal(msg)
}
