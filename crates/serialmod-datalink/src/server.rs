//! Slave side of a serial line: answers request frames with a [`ModbusService`].

use crate::channel::{ASCII_CHAR_TIMEOUT, FrameBoundary, SerialChannel};
use crate::DataLinkError;
use serialmod_core::encoding::Writer;
use serialmod_core::frame::{FramingMode, ascii};
use serialmod_core::pdu::{DecodedRequest, ExceptionCode, ExceptionResponse};
use serialmod_core::{BROADCAST_ADDRESS, DecodeError, MAX_PDU_LEN};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

const IDLE_POLL: Duration = Duration::from_secs(3600);
const REPLY_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("modbus exception: {0}")]
    Exception(ExceptionCode),
    #[error("invalid request: {0}")]
    InvalidRequest(&'static str),
    #[error("internal error: {0}")]
    Internal(&'static str),
}

impl ServiceError {
    fn exception_code(&self) -> ExceptionCode {
        match self {
            Self::Exception(code) => *code,
            Self::InvalidRequest(_) => ExceptionCode::IllegalDataValue,
            Self::Internal(_) => ExceptionCode::ServerDeviceFailure,
        }
    }
}

pub trait ModbusService: Send + Sync + 'static {
    /// Whether this service answers requests for `unit_id`.
    fn serves(&self, unit_id: u8) -> bool {
        let _ = unit_id;
        true
    }

    /// Handle a decoded request and write the response PDU into `response_pdu`.
    ///
    /// Returns the number of bytes written, function code included.
    fn handle(
        &self,
        unit_id: u8,
        request: DecodedRequest<'_>,
        response_pdu: &mut [u8],
    ) -> Result<usize, ServiceError>;
}

impl<T> ModbusService for Arc<T>
where
    T: ModbusService + ?Sized,
{
    fn serves(&self, unit_id: u8) -> bool {
        (**self).serves(unit_id)
    }

    fn handle(
        &self,
        unit_id: u8,
        request: DecodedRequest<'_>,
        response_pdu: &mut [u8],
    ) -> Result<usize, ServiceError> {
        (**self).handle(unit_id, request, response_pdu)
    }
}

/// Serves one [`ModbusService`] on a serial channel.
///
/// Corrupt frames and frames for other units are dropped without a reply.
/// Broadcasts are executed but never answered.
pub struct SerialServer<C, S> {
    channel: C,
    service: S,
    framing: FramingMode,
    quiet: Duration,
    write_timeout: Duration,
}

impl<C: SerialChannel, S: ModbusService> SerialServer<C, S> {
    pub fn new(channel: C, service: S, framing: FramingMode) -> Self {
        let quiet = match framing {
            FramingMode::Rtu => channel.state().settings.silent_interval(),
            FramingMode::Ascii => ASCII_CHAR_TIMEOUT,
        };
        Self {
            channel,
            service,
            framing,
            quiet,
            write_timeout: REPLY_WRITE_TIMEOUT,
        }
    }

    pub fn with_quiet_threshold(mut self, quiet: Duration) -> Self {
        self.quiet = quiet;
        self
    }

    /// Bounds how long a reply may take to leave the line before it is abandoned.
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Direct access to the line, for callers driving [`Self::respond`] themselves.
    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    /// Serves frames until the channel closes.
    pub async fn run(mut self) -> Result<(), DataLinkError> {
        let boundary = FrameBoundary::for_framing(self.framing, self.quiet);
        loop {
            let frame = match self.channel.read_frame(boundary, IDLE_POLL).await {
                Ok(frame) => frame,
                Err(DataLinkError::Timeout) => continue,
                Err(DataLinkError::FrameTooLong { max }) => {
                    debug!(max, "dropping oversized frame");
                    continue;
                }
                Err(DataLinkError::ChannelClosed) => {
                    debug!("serial server channel closed");
                    return Ok(());
                }
                Err(err) => {
                    warn!(error = %err, "serial server ended with error");
                    return Err(err);
                }
            };

            if let Some(reply) = self.respond(&frame) {
                match tokio::time::timeout(self.write_timeout, self.channel.write(&reply)).await {
                    Ok(result) => result?,
                    Err(_) => warn!(len = reply.len(), "reply write stalled, abandoning it"),
                }
            }
        }
    }

    /// Builds the reply frame for one received frame, if it deserves one.
    pub fn respond(&self, frame: &[u8]) -> Option<Vec<u8>> {
        let mut scratch = [0u8; ascii::MAX_DECODED_LEN];
        let (unit_id, pdu) = match self.framing.decode(frame, &mut scratch) {
            Ok(decoded) => decoded,
            Err(err) => {
                debug!(error = %err, len = frame.len(), "dropping corrupt frame");
                return None;
            }
        };

        let broadcast = unit_id == BROADCAST_ADDRESS;
        if !broadcast && !self.service.serves(unit_id) {
            return None;
        }

        let function_byte = pdu.first().copied().unwrap_or(0) & 0x7F;
        let mut response = [0u8; MAX_PDU_LEN];
        let response_len = match DecodedRequest::decode(pdu) {
            Ok(request) => match self.service.handle(unit_id, request, &mut response) {
                Ok(len) => len,
                Err(err) => {
                    debug!(unit_id, function_code = function_byte, error = %err, "service rejected request");
                    exception_pdu(&mut response, function_byte, err.exception_code())?
                }
            },
            Err(err) => exception_pdu(&mut response, function_byte, map_decode_error(err))?,
        };

        if broadcast {
            return None;
        }

        let mut buf = [0u8; ascii::MAX_FRAME_LEN];
        let mut w = Writer::new(&mut buf);
        if let Err(err) = self.framing.encode(&mut w, unit_id, &response[..response_len]) {
            warn!(unit_id, error = %err, "failed to encode response frame");
            return None;
        }
        Some(w.as_written().to_vec())
    }
}

fn exception_pdu(out: &mut [u8], function_code: u8, exception_code: ExceptionCode) -> Option<usize> {
    let mut w = Writer::new(out);
    ExceptionResponse {
        function_code,
        exception_code,
    }
    .encode(&mut w)
    .ok()?;
    Some(w.position())
}

fn map_decode_error(err: DecodeError) -> ExceptionCode {
    match err {
        DecodeError::InvalidFunctionCode => ExceptionCode::IllegalFunction,
        _ => ExceptionCode::IllegalDataValue,
    }
}

#[cfg(test)]
mod tests {
    use super::{ModbusService, SerialServer, ServiceError};
    use crate::channel::{SerialChannel, virtual_pair};
    use crate::settings::SerialSettings;
    use serialmod_core::FramingMode;
    use serialmod_core::encoding::Writer;
    use serialmod_core::frame::rtu;
    use serialmod_core::pdu::{DecodedRequest, ExceptionCode};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingService {
        seen: Mutex<Vec<u8>>,
    }

    impl ModbusService for RecordingService {
        fn serves(&self, unit_id: u8) -> bool {
            unit_id == 0x11
        }

        fn handle(
            &self,
            unit_id: u8,
            request: DecodedRequest<'_>,
            response_pdu: &mut [u8],
        ) -> Result<usize, ServiceError> {
            self.seen.lock().unwrap().push(unit_id);
            match request {
                DecodedRequest::ReadHoldingRegisters { .. } => {
                    let bytes = [0x03u8, 0x02, 0x00, 0x2A];
                    response_pdu[..bytes.len()].copy_from_slice(&bytes);
                    Ok(bytes.len())
                }
                DecodedRequest::WriteSingleRegister { .. } => {
                    let bytes = [0x06u8, 0x00, 0x01, 0x00, 0x02];
                    response_pdu[..bytes.len()].copy_from_slice(&bytes);
                    Ok(bytes.len())
                }
                _ => Err(ServiceError::Exception(ExceptionCode::IllegalFunction)),
            }
        }
    }

    fn rtu_frame(address: u8, pdu: &[u8]) -> Vec<u8> {
        let mut buf = [0u8; 256];
        let mut w = Writer::new(&mut buf);
        rtu::encode_frame(&mut w, address, pdu).unwrap();
        w.as_written().to_vec()
    }

    fn server() -> SerialServer<crate::StreamChannel<tokio::io::DuplexStream>, RecordingService> {
        let (channel, _peer) = virtual_pair(SerialSettings::new("virtual0"), 64);
        SerialServer::new(channel, RecordingService::default(), FramingMode::Rtu)
    }

    #[test]
    fn answers_its_own_unit() {
        let server = server();
        let reply = server
            .respond(&rtu_frame(0x11, &[0x03, 0x00, 0x00, 0x00, 0x01]))
            .unwrap();
        assert_eq!(reply, rtu_frame(0x11, &[0x03, 0x02, 0x00, 0x2A]));
    }

    #[test]
    fn ignores_other_units_and_corrupt_frames() {
        let server = server();
        assert!(server
            .respond(&rtu_frame(0x12, &[0x03, 0x00, 0x00, 0x00, 0x01]))
            .is_none());

        let mut corrupt = rtu_frame(0x11, &[0x03, 0x00, 0x00, 0x00, 0x01]);
        corrupt[3] ^= 0x40;
        assert!(server.respond(&corrupt).is_none());
        assert!(server.service.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn executes_broadcasts_without_reply() {
        let server = server();
        assert!(server
            .respond(&rtu_frame(0x00, &[0x06, 0x00, 0x01, 0x00, 0x02]))
            .is_none());
        assert_eq!(*server.service.seen.lock().unwrap(), vec![0x00]);
    }

    #[test]
    fn maps_service_errors_to_exceptions() {
        let server = server();
        let reply = server
            .respond(&rtu_frame(0x11, &[0x01, 0x00, 0x00, 0x00, 0x01]))
            .unwrap();
        assert_eq!(reply, rtu_frame(0x11, &[0x81, 0x01]));

        let reply = server
            .respond(&rtu_frame(0x11, &[0x03, 0x00, 0x00, 0x00, 0x00]))
            .unwrap();
        assert_eq!(reply, rtu_frame(0x11, &[0x83, 0x03]));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_reply_is_abandoned() {
        let (channel, mut peer) = virtual_pair(SerialSettings::new("virtual0"), 4);
        let server = SerialServer::new(channel, RecordingService::default(), FramingMode::Rtu)
            .with_quiet_threshold(Duration::from_millis(5))
            .with_write_timeout(Duration::from_millis(50));
        let task = tokio::spawn(server.run());

        // The seven-byte reply cannot fit the four-byte pipe nobody drains.
        peer.write(&rtu_frame(0x11, &[0x03, 0x00, 0x00, 0x00, 0x01]))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!task.is_finished());

        drop(peer);
        assert!(task.await.unwrap().is_ok());
    }
}
