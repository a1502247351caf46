use serialmod_core::pdu::ExceptionResponse;
use serialmod_core::{DecodeError, EncodeError};
use serialmod_datalink::DataLinkError;
use thiserror::Error;

/// Coarse failure categories callers can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The request could not be encoded; nothing was sent.
    Encoding,
    Checksum,
    Framing,
    Timeout,
    /// The slave answered with an exception response.
    ModbusException,
    ChannelClosed,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),
    #[error("invalid request: {0}")]
    InvalidRequest(&'static str),
    #[error("checksum error: {0}")]
    Checksum(DecodeError),
    #[error("framing error: {0}")]
    Framing(DecodeError),
    #[error("unexpected response: {0}")]
    UnexpectedResponse(&'static str),
    #[error("request timed out")]
    Timeout,
    #[error("channel closed")]
    ChannelClosed,
    #[error("modbus exception: {0}")]
    Exception(ExceptionResponse),
    #[error("datalink error: {0}")]
    DataLink(DataLinkError),
    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u8, last: Box<ClientError> },
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Encode(_) | Self::InvalidRequest(_) => ErrorKind::Encoding,
            Self::Checksum(_) => ErrorKind::Checksum,
            Self::Framing(_) | Self::UnexpectedResponse(_) => ErrorKind::Framing,
            Self::Timeout => ErrorKind::Timeout,
            Self::ChannelClosed => ErrorKind::ChannelClosed,
            Self::Exception(_) => ErrorKind::ModbusException,
            Self::DataLink(err) => match err {
                DataLinkError::Io(_) | DataLinkError::ChannelClosed => ErrorKind::ChannelClosed,
                DataLinkError::Timeout => ErrorKind::Timeout,
                DataLinkError::FrameTooLong { .. } => ErrorKind::Framing,
                DataLinkError::Decode(err) if err.is_checksum() => ErrorKind::Checksum,
                DataLinkError::Decode(_) => ErrorKind::Framing,
                DataLinkError::Encode(_) | DataLinkError::Settings(_) => ErrorKind::Encoding,
            },
            Self::RetriesExhausted { last, .. } => last.kind(),
        }
    }

    /// Transient faults worth another attempt on the same line.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Checksum(_)
                | Self::Framing(_)
                | Self::UnexpectedResponse(_)
                | Self::Timeout
                | Self::DataLink(DataLinkError::FrameTooLong { .. })
        )
    }

    /// The exception a slave answered with, if that is what ended the request.
    pub fn exception(&self) -> Option<&ExceptionResponse> {
        match self {
            Self::Exception(exception) => Some(exception),
            Self::RetriesExhausted { last, .. } => last.exception(),
            _ => None,
        }
    }
}

impl From<DecodeError> for ClientError {
    fn from(err: DecodeError) -> Self {
        if err.is_checksum() {
            Self::Checksum(err)
        } else {
            Self::Framing(err)
        }
    }
}

impl From<DataLinkError> for ClientError {
    fn from(err: DataLinkError) -> Self {
        match err {
            DataLinkError::Timeout => Self::Timeout,
            DataLinkError::ChannelClosed => Self::ChannelClosed,
            DataLinkError::Decode(err) => err.into(),
            DataLinkError::Encode(err) => Self::Encode(err),
            other => Self::DataLink(other),
        }
    }
}
