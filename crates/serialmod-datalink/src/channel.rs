//! Byte-level transport over one serial line.

use crate::settings::SerialSettings;
use crate::DataLinkError;
use async_trait::async_trait;
use serialmod_core::frame::{FramingMode, ascii, rtu};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{Instant, timeout};
use tracing::{debug, trace, warn};

const READ_CHUNK: usize = 64;

/// Longest gap between characters of one ASCII frame.
pub const ASCII_CHAR_TIMEOUT: Duration = Duration::from_secs(1);

/// How [`SerialChannel::read_frame`] decides that a frame is complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameBoundary {
    /// RTU: the frame ends once the line stays quiet for the threshold.
    Silence(Duration),
    /// ASCII: the frame ends at `byte`, or when the line goes quiet.
    Terminator { quiet: Duration, byte: u8 },
}

impl FrameBoundary {
    pub const fn for_framing(framing: FramingMode, quiet: Duration) -> Self {
        match framing {
            FramingMode::Rtu => Self::Silence(quiet),
            FramingMode::Ascii => Self::Terminator {
                quiet,
                byte: ascii::END[1],
            },
        }
    }

    pub const fn quiet_threshold(self) -> Duration {
        match self {
            Self::Silence(quiet) | Self::Terminator { quiet, .. } => quiet,
        }
    }

    /// Longest frame accepted before the read reports [`DataLinkError::FrameTooLong`].
    pub const fn max_frame_len(self) -> usize {
        match self {
            Self::Silence(_) => rtu::MAX_FRAME_LEN,
            Self::Terminator { .. } => ascii::MAX_FRAME_LEN,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Open,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelState {
    pub link: LinkState,
    pub settings: SerialSettings,
    /// Last successful write, or last read that produced bytes.
    pub last_activity: Option<Instant>,
}

impl ChannelState {
    pub fn new(settings: SerialSettings) -> Self {
        Self {
            link: LinkState::Open,
            settings,
            last_activity: None,
        }
    }
}

/// A half-duplex byte stream with frame-level reads.
///
/// Implementations move bytes only; framing and checksums live in
/// `serialmod_core::frame`. Once an I/O failure closes the channel every
/// operation fails with [`DataLinkError::ChannelClosed`].
#[async_trait]
pub trait SerialChannel: Send {
    /// Writes and flushes all of `bytes`.
    async fn write(&mut self, bytes: &[u8]) -> Result<(), DataLinkError>;

    /// Reads one frame.
    ///
    /// Waits for the first byte, then collects bytes until `boundary` says
    /// the frame is over. `overall_timeout` bounds the whole call, counted
    /// from its start, and yields [`DataLinkError::Timeout`] even while
    /// bytes keep arriving.
    async fn read_frame(
        &mut self,
        boundary: FrameBoundary,
        overall_timeout: Duration,
    ) -> Result<Vec<u8>, DataLinkError>;

    /// Drops bytes already buffered by the stream. Returns how many were dropped.
    async fn discard_input(&mut self) -> Result<usize, DataLinkError>;

    fn state(&self) -> &ChannelState;

    fn is_open(&self) -> bool {
        self.state().link == LinkState::Open
    }

    fn last_activity(&self) -> Option<Instant> {
        self.state().last_activity
    }
}

/// [`SerialChannel`] over any async byte stream.
#[derive(Debug)]
pub struct StreamChannel<IO> {
    io: Option<IO>,
    state: ChannelState,
}

impl<IO> StreamChannel<IO>
where
    IO: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(io: IO, settings: SerialSettings) -> Self {
        Self {
            io: Some(io),
            state: ChannelState::new(settings),
        }
    }

    /// Puts a fresh stream behind a channel, typically after it was closed.
    pub fn reopen_with(&mut self, io: IO) {
        debug!(port = %self.state.settings.port, "serial channel reopened");
        self.io = Some(io);
        self.state.link = LinkState::Open;
    }

    pub fn close(&mut self) {
        if self.io.take().is_some() {
            debug!(port = %self.state.settings.port, "serial channel closed");
        }
        self.state.link = LinkState::Closed;
    }

    pub fn into_inner(self) -> Option<IO> {
        self.io
    }

    fn fail(&mut self, err: std::io::Error) -> DataLinkError {
        warn!(port = %self.state.settings.port, error = %err, "serial channel failed, closing");
        self.io = None;
        self.state.link = LinkState::Closed;
        DataLinkError::Io(err)
    }

    fn hang_up(&mut self) -> DataLinkError {
        warn!(port = %self.state.settings.port, "serial stream ended, closing");
        self.io = None;
        self.state.link = LinkState::Closed;
        DataLinkError::ChannelClosed
    }

    fn touch(&mut self) {
        self.state.last_activity = Some(Instant::now());
    }
}

#[cfg(feature = "serial")]
impl StreamChannel<tokio_serial::SerialStream> {
    /// Opens and configures the OS serial device named in `settings`.
    pub fn open(settings: SerialSettings) -> Result<Self, DataLinkError> {
        use tokio_serial::SerialPortBuilderExt;

        settings.validate()?;
        let stream = settings.builder().open_native_async().map_err(|err| {
            DataLinkError::Io(std::io::Error::other(format!(
                "failed to open serial port '{}': {err}",
                settings.port
            )))
        })?;
        debug!(settings = %settings, "serial port opened");
        Ok(Self::new(stream, settings))
    }
}

#[async_trait]
impl<IO> SerialChannel for StreamChannel<IO>
where
    IO: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn write(&mut self, bytes: &[u8]) -> Result<(), DataLinkError> {
        let io = self.io.as_mut().ok_or(DataLinkError::ChannelClosed)?;
        trace!(len = bytes.len(), bytes = ?bytes, "serial write");
        let result = match io.write_all(bytes).await {
            Ok(()) => io.flush().await,
            Err(err) => Err(err),
        };
        match result {
            Ok(()) => {
                self.touch();
                Ok(())
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    async fn read_frame(
        &mut self,
        boundary: FrameBoundary,
        overall_timeout: Duration,
    ) -> Result<Vec<u8>, DataLinkError> {
        if self.io.is_none() {
            return Err(DataLinkError::ChannelClosed);
        }

        let quiet = boundary.quiet_threshold();
        let max = boundary.max_frame_len();
        let deadline = Instant::now() + overall_timeout;
        let mut frame = Vec::with_capacity(max.min(rtu::MAX_FRAME_LEN));
        let mut overflow = false;
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(DataLinkError::Timeout);
            }
            let wait = if frame.is_empty() && !overflow {
                remaining
            } else {
                quiet.min(remaining)
            };

            let Some(io) = self.io.as_mut() else {
                return Err(DataLinkError::ChannelClosed);
            };
            let read = timeout(wait, io.read(&mut chunk)).await;
            let n = match read {
                Ok(Ok(0)) => return Err(self.hang_up()),
                Ok(Ok(n)) => n,
                Ok(Err(err)) => return Err(self.fail(err)),
                Err(_) => {
                    let started = !frame.is_empty() || overflow;
                    if started && quiet <= remaining {
                        if overflow {
                            return Err(DataLinkError::FrameTooLong { max });
                        }
                        trace!(len = frame.len(), bytes = ?frame, "serial frame");
                        return Ok(frame);
                    }
                    return Err(DataLinkError::Timeout);
                }
            };
            self.touch();

            let received = &chunk[..n];
            let (received, terminated) = match boundary {
                FrameBoundary::Terminator { byte, .. } => {
                    match received.iter().position(|b| *b == byte) {
                        Some(end) => (&received[..=end], true),
                        None => (received, false),
                    }
                }
                FrameBoundary::Silence(_) => (received, false),
            };

            if !overflow && frame.len() + received.len() > max {
                overflow = true;
                frame.clear();
            }
            if !overflow {
                frame.extend_from_slice(received);
            }
            if terminated {
                if overflow {
                    return Err(DataLinkError::FrameTooLong { max });
                }
                trace!(len = frame.len(), bytes = ?frame, "serial frame");
                return Ok(frame);
            }
        }
    }

    async fn discard_input(&mut self) -> Result<usize, DataLinkError> {
        let mut dropped = 0usize;
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            let Some(io) = self.io.as_mut() else {
                return Err(DataLinkError::ChannelClosed);
            };
            match timeout(Duration::ZERO, io.read(&mut chunk)).await {
                Ok(Ok(0)) => return Err(self.hang_up()),
                Ok(Ok(n)) => dropped += n,
                Ok(Err(err)) => return Err(self.fail(err)),
                Err(_) => break,
            }
        }
        if dropped > 0 {
            debug!(dropped, "discarded stale input");
        }
        Ok(dropped)
    }

    fn state(&self) -> &ChannelState {
        &self.state
    }
}

/// Two channels joined back to back by an in-memory pipe.
///
/// Bytes written on one end are read on the other, which makes the pair a
/// stand-in for a null-modem cable in tests and simulations.
pub fn virtual_pair(
    settings: SerialSettings,
    buffer: usize,
) -> (
    StreamChannel<tokio::io::DuplexStream>,
    StreamChannel<tokio::io::DuplexStream>,
) {
    let (left, right) = tokio::io::duplex(buffer);
    (
        StreamChannel::new(left, settings.clone()),
        StreamChannel::new(right, settings),
    )
}

/// Names of the serial ports the OS reports.
#[cfg(feature = "serial")]
pub fn available_ports() -> Result<Vec<String>, DataLinkError> {
    let ports = tokio_serial::available_ports().map_err(|err| {
        DataLinkError::Io(std::io::Error::other(format!(
            "failed to enumerate serial ports: {err}"
        )))
    })?;
    Ok(ports.into_iter().map(|port| port.port_name).collect())
}

#[cfg(test)]
mod tests {
    use super::{FrameBoundary, LinkState, SerialChannel, StreamChannel, virtual_pair};
    use crate::DataLinkError;
    use crate::settings::SerialSettings;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;

    const QUIET: Duration = Duration::from_millis(5);

    fn settings() -> SerialSettings {
        SerialSettings::new("virtual0")
    }

    #[tokio::test(start_paused = true)]
    async fn reads_until_line_goes_quiet() {
        let (mut a, mut b) = virtual_pair(settings(), 512);
        a.write(&[0x11, 0x03, 0x00]).await.unwrap();
        a.write(&[0x6B, 0x00, 0x03, 0x76, 0x87]).await.unwrap();

        let frame = b
            .read_frame(FrameBoundary::Silence(QUIET), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(frame, vec![0x11, 0x03, 0x00, 0x6B, 0x00, 0x03, 0x76, 0x87]);
        assert!(b.last_activity().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn silence_splits_frames() {
        let (mut a, mut b) = virtual_pair(settings(), 512);
        let writer = tokio::spawn(async move {
            a.write(&[0x01, 0x02]).await.unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
            a.write(&[0x03, 0x04]).await.unwrap();
            a
        });

        let boundary = FrameBoundary::Silence(QUIET);
        let first = b.read_frame(boundary, Duration::from_secs(1)).await.unwrap();
        let second = b.read_frame(boundary, Duration::from_secs(1)).await.unwrap();
        assert_eq!(first, vec![0x01, 0x02]);
        assert_eq!(second, vec![0x03, 0x04]);
        let _ = writer.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_without_bytes() {
        let (_a, mut b) = virtual_pair(settings(), 512);
        let err = b
            .read_frame(FrameBoundary::Silence(QUIET), Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, DataLinkError::Timeout));
        assert!(b.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn overall_timeout_caps_a_trickling_sender() {
        let (mut a, mut b) = virtual_pair(settings(), 512);
        let writer = tokio::spawn(async move {
            for byte in 0..50u8 {
                if a.write(&[byte]).await.is_err() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        });

        let err = b
            .read_frame(FrameBoundary::Silence(QUIET), Duration::from_millis(30))
            .await
            .unwrap_err();
        assert!(matches!(err, DataLinkError::Timeout));
        drop(b);
        writer.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn ascii_frame_ends_at_terminator() {
        let (mut a, mut b) = virtual_pair(settings(), 512);
        a.write(b":1103006B00037E\r\n").await.unwrap();

        let boundary = FrameBoundary::Terminator {
            quiet: Duration::from_millis(500),
            byte: b'\n',
        };
        let frame = b.read_frame(boundary, Duration::from_secs(1)).await.unwrap();
        assert_eq!(frame, b":1103006B00037E\r\n".to_vec());
    }

    #[tokio::test(start_paused = true)]
    async fn rejects_oversized_frames_after_quiet() {
        let (mut a, mut b) = virtual_pair(settings(), 1024);
        a.write(&[0xAA; 300]).await.unwrap();

        let err = b
            .read_frame(FrameBoundary::Silence(QUIET), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, DataLinkError::FrameTooLong { max: 256 }));
    }

    #[tokio::test(start_paused = true)]
    async fn discards_stale_input() {
        let (mut a, mut b) = virtual_pair(settings(), 512);
        a.write(&[0xDE, 0xAD, 0xBE, 0xEF]).await.unwrap();
        assert_eq!(b.discard_input().await.unwrap(), 4);
        assert_eq!(b.discard_input().await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn closes_on_end_of_stream_and_fails_fast() {
        let (a, mut b) = virtual_pair(settings(), 512);
        drop(a);

        let err = b
            .read_frame(FrameBoundary::Silence(QUIET), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, DataLinkError::ChannelClosed));
        assert_eq!(b.state().link, LinkState::Closed);

        assert!(matches!(b.write(&[0x01]).await, Err(DataLinkError::ChannelClosed)));
        assert!(matches!(b.discard_input().await, Err(DataLinkError::ChannelClosed)));
    }

    #[tokio::test(start_paused = true)]
    async fn reopen_restores_a_closed_channel() {
        let (a, mut b) = virtual_pair(settings(), 512);
        drop(a);
        let _ = b.discard_input().await;
        assert!(!b.is_open());

        let (mut peer, fresh) = tokio::io::duplex(512);
        b.reopen_with(fresh);
        assert!(b.is_open());

        peer.write_all(&[0x01, 0x02, 0x03, 0x04]).await.unwrap();
        let frame = b
            .read_frame(FrameBoundary::Silence(QUIET), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(frame.len(), 4);
    }

    #[test]
    fn boundary_follows_framing() {
        use serialmod_core::FramingMode;
        let rtu = FrameBoundary::for_framing(FramingMode::Rtu, QUIET);
        assert_eq!(rtu, FrameBoundary::Silence(QUIET));
        assert_eq!(rtu.max_frame_len(), 256);
        let ascii = FrameBoundary::for_framing(FramingMode::Ascii, QUIET);
        assert_eq!(ascii.quiet_threshold(), QUIET);
        assert_eq!(ascii.max_frame_len(), 513);
    }

    #[tokio::test]
    async fn stream_channel_keeps_settings() {
        let (_peer, io) = tokio::io::duplex(64);
        let channel = StreamChannel::new(io, SerialSettings::new("COM7").with_baud_rate(19200));
        assert_eq!(channel.state().settings.baud_rate, 19200);
        assert_eq!(channel.state().link, LinkState::Open);
        assert!(channel.last_activity().is_none());
    }
}
