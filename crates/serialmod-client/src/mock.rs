use async_trait::async_trait;
use serialmod_core::FramingMode;
use serialmod_core::encoding::Writer;
use serialmod_datalink::{
    ChannelState, DataLinkError, FrameBoundary, LinkState, SerialChannel, SerialSettings,
};
use std::collections::VecDeque;
use std::time::Duration;

/// What the scripted line does on the next `read_frame`.
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Frame(Vec<u8>),
    /// Silence until the overall timeout expires.
    Silence,
    /// The line dies; every later operation fails.
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Event {
    Write(Vec<u8>),
    Read,
    Discard,
}

/// Scripted stand-in for a serial line.
///
/// Replies are consumed in order. Once the script runs out the line either
/// stays silent or, with `echo`, answers every request with its own bytes.
#[derive(Debug)]
pub(crate) struct MockChannel {
    state: ChannelState,
    replies: VecDeque<Reply>,
    echo: bool,
    pub(crate) events: Vec<Event>,
}

impl MockChannel {
    pub(crate) fn new(replies: impl IntoIterator<Item = Reply>) -> Self {
        Self {
            state: ChannelState::new(SerialSettings::new("/dev/mock0")),
            replies: replies.into_iter().collect(),
            echo: false,
            events: Vec::new(),
        }
    }

    pub(crate) fn echoing() -> Self {
        let mut channel = Self::new([]);
        channel.echo = true;
        channel
    }

    pub(crate) fn writes(&self) -> Vec<&[u8]> {
        self.events
            .iter()
            .filter_map(|event| match event {
                Event::Write(bytes) => Some(bytes.as_slice()),
                _ => None,
            })
            .collect()
    }

    fn last_write(&self) -> Option<Vec<u8>> {
        self.writes().last().map(|bytes| bytes.to_vec())
    }
}

#[async_trait]
impl SerialChannel for MockChannel {
    async fn write(&mut self, bytes: &[u8]) -> Result<(), DataLinkError> {
        if !self.is_open() {
            return Err(DataLinkError::ChannelClosed);
        }
        // One suspension per byte so concurrent callers get every chance to interleave.
        for _ in bytes {
            tokio::task::yield_now().await;
        }
        self.events.push(Event::Write(bytes.to_vec()));
        Ok(())
    }

    async fn read_frame(
        &mut self,
        _boundary: FrameBoundary,
        overall_timeout: Duration,
    ) -> Result<Vec<u8>, DataLinkError> {
        tokio::task::yield_now().await;
        if !self.is_open() {
            return Err(DataLinkError::ChannelClosed);
        }
        self.events.push(Event::Read);
        let next = match self.replies.pop_front() {
            Some(reply) => reply,
            None => match self.last_write() {
                Some(bytes) if self.echo => Reply::Frame(bytes),
                _ => Reply::Silence,
            },
        };
        match next {
            Reply::Frame(bytes) => Ok(bytes),
            Reply::Silence => {
                tokio::time::sleep(overall_timeout).await;
                Err(DataLinkError::Timeout)
            }
            Reply::Closed => {
                self.state.link = LinkState::Closed;
                Err(DataLinkError::ChannelClosed)
            }
        }
    }

    async fn discard_input(&mut self) -> Result<usize, DataLinkError> {
        if !self.is_open() {
            return Err(DataLinkError::ChannelClosed);
        }
        self.events.push(Event::Discard);
        Ok(0)
    }

    fn state(&self) -> &ChannelState {
        &self.state
    }
}

/// Encodes `address + pdu` the way a slave would put it on the wire.
pub(crate) fn frame(framing: FramingMode, address: u8, pdu: &[u8]) -> Vec<u8> {
    let mut buf = [0u8; 600];
    let mut w = Writer::new(&mut buf);
    framing.encode(&mut w, address, pdu).unwrap();
    w.as_written().to_vec()
}

pub(crate) fn rtu(address: u8, pdu: &[u8]) -> Vec<u8> {
    frame(FramingMode::Rtu, address, pdu)
}
