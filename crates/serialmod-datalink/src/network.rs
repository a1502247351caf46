//! A virtual multidrop bus: every byte written on one port reaches all others.
//!
//! Each attached stream gets a reader task that copies what it sends into the
//! outboxes of the other ports, and a writer task that drains its own outbox.
//! Writers are queued so a port nobody reads from never stalls the bus.

use crate::channel::StreamChannel;
use crate::settings::SerialSettings;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

const FORWARD_CHUNK: usize = 256;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NetworkError {
    #[error("port {0} is already on the network")]
    PortExists(String),
    #[error("port {0} is not on the network")]
    UnknownPort(String),
}

#[derive(Debug)]
struct Port {
    id: u64,
    outbox: mpsc::UnboundedSender<Vec<u8>>,
    reader: JoinHandle<()>,
}

impl Drop for Port {
    fn drop(&mut self) {
        // Dropping the outbox ends the writer task.
        self.reader.abort();
    }
}

type PortMap = Arc<RwLock<BTreeMap<String, Port>>>;

/// Handle to a running virtual network.
///
/// Dropping it detaches every port; their peers then see end of stream.
#[derive(Debug)]
pub struct VirtualNetwork {
    settings: SerialSettings,
    buffer: usize,
    loopback: bool,
    ports: PortMap,
    next_id: AtomicU64,
}

impl VirtualNetwork {
    /// An empty network. Must be created inside a tokio runtime.
    pub fn new(settings: SerialSettings, buffer: usize) -> Self {
        Self {
            settings,
            buffer,
            loopback: false,
            ports: Arc::new(RwLock::new(BTreeMap::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Also echo each port's bytes back to itself.
    pub fn with_loopback(mut self, loopback: bool) -> Self {
        self.loopback = loopback;
        self
    }

    /// Adds an in-memory port named `<settings.port>.<n>` and returns its channel.
    pub fn add_port(&self) -> StreamChannel<DuplexStream> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let name = format!("{}.{id}", self.settings.port);
        let (outer, hub) = tokio::io::duplex(self.buffer);
        let mut ports = self.ports.write().unwrap_or_else(PoisonError::into_inner);
        self.attach(&mut ports, id, name.clone(), hub);
        drop(ports);

        let mut settings = self.settings.clone();
        settings.port = name;
        StreamChannel::new(outer, settings)
    }

    /// Joins an existing byte stream, such as an opened serial port, to the network.
    pub fn add_external<IO>(&self, name: impl Into<String>, io: IO) -> Result<(), NetworkError>
    where
        IO: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let name = name.into();
        let mut ports = self.ports.write().unwrap_or_else(PoisonError::into_inner);
        if ports.contains_key(&name) {
            return Err(NetworkError::PortExists(name));
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.attach(&mut ports, id, name, io);
        Ok(())
    }

    /// Detaches `name`; its peer sees end of stream.
    pub fn remove_port(&self, name: &str) -> Result<(), NetworkError> {
        let removed = self
            .ports
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
        match removed {
            Some(_) => {
                debug!(port = name, "virtual network port removed");
                Ok(())
            }
            None => Err(NetworkError::UnknownPort(name.to_owned())),
        }
    }

    /// Names of the attached ports, sorted.
    pub fn ports(&self) -> Vec<String> {
        self.ports
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    // Called with the map locked so a reader that hits end of stream at once
    // cannot unregister before it is registered.
    fn attach<IO>(&self, ports: &mut BTreeMap<String, Port>, id: u64, name: String, io: IO)
    where
        IO: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (reader, writer) = tokio::io::split(io);
        let (outbox, inbox) = mpsc::unbounded_channel();
        tokio::spawn(drain(writer, inbox));
        let reader = tokio::spawn(forward(
            id,
            name.clone(),
            reader,
            Arc::clone(&self.ports),
            self.loopback,
        ));
        debug!(port = %name, "virtual network port added");
        ports.insert(name, Port { id, outbox, reader });
    }
}

impl Drop for VirtualNetwork {
    fn drop(&mut self) {
        // Reader tasks share the map, so it has to be emptied explicitly.
        self.ports
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Creates a network with `ports` in-memory ports attached.
pub fn virtual_network(
    settings: SerialSettings,
    ports: usize,
    buffer: usize,
) -> (VirtualNetwork, Vec<StreamChannel<DuplexStream>>) {
    let network = VirtualNetwork::new(settings, buffer);
    let channels = (0..ports).map(|_| network.add_port()).collect();
    (network, channels)
}

async fn forward<R>(id: u64, name: String, mut reader: R, ports: PortMap, loopback: bool)
where
    R: AsyncRead + Unpin,
{
    let mut chunk = [0u8; FORWARD_CHUNK];
    loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        trace!(port = %name, len = n, "virtual network forward");
        let attached = ports.read().unwrap_or_else(PoisonError::into_inner);
        for (other, port) in attached.iter() {
            if loopback || *other != name {
                let _ = port.outbox.send(chunk[..n].to_vec());
            }
        }
    }

    debug!(port = %name, "virtual network port disconnected");
    let mut attached = ports.write().unwrap_or_else(PoisonError::into_inner);
    // The name may have been reused by a newer port.
    if attached.get(&name).is_some_and(|port| port.id == id) {
        attached.remove(&name);
    }
}

async fn drain<W>(mut writer: W, mut inbox: mpsc::UnboundedReceiver<Vec<u8>>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(bytes) = inbox.recv().await {
        if writer.write_all(&bytes).await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{NetworkError, VirtualNetwork, virtual_network};
    use crate::channel::{FrameBoundary, SerialChannel};
    use crate::settings::SerialSettings;
    use crate::DataLinkError;
    use std::time::Duration;

    const QUIET: Duration = Duration::from_millis(5);

    fn settings() -> SerialSettings {
        SerialSettings::new("bus")
    }

    #[tokio::test(start_paused = true)]
    async fn bytes_reach_every_other_port() {
        let (_network, mut ports) = virtual_network(settings(), 3, 256);
        assert_eq!(ports[1].state().settings.port, "bus.1");

        ports[0].write(&[0x01, 0x03, 0x00]).await.unwrap();
        for port in &mut ports[1..] {
            let frame = port
                .read_frame(FrameBoundary::Silence(QUIET), Duration::from_millis(100))
                .await
                .unwrap();
            assert_eq!(frame, vec![0x01, 0x03, 0x00]);
        }

        let err = ports[0]
            .read_frame(FrameBoundary::Silence(QUIET), Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, DataLinkError::Timeout));
    }

    #[tokio::test(start_paused = true)]
    async fn loopback_echoes_to_the_sender() {
        let network = VirtualNetwork::new(settings(), 256).with_loopback(true);
        let mut port = network.add_port();

        port.write(b"ping").await.unwrap();
        let frame = port
            .read_frame(FrameBoundary::Silence(QUIET), Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(frame, b"ping");
    }

    #[tokio::test(start_paused = true)]
    async fn removed_port_hangs_up_and_stops_receiving() {
        let (network, mut ports) = virtual_network(settings(), 2, 256);
        assert_eq!(network.ports(), vec!["bus.0".to_owned(), "bus.1".to_owned()]);

        network.remove_port("bus.1").unwrap();
        assert_eq!(
            network.remove_port("bus.1"),
            Err(NetworkError::UnknownPort("bus.1".to_owned()))
        );

        let err = ports[1]
            .read_frame(FrameBoundary::Silence(QUIET), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, DataLinkError::ChannelClosed));
        assert!(!ports[1].is_open());
        assert_eq!(network.ports(), vec!["bus.0".to_owned()]);
    }

    #[tokio::test(start_paused = true)]
    async fn external_streams_join_by_name() {
        let network = VirtualNetwork::new(settings(), 256);
        let mut port = network.add_port();
        let (external, mut far_end) = tokio::io::duplex(256);
        network.add_external("ttyUSB0", external).unwrap();

        let (again, _unused) = tokio::io::duplex(16);
        assert_eq!(
            network.add_external("ttyUSB0", again),
            Err(NetworkError::PortExists("ttyUSB0".to_owned()))
        );

        port.write(&[0xAA, 0x55]).await.unwrap();
        let mut received = [0u8; 2];
        tokio::io::AsyncReadExt::read_exact(&mut far_end, &mut received)
            .await
            .unwrap();
        assert_eq!(received, [0xAA, 0x55]);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_port_does_not_block_the_bus() {
        let (_network, mut ports) = virtual_network(settings(), 3, 8);
        // Port 2 never reads; its queue grows while port 1 keeps up.
        for round in 0..16u8 {
            ports[0].write(&[round; 8]).await.unwrap();
            let frame = ports[1]
                .read_frame(FrameBoundary::Silence(QUIET), Duration::from_millis(100))
                .await
                .unwrap();
            assert_eq!(frame, vec![round; 8]);
        }
    }
}
