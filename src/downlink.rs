// src/downlink.rs

use crate::config::TransportConfig;
use crate::error::{Error, Result};
use crate::pipeline::PipelineContext;
use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// All-listeners destination
pub const BROADCAST_ADDRESS: [u8; 6] = [0xFF; 6];

/// Pause before each dequeue so the worker never monopolises its core
pub const TRANSMIT_YIELD: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerInfo {
    pub address: [u8; 6],
    pub channel: u8,
    pub encrypt: bool,
}

impl PeerInfo {
    pub fn broadcast(channel: u8) -> Self {
        Self {
            address: BROADCAST_ADDRESS,
            channel,
            encrypt: false,
        }
    }
}

/// Point-to-point broadcast link. `init` and `add_peer` run once at startup,
/// after which the transport moves into the transmit worker.
pub trait Transport: Send {
    fn init(&mut self) -> Result<()>;
    fn add_peer(&mut self, peer: &PeerInfo) -> Result<()>;
    fn send(&mut self, peer: &[u8; 6], frame: &[u8]) -> Result<()>;
}

/// Sends each frame as one UDP datagram to a broadcast address
pub struct UdpBroadcastTransport {
    target: SocketAddr,
    socket: Option<UdpSocket>,
    peers: Vec<PeerInfo>,
}

impl UdpBroadcastTransport {
    pub fn from_config(config: &TransportConfig) -> Result<Self> {
        let ip: IpAddr = config.broadcast_ip.parse().map_err(|_| {
            Error::InvalidConfig(format!("bad broadcast_ip {:?}", config.broadcast_ip))
        })?;
        Ok(Self {
            target: SocketAddr::new(ip, config.port),
            socket: None,
            peers: Vec::new(),
        })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }
}

impl Transport for UdpBroadcastTransport {
    fn init(&mut self) -> Result<()> {
        let socket = UdpSocket::bind(("0.0.0.0", 0))
            .map_err(|e| Error::TransportInit(format!("bind: {}", e)))?;
        socket
            .set_broadcast(true)
            .map_err(|e| Error::TransportInit(format!("SO_BROADCAST: {}", e)))?;
        self.socket = Some(socket);
        Ok(())
    }

    fn add_peer(&mut self, peer: &PeerInfo) -> Result<()> {
        if self.socket.is_none() {
            return Err(Error::PeerRegistration("transport not initialized".into()));
        }
        if peer.encrypt {
            return Err(Error::PeerRegistration("encrypted peers not supported".into()));
        }
        if self.peers.iter().any(|p| p.address == peer.address) {
            return Err(Error::PeerRegistration(format!(
                "peer {} already registered",
                mac_to_string(&peer.address)
            )));
        }
        self.peers.push(*peer);
        Ok(())
    }

    fn send(&mut self, peer: &[u8; 6], frame: &[u8]) -> Result<()> {
        let socket = self
            .socket
            .as_ref()
            .ok_or_else(|| Error::Send("transport not initialized".into()))?;
        if !self.peers.iter().any(|p| &p.address == peer) {
            return Err(Error::Send(format!("unknown peer {}", mac_to_string(peer))));
        }
        let written = socket
            .send_to(frame, self.target)
            .map_err(|e| Error::Send(e.to_string()))?;
        crate::stack::mark_current();
        if written != frame.len() {
            return Err(Error::Send(format!("short write {}/{}", written, frame.len())));
        }
        Ok(())
    }
}

pub fn mac_to_string(addr: &[u8; 6]) -> String {
    addr.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}

/// Transmit worker: dequeue, send, repeat. Runs for the life of the process.
///
/// Delivery is at most once. A failed send is logged and the message dropped;
/// it is never put back on the queue.
pub fn transmit_loop<T: Transport>(
    ctx: Arc<PipelineContext>,
    mut transport: T,
    peer: [u8; 6],
    yield_for: Duration,
) {
    ctx.transmit_stack.anchor();

    loop {
        thread::sleep(yield_for);

        let message = match ctx.queue.dequeue() {
            Ok(m) => m,
            Err(e) => {
                log::error!("Transmit worker stopping: {}", e);
                return;
            }
        };
        ctx.transmit_stack.mark();

        log::debug!("Transmit {}", String::from_utf8_lossy(message.payload()));

        match transport.send(&peer, message.frame()) {
            Ok(()) => ctx.stats.record_sent(),
            Err(e) => {
                ctx.stats.record_send_failed();
                log::warn!("Send to {} failed: {}", mac_to_string(&peer), e);
            }
        }
        ctx.transmit_stack.mark();
    }
}
