//! Art-Net timecode receiver.
//!
//! A dedicated thread blocks on the socket with a 100 ms read timeout so it
//! can notice the shutdown flag promptly; accepted packets publish packed
//! timecode, detected rate and a receive timestamp through relaxed atomics.

use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::clock::{self, LIVENESS_TIMEOUT_MS};
use crate::types::{FrameRate, Timecode};

use super::{decode, SocketError};

const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Where the receiver actually bound, and whether it had to fall back to the
/// wildcard address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindInfo {
    pub local: SocketAddr,
    pub fell_back: bool,
}

impl std::fmt::Display for BindInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.local)?;
        if self.fell_back {
            f.write_str(" [FALLBACK]")?;
        }
        Ok(())
    }
}

#[derive(Default)]
struct Shared {
    packed_tc: AtomicU32,
    fps_index: AtomicU8,
    last_packet_ms: AtomicU64,
    running: AtomicBool,
}

/// Art-Net timecode input handler.
pub struct ArtnetInput {
    shared: Arc<Shared>,
    shutdown: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
    bind_info: Option<BindInfo>,
}

impl ArtnetInput {
    pub fn new() -> Self {
        let shared = Arc::new(Shared::default());
        shared
            .last_packet_ms
            .store(f64::NEG_INFINITY.to_bits(), Ordering::Relaxed);
        Self {
            shared,
            shutdown: Arc::new(AtomicBool::new(false)),
            thread: None,
            bind_info: None,
        }
    }

    /// Bind and start listening. `interface` selects the local IP to bind;
    /// `None` (or a refused bind) uses the wildcard address. Pass
    /// [`ARTNET_PORT`] outside of tests.
    pub fn start(&mut self, interface: Option<Ipv4Addr>, port: u16) -> Result<BindInfo, SocketError> {
        self.stop();

        let (socket, fell_back) = bind_with_fallback(interface, port)?;
        socket.set_read_timeout(Some(READ_TIMEOUT)).map_err(SocketError::Bind)?;
        let info = BindInfo {
            local: socket.local_addr().map_err(SocketError::Bind)?,
            fell_back,
        };

        self.shared
            .last_packet_ms
            .store(f64::NEG_INFINITY.to_bits(), Ordering::Relaxed);
        self.shutdown.store(false, Ordering::Relaxed);
        self.shared.running.store(true, Ordering::Relaxed);

        let shared = self.shared.clone();
        let shutdown = self.shutdown.clone();
        let handle = thread::Builder::new()
            .name("artnet-input".into())
            .spawn(move || receive_loop(socket, shared, shutdown))
            .map_err(SocketError::Bind)?;
        self.thread = Some(handle);
        self.bind_info = Some(info);

        log::info!("Art-Net input listening on {info}");
        Ok(info)
    }

    /// Synchronous stop: flags the thread and joins it (the read timeout
    /// bounds the wait to ~100 ms).
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
        self.shared.running.store(false, Ordering::Relaxed);
        self.bind_info = None;
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Relaxed)
    }

    pub fn bind_info(&self) -> Option<BindInfo> {
        self.bind_info
    }

    /// True while packets have arrived within the liveness window.
    pub fn is_receiving(&self) -> bool {
        let last = f64::from_bits(self.shared.last_packet_ms.load(Ordering::Relaxed));
        clock::now_ms() - last < LIVENESS_TIMEOUT_MS
    }

    pub fn current_timecode(&self) -> Timecode {
        Timecode::unpack(self.shared.packed_tc.load(Ordering::Relaxed))
    }

    pub fn detected_fps(&self) -> FrameRate {
        FrameRate::from_index(self.shared.fps_index.load(Ordering::Relaxed))
    }
}

impl Default for ArtnetInput {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ArtnetInput {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Bind to `ip:port`, retrying on the wildcard address when a specific IP
/// refuses.
fn bind_with_fallback(
    interface: Option<Ipv4Addr>,
    port: u16,
) -> Result<(UdpSocket, bool), SocketError> {
    if let Some(ip) = interface {
        match UdpSocket::bind(SocketAddrV4::new(ip, port)) {
            Ok(socket) => return Ok((socket, false)),
            Err(e) => {
                log::warn!("Art-Net bind to {ip}:{port} refused ({e}), falling back to 0.0.0.0");
            }
        }
    }
    let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port))
        .map_err(SocketError::Bind)?;
    Ok((socket, interface.is_some()))
}

fn receive_loop(socket: UdpSocket, shared: Arc<Shared>, shutdown: Arc<AtomicBool>) {
    let mut buf = [0u8; 1024];
    while !shutdown.load(Ordering::Relaxed) {
        let n = match socket.recv_from(&mut buf) {
            Ok((n, _)) => n,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => continue,
            Err(e) => {
                log::warn!("Art-Net receive error: {e}");
                continue;
            }
        };

        match decode(&buf[..n]) {
            Ok(packet) => {
                if packet.reserved_bits != 0 {
                    log::debug!(
                        "ArtTimeCode with non-zero reserved bits {:#04x}",
                        packet.reserved_bits
                    );
                }
                shared
                    .packed_tc
                    .store(packet.timecode.pack(), Ordering::Relaxed);
                shared
                    .fps_index
                    .store(packet.fps.to_index(), Ordering::Relaxed);
                shared
                    .last_packet_ms
                    .store(clock::now_ms().to_bits(), Ordering::Relaxed);
            }
            // Malformed packets are dropped without touching the receive
            // timestamp, so liveness decays naturally during a drought.
            Err(e) => log::debug!("dropping datagram: {e}"),
        }
    }
    log::info!("Art-Net input thread stopped");
}
