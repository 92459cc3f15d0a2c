//! Art-Net timecode broadcaster.
//!
//! One packet per frame, paced by the shared drift-free scheduler on a 1 ms
//! ticker thread. The target timecode is read under a small lock on every
//! send so a packet never mixes fields from two UI writes.

use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::clock;
use crate::net::NetInterface;
use crate::sched::{CadencePacer, Ticker};
use crate::types::{FrameRate, Timecode};

use super::{encode, SocketError};

/// Arrears beyond this reset the pacer instead of bursting.
const CATCH_UP_BOUND_MS: f64 = 100.0;

#[derive(Default)]
struct Shared {
    target: Mutex<(Timecode, FrameRate)>,
    paused: AtomicBool,
    running: AtomicBool,
    send_errors: AtomicU32,
}

/// Art-Net timecode output handler.
pub struct ArtnetOutput {
    shared: Arc<Shared>,
    pacer: Arc<CadencePacer>,
    ticker: Option<Ticker>,
    destination: Option<SocketAddrV4>,
}

impl ArtnetOutput {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            pacer: Arc::new(CadencePacer::new(1000.0 / 30.0, CATCH_UP_BOUND_MS)),
            ticker: None,
            destination: None,
        }
    }

    /// Open the sender and begin broadcasting. With an interface the socket
    /// binds its local IP and targets its directed broadcast address;
    /// without one it binds the wildcard and targets 255.255.255.255.
    /// Pass [`super::ARTNET_PORT`] outside of tests.
    pub fn start(
        &mut self,
        interface: Option<&NetInterface>,
        port: u16,
    ) -> Result<SocketAddrV4, SocketError> {
        self.stop();

        let (bind_ip, broadcast_ip) = match interface {
            Some(ni) => (ni.ip, ni.broadcast),
            None => (Ipv4Addr::UNSPECIFIED, Ipv4Addr::BROADCAST),
        };

        let socket = match UdpSocket::bind(SocketAddrV4::new(bind_ip, 0)) {
            Ok(s) => s,
            Err(e) => {
                log::warn!("Art-Net sender bind to {bind_ip} refused ({e}), using 0.0.0.0");
                UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0))
                    .map_err(SocketError::Bind)?
            }
        };
        socket.set_broadcast(true).map_err(SocketError::Bind)?;

        let destination = SocketAddrV4::new(broadcast_ip, port);
        self.destination = Some(destination);

        let fps = self.shared.target.lock().1;
        self.pacer.set_interval_ms(1000.0 / fps.as_f64());
        self.pacer.reset(clock::now_ms());

        self.shared.paused.store(false, Ordering::Relaxed);
        self.shared.running.store(true, Ordering::Relaxed);
        self.shared.send_errors.store(0, Ordering::Relaxed);

        let shared = self.shared.clone();
        let pacer = self.pacer.clone();
        self.ticker = Some(Ticker::spawn("artnet-output", move || {
            if shared.paused.load(Ordering::Relaxed) {
                return;
            }
            let due = pacer.due(clock::now_ms());
            for _ in 0..due {
                let (tc, fps) = *shared.target.lock();
                if socket.send_to(&encode(tc, fps), destination).is_err() {
                    // Transient send failures are counted; the cadence keeps
                    // going and the next packet may well succeed.
                    shared.send_errors.fetch_add(1, Ordering::Relaxed);
                }
            }
        }));

        log::info!("Art-Net output broadcasting to {destination}");
        Ok(destination)
    }

    pub fn stop(&mut self) {
        if let Some(mut ticker) = self.ticker.take() {
            ticker.stop();
        }
        self.shared.running.store(false, Ordering::Relaxed);
        self.shared.paused.store(false, Ordering::Relaxed);
        self.destination = None;
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Relaxed)
    }

    pub fn destination(&self) -> Option<SocketAddrV4> {
        self.destination
    }

    pub fn set_timecode(&self, tc: Timecode) {
        self.shared.target.lock().0 = tc;
    }

    /// Retune the cadence; the pacer's accumulator self-adjusts, no restart.
    pub fn set_fps(&self, fps: FrameRate) {
        let mut target = self.shared.target.lock();
        if target.1 != fps {
            target.1 = fps;
            self.pacer.set_interval_ms(1000.0 / fps.as_f64());
        }
    }

    pub fn set_paused(&self, paused: bool) {
        let was = self.shared.paused.swap(paused, Ordering::Relaxed);
        if was && !paused {
            self.pacer.reset(clock::now_ms());
        }
    }

    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::Relaxed)
    }

    pub fn send_errors(&self) -> u32 {
        self.shared.send_errors.load(Ordering::Relaxed)
    }
}

impl Default for ArtnetOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ArtnetOutput {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::super::ArtnetInput;
    use super::*;
    use std::time::{Duration, Instant};

    /// End-to-end over the loopback: broadcast into a receiver bound on an
    /// ephemeral port and watch the timecode surface. Skipped quietly when
    /// the environment forbids sockets.
    #[test]
    fn loopback_roundtrip() {
        let mut input = ArtnetInput::new();
        let info = match input.start(Some(Ipv4Addr::LOCALHOST), 0) {
            Ok(info) => info,
            Err(e) => {
                println!("skipping: no loopback UDP available ({e})");
                return;
            }
        };
        let port = info.local.port();

        let iface = NetInterface {
            name: "lo".into(),
            ip: Ipv4Addr::LOCALHOST,
            broadcast: Ipv4Addr::LOCALHOST,
            subnet: Ipv4Addr::new(255, 0, 0, 0),
        };
        let mut output = ArtnetOutput::new();
        output.start(Some(&iface), port).expect("sender bind");
        output.set_fps(FrameRate::Fps25);
        output.set_timecode(Timecode::new(4, 3, 2, 1));
        output.set_paused(false);

        let deadline = Instant::now() + Duration::from_secs(2);
        while !input.is_receiving() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(input.is_receiving(), "no packets arrived over loopback");
        assert_eq!(input.current_timecode(), Timecode::new(4, 3, 2, 1));
        assert_eq!(input.detected_fps(), FrameRate::Fps25);

        // Pausing stops the cadence; liveness decays past the threshold.
        output.set_paused(true);
        std::thread::sleep(Duration::from_millis(200));
        assert!(!input.is_receiving());

        output.stop();
        input.stop();
        assert!(!input.is_running());
    }
}
