//! MTC output handler.
//!
//! Four quarter-frames per frame on a 1 ms ticker thread, paced by the
//! shared drift-free scheduler (50 ms catch-up bound). At quarter-frame
//! index 0 the target timecode is snapshotted under the lock so all eight
//! messages of a cycle describe the same frame. Unpausing resets the cursor
//! and re-syncs the receiver with a full-frame SysEx; `start()` sends no
//! full-frame because no target is known yet.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use tcroute_core::clock;
use tcroute_core::sched::{CadencePacer, Ticker};
use tcroute_core::types::{FrameRate, Timecode};

use super::{full_frame_sysex, quarter_frame_byte};
use crate::ports::{self, MidiPortError};

/// Arrears beyond this reset the pacer instead of bursting.
const CATCH_UP_BOUND_MS: f64 = 50.0;

fn qf_interval_ms(fps: FrameRate) -> f64 {
    1000.0 / (fps.as_f64() * 4.0)
}

#[derive(Default)]
struct Shared {
    target: Mutex<(Timecode, FrameRate)>,
    paused: AtomicBool,
    running: AtomicBool,
    resync: AtomicBool,
    send_errors: AtomicU32,
}

/// MTC output handler.
pub struct MtcOutput {
    shared: Arc<Shared>,
    pacer: Arc<CadencePacer>,
    ticker: Option<Ticker>,
    port_name: Option<String>,
}

impl MtcOutput {
    pub fn new() -> Self {
        let fps = FrameRate::Fps30;
        let shared = Shared::default();
        shared.target.lock().1 = fps;
        Self {
            shared: Arc::new(shared),
            pacer: Arc::new(CadencePacer::new(qf_interval_ms(fps), CATCH_UP_BOUND_MS)),
            ticker: None,
            port_name: None,
        }
    }

    /// Connect to the first output port matching `port_match` and begin the
    /// quarter-frame cadence at cursor 0.
    pub fn start(&mut self, port_match: &str) -> Result<String, MidiPortError> {
        self.stop();

        let (mut connection, name) = ports::connect_output_port(port_match)?;

        self.shared.paused.store(false, Ordering::Relaxed);
        self.shared.resync.store(false, Ordering::Relaxed);
        self.shared.send_errors.store(0, Ordering::Relaxed);
        self.shared.running.store(true, Ordering::Relaxed);
        self.pacer.reset(clock::now_ms());

        let shared = self.shared.clone();
        let pacer = self.pacer.clone();
        let mut qf_index = 0u8;
        let mut cycle = (Timecode::default(), FrameRate::Fps30);
        self.ticker = Some(Ticker::spawn("mtc-output", move || {
            if shared.paused.load(Ordering::Relaxed) {
                return;
            }

            if shared.resync.swap(false, Ordering::Relaxed) {
                qf_index = 0;
                let (tc, fps) = *shared.target.lock();
                if connection.send(&full_frame_sysex(tc, fps)).is_err() {
                    shared.send_errors.fetch_add(1, Ordering::Relaxed);
                }
                pacer.reset(clock::now_ms());
                return;
            }

            let due = pacer.due(clock::now_ms());
            for _ in 0..due {
                if qf_index == 0 {
                    // One snapshot per 8-QF cycle keeps the receiver's view
                    // of the frame consistent.
                    cycle = *shared.target.lock();
                }
                let byte = quarter_frame_byte(qf_index, cycle.0, cycle.1);
                if connection.send(&[super::QUARTER_FRAME_STATUS, byte]).is_err() {
                    shared.send_errors.fetch_add(1, Ordering::Relaxed);
                }
                qf_index = (qf_index + 1) & 0x07;
            }
        }));

        self.port_name = Some(name.clone());
        Ok(name)
    }

    pub fn stop(&mut self) {
        if let Some(mut ticker) = self.ticker.take() {
            ticker.stop();
        }
        self.shared.running.store(false, Ordering::Relaxed);
        self.shared.paused.store(false, Ordering::Relaxed);
        self.port_name = None;
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Relaxed)
    }

    pub fn port_name(&self) -> Option<&str> {
        self.port_name.as_deref()
    }

    /// Called from the UI thread; the cadence thread snapshots this at
    /// quarter-frame index 0.
    pub fn set_timecode(&self, tc: Timecode) {
        self.shared.target.lock().0 = tc;
    }

    /// Retune the cadence; the pacer self-adjusts without a restart.
    pub fn set_fps(&self, fps: FrameRate) {
        let mut target = self.shared.target.lock();
        if target.1 != fps {
            target.1 = fps;
            self.pacer.set_interval_ms(qf_interval_ms(fps));
        }
    }

    /// Pausing stops emission; unpausing resets the quarter-frame cursor
    /// and re-syncs the receiver with a full-frame message.
    pub fn set_paused(&self, paused: bool) {
        let was = self.shared.paused.swap(paused, Ordering::Relaxed);
        if was && !paused {
            self.shared.resync.store(true, Ordering::Relaxed);
        }
    }

    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::Relaxed)
    }

    pub fn send_errors(&self) -> u32 {
        self.shared.send_errors.load(Ordering::Relaxed)
    }
}

impl Default for MtcOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MtcOutput {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qf_interval_tracks_rate() {
        assert!((qf_interval_ms(FrameRate::Fps25) - 10.0).abs() < 1e-9);
        assert!((qf_interval_ms(FrameRate::Fps30) - 25.0 / 3.0).abs() < 1e-9);
        assert!((qf_interval_ms(FrameRate::Fps24) - 125.0 / 12.0).abs() < 1e-9);
    }

    #[test]
    fn pause_state_without_device() {
        // State transitions are plain atomics and work with no port open.
        let output = MtcOutput::new();
        assert!(!output.is_running());
        output.set_paused(true);
        assert!(output.is_paused());
        output.set_paused(false);
        assert!(!output.is_paused());
        // Unpausing flagged a resync for the (future) cadence thread.
        assert!(output.shared.resync.load(Ordering::Relaxed));
    }
}
