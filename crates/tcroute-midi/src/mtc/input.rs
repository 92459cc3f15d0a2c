//! MTC input handler.
//!
//! Reception runs on the midir callback thread: quarter-frames accumulate in
//! the assembler, and each completed frame (or full-frame SysEx) stores a
//! sync point - timecode, rate and wall-clock timestamp - under a small
//! lock. Readers interpolate from the last sync point; after 150 ms of
//! silence the value freezes.
//!
//! The assembled quarter-frame timecode is two frames behind real time (the
//! eight messages spanned two frame periods), so reconstruction adds two
//! frames before storing the sync point.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use midir::MidiInputConnection;
use parking_lot::Mutex;

use tcroute_core::clock::{self, LIVENESS_TIMEOUT_MS};
use tcroute_core::timecode::{frame_index_to_tc, frames_per_day, tc_to_frame_index};
use tcroute_core::types::{FrameRate, Timecode};

use super::{parse_full_frame, QfAssembler, QUARTER_FRAME_STATUS};
use crate::ports::{self, MidiPortError};

#[derive(Clone, Copy)]
struct SyncPoint {
    timecode: Timecode,
    fps: FrameRate,
    at_ms: f64,
}

impl Default for SyncPoint {
    fn default() -> Self {
        Self {
            timecode: Timecode::default(),
            fps: FrameRate::Fps25,
            at_ms: 0.0,
        }
    }
}

#[derive(Default)]
struct Shared {
    sync: Mutex<SyncPoint>,
    synced: AtomicBool,
    last_qf_ms: AtomicU64,
}

impl Shared {
    fn note_traffic(&self, now_ms: f64) {
        self.last_qf_ms.store(now_ms.to_bits(), Ordering::Relaxed);
    }

    fn store_sync(&self, timecode: Timecode, fps: FrameRate, now_ms: f64) {
        *self.sync.lock() = SyncPoint { timecode, fps, at_ms: now_ms };
        self.synced.store(true, Ordering::Relaxed);
    }

    /// Process one raw MIDI message. Runs on the midir thread; must stay
    /// short and allocation-free.
    fn handle_message(&self, assembler: &mut QfAssembler, data: &[u8], now_ms: f64) {
        if data.len() >= 2 && data[0] == QUARTER_FRAME_STATUS {
            self.note_traffic(now_ms);
            if let Some(raw) = assembler.push(data[1]) {
                // Compensate the two-frame transmission lag, modulo 24 h.
                let day = frames_per_day(raw.fps);
                let index = (tc_to_frame_index(raw.timecode, raw.fps) + 2) % day;
                self.store_sync(frame_index_to_tc(index, raw.fps), raw.fps, now_ms);
            }
        } else if let Some((timecode, fps)) = parse_full_frame(data) {
            self.note_traffic(now_ms);
            self.store_sync(timecode, fps, now_ms);
        }
    }

    fn is_receiving_at(&self, now_ms: f64) -> bool {
        if !self.synced.load(Ordering::Relaxed) {
            return false;
        }
        let last = f64::from_bits(self.last_qf_ms.load(Ordering::Relaxed));
        now_ms - last < LIVENESS_TIMEOUT_MS
    }

    fn current_timecode_at(&self, now_ms: f64) -> Timecode {
        if !self.synced.load(Ordering::Relaxed) {
            return Timecode::default();
        }
        let sync = *self.sync.lock();
        if !self.is_receiving_at(now_ms) {
            return sync.timecode;
        }

        let elapsed = now_ms - sync.at_ms;
        if elapsed < 0.0 {
            return sync.timecode;
        }
        let ms_per_frame = 1000.0 / sync.fps.as_f64();
        let extra = (elapsed / ms_per_frame) as u64;
        // Frame-index arithmetic keeps the extrapolation off the dropped
        // labels at 29.97 DF.
        let day = frames_per_day(sync.fps);
        let index = (tc_to_frame_index(sync.timecode, sync.fps) + extra) % day;
        frame_index_to_tc(index, sync.fps)
    }
}

/// MTC input handler.
pub struct MtcInput {
    shared: Arc<Shared>,
    connection: Option<MidiInputConnection<()>>,
    port_name: Option<String>,
}

impl MtcInput {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            connection: None,
            port_name: None,
        }
    }

    /// Connect to the first input port matching `port_match` (empty string
    /// takes the first available port) and start receiving.
    pub fn start(&mut self, port_match: &str) -> Result<String, MidiPortError> {
        self.stop();

        let (midi_in, port, name) = ports::find_input_port(port_match)?;

        self.shared.synced.store(false, Ordering::Relaxed);
        self.shared
            .last_qf_ms
            .store(f64::NEG_INFINITY.to_bits(), Ordering::Relaxed);
        *self.shared.sync.lock() = SyncPoint::default();

        let shared = self.shared.clone();
        let mut assembler = QfAssembler::new();
        let connection = midi_in
            .connect(
                &port,
                "tcroute-mtc-input",
                move |_timestamp, data, _| {
                    shared.handle_message(&mut assembler, data, clock::now_ms());
                },
                (),
            )
            .map_err(|e| MidiPortError::Connection(e.to_string()))?;

        self.connection = Some(connection);
        self.port_name = Some(name.clone());
        Ok(name)
    }

    pub fn stop(&mut self) {
        if let Some(connection) = self.connection.take() {
            let _ = connection.close();
        }
        self.port_name = None;
    }

    pub fn is_running(&self) -> bool {
        self.connection.is_some()
    }

    pub fn port_name(&self) -> Option<&str> {
        self.port_name.as_deref()
    }

    /// True while quarter-frames (or full frames) keep arriving.
    pub fn is_receiving(&self) -> bool {
        self.shared.is_receiving_at(clock::now_ms())
    }

    /// The interpolated current timecode; frozen at the last sync point
    /// while the source is silent.
    pub fn current_timecode(&self) -> Timecode {
        self.shared.current_timecode_at(clock::now_ms())
    }

    pub fn detected_fps(&self) -> FrameRate {
        self.shared.sync.lock().fps
    }
}

impl Default for MtcInput {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MtcInput {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mtc::{full_frame_sysex, quarter_frame_byte};
    use tcroute_core::timecode::increment_frame;

    fn feed_qf_cycle(shared: &Shared, assembler: &mut QfAssembler, tc: Timecode, fps: FrameRate, t0: f64) {
        let qf_ms = 1000.0 / (fps.as_f64() * 4.0);
        for index in 0..8u8 {
            let byte = [QUARTER_FRAME_STATUS, quarter_frame_byte(index, tc, fps)];
            shared.handle_message(assembler, &byte, t0 + f64::from(index) * qf_ms);
        }
    }

    #[test]
    fn full_frame_syncs_immediately() {
        let shared = Shared::default();
        let mut assembler = QfAssembler::new();
        let tc = Timecode::new(3, 4, 5, 6);
        shared.handle_message(&mut assembler, &full_frame_sysex(tc, FrameRate::Fps30), 1000.0);
        assert!(shared.is_receiving_at(1001.0));
        assert_eq!(shared.current_timecode_at(1001.0), tc);
    }

    #[test]
    fn qf_stream_converges_two_frames_ahead() {
        let fps = FrameRate::Fps25;
        let shared = Shared::default();
        let mut assembler = QfAssembler::new();

        let tc = Timecode::new(10, 0, 0, 0);
        feed_qf_cycle(&shared, &mut assembler, tc, fps, 0.0);

        // The 8 QFs described `tc` but took two frame periods to arrive:
        // the sync point must be tc + 2.
        let expected = increment_frame(increment_frame(tc, fps), fps);
        let sync_done = 7.0 * 10.0; // index 7 arrived at t = 70 ms
        assert_eq!(shared.current_timecode_at(sync_done), expected);
    }

    #[test]
    fn interpolation_between_sync_points() {
        let fps = FrameRate::Fps25; // 40 ms per frame
        let shared = Shared::default();
        let mut assembler = QfAssembler::new();
        let tc = Timecode::new(0, 0, 10, 0);
        shared.handle_message(&mut assembler, &full_frame_sysex(tc, fps), 0.0);

        assert_eq!(shared.current_timecode_at(39.0), tc);
        assert_eq!(shared.current_timecode_at(40.0), increment_frame(tc, fps));
        assert_eq!(
            shared.current_timecode_at(100.0),
            increment_frame(increment_frame(tc, fps), fps)
        );
    }

    #[test]
    fn extrapolation_skips_dropped_labels() {
        let fps = FrameRate::Fps2997;
        let shared = Shared::default();
        let mut assembler = QfAssembler::new();
        // Just before a dropped-minute boundary.
        let tc = Timecode::new(0, 0, 59, 28);
        shared.handle_message(&mut assembler, &full_frame_sysex(tc, fps), 0.0);

        let ms_per_frame = 1000.0 / fps.as_f64();
        // Two frames later the label must be 00:01:00.02, not the dropped 00.
        assert_eq!(
            shared.current_timecode_at(2.0 * ms_per_frame + 0.1),
            Timecode::new(0, 1, 0, 2)
        );
    }

    #[test]
    fn silence_freezes_at_last_sync() {
        let fps = FrameRate::Fps30;
        let shared = Shared::default();
        let mut assembler = QfAssembler::new();
        let tc = Timecode::new(1, 0, 0, 0);
        shared.handle_message(&mut assembler, &full_frame_sysex(tc, fps), 0.0);

        // Inside the liveness window: extrapolating.
        assert!(shared.is_receiving_at(149.0));
        assert_ne!(shared.current_timecode_at(149.0), tc);
        // At the threshold the reader is paused and the value freezes.
        assert!(!shared.is_receiving_at(150.0));
        assert_eq!(shared.current_timecode_at(150.0), tc);
        assert_eq!(shared.current_timecode_at(10_000.0), tc);
    }

    #[test]
    fn unsynced_reader_reports_nothing() {
        let shared = Shared::default();
        assert!(!shared.is_receiving_at(0.0));
        assert_eq!(shared.current_timecode_at(0.0), Timecode::default());
    }
}
