//! One timecode routing pipeline.
//!
//! An engine owns one of each protocol handler and routes a single ingested
//! timecode to up to four outputs, optionally rate-converted and offset per
//! output. All methods run on the UI thread; handler callbacks communicate
//! back through atomics only, so no further synchronisation is needed here.
//!
//! `tick()` is driven at ~60 Hz: it polls the active input, follows its
//! detected frame rate (subject to the LTC ambiguity override), pushes the
//! routed timecode to every enabled output and refreshes the VU meters.
//! Cadence handlers free-run between ticks, so transmission continues across
//! UI stalls.

use std::net::Ipv4Addr;

use tcroute_core::artnet::{ArtnetInput, ArtnetOutput, ARTNET_PORT};
use tcroute_core::audio::{AudioParams, DeviceId};
use tcroute_core::handlers::{channel_label, AudioThru, ChannelSelect, LtcInput, LtcOutput};
use tcroute_core::status::Status;
use tcroute_core::timecode::{convert_rate, offset, wall_clock_ms_to_tc};
use tcroute_core::types::{FrameRate, InputSource, Timecode};
use tcroute_core::{clock, net};
use tcroute_midi::{MidiPortError, MtcInput, MtcOutput};

use crate::claims::{DeviceClaims, DeviceRole};

/// Per-output offsets are bounded to one second's worth of frames.
pub const MAX_OFFSET_FRAMES: i32 = 30;

const METER_DECAY: f32 = 0.85;

#[derive(Debug, Clone, Copy, Default)]
struct Meters {
    ltc_in: f32,
    thru_in: f32,
    ltc_out: f32,
    thru_out: f32,
}

impl Meters {
    fn update(&mut self, ltc_in: f32, thru_in: f32, ltc_out: f32, thru_out: f32) {
        let decay = |current: f32, target: f32| {
            if target > current {
                target
            } else {
                current * METER_DECAY
            }
        };
        self.ltc_in = decay(self.ltc_in, ltc_in);
        self.thru_in = decay(self.thru_in, thru_in);
        self.ltc_out = decay(self.ltc_out, ltc_out);
        self.thru_out = decay(self.thru_out, thru_out);
    }
}

/// Everything a front-end needs to render one engine.
#[derive(Debug, Clone)]
pub struct EngineSnapshot {
    pub name: String,
    pub input_status: Status,
    pub mtc_out_status: Status,
    pub artnet_out_status: Status,
    pub ltc_out_status: Status,
    pub thru_status: Status,
    pub current_timecode: Timecode,
    pub output_timecode: Timecode,
    pub fps: FrameRate,
    pub output_fps: FrameRate,
    pub source_active: bool,
    /// Smoothed peaks: LTC in, thru in, LTC out, thru out.
    pub levels: [f32; 4],
}

/// Decide whether an LTC rate detection replaces the current rate, and what
/// happens to the user's ambiguity override.
///
/// While the override is set, detections that merely flip between the
/// ambiguous pair (23.976<->24, 29.97<->30) are suppressed; a detection
/// outside {24, 30} clears the override because the estimator has converged
/// on something unambiguous.
fn ltc_rate_decision(
    current: FrameRate,
    detected: FrameRate,
    overridden: bool,
) -> (Option<FrameRate>, bool) {
    let ambiguous_override = overridden
        && ((current == FrameRate::Fps2398 && detected == FrameRate::Fps24)
            || (current == FrameRate::Fps2997 && detected == FrameRate::Fps30));
    if detected == current || ambiguous_override {
        return (None, overridden);
    }
    let still_overridden = match detected {
        FrameRate::Fps24 | FrameRate::Fps30 => overridden,
        _ => false,
    };
    (Some(detected), still_overridden)
}

/// One independent routing pipeline.
pub struct Engine {
    index: usize,
    name: String,

    // Input state
    active_input: InputSource,
    fps: FrameRate,
    current_timecode: Timecode,
    source_active: bool,
    user_overrode_ltc_fps: bool,

    // Rate conversion
    fps_convert_enabled: bool,
    output_fps: FrameRate,
    output_timecode: Timecode,

    // Output state
    mtc_out_enabled: bool,
    artnet_out_enabled: bool,
    ltc_out_enabled: bool,
    thru_out_enabled: bool,
    mtc_offset: i32,
    artnet_offset: i32,
    ltc_offset: i32,

    // Protocol handlers
    mtc_input: MtcInput,
    mtc_output: MtcOutput,
    artnet_input: ArtnetInput,
    artnet_output: ArtnetOutput,
    ltc_input: LtcInput,
    ltc_output: LtcOutput,
    audio_thru: Option<AudioThru>,

    // Status
    input_status: Status,
    mtc_out_status: Status,
    artnet_out_status: Status,
    ltc_out_status: Status,
    thru_status: Status,

    meters: Meters,
    claims: DeviceClaims,
}

impl Engine {
    /// `index` 0 is the primary engine and the only one that gets an
    /// AudioThru.
    pub fn new(index: usize, claims: DeviceClaims) -> Self {
        Self {
            index,
            name: format!("ENGINE {}", index + 1),
            active_input: InputSource::SystemTime,
            fps: FrameRate::Fps30,
            current_timecode: Timecode::default(),
            source_active: true,
            user_overrode_ltc_fps: false,
            fps_convert_enabled: false,
            output_fps: FrameRate::Fps30,
            output_timecode: Timecode::default(),
            mtc_out_enabled: false,
            artnet_out_enabled: false,
            ltc_out_enabled: false,
            thru_out_enabled: false,
            mtc_offset: 0,
            artnet_offset: 0,
            ltc_offset: 0,
            mtc_input: MtcInput::new(),
            mtc_output: MtcOutput::new(),
            artnet_input: ArtnetInput::new(),
            artnet_output: ArtnetOutput::new(),
            ltc_input: LtcInput::new(),
            ltc_output: LtcOutput::new(),
            audio_thru: (index == crate::host::PRIMARY_ENGINE_INDEX).then(AudioThru::new),
            input_status: Status::SystemClock,
            mtc_out_status: Status::Idle,
            artnet_out_status: Status::Idle,
            ltc_out_status: Status::Idle,
            thru_status: Status::Idle,
            meters: Meters::default(),
            claims,
        }
    }

    // ── Identity ────────────────────────────────────────────────────────

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn is_primary(&self) -> bool {
        self.index == crate::host::PRIMARY_ENGINE_INDEX
    }

    /// Fix up the index after an engine removal. Moving away from primary
    /// tears down the AudioThru (its ring producer belongs to this engine's
    /// LTC input and stays put); becoming primary builds a fresh one with
    /// no transferred state.
    pub fn reindex(&mut self, new_index: usize) {
        if self.is_primary() && new_index != crate::host::PRIMARY_ENGINE_INDEX {
            self.stop_thru_output();
            self.audio_thru = None;
            self.thru_out_enabled = false;
        }
        self.claims.reindex(self.index, new_index);
        self.index = new_index;
        if self.is_primary() && self.audio_thru.is_none() {
            self.audio_thru = Some(AudioThru::new());
        }
    }

    // ── Input source & rate ─────────────────────────────────────────────

    pub fn active_input(&self) -> InputSource {
        self.active_input
    }

    /// Switch the input source. The previous input handler stops; starting
    /// the new one is left to the caller, which owns the device selection.
    pub fn set_input_source(&mut self, source: InputSource) {
        match self.active_input {
            InputSource::Mtc => self.stop_mtc_input(),
            InputSource::ArtNet => self.stop_artnet_input(),
            InputSource::Ltc => self.stop_ltc_input(),
            InputSource::SystemTime => {}
        }
        self.user_overrode_ltc_fps = false;
        self.active_input = source;
        self.source_active = source == InputSource::SystemTime;
        self.input_status = match source {
            InputSource::SystemTime => Status::SystemClock,
            InputSource::Mtc | InputSource::Ltc => Status::WaitingForDevice,
            InputSource::ArtNet => Status::NotListening,
        };
    }

    pub fn current_fps(&self) -> FrameRate {
        self.fps
    }

    pub fn current_timecode(&self) -> Timecode {
        self.current_timecode
    }

    pub fn output_timecode(&self) -> Timecode {
        self.output_timecode
    }

    pub fn is_source_active(&self) -> bool {
        self.source_active
    }

    pub fn user_overrode_ltc_fps(&self) -> bool {
        self.user_overrode_ltc_fps
    }

    /// Restore the override flag directly (settings load).
    pub fn set_user_overrode_ltc_fps(&mut self, overridden: bool) {
        self.user_overrode_ltc_fps = overridden;
    }

    /// A manual rate selection from the front-end. Selecting one of the
    /// LTC-ambiguous rates while slaved to LTC arms the sticky override;
    /// any unambiguous selection clears it.
    pub fn select_frame_rate(&mut self, fps: FrameRate) {
        self.user_overrode_ltc_fps = self.active_input == InputSource::Ltc && fps.is_ltc_ambiguous();
        self.set_frame_rate(fps);
    }

    fn set_frame_rate(&mut self, fps: FrameRate) {
        self.fps = fps;
        self.push_output_fps();
    }

    // ── Rate conversion ─────────────────────────────────────────────────

    pub fn is_fps_convert_enabled(&self) -> bool {
        self.fps_convert_enabled
    }

    pub fn set_fps_convert_enabled(&mut self, enabled: bool) {
        self.fps_convert_enabled = enabled;
        if !enabled {
            self.output_fps = self.fps;
        }
        self.push_output_fps();
    }

    pub fn output_fps(&self) -> FrameRate {
        self.output_fps
    }

    pub fn set_output_frame_rate(&mut self, fps: FrameRate) {
        self.output_fps = fps;
        self.push_output_fps();
    }

    pub fn effective_output_fps(&self) -> FrameRate {
        if self.fps_convert_enabled {
            self.output_fps
        } else {
            self.fps
        }
    }

    fn push_output_fps(&mut self) {
        let out_rate = self.effective_output_fps();
        self.mtc_output.set_fps(out_rate);
        self.artnet_output.set_fps(out_rate);
        self.ltc_output.set_fps(out_rate);
    }

    // ── Output enables & offsets ────────────────────────────────────────

    pub fn set_output_mtc_enabled(&mut self, enabled: bool) {
        self.mtc_out_enabled = enabled;
    }

    pub fn set_output_artnet_enabled(&mut self, enabled: bool) {
        self.artnet_out_enabled = enabled;
    }

    pub fn set_output_ltc_enabled(&mut self, enabled: bool) {
        self.ltc_out_enabled = enabled;
    }

    pub fn set_output_thru_enabled(&mut self, enabled: bool) {
        self.thru_out_enabled = enabled;
    }

    pub fn is_output_mtc_enabled(&self) -> bool {
        self.mtc_out_enabled
    }

    pub fn is_output_artnet_enabled(&self) -> bool {
        self.artnet_out_enabled
    }

    pub fn is_output_ltc_enabled(&self) -> bool {
        self.ltc_out_enabled
    }

    pub fn is_output_thru_enabled(&self) -> bool {
        self.thru_out_enabled
    }

    pub fn set_mtc_offset(&mut self, frames: i32) {
        self.mtc_offset = frames.clamp(-MAX_OFFSET_FRAMES, MAX_OFFSET_FRAMES);
    }

    pub fn set_artnet_offset(&mut self, frames: i32) {
        self.artnet_offset = frames.clamp(-MAX_OFFSET_FRAMES, MAX_OFFSET_FRAMES);
    }

    pub fn set_ltc_offset(&mut self, frames: i32) {
        self.ltc_offset = frames.clamp(-MAX_OFFSET_FRAMES, MAX_OFFSET_FRAMES);
    }

    pub fn mtc_offset(&self) -> i32 {
        self.mtc_offset
    }

    pub fn artnet_offset(&self) -> i32 {
        self.artnet_offset
    }

    pub fn ltc_offset(&self) -> i32 {
        self.ltc_offset
    }

    // ── Handler access (device queries, gains) ──────────────────────────

    pub fn mtc_input(&self) -> &MtcInput {
        &self.mtc_input
    }

    pub fn mtc_output(&self) -> &MtcOutput {
        &self.mtc_output
    }

    pub fn artnet_input(&self) -> &ArtnetInput {
        &self.artnet_input
    }

    pub fn artnet_output(&self) -> &ArtnetOutput {
        &self.artnet_output
    }

    pub fn ltc_input(&self) -> &LtcInput {
        &self.ltc_input
    }

    pub fn ltc_output(&self) -> &LtcOutput {
        &self.ltc_output
    }

    pub fn audio_thru(&self) -> Option<&AudioThru> {
        self.audio_thru.as_ref()
    }

    // ── Input start/stop ────────────────────────────────────────────────

    /// Start MTC input on the first MIDI port matching `port_match`.
    pub fn start_mtc_input(&mut self, port_match: &str) -> bool {
        self.stop_mtc_input();
        match self.mtc_input.start(port_match) {
            Ok(name) => {
                self.input_status = Status::Receiving { detail: name };
                true
            }
            Err(MidiPortError::NoPorts) => {
                self.input_status = Status::NoDevice;
                false
            }
            Err(e) => {
                log::warn!("{}: MTC input failed: {e}", self.name);
                self.input_status = Status::FailedToOpen;
                false
            }
        }
    }

    pub fn stop_mtc_input(&mut self) {
        self.mtc_input.stop();
    }

    /// Start Art-Net input, bound to `interface` (None = all interfaces).
    pub fn start_artnet_input(&mut self, interface: Option<Ipv4Addr>) -> bool {
        self.stop_artnet_input();
        match self.artnet_input.start(interface, ARTNET_PORT) {
            Ok(info) => {
                self.input_status = Status::Receiving { detail: info.to_string() };
                true
            }
            Err(e) => {
                log::warn!("{}: Art-Net input failed: {e}", self.name);
                self.input_status = Status::BindFailed;
                false
            }
        }
    }

    pub fn stop_artnet_input(&mut self) {
        self.artnet_input.stop();
    }

    /// Start LTC input. `thru_channel` additionally feeds the pass-through
    /// ring. Fails with a conflict status when another engine holds the
    /// device.
    pub fn start_ltc_input(
        &mut self,
        device: &DeviceId,
        ltc_channel: u16,
        thru_channel: Option<u16>,
        params: &AudioParams,
    ) -> bool {
        self.stop_ltc_input();

        if let Some((engine, role)) = self.claims.owner(device) {
            if engine != self.index {
                self.input_status = Status::Conflict {
                    with: format!("[ENGINE {}] {}", engine + 1, role.label()),
                };
                return false;
            }
        }

        match self.ltc_input.start(device, ltc_channel, thru_channel, params) {
            Ok(_) => {
                self.claims.claim(device, self.index, DeviceRole::LtcInput);
                self.input_status = Status::Receiving {
                    detail: format!(
                        "{} Ch {}",
                        device.display_label(),
                        self.ltc_input.ltc_channel() + 1
                    ),
                };
                true
            }
            Err(e) => {
                log::warn!("{}: LTC input failed: {e}", self.name);
                self.input_status = Status::FailedToOpen;
                false
            }
        }
    }

    /// Stop LTC input. The AudioThru consumer is stopped first so it
    /// releases its ring reference before the producer goes away.
    pub fn stop_ltc_input(&mut self) {
        self.stop_thru_output();
        self.ltc_input.stop();
        self.claims.release(self.index, DeviceRole::LtcInput);
    }

    // ── Output start/stop ───────────────────────────────────────────────

    pub fn start_mtc_output(&mut self, port_match: &str) -> bool {
        self.stop_mtc_output();
        match self.mtc_output.start(port_match) {
            Ok(name) => {
                self.mtc_output.set_fps(self.effective_output_fps());
                self.mtc_out_status = Status::Transmitting { detail: name };
                true
            }
            Err(MidiPortError::NoPorts) => {
                self.mtc_out_status = Status::NoDevice;
                false
            }
            Err(e) => {
                log::warn!("{}: MTC output failed: {e}", self.name);
                self.mtc_out_status = Status::FailedToOpen;
                false
            }
        }
    }

    pub fn stop_mtc_output(&mut self) {
        self.mtc_output.stop();
        self.mtc_out_status = Status::Idle;
    }

    pub fn start_artnet_output(&mut self, interface: Option<&net::NetInterface>) -> bool {
        self.stop_artnet_output();
        match self.artnet_output.start(interface, ARTNET_PORT) {
            Ok(dest) => {
                self.artnet_output.set_fps(self.effective_output_fps());
                self.artnet_out_status = Status::Transmitting { detail: dest.to_string() };
                true
            }
            Err(e) => {
                log::warn!("{}: Art-Net output failed: {e}", self.name);
                self.artnet_out_status = Status::BindFailed;
                false
            }
        }
    }

    pub fn stop_artnet_output(&mut self) {
        self.artnet_output.stop();
        self.artnet_out_status = Status::Idle;
    }

    /// Start LTC output. A same-engine AudioThru holding the device is
    /// stopped and marked conflicted (the new owner takes the device); a
    /// claim by any other engine fails this start instead.
    pub fn start_ltc_output(
        &mut self,
        device: &DeviceId,
        channel: ChannelSelect,
        params: &AudioParams,
    ) -> bool {
        self.stop_ltc_output();

        if let Some((engine, role)) = self.claims.owner(device) {
            if engine == self.index && role == DeviceRole::AudioThru {
                self.stop_thru_output();
                self.thru_status = Status::Conflict { with: "LTC OUT".to_string() };
            } else if engine != self.index {
                self.ltc_out_status = Status::Conflict {
                    with: format!("[ENGINE {}] {}", engine + 1, role.label()),
                };
                return false;
            }
        }

        match self.ltc_output.start(device, channel, params) {
            Ok(_) => {
                self.ltc_output.set_fps(self.effective_output_fps());
                self.claims.claim(device, self.index, DeviceRole::LtcOutput);
                self.ltc_out_status = Status::Transmitting {
                    detail: format!(
                        "{} {}",
                        device.display_label(),
                        channel_label(self.ltc_output.channel())
                    ),
                };
                true
            }
            Err(e) => {
                log::warn!("{}: LTC output failed: {e}", self.name);
                self.ltc_out_status = Status::FailedToOpen;
                false
            }
        }
    }

    pub fn stop_ltc_output(&mut self) {
        self.ltc_output.stop();
        self.claims.release(self.index, DeviceRole::LtcOutput);
        self.ltc_out_status = Status::Idle;
    }

    /// Start the audio pass-through. Requires the primary engine, a running
    /// LTC input with a tap channel, and an unclaimed device (a same-engine
    /// LTC output is displaced per the takeover policy).
    pub fn start_thru_output(
        &mut self,
        device: &DeviceId,
        channel: ChannelSelect,
        params: &AudioParams,
    ) -> bool {
        self.stop_thru_output();
        if self.audio_thru.is_none() {
            // Not the primary engine.
            return false;
        }
        if !self.ltc_input.is_running() || !self.ltc_input.has_thru_channel() {
            self.thru_status = Status::WaitingForLtcInput;
            return false;
        }

        if let Some((engine, role)) = self.claims.owner(device) {
            if engine == self.index && role == DeviceRole::LtcOutput {
                self.stop_ltc_output();
                self.ltc_out_status = Status::Conflict { with: "AUDIO THRU".to_string() };
            } else if engine != self.index {
                self.thru_status = Status::Conflict {
                    with: format!("[ENGINE {}] {}", engine + 1, role.label()),
                };
                return false;
            }
        }

        let ring = self.ltc_input.ring();
        ring.reset_counters();
        ring.sync_read_to_write();

        let input_rate = self.ltc_input.stream_info().map(|i| i.sample_rate);
        let Some(thru) = self.audio_thru.as_mut() else {
            return false;
        };
        match thru.start(device, channel, ring, params) {
            Ok(info) => {
                self.claims.claim(device, self.index, DeviceRole::AudioThru);
                let mut detail = format!(
                    "{} {}",
                    device.display_label(),
                    channel_label(thru.channel())
                );
                if let Some(in_rate) = input_rate {
                    if in_rate != info.sample_rate {
                        detail.push_str(&format!(" [RATE MISMATCH: {in_rate}/{}]", info.sample_rate));
                    }
                }
                self.thru_status = Status::PassingThrough { detail };
                true
            }
            Err(e) => {
                log::warn!("{}: audio thru failed: {e}", self.name);
                self.thru_status = Status::FailedToOpen;
                false
            }
        }
    }

    pub fn stop_thru_output(&mut self) {
        if let Some(thru) = self.audio_thru.as_mut() {
            thru.stop();
        }
        self.claims.release(self.index, DeviceRole::AudioThru);
        self.thru_status = Status::Idle;
    }

    // ── Tick ────────────────────────────────────────────────────────────

    /// Poll the active input, follow its rate, route to outputs, refresh
    /// meters. Called from the UI thread at ~60 Hz on every engine.
    pub fn tick(&mut self) {
        match self.active_input {
            InputSource::SystemTime => {
                self.current_timecode = wall_clock_ms_to_tc(clock::ms_since_midnight(), self.fps);
                self.source_active = true;
                self.input_status = Status::SystemClock;
            }

            InputSource::Mtc => {
                if self.mtc_input.is_running() {
                    self.current_timecode = self.mtc_input.current_timecode();
                    let receiving = self.mtc_input.is_receiving();
                    let detail = self.mtc_input.port_name().unwrap_or_default().to_string();
                    if receiving {
                        let detected = self.mtc_input.detected_fps();
                        if detected != self.fps {
                            self.set_frame_rate(detected);
                        }
                        self.input_status = Status::Receiving { detail };
                    } else {
                        self.input_status = Status::Paused { detail };
                    }
                    self.source_active = receiving;
                } else {
                    self.source_active = false;
                    self.input_status = Status::WaitingForDevice;
                }
            }

            InputSource::ArtNet => {
                if self.artnet_input.is_running() {
                    self.current_timecode = self.artnet_input.current_timecode();
                    let receiving = self.artnet_input.is_receiving();
                    let detail = self
                        .artnet_input
                        .bind_info()
                        .map(|i| i.to_string())
                        .unwrap_or_default();
                    if receiving {
                        let detected = self.artnet_input.detected_fps();
                        if detected != self.fps {
                            self.set_frame_rate(detected);
                        }
                        self.input_status = Status::Receiving { detail };
                    } else {
                        self.input_status = Status::Paused { detail };
                    }
                    self.source_active = receiving;
                } else {
                    self.source_active = false;
                    self.input_status = Status::NotListening;
                }
            }

            InputSource::Ltc => {
                if self.ltc_input.is_running() {
                    self.current_timecode = self.ltc_input.current_timecode();
                    let receiving = self.ltc_input.is_receiving();
                    let detail = format!(
                        "{} Ch {}",
                        self.ltc_input
                            .device()
                            .map(|d| d.display_label())
                            .unwrap_or_default(),
                        self.ltc_input.ltc_channel() + 1
                    );
                    if receiving {
                        let detected = self.ltc_input.detected_fps();
                        let (new_rate, still_overridden) =
                            ltc_rate_decision(self.fps, detected, self.user_overrode_ltc_fps);
                        self.user_overrode_ltc_fps = still_overridden;
                        if let Some(rate) = new_rate {
                            self.set_frame_rate(rate);
                        }
                        self.input_status = Status::Receiving { detail };
                    } else {
                        self.input_status = Status::Paused { detail };
                    }
                    self.source_active = receiving;
                } else {
                    self.source_active = false;
                    self.input_status = Status::WaitingForDevice;
                }
            }
        }

        self.route_to_outputs();
        self.update_meters();
    }

    fn route_to_outputs(&mut self) {
        let out_rate = self.effective_output_fps();
        let base = if self.fps_convert_enabled {
            convert_rate(self.current_timecode, self.fps, out_rate)
        } else {
            self.current_timecode
        };
        self.output_timecode = base;

        if self.source_active {
            if self.mtc_out_enabled && self.mtc_output.is_running() {
                self.mtc_output
                    .set_timecode(offset(base, self.mtc_offset, out_rate));
                self.mtc_output.set_paused(false);
            }
            if self.artnet_out_enabled && self.artnet_output.is_running() {
                self.artnet_output
                    .set_timecode(offset(base, self.artnet_offset, out_rate));
                self.artnet_output.set_paused(false);
            }
            if self.ltc_out_enabled && self.ltc_output.is_running() {
                self.ltc_output
                    .set_timecode(offset(base, self.ltc_offset, out_rate));
                self.ltc_output.set_paused(false);
            }
        } else {
            if self.mtc_out_enabled && self.mtc_output.is_running() {
                self.mtc_output.set_paused(true);
            }
            if self.artnet_out_enabled && self.artnet_output.is_running() {
                self.artnet_output.set_paused(true);
            }
            if self.ltc_out_enabled && self.ltc_output.is_running() {
                self.ltc_output.set_paused(true);
            }
        }
    }

    fn update_meters(&mut self) {
        let ltc_in = if self.ltc_input.is_running() {
            self.ltc_input.ltc_peak()
        } else {
            0.0
        };
        let thru_in = if self.ltc_input.is_running() {
            self.ltc_input.thru_peak()
        } else {
            0.0
        };
        let ltc_out = if self.ltc_output.is_running() && !self.ltc_output.is_paused() {
            self.ltc_output.peak_level()
        } else {
            0.0
        };
        let thru_out = self
            .audio_thru
            .as_ref()
            .filter(|t| t.is_running())
            .map(|t| t.peak_level())
            .unwrap_or(0.0);
        self.meters.update(ltc_in, thru_in, ltc_out, thru_out);
    }

    // ── Status snapshot ─────────────────────────────────────────────────

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            name: self.name.clone(),
            input_status: self.input_status.clone(),
            mtc_out_status: self.mtc_out_status.clone(),
            artnet_out_status: self.artnet_out_status.clone(),
            ltc_out_status: self.ltc_out_status.clone(),
            thru_status: self.thru_status.clone(),
            current_timecode: self.current_timecode,
            output_timecode: self.output_timecode,
            fps: self.fps,
            output_fps: self.effective_output_fps(),
            source_active: self.source_active,
            levels: [
                self.meters.ltc_in,
                self.meters.thru_in,
                self.meters.ltc_out,
                self.meters.thru_out,
            ],
        }
    }

    pub fn is_input_started(&self) -> bool {
        match self.active_input {
            InputSource::SystemTime => true,
            InputSource::Mtc => self.mtc_input.is_running(),
            InputSource::ArtNet => self.artnet_input.is_running(),
            InputSource::Ltc => self.ltc_input.is_running(),
        }
    }
}

impl Drop for Engine {
    /// Shutdown order is mandatory: outputs before inputs, AudioThru before
    /// the LTC input that owns the ring producer.
    fn drop(&mut self) {
        self.stop_mtc_output();
        self.stop_artnet_output();
        self.stop_ltc_output();
        self.stop_thru_output();
        self.stop_mtc_input();
        self.stop_artnet_input();
        self.stop_ltc_input();
        self.claims.release_engine(self.index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> Engine {
        Engine::new(0, DeviceClaims::new())
    }

    #[test]
    fn system_time_tick_is_always_active() {
        let mut e = engine();
        e.tick();
        assert!(e.is_source_active());
        assert_eq!(e.snapshot().input_status, Status::SystemClock);
        assert!(e.current_timecode().is_valid(FrameRate::Fps30));
    }

    #[test]
    fn rate_conversion_relabels_output() {
        let mut e = engine();
        e.select_frame_rate(FrameRate::Fps30);
        e.set_fps_convert_enabled(true);
        e.set_output_frame_rate(FrameRate::Fps25);
        e.tick();
        let snap = e.snapshot();
        assert_eq!(snap.output_fps, FrameRate::Fps25);
        assert_eq!(
            snap.output_timecode,
            convert_rate(snap.current_timecode, FrameRate::Fps30, FrameRate::Fps25)
        );
        assert!(snap.output_timecode.is_valid(FrameRate::Fps25));

        e.set_fps_convert_enabled(false);
        e.tick();
        let snap = e.snapshot();
        assert_eq!(snap.output_timecode, snap.current_timecode);
    }

    #[test]
    fn offsets_clamp_to_one_second() {
        let mut e = engine();
        e.set_mtc_offset(99);
        e.set_ltc_offset(-99);
        assert_eq!(e.mtc_offset(), 30);
        assert_eq!(e.ltc_offset(), -30);
    }

    #[test]
    fn ambiguous_selection_arms_override_only_on_ltc() {
        let mut e = engine();
        e.select_frame_rate(FrameRate::Fps2997);
        assert!(!e.user_overrode_ltc_fps(), "not slaved to LTC yet");

        e.set_input_source(InputSource::Ltc);
        e.select_frame_rate(FrameRate::Fps2997);
        assert!(e.user_overrode_ltc_fps());
        e.select_frame_rate(FrameRate::Fps2398);
        assert!(e.user_overrode_ltc_fps());

        // Any unambiguous selection clears it.
        e.select_frame_rate(FrameRate::Fps25);
        assert!(!e.user_overrode_ltc_fps());
    }

    #[test]
    fn switching_sources_clears_override() {
        let mut e = engine();
        e.set_input_source(InputSource::Ltc);
        e.select_frame_rate(FrameRate::Fps2398);
        assert!(e.user_overrode_ltc_fps());
        e.set_input_source(InputSource::SystemTime);
        assert!(!e.user_overrode_ltc_fps());
    }

    #[test]
    fn ltc_rate_decision_table() {
        use FrameRate::*;
        // No override: detection always wins.
        assert_eq!(ltc_rate_decision(Fps25, Fps30, false), (Some(Fps30), false));
        assert_eq!(ltc_rate_decision(Fps30, Fps30, false), (None, false));
        // Override suppresses the ambiguous flips only.
        assert_eq!(ltc_rate_decision(Fps2398, Fps24, true), (None, true));
        assert_eq!(ltc_rate_decision(Fps2997, Fps30, true), (None, true));
        // A detection outside {24, 30} converges and clears the override.
        assert_eq!(ltc_rate_decision(Fps2997, Fps25, true), (Some(Fps25), false));
        assert_eq!(
            ltc_rate_decision(Fps2398, Fps2997, true),
            (Some(Fps2997), false)
        );
        // Override does not protect a non-paired rate.
        assert_eq!(ltc_rate_decision(Fps2398, Fps30, true), (Some(Fps30), true));
    }

    #[test]
    fn non_primary_engine_has_no_thru() {
        let claims = DeviceClaims::new();
        let mut secondary = Engine::new(1, claims);
        assert!(secondary.audio_thru().is_none());
        assert!(!secondary.start_thru_output(
            &DeviceId::new("any"),
            None,
            &AudioParams::default()
        ));
    }

    #[test]
    fn thru_requires_running_ltc_input() {
        let mut e = engine();
        assert!(!e.start_thru_output(&DeviceId::new("out"), None, &AudioParams::default()));
        assert_eq!(e.snapshot().thru_status, Status::WaitingForLtcInput);
    }

    #[test]
    fn cross_engine_device_claim_blocks_start() {
        let claims = DeviceClaims::new();
        let device = DeviceId::new("shared-interface");
        claims.claim(&device, 0, DeviceRole::AudioThru);

        let mut other = Engine::new(1, claims);
        assert!(!other.start_ltc_output(&device, Some(0), &AudioParams::default()));
        assert_eq!(
            other.snapshot().ltc_out_status,
            Status::Conflict { with: "[ENGINE 1] AUDIO THRU".to_string() }
        );
        // The claim was not taken over.
        assert_eq!(other.claims.owner(&device), Some((0, DeviceRole::AudioThru)));
    }

    #[test]
    fn same_engine_takeover_displaces_thru() {
        let claims = DeviceClaims::new();
        let device = DeviceId::new("duplex-io");
        claims.claim(&device, 0, DeviceRole::AudioThru);

        let mut e = Engine::new(0, claims.clone());
        // The LTC output takes the device: the thru claim is released and
        // marked conflicted even though the open itself fails (no such
        // hardware in the test environment).
        assert!(!e.start_ltc_output(&device, Some(0), &AudioParams::default()));
        assert_eq!(
            e.snapshot().thru_status,
            Status::Conflict { with: "LTC OUT".to_string() }
        );
        assert_eq!(claims.owner(&device), None);
    }

    #[test]
    fn inactive_source_pauses_enabled_outputs() {
        let mut e = engine();
        e.set_output_artnet_enabled(true);
        if !e.start_artnet_output(None) {
            println!("skipping: no UDP sender available");
            return;
        }

        // A selected-but-not-started MTC input is an inactive source.
        e.set_input_source(InputSource::Mtc);
        e.tick();
        assert!(!e.is_source_active());
        assert!(e.artnet_output().is_paused());
        assert_eq!(e.snapshot().input_status, Status::WaitingForDevice);

        // Back on the system clock the output resumes.
        e.set_input_source(InputSource::SystemTime);
        e.tick();
        assert!(e.is_source_active());
        assert!(!e.artnet_output().is_paused());
    }

    #[test]
    fn reindex_moves_audio_thru_to_new_primary() {
        let claims = DeviceClaims::new();
        let mut a = Engine::new(0, claims.clone());
        let mut b = Engine::new(1, claims);
        assert!(a.audio_thru().is_some());
        assert!(b.audio_thru().is_none());

        // Engine 0 removed: engine 1 becomes primary.
        b.reindex(0);
        assert!(b.audio_thru().is_some());
        assert!(b.is_primary());

        // And a primary moving away loses its thru.
        a.reindex(1);
        assert!(a.audio_thru().is_none());
    }
}
