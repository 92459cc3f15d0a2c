//! Biphase-mark LTC encoder.
//!
//! Renders an 80-bit frame per video frame as a square wave: a level
//! transition at every bit-cell boundary, plus a mid-cell transition for `1`
//! bits. The encoder owns the timecode it is currently emitting and advances
//! it itself on every frame boundary, snapping to the externally supplied
//! target only when the two drift more than one frame apart on the 24-hour
//! wheel. That keeps the signal continuous across UI stalls and brief source
//! pauses.

use crate::ltc::frame::{self, FRAME_BITS};
use crate::timecode::{increment_frame, wheel_distance};
use crate::types::{FrameRate, Timecode};

const BASE_AMPLITUDE: f32 = 0.8;

pub struct LtcEncoder {
    sample_rate: f64,
    fps: FrameRate,

    current: Option<Timecode>,
    bits: u128,
    bit_index: u32,
    half_cell: u8,
    sample_pos_in_half_bit: f64,
    samples_per_half_bit: f64,
    level: f32,
    need_new_frame: bool,
}

impl LtcEncoder {
    pub fn new(sample_rate: f64, fps: FrameRate) -> Self {
        let mut encoder = Self {
            sample_rate,
            fps,
            current: None,
            bits: 0,
            bit_index: 0,
            half_cell: 0,
            sample_pos_in_half_bit: 0.0,
            samples_per_half_bit: 0.0,
            level: 1.0,
            need_new_frame: true,
        };
        encoder.update_samples_per_half_bit();
        encoder
    }

    pub fn set_fps(&mut self, fps: FrameRate) {
        self.fps = fps;
    }

    /// The timecode of the frame currently on the wire, if any.
    pub fn current_timecode(&self) -> Option<Timecode> {
        self.current
    }

    fn update_samples_per_half_bit(&mut self) {
        self.samples_per_half_bit =
            self.sample_rate / (self.fps.as_f64() * f64::from(FRAME_BITS) * 2.0);
    }

    fn load_frame(&mut self, target: Option<Timecode>) {
        // The half-bit length tracks the rate in force when the frame loads,
        // never mid-frame.
        self.update_samples_per_half_bit();

        let next = match (self.current, target) {
            (None, Some(t)) => t,
            (None, None) => return,
            (Some(c), target) => {
                let advanced = increment_frame(c, self.fps);
                match target {
                    Some(t) if wheel_distance(advanced, t, self.fps) > 1 => t,
                    _ => advanced,
                }
            }
        };
        self.current = Some(next);
        self.bits = frame::pack(next, self.fps.is_drop_frame());
        self.bit_index = 0;
        self.half_cell = 0;
        self.sample_pos_in_half_bit = 0.0;
        self.need_new_frame = false;
        // No extra level inversion here: the 1->0 half-cell transition of
        // the previous frame's last bit already produced the boundary edge.
    }

    /// Render into `out`, returning the peak magnitude written. `target` is
    /// the most recent externally supplied timecode (None once set keeps the
    /// encoder free-running). Emits silence until the first target arrives.
    pub fn fill(&mut self, out: &mut [f32], target: Option<Timecode>, gain: f32) -> f32 {
        let amplitude = BASE_AMPLITUDE * gain.clamp(0.0, 2.0);
        let mut peak = 0.0f32;

        for slot in out.iter_mut() {
            if self.need_new_frame {
                self.load_frame(target);
                if self.need_new_frame {
                    // Still no timecode to emit.
                    *slot = 0.0;
                    continue;
                }
            }

            let sample = self.level * amplitude;
            *slot = sample;
            if sample.abs() > peak {
                peak = sample.abs();
            }

            self.sample_pos_in_half_bit += 1.0;
            if self.sample_pos_in_half_bit >= self.samples_per_half_bit {
                self.sample_pos_in_half_bit -= self.samples_per_half_bit;

                if self.half_cell == 0 {
                    self.half_cell = 1;
                    if (self.bits >> self.bit_index) & 1 == 1 {
                        self.level = -self.level;
                    }
                } else {
                    self.half_cell = 0;
                    self.bit_index += 1;
                    // The cell-boundary transition is mandatory for every
                    // bit, including the last one of the frame.
                    self.level = -self.level;
                    if self.bit_index >= FRAME_BITS {
                        self.need_new_frame = true;
                    }
                }
            }
        }
        peak
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: f64 = 48_000.0;

    /// Recover the bit string of one frame from the rendered samples by
    /// counting samples between level transitions.
    fn transitions(samples: &[f32]) -> Vec<usize> {
        let mut edges = Vec::new();
        let mut last_sign = samples[0] > 0.0;
        let mut run = 0usize;
        for &s in samples {
            let sign = s > 0.0;
            if sign != last_sign {
                edges.push(run);
                run = 0;
                last_sign = sign;
            }
            run += 1;
        }
        edges
    }

    #[test]
    fn silent_until_first_target() {
        let mut encoder = LtcEncoder::new(SAMPLE_RATE, FrameRate::Fps25);
        let mut buf = [1.0f32; 256];
        let peak = encoder.fill(&mut buf, None, 1.0);
        assert_eq!(peak, 0.0);
        assert!(buf.iter().all(|&s| s == 0.0));
        assert_eq!(encoder.current_timecode(), None);
    }

    #[test]
    fn amplitude_follows_clamped_gain() {
        let mut encoder = LtcEncoder::new(SAMPLE_RATE, FrameRate::Fps30);
        let mut buf = [0.0f32; 1600];
        let peak = encoder.fill(&mut buf, Some(Timecode::default()), 1.0);
        assert!((peak - 0.8).abs() < 1e-6);

        // Gain is clamped to 0..=2.
        let peak = encoder.fill(&mut buf, None, 5.0);
        assert!((peak - 1.6).abs() < 1e-6);
        let peak = encoder.fill(&mut buf, None, -1.0);
        assert_eq!(peak, 0.0);
    }

    #[test]
    fn every_bit_cell_has_a_boundary_transition() {
        // At 48 kHz / 30 fps each half-bit is exactly 10 samples, so the
        // transition runs must all be 10 or 20 samples long: 10-10 for a
        // `1` cell, 20 for a `0` cell. Anything else would be a biphase
        // violation.
        let mut encoder = LtcEncoder::new(SAMPLE_RATE, FrameRate::Fps30);
        let mut buf = vec![0.0f32; 1600 * 3];
        encoder.fill(&mut buf, Some(Timecode::new(1, 2, 3, 4)), 1.0);

        for run in transitions(&buf).iter().skip(1) {
            assert!(*run == 10 || *run == 20, "run of {run} samples");
        }
    }

    #[test]
    fn no_double_inversion_at_frame_boundary() {
        // A double inversion at the frame seam would show up as a run of 30
        // or 40 samples (two merged cells); the invariant above over several
        // frame boundaries rules it out. Three frames have two seams.
        let mut encoder = LtcEncoder::new(SAMPLE_RATE, FrameRate::Fps30);
        let mut buf = vec![0.0f32; 1600 * 3];
        encoder.fill(&mut buf, Some(Timecode::new(0, 0, 0, 0)), 1.0);
        let runs = transitions(&buf);
        assert!(runs.iter().skip(1).all(|&r| r <= 20), "merged cell at a seam");
    }

    #[test]
    fn auto_increment_advances_without_target_updates() {
        let mut encoder = LtcEncoder::new(SAMPLE_RATE, FrameRate::Fps30);
        let mut buf = vec![0.0f32; 1600];
        encoder.fill(&mut buf, Some(Timecode::new(2, 0, 0, 0)), 1.0);
        assert_eq!(encoder.current_timecode(), Some(Timecode::new(2, 0, 0, 0)));
        encoder.fill(&mut buf, None, 1.0);
        assert_eq!(encoder.current_timecode(), Some(Timecode::new(2, 0, 0, 1)));
        encoder.fill(&mut buf, None, 1.0);
        assert_eq!(encoder.current_timecode(), Some(Timecode::new(2, 0, 0, 2)));
    }

    #[test]
    fn target_within_one_frame_does_not_snap() {
        let mut encoder = LtcEncoder::new(SAMPLE_RATE, FrameRate::Fps30);
        let mut buf = vec![0.0f32; 1600];
        encoder.fill(&mut buf, Some(Timecode::new(0, 0, 10, 0)), 1.0);
        // Target one frame behind the auto-incremented position: free-run.
        encoder.fill(&mut buf, Some(Timecode::new(0, 0, 10, 0)), 1.0);
        assert_eq!(encoder.current_timecode(), Some(Timecode::new(0, 0, 10, 1)));
    }

    #[test]
    fn distant_target_snaps() {
        let mut encoder = LtcEncoder::new(SAMPLE_RATE, FrameRate::Fps30);
        let mut buf = vec![0.0f32; 1600];
        encoder.fill(&mut buf, Some(Timecode::new(0, 0, 10, 0)), 1.0);
        encoder.fill(&mut buf, Some(Timecode::new(5, 0, 0, 0)), 1.0);
        assert_eq!(encoder.current_timecode(), Some(Timecode::new(5, 0, 0, 0)));
    }

    #[test]
    fn drop_frame_flag_and_increment_at_2997() {
        let mut encoder = LtcEncoder::new(SAMPLE_RATE, FrameRate::Fps2997);
        let frame_len = (SAMPLE_RATE / FrameRate::Fps2997.as_f64()).round() as usize;
        let mut buf = vec![0.0f32; frame_len];
        encoder.fill(&mut buf, Some(Timecode::new(0, 0, 59, 29)), 1.0);
        encoder.fill(&mut buf, None, 1.0);
        // The minute boundary skips labels 0 and 1.
        assert_eq!(encoder.current_timecode(), Some(Timecode::new(0, 1, 0, 2)));
    }
}
