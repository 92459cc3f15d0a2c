//! Fundamental timecode types shared by every handler.
//!
//! `Timecode` packs into a single `u32` (one byte per field) so handlers can
//! publish it across threads with a plain relaxed atomic store; `FrameRate`
//! round-trips through a small index for the same reason.

use serde::{Deserialize, Serialize};

/// One SMPTE timecode value. Field ranges: hours 0-23, minutes 0-59,
/// seconds 0-59, frames 0..frame modulus of the rate in use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timecode {
    pub hours: u8,
    pub minutes: u8,
    pub seconds: u8,
    pub frames: u8,
}

impl Timecode {
    pub fn new(hours: u8, minutes: u8, seconds: u8, frames: u8) -> Self {
        Self { hours, minutes, seconds, frames }
    }

    /// Pack into a `u32` as `[hours, minutes, seconds, frames]` bytes for
    /// atomic publication.
    #[inline]
    pub fn pack(self) -> u32 {
        u32::from_be_bytes([self.hours, self.minutes, self.seconds, self.frames])
    }

    /// Inverse of [`pack`](Self::pack).
    #[inline]
    pub fn unpack(packed: u32) -> Self {
        let [hours, minutes, seconds, frames] = packed.to_be_bytes();
        Self { hours, minutes, seconds, frames }
    }

    /// Whether every field is inside its range for the given rate, including
    /// the drop-frame skip classes (frames 0 and 1 do not exist at the start
    /// of a non-10th minute).
    pub fn is_valid(self, fps: FrameRate) -> bool {
        if self.hours > 23 || self.minutes > 59 || self.seconds > 59 {
            return false;
        }
        if u32::from(self.frames) >= fps.frame_modulus() {
            return false;
        }
        if fps.is_drop_frame() && self.frames < 2 && self.seconds == 0 && self.minutes % 10 != 0 {
            return false;
        }
        true
    }
}

impl std::fmt::Display for Timecode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}.{:02}",
            self.hours, self.minutes, self.seconds, self.frames
        )
    }
}

/// The five supported frame rates. 29.97 is the only drop-frame rate; the
/// fractional rates run at `24000/1001` and `30000/1001` frames per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameRate {
    Fps2398,
    Fps24,
    Fps25,
    Fps2997,
    Fps30,
}

impl FrameRate {
    /// All rates in UI/settings index order.
    pub const ALL: [FrameRate; 5] = [
        FrameRate::Fps2398,
        FrameRate::Fps24,
        FrameRate::Fps25,
        FrameRate::Fps2997,
        FrameRate::Fps30,
    ];

    /// Exact numeric rate in frames per second.
    pub fn as_f64(self) -> f64 {
        match self {
            FrameRate::Fps2398 => 24000.0 / 1001.0,
            FrameRate::Fps24 => 24.0,
            FrameRate::Fps25 => 25.0,
            FrameRate::Fps2997 => 30000.0 / 1001.0,
            FrameRate::Fps30 => 30.0,
        }
    }

    /// The rate as an exact `numerator / denominator` pair.
    pub fn as_ratio(self) -> (u64, u64) {
        match self {
            FrameRate::Fps2398 => (24000, 1001),
            FrameRate::Fps24 => (24, 1),
            FrameRate::Fps25 => (25, 1),
            FrameRate::Fps2997 => (30000, 1001),
            FrameRate::Fps30 => (30, 1),
        }
    }

    /// Number of valid frame labels per second (0..modulus).
    pub fn frame_modulus(self) -> u32 {
        match self {
            FrameRate::Fps2398 | FrameRate::Fps24 => 24,
            FrameRate::Fps25 => 25,
            FrameRate::Fps2997 | FrameRate::Fps30 => 30,
        }
    }

    /// 29.97 is the only drop-frame rate.
    pub fn is_drop_frame(self) -> bool {
        matches!(self, FrameRate::Fps2997)
    }

    /// The 2-bit rate code shared by LTC, MTC and Art-Net:
    /// 0 = 24, 1 = 25, 2 = 29.97 DF, 3 = 30. 23.976 is emitted as code 0
    /// (indistinguishable from 24 on every wire).
    pub fn rate_code(self) -> u8 {
        match self {
            FrameRate::Fps2398 | FrameRate::Fps24 => 0,
            FrameRate::Fps25 => 1,
            FrameRate::Fps2997 => 2,
            FrameRate::Fps30 => 3,
        }
    }

    /// Inverse of [`rate_code`](Self::rate_code).
    pub fn from_rate_code(code: u8) -> FrameRate {
        match code & 0x03 {
            0 => FrameRate::Fps24,
            1 => FrameRate::Fps25,
            2 => FrameRate::Fps2997,
            _ => FrameRate::Fps30,
        }
    }

    /// Settings/UI index (0 = 23.976 .. 4 = 30).
    pub fn to_index(self) -> u8 {
        match self {
            FrameRate::Fps2398 => 0,
            FrameRate::Fps24 => 1,
            FrameRate::Fps25 => 2,
            FrameRate::Fps2997 => 3,
            FrameRate::Fps30 => 4,
        }
    }

    /// Inverse of [`to_index`](Self::to_index); out-of-range clamps to 30.
    pub fn from_index(index: u8) -> FrameRate {
        *FrameRate::ALL.get(index as usize).unwrap_or(&FrameRate::Fps30)
    }

    /// The rates a user may select that the LTC detector cannot tell apart
    /// from its detected counterpart (23.976 vs 24, 29.97 vs 30).
    pub fn is_ltc_ambiguous(self) -> bool {
        matches!(self, FrameRate::Fps2398 | FrameRate::Fps2997)
    }

    /// The detected rate an ambiguous user selection shadows.
    pub fn ltc_ambiguous_pair(self) -> Option<FrameRate> {
        match self {
            FrameRate::Fps2398 => Some(FrameRate::Fps24),
            FrameRate::Fps2997 => Some(FrameRate::Fps30),
            _ => None,
        }
    }
}

impl Default for FrameRate {
    fn default() -> Self {
        FrameRate::Fps30
    }
}

impl std::fmt::Display for FrameRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FrameRate::Fps2398 => "23.976",
            FrameRate::Fps24 => "24",
            FrameRate::Fps25 => "25",
            FrameRate::Fps2997 => "29.97",
            FrameRate::Fps30 => "30",
        };
        f.write_str(s)
    }
}

/// Which source an engine is currently slaved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InputSource {
    Mtc,
    ArtNet,
    #[default]
    SystemTime,
    Ltc,
}

impl InputSource {
    /// Settings-document string form.
    pub fn as_str(self) -> &'static str {
        match self {
            InputSource::Mtc => "MTC",
            InputSource::ArtNet => "ArtNet",
            InputSource::SystemTime => "SystemTime",
            InputSource::Ltc => "LTC",
        }
    }

    /// Parse the settings-document string form; unknown values fall back to
    /// the system clock.
    pub fn from_str_lossy(s: &str) -> InputSource {
        match s {
            "MTC" => InputSource::Mtc,
            "ArtNet" => InputSource::ArtNet,
            "LTC" => InputSource::Ltc,
            _ => InputSource::SystemTime,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_unpack_roundtrip() {
        let tc = Timecode::new(23, 59, 58, 29);
        assert_eq!(Timecode::unpack(tc.pack()), tc);
        assert_eq!(Timecode::unpack(0), Timecode::default());
    }

    #[test]
    fn frame_modulus_per_rate() {
        assert_eq!(FrameRate::Fps2398.frame_modulus(), 24);
        assert_eq!(FrameRate::Fps24.frame_modulus(), 24);
        assert_eq!(FrameRate::Fps25.frame_modulus(), 25);
        assert_eq!(FrameRate::Fps2997.frame_modulus(), 30);
        assert_eq!(FrameRate::Fps30.frame_modulus(), 30);
    }

    #[test]
    fn drop_frame_labels_are_invalid() {
        // 00:01:00.00 and .01 do not exist at 29.97 DF
        assert!(!Timecode::new(0, 1, 0, 0).is_valid(FrameRate::Fps2997));
        assert!(!Timecode::new(0, 1, 0, 1).is_valid(FrameRate::Fps2997));
        assert!(Timecode::new(0, 1, 0, 2).is_valid(FrameRate::Fps2997));
        // Every 10th minute keeps all labels
        assert!(Timecode::new(0, 10, 0, 0).is_valid(FrameRate::Fps2997));
        // Non-drop 30 keeps them too
        assert!(Timecode::new(0, 1, 0, 0).is_valid(FrameRate::Fps30));
    }

    #[test]
    fn rate_code_roundtrip() {
        for fps in [FrameRate::Fps24, FrameRate::Fps25, FrameRate::Fps2997, FrameRate::Fps30] {
            assert_eq!(FrameRate::from_rate_code(fps.rate_code()), fps);
        }
        // 23.976 collapses onto 24 on the wire
        assert_eq!(FrameRate::from_rate_code(FrameRate::Fps2398.rate_code()), FrameRate::Fps24);
    }

    #[test]
    fn input_source_string_roundtrip() {
        for src in [InputSource::Mtc, InputSource::ArtNet, InputSource::SystemTime, InputSource::Ltc] {
            assert_eq!(InputSource::from_str_lossy(src.as_str()), src);
        }
        assert_eq!(InputSource::from_str_lossy("garbage"), InputSource::SystemTime);
    }
}
