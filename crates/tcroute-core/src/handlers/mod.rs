//! Audio-device protocol handlers.
//!
//! Each handler owns its CPAL stream and publishes state to the engine
//! through atomics only. Lifecycle is uniform: `start(...)` is idempotent
//! (it stops any previous instance first), `stop()` is synchronous, and
//! nothing here panics across the engine boundary.

mod audio_thru;
mod ltc_input;
mod ltc_output;

pub use audio_thru::AudioThru;
pub use ltc_input::LtcInput;
pub use ltc_output::LtcOutput;

/// Output channel selection: a specific channel, or `None` for the
/// "Ch 1 + Ch 2" stereo mode that duplicates the signal on both.
pub type ChannelSelect = Option<u16>;

/// Display form of a channel selection ("Ch 3" or "Ch 1 + Ch 2").
pub fn channel_label(channel: ChannelSelect) -> String {
    match channel {
        Some(ch) => format!("Ch {}", ch + 1),
        None => "Ch 1 + Ch 2".to_string(),
    }
}

/// Clamp capture channel picks to what the device offers: an out-of-range
/// LTC channel falls back to channel 0, an out-of-range tap is disabled.
fn resolve_capture_channels(ltc: u16, thru: Option<u16>, available: u16) -> (u16, Option<u16>) {
    let ltc = if ltc >= available { 0 } else { ltc };
    let thru = thru.filter(|&ch| ch < available);
    (ltc, thru)
}

/// Clamp a playback channel pick: out-of-range selections and stereo mode
/// on a mono device both fall back to channel 0.
fn resolve_playback_channel(channel: ChannelSelect, available: u16) -> ChannelSelect {
    match channel {
        Some(ch) if ch >= available => Some(0),
        None if available < 2 => Some(0),
        other => other,
    }
}

#[cfg(test)]
mod resolve_tests {
    use super::*;

    #[test]
    fn capture_fallbacks() {
        assert_eq!(resolve_capture_channels(1, Some(0), 2), (1, Some(0)));
        assert_eq!(resolve_capture_channels(5, Some(3), 2), (0, None));
        assert_eq!(resolve_capture_channels(0, None, 1), (0, None));
    }

    #[test]
    fn playback_fallbacks() {
        assert_eq!(resolve_playback_channel(Some(3), 2), Some(0));
        assert_eq!(resolve_playback_channel(Some(1), 2), Some(1));
        assert_eq!(resolve_playback_channel(None, 2), None);
        assert_eq!(resolve_playback_channel(None, 1), Some(0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_labels() {
        assert_eq!(channel_label(Some(0)), "Ch 1");
        assert_eq!(channel_label(Some(3)), "Ch 4");
        assert_eq!(channel_label(None), "Ch 1 + Ch 2");
    }
}
