//! Versioned settings document.
//!
//! Version 1 held a single engine's fields at the top level; version 2
//! wraps per-engine payloads in `engines: [...]` and adds the selected
//! engine index. Loading a v1 document migrates it into `engines[0]`.
//! A missing or unparsable file falls back to defaults with a warning,
//! never an error.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use tcroute_core::audio::DeviceId;
use tcroute_core::types::{FrameRate, InputSource};

use crate::engine::Engine;

/// Current document version.
pub const SETTINGS_VERSION: u32 = 2;

fn default_gain_percent() -> u32 {
    100
}

/// Everything one engine persists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    // Input
    pub input_source: String,
    pub midi_input_port: String,
    /// Interface name for the Art-Net listener; None = all interfaces.
    pub artnet_input_interface: Option<String>,
    pub audio_input_device: Option<DeviceId>,
    pub ltc_input_channel: u16,
    pub thru_input_channel: Option<u16>,

    // Outputs
    pub mtc_out_enabled: bool,
    pub artnet_out_enabled: bool,
    pub ltc_out_enabled: bool,
    pub thru_out_enabled: bool,
    pub midi_output_port: String,
    pub artnet_output_interface: Option<String>,
    pub audio_output_device: Option<DeviceId>,
    /// None = stereo "Ch 1 + Ch 2" mode.
    pub audio_output_channel: Option<u16>,
    pub thru_output_device: Option<DeviceId>,
    pub thru_output_channel: Option<u16>,

    // Per-output offsets in frames
    pub mtc_offset: i32,
    pub artnet_offset: i32,
    pub ltc_offset: i32,

    // Gains in percent (100 = unity)
    #[serde(default = "default_gain_percent")]
    pub ltc_input_gain: u32,
    #[serde(default = "default_gain_percent")]
    pub thru_input_gain: u32,
    #[serde(default = "default_gain_percent")]
    pub ltc_output_gain: u32,
    #[serde(default = "default_gain_percent")]
    pub thru_output_gain: u32,

    // Rates
    pub input_fps_index: u8,
    pub output_fps_index: u8,
    pub fps_convert_enabled: bool,
    pub ltc_fps_override: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            input_source: InputSource::SystemTime.as_str().to_string(),
            midi_input_port: String::new(),
            artnet_input_interface: None,
            audio_input_device: None,
            ltc_input_channel: 0,
            thru_input_channel: None,
            mtc_out_enabled: false,
            artnet_out_enabled: false,
            ltc_out_enabled: false,
            thru_out_enabled: false,
            midi_output_port: String::new(),
            artnet_output_interface: None,
            audio_output_device: None,
            audio_output_channel: Some(0),
            thru_output_device: None,
            thru_output_channel: Some(1),
            mtc_offset: 0,
            artnet_offset: 0,
            ltc_offset: 0,
            ltc_input_gain: 100,
            thru_input_gain: 100,
            ltc_output_gain: 100,
            thru_output_gain: 100,
            input_fps_index: FrameRate::Fps30.to_index(),
            output_fps_index: FrameRate::Fps30.to_index(),
            fps_convert_enabled: false,
            ltc_fps_override: false,
        }
    }
}

/// The whole persisted document (version 2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub version: u32,
    pub engines: Vec<EngineSettings>,
    pub audio_input_type_filter: String,
    pub audio_output_type_filter: String,
    pub preferred_sample_rate: Option<u32>,
    pub preferred_buffer_size: Option<u32>,
    pub selected_engine: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            engines: vec![EngineSettings::default()],
            audio_input_type_filter: String::new(),
            audio_output_type_filter: String::new(),
            preferred_sample_rate: None,
            preferred_buffer_size: None,
            selected_engine: 0,
        }
    }
}

/// The version-1 layout: one engine's fields inline next to the globals.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SettingsV1 {
    #[serde(flatten)]
    engine: EngineSettings,
    audio_input_type_filter: String,
    audio_output_type_filter: String,
    preferred_sample_rate: Option<u32>,
    preferred_buffer_size: Option<u32>,
}

impl From<SettingsV1> for Settings {
    fn from(v1: SettingsV1) -> Self {
        Settings {
            version: SETTINGS_VERSION,
            engines: vec![v1.engine],
            audio_input_type_filter: v1.audio_input_type_filter,
            audio_output_type_filter: v1.audio_output_type_filter,
            preferred_sample_rate: v1.preferred_sample_rate,
            preferred_buffer_size: v1.preferred_buffer_size,
            selected_engine: 0,
        }
    }
}

/// Default location: `<config dir>/tcroute/settings.yaml`.
pub fn default_settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tcroute")
        .join("settings.yaml")
}

/// Parse a document of either version, migrating v1 into `engines[0]`.
pub fn parse(contents: &str) -> Result<Settings> {
    let value: serde_yaml::Value =
        serde_yaml::from_str(contents).context("settings file is not valid YAML")?;
    let version = value
        .get("version")
        .and_then(serde_yaml::Value::as_u64)
        .unwrap_or(1);

    let mut settings: Settings = if version >= 2 {
        serde_yaml::from_value(value).context("failed to parse v2 settings")?
    } else {
        let v1: SettingsV1 =
            serde_yaml::from_value(value).context("failed to parse v1 settings")?;
        log::info!("migrating v1 settings to v2 (single engine wrapped into engines[0])");
        v1.into()
    };

    if settings.engines.is_empty() {
        settings.engines.push(EngineSettings::default());
    }
    settings.engines.truncate(crate::host::MAX_ENGINES);
    settings.selected_engine = settings.selected_engine.min(settings.engines.len() - 1);
    Ok(settings)
}

/// Load from `path`; any failure logs a warning and yields defaults.
pub fn load(path: &Path) -> Settings {
    if !path.exists() {
        log::info!("no settings at {path:?}, using defaults");
        return Settings::default();
    }
    match std::fs::read_to_string(path).map_err(anyhow::Error::from).and_then(|s| parse(&s)) {
        Ok(settings) => settings,
        Err(e) => {
            log::warn!("failed to load settings from {path:?}: {e:#}, using defaults");
            Settings::default()
        }
    }
}

/// Save to `path`, creating parent directories.
pub fn save(settings: &Settings, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create settings directory {parent:?}"))?;
    }
    let yaml = serde_yaml::to_string(settings).context("failed to serialize settings")?;
    std::fs::write(path, yaml).with_context(|| format!("failed to write {path:?}"))?;
    Ok(())
}

fn gain(percent: u32) -> f32 {
    percent as f32 / 100.0
}

/// Apply the persisted fields that live on the engine itself (enables,
/// offsets, rates, gains, source kind). Device opens are the caller's job:
/// they need enumeration results this module does not own.
pub fn apply_to_engine(settings: &EngineSettings, engine: &mut Engine) {
    engine.set_input_source(InputSource::from_str_lossy(&settings.input_source));

    engine.set_output_mtc_enabled(settings.mtc_out_enabled);
    engine.set_output_artnet_enabled(settings.artnet_out_enabled);
    engine.set_output_ltc_enabled(settings.ltc_out_enabled);
    engine.set_output_thru_enabled(settings.thru_out_enabled);

    engine.set_mtc_offset(settings.mtc_offset);
    engine.set_artnet_offset(settings.artnet_offset);
    engine.set_ltc_offset(settings.ltc_offset);

    engine.set_fps_convert_enabled(settings.fps_convert_enabled);
    engine.set_output_frame_rate(FrameRate::from_index(settings.output_fps_index));
    engine.select_frame_rate(FrameRate::from_index(settings.input_fps_index));
    engine.set_user_overrode_ltc_fps(settings.ltc_fps_override);

    engine.ltc_input().set_input_gain(gain(settings.ltc_input_gain));
    engine.ltc_input().set_thru_gain(gain(settings.thru_input_gain));
    engine.ltc_output().set_gain(gain(settings.ltc_output_gain));
    if let Some(thru) = engine.audio_thru() {
        thru.set_gain(gain(settings.thru_output_gain));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::DeviceClaims;

    #[test]
    fn roundtrip_via_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.yaml");

        let mut settings = Settings::default();
        settings.engines[0].input_source = "LTC".into();
        settings.engines[0].ltc_input_channel = 1;
        settings.engines[0].thru_input_channel = Some(0);
        settings.engines[0].mtc_offset = -12;
        settings.engines.push(EngineSettings {
            input_source: "ArtNet".into(),
            artnet_out_enabled: true,
            ..Default::default()
        });
        settings.selected_engine = 1;

        save(&settings, &path).unwrap();
        let loaded = load(&path);
        assert_eq!(loaded, settings);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let loaded = load(Path::new("/nonexistent/tcroute/settings.yaml"));
        assert_eq!(loaded, Settings::default());
    }

    #[test]
    fn garbage_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.yaml");
        std::fs::write(&path, ":::: not yaml {{{{").unwrap();
        assert_eq!(load(&path), Settings::default());
    }

    #[test]
    fn v1_document_migrates_into_first_engine() {
        let v1 = r#"
input_source: "MTC"
midi_input_port: "MIDI Monitor"
mtc_out_enabled: true
ltc_offset: 5
ltc_output_gain: 150
input_fps_index: 2
preferred_sample_rate: 48000
audio_output_type_filter: "ASIO"
"#;
        let settings = parse(v1).unwrap();
        assert_eq!(settings.version, SETTINGS_VERSION);
        assert_eq!(settings.engines.len(), 1);
        assert_eq!(settings.selected_engine, 0);

        let engine = &settings.engines[0];
        assert_eq!(engine.input_source, "MTC");
        assert_eq!(engine.midi_input_port, "MIDI Monitor");
        assert!(engine.mtc_out_enabled);
        assert_eq!(engine.ltc_offset, 5);
        assert_eq!(engine.ltc_output_gain, 150);
        assert_eq!(engine.input_fps_index, 2);
        // Unspecified fields take defaults.
        assert_eq!(engine.thru_output_gain, 100);

        assert_eq!(settings.preferred_sample_rate, Some(48_000));
        assert_eq!(settings.audio_output_type_filter, "ASIO");
    }

    #[test]
    fn v2_selected_engine_clamps() {
        let doc = r#"
version: 2
engines:
  - input_source: "SystemTime"
selected_engine: 9
"#;
        let settings = parse(doc).unwrap();
        assert_eq!(settings.selected_engine, 0);
    }

    #[test]
    fn apply_pushes_fields_onto_engine() {
        let mut engine = Engine::new(0, DeviceClaims::new());
        let mut es = EngineSettings::default();
        es.input_source = "LTC".into();
        es.mtc_out_enabled = true;
        es.ltc_offset = 31; // clamps to 30
        es.fps_convert_enabled = true;
        es.output_fps_index = FrameRate::Fps25.to_index();
        es.input_fps_index = FrameRate::Fps2997.to_index();
        es.ltc_fps_override = true;

        apply_to_engine(&es, &mut engine);
        assert_eq!(engine.active_input(), InputSource::Ltc);
        assert!(engine.is_output_mtc_enabled());
        assert_eq!(engine.ltc_offset(), 30);
        assert!(engine.is_fps_convert_enabled());
        assert_eq!(engine.output_fps(), FrameRate::Fps25);
        assert_eq!(engine.current_fps(), FrameRate::Fps2997);
        assert!(engine.user_overrode_ltc_fps());
    }
}
