//! MIDI port discovery and connection.
//!
//! Uses midir for cross-platform MIDI I/O (ALSA on Linux, CoreMIDI on
//! macOS, WinMM on Windows). Ports are addressed by case-insensitive
//! substring match on their names; an empty pattern takes the first
//! available port.

use midir::{MidiInput, MidiInputPort, MidiOutput, MidiOutputConnection, MidiOutputPort};

/// Error type for MIDI port operations
#[derive(Debug, thiserror::Error)]
pub enum MidiPortError {
    #[error("Failed to initialize MIDI input: {0}")]
    InputInit(String),

    #[error("Failed to initialize MIDI output: {0}")]
    OutputInit(String),

    #[error("No MIDI ports available")]
    NoPorts,

    #[error("No MIDI port found matching: {0}")]
    PortNotFound(String),

    #[error("Failed to connect to MIDI port: {0}")]
    Connection(String),
}

/// List all available MIDI input port names.
pub fn list_input_ports() -> Result<Vec<String>, MidiPortError> {
    let midi_in =
        MidiInput::new("tcroute-midi-list").map_err(|e| MidiPortError::InputInit(e.to_string()))?;
    Ok(midi_in
        .ports()
        .iter()
        .filter_map(|port| midi_in.port_name(port).ok())
        .collect())
}

/// List all available MIDI output port names.
pub fn list_output_ports() -> Result<Vec<String>, MidiPortError> {
    let midi_out = MidiOutput::new("tcroute-midi-list")
        .map_err(|e| MidiPortError::OutputInit(e.to_string()))?;
    Ok(midi_out
        .ports()
        .iter()
        .filter_map(|port| midi_out.port_name(port).ok())
        .collect())
}

fn matches(name: &str, pattern: &str) -> bool {
    pattern.is_empty() || name.to_lowercase().contains(pattern)
}

/// Find an input port matching `port_match`, returning the handle, the port
/// and its resolved name so the caller can attach a callback.
pub(crate) fn find_input_port(
    port_match: &str,
) -> Result<(MidiInput, MidiInputPort, String), MidiPortError> {
    let pattern = port_match.to_lowercase();
    let midi_in =
        MidiInput::new("tcroute-mtc-in").map_err(|e| MidiPortError::InputInit(e.to_string()))?;

    let ports = midi_in.ports();
    if ports.is_empty() {
        return Err(MidiPortError::NoPorts);
    }

    let port = ports
        .into_iter()
        .find(|port| {
            midi_in
                .port_name(port)
                .map(|name| matches(&name, &pattern))
                .unwrap_or(false)
        })
        .ok_or_else(|| MidiPortError::PortNotFound(port_match.to_string()))?;

    let name = midi_in
        .port_name(&port)
        .map_err(|e| MidiPortError::Connection(e.to_string()))?;
    log::info!("MTC: found input port '{name}'");
    Ok((midi_in, port, name))
}

/// Find and connect to an output port matching `port_match`.
pub(crate) fn connect_output_port(
    port_match: &str,
) -> Result<(MidiOutputConnection, String), MidiPortError> {
    let pattern = port_match.to_lowercase();
    let midi_out =
        MidiOutput::new("tcroute-mtc-out").map_err(|e| MidiPortError::OutputInit(e.to_string()))?;

    let ports = midi_out.ports();
    if ports.is_empty() {
        return Err(MidiPortError::NoPorts);
    }

    let port: MidiOutputPort = ports
        .into_iter()
        .find(|port| {
            midi_out
                .port_name(port)
                .map(|name| matches(&name, &pattern))
                .unwrap_or(false)
        })
        .ok_or_else(|| MidiPortError::PortNotFound(port_match.to_string()))?;

    let name = midi_out
        .port_name(&port)
        .map_err(|e| MidiPortError::Connection(e.to_string()))?;
    let conn = midi_out
        .connect(&port, "tcroute-mtc-output")
        .map_err(|e| MidiPortError::Connection(e.to_string()))?;
    log::info!("MTC: connected output port '{name}'");
    Ok((conn, name))
}
