//! MIDI timecode support for tcroute.
//!
//! This crate provides:
//! - MIDI port discovery and connection via midir
//! - The MTC quarter-frame / full-frame message codec
//! - The MTC input handler (reconstruction + interpolation)
//! - The MTC output handler (drift-free quarter-frame cadence)
//!
//! The midir callback is synchronous; handlers publish state to the engine
//! through atomics and a small lock, never through channels.

pub mod mtc;
mod ports;

pub use mtc::input::MtcInput;
pub use mtc::output::MtcOutput;
pub use ports::{list_input_ports, list_output_ports, MidiPortError};
