//! SMPTE ST 12-1 linear timecode over audio.
//!
//! [`frame`] packs and unpacks the 80-bit LTC frame, [`encoder`] renders it
//! as a biphase-mark sample stream and [`decoder`] recovers timecode and
//! frame rate from one. The codecs are pure sample-in/sample-out state
//! machines; the audio handlers in [`crate::handlers`] own the device side.

pub mod decoder;
pub mod encoder;
pub mod frame;

pub use decoder::{DecodedFrame, LtcDecoder};
pub use encoder::LtcEncoder;
