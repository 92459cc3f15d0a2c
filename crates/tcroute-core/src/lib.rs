//! tcroute core - timecode algebra, protocol codecs and audio handlers
//!
//! This crate holds everything below the engine layer:
//!
//! - [`types`]: `Timecode`, `FrameRate` and `InputSource`
//! - [`timecode`]: drop-frame-aware frame arithmetic and wall-clock conversion
//! - [`ltc`]: biphase-mark LTC encoder/decoder plus the audio handlers built on them
//! - [`artnet`]: ArtTimeCode packet codec and UDP input/output handlers
//! - [`ring`]: the single-producer/single-consumer pass-through ring buffer
//! - [`sched`]: the drift-free cadence pacer and the 1 ms ticker thread
//! - [`audio`]: CPAL device enumeration and stream plumbing
//! - [`net`]: IPv4 interface enumeration for Art-Net binding
//! - [`status`]: structured handler status values
//!
//! Protocol handlers communicate upward exclusively through atomics or a
//! small lock-protected struct; nothing in this crate blocks inside an audio
//! callback.

pub mod artnet;
pub mod audio;
pub mod clock;
pub mod handlers;
pub mod ltc;
pub mod net;
pub mod ring;
pub mod sched;
pub mod status;
pub mod timecode;
pub mod types;

pub use status::Status;
pub use types::{FrameRate, InputSource, Timecode};
