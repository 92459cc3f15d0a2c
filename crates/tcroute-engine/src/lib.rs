//! Engine composition for tcroute.
//!
//! An [`Engine`](engine::Engine) is one complete routing pipeline: one input
//! source feeding up to four outputs, with rate conversion and per-output
//! offsets. The [`Host`](host::Host) owns 1..=8 engines and enforces the
//! primary-engine and device-ownership invariants. [`settings`] holds the
//! versioned on-disk document (v1 single-engine, v2 multi-engine).

pub mod claims;
pub mod engine;
pub mod host;
pub mod settings;

pub use claims::{DeviceClaims, DeviceRole};
pub use engine::{Engine, EngineSnapshot};
pub use host::{Host, MAX_ENGINES, PRIMARY_ENGINE_INDEX};
pub use settings::{EngineSettings, Settings};
