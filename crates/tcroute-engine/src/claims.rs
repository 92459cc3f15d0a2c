//! Audio-device ownership registry.
//!
//! A given audio device may be opened by at most one handler (LTC input,
//! LTC output or AudioThru) across all engines. Engines consult this
//! registry before starting an audio handler: a cross-engine collision
//! fails the new start with a conflict status, while the one sanctioned
//! takeover (LTC output and AudioThru swapping a device within an engine)
//! is decided by the engine itself.

use std::sync::Arc;

use parking_lot::Mutex;

use tcroute_core::audio::DeviceId;

/// Which handler kind holds a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceRole {
    LtcInput,
    LtcOutput,
    AudioThru,
}

impl DeviceRole {
    /// Short label used in conflict status details.
    pub fn label(self) -> &'static str {
        match self {
            DeviceRole::LtcInput => "LTC IN",
            DeviceRole::LtcOutput => "LTC OUT",
            DeviceRole::AudioThru => "AUDIO THRU",
        }
    }
}

#[derive(Debug, Clone)]
struct Claim {
    device: DeviceId,
    engine: usize,
    role: DeviceRole,
}

/// Shared ownership registry. Engines hold clones.
#[derive(Debug, Clone, Default)]
pub struct DeviceClaims {
    claims: Arc<Mutex<Vec<Claim>>>,
}

impl DeviceClaims {
    pub fn new() -> Self {
        Self::default()
    }

    /// Who currently owns `device`, if anyone.
    pub fn owner(&self, device: &DeviceId) -> Option<(usize, DeviceRole)> {
        self.claims
            .lock()
            .iter()
            .find(|c| &c.device == device)
            .map(|c| (c.engine, c.role))
    }

    /// Record that `engine`'s `role` handler took `device`. Replaces any
    /// previous claim by the same engine and role.
    pub fn claim(&self, device: &DeviceId, engine: usize, role: DeviceRole) {
        let mut claims = self.claims.lock();
        claims.retain(|c| !(c.engine == engine && c.role == role));
        claims.push(Claim {
            device: device.clone(),
            engine,
            role,
        });
    }

    /// Release the claim held by `engine`'s `role` handler, if any.
    pub fn release(&self, engine: usize, role: DeviceRole) {
        self.claims
            .lock()
            .retain(|c| !(c.engine == engine && c.role == role));
    }

    /// Release everything held by `engine` (engine removal).
    pub fn release_engine(&self, engine: usize) {
        self.claims.lock().retain(|c| c.engine != engine);
    }

    /// Renumber claims when engines are reindexed after a removal.
    pub fn reindex(&self, old_engine: usize, new_engine: usize) {
        for claim in self.claims.lock().iter_mut() {
            if claim.engine == old_engine {
                claim.engine = new_engine;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dev(name: &str) -> DeviceId {
        DeviceId::new(name)
    }

    #[test]
    fn claim_and_release() {
        let claims = DeviceClaims::new();
        assert_eq!(claims.owner(&dev("a")), None);

        claims.claim(&dev("a"), 0, DeviceRole::LtcOutput);
        assert_eq!(claims.owner(&dev("a")), Some((0, DeviceRole::LtcOutput)));

        claims.release(0, DeviceRole::LtcOutput);
        assert_eq!(claims.owner(&dev("a")), None);
    }

    #[test]
    fn re_claim_moves_the_handler() {
        let claims = DeviceClaims::new();
        claims.claim(&dev("a"), 0, DeviceRole::AudioThru);
        claims.claim(&dev("b"), 0, DeviceRole::AudioThru);
        // The old device is free again; only one claim per handler.
        assert_eq!(claims.owner(&dev("a")), None);
        assert_eq!(claims.owner(&dev("b")), Some((0, DeviceRole::AudioThru)));
    }

    #[test]
    fn cross_engine_visibility() {
        let claims = DeviceClaims::new();
        let clone = claims.clone();
        claims.claim(&dev("shared"), 1, DeviceRole::LtcInput);
        assert_eq!(clone.owner(&dev("shared")), Some((1, DeviceRole::LtcInput)));

        clone.release_engine(1);
        assert_eq!(claims.owner(&dev("shared")), None);
    }

    #[test]
    fn reindex_renumbers() {
        let claims = DeviceClaims::new();
        claims.claim(&dev("a"), 2, DeviceRole::LtcOutput);
        claims.reindex(2, 1);
        assert_eq!(claims.owner(&dev("a")), Some((1, DeviceRole::LtcOutput)));
    }
}
