//! Multi-engine host.
//!
//! Owns between one and eight engines. Exactly one engine (index 0) is
//! primary and holds the AudioThru; removing the primary promotes the next
//! engine and a fresh AudioThru is built there, with no state transferred.

use tcroute_core::audio::DeviceId;

use crate::claims::DeviceClaims;
use crate::engine::Engine;

pub const PRIMARY_ENGINE_INDEX: usize = 0;
pub const MAX_ENGINES: usize = 8;

/// The engine list plus the shared device-ownership registry.
pub struct Host {
    engines: Vec<Engine>,
    claims: DeviceClaims,
    selected: usize,
}

impl Host {
    /// A host always starts with one (primary) engine.
    pub fn new() -> Self {
        let claims = DeviceClaims::new();
        Self {
            engines: vec![Engine::new(PRIMARY_ENGINE_INDEX, claims.clone())],
            claims,
            selected: 0,
        }
    }

    pub fn engine_count(&self) -> usize {
        self.engines.len()
    }

    pub fn engines(&self) -> &[Engine] {
        &self.engines
    }

    pub fn engine(&self, index: usize) -> Option<&Engine> {
        self.engines.get(index)
    }

    pub fn engine_mut(&mut self, index: usize) -> Option<&mut Engine> {
        self.engines.get_mut(index)
    }

    pub fn selected_index(&self) -> usize {
        self.selected
    }

    pub fn select(&mut self, index: usize) {
        if index < self.engines.len() {
            self.selected = index;
        }
    }

    pub fn selected_engine(&self) -> &Engine {
        &self.engines[self.selected]
    }

    pub fn selected_engine_mut(&mut self) -> &mut Engine {
        &mut self.engines[self.selected]
    }

    /// Append an engine, bounded by [`MAX_ENGINES`]. Returns its index.
    pub fn add_engine(&mut self) -> Option<usize> {
        if self.engines.len() >= MAX_ENGINES {
            return None;
        }
        let index = self.engines.len();
        self.engines.push(Engine::new(index, self.claims.clone()));
        log::info!("added engine {}", index + 1);
        Some(index)
    }

    /// Remove an engine, never going below one. Engines after it shift
    /// down; if the primary went away the next engine becomes primary and
    /// grows a fresh AudioThru.
    pub fn remove_engine(&mut self, index: usize) -> bool {
        if self.engines.len() <= 1 || index >= self.engines.len() {
            return false;
        }
        // Engine::drop stops all handlers in the mandated order and
        // releases its device claims.
        let removed = self.engines.remove(index);
        drop(removed);

        for (new_index, engine) in self.engines.iter_mut().enumerate() {
            if engine.index() != new_index {
                engine.reindex(new_index);
                engine.set_name(format!("ENGINE {}", new_index + 1));
            }
        }
        if self.selected >= self.engines.len() {
            self.selected = self.engines.len() - 1;
        }
        log::info!("removed engine {}", index + 1);
        true
    }

    /// Tick every engine; call at ~60 Hz from the UI thread.
    pub fn tick_all(&mut self) {
        for engine in &mut self.engines {
            engine.tick();
        }
    }

    /// Ownership marker for a device selector: "●" when this engine holds
    /// the device, "[ENGINE N]" when another one does.
    pub fn device_marker(&self, engine_index: usize, device: &DeviceId) -> Option<String> {
        let (owner, _) = self.claims.owner(device)?;
        if owner == engine_index {
            Some("●".to_string())
        } else {
            Some(format!("[ENGINE {}]", owner + 1))
        }
    }
}

impl Default for Host {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::DeviceRole;

    #[test]
    fn starts_with_one_primary_engine() {
        let host = Host::new();
        assert_eq!(host.engine_count(), 1);
        assert!(host.engines()[0].is_primary());
        assert!(host.engines()[0].audio_thru().is_some());
    }

    #[test]
    fn add_is_bounded_and_remove_keeps_one() {
        let mut host = Host::new();
        for _ in 1..MAX_ENGINES {
            assert!(host.add_engine().is_some());
        }
        assert_eq!(host.engine_count(), MAX_ENGINES);
        assert!(host.add_engine().is_none());

        for _ in 1..MAX_ENGINES {
            assert!(host.remove_engine(0));
        }
        assert_eq!(host.engine_count(), 1);
        assert!(!host.remove_engine(0), "the last engine must survive");
    }

    #[test]
    fn removing_primary_promotes_the_next() {
        let mut host = Host::new();
        host.add_engine();
        host.add_engine();
        assert!(host.engines()[1].audio_thru().is_none());

        assert!(host.remove_engine(0));
        assert_eq!(host.engine_count(), 2);
        let promoted = &host.engines()[0];
        assert!(promoted.is_primary());
        assert!(promoted.audio_thru().is_some(), "fresh AudioThru on the new primary");
        assert_eq!(promoted.name(), "ENGINE 1");
        // Exactly one primary, exactly one AudioThru.
        assert_eq!(
            host.engines().iter().filter(|e| e.audio_thru().is_some()).count(),
            1
        );
    }

    #[test]
    fn selection_clamps_after_removal() {
        let mut host = Host::new();
        host.add_engine();
        host.add_engine();
        host.select(2);
        assert_eq!(host.selected_index(), 2);
        host.remove_engine(2);
        assert_eq!(host.selected_index(), 1);
    }

    #[test]
    fn device_markers_reflect_ownership() {
        let mut host = Host::new();
        host.add_engine();
        let device = DeviceId::new("interface-a");
        host.claims.claim(&device, 1, DeviceRole::LtcOutput);

        assert_eq!(host.device_marker(1, &device), Some("●".to_string()));
        assert_eq!(host.device_marker(0, &device), Some("[ENGINE 2]".to_string()));
        assert_eq!(host.device_marker(0, &DeviceId::new("other")), None);
    }

    #[test]
    fn tick_all_runs_every_engine() {
        let mut host = Host::new();
        host.add_engine();
        host.tick_all();
        for engine in host.engines() {
            assert!(engine.is_source_active(), "system-time engines are active");
        }
    }
}
