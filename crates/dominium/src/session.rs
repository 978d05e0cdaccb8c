// SPDX-License-Identifier: Apache-2.0
//! Sessions: a world plus its replay context.
//!
//! The session is the product layer's handle on a running simulation. It
//! serializes all calls into the engine, records input frames around ticks,
//! and runs the determinism audit when asked. Callers reach engine state
//! through the published operations on [`Session::world`] /
//! [`Session::world_mut`]; subsystem tables stay private to the engine.

use domino_core::{
    ContentCatalog, DeterminismMode, InputFrame, ReplayContext, ReplayMode, World, WorldDigest,
};

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::registry::ContentRegistry;

/// A running simulation session.
#[derive(Debug)]
pub struct Session {
    world: World,
    replay: ReplayContext,
    pending_inputs: Vec<InputFrame>,
}

impl Session {
    /// Creates a session from a config and loaded content.
    ///
    /// Content is validated before the world is built; a dangling reference
    /// in the layered catalog fails session creation, not some later tick.
    pub fn new(config: &SessionConfig, registry: ContentRegistry) -> Result<Self, SessionError> {
        registry.validate_all()?;
        let world = World::new(config.seed, registry.into_catalog())?;
        let mut replay = match config.replay.into() {
            ReplayMode::Record => ReplayContext::record(),
            _ => ReplayContext::off(),
        };
        replay.set_determinism(config.determinism.into());
        Ok(Self { world, replay, pending_inputs: Vec::new() })
    }

    /// Creates a bare session over a catalog with replay off.
    pub fn from_catalog(seed: u64, catalog: ContentCatalog) -> Result<Self, SessionError> {
        let world = World::new(seed, catalog)?;
        Ok(Self { world, replay: ReplayContext::off(), pending_inputs: Vec::new() })
    }

    /// Rebuilds a session from a world save stream.
    pub fn load(catalog: ContentCatalog, bytes: &[u8]) -> Result<Self, SessionError> {
        let world = World::load(0, catalog, bytes)?;
        Ok(Self { world, replay: ReplayContext::off(), pending_inputs: Vec::new() })
    }

    /// Attaches a playback context from a serialized replay stream.
    pub fn attach_replay(&mut self, bytes: &[u8]) -> Result<(), SessionError> {
        self.replay = ReplayContext::playback_from(bytes)?;
        Ok(())
    }

    /// The world, read-only.
    #[must_use]
    pub fn world(&self) -> &World {
        &self.world
    }

    /// The world, for engine operations (create orgs, place structures, …).
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// The replay context.
    #[must_use]
    pub fn replay(&self) -> &ReplayContext {
        &self.replay
    }

    /// Queues an input command for the next [`Session::advance`].
    pub fn submit_input(&mut self, player_id: u32, payload: &[u8]) {
        self.pending_inputs.push(InputFrame {
            tick_index: self.world.tick_count(),
            player_id,
            payload: bytes_of(payload),
        });
    }

    /// Inputs recorded for the current tick, during playback.
    pub fn playback_inputs(&mut self) -> Vec<InputFrame> {
        if self.replay.mode() != ReplayMode::Playback {
            return Vec::new();
        }
        let tick = self.world.tick_count();
        self.replay.frame_at(tick).map(|f| f.inputs.clone()).unwrap_or_default()
    }

    /// Advances the simulation.
    ///
    /// In record mode the pending inputs become this tick's frame first.
    /// With determinism auditing on, the post-tick digest is recorded or
    /// compared and a divergence surfaces as
    /// [`domino_core::ReplayError::DigestMismatch`].
    pub fn advance(&mut self, ticks: u32) -> Result<(), SessionError> {
        if self.replay.mode() == ReplayMode::Record {
            let inputs: Vec<InputFrame> = self.pending_inputs.drain(..).collect();
            self.replay.record_frame(self.world.tick_count(), &inputs)?;
        }
        self.world.tick(ticks);
        if self.replay.determinism() != DeterminismMode::Off {
            let digest = self.world.digest();
            self.replay.observe_digest(digest)?;
        }
        Ok(())
    }

    /// Canonical world save stream.
    #[must_use]
    pub fn save(&self) -> Vec<u8> {
        self.world.save()
    }

    /// World digest.
    #[must_use]
    pub fn digest(&self) -> WorldDigest {
        self.world.digest()
    }

    /// Serialized replay stream of everything recorded so far.
    #[must_use]
    pub fn export_replay(&self) -> Vec<u8> {
        self.replay.serialize()
    }

    /// Runs every engine invariant validator.
    pub fn validate(&self) -> Result<(), SessionError> {
        self.world.validate()?;
        Ok(())
    }
}

fn bytes_of(payload: &[u8]) -> bytes::Bytes {
    bytes::Bytes::copy_from_slice(payload)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::config::{DeterminismModeConfig, ReplayModeConfig};

    fn recording_config() -> SessionConfig {
        SessionConfig {
            seed: 11,
            replay: ReplayModeConfig::Record,
            determinism: DeterminismModeConfig::Record,
            ..SessionConfig::default()
        }
    }

    #[test]
    fn record_then_replay_inputs() {
        let mut session = Session::new(&recording_config(), ContentRegistry::new()).unwrap();
        session.submit_input(1, b"place");
        session.advance(3).unwrap();
        session.submit_input(2, b"raze");
        session.advance(2).unwrap();
        let stream = session.export_replay();

        let mut other = Session::from_catalog(11, ContentCatalog::new()).unwrap();
        other.attach_replay(&stream).unwrap();
        let first = other.playback_inputs();
        assert_eq!(first.len(), 1);
        assert_eq!(&first[0].payload[..], b"place");
        other.advance(3).unwrap();
        let second = other.playback_inputs();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].player_id, 2);
    }

    #[test]
    fn determinism_audit_passes_for_identical_runs() {
        let mut a = Session::new(&recording_config(), ContentRegistry::new()).unwrap();
        a.advance(4).unwrap();
        let digest_a = a.digest();

        let mut b = Session::new(&recording_config(), ContentRegistry::new()).unwrap();
        b.advance(4).unwrap();
        assert_eq!(digest_a, b.digest());
    }

    #[test]
    fn save_load_round_trips_bytes() {
        let mut session = Session::from_catalog(3, ContentCatalog::new()).unwrap();
        session.world_mut().ensure_chunk(0, 0);
        session.advance(2).unwrap();
        let bytes = session.save();
        let loaded = Session::load(ContentCatalog::new(), &bytes).unwrap();
        assert_eq!(loaded.save(), bytes);
        assert_eq!(loaded.world().tick_count(), 2);
    }
}
