// SPDX-License-Identifier: Apache-2.0
//! Subsystem registry and lifecycle dispatch.
//!
//! Subsystems are a closed set: a fixed enum of ids plus one unit struct per
//! subsystem implementing [`Subsystem`]. The registry is an ordered static
//! slice, so duplicate registration is impossible by construction and the
//! dispatch order is a compile-time fact.
//!
//! Lifecycle contract:
//!
//! 1. `register_models` once per engine setup, in registry order.
//! 2. `load_protos` against the loaded content catalog.
//! 3. `init_instance` for each new world, in registry order.
//! 4. `tick(world, n)` per simulated step, in registry order. A tick callee
//!    touches other subsystems only through their published operations.
//! 5. Save/load mirror each other in registry order; any chunk or instance
//!    load failure fails the whole world load.

use thiserror::Error;

use crate::content::{ContentCatalog, ContentError};
use crate::ident::ChunkId;
use crate::model::{ModelError, ModelRegistry};
use crate::tlv::TlvError;
use crate::world::World;

/// Stable ids for the closed subsystem set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SubsystemId {
    /// World/chunk core bookkeeping.
    World,
    /// Per-chunk resource channels.
    Resource,
    /// Atmosphere fields and interior volumes.
    Environment,
    /// Surface water.
    Hydrology,
    /// Per-column material stacks.
    Lithology,
    /// Splines and movers.
    Transport,
    /// Organizations and accounts.
    Organization,
    /// Data-driven policy evaluation.
    Policy,
    /// Per-org research progress.
    Research,
    /// Structures, containers, process runner.
    Structure,
    /// Per-org economy metrics.
    Economy,
    /// Jobs, planner, agents.
    Job,
    /// Input frame record/playback.
    Replay,
}

impl SubsystemId {
    /// Stable wire code; doubles as the save-record sort key.
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::World => 1,
            Self::Resource => 2,
            Self::Environment => 3,
            Self::Lithology => 4,
            Self::Hydrology => 5,
            Self::Transport => 6,
            Self::Organization => 7,
            Self::Policy => 8,
            Self::Research => 9,
            Self::Structure => 10,
            Self::Economy => 11,
            Self::Job => 12,
            Self::Replay => 13,
        }
    }

    /// Parses a wire code.
    #[must_use]
    pub const fn from_code(code: u16) -> Option<Self> {
        match code {
            1 => Some(Self::World),
            2 => Some(Self::Resource),
            3 => Some(Self::Environment),
            4 => Some(Self::Lithology),
            5 => Some(Self::Hydrology),
            6 => Some(Self::Transport),
            7 => Some(Self::Organization),
            8 => Some(Self::Policy),
            9 => Some(Self::Research),
            10 => Some(Self::Structure),
            11 => Some(Self::Economy),
            12 => Some(Self::Job),
            13 => Some(Self::Replay),
            _ => None,
        }
    }
}

/// A subsystem invariant check failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{subsystem:?} invariant violated: {invariant}")]
pub struct ValidateError {
    /// Subsystem whose validator fired.
    pub subsystem: SubsystemId,
    /// The violated invariant, human-readable.
    pub invariant: &'static str,
}

/// Behavior table for one subsystem.
///
/// All hooks default to no-ops so sparse subsystems (policy, replay) only
/// implement what they carry. `Sync` so the registry can live in a static;
/// the engine itself never runs a tick off the calling thread.
pub trait Subsystem: Sync {
    /// Stable id of this subsystem.
    fn id(&self) -> SubsystemId;

    /// Short name, e.g. `"res"`.
    fn name(&self) -> &'static str;

    /// Schema version of this subsystem's blobs.
    fn version(&self) -> u32 {
        1
    }

    /// Registers this subsystem's behavior models.
    fn register_models(&self, models: &mut ModelRegistry) -> Result<(), ModelError> {
        let _ = models;
        Ok(())
    }

    /// Inspects protos this subsystem consumes; fails on malformed content.
    fn load_protos(&self, content: &ContentCatalog) -> Result<(), ContentError> {
        let _ = content;
        Ok(())
    }

    /// Resets per-world state when a world is created or reloaded.
    fn init_instance(&self, world: &mut World) {
        let _ = world;
    }

    /// Advances this subsystem by `ticks`.
    fn tick(&self, world: &mut World, ticks: u32) {
        let _ = (world, ticks);
    }

    /// Serializes per-chunk state; empty means nothing to save.
    fn save_chunk(&self, world: &World, chunk: ChunkId) -> Vec<u8> {
        let _ = (world, chunk);
        Vec::new()
    }

    /// Restores per-chunk state from a blob this subsystem wrote.
    fn load_chunk(&self, world: &mut World, chunk: ChunkId, bytes: &[u8]) -> Result<(), TlvError> {
        let _ = (world, chunk, bytes);
        Ok(())
    }

    /// Serializes instance-wide state; empty means nothing to save.
    fn save_instance(&self, world: &World) -> Vec<u8> {
        let _ = world;
        Vec::new()
    }

    /// Restores instance-wide state from a blob this subsystem wrote.
    fn load_instance(&self, world: &mut World, bytes: &[u8]) -> Result<(), TlvError> {
        let _ = (world, bytes);
        Ok(())
    }

    /// Checks this subsystem's invariants over a world.
    fn validate(&self, world: &World) -> Result<(), ValidateError> {
        let _ = world;
        Ok(())
    }
}

/// The fixed dispatch order. Mirrors the engine's historical registration
/// order: resources before environment, transport before structures,
/// structures before jobs.
static REGISTRY: &[&dyn Subsystem] = &[
    &crate::world::WorldCore,
    &crate::res::ResourceSubsystem,
    &crate::env::EnvironmentSubsystem,
    &crate::litho::LithologySubsystem,
    &crate::hydro::HydrologySubsystem,
    &crate::trans::TransportSubsystem,
    &crate::org::OrganizationSubsystem,
    &crate::policy::PolicySubsystem,
    &crate::research::ResearchSubsystem,
    &crate::structure::StructureSubsystem,
    &crate::econ::EconomySubsystem,
    &crate::job::JobSubsystem,
    &crate::replay::ReplaySubsystem,
];

/// All subsystems in registration order.
#[must_use]
pub fn registry() -> &'static [&'static dyn Subsystem] {
    REGISTRY
}

/// Subsystem by id.
#[must_use]
pub fn get(id: SubsystemId) -> &'static dyn Subsystem {
    // The registry covers the whole enum; the linear scan mirrors the small
    // lookup tables this engine uses everywhere.
    let mut i = 0;
    while i < REGISTRY.len() {
        if REGISTRY[i].id() == id {
            return REGISTRY[i];
        }
        i += 1;
    }
    REGISTRY[0]
}

/// Builds the model registry by running `register_models` over the registry.
pub fn register_all_models() -> Result<ModelRegistry, ModelError> {
    let mut models = ModelRegistry::new();
    for sub in REGISTRY {
        sub.register_models(&mut models)?;
    }
    Ok(models)
}

/// Runs `load_protos` over the registry against a loaded catalog.
pub fn load_all_protos(content: &ContentCatalog) -> Result<(), ContentError> {
    for sub in REGISTRY {
        sub.load_protos(content)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_ids_are_unique() {
        let subs = registry();
        for (i, a) in subs.iter().enumerate() {
            for b in &subs[i + 1..] {
                assert_ne!(a.id(), b.id(), "{} and {} share an id", a.name(), b.name());
            }
        }
    }

    #[test]
    fn codes_round_trip() {
        for sub in registry() {
            let id = sub.id();
            assert_eq!(SubsystemId::from_code(id.code()), Some(id));
        }
    }

    #[test]
    fn world_core_dispatches_first() {
        assert_eq!(registry()[0].id(), SubsystemId::World);
    }
}
