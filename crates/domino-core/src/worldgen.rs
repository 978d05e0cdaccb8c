// SPDX-License-Identifier: Apache-2.0
//! Worldgen pipeline: ordered providers that populate newly created chunks.
//!
//! Providers run exactly once per chunk, at creation, in the fixed order
//! below (subsystem registration order). Population is deterministic in
//! `(world seed, cx, cy)`; creating the same chunk in two worlds with the
//! same seed yields identical state.

use crate::ident::ChunkId;
use crate::subsystem::SubsystemId;
use crate::world::World;

/// Descriptor of one worldgen provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorldgenProvider {
    /// Stable provider id.
    pub id: u16,
    /// Short name.
    pub name: &'static str,
    /// Subsystem whose populate hook this provider runs.
    pub subsystem: SubsystemId,
}

static PROVIDERS: &[WorldgenProvider] = &[
    WorldgenProvider { id: 1, name: "res_default", subsystem: SubsystemId::Resource },
    WorldgenProvider { id: 2, name: "env_atmosphere", subsystem: SubsystemId::Environment },
    WorldgenProvider { id: 3, name: "litho_layers", subsystem: SubsystemId::Lithology },
    WorldgenProvider { id: 4, name: "hydro_surface", subsystem: SubsystemId::Hydrology },
];

/// All providers in population order.
#[must_use]
pub fn providers() -> &'static [WorldgenProvider] {
    PROVIDERS
}

/// Runs every provider against a freshly created chunk.
pub(crate) fn populate_chunk(world: &mut World, chunk: ChunkId) {
    for provider in PROVIDERS {
        match provider.subsystem {
            SubsystemId::Resource => crate::res::populate_chunk(world, chunk),
            SubsystemId::Environment => crate::env::populate_chunk(world, chunk),
            SubsystemId::Lithology => crate::litho::populate_chunk(world, chunk),
            SubsystemId::Hydrology => crate::hydro::populate_chunk(world, chunk),
            _ => {}
        }
    }
}
