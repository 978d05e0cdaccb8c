// SPDX-License-Identifier: Apache-2.0
//! World and chunk core: the carrier every subsystem hangs its tables off.
//!
//! A world owns the content catalog, the model registry, the chunk grid, and
//! one state struct per subsystem. Subsystems never reach into each other's
//! state; cross-subsystem effects go through the published operations in the
//! subsystem modules.
//!
//! # Canonical save stream
//!
//! `World::save` emits one TLV record stream:
//!
//! - tag 1, one record per subsystem with instance state, sorted by subsystem
//!   code; payload = KV `{subsystem code, blob}`.
//! - tag 2, one record per chunk, sorted by chunk id; payload = KV
//!   `{chunk id, per-subsystem blobs at tag 16+code}`.
//!
//! The world core's own instance blob carries seed, tick counter, and the
//! chunk table, so it rebuilds chunks before any other subsystem loads.
//! Loading is atomic: any malformed blob fails the whole load and the partial
//! world is dropped.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::content::{ContentCatalog, ContentError};
use crate::econ::EconState;
use crate::env::EnvState;
use crate::fixed::Fixed64;
use crate::hydro::HydroState;
use crate::ident::{ChunkId, IdAlloc};
use crate::job::JobState;
use crate::litho::LithoState;
use crate::model::{ModelError, ModelRegistry};
use crate::org::OrgState;
use crate::res::ResState;
use crate::research::ResearchState;
use crate::structure::StructState;
use crate::subsystem::{self, Subsystem, SubsystemId, ValidateError};
use crate::tlv::{ByteReader, ByteWriter, TlvError, TlvKv, TlvKvWriter, TlvReader, TlvStreamWriter};
use crate::trans::TransState;

/// Record tags of the world save stream.
mod wire {
    /// Per-subsystem instance record.
    pub const REC_INSTANCE: u32 = 1;
    /// Per-chunk record.
    pub const REC_CHUNK: u32 = 2;

    /// Instance record KV: subsystem code (u16).
    pub const KV_SUBSYS: u32 = 1;
    /// Instance record KV: subsystem blob.
    pub const KV_BLOB: u32 = 2;

    /// Chunk record KV: chunk id (u32).
    pub const KV_CHUNK_ID: u32 = 1;
    /// Chunk record KV: first subsystem blob tag; blob for code `c` is at
    /// `KV_SUBSYS_BASE + c`.
    pub const KV_SUBSYS_BASE: u32 = 16;

    /// World core instance blob version.
    pub const WORLD_VERSION: u32 = 1;
}

/// Errors from world construction, mutation, and serialization.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorldError {
    /// Content failed to load or validate.
    #[error("content error: {0}")]
    Content(#[from] ContentError),

    /// Model registration collided.
    #[error("model error: {0}")]
    Model(#[from] ModelError),

    /// The outer save stream was malformed.
    #[error("malformed world stream: {0}")]
    Stream(#[from] TlvError),

    /// One subsystem's blob failed to load; the world load is abandoned.
    #[error("subsystem {subsystem:?} failed to load: {source}")]
    SubsystemLoad {
        /// The failing subsystem.
        subsystem: SubsystemId,
        /// The underlying decode failure.
        source: TlvError,
    },

    /// A chunk record referenced a chunk the meta table does not contain.
    #[error("chunk record references unknown chunk {0}")]
    UnknownChunk(ChunkId),

    /// A record referenced a subsystem code this build does not know.
    #[error("unknown subsystem code {0}")]
    UnknownSubsystem(u32),

    /// An invariant check failed.
    #[error(transparent)]
    Validate(#[from] ValidateError),
}

/// One cell of the integer chunk grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Chunk {
    /// Stable id, assigned at creation.
    pub id: ChunkId,
    /// Grid x coordinate.
    pub cx: i32,
    /// Grid y coordinate.
    pub cy: i32,
}

/// Maps a Q32.32 world coordinate to its chunk grid coordinate.
#[must_use]
pub fn chunk_coord_of(pos: Fixed64) -> i32 {
    (pos.raw() >> 32) as i32
}

/// 256-bit digest of a canonical world save, displayed as hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorldDigest(pub [u8; 32]);

impl std::fmt::Display for WorldDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// The simulated world.
#[derive(Debug)]
pub struct World {
    pub(crate) seed: u64,
    pub(crate) tick_count: u32,
    pub(crate) content: ContentCatalog,
    pub(crate) models: ModelRegistry,

    pub(crate) chunks: BTreeMap<ChunkId, Chunk>,
    pub(crate) chunk_lookup: FxHashMap<(i32, i32), ChunkId>,
    pub(crate) chunk_ids: IdAlloc,

    pub(crate) res: ResState,
    pub(crate) env: EnvState,
    pub(crate) hydro: HydroState,
    pub(crate) litho: LithoState,
    pub(crate) trans: TransState,
    pub(crate) orgs: OrgState,
    pub(crate) research: ResearchState,
    pub(crate) structs: StructState,
    pub(crate) econ: EconState,
    pub(crate) jobs: JobState,
}

impl World {
    /// Creates a fresh world over a loaded catalog.
    ///
    /// Runs the full setup half of the lifecycle: model registration, proto
    /// load, then `init_instance` over the registry.
    pub fn new(seed: u64, content: ContentCatalog) -> Result<Self, WorldError> {
        let models = subsystem::register_all_models()?;
        subsystem::load_all_protos(&content)?;
        let mut world = Self {
            seed,
            tick_count: 0,
            content,
            models,
            chunks: BTreeMap::new(),
            chunk_lookup: FxHashMap::default(),
            chunk_ids: IdAlloc::new(),
            res: ResState::default(),
            env: EnvState::default(),
            hydro: HydroState::default(),
            litho: LithoState::default(),
            trans: TransState::default(),
            orgs: OrgState::default(),
            research: ResearchState::default(),
            structs: StructState::default(),
            econ: EconState::default(),
            jobs: JobState::default(),
        };
        for sub in subsystem::registry() {
            sub.init_instance(&mut world);
        }
        Ok(world)
    }

    /// World seed feeding every deterministic mix hash.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Ticks simulated so far.
    #[must_use]
    pub fn tick_count(&self) -> u32 {
        self.tick_count
    }

    /// The loaded content catalog.
    #[must_use]
    pub fn content(&self) -> &ContentCatalog {
        &self.content
    }

    /// The model registry built at world creation.
    #[must_use]
    pub fn models(&self) -> &ModelRegistry {
        &self.models
    }

    /// Chunk by id.
    #[must_use]
    pub fn chunk(&self, id: ChunkId) -> Option<&Chunk> {
        self.chunks.get(&id)
    }

    /// Chunk covering grid coordinates, if it exists.
    #[must_use]
    pub fn find_chunk(&self, cx: i32, cy: i32) -> Option<ChunkId> {
        self.chunk_lookup.get(&(cx, cy)).copied()
    }

    /// Number of chunks.
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Chunks sorted by id.
    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.values()
    }

    /// Chunk by sorted index.
    #[must_use]
    pub fn chunk_by_index(&self, index: usize) -> Option<&Chunk> {
        self.chunks.values().nth(index)
    }

    /// Returns the chunk covering `(cx, cy)`, creating and populating it
    /// through the worldgen providers if needed.
    pub fn ensure_chunk(&mut self, cx: i32, cy: i32) -> ChunkId {
        if let Some(id) = self.find_chunk(cx, cy) {
            return id;
        }
        let id = self.insert_chunk_raw(cx, cy, None);
        crate::worldgen::populate_chunk(self, id);
        id
    }

    /// Inserts a chunk without running worldgen (fresh create or load path).
    pub(crate) fn insert_chunk_raw(&mut self, cx: i32, cy: i32, forced: Option<ChunkId>) -> ChunkId {
        let id = match forced {
            Some(id) => {
                self.chunk_ids.observe(id.raw());
                id
            }
            None => ChunkId(self.chunk_ids.alloc()),
        };
        self.chunks.insert(id, Chunk { id, cx, cy });
        self.chunk_lookup.insert((cx, cy), id);
        id
    }

    /// Advances the world by `ticks`, dispatching subsystems in registration
    /// order. A tick always completes; stalls surface as state flags, never
    /// as aborts.
    pub fn tick(&mut self, ticks: u32) {
        if ticks == 0 {
            return;
        }
        crate::telemetry::tick(self.tick_count, ticks);
        for sub in subsystem::registry() {
            sub.tick(self, ticks);
        }
        self.tick_count = self.tick_count.saturating_add(ticks);
    }

    /// Serializes the world to the canonical TLV stream.
    #[must_use]
    pub fn save(&self) -> Vec<u8> {
        let mut stream = TlvStreamWriter::new();
        for sub in subsystem::registry() {
            let blob = sub.save_instance(self);
            if blob.is_empty() {
                continue;
            }
            let mut kv = TlvKvWriter::new();
            kv.field_u16(wire::KV_SUBSYS, sub.id().code());
            kv.field_bytes(wire::KV_BLOB, &blob);
            stream.push(wire::REC_INSTANCE, u32::from(sub.id().code()), kv.finish());
        }
        for chunk in self.chunks.values() {
            let mut kv = TlvKvWriter::new();
            kv.field_u32(wire::KV_CHUNK_ID, chunk.id.raw());
            let mut any = false;
            for sub in subsystem::registry() {
                let blob = sub.save_chunk(self, chunk.id);
                if blob.is_empty() {
                    continue;
                }
                kv.field_bytes(wire::KV_SUBSYS_BASE + u32::from(sub.id().code()), &blob);
                any = true;
            }
            if any {
                stream.push(wire::REC_CHUNK, chunk.id.raw(), kv.finish());
            }
        }
        stream.finish()
    }

    /// Blake3 digest of the canonical save stream.
    #[must_use]
    pub fn digest(&self) -> WorldDigest {
        WorldDigest(blake3::hash(&self.save()).into())
    }

    /// Rebuilds a world from a canonical save stream.
    ///
    /// Fails atomically: the partial world is discarded on the first
    /// malformed blob.
    pub fn load(seed_hint: u64, content: ContentCatalog, bytes: &[u8]) -> Result<Self, WorldError> {
        let mut world = Self::new(seed_hint, content)?;
        let mut reader = TlvReader::new(bytes);
        while let Some((tag, payload)) = reader.next_record()? {
            match tag {
                wire::REC_INSTANCE => {
                    let kv = TlvKv::new(payload);
                    let code = kv
                        .u16_field(wire::KV_SUBSYS)
                        .ok_or(TlvError::BadHeader { field: "subsystem", value: 0 })?;
                    let sub_id = SubsystemId::from_code(code)
                        .ok_or(WorldError::UnknownSubsystem(u32::from(code)))?;
                    let blob = kv
                        .field(wire::KV_BLOB)
                        .ok_or(TlvError::BadHeader { field: "blob", value: 0 })?;
                    let sub = subsystem::get(sub_id);
                    sub.load_instance(&mut world, blob)
                        .map_err(|source| WorldError::SubsystemLoad { subsystem: sub_id, source })?;
                }
                wire::REC_CHUNK => {
                    let kv = TlvKv::new(payload);
                    let chunk_id = ChunkId(
                        kv.u32_field(wire::KV_CHUNK_ID)
                            .ok_or(TlvError::BadHeader { field: "chunk_id", value: 0 })?,
                    );
                    if !world.chunks.contains_key(&chunk_id) {
                        return Err(WorldError::UnknownChunk(chunk_id));
                    }
                    for sub in subsystem::registry() {
                        let tag = wire::KV_SUBSYS_BASE + u32::from(sub.id().code());
                        if let Some(blob) = kv.field(tag) {
                            sub.load_chunk(&mut world, chunk_id, blob).map_err(|source| {
                                WorldError::SubsystemLoad { subsystem: sub.id(), source }
                            })?;
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(world)
    }

    /// Runs every subsystem's invariant validator.
    pub fn validate(&self) -> Result<(), WorldError> {
        for sub in subsystem::registry() {
            sub.validate(self)?;
        }
        Ok(())
    }
}

/// World/chunk core subsystem: owns the meta blob.
pub struct WorldCore;

impl Subsystem for WorldCore {
    fn id(&self) -> SubsystemId {
        SubsystemId::World
    }

    fn name(&self) -> &'static str {
        "world"
    }

    fn save_instance(&self, world: &World) -> Vec<u8> {
        let mut w = ByteWriter::versioned(wire::WORLD_VERSION);
        w.u64(world.seed);
        w.u32(world.tick_count);
        w.u32(world.chunks.len() as u32);
        for chunk in world.chunks.values() {
            w.u32(chunk.id.raw());
            w.i32(chunk.cx);
            w.i32(chunk.cy);
        }
        w.finish()
    }

    fn load_instance(&self, world: &mut World, bytes: &[u8]) -> Result<(), TlvError> {
        let mut r = ByteReader::new(bytes);
        r.version(wire::WORLD_VERSION)?;
        world.seed = r.u64()?;
        world.tick_count = r.u32()?;
        let count = r.u32()?;
        world.chunks.clear();
        world.chunk_lookup.clear();
        world.chunk_ids = IdAlloc::new();
        for _ in 0..count {
            let id = ChunkId(r.u32()?);
            let cx = r.i32()?;
            let cy = r.i32()?;
            if id.is_none() {
                return Err(TlvError::BadHeader { field: "chunk_id", value: 0 });
            }
            world.insert_chunk_raw(cx, cy, Some(id));
        }
        Ok(())
    }

    fn validate(&self, world: &World) -> Result<(), ValidateError> {
        for chunk in world.chunks.values() {
            if world.find_chunk(chunk.cx, chunk.cy) != Some(chunk.id) {
                return Err(ValidateError {
                    subsystem: SubsystemId::World,
                    invariant: "chunk lookup must mirror the chunk table",
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn chunk_coord_floors_toward_negative() {
        assert_eq!(chunk_coord_of(Fixed64::from_int(3)), 3);
        assert_eq!(chunk_coord_of(Fixed64::from_ratio(7, 2)), 3);
        assert_eq!(chunk_coord_of(Fixed64::from_ratio(-7, 2)), -4);
    }

    #[test]
    fn ensure_chunk_is_idempotent() {
        let mut w = World::new(1, ContentCatalog::new()).unwrap();
        let a = w.ensure_chunk(2, -3);
        let b = w.ensure_chunk(2, -3);
        assert_eq!(a, b);
        assert_eq!(w.chunk_count(), 1);
    }

    #[test]
    fn chunk_ids_resume_after_load() {
        let mut w = World::new(7, ContentCatalog::new()).unwrap();
        w.ensure_chunk(0, 0);
        w.ensure_chunk(1, 0);
        let bytes = w.save();
        let mut loaded = World::load(0, ContentCatalog::new(), &bytes).unwrap();
        assert_eq!(loaded.seed(), 7);
        assert_eq!(loaded.chunk_count(), 2);
        let next = loaded.ensure_chunk(5, 5);
        assert!(next.raw() > 2);
    }
}
