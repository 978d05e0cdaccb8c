// SPDX-License-Identifier: Apache-2.0
//! Resource engine: per-chunk resource channels.
//!
//! Each chunk carries a small table of channel cells, one per resource
//! channel, each handled by one resource model. Callers interact through
//! [`sample_at`] and [`apply_delta`]; the sample's chunk id is a routing hint
//! for the follow-up delta, never a handle into the table.
//!
//! Channels are seeded from deposit protos at chunk population. A chunk with
//! no matching deposits gets one pass-through channel so bulk exchange (e.g.
//! hydrology's fluid coupling) always has somewhere to land.

use std::collections::BTreeMap;

use bytes::Bytes;
use thiserror::Error;

use crate::content::{tags, ContentCatalog, ContentError};
use crate::fixed::{Fixed32, Fixed64};
use crate::ident::{ChannelId, ChunkId, DepositProtoId, MaterialId, TagMask};
use crate::model::{ModelDescriptor, ModelError, ModelFamily, ModelRegistry};
use crate::rng;
use crate::subsystem::{Subsystem, SubsystemId, ValidateError};
use crate::tlv::{ByteReader, ByteWriter, TlvError, TlvKv, TlvReader};
use crate::world::{chunk_coord_of, World};

/// Number of value lanes per channel cell.
pub const RES_VALUE_MAX: usize = 8;

/// Version of the per-chunk resource blob.
const CHUNK_VERSION: u32 = 1;

/// Closed set of resource models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResModel {
    /// No behavior; deltas fall through to clamped component-wise adds.
    PassThrough,
    /// Strata deposits: noise-seeded quantity with optional regeneration.
    Strata,
}

impl ResModel {
    /// Model id of [`ResModel::PassThrough`].
    pub const PASS_THROUGH_ID: u16 = 1;
    /// Model id of [`ResModel::Strata`].
    pub const STRATA_ID: u16 = 2;

    /// Resolves a model id.
    #[must_use]
    pub const fn from_id(id: u16) -> Option<Self> {
        match id {
            Self::PASS_THROUGH_ID => Some(Self::PassThrough),
            Self::STRATA_ID => Some(Self::Strata),
            _ => None,
        }
    }
}

/// Static identity of a channel within a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelDesc {
    /// Stable channel id, data-driven from deposit protos.
    pub channel_id: ChannelId,
    /// Model family code; resource cells use [`ModelFamily::Resource`].
    pub model_family: u16,
    /// Model handling this channel.
    pub model_id: u16,
    /// Channel flag bits.
    pub flags: u16,
}

/// One resource channel cell.
#[derive(Debug, Clone)]
pub struct ChannelCell {
    /// Channel identity.
    pub desc: ChannelDesc,
    /// Content tags inherited from the deposit.
    pub tags: TagMask,
    /// Deposit proto that seeded this cell.
    pub proto_id: DepositProtoId,
    /// Material yielded by this channel.
    pub material_id: MaterialId,
    /// Model parameter KV body.
    pub params: Bytes,
    /// Set once the model computed the first base value.
    pub initialized: bool,
    /// Live values; lane 0 is quantity by convention.
    pub values: [Fixed32; RES_VALUE_MAX],
    /// Pending delta lanes (reserved for staged application).
    pub deltas: [Fixed32; RES_VALUE_MAX],
}

/// Snapshot of one channel at a sample point.
#[derive(Debug, Clone, Copy)]
pub struct ResSample {
    /// Sampled channel.
    pub channel_id: ChannelId,
    /// Model family code.
    pub model_family: u16,
    /// Model id.
    pub model_id: u16,
    /// Chunk the sample came from; routing hint for [`apply_delta`].
    pub chunk: ChunkId,
    /// Sample position.
    pub pos: [Fixed64; 3],
    /// Deposit proto behind the channel.
    pub proto_id: DepositProtoId,
    /// Channel tags.
    pub tags: TagMask,
    /// Values at the sample point.
    pub values: [Fixed32; RES_VALUE_MAX],
}

/// Errors from resource operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ResError {
    /// The sample's routing hint no longer resolves to a cell.
    #[error("no cell for channel {channel:?} in chunk {chunk}")]
    NoSuchCell {
        /// Channel that was sampled.
        channel: ChannelId,
        /// Chunk hint from the sample.
        chunk: ChunkId,
    },
}

/// Per-world resource tables.
#[derive(Debug, Clone, Default)]
pub struct ResState {
    /// Channel cells per chunk, sorted by channel id.
    pub(crate) chunks: BTreeMap<ChunkId, Vec<ChannelCell>>,
}

/// Strata model parameters, KV-decoded from the deposit proto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StrataParams {
    mean_grade: Fixed32,
    mean_quantity: Fixed32,
    noise_scale: Fixed32,
    regen_rate: Fixed32,
}

impl StrataParams {
    fn parse(params: &[u8]) -> Self {
        let kv = TlvKv::new(params);
        Self {
            mean_grade: kv
                .fixed32_field(tags::deposit::strata::MEAN_GRADE)
                .unwrap_or(Fixed32::ONE),
            mean_quantity: kv
                .fixed32_field(tags::deposit::strata::MEAN_QUANTITY)
                .unwrap_or(Fixed32::ZERO),
            noise_scale: kv
                .fixed32_field(tags::deposit::strata::NOISE_SCALE)
                .unwrap_or(Fixed32::ZERO),
            regen_rate: kv
                .fixed32_field(tags::deposit::strata::REGEN_RATE)
                .unwrap_or(Fixed32::ZERO),
        }
    }
}

fn strata_hash(seed: u64, cx: i32, cy: i32, proto: DepositProtoId, pos: [Fixed64; 3]) -> u32 {
    let mut h = (seed ^ (seed >> 32)) as u32;
    h = rng::mix_extend(h, proto.raw());
    h = rng::mix_extend(h, cx as u32);
    h = rng::mix_extend(h, cy as u32);
    h ^= cx.wrapping_mul(31).wrapping_add(cy.wrapping_mul(17)).wrapping_add(proto.raw() as i32)
        as u32;
    h = rng::mix_extend(h, (pos[0].raw() >> 32) as u32);
    h = rng::mix_extend(h, (pos[1].raw() >> 32) as u32);
    h = rng::mix_extend(h, (pos[2].raw() >> 32) as u32);
    h
}

fn strata_compute_base(seed: u64, cx: i32, cy: i32, cell: &mut ChannelCell, pos: [Fixed64; 3]) {
    let params = StrataParams::parse(&cell.params);
    if !cell.initialized {
        let noise = rng::unit_noise(strata_hash(seed, cx, cy, cell.proto_id, pos));
        let multiplier = Fixed32::ONE.add(params.noise_scale.mul(noise));
        let base = params.mean_quantity.mul(params.mean_grade);
        cell.values[0] = base.mul(multiplier).max(Fixed32::ZERO);
        cell.initialized = true;
    }
    cell.values[0] = cell.values[0].max(Fixed32::ZERO);
}

fn strata_tick(cell: &mut ChannelCell, ticks: u32) {
    let params = StrataParams::parse(&cell.params);
    if params.regen_rate != Fixed32::ZERO {
        let add = params.regen_rate.mul_ticks(ticks);
        cell.values[0] = cell.values[0].add(add).max(Fixed32::ZERO);
    }
}

/// Component-wise delta with the non-negativity clamp. Both the pass-through
/// fallback and the strata model share this application rule.
fn apply_delta_cells(cell: &mut ChannelCell, delta: &[Fixed32; RES_VALUE_MAX]) {
    for (v, d) in cell.values.iter_mut().zip(delta.iter()) {
        *v = v.add(*d).max(Fixed32::ZERO);
    }
}

fn resolve_model(models: &ModelRegistry, model_id: u16) -> Option<ResModel> {
    models.get(ModelFamily::Resource, model_id)?;
    ResModel::from_id(model_id)
}

/// Seeds channel cells for a freshly created chunk (worldgen provider).
pub(crate) fn populate_chunk(world: &mut World, chunk: ChunkId) {
    if world.res.chunks.contains_key(&chunk) {
        return;
    }
    let mut cells: Vec<ChannelCell> = Vec::new();
    for deposit in world.content.deposits() {
        if cells.iter().any(|c| c.desc.channel_id == deposit.channel_id) {
            continue;
        }
        cells.push(ChannelCell {
            desc: ChannelDesc {
                channel_id: deposit.channel_id,
                model_family: ModelFamily::Resource.code(),
                model_id: ResModel::STRATA_ID,
                flags: 0,
            },
            tags: deposit.tags,
            proto_id: deposit.id,
            material_id: deposit.material_id,
            params: deposit.params.clone(),
            initialized: false,
            values: [Fixed32::ZERO; RES_VALUE_MAX],
            deltas: [Fixed32::ZERO; RES_VALUE_MAX],
        });
    }
    if cells.is_empty() {
        cells.push(ChannelCell {
            desc: ChannelDesc {
                channel_id: ChannelId(1),
                model_family: ModelFamily::Resource.code(),
                model_id: ResModel::PASS_THROUGH_ID,
                flags: 0,
            },
            tags: 0,
            proto_id: DepositProtoId::NONE,
            material_id: MaterialId::NONE,
            params: Bytes::new(),
            initialized: false,
            values: [Fixed32::ZERO; RES_VALUE_MAX],
            deltas: [Fixed32::ZERO; RES_VALUE_MAX],
        });
    }
    cells.sort_by_key(|c| c.desc.channel_id);
    world.res.chunks.insert(chunk, cells);
}

/// Samples all channels covering a world position.
///
/// Creates and populates the covering chunk on demand. `channel_mask` of zero
/// samples every channel; a non-zero mask selects channels whose id maps onto
/// a set bit (`channel 1 → bit 0`, up to channel 16).
pub fn sample_at(world: &mut World, x: Fixed64, y: Fixed64, z: Fixed64, channel_mask: u16) -> Vec<ResSample> {
    let cx = chunk_coord_of(x);
    let cy = chunk_coord_of(y);
    let chunk = world.ensure_chunk(cx, cy);
    let seed = world.seed;
    let (models, res) = (&world.models, &mut world.res);
    let Some(cells) = res.chunks.get_mut(&chunk) else {
        return Vec::new();
    };
    let mut out = Vec::with_capacity(cells.len());
    for cell in cells.iter_mut() {
        let id = cell.desc.channel_id.raw();
        if channel_mask != 0 && (id == 0 || id > 16 || channel_mask & (1_u16 << (id - 1)) == 0) {
            continue;
        }
        if let Some(ResModel::Strata) = resolve_model(models, cell.desc.model_id) {
            strata_compute_base(seed, cx, cy, cell, [x, y, z]);
        }
        out.push(ResSample {
            channel_id: cell.desc.channel_id,
            model_family: cell.desc.model_family,
            model_id: cell.desc.model_id,
            chunk,
            pos: [x, y, z],
            proto_id: cell.proto_id,
            tags: cell.tags,
            values: cell.values,
        });
    }
    out
}

/// Applies a delta to a previously sampled channel.
///
/// Dispatches to the channel's model; the pass-through fallback applies the
/// delta component-wise. Values never drop below zero either way.
pub fn apply_delta(
    world: &mut World,
    sample: &ResSample,
    delta: &[Fixed32; RES_VALUE_MAX],
    seed_context: u32,
) -> Result<(), ResError> {
    let _ = seed_context;
    let (models, res) = (&world.models, &mut world.res);
    let cells = res.chunks.get_mut(&sample.chunk).ok_or(ResError::NoSuchCell {
        channel: sample.channel_id,
        chunk: sample.chunk,
    })?;
    let cell = cells
        .iter_mut()
        .find(|c| c.desc.channel_id == sample.channel_id)
        .ok_or(ResError::NoSuchCell { channel: sample.channel_id, chunk: sample.chunk })?;
    // Every registered model and the fallback share the clamped
    // component-wise application rule.
    let _ = resolve_model(models, cell.desc.model_id);
    apply_delta_cells(cell, delta);
    Ok(())
}

fn tick_cells(world: &mut World, ticks: u32) {
    let (models, res) = (&world.models, &mut world.res);
    for cells in res.chunks.values_mut() {
        for cell in cells.iter_mut() {
            if let Some(ResModel::Strata) = resolve_model(models, cell.desc.model_id) {
                strata_tick(cell, ticks);
            }
        }
    }
}

/// Resource subsystem entry.
pub struct ResourceSubsystem;

impl Subsystem for ResourceSubsystem {
    fn id(&self) -> SubsystemId {
        SubsystemId::Resource
    }

    fn name(&self) -> &'static str {
        "res"
    }

    fn register_models(&self, models: &mut ModelRegistry) -> Result<(), ModelError> {
        models.register(ModelDescriptor {
            family: ModelFamily::Resource,
            id: ResModel::PASS_THROUGH_ID,
            name: "res_pass_through",
            version: 1,
        })?;
        models.register(ModelDescriptor {
            family: ModelFamily::Resource,
            id: ResModel::STRATA_ID,
            name: "res_strata_solid",
            version: 1,
        })
    }

    fn load_protos(&self, content: &ContentCatalog) -> Result<(), ContentError> {
        // Strata params must at least be well-formed TLV; decode failures
        // here are content bugs, not worldgen-time surprises.
        for deposit in content.deposits() {
            let mut r = TlvReader::new(&deposit.params);
            loop {
                let next = r.next_record().map_err(|_| ContentError::InvalidProto {
                    kind: "deposit",
                    id: deposit.id.raw(),
                    reason: "malformed strata params",
                })?;
                if next.is_none() {
                    break;
                }
            }
        }
        Ok(())
    }

    fn init_instance(&self, world: &mut World) {
        world.res = ResState::default();
    }

    fn tick(&self, world: &mut World, ticks: u32) {
        if ticks == 0 {
            return;
        }
        tick_cells(world, ticks);
    }

    fn save_chunk(&self, world: &World, chunk: ChunkId) -> Vec<u8> {
        let Some(cells) = world.res.chunks.get(&chunk) else {
            return Vec::new();
        };
        if cells.is_empty() {
            return Vec::new();
        }
        let mut w = ByteWriter::versioned(CHUNK_VERSION);
        w.u32(cells.len() as u32);
        for cell in cells {
            w.u16(cell.desc.channel_id.raw());
            w.u16(cell.desc.model_family);
            w.u16(cell.desc.model_id);
            w.u16(cell.desc.flags);
            w.u32(cell.proto_id.raw());
            w.u32(cell.material_id.raw());
            w.u32(cell.tags);
            w.u8(u8::from(cell.initialized));
            w.blob(&cell.params);
            for v in cell.values {
                w.fixed32(v);
            }
            for d in cell.deltas {
                w.fixed32(d);
            }
        }
        w.finish()
    }

    fn load_chunk(&self, world: &mut World, chunk: ChunkId, bytes: &[u8]) -> Result<(), TlvError> {
        let mut r = ByteReader::new(bytes);
        r.version(CHUNK_VERSION)?;
        let count = r.u32()?;
        let mut cells = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let channel_id = ChannelId(r.u16()?);
            let model_family = r.u16()?;
            let model_id = r.u16()?;
            let flags = r.u16()?;
            let proto_id = DepositProtoId(r.u32()?);
            let material_id = MaterialId(r.u32()?);
            let tags_mask = r.u32()?;
            let initialized = r.u8()? != 0;
            let params = Bytes::copy_from_slice(r.blob()?);
            let mut values = [Fixed32::ZERO; RES_VALUE_MAX];
            for v in &mut values {
                *v = r.fixed32()?;
            }
            let mut deltas = [Fixed32::ZERO; RES_VALUE_MAX];
            for d in &mut deltas {
                *d = r.fixed32()?;
            }
            cells.push(ChannelCell {
                desc: ChannelDesc { channel_id, model_family, model_id, flags },
                tags: tags_mask,
                proto_id,
                material_id,
                params,
                initialized,
                values,
                deltas,
            });
        }
        cells.sort_by_key(|c| c.desc.channel_id);
        world.res.chunks.insert(chunk, cells);
        Ok(())
    }

    fn validate(&self, world: &World) -> Result<(), ValidateError> {
        for cells in world.res.chunks.values() {
            for pair in cells.windows(2) {
                if pair[0].desc.channel_id >= pair[1].desc.channel_id {
                    return Err(ValidateError {
                        subsystem: SubsystemId::Resource,
                        invariant: "channel cells must be strictly ascending by channel id",
                    });
                }
            }
            for cell in cells {
                if cell.values.iter().any(|v| Fixed32::is_negative(*v)) {
                    return Err(ValidateError {
                        subsystem: SubsystemId::Resource,
                        invariant: "channel values must stay non-negative",
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::content::proto::DepositProto;
    use crate::tlv::TlvKvWriter;

    fn catalog_with_deposit(mean_quantity: i32, regen_milli: i32) -> ContentCatalog {
        let mut params = TlvKvWriter::new();
        params.field_fixed32(tags::deposit::strata::MEAN_QUANTITY, Fixed32::from_int(mean_quantity));
        params.field_fixed32(
            tags::deposit::strata::REGEN_RATE,
            Fixed32::from_ratio(regen_milli, 1000),
        );
        let mut catalog = ContentCatalog::new();
        catalog.add_deposit(DepositProto {
            id: DepositProtoId(1),
            name: "iron".into(),
            tags: 0,
            channel_id: ChannelId(3),
            material_id: MaterialId::NONE,
            params: Bytes::from(params.finish()),
        });
        catalog
    }

    #[test]
    fn sample_initializes_strata_quantity_once() {
        let mut world = World::new(42, catalog_with_deposit(100, 0)).unwrap();
        let first = sample_at(&mut world, Fixed64::from_int(1), Fixed64::from_int(1), Fixed64::ZERO, 0);
        assert_eq!(first.len(), 1);
        assert!(first[0].values[0] >= Fixed32::ZERO);
        let again =
            sample_at(&mut world, Fixed64::from_int(1), Fixed64::from_int(1), Fixed64::ZERO, 0);
        assert_eq!(first[0].values[0], again[0].values[0]);
    }

    #[test]
    fn same_seed_same_quantity() {
        let mut a = World::new(9, catalog_with_deposit(50, 0)).unwrap();
        let mut b = World::new(9, catalog_with_deposit(50, 0)).unwrap();
        let sa = sample_at(&mut a, Fixed64::from_int(4), Fixed64::from_int(-2), Fixed64::ZERO, 0);
        let sb = sample_at(&mut b, Fixed64::from_int(4), Fixed64::from_int(-2), Fixed64::ZERO, 0);
        assert_eq!(sa[0].values[0], sb[0].values[0]);
    }

    #[test]
    fn delta_clamps_at_zero() {
        let mut world = World::new(1, catalog_with_deposit(10, 0)).unwrap();
        let s = sample_at(&mut world, Fixed64::ZERO, Fixed64::ZERO, Fixed64::ZERO, 0);
        let mut delta = [Fixed32::ZERO; RES_VALUE_MAX];
        delta[0] = Fixed32::from_int(-1_000_000);
        apply_delta(&mut world, &s[0], &delta, 0).unwrap();
        let after = sample_at(&mut world, Fixed64::ZERO, Fixed64::ZERO, Fixed64::ZERO, 0);
        assert_eq!(after[0].values[0], Fixed32::ZERO);
    }

    #[test]
    fn regen_accrues_per_tick() {
        let mut world = World::new(1, catalog_with_deposit(0, 250)).unwrap();
        let s = sample_at(&mut world, Fixed64::ZERO, Fixed64::ZERO, Fixed64::ZERO, 0);
        assert_eq!(s[0].values[0], Fixed32::ZERO);
        world.tick(8);
        let after = sample_at(&mut world, Fixed64::ZERO, Fixed64::ZERO, Fixed64::ZERO, 0);
        assert_eq!(after[0].values[0], Fixed32::from_int(2));
    }
}
