// SPDX-License-Identifier: Apache-2.0
//! Environment: per-chunk atmosphere fields and the interior volume graph.
//!
//! Two coupled models:
//!
//! - **Field cells.** One cell per `(field_id, model_id)` per chunk. The
//!   default atmosphere derives a baseline from the seed/coordinate mix hash
//!   and relaxes the live value toward it each tick; temperature also gets a
//!   triangle-wave diurnal forcing. Neighboring chunks diffuse pressure and
//!   temperature across the +x/+y seams.
//! - **Volumes.** Axis-aligned interior boxes owned by structures or
//!   vehicles, connected by conductance edges. An edge with `b = 0` couples
//!   to the exterior, sampled at the volume centroid without the interior
//!   override.
//!
//! Sampling at a point overlays the interior state of the containing volume
//! (smallest id wins) on the applicable fields.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::fixed::Fixed32;
use crate::fixed::Fixed64;
use crate::ident::{ChunkId, EntityId, IdAlloc, StructureId, VolumeId};
use crate::model::{ModelDescriptor, ModelError, ModelFamily, ModelRegistry};
use crate::rng;
use crate::subsystem::{Subsystem, SubsystemId, ValidateError};
use crate::tlv::{ByteReader, ByteWriter, TlvError};
use crate::world::{chunk_coord_of, World};

/// Field id: atmospheric pressure.
pub const FIELD_PRESSURE: u16 = 1;
/// Field id: temperature.
pub const FIELD_TEMPERATURE: u16 = 2;
/// Field id: primary gas fraction.
pub const FIELD_GAS0_FRACTION: u16 = 3;
/// Field id: secondary gas fraction.
pub const FIELD_GAS1_FRACTION: u16 = 4;
/// Field id: humidity.
pub const FIELD_HUMIDITY: u16 = 5;
/// Field id: wind x component.
pub const FIELD_WIND_X: u16 = 6;
/// Field id: wind y component.
pub const FIELD_WIND_Y: u16 = 7;

/// Value lanes per field cell; lane 0 is current, lane 3 the baseline.
pub const ENV_VALUE_MAX: usize = 4;

/// Diurnal forcing period in ticks.
const DIURNAL_PERIOD: u32 = 24_000;

const CHUNK_VERSION: u32 = 1;
const INSTANCE_VERSION: u32 = 1;

/// Closed set of environment field models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvModel {
    /// Default atmosphere: hashed baseline, relaxation, diurnal wave.
    AtmosphereDefault,
}

impl EnvModel {
    /// Model id of [`EnvModel::AtmosphereDefault`].
    pub const ATMOSPHERE_DEFAULT_ID: u16 = 1;

    /// Resolves a model id.
    #[must_use]
    pub const fn from_id(id: u16) -> Option<Self> {
        match id {
            Self::ATMOSPHERE_DEFAULT_ID => Some(Self::AtmosphereDefault),
            _ => None,
        }
    }
}

/// Static identity of a field cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDesc {
    /// Which field this cell carries.
    pub field_id: u16,
    /// Model handling the cell.
    pub model_id: u16,
    /// Flag bits.
    pub flags: u16,
}

/// One per-chunk field cell.
#[derive(Debug, Clone, Copy)]
pub struct FieldCell {
    /// Cell identity.
    pub desc: FieldDesc,
    /// Lane 0 current value, lane 3 baseline target.
    pub values: [Fixed32; ENV_VALUE_MAX],
}

/// Snapshot of one field at a sample point.
#[derive(Debug, Clone, Copy)]
pub struct EnvSample {
    /// Sampled field.
    pub field_id: u16,
    /// Model behind the cell.
    pub model_id: u16,
    /// Lane 0 current value, lane 3 baseline.
    pub values: [Fixed32; ENV_VALUE_MAX],
}

/// Interior volume: an axis-aligned box with its own gas state.
#[derive(Debug, Clone, Copy)]
pub struct Volume {
    /// Stable id.
    pub id: VolumeId,
    /// Box minimum corner.
    pub min: [Fixed64; 3],
    /// Box maximum corner.
    pub max: [Fixed64; 3],
    /// Owning structure; volumes die with their owner.
    pub owner_struct: StructureId,
    /// Owning vehicle entity, for volumes carried by vehicles.
    pub owner_vehicle: EntityId,
    /// Interior pressure.
    pub pressure: Fixed32,
    /// Interior temperature.
    pub temperature: Fixed32,
    /// Interior primary gas fraction.
    pub gas0: Fixed32,
    /// Interior secondary gas fraction.
    pub gas1: Fixed32,
    /// Interior humidity.
    pub humidity: Fixed32,
    /// Interior pollutant load.
    pub pollutant: Fixed32,
}

impl Volume {
    /// `true` if the point lies inside the box (inclusive).
    #[must_use]
    pub fn contains(&self, p: [Fixed64; 3]) -> bool {
        (0..3).all(|i| p[i] >= self.min[i] && p[i] <= self.max[i])
    }

    /// Box centroid.
    #[must_use]
    pub fn centroid(&self) -> [Fixed64; 3] {
        [
            Fixed64::from_raw((self.min[0].raw() + self.max[0].raw()) >> 1),
            Fixed64::from_raw((self.min[1].raw() + self.max[1].raw()) >> 1),
            Fixed64::from_raw((self.min[2].raw() + self.max[2].raw()) >> 1),
        ]
    }
}

/// Conductance edge between two volumes, or a volume and the exterior
/// (`b = NONE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeEdge {
    /// First endpoint; must be a live volume.
    pub a: VolumeId,
    /// Second endpoint; `NONE` couples `a` to the exterior.
    pub b: VolumeId,
    /// Gas conductance, drives pressure/gas/humidity/pollutant transfer.
    pub gas_k: Fixed32,
    /// Heat conductance, drives temperature transfer.
    pub heat_k: Fixed32,
}

/// Errors from volume operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EnvError {
    /// Edge endpoint does not resolve to a live volume.
    #[error("edge endpoint {0} is not a live volume")]
    NoSuchVolume(VolumeId),

    /// Degenerate box: a min exceeds the corresponding max.
    #[error("volume box is inverted")]
    InvertedBox,
}

/// Per-world environment tables.
#[derive(Debug, Clone, Default)]
pub struct EnvState {
    pub(crate) chunks: BTreeMap<ChunkId, Vec<FieldCell>>,
    pub(crate) volumes: BTreeMap<VolumeId, Volume>,
    pub(crate) edges: Vec<VolumeEdge>,
    pub(crate) volume_ids: IdAlloc,
}

/// Triangle wave with the given period and amplitude, evaluated at `t`.
fn triangle_wave(t: u32, period: u32, amplitude: Fixed32) -> Fixed32 {
    if period == 0 {
        return Fixed32::ZERO;
    }
    let half = period / 2;
    if half == 0 {
        return Fixed32::ZERO;
    }
    let phase = t % period;
    let signed_unit = if phase < half { phase as i32 } else { (period - phase) as i32 };
    let signed_unit = signed_unit * 2 - half as i32;
    let unit = Fixed32::from_ratio(signed_unit, half as i32);
    unit.mul(amplitude)
}

fn atmo_baseline(seed: u64, cx: i32, cy: i32, field_id: u16) -> Fixed32 {
    let h = rng::mix_seed_coords(seed, cx, cy);
    let altitude = Fixed32::from_int((h % 2000) as i32);
    match field_id {
        FIELD_PRESSURE => {
            Fixed32::from_int(101).sub(Fixed32::from_raw(altitude.raw() >> 18))
        }
        FIELD_TEMPERATURE => {
            Fixed32::from_int(15).sub(Fixed32::from_raw(altitude.raw() >> 17))
        }
        FIELD_GAS0_FRACTION => Fixed32::from_ratio(21, 100),
        FIELD_GAS1_FRACTION => Fixed32::from_ratio(4, 10_000),
        FIELD_HUMIDITY => Fixed32::from_ratio(1, 2),
        _ => Fixed32::ZERO,
    }
}

fn atmo_tick_cell(cell: &mut FieldCell, t: u32, ticks: u32) {
    let relax = Fixed32::from_int(ticks as i32);
    match cell.desc.field_id {
        FIELD_TEMPERATURE => {
            let desired = cell.values[3]
                .add(triangle_wave(t, DIURNAL_PERIOD, Fixed32::from_int(8)));
            let diff = desired.sub(cell.values[0]);
            cell.values[0] =
                cell.values[0].add(Fixed32::from_raw(diff.raw() >> 4).mul(relax));
        }
        FIELD_PRESSURE | FIELD_HUMIDITY | FIELD_GAS0_FRACTION | FIELD_GAS1_FRACTION => {
            let diff = cell.values[3].sub(cell.values[0]);
            cell.values[0] =
                cell.values[0].add(Fixed32::from_raw(diff.raw() >> 6).mul(relax));
        }
        // Winds stay near zero.
        _ => {}
    }
}

/// Seeds atmosphere field cells for a fresh chunk (worldgen provider).
pub(crate) fn populate_chunk(world: &mut World, chunk: ChunkId) {
    if world.env.chunks.contains_key(&chunk) {
        return;
    }
    let Some(c) = world.chunk(chunk).copied() else {
        return;
    };
    let seed = world.seed;
    let mut cells = Vec::with_capacity(7);
    for field_id in [
        FIELD_PRESSURE,
        FIELD_TEMPERATURE,
        FIELD_GAS0_FRACTION,
        FIELD_GAS1_FRACTION,
        FIELD_HUMIDITY,
        FIELD_WIND_X,
        FIELD_WIND_Y,
    ] {
        let base = atmo_baseline(seed, c.cx, c.cy, field_id);
        cells.push(FieldCell {
            desc: FieldDesc {
                field_id,
                model_id: EnvModel::ATMOSPHERE_DEFAULT_ID,
                flags: 0,
            },
            values: [base, Fixed32::ZERO, Fixed32::ZERO, base],
        });
    }
    world.env.chunks.insert(chunk, cells);
}

fn sample_fields(world: &mut World, x: Fixed64, y: Fixed64) -> Vec<EnvSample> {
    let chunk = world.ensure_chunk(chunk_coord_of(x), chunk_coord_of(y));
    let Some(cells) = world.env.chunks.get(&chunk) else {
        return Vec::new();
    };
    cells
        .iter()
        .map(|cell| EnvSample {
            field_id: cell.desc.field_id,
            model_id: cell.desc.model_id,
            values: cell.values,
        })
        .collect()
}

/// Samples environment fields at a point, bypassing interior volumes.
pub fn sample_exterior_at(world: &mut World, x: Fixed64, y: Fixed64, z: Fixed64) -> Vec<EnvSample> {
    let _ = z;
    sample_fields(world, x, y)
}

/// Samples environment fields at a point, overlaying the interior state of
/// the containing volume, if any.
pub fn sample_at(world: &mut World, x: Fixed64, y: Fixed64, z: Fixed64) -> Vec<EnvSample> {
    let mut samples = sample_fields(world, x, y);
    let p = [x, y, z];
    let Some(vol) = world.env.volumes.values().find(|v| v.contains(p)) else {
        return samples;
    };
    for s in &mut samples {
        let value = match s.field_id {
            FIELD_PRESSURE => vol.pressure,
            FIELD_TEMPERATURE => vol.temperature,
            FIELD_GAS0_FRACTION => vol.gas0,
            FIELD_GAS1_FRACTION => vol.gas1,
            FIELD_HUMIDITY => vol.humidity,
            _ => continue,
        };
        s.values[0] = value;
    }
    samples
}

/// Creates an interior volume; the id in `init` is ignored.
pub fn volume_create(world: &mut World, init: &Volume) -> Result<VolumeId, EnvError> {
    if (0..3).any(|i| init.min[i] > init.max[i]) {
        return Err(EnvError::InvertedBox);
    }
    let id = VolumeId(world.env.volume_ids.alloc());
    let mut vol = *init;
    vol.id = id;
    world.env.volumes.insert(id, vol);
    Ok(id)
}

/// Destroys a volume and every edge touching it.
pub fn volume_destroy(world: &mut World, id: VolumeId) -> Result<(), EnvError> {
    if world.env.volumes.remove(&id).is_none() {
        return Err(EnvError::NoSuchVolume(id));
    }
    world.env.edges.retain(|e| e.a != id && e.b != id);
    Ok(())
}

/// Removes every volume owned by the given structure/vehicle, with their
/// edges. Returns how many volumes went away.
pub fn volume_remove_owned_by(world: &mut World, owner_struct: StructureId, owner_vehicle: EntityId) -> usize {
    let doomed: Vec<VolumeId> = world
        .env
        .volumes
        .values()
        .filter(|v| {
            (owner_struct.is_some() && v.owner_struct == owner_struct)
                || (owner_vehicle.is_some() && v.owner_vehicle == owner_vehicle)
        })
        .map(|v| v.id)
        .collect();
    for id in &doomed {
        world.env.volumes.remove(id);
        world.env.edges.retain(|e| e.a != *id && e.b != *id);
    }
    doomed.len()
}

/// Adds a conductance edge. Endpoint `b = NONE` couples to the exterior.
pub fn volume_add_edge(world: &mut World, edge: VolumeEdge) -> Result<(), EnvError> {
    if !world.env.volumes.contains_key(&edge.a) {
        return Err(EnvError::NoSuchVolume(edge.a));
    }
    if edge.b.is_some() && !world.env.volumes.contains_key(&edge.b) {
        return Err(EnvError::NoSuchVolume(edge.b));
    }
    world.env.edges.push(edge);
    world.env.edges.sort_by_key(|e| (e.a, e.b));
    Ok(())
}

/// Volume by id.
#[must_use]
pub fn volume_get(world: &World, id: VolumeId) -> Option<&Volume> {
    world.env.volumes.get(&id)
}

/// Number of live volumes.
#[must_use]
pub fn volume_count(world: &World) -> usize {
    world.env.volumes.len()
}

/// Volume by sorted index.
#[must_use]
pub fn volume_get_by_index(world: &World, index: usize) -> Option<&Volume> {
    world.env.volumes.values().nth(index)
}

/// Smallest-id volume containing the point, if any.
#[must_use]
pub fn volume_find_at(world: &World, x: Fixed64, y: Fixed64, z: Fixed64) -> Option<VolumeId> {
    let p = [x, y, z];
    world.env.volumes.values().find(|v| v.contains(p)).map(|v| v.id)
}

fn tick_field_cells(world: &mut World, ticks: u32) {
    let t = world.tick_count.wrapping_add((world.seed & 0xFFFF_FFFF) as u32);
    for cells in world.env.chunks.values_mut() {
        for cell in cells.iter_mut() {
            if EnvModel::from_id(cell.desc.model_id) == Some(EnvModel::AtmosphereDefault) {
                atmo_tick_cell(cell, t, ticks);
            }
        }
    }
}

fn tick_diffusion(world: &mut World, ticks: u32) {
    // Snapshot (pressure, temperature) per chunk, then exchange with the +x
    // and +y neighbors off the snapshot so visit order cannot matter.
    let mut snap: BTreeMap<ChunkId, (Fixed32, Fixed32)> = BTreeMap::new();
    for (id, cells) in &world.env.chunks {
        let mut p = Fixed32::ZERO;
        let mut t = Fixed32::ZERO;
        for cell in cells {
            match cell.desc.field_id {
                FIELD_PRESSURE => p = cell.values[0],
                FIELD_TEMPERATURE => t = cell.values[0],
                _ => {}
            }
        }
        snap.insert(*id, (p, t));
    }

    let mut deltas: BTreeMap<ChunkId, (Fixed32, Fixed32)> = BTreeMap::new();
    let coords: Vec<(ChunkId, i32, i32)> =
        world.chunks().map(|c| (c.id, c.cx, c.cy)).collect();
    for (id, cx, cy) in &coords {
        for (nx, ny) in [(*cx + 1, *cy), (*cx, *cy + 1)] {
            let Some(nbr) = world.find_chunk(nx, ny) else {
                continue;
            };
            let (Some(&(sp, st)), Some(&(np, nt))) = (snap.get(id), snap.get(&nbr)) else {
                continue;
            };
            let tp = Fixed32::from_raw(sp.sub(np).raw() >> 3).mul_ticks(ticks);
            let tt = Fixed32::from_raw(st.sub(nt).raw() >> 3).mul_ticks(ticks);
            let d = deltas.entry(*id).or_insert((Fixed32::ZERO, Fixed32::ZERO));
            d.0 = d.0.sub(tp);
            d.1 = d.1.sub(tt);
            let d = deltas.entry(nbr).or_insert((Fixed32::ZERO, Fixed32::ZERO));
            d.0 = d.0.add(tp);
            d.1 = d.1.add(tt);
        }
    }

    for (id, (dp, dt)) in deltas {
        let Some(cells) = world.env.chunks.get_mut(&id) else {
            continue;
        };
        for cell in cells.iter_mut() {
            match cell.desc.field_id {
                FIELD_PRESSURE => cell.values[0] = cell.values[0].add(dp),
                FIELD_TEMPERATURE => cell.values[0] = cell.values[0].add(dt),
                _ => {}
            }
        }
    }
}

fn tick_volumes(world: &mut World, ticks: u32) {
    if world.env.volumes.is_empty() {
        return;
    }

    // Exterior samples first: they may create chunks, which needs &mut World.
    let edges = world.env.edges.clone();
    let mut exterior: Vec<Option<(Fixed32, Fixed32, Fixed32, Fixed32, Fixed32)>> =
        Vec::with_capacity(edges.len());
    for e in &edges {
        if e.b.is_some() {
            exterior.push(None);
            continue;
        }
        let Some(centroid) = world.env.volumes.get(&e.a).map(Volume::centroid) else {
            exterior.push(None);
            continue;
        };
        let samples = sample_exterior_at(world, centroid[0], centroid[1], centroid[2]);
        let mut ext = (Fixed32::ZERO, Fixed32::ZERO, Fixed32::ZERO, Fixed32::ZERO, Fixed32::ZERO);
        for s in samples {
            match s.field_id {
                FIELD_PRESSURE => ext.0 = s.values[0],
                FIELD_TEMPERATURE => ext.1 = s.values[0],
                FIELD_GAS0_FRACTION => ext.2 = s.values[0],
                FIELD_GAS1_FRACTION => ext.3 = s.values[0],
                FIELD_HUMIDITY => ext.4 = s.values[0],
                _ => {}
            }
        }
        exterior.push(Some(ext));
    }

    let mut deltas: BTreeMap<VolumeId, [Fixed32; 6]> = BTreeMap::new();
    for (e, ext) in edges.iter().zip(exterior.iter()) {
        let Some(a) = world.env.volumes.get(&e.a).copied() else {
            continue;
        };
        let push = |deltas: &mut BTreeMap<VolumeId, [Fixed32; 6]>,
                    id: VolumeId,
                    lane: usize,
                    v: Fixed32| {
            let d = deltas.entry(id).or_insert([Fixed32::ZERO; 6]);
            d[lane] = d[lane].add(v);
        };
        if let Some(b) = world.env.volumes.get(&e.b).copied() {
            let lanes = [
                (0, b.pressure.sub(a.pressure), e.gas_k),
                (1, b.temperature.sub(a.temperature), e.heat_k),
                (2, b.gas0.sub(a.gas0), e.gas_k),
                (3, b.gas1.sub(a.gas1), e.gas_k),
                (4, b.humidity.sub(a.humidity), e.gas_k),
                (5, b.pollutant.sub(a.pollutant), e.gas_k),
            ];
            for (lane, diff, k) in lanes {
                let transfer = diff.mul(k).mul_ticks(ticks);
                push(&mut deltas, e.a, lane, transfer);
                push(&mut deltas, e.b, lane, transfer.neg());
            }
        } else if let Some((ep, et, eg0, eg1, eh)) = ext {
            // Exterior is an infinite reservoir: only the volume moves. The
            // pollutant lane dissipates toward zero outside.
            let lanes = [
                (0, ep.sub(a.pressure), e.gas_k),
                (1, et.sub(a.temperature), e.heat_k),
                (2, eg0.sub(a.gas0), e.gas_k),
                (3, eg1.sub(a.gas1), e.gas_k),
                (4, eh.sub(a.humidity), e.gas_k),
                (5, Fixed32::ZERO.sub(a.pollutant), e.gas_k),
            ];
            for (lane, diff, k) in lanes {
                push(&mut deltas, e.a, lane, diff.mul(k).mul_ticks(ticks));
            }
        }
    }

    for (id, d) in deltas {
        let Some(vol) = world.env.volumes.get_mut(&id) else {
            continue;
        };
        vol.pressure = vol.pressure.add(d[0]);
        vol.temperature = vol.temperature.add(d[1]);
        vol.gas0 = vol.gas0.add(d[2]).max(Fixed32::ZERO);
        vol.gas1 = vol.gas1.add(d[3]).max(Fixed32::ZERO);
        vol.humidity = vol.humidity.add(d[4]).max(Fixed32::ZERO);
        vol.pollutant = vol.pollutant.add(d[5]).max(Fixed32::ZERO);
    }
}

/// Environment subsystem entry.
pub struct EnvironmentSubsystem;

impl Subsystem for EnvironmentSubsystem {
    fn id(&self) -> SubsystemId {
        SubsystemId::Environment
    }

    fn name(&self) -> &'static str {
        "env"
    }

    fn register_models(&self, models: &mut ModelRegistry) -> Result<(), ModelError> {
        models.register(ModelDescriptor {
            family: ModelFamily::Environment,
            id: EnvModel::ATMOSPHERE_DEFAULT_ID,
            name: "env_atmosphere_default",
            version: 1,
        })
    }

    fn init_instance(&self, world: &mut World) {
        world.env = EnvState::default();
    }

    fn tick(&self, world: &mut World, ticks: u32) {
        if ticks == 0 {
            return;
        }
        tick_field_cells(world, ticks);
        tick_diffusion(world, ticks);
        tick_volumes(world, ticks);
    }

    fn save_chunk(&self, world: &World, chunk: ChunkId) -> Vec<u8> {
        let Some(cells) = world.env.chunks.get(&chunk) else {
            return Vec::new();
        };
        if cells.is_empty() {
            return Vec::new();
        }
        let mut w = ByteWriter::versioned(CHUNK_VERSION);
        w.u32(cells.len() as u32);
        for cell in cells {
            w.u16(cell.desc.field_id);
            w.u16(cell.desc.model_id);
            w.u16(cell.desc.flags);
            for v in cell.values {
                w.fixed32(v);
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
            let field_id = r.u16()?;
            let model_id = r.u16()?;
            let flags = r.u16()?;
            let mut values = [Fixed32::ZERO; ENV_VALUE_MAX];
            for v in &mut values {
                *v = r.fixed32()?;
            }
            cells.push(FieldCell { desc: FieldDesc { field_id, model_id, flags }, values });
        }
        cells.sort_by_key(|c| (c.desc.field_id, c.desc.model_id));
        world.env.chunks.insert(chunk, cells);
        Ok(())
    }

    fn save_instance(&self, world: &World) -> Vec<u8> {
        if world.env.volumes.is_empty() && world.env.edges.is_empty() {
            return Vec::new();
        }
        let mut w = ByteWriter::versioned(INSTANCE_VERSION);
        w.u32(world.env.volumes.len() as u32);
        for vol in world.env.volumes.values() {
            w.u32(vol.id.raw());
            for v in vol.min {
                w.fixed64(v);
            }
            for v in vol.max {
                w.fixed64(v);
            }
            w.u32(vol.owner_struct.raw());
            w.u32(vol.owner_vehicle.raw());
            w.fixed32(vol.pressure);
            w.fixed32(vol.temperature);
            w.fixed32(vol.gas0);
            w.fixed32(vol.gas1);
            w.fixed32(vol.humidity);
            w.fixed32(vol.pollutant);
        }
        w.u32(world.env.edges.len() as u32);
        for e in &world.env.edges {
            w.u32(e.a.raw());
            w.u32(e.b.raw());
            w.fixed32(e.gas_k);
            w.fixed32(e.heat_k);
        }
        w.finish()
    }

    fn load_instance(&self, world: &mut World, bytes: &[u8]) -> Result<(), TlvError> {
        let mut r = ByteReader::new(bytes);
        r.version(INSTANCE_VERSION)?;
        world.env.volumes.clear();
        world.env.edges.clear();
        world.env.volume_ids = IdAlloc::new();
        let vol_count = r.u32()?;
        for _ in 0..vol_count {
            let id = VolumeId(r.u32()?);
            if id.is_none() {
                return Err(TlvError::BadHeader { field: "volume_id", value: 0 });
            }
            let mut min = [Fixed64::ZERO; 3];
            for v in &mut min {
                *v = r.fixed64()?;
            }
            let mut max = [Fixed64::ZERO; 3];
            for v in &mut max {
                *v = r.fixed64()?;
            }
            let vol = Volume {
                id,
                min,
                max,
                owner_struct: StructureId(r.u32()?),
                owner_vehicle: EntityId(r.u32()?),
                pressure: r.fixed32()?,
                temperature: r.fixed32()?,
                gas0: r.fixed32()?,
                gas1: r.fixed32()?,
                humidity: r.fixed32()?,
                pollutant: r.fixed32()?,
            };
            world.env.volume_ids.observe(id.raw());
            world.env.volumes.insert(id, vol);
        }
        let edge_count = r.u32()?;
        for _ in 0..edge_count {
            world.env.edges.push(VolumeEdge {
                a: VolumeId(r.u32()?),
                b: VolumeId(r.u32()?),
                gas_k: r.fixed32()?,
                heat_k: r.fixed32()?,
            });
        }
        world.env.edges.sort_by_key(|e| (e.a, e.b));
        Ok(())
    }

    fn validate(&self, world: &World) -> Result<(), ValidateError> {
        for e in &world.env.edges {
            if !world.env.volumes.contains_key(&e.a) {
                return Err(ValidateError {
                    subsystem: SubsystemId::Environment,
                    invariant: "every edge endpoint a must be a live volume",
                });
            }
            if e.b.is_some() && !world.env.volumes.contains_key(&e.b) {
                return Err(ValidateError {
                    subsystem: SubsystemId::Environment,
                    invariant: "every edge endpoint b must be a live volume or exterior",
                });
            }
        }
        for vol in world.env.volumes.values() {
            if (0..3).any(|i| vol.min[i] > vol.max[i]) {
                return Err(ValidateError {
                    subsystem: SubsystemId::Environment,
                    invariant: "volume boxes must not be inverted",
                });
            }
        }
        Ok(())
    }
}
