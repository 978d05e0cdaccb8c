// SPDX-License-Identifier: Apache-2.0
//! Hydrology: surface water on a 16×16 grid per chunk.
//!
//! Each sub-tick snapshots depths, moves `diff >> 3` across east/north cell
//! edges (including the cross-chunk seam), clamped by the source's available
//! water, then exchanges `|diff| >> 6` with the chunk's resource fluid
//! channel, spread evenly over the 256 cells. Depth never goes negative.

use std::collections::BTreeMap;

use bytemuck::{Pod, Zeroable};

use crate::content::proto::tagbits;
use crate::fixed::Fixed32;
use crate::fixed::Fixed64;
use crate::ident::ChunkId;
use crate::model::{ModelDescriptor, ModelError, ModelFamily, ModelRegistry};
use crate::res;
use crate::subsystem::{Subsystem, SubsystemId, ValidateError};
use crate::tlv::{ByteReader, ByteWriter, TlvError};
use crate::world::World;

/// Grid resolution per chunk axis.
pub const HYDRO_GRID: usize = 16;
/// Cells per chunk.
pub const HYDRO_CELLS: usize = HYDRO_GRID * HYDRO_GRID;

const CHUNK_VERSION: u32 = 1;

/// Closed set of hydrology models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HydroModel {
    /// Depth diffusion with resource coupling.
    SurfaceWater,
}

impl HydroModel {
    /// Model id of [`HydroModel::SurfaceWater`].
    pub const SURFACE_WATER_ID: u16 = 1;
}

/// One water cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HydroCell {
    /// Terrain surface height under the water column.
    pub surface_height: Fixed32,
    /// Water depth; never negative.
    pub depth: Fixed32,
    /// East-axis flow magnitude last sub-tick.
    pub velocity_x: Fixed32,
    /// North-axis flow magnitude last sub-tick.
    pub velocity_y: Fixed32,
    /// Flag bits.
    pub flags: Fixed32,
}

/// Serialized cell row, fields pre-converted to little-endian.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct HydroCellRow {
    surface_height_le: i32,
    depth_le: i32,
    velocity_x_le: i32,
    velocity_y_le: i32,
    flags_le: i32,
}

/// Per-world hydrology tables.
#[derive(Debug, Clone, Default)]
pub struct HydroState {
    pub(crate) chunks: BTreeMap<ChunkId, Vec<HydroCell>>,
}

/// Zeroes the water grid of a fresh chunk (worldgen provider).
pub(crate) fn populate_chunk(world: &mut World, chunk: ChunkId) {
    world.hydro.chunks.entry(chunk).or_insert_with(|| vec![HydroCell::default(); HYDRO_CELLS]);
}

/// Water cell covering a world position, if the chunk has a grid.
#[must_use]
pub fn sample_at(world: &World, x: Fixed64, y: Fixed64) -> Option<HydroCell> {
    let chunk = world.find_chunk(crate::world::chunk_coord_of(x), crate::world::chunk_coord_of(y))?;
    let cells = world.hydro.chunks.get(&chunk)?;
    let lx = ((x.raw() >> 28) & 0xF) as usize;
    let ly = ((y.raw() >> 28) & 0xF) as usize;
    cells.get(ly * HYDRO_GRID + lx).copied()
}

/// Adds water to the cell covering a world position.
pub fn add_water(world: &mut World, x: Fixed64, y: Fixed64, amount: Fixed32) {
    let cx = crate::world::chunk_coord_of(x);
    let cy = crate::world::chunk_coord_of(y);
    let chunk = world.ensure_chunk(cx, cy);
    let lx = ((x.raw() >> 28) & 0xF) as usize;
    let ly = ((y.raw() >> 28) & 0xF) as usize;
    if let Some(cells) = world.hydro.chunks.get_mut(&chunk) {
        if let Some(cell) = cells.get_mut(ly * HYDRO_GRID + lx) {
            cell.depth = cell.depth.add(amount).max(Fixed32::ZERO);
        }
    }
}

/// Clamped per-edge transfer: `diff >> 3`, limited by the source's water.
fn edge_transfer(da: Fixed32, db: Fixed32) -> Fixed32 {
    let mut transfer = Fixed32::from_raw(da.sub(db).raw() >> 3);
    if transfer > Fixed32::ZERO {
        transfer = transfer.min(da);
    } else if transfer < Fixed32::ZERO {
        transfer = transfer.max(db.neg());
    }
    transfer
}

fn sub_tick(world: &mut World) {
    // Depth snapshot and per-cell accumulators, keyed by chunk id.
    let mut snap: BTreeMap<ChunkId, Vec<Fixed32>> = BTreeMap::new();
    for (id, cells) in &world.hydro.chunks {
        snap.insert(*id, cells.iter().map(|c| c.depth).collect());
    }
    let mut delta: BTreeMap<ChunkId, Vec<Fixed32>> = snap
        .keys()
        .map(|id| (*id, vec![Fixed32::ZERO; HYDRO_CELLS]))
        .collect();
    let mut velx: BTreeMap<ChunkId, Vec<Fixed32>> = delta.clone();
    let mut vely: BTreeMap<ChunkId, Vec<Fixed32>> = delta.clone();

    let coords: Vec<(ChunkId, i32, i32)> = world.chunks().map(|c| (c.id, c.cx, c.cy)).collect();
    for (id, cx, cy) in &coords {
        if !snap.contains_key(id) {
            continue;
        }
        let east_chunk = world.find_chunk(cx + 1, *cy).filter(|c| snap.contains_key(c));
        let north_chunk = world.find_chunk(*cx, cy + 1).filter(|c| snap.contains_key(c));
        for ly in 0..HYDRO_GRID {
            for lx in 0..HYDRO_GRID {
                let k = ly * HYDRO_GRID + lx;
                let da = snap[id][k];

                // East edge.
                let east = if lx + 1 < HYDRO_GRID {
                    Some((*id, k + 1))
                } else {
                    east_chunk.map(|c| (c, ly * HYDRO_GRID))
                };
                if let Some((nc, nk)) = east {
                    let t = edge_transfer(da, snap[&nc][nk]);
                    if t != Fixed32::ZERO {
                        if let Some(d) = delta.get_mut(id) {
                            d[k] = d[k].sub(t);
                        }
                        if let Some(d) = delta.get_mut(&nc) {
                            d[nk] = d[nk].add(t);
                        }
                        if let Some(v) = velx.get_mut(id) {
                            v[k] = v[k].add(t.abs());
                        }
                    }
                }

                // North edge.
                let north = if ly + 1 < HYDRO_GRID {
                    Some((*id, k + HYDRO_GRID))
                } else {
                    north_chunk.map(|c| (c, lx))
                };
                if let Some((nc, nk)) = north {
                    let t = edge_transfer(da, snap[&nc][nk]);
                    if t != Fixed32::ZERO {
                        if let Some(d) = delta.get_mut(id) {
                            d[k] = d[k].sub(t);
                        }
                        if let Some(d) = delta.get_mut(&nc) {
                            d[nk] = d[nk].add(t);
                        }
                        if let Some(v) = vely.get_mut(id) {
                            v[k] = v[k].add(t.abs());
                        }
                    }
                }
            }
        }
    }

    for (id, cells) in &mut world.hydro.chunks {
        let (Some(d), Some(vx), Some(vy)) = (delta.get(id), velx.get(id), vely.get(id)) else {
            continue;
        };
        for (k, cell) in cells.iter_mut().enumerate() {
            cell.depth = cell.depth.add(d[k]).max(Fixed32::ZERO);
            cell.velocity_x = vx[k];
            cell.velocity_y = vy[k];
        }
    }

    exchange_with_resources(world);
}

/// Moves `|diff| >> 6` between each chunk's total grid water and its fluid
/// resource channel, spread evenly over the cells. Channels without the
/// fluid material tag never take part.
fn exchange_with_resources(world: &mut World) {
    let coords: Vec<(ChunkId, i32, i32)> = world.chunks().map(|c| (c.id, c.cx, c.cy)).collect();
    for (id, cx, cy) in coords {
        if !world.hydro.chunks.contains_key(&id) {
            continue;
        }
        let x = Fixed64::from_int(i64::from(cx));
        let y = Fixed64::from_int(i64::from(cy));
        let samples = res::sample_at(world, x, y, Fixed64::ZERO, 0);
        let Some(sample) =
            samples.iter().find(|s| s.tags & tagbits::MATERIAL_FLUID != 0).copied()
        else {
            continue;
        };

        // Both sides of the equilibrium are whole-chunk totals: the channel
        // scalar against the summed depth of all 256 cells.
        let surface_total = {
            let cells = match world.hydro.chunks.get(&id) {
                Some(c) => c,
                None => continue,
            };
            let mut sum = Fixed64::ZERO;
            for c in cells {
                sum = sum.add(c.depth.widen());
            }
            sum
        };

        let diff = sample.values[0].widen().sub(surface_total);
        if diff == Fixed64::ZERO {
            continue;
        }

        let mut res_delta = [Fixed32::ZERO; res::RES_VALUE_MAX];
        if diff > Fixed64::ZERO {
            // Resource has more fluid: rain it onto the grid.
            let target = Fixed64::from_raw(diff.raw() >> 6).narrow();
            let mut remaining = target;
            if let Some(cells) = world.hydro.chunks.get_mut(&id) {
                for (k, cell) in cells.iter_mut().enumerate() {
                    if remaining <= Fixed32::ZERO {
                        break;
                    }
                    let per = remaining.div(Fixed32::from_int((HYDRO_CELLS - k) as i32));
                    let add = per.min(remaining);
                    cell.depth = cell.depth.add(add);
                    remaining = remaining.sub(add);
                }
            }
            res_delta[0] = target.sub(remaining).neg();
        } else {
            // Grid has more: drain evenly back into the channel.
            let target = Fixed64::from_raw(diff.neg().raw() >> 6).narrow();
            let mut remaining = target;
            if let Some(cells) = world.hydro.chunks.get_mut(&id) {
                for (k, cell) in cells.iter_mut().enumerate() {
                    if remaining <= Fixed32::ZERO {
                        break;
                    }
                    let per = remaining.div(Fixed32::from_int((HYDRO_CELLS - k) as i32));
                    let take = per.min(remaining).min(cell.depth);
                    cell.depth = cell.depth.sub(take);
                    remaining = remaining.sub(take);
                }
            }
            res_delta[0] = target.sub(remaining);
        }
        if res_delta[0] != Fixed32::ZERO {
            let seed_context = world.tick_count();
            let _ = res::apply_delta(world, &sample, &res_delta, seed_context);
        }
    }
}

/// Hydrology subsystem entry.
pub struct HydrologySubsystem;

impl Subsystem for HydrologySubsystem {
    fn id(&self) -> SubsystemId {
        SubsystemId::Hydrology
    }

    fn name(&self) -> &'static str {
        "hydro"
    }

    fn register_models(&self, models: &mut ModelRegistry) -> Result<(), ModelError> {
        models.register(ModelDescriptor {
            family: ModelFamily::Hydrology,
            id: HydroModel::SURFACE_WATER_ID,
            name: "hydro_surface_water",
            version: 1,
        })
    }

    fn init_instance(&self, world: &mut World) {
        world.hydro = HydroState::default();
    }

    fn tick(&self, world: &mut World, ticks: u32) {
        for _ in 0..ticks {
            sub_tick(world);
        }
    }

    fn save_chunk(&self, world: &World, chunk: ChunkId) -> Vec<u8> {
        let Some(cells) = world.hydro.chunks.get(&chunk) else {
            return Vec::new();
        };
        let rows: Vec<HydroCellRow> = cells
            .iter()
            .map(|c| HydroCellRow {
                surface_height_le: c.surface_height.raw().to_le(),
                depth_le: c.depth.raw().to_le(),
                velocity_x_le: c.velocity_x.raw().to_le(),
                velocity_y_le: c.velocity_y.raw().to_le(),
                flags_le: c.flags.raw().to_le(),
            })
            .collect();
        let mut w = ByteWriter::versioned(CHUNK_VERSION);
        w.u32(cells.len() as u32);
        let mut bytes = w.finish();
        bytes.extend_from_slice(bytemuck::cast_slice(&rows));
        bytes
    }

    fn load_chunk(&self, world: &mut World, chunk: ChunkId, bytes: &[u8]) -> Result<(), TlvError> {
        let mut r = ByteReader::new(bytes);
        r.version(CHUNK_VERSION)?;
        let count = r.u32()? as usize;
        if count != HYDRO_CELLS {
            return Err(TlvError::BadHeader { field: "cell_count", value: count as u64 });
        }
        let mut cells = Vec::with_capacity(count);
        for _ in 0..count {
            cells.push(HydroCell {
                surface_height: r.fixed32()?,
                depth: r.fixed32()?,
                velocity_x: r.fixed32()?,
                velocity_y: r.fixed32()?,
                flags: r.fixed32()?,
            });
        }
        world.hydro.chunks.insert(chunk, cells);
        Ok(())
    }

    fn validate(&self, world: &World) -> Result<(), ValidateError> {
        for cells in world.hydro.chunks.values() {
            if cells.len() != HYDRO_CELLS {
                return Err(ValidateError {
                    subsystem: SubsystemId::Hydrology,
                    invariant: "every hydro grid must hold exactly 256 cells",
                });
            }
            if cells.iter().any(|c| c.depth.is_negative()) {
                return Err(ValidateError {
                    subsystem: SubsystemId::Hydrology,
                    invariant: "water depth must stay non-negative",
                });
            }
        }
        Ok(())
    }
}
