// SPDX-License-Identifier: Apache-2.0
//! Structures: placed instances with containers and machine runtime.
//!
//! A structure is either passive storage or a *machine* (its proto carries
//! the machine tag and a process list). Machines advance through the process
//! runner in [`process`]; everything here is the instance table and its
//! published operations.

pub mod container;
pub mod process;

use std::collections::BTreeMap;

use bytes::Bytes;
use thiserror::Error;

use crate::fixed::Fixed32;
use crate::ident::{ChunkId, EntityId, IdAlloc, OrgId, ProcessId, StructureId, StructureProtoId};
use crate::subsystem::{Subsystem, SubsystemId, ValidateError};
use crate::tlv::{ByteReader, ByteWriter, TlvError};
use crate::world::{chunk_coord_of, World};

use self::container::ContainerState;
use self::process::ProcessStats;

const INSTANCE_VERSION: u32 = 1;

/// Machine state flag bits.
pub mod machine_flags {
    /// Not running: no process, no operator, or missing inputs.
    pub const IDLE: u16 = 1 << 0;
    /// Mid-cycle and advancing.
    pub const ACTIVE: u16 = 1 << 1;
    /// Stalled at a cycle boundary.
    pub const BLOCKED: u16 = 1 << 2;
    /// Stalled by a policy deny or zero multiplier.
    pub const POLICY_BLOCKED: u16 = 1 << 3;
}

/// Connection points a spline endpoint can bind to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PortKind {
    /// Unspecified; treated as accepting item traffic.
    #[default]
    None,
    /// Item input port.
    ItemIn,
    /// Item output port.
    ItemOut,
    /// Spline-side item input port.
    SplineItemIn,
    /// Spline-side item output port.
    SplineItemOut,
}

impl PortKind {
    /// Wire code.
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::None => 0,
            Self::ItemIn => 1,
            Self::ItemOut => 2,
            Self::SplineItemIn => 3,
            Self::SplineItemOut => 4,
        }
    }

    /// Parses a wire code; unknown codes read as `None`.
    #[must_use]
    pub const fn from_code(code: u16) -> Self {
        match code {
            1 => Self::ItemIn,
            2 => Self::ItemOut,
            3 => Self::SplineItemIn,
            4 => Self::SplineItemOut,
            _ => Self::None,
        }
    }

    /// `true` for ports item movers may deliver into.
    #[must_use]
    pub const fn accepts_items(self) -> bool {
        matches!(self, Self::None | Self::ItemIn | Self::SplineItemIn)
    }

    /// `true` for ports item movers may depart from.
    #[must_use]
    pub const fn emits_items(self) -> bool {
        matches!(self, Self::None | Self::ItemOut | Self::SplineItemOut)
    }
}

/// Live machine bookkeeping inside a structure instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MachineRuntime {
    /// Currently selected process; `NONE` until first pick.
    pub active_process_id: ProcessId,
    /// Progress through the current cycle, in ticks.
    pub progress: Fixed32,
    /// Machine state flag bits.
    pub state_flags: u16,
}

/// A placed structure instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructureInstance {
    /// Stable id.
    pub id: StructureId,
    /// Backing proto.
    pub proto_id: StructureProtoId,
    /// Owning organization.
    pub owner_org: OrgId,
    /// Local-space position.
    pub pos: [Fixed32; 3],
    /// Yaw/pitch/roll rotation.
    pub rot: [Fixed32; 3],
    /// Chunk covering the position.
    pub chunk_id: ChunkId,
    /// Instance flag bits.
    pub flags: u32,
    /// Link to an outer ECS entity; zero when absent.
    pub entity_id: EntityId,
    /// Machine runtime; meaningful only for machines.
    pub machine: MachineRuntime,
    /// Input container.
    pub inv_in: ContainerState,
    /// Output container.
    pub inv_out: ContainerState,
    /// Opaque per-instance state blob.
    pub state_blob: Bytes,
}

/// Errors from structure operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StructError {
    /// Proto id does not resolve.
    #[error("no such structure proto {0}")]
    NoSuchProto(StructureProtoId),

    /// Instance id does not resolve.
    #[error("no such structure {0}")]
    NoSuchStructure(StructureId),
}

/// Per-world structure tables.
#[derive(Debug, Clone, Default)]
pub struct StructState {
    pub(crate) instances: BTreeMap<StructureId, StructureInstance>,
    pub(crate) ids: IdAlloc,
    pub(crate) stats: BTreeMap<ProcessId, ProcessStats>,
}

/// Places a structure instance from a proto.
pub fn create(
    world: &mut World,
    proto_id: StructureProtoId,
    owner_org: OrgId,
    pos: [Fixed32; 3],
    yaw: Fixed32,
) -> Result<StructureId, StructError> {
    let Some(proto) = world.content.structure(proto_id) else {
        return Err(StructError::NoSuchProto(proto_id));
    };
    let (inv_in_proto, inv_out_proto) = (proto.inv_in, proto.inv_out);
    let inv_in = ContainerState::from_proto(&world.content, inv_in_proto);
    let inv_out = ContainerState::from_proto(&world.content, inv_out_proto);
    let chunk_id = world.ensure_chunk(chunk_coord_of(pos[0].widen()), chunk_coord_of(pos[1].widen()));
    let id = StructureId(world.structs.ids.alloc());
    world.structs.instances.insert(
        id,
        StructureInstance {
            id,
            proto_id,
            owner_org,
            pos,
            rot: [yaw, Fixed32::ZERO, Fixed32::ZERO],
            chunk_id,
            flags: 0,
            entity_id: EntityId::NONE,
            machine: MachineRuntime::default(),
            inv_in,
            inv_out,
            state_blob: Bytes::new(),
        },
    );
    Ok(id)
}

/// Removes a structure and everything that hangs off it (interior volumes
/// and their edges).
pub fn destroy(world: &mut World, id: StructureId) -> Result<(), StructError> {
    if world.structs.instances.remove(&id).is_none() {
        return Err(StructError::NoSuchStructure(id));
    }
    crate::env::volume_remove_owned_by(world, id, EntityId::NONE);
    Ok(())
}

/// Structure by id.
#[must_use]
pub fn get(world: &World, id: StructureId) -> Option<&StructureInstance> {
    world.structs.instances.get(&id)
}

/// Number of structures.
#[must_use]
pub fn count(world: &World) -> usize {
    world.structs.instances.len()
}

/// Structure by sorted index.
#[must_use]
pub fn get_by_index(world: &World, index: usize) -> Option<&StructureInstance> {
    world.structs.instances.values().nth(index)
}

/// Which of a structure's two containers an operation addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerSide {
    /// The input container (`inv_in`).
    In,
    /// The output container (`inv_out`).
    Out,
}

/// Packs items into one of a structure's containers, returning how many fit.
pub fn pack_items(
    world: &mut World,
    id: StructureId,
    side: ContainerSide,
    item: crate::ident::ItemId,
    count: u32,
) -> Result<u32, StructError> {
    let World { content, structs, .. } = world;
    let inst = structs.instances.get_mut(&id).ok_or(StructError::NoSuchStructure(id))?;
    let container = match side {
        ContainerSide::In => &mut inst.inv_in,
        ContainerSide::Out => &mut inst.inv_out,
    };
    Ok(container.pack(content, item, count))
}

/// Unpacks items from one of a structure's containers, returning how many
/// came out.
pub fn unpack_items(
    world: &mut World,
    id: StructureId,
    side: ContainerSide,
    item: crate::ident::ItemId,
    count: u32,
) -> Result<u32, StructError> {
    let World { content, structs, .. } = world;
    let inst = structs.instances.get_mut(&id).ok_or(StructError::NoSuchStructure(id))?;
    let container = match side {
        ContainerSide::In => &mut inst.inv_in,
        ContainerSide::Out => &mut inst.inv_out,
    };
    Ok(container.unpack(content, item, count))
}

/// Units of an item held in one of a structure's containers.
#[must_use]
pub fn count_items(
    world: &World,
    id: StructureId,
    side: ContainerSide,
    item: crate::ident::ItemId,
) -> u32 {
    let Some(inst) = world.structs.instances.get(&id) else {
        return 0;
    };
    match side {
        ContainerSide::In => inst.inv_in.count_item(item),
        ContainerSide::Out => inst.inv_out.count_item(item),
    }
}

/// Structure subsystem entry.
pub struct StructureSubsystem;

impl Subsystem for StructureSubsystem {
    fn id(&self) -> SubsystemId {
        SubsystemId::Structure
    }

    fn name(&self) -> &'static str {
        "struct"
    }

    fn init_instance(&self, world: &mut World) {
        world.structs = StructState::default();
    }

    fn tick(&self, world: &mut World, ticks: u32) {
        if ticks == 0 {
            return;
        }
        process::tick(world, ticks);
    }

    fn save_instance(&self, world: &World) -> Vec<u8> {
        if world.structs.instances.is_empty() {
            return Vec::new();
        }
        let mut w = ByteWriter::versioned(INSTANCE_VERSION);
        w.u32(world.structs.instances.len() as u32);
        for inst in world.structs.instances.values() {
            w.u32(inst.id.raw());
            w.u32(inst.proto_id.raw());
            w.u32(inst.owner_org.raw());
            for p in inst.pos {
                w.fixed32(p);
            }
            for r in inst.rot {
                w.fixed32(r);
            }
            w.u32(inst.chunk_id.raw());
            w.u32(inst.flags);
            w.u32(inst.entity_id.raw());
            w.u32(inst.machine.active_process_id.raw());
            w.fixed32(inst.machine.progress);
            w.u16(inst.machine.state_flags);
            inst.inv_in.write(&mut w);
            inst.inv_out.write(&mut w);
            w.blob(&inst.state_blob);
        }
        w.finish()
    }

    fn load_instance(&self, world: &mut World, bytes: &[u8]) -> Result<(), TlvError> {
        let mut r = ByteReader::new(bytes);
        r.version(INSTANCE_VERSION)?;
        world.structs = StructState::default();
        let count = r.u32()?;
        for _ in 0..count {
            let id = StructureId(r.u32()?);
            if id.is_none() {
                return Err(TlvError::BadHeader { field: "structure_id", value: 0 });
            }
            let proto_id = StructureProtoId(r.u32()?);
            let owner_org = OrgId(r.u32()?);
            let mut pos = [Fixed32::ZERO; 3];
            for p in &mut pos {
                *p = r.fixed32()?;
            }
            let mut rot = [Fixed32::ZERO; 3];
            for v in &mut rot {
                *v = r.fixed32()?;
            }
            let chunk_id = ChunkId(r.u32()?);
            let flags = r.u32()?;
            let entity_id = EntityId(r.u32()?);
            let machine = MachineRuntime {
                active_process_id: ProcessId(r.u32()?),
                progress: r.fixed32()?,
                state_flags: r.u16()?,
            };
            let inv_in = ContainerState::read(&mut r)?;
            let inv_out = ContainerState::read(&mut r)?;
            let state_blob = Bytes::copy_from_slice(r.blob()?);
            world.structs.ids.observe(id.raw());
            world.structs.instances.insert(
                id,
                StructureInstance {
                    id,
                    proto_id,
                    owner_org,
                    pos,
                    rot,
                    chunk_id,
                    flags,
                    entity_id,
                    machine,
                    inv_in,
                    inv_out,
                    state_blob,
                },
            );
        }
        Ok(())
    }

    fn validate(&self, world: &World) -> Result<(), ValidateError> {
        for inst in world.structs.instances.values() {
            if inst.owner_org.is_some() && !world.orgs.orgs.contains_key(&inst.owner_org) {
                return Err(ValidateError {
                    subsystem: SubsystemId::Structure,
                    invariant: "structure owners must be live orgs",
                });
            }
            for c in [&inst.inv_in, &inst.inv_out] {
                if c.used_volume.is_negative() || c.used_mass.is_negative() {
                    return Err(ValidateError {
                        subsystem: SubsystemId::Structure,
                        invariant: "container usage sums must stay non-negative",
                    });
                }
            }
        }
        Ok(())
    }
}
