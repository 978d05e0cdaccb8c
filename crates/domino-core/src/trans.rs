// SPDX-License-Identifier: Apache-2.0
//! Transport: polyline splines and the movers that ride them.
//!
//! Splines are polylines over a shared node pool with cached length and
//! endpoint bindings to structure ports. Movers travel by normalized
//! parameter: 0 is endpoint A, 1 is endpoint B. Item movers deliver their
//! payload into the destination container and disappear; a spawn pass pulls
//! items out of source containers onto item splines.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::content::proto::SplineKind;
use crate::fixed::{Fixed32, Fixed64};
use crate::ident::{IdAlloc, ItemId, MoverId, OrgId, SplineId, SplineProfileId, StructureId};
use crate::structure::{PortKind, StructState};
use crate::subsystem::{Subsystem, SubsystemId, ValidateError};
use crate::tlv::{ByteReader, ByteWriter, TlvError};
use crate::world::World;

const INSTANCE_VERSION: u32 = 1;

/// Minimum parameter gap behind endpoint A before another item spawns.
pub const SPAWN_GAP: Fixed32 = Fixed32::from_raw(1 << 13);

/// One node in the shared pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SplineNode {
    /// World-space position.
    pub pos: [Fixed64; 3],
    /// Unit-ish normal, for banked track profiles.
    pub normal: [Fixed32; 3],
}

/// Endpoint binding of a spline to an entity port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SplineEndpoint {
    /// Bound structure; `NONE` for unbound ends.
    pub eid: StructureId,
    /// Port kind at the binding.
    pub port_kind: PortKind,
    /// Port index within the kind.
    pub port_index: u16,
}

/// A spline instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplineInstance {
    /// Stable id.
    pub id: SplineId,
    /// Backing profile proto.
    pub profile_id: SplineProfileId,
    /// Owning organization.
    pub owner_org: OrgId,
    /// Flag bits.
    pub flags: u16,
    /// First node in the shared pool.
    pub node_start: u32,
    /// Number of nodes; at least 2.
    pub node_count: u16,
    /// Cached polyline length.
    pub length: Fixed32,
    /// Endpoint A (parameter 0).
    pub endpoint_a: SplineEndpoint,
    /// Endpoint B (parameter 1).
    pub endpoint_b: SplineEndpoint,
}

/// What a mover carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MoverKind {
    /// Empty slot marker; movers of this kind cannot be created.
    #[default]
    None,
    /// Discrete item stack.
    Item,
    /// Fluid packet.
    Fluid,
    /// Vehicle.
    Vehicle,
    /// Agent in transit.
    Agent,
}

impl MoverKind {
    /// Wire code.
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::None => 0,
            Self::Item => 1,
            Self::Fluid => 2,
            Self::Vehicle => 3,
            Self::Agent => 4,
        }
    }

    /// Parses a wire code; unknown codes read as `None`.
    #[must_use]
    pub const fn from_code(code: u16) -> Self {
        match code {
            1 => Self::Item,
            2 => Self::Fluid,
            3 => Self::Vehicle,
            4 => Self::Agent,
            _ => Self::None,
        }
    }
}

/// A mover on a spline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mover {
    /// Stable id.
    pub id: MoverId,
    /// What this mover is.
    pub kind: MoverKind,
    /// Spline carrying the mover.
    pub spline_id: SplineId,
    /// Position parameter in `[0, 1]`.
    pub param: Fixed32,
    /// Parameter speed per tick, derived from profile and grade.
    pub speed_param: Fixed32,
    /// Parameter length the mover occupies.
    pub size_param: Fixed32,
    /// Carried item (for item movers).
    pub payload_id: ItemId,
    /// Carried unit count.
    pub payload_count: u32,
}

/// Errors from transport operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransError {
    /// Splines need at least two nodes.
    #[error("spline needs at least 2 nodes")]
    TooFewNodes,

    /// Spline id does not resolve.
    #[error("no such spline {0}")]
    NoSuchSpline(SplineId),

    /// Mover id does not resolve.
    #[error("no such mover {0}")]
    NoSuchMover(MoverId),

    /// Mover init is unusable (kind `None` or no spline).
    #[error("invalid mover init")]
    InvalidMover,
}

/// Per-world transport tables.
#[derive(Debug, Clone, Default)]
pub struct TransState {
    pub(crate) nodes: Vec<SplineNode>,
    pub(crate) splines: BTreeMap<SplineId, SplineInstance>,
    pub(crate) movers: BTreeMap<MoverId, Mover>,
    pub(crate) spline_ids: IdAlloc,
    pub(crate) mover_ids: IdAlloc,
}

fn isqrt_u64(v: u64) -> u64 {
    let mut v = v;
    let mut res = 0u64;
    let mut bit = 1u64 << 62;
    while bit > v {
        bit >>= 2;
    }
    while bit != 0 {
        if v >= res + bit {
            v -= res + bit;
            res = (res >> 1) + bit;
        } else {
            res >>= 1;
        }
        bit >>= 2;
    }
    res
}

fn segment_length(a: &SplineNode, b: &SplineNode) -> Fixed32 {
    let d = |i: usize| i128::from(b.pos[i].narrow().raw()) - i128::from(a.pos[i].narrow().raw());
    let (dx, dy, dz) = (d(0), d(1), d(2));
    let sum = dx * dx + dy * dy + dz * dz;
    let sum = u64::try_from(sum).unwrap_or(u64::MAX);
    let root = isqrt_u64(sum);
    if root > i32::MAX as u64 {
        Fixed32::MAX
    } else {
        Fixed32::from_raw(root as i32)
    }
}

fn polyline_length(nodes: &[SplineNode]) -> Fixed32 {
    let mut total = Fixed32::ZERO;
    for pair in nodes.windows(2) {
        total = total.add(segment_length(&pair[0], &pair[1]));
    }
    total
}

/// Creates a spline over a copy of `nodes`.
pub fn spline_create(
    world: &mut World,
    profile_id: SplineProfileId,
    owner_org: OrgId,
    nodes: &[SplineNode],
) -> Result<SplineId, TransError> {
    if nodes.len() < 2 {
        return Err(TransError::TooFewNodes);
    }
    let trans = &mut world.trans;
    let node_start = trans.nodes.len() as u32;
    trans.nodes.extend_from_slice(nodes);
    let id = SplineId(trans.spline_ids.alloc());
    trans.splines.insert(
        id,
        SplineInstance {
            id,
            profile_id,
            owner_org,
            flags: 0,
            node_start,
            node_count: nodes.len() as u16,
            length: polyline_length(nodes),
            endpoint_a: SplineEndpoint::default(),
            endpoint_b: SplineEndpoint::default(),
        },
    );
    Ok(id)
}

/// Destroys a spline and every mover riding it.
pub fn spline_destroy(world: &mut World, id: SplineId) -> Result<(), TransError> {
    if world.trans.splines.remove(&id).is_none() {
        return Err(TransError::NoSuchSpline(id));
    }
    world.trans.movers.retain(|_, m| m.spline_id != id);
    Ok(())
}

/// Binds the endpoints of a spline to entity ports.
pub fn spline_set_endpoints(
    world: &mut World,
    id: SplineId,
    a: SplineEndpoint,
    b: SplineEndpoint,
) -> Result<(), TransError> {
    let spline = world.trans.splines.get_mut(&id).ok_or(TransError::NoSuchSpline(id))?;
    spline.endpoint_a = a;
    spline.endpoint_b = b;
    Ok(())
}

/// Spline by id.
#[must_use]
pub fn spline_get(world: &World, id: SplineId) -> Option<SplineInstance> {
    world.trans.splines.get(&id).copied()
}

/// Number of splines.
#[must_use]
pub fn spline_count(world: &World) -> usize {
    world.trans.splines.len()
}

/// Spline by sorted index.
#[must_use]
pub fn spline_get_by_index(world: &World, index: usize) -> Option<SplineInstance> {
    world.trans.splines.values().nth(index).copied()
}

/// Nodes of a spline, in order.
#[must_use]
pub fn spline_nodes(world: &World, id: SplineId) -> Option<&[SplineNode]> {
    let spline = world.trans.splines.get(&id)?;
    let start = spline.node_start as usize;
    let end = start + usize::from(spline.node_count);
    world.trans.nodes.get(start..end)
}

/// Position on a spline at parameter `t ∈ [0, 1]`.
#[must_use]
pub fn spline_sample_pos(world: &World, id: SplineId, param: Fixed32) -> Option<[Fixed64; 3]> {
    sample_pos_state(&world.trans, id, param)
}

/// Sample against the raw transport tables, for tick paths under split
/// borrows.
pub(crate) fn sample_pos_state(
    trans: &TransState,
    id: SplineId,
    param: Fixed32,
) -> Option<[Fixed64; 3]> {
    let spline = trans.splines.get(&id)?;
    if spline.node_count < 2 || spline.length <= Fixed32::ZERO {
        return None;
    }
    let start = spline.node_start as usize;
    let end = start + usize::from(spline.node_count);
    let nodes = trans.nodes.get(start..end)?;

    let param = param.clamp(Fixed32::ZERO, Fixed32::ONE);
    let target = param.mul(spline.length);
    let mut acc = Fixed32::ZERO;
    for pair in nodes.windows(2) {
        let seg = segment_length(&pair[0], &pair[1]);
        if seg <= Fixed32::ZERO {
            continue;
        }
        if target <= acc.add(seg) {
            let local_t = target.sub(acc).div(seg).clamp(Fixed32::ZERO, Fixed32::ONE);
            let lerp = |i: usize| {
                let a = pair[0].pos[i].narrow();
                let b = pair[1].pos[i].narrow();
                a.add(b.sub(a).mul(local_t)).widen()
            };
            return Some([lerp(0), lerp(1), lerp(2)]);
        }
        acc = acc.add(seg);
    }
    let last = nodes.last()?;
    Some(last.pos)
}

/// Creates a mover on a spline.
pub fn mover_create(world: &mut World, init: &Mover) -> Result<MoverId, TransError> {
    create_mover_state(&mut world.trans, init)
}

pub(crate) fn create_mover_state(trans: &mut TransState, init: &Mover) -> Result<MoverId, TransError> {
    if init.kind == MoverKind::None {
        return Err(TransError::InvalidMover);
    }
    if !trans.splines.contains_key(&init.spline_id) {
        return Err(TransError::NoSuchSpline(init.spline_id));
    }
    let id = MoverId(trans.mover_ids.alloc());
    let mut m = *init;
    m.id = id;
    m.param = m.param.clamp(Fixed32::ZERO, Fixed32::ONE);
    trans.movers.insert(id, m);
    Ok(id)
}

/// Destroys a mover.
pub fn mover_destroy(world: &mut World, id: MoverId) -> Result<(), TransError> {
    world.trans.movers.remove(&id).map(|_| ()).ok_or(TransError::NoSuchMover(id))
}

/// Mover by id.
#[must_use]
pub fn mover_get(world: &World, id: MoverId) -> Option<Mover> {
    world.trans.movers.get(&id).copied()
}

/// Number of movers.
#[must_use]
pub fn mover_count(world: &World) -> usize {
    world.trans.movers.len()
}

/// Mover by sorted index.
#[must_use]
pub fn mover_get_by_index(world: &World, index: usize) -> Option<Mover> {
    world.trans.movers.values().nth(index).copied()
}

fn spline_grade(trans: &TransState, spline: &SplineInstance) -> Fixed32 {
    let start = spline.node_start as usize;
    let end = start + usize::from(spline.node_count);
    let Some(nodes) = trans.nodes.get(start..end) else {
        return Fixed32::ZERO;
    };
    let (Some(first), Some(last)) = (nodes.first(), nodes.last()) else {
        return Fixed32::ZERO;
    };
    if spline.length <= Fixed32::ZERO {
        return Fixed32::ZERO;
    }
    let dz = last.pos[2].sub(first.pos[2]).narrow().abs();
    dz.div(spline.length)
}

/// Delivers an arriving item mover into the endpoint container. Returns
/// `true` when the whole payload fit and the mover should disappear.
fn deliver(
    content: &crate::content::ContentCatalog,
    structs: &mut StructState,
    endpoint: &SplineEndpoint,
    mover: &Mover,
) -> bool {
    if endpoint.eid.is_none() || !endpoint.port_kind.accepts_items() {
        return false;
    }
    let Some(dst) = structs.instances.get_mut(&endpoint.eid) else {
        return false;
    };
    let container = if dst.inv_in.is_present() { &mut dst.inv_in } else { &mut dst.inv_out };
    if !container.is_present() {
        return false;
    }
    container.pack(content, mover.payload_id, mover.payload_count) == mover.payload_count
}

fn tick_movers(world: &mut World, ticks: u32) {
    let ids: Vec<MoverId> = world.trans.movers.keys().copied().collect();
    for id in ids {
        let World { content, trans, structs, .. } = &mut *world;
        let Some(mover) = trans.movers.get(&id).copied() else {
            continue;
        };
        let Some(spline) = trans.splines.get(&mover.spline_id).copied() else {
            continue;
        };
        if spline.length <= Fixed32::ZERO {
            continue;
        }
        let Some((base_speed, max_grade)) =
            content.spline_profile(spline.profile_id).map(|p| (p.base_speed, p.max_grade))
        else {
            continue;
        };

        let mut speed = base_speed;
        let grade = spline_grade(trans, &spline);
        if max_grade > Fixed32::ZERO {
            if grade >= max_grade {
                speed = Fixed32::ZERO;
            } else {
                let ratio = grade.div(max_grade);
                let scale = Fixed32::ONE.sub(Fixed32::from_raw(ratio.raw() >> 1));
                speed = speed.mul(scale);
            }
        }
        let speed_param = speed.div(spline.length);

        let mut m = mover;
        m.speed_param = speed_param;
        let new_param = m.param.add(speed_param.mul_ticks(ticks));
        let mut consumed = false;

        if speed_param >= Fixed32::ZERO {
            if new_param >= Fixed32::ONE {
                m.param = Fixed32::ONE;
                if m.kind == MoverKind::Item {
                    consumed = deliver(content, structs, &spline.endpoint_b, &m);
                }
            } else {
                m.param = new_param;
            }
        } else if new_param <= Fixed32::ZERO {
            m.param = Fixed32::ZERO;
            if m.kind == MoverKind::Item {
                consumed = deliver(content, structs, &spline.endpoint_a, &m);
            }
        } else {
            m.param = new_param;
        }

        if consumed {
            trans.movers.remove(&id);
        } else {
            m.param = m.param.clamp(Fixed32::ZERO, Fixed32::ONE);
            trans.movers.insert(id, m);
        }
    }
}

fn spawn_item_movers(world: &mut World) {
    let spline_ids: Vec<SplineId> = world.trans.splines.keys().copied().collect();
    for sid in spline_ids {
        let World { content, trans, structs, .. } = &mut *world;
        let Some(spline) = trans.splines.get(&sid).copied() else {
            continue;
        };
        if spline.endpoint_a.eid.is_none() || spline.endpoint_b.eid.is_none() {
            continue;
        }
        if !spline.endpoint_a.port_kind.emits_items() {
            continue;
        }
        let Some(profile) = content.spline_profile(spline.profile_id) else {
            continue;
        };
        if profile.kind != SplineKind::Item {
            continue;
        }
        let blocked = trans.movers.values().any(|m| m.spline_id == sid && m.param < SPAWN_GAP);
        if blocked {
            continue;
        }
        let Some(src) = structs.instances.get_mut(&spline.endpoint_a.eid) else {
            continue;
        };
        if !src.inv_out.is_present() {
            continue;
        }
        let Some(item) = src.inv_out.lowest_item() else {
            continue;
        };
        if src.inv_out.unpack(content, item, 1) != 1 {
            continue;
        }
        let init = Mover {
            id: MoverId::NONE,
            kind: MoverKind::Item,
            spline_id: sid,
            param: Fixed32::ZERO,
            speed_param: Fixed32::ZERO,
            size_param: SPAWN_GAP,
            payload_id: item,
            payload_count: 1,
        };
        if create_mover_state(trans, &init).is_err() {
            // Could not place the mover: the item goes back where it was.
            let _ = src.inv_out.pack(content, item, 1);
        }
    }
}

/// Transport subsystem entry.
pub struct TransportSubsystem;

impl Subsystem for TransportSubsystem {
    fn id(&self) -> SubsystemId {
        SubsystemId::Transport
    }

    fn name(&self) -> &'static str {
        "trans"
    }

    fn init_instance(&self, world: &mut World) {
        world.trans = TransState::default();
    }

    fn tick(&self, world: &mut World, ticks: u32) {
        if ticks == 0 {
            return;
        }
        // One spawn scan per tick, then movement in one batched step.
        for _ in 0..ticks {
            spawn_item_movers(world);
        }
        tick_movers(world, ticks);
    }

    fn save_instance(&self, world: &World) -> Vec<u8> {
        let trans = &world.trans;
        if trans.splines.is_empty() && trans.movers.is_empty() {
            return Vec::new();
        }
        let mut w = ByteWriter::versioned(INSTANCE_VERSION);
        w.u32(trans.nodes.len() as u32);
        for node in &trans.nodes {
            for p in node.pos {
                w.fixed64(p);
            }
            for n in node.normal {
                w.fixed32(n);
            }
        }
        w.u32(trans.splines.len() as u32);
        for s in trans.splines.values() {
            w.u32(s.id.raw());
            w.u32(s.profile_id.raw());
            w.u32(s.owner_org.raw());
            w.u16(s.flags);
            w.u32(s.node_start);
            w.u16(s.node_count);
            w.fixed32(s.length);
            for e in [&s.endpoint_a, &s.endpoint_b] {
                w.u32(e.eid.raw());
                w.u16(e.port_kind.code());
                w.u16(e.port_index);
            }
        }
        w.u32(trans.movers.len() as u32);
        for m in trans.movers.values() {
            w.u32(m.id.raw());
            w.u16(m.kind.code());
            w.u32(m.spline_id.raw());
            w.fixed32(m.param);
            w.fixed32(m.speed_param);
            w.fixed32(m.size_param);
            w.u32(m.payload_id.raw());
            w.u32(m.payload_count);
        }
        w.finish()
    }

    fn load_instance(&self, world: &mut World, bytes: &[u8]) -> Result<(), TlvError> {
        let mut r = ByteReader::new(bytes);
        r.version(INSTANCE_VERSION)?;
        world.trans = TransState::default();
        let node_count = r.u32()?;
        for _ in 0..node_count {
            let mut node = SplineNode::default();
            for p in &mut node.pos {
                *p = r.fixed64()?;
            }
            for n in &mut node.normal {
                *n = r.fixed32()?;
            }
            world.trans.nodes.push(node);
        }
        let spline_count = r.u32()?;
        for _ in 0..spline_count {
            let id = SplineId(r.u32()?);
            if id.is_none() {
                return Err(TlvError::BadHeader { field: "spline_id", value: 0 });
            }
            let profile_id = SplineProfileId(r.u32()?);
            let owner_org = OrgId(r.u32()?);
            let flags = r.u16()?;
            let node_start = r.u32()?;
            let node_count = r.u16()?;
            let length = r.fixed32()?;
            let mut endpoints = [SplineEndpoint::default(); 2];
            for e in &mut endpoints {
                e.eid = StructureId(r.u32()?);
                e.port_kind = PortKind::from_code(r.u16()?);
                e.port_index = r.u16()?;
            }
            world.trans.spline_ids.observe(id.raw());
            world.trans.splines.insert(
                id,
                SplineInstance {
                    id,
                    profile_id,
                    owner_org,
                    flags,
                    node_start,
                    node_count,
                    length,
                    endpoint_a: endpoints[0],
                    endpoint_b: endpoints[1],
                },
            );
        }
        let mover_count = r.u32()?;
        for _ in 0..mover_count {
            let id = MoverId(r.u32()?);
            if id.is_none() {
                return Err(TlvError::BadHeader { field: "mover_id", value: 0 });
            }
            let kind = MoverKind::from_code(r.u16()?);
            let spline_id = SplineId(r.u32()?);
            let mover = Mover {
                id,
                kind,
                spline_id,
                param: r.fixed32()?,
                speed_param: r.fixed32()?,
                size_param: r.fixed32()?,
                payload_id: ItemId(r.u32()?),
                payload_count: r.u32()?,
            };
            world.trans.mover_ids.observe(id.raw());
            world.trans.movers.insert(id, mover);
        }
        Ok(())
    }

    fn validate(&self, world: &World) -> Result<(), ValidateError> {
        for s in world.trans.splines.values() {
            let end = s.node_start as usize + usize::from(s.node_count);
            if s.node_count < 2 || end > world.trans.nodes.len() {
                return Err(ValidateError {
                    subsystem: SubsystemId::Transport,
                    invariant: "spline node ranges must lie inside the node pool",
                });
            }
        }
        for m in world.trans.movers.values() {
            if !world.trans.splines.contains_key(&m.spline_id) {
                return Err(ValidateError {
                    subsystem: SubsystemId::Transport,
                    invariant: "every mover must ride a live spline",
                });
            }
            if m.param < Fixed32::ZERO || m.param > Fixed32::ONE {
                return Err(ValidateError {
                    subsystem: SubsystemId::Transport,
                    invariant: "mover parameters must stay in [0, 1]",
                });
            }
        }
        Ok(())
    }
}
