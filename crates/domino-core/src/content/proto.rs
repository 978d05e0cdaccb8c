// SPDX-License-Identifier: Apache-2.0
//! Proto record types: the data side of the content catalog.
//!
//! A proto describes a *kind* of thing; live instances are created from
//! protos by the subsystems. Protos are immutable once loaded. Bodies that
//! stay data-driven (policy scope/effect, model params, job requirements)
//! are kept as raw KV bytes and interpreted at the point of use.

use bytes::Bytes;

use crate::content::tags;
use crate::fixed::{Fixed32, Fixed64};
use crate::ident::{
    ChannelId, ContainerProtoId, DepositProtoId, ItemId, JobTemplateId, MaterialId, PointSourceId,
    PolicyRuleId, ProcessId, ResearchId, SplineProfileId, StructureProtoId, TagMask,
};
use crate::tlv::TlvKv;

/// Well-known content tag bits the engine itself interprets.
///
/// All other bits are free for content authors; the engine only ever tests
/// masks.
pub mod tagbits {
    use crate::ident::TagMask;

    /// Structure runs processes and needs an operator.
    pub const STRUCTURE_MACHINE: TagMask = 1 << 0;
    /// Agent can walk.
    pub const CAP_WALK: TagMask = 1 << 1;
    /// Agent can operate machines.
    pub const CAP_OPERATE: TagMask = 1 << 2;
    /// Agent can haul items.
    pub const CAP_HAUL: TagMask = 1 << 3;
    /// Material/deposit is a fluid; hydrology exchanges water with channels
    /// carrying this tag.
    pub const MATERIAL_FLUID: TagMask = 1 << 4;
}

/// Material proto.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterialProto {
    /// Primary key.
    pub id: MaterialId,
    /// Display name.
    pub name: String,
    /// Content tag mask.
    pub tags: TagMask,
    /// Density, mass per unit volume.
    pub density: Fixed32,
}

/// Item proto.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemProto {
    /// Primary key.
    pub id: ItemId,
    /// Display name.
    pub name: String,
    /// Content tag mask.
    pub tags: TagMask,
    /// Base trade value, feeds the economy metrics.
    pub base_value: Fixed32,
    /// Mass per unit.
    pub unit_mass: Fixed32,
    /// Volume per unit.
    pub unit_volume: Fixed32,
    /// Backing material, if any.
    pub material_id: MaterialId,
}

/// Container proto.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerProto {
    /// Primary key.
    pub id: ContainerProtoId,
    /// Display name.
    pub name: String,
    /// Content tag mask.
    pub tags: TagMask,
    /// Slot count; 0 means bulk-only (stored as one slot).
    pub slot_count: u16,
    /// Volume capacity; zero disables the volume check.
    pub max_volume: Fixed32,
    /// Mass capacity; zero disables the mass check.
    pub max_mass: Fixed32,
}

/// Structure proto.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructureProto {
    /// Primary key.
    pub id: StructureProtoId,
    /// Display name.
    pub name: String,
    /// Content tag mask; [`tagbits::STRUCTURE_MACHINE`] marks machines.
    pub tags: TagMask,
    /// Input container proto; `NONE` for structures without an input side.
    pub inv_in: ContainerProtoId,
    /// Output container proto; `NONE` for structures without an output side.
    pub inv_out: ContainerProtoId,
    /// Allowed processes in declaration order; first is the default pick.
    pub processes: Vec<ProcessId>,
}

impl StructureProto {
    /// `true` when this proto runs processes and needs an operator.
    #[must_use]
    pub fn is_machine(&self) -> bool {
        self.tags & tagbits::STRUCTURE_MACHINE != 0
    }
}

/// Direction of a process IO term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum IoTermKind {
    /// Consumed from the input container each cycle.
    InputItem,
    /// Produced into the output container each cycle.
    OutputItem,
}

impl IoTermKind {
    /// Wire code.
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::InputItem => 1,
            Self::OutputItem => 2,
        }
    }

    /// Parses a wire code.
    #[must_use]
    pub const fn from_code(code: u16) -> Option<Self> {
        match code {
            1 => Some(Self::InputItem),
            2 => Some(Self::OutputItem),
            _ => None,
        }
    }
}

/// One input or output term of a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessIoTerm {
    /// Consumed or produced.
    pub kind: IoTermKind,
    /// Item moved by this term.
    pub item_id: ItemId,
    /// Rate per tick; `floor(rate * duration)` units move per cycle.
    pub rate: Fixed32,
}

/// Research yield `(kind, amount)` credited on a completion event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResearchYield {
    /// Point kind, matched against point-source protos.
    pub kind: u16,
    /// Points credited.
    pub amount: Fixed64,
}

/// Process proto.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessProto {
    /// Primary key.
    pub id: ProcessId,
    /// Display name.
    pub name: String,
    /// Content tag mask; matched by policy scopes.
    pub tags: TagMask,
    /// Cycle duration in ticks.
    pub base_duration: Fixed32,
    /// Input/output terms.
    pub io_terms: Vec<ProcessIoTerm>,
    /// Research yields credited per completed cycle.
    pub research_yields: Vec<ResearchYield>,
}

/// What a job is for; drives the agent runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum JobPurpose {
    /// No defined purpose; the agent idles at the target.
    #[default]
    None,
    /// Keep a machine staffed; the process runner does the work.
    OperateProcess,
    /// Carry items between containers.
    HaulItems,
    /// Erect a structure at the target.
    BuildStructure,
}

impl JobPurpose {
    /// Wire code.
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::None => 0,
            Self::OperateProcess => 1,
            Self::HaulItems => 2,
            Self::BuildStructure => 3,
        }
    }

    /// Parses a wire code; unknown codes read as `None`.
    #[must_use]
    pub const fn from_code(code: u16) -> Self {
        match code {
            1 => Self::OperateProcess,
            2 => Self::HaulItems,
            3 => Self::BuildStructure,
            _ => Self::None,
        }
    }
}

/// Job template proto.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobTemplateProto {
    /// Primary key.
    pub id: JobTemplateId,
    /// Display name.
    pub name: String,
    /// Content tag mask; matched by policy scopes.
    pub tags: TagMask,
    /// What jobs from this template do.
    pub purpose: JobPurpose,
    /// Bound process; `NONE` matches any.
    pub process_id: ProcessId,
    /// Bound structure proto; `NONE` matches any.
    pub structure_id: StructureProtoId,
    /// Requirements KV body (agent tags, duration).
    pub requirements: Bytes,
    /// Rewards KV body (payments).
    pub rewards: Bytes,
    /// Research yields credited on completion.
    pub research_yields: Vec<ResearchYield>,
}

impl JobTemplateProto {
    /// Capability tag mask an agent must fully cover.
    #[must_use]
    pub fn required_agent_tags(&self) -> TagMask {
        TlvKv::new(&self.requirements)
            .u32_field(tags::job_template::requirements::AGENT_TAGS)
            .unwrap_or(0)
    }

    /// Work duration in ticks; defaults to 1 when unspecified.
    #[must_use]
    pub fn duration(&self) -> Fixed32 {
        match TlvKv::new(&self.requirements).fixed32_field(tags::job_template::requirements::DURATION)
        {
            Some(d) if d > Fixed32::ZERO => d,
            _ => Fixed32::ONE,
        }
    }
}

/// Kind of traffic a spline profile carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SplineKind {
    /// Untyped.
    #[default]
    None,
    /// Discrete items (belts, chutes).
    Item,
    /// Fluids (pipes).
    Fluid,
    /// Vehicles (rails, roads).
    Vehicle,
    /// Agents (paths).
    Agent,
}

impl SplineKind {
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

/// Spline profile proto.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplineProfileProto {
    /// Primary key.
    pub id: SplineProfileId,
    /// Display name.
    pub name: String,
    /// Content tag mask.
    pub tags: TagMask,
    /// Traffic kind.
    pub kind: SplineKind,
    /// Profile flags.
    pub flags: u16,
    /// Base speed in world units per tick.
    pub base_speed: Fixed32,
    /// Grade at which movement stalls entirely.
    pub max_grade: Fixed32,
    /// Carrying capacity.
    pub capacity: Fixed32,
    /// Model parameter KV body.
    pub params: Bytes,
}

/// Research node proto.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResearchProto {
    /// Primary key.
    pub id: ResearchId,
    /// Display name.
    pub name: String,
    /// Content tag mask; matched by point-source target masks.
    pub tags: TagMask,
    /// Points required to complete; zero completes on first credit.
    pub cost: Fixed64,
    /// Prerequisites; all must be completed to unlock.
    pub prereqs: Vec<ResearchId>,
}

/// Research point-source proto: routes yield kinds to research nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointSourceProto {
    /// Primary key.
    pub id: PointSourceId,
    /// Display name.
    pub name: String,
    /// Point kind this source routes.
    pub kind: u16,
    /// Explicit target node; `NONE` when targeting by tags.
    pub target_research: ResearchId,
    /// Target nodes must carry all of these tags.
    pub target_tags_all: TagMask,
    /// Target nodes must carry any of these tags.
    pub target_tags_any: TagMask,
}

/// Policy rule proto. The engine evaluates; the bodies are data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyRuleProto {
    /// Primary key.
    pub id: PolicyRuleId,
    /// Display name.
    pub name: String,
    /// Scope KV body (all-of match).
    pub scope: Bytes,
    /// Conditions KV body (all-of match).
    pub conditions: Bytes,
    /// Effect KV body (allowed / multiplier / cap).
    pub effect: Bytes,
}

/// Deposit proto: seeds a resource channel in matching chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositProto {
    /// Primary key.
    pub id: DepositProtoId,
    /// Display name.
    pub name: String,
    /// Content tag mask.
    pub tags: TagMask,
    /// Resource channel this deposit feeds.
    pub channel_id: ChannelId,
    /// Material yielded by the deposit.
    pub material_id: MaterialId,
    /// Model parameter KV body (strata params).
    pub params: Bytes,
}
