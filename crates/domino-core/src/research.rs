// SPDX-License-Identifier: Apache-2.0
//! Research: per-org progress over the content research tree, plus point
//! routing from completion yields.
//!
//! Every org gets one progress entry per research node in the catalog. Nodes
//! with prerequisites start `Locked` and unlock when all prereqs complete.
//! Progress only moves forward: credits clamp at the node's cost and a
//! completed node never regresses.
//!
//! Yields carry a point *kind*; point-source protos route each kind to a
//! research node via explicit targets and tag masks. The active node wins
//! when it is among the candidates.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::content::proto::ResearchYield;
use crate::content::ContentCatalog;
use crate::fixed::Fixed64;
use crate::ident::{JobTemplateId, OrgId, ProcessId, ResearchId};
use crate::subsystem::{Subsystem, SubsystemId, ValidateError};
use crate::tlv::{ByteReader, ByteWriter, TlvError};
use crate::world::World;

const INSTANCE_VERSION: u32 = 1;

/// State of one research node for one org.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ResearchNodeState {
    /// Unlocked, not being worked on.
    #[default]
    Pending,
    /// The org's current focus; at most one per org.
    Active,
    /// Finished; progress stays at cost.
    Completed,
    /// Prerequisites outstanding.
    Locked,
}

impl ResearchNodeState {
    /// Wire code.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Active => 1,
            Self::Completed => 2,
            Self::Locked => 3,
        }
    }

    /// Parses a wire code; unknown codes read as `Pending`.
    #[must_use]
    pub const fn from_code(code: u8) -> Self {
        match code {
            1 => Self::Active,
            2 => Self::Completed,
            3 => Self::Locked,
            _ => Self::Pending,
        }
    }
}

/// Progress of one node for one org.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ResearchProgress {
    /// Node id.
    pub id: ResearchId,
    /// Accumulated points, clamped at the node cost.
    pub progress: Fixed64,
    /// Node state.
    pub state: ResearchNodeState,
}

/// Errors from research operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ResearchError {
    /// The org has no research table (never initialized).
    #[error("org {0} has no research state")]
    NoSuchOrg(OrgId),

    /// The node id does not exist for this org.
    #[error("no research node {0}")]
    NoSuchNode(ResearchId),

    /// The node cannot be targeted in its current state.
    #[error("research node {0} is locked or completed")]
    NotSelectable(ResearchId),

    /// Progress credits must be positive.
    #[error("progress amount must be positive")]
    InvalidAmount,
}

/// Per-world research tables.
#[derive(Debug, Clone, Default)]
pub struct ResearchState {
    pub(crate) orgs: BTreeMap<OrgId, BTreeMap<ResearchId, ResearchProgress>>,
}

impl ResearchState {
    /// `true` when the org has completed the node.
    #[must_use]
    pub fn is_completed(&self, org: OrgId, id: ResearchId) -> bool {
        self.orgs
            .get(&org)
            .and_then(|m| m.get(&id))
            .is_some_and(|p| p.state == ResearchNodeState::Completed)
    }

    /// `true` when the node is anything but `Locked` for the org.
    #[must_use]
    pub fn is_unlocked(&self, org: OrgId, id: ResearchId) -> bool {
        self.orgs
            .get(&org)
            .and_then(|m| m.get(&id))
            .is_some_and(|p| p.state != ResearchNodeState::Locked)
    }

    /// The org's active node, if any.
    #[must_use]
    pub fn active(&self, org: OrgId) -> Option<ResearchId> {
        self.orgs.get(&org)?.values().find(|p| p.state == ResearchNodeState::Active).map(|p| p.id)
    }

    fn first_selectable(&self, org: OrgId) -> Option<ResearchId> {
        self.orgs.get(&org)?.values()
            .find(|p| {
                p.state == ResearchNodeState::Pending || p.state == ResearchNodeState::Active
            })
            .map(|p| p.id)
    }
}

fn prereqs_satisfied(content: &ContentCatalog, table: &BTreeMap<ResearchId, ResearchProgress>, id: ResearchId) -> bool {
    let Some(proto) = content.research(id) else {
        return false;
    };
    proto.prereqs.iter().all(|prereq| {
        table.get(prereq).is_some_and(|p| p.state == ResearchNodeState::Completed)
    })
}

fn update_lock_states(content: &ContentCatalog, table: &mut BTreeMap<ResearchId, ResearchProgress>) {
    let unlockable: Vec<ResearchId> = table
        .values()
        .filter(|p| p.state == ResearchNodeState::Locked)
        .filter(|p| prereqs_satisfied(content, table, p.id))
        .map(|p| p.id)
        .collect();
    for id in unlockable {
        if let Some(p) = table.get_mut(&id) {
            p.state = ResearchNodeState::Pending;
        }
    }
}

/// Seeds the research table for a new org.
pub(crate) fn org_init(world: &mut World, org: OrgId) {
    let (content, research) = (&world.content, &mut world.research);
    org_init_state(research, content, org);
}

pub(crate) fn org_init_state(research: &mut ResearchState, content: &ContentCatalog, org: OrgId) {
    if org.is_none() || research.orgs.contains_key(&org) {
        return;
    }
    let mut table = BTreeMap::new();
    for proto in content.research_nodes() {
        table.insert(
            proto.id,
            ResearchProgress {
                id: proto.id,
                progress: Fixed64::ZERO,
                state: if proto.prereqs.is_empty() {
                    ResearchNodeState::Pending
                } else {
                    ResearchNodeState::Locked
                },
            },
        );
    }
    research.orgs.insert(org, table);
}

/// Marks a node as the org's focus; the previous active goes back to
/// `Pending`. Locked and completed nodes cannot be selected.
pub fn set_active(world: &mut World, org: OrgId, id: ResearchId) -> Result<(), ResearchError> {
    let table = world.research.orgs.get_mut(&org).ok_or(ResearchError::NoSuchOrg(org))?;
    let state = table.get(&id).ok_or(ResearchError::NoSuchNode(id))?.state;
    if state == ResearchNodeState::Locked || state == ResearchNodeState::Completed {
        return Err(ResearchError::NotSelectable(id));
    }
    for p in table.values_mut() {
        if p.state == ResearchNodeState::Active {
            p.state = ResearchNodeState::Pending;
        }
    }
    if let Some(p) = table.get_mut(&id) {
        p.state = ResearchNodeState::Active;
    }
    Ok(())
}

/// Credits points to a node, completing it at cost and unlocking dependents.
pub fn add_progress(world: &mut World, org: OrgId, id: ResearchId, amount: Fixed64) -> Result<(), ResearchError> {
    let (content, research) = (&world.content, &mut world.research);
    add_progress_state(research, content, org, id, amount)
}

pub(crate) fn add_progress_state(
    research: &mut ResearchState,
    content: &ContentCatalog,
    org: OrgId,
    id: ResearchId,
    amount: Fixed64,
) -> Result<(), ResearchError> {
    if amount <= Fixed64::ZERO {
        return Err(ResearchError::InvalidAmount);
    }
    let table = research.orgs.get_mut(&org).ok_or(ResearchError::NoSuchOrg(org))?;
    let entry = table.get_mut(&id).ok_or(ResearchError::NoSuchNode(id))?;
    match entry.state {
        ResearchNodeState::Locked => return Err(ResearchError::NotSelectable(id)),
        ResearchNodeState::Completed => return Ok(()),
        ResearchNodeState::Pending | ResearchNodeState::Active => {}
    }

    let required = content.research(id).map_or(Fixed64::ZERO, |p| p.cost);
    entry.progress = entry.progress.add(amount);
    if required > Fixed64::ZERO && entry.progress >= required {
        entry.progress = required;
        entry.state = ResearchNodeState::Completed;
        update_lock_states(content, table);
    } else if required == Fixed64::ZERO {
        entry.state = ResearchNodeState::Completed;
        update_lock_states(content, table);
    }
    Ok(())
}

/// The org's full progress table, sorted by node id.
#[must_use]
pub fn org_progress(world: &World, org: OrgId) -> Vec<ResearchProgress> {
    world.research.orgs.get(&org).map(|m| m.values().copied().collect()).unwrap_or_default()
}

/// `true` when the org has completed the node.
#[must_use]
pub fn is_completed(world: &World, org: OrgId, id: ResearchId) -> bool {
    world.research.is_completed(org, id)
}

/// `true` when the node is anything but `Locked` for the org.
#[must_use]
pub fn is_unlocked(world: &World, org: OrgId, id: ResearchId) -> bool {
    world.research.is_unlocked(org, id)
}

/// The org's active node, if any.
#[must_use]
pub fn active(world: &World, org: OrgId) -> Option<ResearchId> {
    world.research.active(org)
}

fn collect_candidates(content: &ContentCatalog, kind: u16) -> Vec<ResearchId> {
    let mut out: Vec<ResearchId> = Vec::new();
    for src in content.point_sources() {
        if src.kind != kind {
            continue;
        }
        if src.target_research.is_some() && !out.contains(&src.target_research) {
            out.push(src.target_research);
        }
        if src.target_tags_all != 0 || src.target_tags_any != 0 {
            for node in content.research_nodes() {
                if src.target_tags_all != 0 && node.tags & src.target_tags_all != src.target_tags_all
                {
                    continue;
                }
                if src.target_tags_any != 0 && node.tags & src.target_tags_any == 0 {
                    continue;
                }
                if !out.contains(&node.id) {
                    out.push(node.id);
                }
            }
        }
    }
    out.sort();
    out
}

fn choose_target(
    research: &ResearchState,
    org: OrgId,
    candidates: &[ResearchId],
) -> Option<ResearchId> {
    let table = research.orgs.get(&org)?;
    if let Some(active) = research.active(org) {
        if candidates.contains(&active) {
            return Some(active);
        }
    }
    candidates
        .iter()
        .find(|id| {
            table.get(id).is_some_and(|p| {
                p.state != ResearchNodeState::Locked && p.state != ResearchNodeState::Completed
            })
        })
        .copied()
}

fn apply_points(
    research: &mut ResearchState,
    content: &ContentCatalog,
    org: OrgId,
    kind: u16,
    amount: Fixed64,
) {
    if amount <= Fixed64::ZERO {
        return;
    }
    let candidates = collect_candidates(content, kind);
    let target = choose_target(research, org, &candidates)
        .or_else(|| research.active(org))
        .or_else(|| research.first_selectable(org));
    if let Some(target) = target {
        let _ = add_progress_state(research, content, org, target, amount);
    }
}

/// Routes yields declared on a list to the owning org.
pub(crate) fn apply_yields(
    research: &mut ResearchState,
    content: &ContentCatalog,
    org: OrgId,
    yields: &[ResearchYield],
) {
    if org.is_none() {
        return;
    }
    for y in yields {
        if y.kind == 0 || y.amount <= Fixed64::ZERO {
            continue;
        }
        apply_points(research, content, org, y.kind, y.amount);
    }
}

/// Credits the yields of a completed process cycle.
pub(crate) fn apply_process_completion(
    research: &mut ResearchState,
    content: &ContentCatalog,
    org: OrgId,
    process: ProcessId,
) {
    let Some(proto) = content.process(process) else {
        return;
    };
    let yields = proto.research_yields.clone();
    apply_yields(research, content, org, &yields);
}

/// Credits the yields of a completed job.
pub(crate) fn apply_job_completion(
    research: &mut ResearchState,
    content: &ContentCatalog,
    org: OrgId,
    template: JobTemplateId,
) {
    let Some(proto) = content.job_template(template) else {
        return;
    };
    let yields = proto.research_yields.clone();
    apply_yields(research, content, org, &yields);
}

/// Research subsystem entry.
pub struct ResearchSubsystem;

impl Subsystem for ResearchSubsystem {
    fn id(&self) -> SubsystemId {
        SubsystemId::Research
    }

    fn name(&self) -> &'static str {
        "research"
    }

    fn init_instance(&self, world: &mut World) {
        world.research = ResearchState::default();
    }

    fn save_instance(&self, world: &World) -> Vec<u8> {
        if world.research.orgs.is_empty() {
            return Vec::new();
        }
        let mut w = ByteWriter::versioned(INSTANCE_VERSION);
        w.u32(world.research.orgs.len() as u32);
        for (org, table) in &world.research.orgs {
            w.u32(org.raw());
            w.u32(table.len() as u32);
            for p in table.values() {
                w.u32(p.id.raw());
                w.fixed64(p.progress);
                w.u8(p.state.code());
                w.u8(0);
                w.u8(0);
                w.u8(0);
            }
        }
        w.finish()
    }

    fn load_instance(&self, world: &mut World, bytes: &[u8]) -> Result<(), TlvError> {
        let mut r = ByteReader::new(bytes);
        r.version(INSTANCE_VERSION)?;
        world.research = ResearchState::default();
        let org_count = r.u32()?;
        for _ in 0..org_count {
            let org = OrgId(r.u32()?);
            let node_count = r.u32()?;
            let mut table = BTreeMap::new();
            for _ in 0..node_count {
                let id = ResearchId(r.u32()?);
                let progress = r.fixed64()?;
                let state = ResearchNodeState::from_code(r.u8()?);
                r.u8()?;
                r.u8()?;
                r.u8()?;
                table.insert(id, ResearchProgress { id, progress, state });
            }
            if org.is_none() {
                return Err(TlvError::BadHeader { field: "org_id", value: 0 });
            }
            world.research.orgs.insert(org, table);
        }
        Ok(())
    }

    fn validate(&self, world: &World) -> Result<(), ValidateError> {
        for table in world.research.orgs.values() {
            let active = table.values().filter(|p| p.state == ResearchNodeState::Active).count();
            if active > 1 {
                return Err(ValidateError {
                    subsystem: SubsystemId::Research,
                    invariant: "at most one active research node per org",
                });
            }
            for p in table.values() {
                if p.progress.is_negative() {
                    return Err(ValidateError {
                        subsystem: SubsystemId::Research,
                        invariant: "research progress must stay non-negative",
                    });
                }
            }
        }
        Ok(())
    }
}
