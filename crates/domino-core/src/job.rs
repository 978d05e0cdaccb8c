// SPDX-License-Identifier: Apache-2.0
//! Jobs, planner, and agents.
//!
//! Job records walk a fixed state machine: `Pending → Assigned → Running →
//! Completed`, with `Cancelled` reachable from anywhere. Rewards (payments
//! and research yields) fire exactly once, when a completed job is first
//! observed by the reward pass.
//!
//! The planner matches pending jobs to idle agents by capability mask, both
//! sides in sorted-id order, first fit wins. The agent runner moves agents
//! greedily along the axes toward their job target and accrues progress for
//! self-timed purposes; machine operation is driven by the process runner
//! instead.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::content::proto::JobPurpose;
use crate::content::{tags, ContentCatalog};
use crate::fixed::{Fixed32, Fixed64};
use crate::ident::{
    AccountId, AgentId, EntityId, IdAlloc, JobId, JobTemplateId, OrgId, SplineId, StructureId,
    TagMask,
};
use crate::policy::{self, PolicyContext, PolicySubject};
use crate::subsystem::{Subsystem, SubsystemId, ValidateError};
use crate::tlv::{ByteReader, ByteWriter, TlvError, TlvKv};
use crate::world::World;

const INSTANCE_VERSION: u32 = 1;

/// Job state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum JobStatus {
    /// Waiting for the planner.
    #[default]
    Pending,
    /// Matched to an agent that is still travelling.
    Assigned,
    /// Agent on site, work in progress.
    Running,
    /// Finished; rewards fire once.
    Completed,
    /// Abandoned; terminal.
    Cancelled,
}

impl JobStatus {
    /// Wire code.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Assigned => 1,
            Self::Running => 2,
            Self::Completed => 3,
            Self::Cancelled => 4,
        }
    }

    /// Parses a wire code; unknown codes read as `Pending`.
    #[must_use]
    pub const fn from_code(code: u8) -> Self {
        match code {
            1 => Self::Assigned,
            2 => Self::Running,
            3 => Self::Completed,
            4 => Self::Cancelled,
            _ => Self::Pending,
        }
    }

    /// `true` for `Completed` and `Cancelled`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

/// One job record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JobRecord {
    /// Stable id.
    pub id: JobId,
    /// Template this job instantiates.
    pub template_id: JobTemplateId,
    /// State machine position.
    pub status: JobStatus,
    /// Agent working the job; `NONE` until assigned.
    pub assigned_agent: AgentId,
    /// Target structure, when the job is about a structure.
    pub target_struct: StructureId,
    /// Target spline, when the job is about a spline.
    pub target_spline: SplineId,
    /// Literal target position fallback.
    pub target: [Fixed64; 3],
    /// Work progress in ticks.
    pub progress: Fixed32,
}

/// Agent capabilities for job matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AgentCaps {
    /// Capability tag bits; must cover a template's required mask.
    pub tags: TagMask,
    /// Travel speed in world units per tick.
    pub max_speed: Fixed32,
    /// Carry limit.
    pub max_carry_mass: Fixed32,
}

/// Agent flag bits.
pub mod agent_flags {
    /// No job.
    pub const IDLE: u16 = 1 << 0;
    /// Travelling to a job target.
    pub const MOVING: u16 = 1 << 1;
    /// At the target, working.
    pub const EXECUTING: u16 = 1 << 2;
}

/// One agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Agent {
    /// Stable id.
    pub id: AgentId,
    /// Owning entity in an outer ECS, if any.
    pub owner_entity: EntityId,
    /// Owning organization.
    pub owner_org: OrgId,
    /// Matching and movement capabilities.
    pub caps: AgentCaps,
    /// Job the agent works; `NONE` when idle.
    pub current_job: JobId,
    /// World position.
    pub pos: [Fixed64; 3],
    /// Agent flag bits.
    pub flags: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct JobEntry {
    pub(crate) rec: JobRecord,
    pub(crate) reward_applied: bool,
}

/// Errors from job and agent operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum JobError {
    /// Template id does not resolve.
    #[error("no such job template {0}")]
    NoSuchTemplate(JobTemplateId),

    /// Job id does not resolve.
    #[error("no such job {0}")]
    NoSuchJob(JobId),

    /// Agent id does not resolve.
    #[error("no such agent {0}")]
    NoSuchAgent(AgentId),

    /// An agent with the requested id already exists.
    #[error("agent {0} already exists")]
    DuplicateAgent(AgentId),

    /// A policy rule forbids creating this job.
    #[error("policy denies job template {0}")]
    PolicyDenied(JobTemplateId),
}

/// Per-world job and agent tables.
#[derive(Debug, Clone, Default)]
pub struct JobState {
    pub(crate) entries: BTreeMap<JobId, JobEntry>,
    pub(crate) job_ids: IdAlloc,
    pub(crate) agents: BTreeMap<AgentId, Agent>,
    pub(crate) agent_ids: IdAlloc,
}

impl JobState {
    /// Job records sorted by id.
    pub(crate) fn records(&self) -> impl Iterator<Item = &JobRecord> {
        self.entries.values().map(|e| &e.rec)
    }
}

/// Inserts a record into the raw tables, allocating its id. The template id
/// must be set; everything else defaults.
pub(crate) fn create_record(jobs: &mut JobState, mut rec: JobRecord) -> JobId {
    if rec.template_id.is_none() {
        return JobId::NONE;
    }
    let id = JobId(jobs.job_ids.alloc());
    rec.id = id;
    jobs.entries.insert(id, JobEntry { rec, reward_applied: false });
    id
}

/// Requests a job from a template, policy-gated under the org owning the
/// target structure or spline.
pub fn request(
    world: &mut World,
    template_id: JobTemplateId,
    target_struct: StructureId,
    target_spline: SplineId,
    target: [Fixed64; 3],
) -> Result<JobId, JobError> {
    let Some(template) = world.content.job_template(template_id) else {
        return Err(JobError::NoSuchTemplate(template_id));
    };
    let template_tags = template.tags;

    let mut org = OrgId::NONE;
    if target_struct.is_some() {
        if let Some(inst) = crate::structure::get(world, target_struct) {
            org = inst.owner_org;
        }
    }
    if org.is_none() && target_spline.is_some() {
        if let Some(spline) = crate::trans::spline_get(world, target_spline) {
            org = spline.owner_org;
        }
    }

    let effect = policy::evaluate(
        &world.content,
        &world.research,
        &PolicyContext {
            org_id: org,
            subject: PolicySubject::JobTemplate,
            subject_id: template_id.raw(),
            subject_tags: template_tags,
        },
    );
    if !effect.allowed {
        return Err(JobError::PolicyDenied(template_id));
    }

    let id = create_record(
        &mut world.jobs,
        JobRecord {
            template_id,
            target_struct,
            target_spline,
            target,
            ..JobRecord::default()
        },
    );
    if id.is_none() {
        return Err(JobError::NoSuchTemplate(template_id));
    }
    Ok(id)
}

/// Cancels a job; terminal and idempotent-safe.
pub fn cancel(world: &mut World, id: JobId) -> Result<(), JobError> {
    let entry = world.jobs.entries.get_mut(&id).ok_or(JobError::NoSuchJob(id))?;
    entry.rec.status = JobStatus::Cancelled;
    Ok(())
}

/// Job by id.
#[must_use]
pub fn get(world: &World, id: JobId) -> Option<JobRecord> {
    world.jobs.entries.get(&id).map(|e| e.rec)
}

/// Replaces a job record; the id must already exist.
pub fn update(world: &mut World, rec: JobRecord) -> Result<(), JobError> {
    let entry = world.jobs.entries.get_mut(&rec.id).ok_or(JobError::NoSuchJob(rec.id))?;
    entry.rec = rec;
    Ok(())
}

/// Number of jobs.
#[must_use]
pub fn count(world: &World) -> usize {
    world.jobs.entries.len()
}

/// Job by sorted index.
#[must_use]
pub fn get_by_index(world: &World, index: usize) -> Option<JobRecord> {
    world.jobs.entries.values().nth(index).map(|e| e.rec)
}

/// Registers an agent. A non-zero id in `init` is honored (used by loaders);
/// collisions fail.
pub fn agent_register(world: &mut World, init: Agent) -> Result<AgentId, JobError> {
    let agents = &mut world.jobs;
    let id = if init.id.is_some() {
        if agents.agents.contains_key(&init.id) {
            return Err(JobError::DuplicateAgent(init.id));
        }
        agents.agent_ids.observe(init.id.raw());
        init.id
    } else {
        AgentId(agents.agent_ids.alloc())
    };
    let mut agent = init;
    agent.id = id;
    if agent.flags == 0 {
        agent.flags = agent_flags::IDLE;
    }
    agents.agents.insert(id, agent);
    Ok(id)
}

/// Removes an agent.
pub fn agent_unregister(world: &mut World, id: AgentId) -> Result<(), JobError> {
    world.jobs.agents.remove(&id).map(|_| ()).ok_or(JobError::NoSuchAgent(id))
}

/// Agent by id.
#[must_use]
pub fn agent_get(world: &World, id: AgentId) -> Option<Agent> {
    world.jobs.agents.get(&id).copied()
}

/// Number of agents.
#[must_use]
pub fn agent_count(world: &World) -> usize {
    world.jobs.agents.len()
}

/// Agent by sorted index.
#[must_use]
pub fn agent_get_by_index(world: &World, index: usize) -> Option<Agent> {
    world.jobs.agents.values().nth(index).copied()
}

fn agent_eligible(agent: &Agent, required: TagMask) -> bool {
    agent.current_job.is_none() && agent.caps.tags & required == required
}

/// Matches pending jobs to idle agents, both sides in sorted-id order.
fn planner_tick(world: &mut World) {
    let job_ids: Vec<JobId> = world.jobs.entries.keys().copied().collect();
    let mut pool: Vec<AgentId> = world.jobs.agents.keys().copied().collect();

    for jid in job_ids {
        let World { content, jobs, .. } = &mut *world;
        let JobState { entries, agents, .. } = jobs;
        let Some(entry) = entries.get_mut(&jid) else {
            continue;
        };
        if entry.rec.status != JobStatus::Pending {
            continue;
        }
        let Some(template) = content.job_template(entry.rec.template_id) else {
            // Stale template: nothing can ever run this job.
            entry.rec.status = JobStatus::Cancelled;
            continue;
        };
        let required = template.required_agent_tags();

        let mut picked = None;
        for (slot, aid) in pool.iter().enumerate() {
            if aid.is_none() {
                continue;
            }
            let Some(agent) = agents.get(aid) else {
                continue;
            };
            if agent_eligible(agent, required) {
                picked = Some((slot, *aid));
                break;
            }
        }
        let Some((slot, aid)) = picked else {
            continue;
        };

        entry.rec.assigned_agent = aid;
        entry.rec.status = JobStatus::Assigned;
        entry.rec.progress = Fixed32::ZERO;
        if let Some(agent) = agents.get_mut(&aid) {
            agent.current_job = jid;
            agent.flags = agent_flags::MOVING;
        }
        pool[slot] = AgentId::NONE;
    }
}

fn target_for_job(world: &World, rec: &JobRecord) -> [Fixed64; 3] {
    if rec.target_struct.is_some() {
        if let Some(inst) = crate::structure::get(world, rec.target_struct) {
            return [inst.pos[0].widen(), inst.pos[1].widen(), inst.pos[2].widen()];
        }
    }
    if rec.target_spline.is_some() {
        if let Some(pos) = crate::trans::sample_pos_state(
            &world.trans,
            rec.target_spline,
            Fixed32::from_ratio(1, 2),
        ) {
            return pos;
        }
    }
    rec.target
}

fn move_toward(agent: &mut Agent, target: [Fixed64; 3], max_step: Fixed64) {
    let mut remaining = max_step;
    agent.flags &= !agent_flags::IDLE;
    agent.flags |= agent_flags::MOVING;

    while remaining > Fixed64::ZERO {
        let mut moved = false;
        for axis in 0..3 {
            if agent.pos[axis] == target[axis] {
                continue;
            }
            let delta = target[axis].sub(agent.pos[axis]);
            let step = delta.abs().min(remaining);
            agent.pos[axis] = if delta.is_negative() {
                agent.pos[axis].sub(step)
            } else {
                agent.pos[axis].add(step)
            };
            remaining = remaining.sub(step);
            moved = true;
            break;
        }
        if !moved {
            break;
        }
    }

    if agent.pos == target {
        agent.flags &= !agent_flags::MOVING;
        agent.flags |= agent_flags::EXECUTING;
    }
}

fn template_duration(content: &ContentCatalog, template_id: JobTemplateId) -> Fixed32 {
    content.job_template(template_id).map_or(Fixed32::ONE, |t| t.duration())
}

/// Moves agents and advances self-timed job work.
fn agent_tick(world: &mut World, ticks: u32) {
    let ids: Vec<AgentId> = world.jobs.agents.keys().copied().collect();
    for aid in ids {
        let Some(mut agent) = world.jobs.agents.get(&aid).copied() else {
            continue;
        };

        if agent.current_job.is_none() {
            agent.flags = agent_flags::IDLE;
            world.jobs.agents.insert(aid, agent);
            continue;
        }
        let Some(mut rec) = get(world, agent.current_job) else {
            agent.current_job = JobId::NONE;
            agent.flags = agent_flags::IDLE;
            world.jobs.agents.insert(aid, agent);
            continue;
        };
        if rec.status.is_terminal() {
            agent.current_job = JobId::NONE;
            agent.flags = agent_flags::IDLE;
            world.jobs.agents.insert(aid, agent);
            continue;
        }
        let Some(template) = world.content.job_template(rec.template_id) else {
            let _ = cancel(world, rec.id);
            agent.current_job = JobId::NONE;
            agent.flags = agent_flags::IDLE;
            world.jobs.agents.insert(aid, agent);
            continue;
        };
        let purpose = template.purpose;

        let target = target_for_job(world, &rec);
        let max_step = agent.caps.max_speed.widen().mul_ticks(ticks);

        if agent.pos != target {
            move_toward(&mut agent, target, max_step);
            world.jobs.agents.insert(aid, agent);
            continue;
        }

        if rec.status == JobStatus::Assigned {
            rec.status = JobStatus::Running;
            rec.progress = Fixed32::ZERO;
        }

        match purpose {
            // The process runner does the actual work; the operator just
            // keeps the machine staffed.
            JobPurpose::OperateProcess | JobPurpose::None => {}
            JobPurpose::HaulItems | JobPurpose::BuildStructure => {
                rec.progress = rec.progress.add(Fixed32::from_int(ticks as i32));
                if rec.progress >= template_duration(&world.content, rec.template_id) {
                    rec.status = JobStatus::Completed;
                    agent.current_job = JobId::NONE;
                    agent.flags = agent_flags::IDLE;
                }
            }
        }

        if let Some(entry) = world.jobs.entries.get_mut(&rec.id) {
            entry.rec = rec;
        }
        world.jobs.agents.insert(aid, agent);
    }
}

fn payment_of(template: &crate::content::proto::JobTemplateProto) -> Option<(AccountId, AccountId, Fixed64)> {
    let rewards = TlvKv::new(&template.rewards);
    let payment = rewards.field(tags::job_template::rewards::PAYMENT)?;
    let kv = TlvKv::new(payment);
    let from = AccountId(kv.u32_field(tags::job_template::rewards::payment::FROM_ACCOUNT)?);
    let to = AccountId(kv.u32_field(tags::job_template::rewards::payment::TO_ACCOUNT)?);
    let amount = kv.fixed64_field(tags::job_template::rewards::payment::AMOUNT)?;
    Some((from, to, amount))
}

/// Fires payments and research yields for newly completed jobs, exactly
/// once per job.
fn reward_tick(world: &mut World) {
    let ids: Vec<JobId> = world.jobs.entries.keys().copied().collect();
    for jid in ids {
        let World { content, jobs, orgs, research, structs, .. } = &mut *world;
        let Some(entry) = jobs.entries.get_mut(&jid) else {
            continue;
        };
        if entry.reward_applied || entry.rec.status != JobStatus::Completed {
            continue;
        }
        if let Some(template) = content.job_template(entry.rec.template_id) {
            if let Some((from, to, amount)) = payment_of(template) {
                if from.is_some() && to.is_some() && amount > Fixed64::ZERO {
                    let _ = crate::org::transfer_state(orgs, from, to, amount);
                }
            }
            let org = structs
                .instances
                .get(&entry.rec.target_struct)
                .map_or(OrgId::NONE, |inst| inst.owner_org);
            if org.is_some() {
                crate::research::apply_job_completion(
                    research,
                    content,
                    org,
                    entry.rec.template_id,
                );
            }
        }
        entry.reward_applied = true;
    }
}

/// Job subsystem entry.
pub struct JobSubsystem;

impl Subsystem for JobSubsystem {
    fn id(&self) -> SubsystemId {
        SubsystemId::Job
    }

    fn name(&self) -> &'static str {
        "job"
    }

    fn init_instance(&self, world: &mut World) {
        world.jobs = JobState::default();
    }

    fn tick(&self, world: &mut World, ticks: u32) {
        if ticks == 0 {
            return;
        }
        planner_tick(world);
        agent_tick(world, ticks);
        reward_tick(world);
    }

    fn save_instance(&self, world: &World) -> Vec<u8> {
        if world.jobs.entries.is_empty() && world.jobs.agents.is_empty() {
            return Vec::new();
        }
        let mut w = ByteWriter::versioned(INSTANCE_VERSION);
        w.u32(world.jobs.entries.len() as u32);
        for entry in world.jobs.entries.values() {
            let rec = &entry.rec;
            w.u32(rec.id.raw());
            w.u32(rec.template_id.raw());
            w.u8(rec.status.code());
            w.u8(u8::from(entry.reward_applied));
            w.u16(0);
            w.u32(rec.assigned_agent.raw());
            w.u32(rec.target_struct.raw());
            w.u32(rec.target_spline.raw());
            for t in rec.target {
                w.fixed64(t);
            }
            w.fixed32(rec.progress);
        }
        w.u32(world.jobs.agents.len() as u32);
        for agent in world.jobs.agents.values() {
            w.u32(agent.id.raw());
            w.u32(agent.owner_entity.raw());
            w.u32(agent.owner_org.raw());
            w.u32(agent.caps.tags);
            w.fixed32(agent.caps.max_speed);
            w.fixed32(agent.caps.max_carry_mass);
            w.u32(agent.current_job.raw());
            for p in agent.pos {
                w.fixed64(p);
            }
            w.u16(agent.flags);
        }
        w.finish()
    }

    fn load_instance(&self, world: &mut World, bytes: &[u8]) -> Result<(), TlvError> {
        let mut r = ByteReader::new(bytes);
        r.version(INSTANCE_VERSION)?;
        world.jobs = JobState::default();
        let job_count = r.u32()?;
        for _ in 0..job_count {
            let id = JobId(r.u32()?);
            if id.is_none() {
                return Err(TlvError::BadHeader { field: "job_id", value: 0 });
            }
            let template_id = JobTemplateId(r.u32()?);
            let status = JobStatus::from_code(r.u8()?);
            let reward_applied = r.u8()? != 0;
            r.u16()?;
            let assigned_agent = AgentId(r.u32()?);
            let target_struct = StructureId(r.u32()?);
            let target_spline = SplineId(r.u32()?);
            let mut target = [Fixed64::ZERO; 3];
            for t in &mut target {
                *t = r.fixed64()?;
            }
            let progress = r.fixed32()?;
            world.jobs.job_ids.observe(id.raw());
            world.jobs.entries.insert(
                id,
                JobEntry {
                    rec: JobRecord {
                        id,
                        template_id,
                        status,
                        assigned_agent,
                        target_struct,
                        target_spline,
                        target,
                        progress,
                    },
                    reward_applied,
                },
            );
        }
        let agent_count = r.u32()?;
        for _ in 0..agent_count {
            let id = AgentId(r.u32()?);
            if id.is_none() {
                return Err(TlvError::BadHeader { field: "agent_id", value: 0 });
            }
            let owner_entity = EntityId(r.u32()?);
            let owner_org = OrgId(r.u32()?);
            let caps = AgentCaps {
                tags: r.u32()?,
                max_speed: r.fixed32()?,
                max_carry_mass: r.fixed32()?,
            };
            let current_job = JobId(r.u32()?);
            let mut pos = [Fixed64::ZERO; 3];
            for p in &mut pos {
                *p = r.fixed64()?;
            }
            let flags = r.u16()?;
            world.jobs.agent_ids.observe(id.raw());
            world.jobs.agents.insert(
                id,
                Agent { id, owner_entity, owner_org, caps, current_job, pos, flags },
            );
        }
        Ok(())
    }

    fn validate(&self, world: &World) -> Result<(), ValidateError> {
        for entry in world.jobs.entries.values() {
            if entry.rec.status == JobStatus::Assigned || entry.rec.status == JobStatus::Running {
                if entry.rec.assigned_agent.is_none()
                    || !world.jobs.agents.contains_key(&entry.rec.assigned_agent)
                {
                    return Err(ValidateError {
                        subsystem: SubsystemId::Job,
                        invariant: "assigned jobs must reference a live agent",
                    });
                }
            }
            if entry.rec.progress.is_negative() {
                return Err(ValidateError {
                    subsystem: SubsystemId::Job,
                    invariant: "job progress must stay non-negative",
                });
            }
        }
        for agent in world.jobs.agents.values() {
            if agent.current_job.is_some() && !world.jobs.entries.contains_key(&agent.current_job)
            {
                return Err(ValidateError {
                    subsystem: SubsystemId::Job,
                    invariant: "agents must reference live jobs",
                });
            }
        }
        Ok(())
    }
}
