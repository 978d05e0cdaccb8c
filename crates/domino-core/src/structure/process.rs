// SPDX-License-Identifier: Apache-2.0
//! Process runner: machines consume inputs and emit outputs per cycle.
//!
//! Per tick, structures are visited in sorted-id order. A machine picks its
//! first allowed process, passes the policy gate, requires a running
//! operator job, and prechecks inputs before a cycle starts. Progress
//! advances by `ticks · policy multiplier`; each completed cycle re-verifies
//! inputs, moves items through the containers, feeds the economy metrics,
//! and credits research yields.
//!
//! Missing inputs stall a machine (flags, not errors); a tick never aborts.

use std::collections::BTreeMap;

use crate::content::proto::{IoTermKind, ProcessProto, StructureProto};
use crate::content::ContentCatalog;
use crate::econ::{self, EconState};
use crate::fixed::{Fixed32, Fixed64};
use crate::ident::{JobTemplateId, ProcessId, StructureId};
use crate::job::{JobRecord, JobState, JobStatus};
use crate::policy::{self, PolicyContext, PolicySubject};
use crate::research::{self, ResearchState};
use crate::structure::{machine_flags, StructState, StructureInstance};
use crate::world::World;

/// Per-process completion counters, kept in memory for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProcessStats {
    /// Process these counters describe.
    pub process_id: ProcessId,
    /// Completed cycles across all machines.
    pub cycles_completed: u32,
    /// Output units packed across all machines.
    pub output_units: u32,
}

/// Number of processes with recorded stats.
#[must_use]
pub fn stats_count(world: &World) -> usize {
    world.structs.stats.len()
}

/// Stats by sorted process-id index.
#[must_use]
pub fn stats_get_by_index(world: &World, index: usize) -> Option<ProcessStats> {
    world.structs.stats.values().nth(index).copied()
}

/// Units moved per cycle by one IO term: `floor(rate · duration)`.
fn amount_per_cycle(rate: Fixed32, duration: Fixed32) -> u32 {
    if rate <= Fixed32::ZERO || duration <= Fixed32::ZERO {
        return 0;
    }
    let v = rate.mul(duration).to_int();
    if v <= 0 {
        0
    } else {
        v as u32
    }
}

fn inputs_available(inst: &StructureInstance, proc: &ProcessProto) -> bool {
    for term in &proc.io_terms {
        if term.kind != IoTermKind::InputItem {
            continue;
        }
        let need = amount_per_cycle(term.rate, proc.base_duration);
        if need == 0 {
            continue;
        }
        if inst.inv_in.count_item(term.item_id) < need {
            return false;
        }
    }
    true
}

fn has_operator_job(
    content: &ContentCatalog,
    jobs: &JobState,
    structure: StructureId,
    running_only: bool,
) -> bool {
    jobs.records().any(|rec| {
        if rec.target_struct != structure {
            return false;
        }
        let open = if running_only {
            rec.status == JobStatus::Running
        } else {
            rec.status != JobStatus::Completed && rec.status != JobStatus::Cancelled
        };
        if !open {
            return false;
        }
        content
            .job_template(rec.template_id)
            .is_some_and(|t| t.purpose == crate::content::proto::JobPurpose::OperateProcess)
    })
}

/// Lowest-id operator template matching this structure proto and process.
fn find_operator_template(
    content: &ContentCatalog,
    proto: &StructureProto,
    process: ProcessId,
) -> JobTemplateId {
    let mut best = JobTemplateId::NONE;
    for t in content.job_templates() {
        if t.purpose != crate::content::proto::JobPurpose::OperateProcess {
            continue;
        }
        if t.process_id.is_some() && process.is_some() && t.process_id != process {
            continue;
        }
        if t.structure_id.is_some() && t.structure_id != proto.id {
            continue;
        }
        if best.is_none() || t.id < best {
            best = t.id;
        }
    }
    best
}

fn ensure_operator_job(
    content: &ContentCatalog,
    research: &ResearchState,
    jobs: &mut JobState,
    inst: &StructureInstance,
    proto: &StructureProto,
    process: ProcessId,
) {
    if !proto.is_machine() {
        return;
    }
    if has_operator_job(content, jobs, inst.id, false) {
        return;
    }
    let template_id = find_operator_template(content, proto, process);
    if template_id.is_none() {
        return;
    }
    let tags = content.job_template(template_id).map_or(0, |t| t.tags);
    let effect = policy::evaluate(
        content,
        research,
        &PolicyContext {
            org_id: inst.owner_org,
            subject: PolicySubject::JobTemplate,
            subject_id: template_id.raw(),
            subject_tags: tags,
        },
    );
    if !effect.allowed {
        return;
    }
    let _ = crate::job::create_record(
        jobs,
        JobRecord {
            template_id,
            target_struct: inst.id,
            ..JobRecord::default()
        },
    );
}

#[allow(clippy::too_many_arguments)]
fn tick_machine(
    content: &ContentCatalog,
    research: &mut ResearchState,
    jobs: &mut JobState,
    econ: &mut EconState,
    stats: &mut BTreeMap<ProcessId, ProcessStats>,
    inst: &mut StructureInstance,
    proto: &StructureProto,
    ticks: u32,
) {
    let mut process = inst.machine.active_process_id;
    if process.is_none() {
        process = proto.processes.first().copied().unwrap_or(ProcessId::NONE);
        inst.machine.active_process_id = process;
    }
    let Some(proc) = content.process(process) else {
        inst.machine.state_flags = machine_flags::IDLE;
        return;
    };
    if proc.base_duration <= Fixed32::ZERO {
        inst.machine.state_flags = machine_flags::IDLE;
        return;
    }

    let effect = policy::evaluate(
        content,
        research,
        &PolicyContext {
            org_id: inst.owner_org,
            subject: PolicySubject::Process,
            subject_id: process.raw(),
            subject_tags: proc.tags,
        },
    );
    if !effect.permits() {
        inst.machine.state_flags = machine_flags::BLOCKED | machine_flags::POLICY_BLOCKED;
        return;
    }

    ensure_operator_job(content, research, jobs, inst, proto, process);
    if proto.is_machine() && !has_operator_job(content, jobs, inst.id, true) {
        inst.machine.state_flags = machine_flags::IDLE;
        return;
    }

    // A new cycle only starts with every input on hand.
    if inst.machine.progress == Fixed32::ZERO && !inputs_available(inst, proc) {
        inst.machine.state_flags = machine_flags::IDLE;
        return;
    }

    let dt = Fixed32::from_int(ticks as i32).mul(effect.multiplier);
    if dt <= Fixed32::ZERO {
        inst.machine.state_flags = machine_flags::BLOCKED | machine_flags::POLICY_BLOCKED;
        return;
    }
    inst.machine.progress = inst.machine.progress.add(dt);
    inst.machine.state_flags = machine_flags::ACTIVE;

    while inst.machine.progress >= proc.base_duration {
        // Inputs are re-verified at commit time; a competing consumer may
        // have drained the container since the precheck.
        if !inputs_available(inst, proc) {
            inst.machine.state_flags = machine_flags::BLOCKED;
            inst.machine.progress = proc.base_duration;
            return;
        }

        for term in &proc.io_terms {
            if term.kind != IoTermKind::InputItem {
                continue;
            }
            let need = amount_per_cycle(term.rate, proc.base_duration);
            if need == 0 {
                continue;
            }
            let unpacked = inst.inv_in.unpack(content, term.item_id, need);
            if unpacked != need {
                inst.machine.state_flags = machine_flags::BLOCKED;
                inst.machine.progress = proc.base_duration;
                return;
            }
            econ::register_production(
                econ,
                content,
                inst.owner_org,
                term.item_id,
                Fixed64::from_int(-i64::from(unpacked)),
            );
        }

        for term in &proc.io_terms {
            if term.kind != IoTermKind::OutputItem {
                continue;
            }
            let out = amount_per_cycle(term.rate, proc.base_duration);
            if out == 0 {
                continue;
            }
            let packed = if inst.inv_out.is_present() {
                inst.inv_out.pack(content, term.item_id, out)
            } else {
                0
            };
            if packed > 0 {
                econ::register_production(
                    econ,
                    content,
                    inst.owner_org,
                    term.item_id,
                    Fixed64::from_int(i64::from(packed)),
                );
                let s = stats.entry(process).or_insert(ProcessStats {
                    process_id: process,
                    ..ProcessStats::default()
                });
                s.output_units += packed;
            }
        }

        let s = stats
            .entry(process)
            .or_insert(ProcessStats { process_id: process, ..ProcessStats::default() });
        s.cycles_completed += 1;

        research::apply_process_completion(research, content, inst.owner_org, process);

        inst.machine.progress = inst.machine.progress.sub(proc.base_duration).max(Fixed32::ZERO);
    }
}

/// Advances every machine by `ticks`, in sorted structure-id order.
pub(crate) fn tick(world: &mut World, ticks: u32) {
    let ids: Vec<StructureId> = world.structs.instances.keys().copied().collect();
    for id in ids {
        let World { content, structs, jobs, econ, research, .. } = &mut *world;
        let StructState { instances, stats, .. } = structs;
        let Some(inst) = instances.get_mut(&id) else {
            continue;
        };
        let Some(proto) = content.structure(inst.proto_id) else {
            continue;
        };
        if proto.processes.is_empty() {
            continue;
        }
        tick_machine(content, research, jobs, econ, stats, inst, proto, ticks);
    }
}
