// SPDX-License-Identifier: Apache-2.0
//! End-to-end coverage of the machine loop: operator staffing, input
//! consumption, output production, yield routing, and batch equivalence.

#![allow(missing_docs)]
#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{fixture_catalog, INGOT, OPERATE, ORE, SMELT, SMELTER, SMELTING_TECH};
use domino_core::content::proto::tagbits;
use domino_core::ident::{AgentId, EntityId, JobId, OrgId, StructureId};
use domino_core::job::{self, Agent, AgentCaps, JobStatus};
use domino_core::structure::{self, machine_flags, ContainerSide};
use domino_core::{econ, research, Fixed32, Fixed64, World};

fn operator(org: OrgId) -> Agent {
    Agent {
        id: AgentId::NONE,
        owner_entity: EntityId::NONE,
        owner_org: org,
        caps: AgentCaps {
            tags: tagbits::CAP_OPERATE,
            max_speed: Fixed32::from_int(2),
            max_carry_mass: Fixed32::from_int(10),
        },
        current_job: JobId::NONE,
        pos: [Fixed64::ZERO; 3],
        flags: 0,
    }
}

fn machine_world() -> (World, OrgId, StructureId) {
    let mut w = World::new(1, fixture_catalog()).unwrap();
    let org = domino_core::org::org_create(&mut w, Fixed64::from_int(100));
    let smelter =
        structure::create(&mut w, SMELTER, org, [Fixed32::ZERO; 3], Fixed32::ZERO).unwrap();
    job::agent_register(&mut w, operator(org)).unwrap();
    (w, org, smelter)
}

#[test]
fn machine_idles_without_inputs() {
    let (mut w, _org, smelter) = machine_world();
    w.tick(3);
    let inst = structure::get(&w, smelter).unwrap();
    assert_eq!(inst.machine.state_flags, machine_flags::IDLE);
    assert_eq!(inst.machine.progress, Fixed32::ZERO);
}

#[test]
fn cycles_consume_inputs_and_produce_outputs() {
    let (mut w, org, smelter) = machine_world();
    assert_eq!(structure::pack_items(&mut w, smelter, ContainerSide::In, ORE, 3).unwrap(), 3);

    // Tick 1 staffs the machine (operator job created, assigned, running);
    // the next eight ticks run two full four-tick cycles.
    w.tick(1);
    w.tick(8);

    assert_eq!(structure::count_items(&w, smelter, ContainerSide::In, ORE), 1);
    assert_eq!(structure::count_items(&w, smelter, ContainerSide::Out, INGOT), 2);

    let stats = structure::process::stats_get_by_index(&w, 0).unwrap();
    assert_eq!(stats.process_id, SMELT);
    assert_eq!(stats.cycles_completed, 2);
    assert_eq!(stats.output_units, 2);

    // Each cycle credits 2 smelt points to the targeted research node.
    let progress = research::org_progress(&w, org);
    let smelting = progress.iter().find(|p| p.id == SMELTING_TECH).unwrap();
    assert_eq!(smelting.progress, Fixed64::from_int(4));

    // Output value flowed into the org's economy metrics.
    let metrics = econ::org_metrics(&w, org).unwrap();
    assert!(metrics.total_output > Fixed64::ZERO);
    assert!(w.validate().is_ok());
}

#[test]
fn operator_job_reaches_running_via_planner() {
    let (mut w, _org, smelter) = machine_world();
    structure::pack_items(&mut w, smelter, ContainerSide::In, ORE, 1).unwrap();
    w.tick(1);
    let rec = job::get_by_index(&w, 0).unwrap();
    assert_eq!(rec.template_id, OPERATE);
    assert_eq!(rec.status, JobStatus::Running);
    assert_eq!(rec.target_struct, smelter);
    let agent = job::agent_get_by_index(&w, 0).unwrap();
    assert_eq!(agent.current_job, rec.id);
}

#[test]
fn creation_order_does_not_change_outcomes() {
    // Two smelters created in opposite orders; effects must match because
    // everything iterates by id, not insertion order.
    let run = |reversed: bool| {
        let mut w = World::new(9, fixture_catalog()).unwrap();
        let org = domino_core::org::org_create(&mut w, Fixed64::from_int(100));
        let mk = |w: &mut World, x: i32| {
            structure::create(
                w,
                SMELTER,
                org,
                [Fixed32::from_int(x), Fixed32::ZERO, Fixed32::ZERO],
                Fixed32::ZERO,
            )
            .unwrap()
        };
        let (a, b) = if reversed {
            let b = mk(&mut w, 1);
            let a = mk(&mut w, 0);
            (a, b)
        } else {
            let a = mk(&mut w, 0);
            let b = mk(&mut w, 1);
            (a, b)
        };
        for s in [a, b] {
            structure::pack_items(&mut w, s, ContainerSide::In, ORE, 2).unwrap();
        }
        let mut op = operator(org);
        op.pos = [Fixed64::ZERO; 3];
        job::agent_register(&mut w, op).unwrap();
        let mut op2 = operator(org);
        op2.pos = [Fixed64::from_int(1), Fixed64::ZERO, Fixed64::ZERO];
        job::agent_register(&mut w, op2).unwrap();
        w.tick(1);
        w.tick(12);
        let progress = research::org_progress(&w, org);
        let points = progress.iter().find(|p| p.id == SMELTING_TECH).unwrap().progress;
        let stats = structure::process::stats_get_by_index(&w, 0).unwrap();
        (points, stats.cycles_completed, stats.output_units)
    };
    assert_eq!(run(false), run(true));
}

#[test]
fn step_and_batch_ticks_agree_on_machine_state() {
    let build = || {
        let (mut w, org, smelter) = machine_world();
        structure::pack_items(&mut w, smelter, ContainerSide::In, ORE, 4).unwrap();
        w.tick(1); // staff the machine in both worlds
        (w, org, smelter)
    };

    let (mut stepped, org_a, smelter_a) = build();
    stepped.tick(2);
    stepped.tick(6);

    let (mut batched, org_b, smelter_b) = build();
    batched.tick(8);

    let observe = |w: &World, org: OrgId, s: StructureId| {
        let inst = structure::get(w, s).unwrap();
        (
            inst.machine.progress,
            structure::count_items(w, s, ContainerSide::In, ORE),
            structure::count_items(w, s, ContainerSide::Out, INGOT),
            research::org_progress(w, org)
                .iter()
                .find(|p| p.id == SMELTING_TECH)
                .unwrap()
                .progress,
        )
    };
    assert_eq!(observe(&stepped, org_a, smelter_a), observe(&batched, org_b, smelter_b));
}

#[test]
fn machine_goes_idle_when_inputs_run_out() {
    let (mut w, _org, smelter) = machine_world();
    // One ore: the first cycle commits; afterwards the precheck at zero
    // progress fails and the machine idles.
    structure::pack_items(&mut w, smelter, ContainerSide::In, ORE, 1).unwrap();
    w.tick(1);
    w.tick(4);
    assert_eq!(structure::count_items(&w, smelter, ContainerSide::Out, INGOT), 1);
    let inst = structure::get(&w, smelter).unwrap();
    assert_eq!(inst.machine.progress, Fixed32::ZERO);
    w.tick(3);
    let inst = structure::get(&w, smelter).unwrap();
    assert_eq!(inst.machine.state_flags, machine_flags::IDLE);
}
