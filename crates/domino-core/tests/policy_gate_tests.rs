// SPDX-License-Identifier: Apache-2.0
//! Policy gating of processes and job creation, including research-based
//! conditions.

#![allow(missing_docs)]
#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use bytes::Bytes;
use common::{fixture_catalog, HAUL, ORE, SMELT, SMELTER, SMELTING_TECH};
use domino_core::content::proto::{tagbits, PolicyRuleProto};
use domino_core::content::tags;
use domino_core::ident::{AgentId, EntityId, JobId, OrgId, PolicyRuleId, SplineId, StructureId};
use domino_core::job::{self, Agent, AgentCaps, JobError};
use domino_core::policy::PolicySubject;
use domino_core::structure::{self, machine_flags, ContainerSide};
use domino_core::tlv::TlvKvWriter;
use domino_core::{research, ContentCatalog, Fixed32, Fixed64, World};

/// Denies running the smelt process until the smelting tech is completed.
fn smelt_needs_tech(catalog: &mut ContentCatalog) {
    let mut scope = TlvKvWriter::new();
    scope.field_u32(tags::policy_rule::scope::SUBJECT_KIND, PolicySubject::Process.code());
    scope.field_u32(tags::policy_rule::scope::SUBJECT_ID, SMELT.raw());
    let mut conditions = TlvKvWriter::new();
    conditions.field_u32(
        tags::policy_rule::condition::RESEARCH_NOT_COMPLETED,
        SMELTING_TECH.raw(),
    );
    let mut effect = TlvKvWriter::new();
    effect.field_u32(tags::policy_rule::effect::ALLOWED, 0);
    catalog.add_policy_rule(PolicyRuleProto {
        id: PolicyRuleId(1),
        name: "smelting-needs-tech".into(),
        scope: Bytes::from(scope.finish()),
        conditions: Bytes::from(conditions.finish()),
        effect: Bytes::from(effect.finish()),
    });
}

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

#[test]
fn research_condition_gates_the_process() {
    let mut catalog = fixture_catalog();
    smelt_needs_tech(&mut catalog);
    let mut w = World::new(2, catalog).unwrap();
    let org = domino_core::org::org_create(&mut w, Fixed64::from_int(100));
    let smelter =
        structure::create(&mut w, SMELTER, org, [Fixed32::ZERO; 3], Fixed32::ZERO).unwrap();
    job::agent_register(&mut w, operator(org)).unwrap();
    structure::pack_items(&mut w, smelter, ContainerSide::In, ORE, 5).unwrap();

    // Denied: the tech is not completed, so the machine is policy-blocked
    // and no output appears.
    w.tick(6);
    let inst = structure::get(&w, smelter).unwrap();
    assert_eq!(
        inst.machine.state_flags,
        machine_flags::BLOCKED | machine_flags::POLICY_BLOCKED
    );
    assert_eq!(structure::count_items(&w, smelter, ContainerSide::In, ORE), 5);

    // Complete the research: the deny condition stops matching.
    research::add_progress(&mut w, org, SMELTING_TECH, Fixed64::from_int(10)).unwrap();
    assert!(research::is_completed(&w, org, SMELTING_TECH));
    w.tick(1); // staff the machine
    w.tick(5);
    assert!(structure::count_items(&w, smelter, ContainerSide::In, ORE) < 5);
}

#[test]
fn multiplier_scales_cycle_progress() {
    let mut catalog = fixture_catalog();
    // Double the smelter's speed.
    let mut scope = TlvKvWriter::new();
    scope.field_u32(tags::policy_rule::scope::SUBJECT_KIND, PolicySubject::Process.code());
    let mut effect = TlvKvWriter::new();
    effect.field_fixed32(tags::policy_rule::effect::MULTIPLIER, Fixed32::from_int(2));
    catalog.add_policy_rule(PolicyRuleProto {
        id: PolicyRuleId(1),
        name: "overclock".into(),
        scope: Bytes::from(scope.finish()),
        conditions: Bytes::new(),
        effect: Bytes::from(effect.finish()),
    });
    let mut w = World::new(2, catalog).unwrap();
    let org = domino_core::org::org_create(&mut w, Fixed64::from_int(100));
    let smelter =
        structure::create(&mut w, SMELTER, org, [Fixed32::ZERO; 3], Fixed32::ZERO).unwrap();
    job::agent_register(&mut w, operator(org)).unwrap();
    structure::pack_items(&mut w, smelter, ContainerSide::In, ORE, 4).unwrap();

    w.tick(1);
    // At 2x, a four-tick cycle finishes within two ticks of wall time.
    w.tick(2);
    assert_eq!(structure::count_items(&w, smelter, ContainerSide::Out, common::INGOT), 1);
}

#[test]
fn job_request_respects_policy_deny() {
    let mut catalog = fixture_catalog();
    let mut scope = TlvKvWriter::new();
    scope.field_u32(tags::policy_rule::scope::SUBJECT_KIND, PolicySubject::JobTemplate.code());
    scope.field_u32(tags::policy_rule::scope::SUBJECT_ID, HAUL.raw());
    let mut effect = TlvKvWriter::new();
    effect.field_u32(tags::policy_rule::effect::ALLOWED, 0);
    catalog.add_policy_rule(PolicyRuleProto {
        id: PolicyRuleId(1),
        name: "no-hauling".into(),
        scope: Bytes::from(scope.finish()),
        conditions: Bytes::new(),
        effect: Bytes::from(effect.finish()),
    });
    let mut w = World::new(2, catalog).unwrap();
    let err = job::request(&mut w, HAUL, StructureId::NONE, SplineId::NONE, [Fixed64::ZERO; 3]);
    assert_eq!(err.unwrap_err(), JobError::PolicyDenied(HAUL));
    assert_eq!(job::count(&w), 0);
}
