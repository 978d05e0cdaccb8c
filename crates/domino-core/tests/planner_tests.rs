// SPDX-License-Identifier: Apache-2.0
//! Planner assignment order, capability matching, and one-shot rewards.

#![allow(missing_docs)]
#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use bytes::Bytes;
use common::{fixture_catalog, HAUL};
use domino_core::content::proto::{tagbits, JobPurpose, JobTemplateProto};
use domino_core::content::tags;
use domino_core::ident::{
    AgentId, EntityId, JobId, JobTemplateId, OrgId, ProcessId, SplineId, StructureId,
    StructureProtoId,
};
use domino_core::job::{self, Agent, AgentCaps, JobStatus};
use domino_core::org;
use domino_core::tlv::TlvKvWriter;
use domino_core::{Fixed32, Fixed64, World};

fn hauler(org: OrgId, tags_mask: u32) -> Agent {
    Agent {
        id: AgentId::NONE,
        owner_entity: EntityId::NONE,
        owner_org: org,
        caps: AgentCaps {
            tags: tags_mask,
            max_speed: Fixed32::from_int(2),
            max_carry_mass: Fixed32::from_int(10),
        },
        current_job: JobId::NONE,
        pos: [Fixed64::ZERO; 3],
        flags: 0,
    }
}

fn request_haul(w: &mut World) -> JobId {
    job::request(w, HAUL, StructureId::NONE, SplineId::NONE, [Fixed64::ZERO; 3]).unwrap()
}

#[test]
fn unqualified_agents_are_skipped() {
    let mut w = World::new(1, fixture_catalog()).unwrap();
    let org = org::org_create(&mut w, Fixed64::ZERO);
    job::agent_register(&mut w, hauler(org, tagbits::CAP_WALK)).unwrap();
    let jid = request_haul(&mut w);
    w.tick(3);
    assert_eq!(job::get(&w, jid).unwrap().status, JobStatus::Pending);
}

#[test]
fn lowest_job_id_wins_the_only_agent() {
    let mut w = World::new(1, fixture_catalog()).unwrap();
    let org = org::org_create(&mut w, Fixed64::ZERO);
    job::agent_register(&mut w, hauler(org, tagbits::CAP_HAUL)).unwrap();
    let first = request_haul(&mut w);
    let second = request_haul(&mut w);
    assert!(first < second);

    w.tick(1);
    assert_eq!(job::get(&w, first).unwrap().status, JobStatus::Running);
    assert_eq!(job::get(&w, second).unwrap().status, JobStatus::Pending);

    // The haul takes four ticks of on-site work; afterwards the agent frees
    // up and the second job gets its turn.
    w.tick(3);
    assert_eq!(job::get(&w, first).unwrap().status, JobStatus::Completed);
    w.tick(1);
    assert_eq!(job::get(&w, second).unwrap().status, JobStatus::Running);
}

#[test]
fn cancellation_is_terminal() {
    let mut w = World::new(1, fixture_catalog()).unwrap();
    let org = org::org_create(&mut w, Fixed64::ZERO);
    job::agent_register(&mut w, hauler(org, tagbits::CAP_HAUL)).unwrap();
    let jid = request_haul(&mut w);
    job::cancel(&mut w, jid).unwrap();
    w.tick(5);
    assert_eq!(job::get(&w, jid).unwrap().status, JobStatus::Cancelled);
    // The agent never picked it up.
    assert!(job::agent_get_by_index(&w, 0).unwrap().current_job.is_none());
}

#[test]
fn payment_reward_fires_exactly_once() {
    let mut catalog = fixture_catalog();
    // Paid haul: 5 units from account 1 (org A) to account 2 (org B).
    let mut reqs = TlvKvWriter::new();
    reqs.field_u32(tags::job_template::requirements::AGENT_TAGS, tagbits::CAP_HAUL);
    reqs.field_fixed32(tags::job_template::requirements::DURATION, Fixed32::from_int(2));
    let mut payment = TlvKvWriter::new();
    payment.field_u32(tags::job_template::rewards::payment::FROM_ACCOUNT, 1);
    payment.field_u32(tags::job_template::rewards::payment::TO_ACCOUNT, 2);
    payment.field_fixed64(tags::job_template::rewards::payment::AMOUNT, Fixed64::from_int(5));
    let mut rewards = TlvKvWriter::new();
    rewards.field_bytes(tags::job_template::rewards::PAYMENT, &payment.finish());
    let paid_haul = JobTemplateId(9);
    catalog.add_job_template(JobTemplateProto {
        id: paid_haul,
        name: "paid-haul".into(),
        tags: 0,
        purpose: JobPurpose::HaulItems,
        process_id: ProcessId::NONE,
        structure_id: StructureProtoId::NONE,
        requirements: Bytes::from(reqs.finish()),
        rewards: Bytes::from(rewards.finish()),
        research_yields: Vec::new(),
    });

    let mut w = World::new(1, catalog).unwrap();
    let payer = org::org_create(&mut w, Fixed64::from_int(20));
    let payee = org::org_create(&mut w, Fixed64::ZERO);
    job::agent_register(&mut w, hauler(payee, tagbits::CAP_HAUL)).unwrap();
    let jid =
        job::request(&mut w, paid_haul, StructureId::NONE, SplineId::NONE, [Fixed64::ZERO; 3])
            .unwrap();

    w.tick(2);
    assert_eq!(job::get(&w, jid).unwrap().status, JobStatus::Completed);
    let payer_balance = org::org_account(&w, payer).unwrap().balance;
    let payee_balance = org::org_account(&w, payee).unwrap().balance;
    assert_eq!(payer_balance, Fixed64::from_int(15));
    assert_eq!(payee_balance, Fixed64::from_int(5));

    // Further ticks must not re-fire the reward.
    w.tick(10);
    assert_eq!(org::org_account(&w, payer).unwrap().balance, Fixed64::from_int(15));
    assert_eq!(org::org_account(&w, payee).unwrap().balance, Fixed64::from_int(5));

    // Conservation: total balance is unchanged by the transfer.
    assert_eq!(payer_balance.add(payee_balance), Fixed64::from_int(20));
}

#[test]
fn assigned_jobs_move_agents_toward_the_target() {
    let mut w = World::new(1, fixture_catalog()).unwrap();
    let org = org::org_create(&mut w, Fixed64::ZERO);
    let mut far = hauler(org, tagbits::CAP_HAUL);
    far.pos = [Fixed64::from_int(10), Fixed64::ZERO, Fixed64::ZERO];
    job::agent_register(&mut w, far).unwrap();
    let jid = job::request(
        &mut w,
        HAUL,
        StructureId::NONE,
        SplineId::NONE,
        [Fixed64::ZERO, Fixed64::from_int(4), Fixed64::ZERO],
    )
    .unwrap();

    w.tick(1);
    // Speed 2: two units of travel done, x leg first.
    let agent = job::agent_get_by_index(&w, 0).unwrap();
    assert_eq!(agent.pos[0], Fixed64::from_int(8));
    assert_eq!(job::get(&w, jid).unwrap().status, JobStatus::Assigned);

    w.tick(6);
    let agent = job::agent_get_by_index(&w, 0).unwrap();
    assert_eq!(agent.pos[0], Fixed64::ZERO);
    assert_eq!(agent.pos[1], Fixed64::from_int(4));

    // Work starts on the first tick spent at the target.
    w.tick(1);
    assert_eq!(job::get(&w, jid).unwrap().status, JobStatus::Running);
}
