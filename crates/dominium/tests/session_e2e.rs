// SPDX-License-Identifier: Apache-2.0
//! Full product-layer loop: author a pack, load it through the registry,
//! run a session, and replay it bit-identically.

#![allow(missing_docs)]
#![allow(clippy::unwrap_used, clippy::expect_used)]

use dominium::config::{DeterminismModeConfig, ReplayModeConfig};
use dominium::{ContentRegistry, PackBuilder, RecordBuilder, Session, SessionConfig};

use domino_core::content::proto::tagbits;
use domino_core::content::tags;
use domino_core::ident::{AgentId, EntityId, ItemId, JobId, StructureProtoId};
use domino_core::job::{Agent, AgentCaps};
use domino_core::structure::{self, ContainerSide};
use domino_core::{Fixed32, Fixed64};

const ORE: ItemId = ItemId(1);
const INGOT: ItemId = ItemId(2);

fn forge_pack() -> Vec<u8> {
    PackBuilder::new()
        .record(tags::record::MATERIAL, RecordBuilder::new(1, "iron"))
        .record(
            tags::record::ITEM,
            RecordBuilder::new(ORE.raw(), "ore")
                .fixed32(tags::item::BASE_VALUE, Fixed32::ONE)
                .fixed32(tags::item::UNIT_MASS, Fixed32::ONE)
                .fixed32(tags::item::UNIT_VOLUME, Fixed32::ONE),
        )
        .record(
            tags::record::ITEM,
            RecordBuilder::new(INGOT.raw(), "ingot")
                .fixed32(tags::item::BASE_VALUE, Fixed32::from_int(4))
                .fixed32(tags::item::UNIT_MASS, Fixed32::ONE)
                .fixed32(tags::item::UNIT_VOLUME, Fixed32::ONE),
        )
        .record(
            tags::record::CONTAINER,
            RecordBuilder::new(1, "hopper")
                .u16(tags::container::SLOT_COUNT, 4)
                .fixed32(tags::container::MAX_VOLUME, Fixed32::from_int(50)),
        )
        .record(
            tags::record::PROCESS,
            RecordBuilder::new(1, "forge")
                .fixed32(tags::process::BASE_DURATION, Fixed32::from_int(4))
                .sub(tags::process::IO_TERM, |kv| {
                    kv.field_u16(tags::process::io_term::KIND, 1);
                    kv.field_u32(tags::process::io_term::ITEM_ID, ORE.raw());
                    kv.field_fixed32(tags::process::io_term::RATE, Fixed32::from_ratio(1, 4));
                })
                .sub(tags::process::IO_TERM, |kv| {
                    kv.field_u16(tags::process::io_term::KIND, 2);
                    kv.field_u32(tags::process::io_term::ITEM_ID, INGOT.raw());
                    kv.field_fixed32(tags::process::io_term::RATE, Fixed32::from_ratio(1, 4));
                }),
        )
        .record(
            tags::record::STRUCTURE,
            RecordBuilder::new(1, "forge-hut")
                .tags(tagbits::STRUCTURE_MACHINE)
                .u32(tags::structure::INV_IN, 1)
                .u32(tags::structure::INV_OUT, 1)
                .u32(tags::structure::PROCESS_ALLOWED, 1),
        )
        .record(
            tags::record::JOB_TEMPLATE,
            RecordBuilder::new(1, "operate-forge")
                .u16(tags::job_template::PURPOSE, 1)
                .u32(tags::job_template::PROCESS_ID, 1)
                .sub(tags::job_template::REQUIREMENTS, |kv| {
                    kv.field_u32(
                        tags::job_template::requirements::AGENT_TAGS,
                        tagbits::CAP_OPERATE,
                    );
                }),
        )
        .finish()
}

fn forge_session(seed: u64) -> Session {
    let mut registry = ContentRegistry::new();
    registry.load_as_pack(&forge_pack()).unwrap();
    let config = SessionConfig {
        seed,
        replay: ReplayModeConfig::Record,
        determinism: DeterminismModeConfig::Record,
        ..SessionConfig::default()
    };
    let mut session = Session::new(&config, registry).unwrap();

    let world = session.world_mut();
    let org = domino_core::org::org_create(world, Fixed64::from_int(10));
    let hut = structure::create(
        world,
        StructureProtoId(1),
        org,
        [Fixed32::ZERO; 3],
        Fixed32::ZERO,
    )
    .unwrap();
    structure::pack_items(world, hut, ContainerSide::In, ORE, 4).unwrap();
    domino_core::job::agent_register(
        world,
        Agent {
            id: AgentId::NONE,
            owner_entity: EntityId::NONE,
            owner_org: org,
            caps: AgentCaps {
                tags: tagbits::CAP_OPERATE,
                max_speed: Fixed32::ONE,
                max_carry_mass: Fixed32::ONE,
            },
            current_job: JobId::NONE,
            pos: [Fixed64::ZERO; 3],
            flags: 0,
        },
    )
    .unwrap();
    session
}

#[test]
fn authored_content_drives_a_live_machine() {
    let mut session = forge_session(1);
    session.submit_input(1, b"light-forge");
    session.advance(1).unwrap();
    session.advance(8).unwrap();

    let world = session.world();
    let hut = structure::get_by_index(world, 0).unwrap();
    assert_eq!(structure::count_items(world, hut.id, ContainerSide::Out, INGOT), 2);
    session.validate().unwrap();
    assert_eq!(session.replay().frame_count(), 2);
}

#[test]
fn sessions_with_equal_seeds_match_digests() {
    let mut a = forge_session(42);
    let mut b = forge_session(42);
    a.advance(5).unwrap();
    b.advance(5).unwrap();
    assert_eq!(a.digest(), b.digest());
}

#[test]
fn session_save_load_round_trips() {
    let mut session = forge_session(7);
    session.advance(4).unwrap();
    let bytes = session.save();

    let mut registry = ContentRegistry::new();
    registry.load_as_pack(&forge_pack()).unwrap();
    let restored = Session::load(registry.into_catalog(), &bytes).unwrap();
    assert_eq!(restored.save(), bytes);
    assert_eq!(restored.world().tick_count(), 4);
}

#[test]
fn replay_stream_round_trips_inputs() {
    let mut session = forge_session(3);
    session.submit_input(9, b"hello");
    session.advance(2).unwrap();
    let stream = session.export_replay();

    let mut registry = ContentRegistry::new();
    registry.load_as_pack(&forge_pack()).unwrap();
    let mut replayed = Session::new(
        &SessionConfig { seed: 3, ..SessionConfig::default() },
        registry,
    )
    .unwrap();
    replayed.attach_replay(&stream).unwrap();
    let inputs = replayed.playback_inputs();
    assert_eq!(inputs.len(), 1);
    assert_eq!(inputs[0].player_id, 9);
    assert_eq!(&inputs[0].payload[..], b"hello");
}
