// SPDX-License-Identifier: Apache-2.0
//! Shared content fixtures for the integration suites.

#![allow(dead_code)]

use bytes::Bytes;

use domino_core::content::proto::{
    tagbits, ContainerProto, DepositProto, IoTermKind, ItemProto, JobPurpose, JobTemplateProto,
    MaterialProto, PointSourceProto, ProcessIoTerm, ProcessProto, ResearchProto, ResearchYield,
    SplineKind, SplineProfileProto, StructureProto,
};
use domino_core::content::tags;
use domino_core::ident::{
    ChannelId, ContainerProtoId, DepositProtoId, ItemId, JobTemplateId, MaterialId, PointSourceId,
    ProcessId, ResearchId, SplineProfileId, StructureProtoId,
};
use domino_core::tlv::TlvKvWriter;
use domino_core::{ContentCatalog, Fixed32, Fixed64};

/// Raw ore, consumed by the smelter.
pub const ORE: ItemId = ItemId(7);
/// Smelted ingot, produced by the smelter.
pub const INGOT: ItemId = ItemId(11);
/// The smelting process.
pub const SMELT: ProcessId = ProcessId(1);
/// Machine structure proto.
pub const SMELTER: StructureProtoId = StructureProtoId(1);
/// Passive storage structure proto.
pub const BIN: StructureProtoId = StructureProtoId(2);
/// Operator job template for the smelter.
pub const OPERATE: JobTemplateId = JobTemplateId(1);
/// Self-timed haul job template.
pub const HAUL: JobTemplateId = JobTemplateId(2);
/// Item belt profile.
pub const BELT: SplineProfileId = SplineProfileId(1);
/// Base research node.
pub const SMELTING_TECH: ResearchId = ResearchId(1);
/// Dependent research node.
pub const ALLOY_TECH: ResearchId = ResearchId(2);
/// Point kind credited by smelting cycles.
pub const SMELT_POINTS: u16 = 3;

/// A catalog with the full machine/transport/job/research loop wired up.
pub fn fixture_catalog() -> ContentCatalog {
    let mut c = ContentCatalog::new();

    c.add_material(MaterialProto {
        id: MaterialId(1),
        name: "iron".into(),
        tags: 0,
        density: Fixed32::from_int(7),
    });

    c.add_item(ItemProto {
        id: ORE,
        name: "iron-ore".into(),
        tags: 0,
        base_value: Fixed32::from_int(1),
        unit_mass: Fixed32::ONE,
        unit_volume: Fixed32::ONE,
        material_id: MaterialId(1),
    });
    c.add_item(ItemProto {
        id: INGOT,
        name: "iron-ingot".into(),
        tags: 0,
        base_value: Fixed32::from_int(3),
        unit_mass: Fixed32::ONE,
        unit_volume: Fixed32::ONE,
        material_id: MaterialId(1),
    });

    c.add_container(ContainerProto {
        id: ContainerProtoId(1),
        name: "hopper".into(),
        tags: 0,
        slot_count: 4,
        max_volume: Fixed32::from_int(100),
        max_mass: Fixed32::ZERO,
    });
    c.add_container(ContainerProto {
        id: ContainerProtoId(2),
        name: "tray".into(),
        tags: 0,
        slot_count: 4,
        max_volume: Fixed32::from_int(100),
        max_mass: Fixed32::ZERO,
    });

    c.add_process(ProcessProto {
        id: SMELT,
        name: "smelt-iron".into(),
        tags: 0,
        base_duration: Fixed32::from_int(4),
        io_terms: vec![
            ProcessIoTerm {
                kind: IoTermKind::InputItem,
                item_id: ORE,
                rate: Fixed32::from_ratio(1, 4),
            },
            ProcessIoTerm {
                kind: IoTermKind::OutputItem,
                item_id: INGOT,
                rate: Fixed32::from_ratio(1, 4),
            },
        ],
        research_yields: vec![ResearchYield { kind: SMELT_POINTS, amount: Fixed64::from_int(2) }],
    });

    c.add_structure(StructureProto {
        id: SMELTER,
        name: "smelter".into(),
        tags: tagbits::STRUCTURE_MACHINE,
        inv_in: ContainerProtoId(1),
        inv_out: ContainerProtoId(2),
        processes: vec![SMELT],
    });
    c.add_structure(StructureProto {
        id: BIN,
        name: "bin".into(),
        tags: 0,
        inv_in: ContainerProtoId(1),
        inv_out: ContainerProtoId(2),
        processes: Vec::new(),
    });

    let mut operate_reqs = TlvKvWriter::new();
    operate_reqs.field_u32(tags::job_template::requirements::AGENT_TAGS, tagbits::CAP_OPERATE);
    c.add_job_template(JobTemplateProto {
        id: OPERATE,
        name: "operate-smelter".into(),
        tags: 0,
        purpose: JobPurpose::OperateProcess,
        process_id: SMELT,
        structure_id: SMELTER,
        requirements: Bytes::from(operate_reqs.finish()),
        rewards: Bytes::new(),
        research_yields: Vec::new(),
    });

    let mut haul_reqs = TlvKvWriter::new();
    haul_reqs.field_u32(tags::job_template::requirements::AGENT_TAGS, tagbits::CAP_HAUL);
    haul_reqs.field_fixed32(tags::job_template::requirements::DURATION, Fixed32::from_int(4));
    c.add_job_template(JobTemplateProto {
        id: HAUL,
        name: "haul-crates".into(),
        tags: 0,
        purpose: JobPurpose::HaulItems,
        process_id: ProcessId::NONE,
        structure_id: StructureProtoId::NONE,
        requirements: Bytes::from(haul_reqs.finish()),
        rewards: Bytes::new(),
        research_yields: Vec::new(),
    });

    c.add_spline_profile(SplineProfileProto {
        id: BELT,
        name: "belt".into(),
        tags: 0,
        kind: SplineKind::Item,
        flags: 0,
        base_speed: Fixed32::ONE,
        max_grade: Fixed32::from_ratio(1, 2),
        capacity: Fixed32::ONE,
        params: Bytes::new(),
    });

    c.add_research(ResearchProto {
        id: SMELTING_TECH,
        name: "smelting".into(),
        tags: 0,
        cost: Fixed64::from_int(10),
        prereqs: Vec::new(),
    });
    c.add_research(ResearchProto {
        id: ALLOY_TECH,
        name: "alloys".into(),
        tags: 0,
        cost: Fixed64::from_int(10),
        prereqs: vec![SMELTING_TECH],
    });

    c.add_point_source(PointSourceProto {
        id: PointSourceId(1),
        name: "smelt-points".into(),
        kind: SMELT_POINTS,
        target_research: SMELTING_TECH,
        target_tags_all: 0,
        target_tags_any: 0,
    });

    let mut strata = TlvKvWriter::new();
    strata.field_fixed32(tags::deposit::strata::MEAN_QUANTITY, Fixed32::from_int(50));
    strata.field_fixed32(tags::deposit::strata::MEAN_GRADE, Fixed32::ONE);
    c.add_deposit(DepositProto {
        id: DepositProtoId(1),
        name: "iron-seam".into(),
        tags: 0,
        channel_id: ChannelId(3),
        material_id: MaterialId(1),
        params: Bytes::from(strata.finish()),
    });

    c
}
