// SPDX-License-Identifier: Apache-2.0
//! Content catalog: proto records loaded from packs and mods.
//!
//! Content arrives as a TLV record stream (one record per proto, payload a
//! sorted KV body). Later loads override earlier records with the same id,
//! which is how mods layer over packs. The catalog is immutable from the
//! engine's point of view once a world is created.
//!
//! All iteration accessors return protos sorted by id.

pub mod proto;
pub mod tags;

use std::collections::BTreeMap;

use bytes::Bytes;
use thiserror::Error;

use crate::fixed::{Fixed32, Fixed64};
use crate::ident::{
    ChannelId, ContainerProtoId, DepositProtoId, ItemId, JobTemplateId, MaterialId, PointSourceId,
    PolicyRuleId, ProcessId, ResearchId, SplineProfileId, StructureProtoId,
};
use crate::tlv::{TlvError, TlvKv, TlvReader};

use self::proto::{
    ContainerProto, DepositProto, IoTermKind, ItemProto, JobPurpose, JobTemplateProto,
    MaterialProto, PointSourceProto, PolicyRuleProto, ProcessIoTerm, ProcessProto, ResearchProto,
    ResearchYield, SplineKind, SplineProfileProto, StructureProto,
};

/// Errors raised while loading or validating content.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContentError {
    /// The pack stream itself was malformed.
    #[error("malformed content stream: {0}")]
    Stream(#[from] TlvError),

    /// A record was missing its primary key.
    #[error("record tag {tag} is missing its id field")]
    MissingId {
        /// Outer record tag.
        tag: u32,
    },

    /// A proto references another proto that does not exist.
    #[error("{kind} {id} references missing {target_kind} {target_id}")]
    DanglingReference {
        /// Kind of the referencing proto.
        kind: &'static str,
        /// Id of the referencing proto.
        id: u32,
        /// Kind of the missing target.
        target_kind: &'static str,
        /// Id of the missing target.
        target_id: u32,
    },

    /// A proto carries a value outside its declared constraints.
    #[error("{kind} {id}: {reason}")]
    InvalidProto {
        /// Kind of the offending proto.
        kind: &'static str,
        /// Id of the offending proto.
        id: u32,
        /// What was wrong.
        reason: &'static str,
    },
}

/// The loaded proto catalog.
#[derive(Debug, Clone, Default)]
pub struct ContentCatalog {
    materials: BTreeMap<MaterialId, MaterialProto>,
    items: BTreeMap<ItemId, ItemProto>,
    containers: BTreeMap<ContainerProtoId, ContainerProto>,
    structures: BTreeMap<StructureProtoId, StructureProto>,
    processes: BTreeMap<ProcessId, ProcessProto>,
    job_templates: BTreeMap<JobTemplateId, JobTemplateProto>,
    spline_profiles: BTreeMap<SplineProfileId, SplineProfileProto>,
    research: BTreeMap<ResearchId, ResearchProto>,
    point_sources: BTreeMap<PointSourceId, PointSourceProto>,
    policy_rules: BTreeMap<PolicyRuleId, PolicyRuleProto>,
    deposits: BTreeMap<DepositProtoId, DepositProto>,
}

impl ContentCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads one content stream, overriding existing records by id.
    ///
    /// Unknown record tags are skipped; malformed records fail the load.
    pub fn load_pack(&mut self, bytes: &[u8]) -> Result<(), ContentError> {
        let mut reader = TlvReader::new(bytes);
        while let Some((tag, payload)) = reader.next_record()? {
            let kv = TlvKv::new(payload);
            match tag {
                tags::record::MATERIAL => {
                    let p = decode_material(&kv).ok_or(ContentError::MissingId { tag })?;
                    self.materials.insert(p.id, p);
                }
                tags::record::ITEM => {
                    let p = decode_item(&kv).ok_or(ContentError::MissingId { tag })?;
                    self.items.insert(p.id, p);
                }
                tags::record::CONTAINER => {
                    let p = decode_container(&kv).ok_or(ContentError::MissingId { tag })?;
                    self.containers.insert(p.id, p);
                }
                tags::record::STRUCTURE => {
                    let p = decode_structure(&kv).ok_or(ContentError::MissingId { tag })?;
                    self.structures.insert(p.id, p);
                }
                tags::record::PROCESS => {
                    let p = decode_process(&kv).ok_or(ContentError::MissingId { tag })?;
                    self.processes.insert(p.id, p);
                }
                tags::record::JOB_TEMPLATE => {
                    let p = decode_job_template(&kv).ok_or(ContentError::MissingId { tag })?;
                    self.job_templates.insert(p.id, p);
                }
                tags::record::SPLINE_PROFILE => {
                    let p = decode_spline_profile(&kv).ok_or(ContentError::MissingId { tag })?;
                    self.spline_profiles.insert(p.id, p);
                }
                tags::record::RESEARCH => {
                    let p = decode_research(&kv).ok_or(ContentError::MissingId { tag })?;
                    self.research.insert(p.id, p);
                }
                tags::record::RESEARCH_POINT_SOURCE => {
                    let p = decode_point_source(&kv).ok_or(ContentError::MissingId { tag })?;
                    self.point_sources.insert(p.id, p);
                }
                tags::record::POLICY_RULE => {
                    let p = decode_policy_rule(&kv).ok_or(ContentError::MissingId { tag })?;
                    self.policy_rules.insert(p.id, p);
                }
                tags::record::DEPOSIT => {
                    let p = decode_deposit(&kv).ok_or(ContentError::MissingId { tag })?;
                    self.deposits.insert(p.id, p);
                }
                _ => {}
            }
        }
        Ok(())
    }

    // Direct insertion, used by loaders and test fixtures.

    /// Adds or replaces a material proto.
    pub fn add_material(&mut self, p: MaterialProto) {
        self.materials.insert(p.id, p);
    }

    /// Adds or replaces an item proto.
    pub fn add_item(&mut self, p: ItemProto) {
        self.items.insert(p.id, p);
    }

    /// Adds or replaces a container proto.
    pub fn add_container(&mut self, p: ContainerProto) {
        self.containers.insert(p.id, p);
    }

    /// Adds or replaces a structure proto.
    pub fn add_structure(&mut self, p: StructureProto) {
        self.structures.insert(p.id, p);
    }

    /// Adds or replaces a process proto.
    pub fn add_process(&mut self, p: ProcessProto) {
        self.processes.insert(p.id, p);
    }

    /// Adds or replaces a job template proto.
    pub fn add_job_template(&mut self, p: JobTemplateProto) {
        self.job_templates.insert(p.id, p);
    }

    /// Adds or replaces a spline profile proto.
    pub fn add_spline_profile(&mut self, p: SplineProfileProto) {
        self.spline_profiles.insert(p.id, p);
    }

    /// Adds or replaces a research node proto.
    pub fn add_research(&mut self, p: ResearchProto) {
        self.research.insert(p.id, p);
    }

    /// Adds or replaces a research point-source proto.
    pub fn add_point_source(&mut self, p: PointSourceProto) {
        self.point_sources.insert(p.id, p);
    }

    /// Adds or replaces a policy rule proto.
    pub fn add_policy_rule(&mut self, p: PolicyRuleProto) {
        self.policy_rules.insert(p.id, p);
    }

    /// Adds or replaces a deposit proto.
    pub fn add_deposit(&mut self, p: DepositProto) {
        self.deposits.insert(p.id, p);
    }

    // Lookup accessors.

    /// Material by id.
    #[must_use]
    pub fn material(&self, id: MaterialId) -> Option<&MaterialProto> {
        self.materials.get(&id)
    }

    /// Item by id.
    #[must_use]
    pub fn item(&self, id: ItemId) -> Option<&ItemProto> {
        self.items.get(&id)
    }

    /// Container proto by id.
    #[must_use]
    pub fn container(&self, id: ContainerProtoId) -> Option<&ContainerProto> {
        self.containers.get(&id)
    }

    /// Structure proto by id.
    #[must_use]
    pub fn structure(&self, id: StructureProtoId) -> Option<&StructureProto> {
        self.structures.get(&id)
    }

    /// Process proto by id.
    #[must_use]
    pub fn process(&self, id: ProcessId) -> Option<&ProcessProto> {
        self.processes.get(&id)
    }

    /// Job template by id.
    #[must_use]
    pub fn job_template(&self, id: JobTemplateId) -> Option<&JobTemplateProto> {
        self.job_templates.get(&id)
    }

    /// Spline profile by id.
    #[must_use]
    pub fn spline_profile(&self, id: SplineProfileId) -> Option<&SplineProfileProto> {
        self.spline_profiles.get(&id)
    }

    /// Research node by id.
    #[must_use]
    pub fn research(&self, id: ResearchId) -> Option<&ResearchProto> {
        self.research.get(&id)
    }

    /// Research point source by id.
    #[must_use]
    pub fn point_source(&self, id: PointSourceId) -> Option<&PointSourceProto> {
        self.point_sources.get(&id)
    }

    /// Policy rule by id.
    #[must_use]
    pub fn policy_rule(&self, id: PolicyRuleId) -> Option<&PolicyRuleProto> {
        self.policy_rules.get(&id)
    }

    /// Deposit proto by id.
    #[must_use]
    pub fn deposit(&self, id: DepositProtoId) -> Option<&DepositProto> {
        self.deposits.get(&id)
    }

    // Sorted iteration.

    /// Materials sorted by id.
    pub fn materials(&self) -> impl Iterator<Item = &MaterialProto> {
        self.materials.values()
    }

    /// Items sorted by id.
    pub fn items(&self) -> impl Iterator<Item = &ItemProto> {
        self.items.values()
    }

    /// Structure protos sorted by id.
    pub fn structures(&self) -> impl Iterator<Item = &StructureProto> {
        self.structures.values()
    }

    /// Process protos sorted by id.
    pub fn processes(&self) -> impl Iterator<Item = &ProcessProto> {
        self.processes.values()
    }

    /// Job templates sorted by id.
    pub fn job_templates(&self) -> impl Iterator<Item = &JobTemplateProto> {
        self.job_templates.values()
    }

    /// Spline profiles sorted by id.
    pub fn spline_profiles(&self) -> impl Iterator<Item = &SplineProfileProto> {
        self.spline_profiles.values()
    }

    /// Research nodes sorted by id.
    pub fn research_nodes(&self) -> impl Iterator<Item = &ResearchProto> {
        self.research.values()
    }

    /// Research point sources sorted by id.
    pub fn point_sources(&self) -> impl Iterator<Item = &PointSourceProto> {
        self.point_sources.values()
    }

    /// Policy rules in content order (sorted by id).
    pub fn policy_rules(&self) -> impl Iterator<Item = &PolicyRuleProto> {
        self.policy_rules.values()
    }

    /// Deposits sorted by id.
    pub fn deposits(&self) -> impl Iterator<Item = &DepositProto> {
        self.deposits.values()
    }

    /// Number of research nodes.
    #[must_use]
    pub fn research_count(&self) -> usize {
        self.research.len()
    }

    /// Checks referential integrity across the catalog.
    pub fn validate(&self) -> Result<(), ContentError> {
        for p in self.processes.values() {
            if p.base_duration <= Fixed32::ZERO {
                return Err(ContentError::InvalidProto {
                    kind: "process",
                    id: p.id.raw(),
                    reason: "base_duration must be positive",
                });
            }
            for term in &p.io_terms {
                if !self.items.contains_key(&term.item_id) {
                    return Err(ContentError::DanglingReference {
                        kind: "process",
                        id: p.id.raw(),
                        target_kind: "item",
                        target_id: term.item_id.raw(),
                    });
                }
            }
        }
        for s in self.structures.values() {
            for cid in [s.inv_in, s.inv_out] {
                if cid.is_some() && !self.containers.contains_key(&cid) {
                    return Err(ContentError::DanglingReference {
                        kind: "structure",
                        id: s.id.raw(),
                        target_kind: "container",
                        target_id: cid.raw(),
                    });
                }
            }
            for pid in &s.processes {
                if !self.processes.contains_key(pid) {
                    return Err(ContentError::DanglingReference {
                        kind: "structure",
                        id: s.id.raw(),
                        target_kind: "process",
                        target_id: pid.raw(),
                    });
                }
            }
        }
        for t in self.job_templates.values() {
            if t.process_id.is_some() && !self.processes.contains_key(&t.process_id) {
                return Err(ContentError::DanglingReference {
                    kind: "job_template",
                    id: t.id.raw(),
                    target_kind: "process",
                    target_id: t.process_id.raw(),
                });
            }
            if t.structure_id.is_some() && !self.structures.contains_key(&t.structure_id) {
                return Err(ContentError::DanglingReference {
                    kind: "job_template",
                    id: t.id.raw(),
                    target_kind: "structure",
                    target_id: t.structure_id.raw(),
                });
            }
        }
        for r in self.research.values() {
            for prereq in &r.prereqs {
                if !self.research.contains_key(prereq) {
                    return Err(ContentError::DanglingReference {
                        kind: "research",
                        id: r.id.raw(),
                        target_kind: "research",
                        target_id: prereq.raw(),
                    });
                }
            }
        }
        for d in self.deposits.values() {
            if d.material_id.is_some() && !self.materials.contains_key(&d.material_id) {
                return Err(ContentError::DanglingReference {
                    kind: "deposit",
                    id: d.id.raw(),
                    target_kind: "material",
                    target_id: d.material_id.raw(),
                });
            }
            if d.channel_id == ChannelId::NONE {
                return Err(ContentError::InvalidProto {
                    kind: "deposit",
                    id: d.id.raw(),
                    reason: "channel_id must be non-zero",
                });
            }
        }
        for rule in self.policy_rules.values() {
            if rule.scope.is_empty() {
                return Err(ContentError::InvalidProto {
                    kind: "policy_rule",
                    id: rule.id.raw(),
                    reason: "scope must not be empty",
                });
            }
        }
        Ok(())
    }
}

fn common_id(kv: &TlvKv<'_>) -> Option<u32> {
    match kv.u32_field(tags::common::ID) {
        Some(id) if id != 0 => Some(id),
        _ => None,
    }
}

fn common_name(kv: &TlvKv<'_>) -> String {
    kv.str_field(tags::common::NAME).unwrap_or_default().to_owned()
}

fn common_tags(kv: &TlvKv<'_>) -> u32 {
    kv.u32_field(tags::common::TAGS).unwrap_or(0)
}

fn decode_material(kv: &TlvKv<'_>) -> Option<MaterialProto> {
    Some(MaterialProto {
        id: MaterialId(common_id(kv)?),
        name: common_name(kv),
        tags: common_tags(kv),
        density: kv.fixed32_field(tags::material::DENSITY).unwrap_or(Fixed32::ZERO),
    })
}

fn decode_item(kv: &TlvKv<'_>) -> Option<ItemProto> {
    Some(ItemProto {
        id: ItemId(common_id(kv)?),
        name: common_name(kv),
        tags: common_tags(kv),
        base_value: kv.fixed32_field(tags::item::BASE_VALUE).unwrap_or(Fixed32::ZERO),
        unit_mass: kv.fixed32_field(tags::item::UNIT_MASS).unwrap_or(Fixed32::ZERO),
        unit_volume: kv.fixed32_field(tags::item::UNIT_VOLUME).unwrap_or(Fixed32::ZERO),
        material_id: MaterialId(kv.u32_field(tags::item::MATERIAL_ID).unwrap_or(0)),
    })
}

fn decode_container(kv: &TlvKv<'_>) -> Option<ContainerProto> {
    Some(ContainerProto {
        id: ContainerProtoId(common_id(kv)?),
        name: common_name(kv),
        tags: common_tags(kv),
        slot_count: kv.u16_field(tags::container::SLOT_COUNT).unwrap_or(0),
        max_volume: kv.fixed32_field(tags::container::MAX_VOLUME).unwrap_or(Fixed32::ZERO),
        max_mass: kv.fixed32_field(tags::container::MAX_MASS).unwrap_or(Fixed32::ZERO),
    })
}

fn decode_structure(kv: &TlvKv<'_>) -> Option<StructureProto> {
    let processes = kv
        .fields(tags::structure::PROCESS_ALLOWED)
        .filter_map(|p| {
            let b: [u8; 4] = p.try_into().ok()?;
            Some(ProcessId(u32::from_le_bytes(b)))
        })
        .collect();
    Some(StructureProto {
        id: StructureProtoId(common_id(kv)?),
        name: common_name(kv),
        tags: common_tags(kv),
        inv_in: ContainerProtoId(kv.u32_field(tags::structure::INV_IN).unwrap_or(0)),
        inv_out: ContainerProtoId(kv.u32_field(tags::structure::INV_OUT).unwrap_or(0)),
        processes,
    })
}

fn decode_yields(kv: &TlvKv<'_>, tag: u32) -> Vec<ResearchYield> {
    kv.fields(tag)
        .filter_map(|body| {
            let sub = TlvKv::new(body);
            let kind = sub.u16_field(tags::research_yield::KIND)?;
            let amount = sub.fixed64_field(tags::research_yield::AMOUNT)?;
            Some(ResearchYield { kind, amount })
        })
        .collect()
}

fn decode_process(kv: &TlvKv<'_>) -> Option<ProcessProto> {
    let io_terms = kv
        .fields(tags::process::IO_TERM)
        .filter_map(|body| {
            let sub = TlvKv::new(body);
            let kind = IoTermKind::from_code(sub.u16_field(tags::process::io_term::KIND)?)?;
            Some(ProcessIoTerm {
                kind,
                item_id: ItemId(sub.u32_field(tags::process::io_term::ITEM_ID)?),
                rate: sub.fixed32_field(tags::process::io_term::RATE)?,
            })
        })
        .collect();
    Some(ProcessProto {
        id: ProcessId(common_id(kv)?),
        name: common_name(kv),
        tags: common_tags(kv),
        base_duration: kv.fixed32_field(tags::process::BASE_DURATION).unwrap_or(Fixed32::ZERO),
        io_terms,
        research_yields: decode_yields(kv, tags::process::RESEARCH_YIELD),
    })
}

fn decode_job_template(kv: &TlvKv<'_>) -> Option<JobTemplateProto> {
    Some(JobTemplateProto {
        id: JobTemplateId(common_id(kv)?),
        name: common_name(kv),
        tags: common_tags(kv),
        purpose: JobPurpose::from_code(kv.u16_field(tags::job_template::PURPOSE).unwrap_or(0)),
        process_id: ProcessId(kv.u32_field(tags::job_template::PROCESS_ID).unwrap_or(0)),
        structure_id: StructureProtoId(kv.u32_field(tags::job_template::STRUCTURE_ID).unwrap_or(0)),
        requirements: Bytes::copy_from_slice(
            kv.field(tags::job_template::REQUIREMENTS).unwrap_or_default(),
        ),
        rewards: Bytes::copy_from_slice(kv.field(tags::job_template::REWARDS).unwrap_or_default()),
        research_yields: decode_yields(kv, tags::job_template::RESEARCH_YIELD),
    })
}

fn decode_spline_profile(kv: &TlvKv<'_>) -> Option<SplineProfileProto> {
    Some(SplineProfileProto {
        id: SplineProfileId(common_id(kv)?),
        name: common_name(kv),
        tags: common_tags(kv),
        kind: SplineKind::from_code(kv.u16_field(tags::spline_profile::KIND).unwrap_or(0)),
        flags: kv.u16_field(tags::spline_profile::FLAGS).unwrap_or(0),
        base_speed: kv.fixed32_field(tags::spline_profile::BASE_SPEED).unwrap_or(Fixed32::ZERO),
        max_grade: kv.fixed32_field(tags::spline_profile::MAX_GRADE).unwrap_or(Fixed32::ZERO),
        capacity: kv.fixed32_field(tags::spline_profile::CAPACITY).unwrap_or(Fixed32::ZERO),
        params: Bytes::copy_from_slice(kv.field(tags::spline_profile::PARAMS).unwrap_or_default()),
    })
}

fn decode_research(kv: &TlvKv<'_>) -> Option<ResearchProto> {
    let prereqs = kv
        .fields(tags::research::PREREQ)
        .filter_map(|p| {
            let b: [u8; 4] = p.try_into().ok()?;
            Some(ResearchId(u32::from_le_bytes(b)))
        })
        .collect();
    Some(ResearchProto {
        id: ResearchId(common_id(kv)?),
        name: common_name(kv),
        tags: common_tags(kv),
        cost: kv.fixed64_field(tags::research::COST).unwrap_or(Fixed64::ZERO).max(Fixed64::ZERO),
        prereqs,
    })
}

fn decode_point_source(kv: &TlvKv<'_>) -> Option<PointSourceProto> {
    Some(PointSourceProto {
        id: PointSourceId(common_id(kv)?),
        name: common_name(kv),
        kind: kv.u16_field(tags::point_source::KIND).unwrap_or(0),
        target_research: ResearchId(
            kv.u32_field(tags::point_source::TARGET_RESEARCH_ID).unwrap_or(0),
        ),
        target_tags_all: kv.u32_field(tags::point_source::TARGET_TAGS_ALL).unwrap_or(0),
        target_tags_any: kv.u32_field(tags::point_source::TARGET_TAGS_ANY).unwrap_or(0),
    })
}

fn decode_policy_rule(kv: &TlvKv<'_>) -> Option<PolicyRuleProto> {
    Some(PolicyRuleProto {
        id: PolicyRuleId(common_id(kv)?),
        name: common_name(kv),
        scope: Bytes::copy_from_slice(kv.field(tags::policy_rule::SCOPE).unwrap_or_default()),
        conditions: Bytes::copy_from_slice(
            kv.field(tags::policy_rule::CONDITIONS).unwrap_or_default(),
        ),
        effect: Bytes::copy_from_slice(kv.field(tags::policy_rule::EFFECT).unwrap_or_default()),
    })
}

fn decode_deposit(kv: &TlvKv<'_>) -> Option<DepositProto> {
    Some(DepositProto {
        id: DepositProtoId(common_id(kv)?),
        name: common_name(kv),
        tags: common_tags(kv),
        channel_id: ChannelId(kv.u16_field(tags::deposit::CHANNEL_ID).unwrap_or(0)),
        material_id: MaterialId(kv.u32_field(tags::deposit::MATERIAL_ID).unwrap_or(0)),
        params: Bytes::copy_from_slice(kv.field(tags::deposit::PARAMS).unwrap_or_default()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tlv::{TlvKvWriter, TlvStreamWriter};

    fn item_record(id: u32, base_value: i32) -> Vec<u8> {
        let mut kv = TlvKvWriter::new();
        kv.field_u32(tags::common::ID, id);
        kv.field_str(tags::common::NAME, "ore");
        kv.field_fixed32(tags::item::BASE_VALUE, Fixed32::from_int(base_value));
        kv.finish()
    }

    #[test]
    fn load_pack_decodes_records() {
        let mut stream = TlvStreamWriter::new();
        stream.push(tags::record::ITEM, 7, item_record(7, 3));
        let mut catalog = ContentCatalog::new();
        assert!(catalog.load_pack(&stream.finish()).is_ok());
        let item = catalog.item(ItemId(7));
        assert!(item.is_some_and(|i| i.base_value == Fixed32::from_int(3)));
    }

    #[test]
    fn later_records_override_by_id() {
        let mut stream = TlvStreamWriter::new();
        stream.push(tags::record::ITEM, 7, item_record(7, 3));
        let mut catalog = ContentCatalog::new();
        assert!(catalog.load_pack(&stream.finish()).is_ok());

        let mut modded = TlvStreamWriter::new();
        modded.push(tags::record::ITEM, 7, item_record(7, 9));
        assert!(catalog.load_pack(&modded.finish()).is_ok());
        let item = catalog.item(ItemId(7));
        assert!(item.is_some_and(|i| i.base_value == Fixed32::from_int(9)));
    }

    #[test]
    fn record_without_id_is_rejected() {
        let mut kv = TlvKvWriter::new();
        kv.field_str(tags::common::NAME, "nameless");
        let mut stream = TlvStreamWriter::new();
        stream.push(tags::record::ITEM, 0, kv.finish());
        let mut catalog = ContentCatalog::new();
        assert_eq!(
            catalog.load_pack(&stream.finish()),
            Err(ContentError::MissingId { tag: tags::record::ITEM })
        );
    }

    #[test]
    fn validate_catches_dangling_io_item() {
        let mut catalog = ContentCatalog::new();
        catalog.add_process(ProcessProto {
            id: ProcessId(1),
            name: "smelt".into(),
            tags: 0,
            base_duration: Fixed32::from_int(5),
            io_terms: vec![ProcessIoTerm {
                kind: IoTermKind::InputItem,
                item_id: ItemId(99),
                rate: Fixed32::ONE,
            }],
            research_yields: Vec::new(),
        });
        assert!(matches!(
            catalog.validate(),
            Err(ContentError::DanglingReference { target_id: 99, .. })
        ));
    }
}
