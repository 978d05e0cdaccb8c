// SPDX-License-Identifier: Apache-2.0
//! Policy engine: data-driven allow/multiplier/cap evaluation.
//!
//! Rules live in content as scope/conditions/effect KV bodies; the engine
//! only evaluates. One pass over all rules in content order: a rule whose
//! scope and conditions all match merges its effect into the running result.
//! A deny is final: evaluation stops, later rules cannot re-enable.

use crate::content::proto::PolicyRuleProto;
use crate::content::{tags, ContentCatalog};
use crate::fixed::Fixed32;
use crate::ident::{OrgId, TagMask};
use crate::research::ResearchState;
use crate::subsystem::{Subsystem, SubsystemId};
use crate::tlv::TlvKv;
use crate::world::World;

/// What a policy decision is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PolicySubject {
    /// No subject.
    #[default]
    None,
    /// Running a process.
    Process,
    /// Creating a job from a template.
    JobTemplate,
    /// Building a structure.
    Structure,
    /// Laying a spline of a profile.
    SplineProfile,
}

impl PolicySubject {
    /// Wire code used in scope bodies.
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::None => 0,
            Self::Process => 1,
            Self::JobTemplate => 2,
            Self::Structure => 3,
            Self::SplineProfile => 4,
        }
    }
}

/// Inputs to one policy evaluation.
#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyContext {
    /// Org the action runs under.
    pub org_id: OrgId,
    /// Kind of subject.
    pub subject: PolicySubject,
    /// Proto id of the subject.
    pub subject_id: u32,
    /// Subject's content tags.
    pub subject_tags: TagMask,
}

/// Merged result of all matching rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyEffect {
    /// `false` once any matching rule denies.
    pub allowed: bool,
    /// Product of matching multipliers, capped and clamped at zero.
    pub multiplier: Fixed32,
    /// Smallest non-zero cap seen; zero means unset.
    pub cap: Fixed32,
}

impl Default for PolicyEffect {
    fn default() -> Self {
        Self { allowed: true, multiplier: Fixed32::ONE, cap: Fixed32::ZERO }
    }
}

impl PolicyEffect {
    /// `true` when the action may proceed at a non-zero rate.
    #[must_use]
    pub fn permits(&self) -> bool {
        self.allowed && self.multiplier > Fixed32::ZERO
    }
}

fn scope_matches(rule: &PolicyRuleProto, ctx: &PolicyContext) -> bool {
    if rule.scope.is_empty() {
        return false;
    }
    let kv = TlvKv::new(&rule.scope);

    if let Some(kind) = kv.u32_field(tags::policy_rule::scope::SUBJECT_KIND) {
        if kind != ctx.subject.code() {
            return false;
        }
    }

    let mut have_subject_ids = false;
    let mut subject_ok = false;
    for field in kv.fields(tags::policy_rule::scope::SUBJECT_ID) {
        have_subject_ids = true;
        if let Ok(b) = <[u8; 4]>::try_from(field) {
            if u32::from_le_bytes(b) == ctx.subject_id {
                subject_ok = true;
            }
        }
    }
    if have_subject_ids && !subject_ok {
        return false;
    }

    let mut have_org_ids = false;
    let mut org_ok = false;
    for field in kv.fields(tags::policy_rule::scope::ORG_ID) {
        have_org_ids = true;
        if let Ok(b) = <[u8; 4]>::try_from(field) {
            if u32::from_le_bytes(b) == ctx.org_id.raw() {
                org_ok = true;
            }
        }
    }
    if have_org_ids && !org_ok {
        return false;
    }

    // Tag masks may span several fields; they OR together like the id sets
    // above collect.
    let fold_mask = |tag: u32| {
        kv.fields(tag).fold(0_u32, |acc, field| {
            <[u8; 4]>::try_from(field).map_or(acc, |b| acc | u32::from_le_bytes(b))
        })
    };
    let tags_all = fold_mask(tags::policy_rule::scope::SUBJECT_TAGS_ALL);
    let tags_any = fold_mask(tags::policy_rule::scope::SUBJECT_TAGS_ANY);
    if tags_all != 0 && ctx.subject_tags & tags_all != tags_all {
        return false;
    }
    if tags_any != 0 && ctx.subject_tags & tags_any == 0 {
        return false;
    }

    true
}

fn conditions_met(rule: &PolicyRuleProto, research: &ResearchState, ctx: &PolicyContext) -> bool {
    if rule.conditions.is_empty() {
        return true;
    }
    let kv = TlvKv::new(&rule.conditions);
    for field in kv.fields(tags::policy_rule::condition::RESEARCH_COMPLETED) {
        if let Ok(b) = <[u8; 4]>::try_from(field) {
            let id = crate::ident::ResearchId(u32::from_le_bytes(b));
            if !research.is_completed(ctx.org_id, id) {
                return false;
            }
        }
    }
    for field in kv.fields(tags::policy_rule::condition::RESEARCH_NOT_COMPLETED) {
        if let Ok(b) = <[u8; 4]>::try_from(field) {
            let id = crate::ident::ResearchId(u32::from_le_bytes(b));
            if research.is_completed(ctx.org_id, id) {
                return false;
            }
        }
    }
    true
}

fn apply_effect(rule: &PolicyRuleProto, out: &mut PolicyEffect) {
    if rule.effect.is_empty() {
        return;
    }
    let kv = TlvKv::new(&rule.effect);
    if let Some(allowed) = kv.u32_field(tags::policy_rule::effect::ALLOWED) {
        if allowed == 0 {
            out.allowed = false;
        }
    }
    if let Some(m) = kv.fixed32_field(tags::policy_rule::effect::MULTIPLIER) {
        out.multiplier = out.multiplier.mul(m);
    }
    if let Some(c) = kv.fixed32_field(tags::policy_rule::effect::CAP) {
        if c > Fixed32::ZERO && (out.cap == Fixed32::ZERO || c < out.cap) {
            out.cap = c;
        }
    }
}

/// Evaluates all rules against a context.
///
/// Works off the catalog and research tables directly so subsystem tick
/// paths can call it under split borrows.
#[must_use]
pub fn evaluate(content: &ContentCatalog, research: &ResearchState, ctx: &PolicyContext) -> PolicyEffect {
    let mut out = PolicyEffect::default();
    for rule in content.policy_rules() {
        if !scope_matches(rule, ctx) {
            continue;
        }
        if !conditions_met(rule, research, ctx) {
            continue;
        }
        apply_effect(rule, &mut out);
        if !out.allowed {
            break;
        }
    }
    if out.cap > Fixed32::ZERO && out.multiplier > out.cap {
        out.multiplier = out.cap;
    }
    out.multiplier = out.multiplier.max(Fixed32::ZERO);
    out
}

/// Evaluates against a world.
#[must_use]
pub fn evaluate_world(world: &World, ctx: &PolicyContext) -> PolicyEffect {
    evaluate(world.content(), &world.research, ctx)
}

/// Policy subsystem entry. Stateless: rules are content, evaluation is on
/// demand.
pub struct PolicySubsystem;

impl Subsystem for PolicySubsystem {
    fn id(&self) -> SubsystemId {
        SubsystemId::Policy
    }

    fn name(&self) -> &'static str {
        "policy"
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::ident::PolicyRuleId;
    use crate::tlv::TlvKvWriter;
    use bytes::Bytes;

    fn rule(id: u32, scope: TlvKvWriter, effect: TlvKvWriter) -> PolicyRuleProto {
        PolicyRuleProto {
            id: PolicyRuleId(id),
            name: format!("rule-{id}"),
            scope: Bytes::from(scope.finish()),
            conditions: Bytes::new(),
            effect: Bytes::from(effect.finish()),
        }
    }

    fn process_scope() -> TlvKvWriter {
        let mut scope = TlvKvWriter::new();
        scope.field_u32(tags::policy_rule::scope::SUBJECT_KIND, PolicySubject::Process.code());
        scope
    }

    fn ctx() -> PolicyContext {
        PolicyContext {
            org_id: OrgId(1),
            subject: PolicySubject::Process,
            subject_id: 5,
            subject_tags: 0,
        }
    }

    #[test]
    fn effects_merge_multiplicatively() {
        let mut content = ContentCatalog::new();
        let mut e1 = TlvKvWriter::new();
        e1.field_fixed32(tags::policy_rule::effect::MULTIPLIER, Fixed32::from_int(2));
        content.add_policy_rule(rule(1, process_scope(), e1));
        let mut e2 = TlvKvWriter::new();
        e2.field_fixed32(tags::policy_rule::effect::MULTIPLIER, Fixed32::from_int(3));
        content.add_policy_rule(rule(2, process_scope(), e2));

        let research = ResearchState::default();
        let out = evaluate(&content, &research, &ctx());
        assert!(out.allowed);
        assert_eq!(out.multiplier, Fixed32::from_int(6));
    }

    #[test]
    fn deny_short_circuits() {
        let mut content = ContentCatalog::new();
        let mut deny = TlvKvWriter::new();
        deny.field_u32(tags::policy_rule::effect::ALLOWED, 0);
        content.add_policy_rule(rule(1, process_scope(), deny));
        // A later allow cannot re-enable.
        let mut allow = TlvKvWriter::new();
        allow.field_u32(tags::policy_rule::effect::ALLOWED, 1);
        content.add_policy_rule(rule(2, process_scope(), allow));

        let research = ResearchState::default();
        let out = evaluate(&content, &research, &ctx());
        assert!(!out.allowed);
    }

    #[test]
    fn cap_limits_multiplier() {
        let mut content = ContentCatalog::new();
        let mut e = TlvKvWriter::new();
        e.field_fixed32(tags::policy_rule::effect::MULTIPLIER, Fixed32::from_int(10));
        e.field_fixed32(tags::policy_rule::effect::CAP, Fixed32::from_int(4));
        content.add_policy_rule(rule(1, process_scope(), e));

        let research = ResearchState::default();
        let out = evaluate(&content, &research, &ctx());
        assert_eq!(out.multiplier, Fixed32::from_int(4));
    }

    #[test]
    fn scope_mismatch_skips_rule() {
        let mut content = ContentCatalog::new();
        let mut scope = TlvKvWriter::new();
        scope.field_u32(tags::policy_rule::scope::SUBJECT_KIND, PolicySubject::JobTemplate.code());
        let mut deny = TlvKvWriter::new();
        deny.field_u32(tags::policy_rule::effect::ALLOWED, 0);
        content.add_policy_rule(rule(1, scope, deny));

        let research = ResearchState::default();
        let out = evaluate(&content, &research, &ctx());
        assert!(out.allowed);
    }

    #[test]
    fn repeated_tag_fields_accumulate() {
        // A scope may carry several tags-all fields; they OR into one mask.
        let mut content = ContentCatalog::new();
        let mut scope = process_scope();
        scope.field_u32(tags::policy_rule::scope::SUBJECT_TAGS_ALL, 0b01);
        scope.field_u32(tags::policy_rule::scope::SUBJECT_TAGS_ALL, 0b10);
        let mut deny = TlvKvWriter::new();
        deny.field_u32(tags::policy_rule::effect::ALLOWED, 0);
        content.add_policy_rule(rule(1, scope, deny));

        let research = ResearchState::default();
        // Covering only one bit is not enough for the combined mask.
        let mut partial = ctx();
        partial.subject_tags = 0b01;
        assert!(evaluate(&content, &research, &partial).allowed);
        // Covering both bits matches, so the deny lands.
        let mut full = ctx();
        full.subject_tags = 0b11;
        assert!(!evaluate(&content, &research, &full).allowed);
    }

    #[test]
    fn org_scope_filters() {
        let mut content = ContentCatalog::new();
        let mut scope = process_scope();
        scope.field_u32(tags::policy_rule::scope::ORG_ID, 9);
        let mut deny = TlvKvWriter::new();
        deny.field_u32(tags::policy_rule::effect::ALLOWED, 0);
        content.add_policy_rule(rule(1, scope, deny));

        let research = ResearchState::default();
        // Org 1 is not org 9: rule does not apply.
        assert!(evaluate(&content, &research, &ctx()).allowed);
        let mut other = ctx();
        other.org_id = OrgId(9);
        assert!(!evaluate(&content, &research, &other).allowed);
    }
}
