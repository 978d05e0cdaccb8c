// SPDX-License-Identifier: Apache-2.0
//! Economy metrics: EMA-smoothed per-org flow aggregates.
//!
//! Production events accumulate into per-tick step counters; each tick the
//! step totals become samples, fold into exponential moving averages with a
//! 64-tick window, and reset. The published metrics are read-only views for
//! the product layer; nothing in the sim feeds back from them.

use std::collections::BTreeMap;

use crate::content::ContentCatalog;
use crate::fixed::{Fixed64, Q16_FRAC_BITS, Q32_FRAC_BITS};
use crate::ident::{ItemId, OrgId};
use crate::subsystem::{Subsystem, SubsystemId, ValidateError};
use crate::tlv::{ByteReader, ByteWriter, TlvError};
use crate::world::World;

/// EMA window in ticks.
pub const EMA_WINDOW: i64 = 64;

const INSTANCE_VERSION: u32 = 1;

/// Published per-org metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OrgMetrics {
    /// Org these metrics describe.
    pub org_id: OrgId,
    /// EMA of produced value per tick.
    pub total_output: Fixed64,
    /// EMA of consumed value per tick.
    pub total_input: Fixed64,
    /// `total_output - total_input`.
    pub net_throughput: Fixed64,
    /// EMA of mean output unit value.
    pub price_index: Fixed64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct EconEntry {
    pub(crate) metrics: OrgMetrics,

    pub(crate) step_out_value: Fixed64,
    pub(crate) step_out_qty: Fixed64,
    pub(crate) step_in_value: Fixed64,
    pub(crate) step_in_qty: Fixed64,

    pub(crate) ema_out: Fixed64,
    pub(crate) ema_in: Fixed64,
    pub(crate) ema_price: Fixed64,
}

/// Per-world economy tables.
#[derive(Debug, Clone, Default)]
pub struct EconState {
    pub(crate) orgs: BTreeMap<OrgId, EconEntry>,
}

/// Ensures an org has a metrics entry.
pub(crate) fn org_init(world: &mut World, org: OrgId) {
    if org.is_none() {
        return;
    }
    world.econ.orgs.entry(org).or_insert_with(|| EconEntry {
        metrics: OrgMetrics { org_id: org, ..OrgMetrics::default() },
        ..EconEntry::default()
    });
}

/// Registers a production flow: positive quantity for output, negative for
/// consumption. Value is `|item base value · quantity|`.
pub(crate) fn register_production(
    econ: &mut EconState,
    content: &ContentCatalog,
    org: OrgId,
    item: ItemId,
    quantity: Fixed64,
) {
    if org.is_none() || item.is_none() || quantity == Fixed64::ZERO {
        return;
    }
    let entry = econ.orgs.entry(org).or_insert_with(|| EconEntry {
        metrics: OrgMetrics { org_id: org, ..OrgMetrics::default() },
        ..EconEntry::default()
    });

    let base_value = content.item(item).map_or(crate::fixed::Fixed32::ZERO, |i| i.base_value);
    let qty_int = quantity.raw() >> Q32_FRAC_BITS;
    if qty_int == 0 {
        return;
    }

    // |base_value · qty| staged in Q16.16, lifted to Q32.32.
    let mut prod_q16 = i64::from(base_value.raw()) * qty_int;
    if prod_q16 < 0 {
        prod_q16 = -prod_q16;
    }
    let value = Fixed64::from_raw(prod_q16.saturating_mul(1 << (Q32_FRAC_BITS - Q16_FRAC_BITS)));

    if qty_int > 0 {
        entry.step_out_qty = entry.step_out_qty.add(Fixed64::from_int(qty_int));
        entry.step_out_value = entry.step_out_value.add(value);
    } else {
        entry.step_in_qty = entry.step_in_qty.add(Fixed64::from_int(-qty_int));
        entry.step_in_value = entry.step_in_value.add(value);
    }
}

fn ema_update(ema: Fixed64, sample: Fixed64) -> Fixed64 {
    ema.add(sample.sub(ema).div_int(EMA_WINDOW))
}

fn tick_metrics(econ: &mut EconState, ticks: u32) {
    for entry in econ.orgs.values_mut() {
        let sample_out = entry.step_out_value.div_int(i64::from(ticks));
        let sample_in = entry.step_in_value.div_int(i64::from(ticks));
        entry.ema_out = ema_update(entry.ema_out, sample_out);
        entry.ema_in = ema_update(entry.ema_in, sample_in);

        // Price proxy: mean base value of this step's outputs, else the
        // previous price.
        let mut sample_price = entry.ema_price;
        let qty_int = entry.step_out_qty.raw() >> Q32_FRAC_BITS;
        if qty_int > 0 {
            let value_q16 = entry.step_out_value.raw() >> (Q32_FRAC_BITS - Q16_FRAC_BITS);
            let avg_q16 = value_q16 / qty_int;
            sample_price =
                Fixed64::from_raw(avg_q16.saturating_mul(1 << (Q32_FRAC_BITS - Q16_FRAC_BITS)));
        }
        entry.ema_price = ema_update(entry.ema_price, sample_price);

        entry.metrics.total_output = entry.ema_out;
        entry.metrics.total_input = entry.ema_in;
        entry.metrics.net_throughput = entry.ema_out.sub(entry.ema_in);
        entry.metrics.price_index = entry.ema_price;

        entry.step_out_value = Fixed64::ZERO;
        entry.step_out_qty = Fixed64::ZERO;
        entry.step_in_value = Fixed64::ZERO;
        entry.step_in_qty = Fixed64::ZERO;
    }
}

/// Metrics for one org.
#[must_use]
pub fn org_metrics(world: &World, org: OrgId) -> Option<OrgMetrics> {
    world.econ.orgs.get(&org).map(|e| e.metrics)
}

/// Number of orgs with metrics.
#[must_use]
pub fn metrics_count(world: &World) -> usize {
    world.econ.orgs.len()
}

/// Metrics by sorted org index.
#[must_use]
pub fn metrics_get_by_index(world: &World, index: usize) -> Option<OrgMetrics> {
    world.econ.orgs.values().nth(index).map(|e| e.metrics)
}

/// Economy subsystem entry.
pub struct EconomySubsystem;

impl Subsystem for EconomySubsystem {
    fn id(&self) -> SubsystemId {
        SubsystemId::Economy
    }

    fn name(&self) -> &'static str {
        "econ"
    }

    fn init_instance(&self, world: &mut World) {
        world.econ = EconState::default();
    }

    fn tick(&self, world: &mut World, ticks: u32) {
        if ticks == 0 {
            return;
        }
        tick_metrics(&mut world.econ, ticks);
    }

    fn save_instance(&self, world: &World) -> Vec<u8> {
        if world.econ.orgs.is_empty() {
            return Vec::new();
        }
        let mut w = ByteWriter::versioned(INSTANCE_VERSION);
        w.u32(world.econ.orgs.len() as u32);
        for (org, e) in &world.econ.orgs {
            w.u32(org.raw());
            w.fixed64(e.metrics.total_output);
            w.fixed64(e.metrics.total_input);
            w.fixed64(e.metrics.net_throughput);
            w.fixed64(e.metrics.price_index);
            w.fixed64(e.ema_out);
            w.fixed64(e.ema_in);
            w.fixed64(e.ema_price);
            w.fixed64(e.step_out_value);
            w.fixed64(e.step_out_qty);
            w.fixed64(e.step_in_value);
            w.fixed64(e.step_in_qty);
        }
        w.finish()
    }

    fn load_instance(&self, world: &mut World, bytes: &[u8]) -> Result<(), TlvError> {
        let mut r = ByteReader::new(bytes);
        r.version(INSTANCE_VERSION)?;
        world.econ = EconState::default();
        let count = r.u32()?;
        for _ in 0..count {
            let org = OrgId(r.u32()?);
            if org.is_none() {
                return Err(TlvError::BadHeader { field: "org_id", value: 0 });
            }
            let mut e = EconEntry { metrics: OrgMetrics { org_id: org, ..OrgMetrics::default() }, ..EconEntry::default() };
            e.metrics.total_output = r.fixed64()?;
            e.metrics.total_input = r.fixed64()?;
            e.metrics.net_throughput = r.fixed64()?;
            e.metrics.price_index = r.fixed64()?;
            e.ema_out = r.fixed64()?;
            e.ema_in = r.fixed64()?;
            e.ema_price = r.fixed64()?;
            e.step_out_value = r.fixed64()?;
            e.step_out_qty = r.fixed64()?;
            e.step_in_value = r.fixed64()?;
            e.step_in_qty = r.fixed64()?;
            world.econ.orgs.insert(org, e);
        }
        Ok(())
    }

    fn validate(&self, world: &World) -> Result<(), ValidateError> {
        for e in world.econ.orgs.values() {
            if e.step_out_qty.is_negative() || e.step_in_qty.is_negative() {
                return Err(ValidateError {
                    subsystem: SubsystemId::Economy,
                    invariant: "step quantity accumulators must stay non-negative",
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::content::proto::ItemProto;
    use crate::fixed::Fixed32;
    use crate::ident::MaterialId;

    fn catalog() -> ContentCatalog {
        let mut c = ContentCatalog::new();
        c.add_item(ItemProto {
            id: ItemId(1),
            name: "ingot".into(),
            tags: 0,
            base_value: Fixed32::from_int(3),
            unit_mass: Fixed32::ZERO,
            unit_volume: Fixed32::ZERO,
            material_id: MaterialId::NONE,
        });
        c
    }

    #[test]
    fn output_flows_raise_the_output_ema() {
        let mut w = World::new(1, catalog()).unwrap();
        let org = crate::org::org_create(&mut w, Fixed64::ZERO);
        register_production(&mut w.econ, &w.content, org, ItemId(1), Fixed64::from_int(4));
        w.tick(1);
        let m = org_metrics(&w, org).unwrap();
        // One sample of value 12 into a 64-tick EMA.
        assert_eq!(m.total_output, Fixed64::from_ratio(12, 64));
        assert_eq!(m.total_input, Fixed64::ZERO);
        assert_eq!(m.net_throughput, m.total_output);
    }

    #[test]
    fn input_flows_mirror_into_input_side() {
        let mut w = World::new(1, catalog()).unwrap();
        let org = crate::org::org_create(&mut w, Fixed64::ZERO);
        register_production(&mut w.econ, &w.content, org, ItemId(1), Fixed64::from_int(-2));
        w.tick(1);
        let m = org_metrics(&w, org).unwrap();
        assert_eq!(m.total_input, Fixed64::from_ratio(6, 64));
        assert!(m.net_throughput.is_negative());
    }

    #[test]
    fn step_counters_reset_each_tick() {
        let mut w = World::new(1, catalog()).unwrap();
        let org = crate::org::org_create(&mut w, Fixed64::ZERO);
        register_production(&mut w.econ, &w.content, org, ItemId(1), Fixed64::from_int(4));
        w.tick(1);
        let after_first = org_metrics(&w, org).unwrap().total_output;
        w.tick(1);
        let after_second = org_metrics(&w, org).unwrap().total_output;
        // Second tick samples zero, so the EMA decays.
        assert!(after_second < after_first);
    }
}
