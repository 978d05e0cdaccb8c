// SPDX-License-Identifier: Apache-2.0
//! Container packing state.
//!
//! A container is a slot array plus running used-volume/used-mass sums.
//! Bulk-only protos (`slot_count == 0`) get a single slot. Packing is
//! best-effort: as many units as capacity allows move, and the caller learns
//! how many.

use crate::content::ContentCatalog;
use crate::fixed::Fixed32;
use crate::ident::{ContainerProtoId, ItemId};
use crate::tlv::{ByteReader, ByteWriter, TlvError};

/// One slot: an item kind and a count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ContainerSlot {
    /// Item held; `NONE` when the slot is empty.
    pub item_id: ItemId,
    /// Units held; zero only for empty slots.
    pub count: u32,
}

/// Live packing state of one container.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContainerState {
    /// Backing proto; `NONE` means the container does not exist.
    pub proto_id: ContainerProtoId,
    /// Sum of packed unit volumes.
    pub used_volume: Fixed32,
    /// Sum of packed unit masses.
    pub used_mass: Fixed32,
    /// Slot array; bulk-only containers use exactly one slot.
    pub slots: Vec<ContainerSlot>,
}

impl ContainerState {
    /// Instantiates the container described by `proto_id`, or an absent
    /// container when the proto does not resolve.
    #[must_use]
    pub fn from_proto(content: &ContentCatalog, proto_id: ContainerProtoId) -> Self {
        let Some(proto) = content.container(proto_id) else {
            return Self::default();
        };
        let slot_count = if proto.slot_count == 0 { 1 } else { usize::from(proto.slot_count) };
        Self {
            proto_id,
            used_volume: Fixed32::ZERO,
            used_mass: Fixed32::ZERO,
            slots: vec![ContainerSlot::default(); slot_count],
        }
    }

    /// `true` when this container exists (has a proto).
    #[must_use]
    pub fn is_present(&self) -> bool {
        self.proto_id.is_some()
    }

    /// Units of `item_id` currently held.
    #[must_use]
    pub fn count_item(&self, item_id: ItemId) -> u32 {
        if item_id.is_none() {
            return 0;
        }
        self.slots.iter().filter(|s| s.item_id == item_id).map(|s| s.count).sum()
    }

    /// Lowest item id present with a positive count, if any.
    #[must_use]
    pub fn lowest_item(&self) -> Option<ItemId> {
        self.slots
            .iter()
            .filter(|s| s.item_id.is_some() && s.count > 0)
            .map(|s| s.item_id)
            .min()
    }

    /// Packs up to `count` units, returning how many fit.
    ///
    /// Capacity limits come from the container proto (zero disables a
    /// limit); per-unit mass/volume come from the item proto. Items pack
    /// into a slot already holding the same item first, then into the first
    /// empty slot.
    pub fn pack(&mut self, content: &ContentCatalog, item_id: ItemId, count: u32) -> u32 {
        if !self.is_present() || item_id.is_none() || count == 0 {
            return 0;
        }
        let (unit_mass, unit_volume) = match content.item(item_id) {
            Some(item) => (item.unit_mass, item.unit_volume),
            None => return 0,
        };
        let (max_volume, max_mass) = match content.container(self.proto_id) {
            Some(proto) => (proto.max_volume, proto.max_mass),
            None => return 0,
        };

        let mut fit = count;
        if max_volume > Fixed32::ZERO && unit_volume > Fixed32::ZERO {
            let room = max_volume.sub(self.used_volume).max(Fixed32::ZERO);
            fit = fit.min(room.div(unit_volume).to_int().max(0) as u32);
        }
        if max_mass > Fixed32::ZERO && unit_mass > Fixed32::ZERO {
            let room = max_mass.sub(self.used_mass).max(Fixed32::ZERO);
            fit = fit.min(room.div(unit_mass).to_int().max(0) as u32);
        }
        if fit == 0 {
            return 0;
        }

        let slot = self
            .slots
            .iter()
            .position(|s| s.item_id == item_id && s.count > 0)
            .or_else(|| self.slots.iter().position(|s| s.count == 0));
        let Some(slot) = slot else {
            return 0;
        };
        self.slots[slot].item_id = item_id;
        self.slots[slot].count += fit;
        self.used_volume = self.used_volume.add(unit_volume.mul_ticks(fit));
        self.used_mass = self.used_mass.add(unit_mass.mul_ticks(fit));
        fit
    }

    /// Unpacks up to `count` units of `item_id`, returning how many came
    /// out.
    pub fn unpack(&mut self, content: &ContentCatalog, item_id: ItemId, count: u32) -> u32 {
        if !self.is_present() || item_id.is_none() || count == 0 {
            return 0;
        }
        let (unit_mass, unit_volume) = content
            .item(item_id)
            .map_or((Fixed32::ZERO, Fixed32::ZERO), |i| (i.unit_mass, i.unit_volume));

        let mut remaining = count;
        for slot in &mut self.slots {
            if slot.item_id != item_id || slot.count == 0 {
                continue;
            }
            let take = slot.count.min(remaining);
            slot.count -= take;
            remaining -= take;
            if slot.count == 0 {
                slot.item_id = ItemId::NONE;
            }
            if remaining == 0 {
                break;
            }
        }
        let taken = count - remaining;
        if taken > 0 {
            self.used_volume = self.used_volume.sub(unit_volume.mul_ticks(taken)).max(Fixed32::ZERO);
            self.used_mass = self.used_mass.sub(unit_mass.mul_ticks(taken)).max(Fixed32::ZERO);
        }
        taken
    }

    /// Writes the container into a fixed-layout blob.
    pub(crate) fn write(&self, w: &mut ByteWriter) {
        w.u32(self.proto_id.raw());
        w.fixed32(self.used_volume);
        w.fixed32(self.used_mass);
        w.u16(self.slots.len() as u16);
        for slot in &self.slots {
            w.u32(slot.item_id.raw());
            w.u32(slot.count);
        }
    }

    /// Reads a container written by [`ContainerState::write`].
    pub(crate) fn read(r: &mut ByteReader<'_>) -> Result<Self, TlvError> {
        let proto_id = ContainerProtoId(r.u32()?);
        let used_volume = r.fixed32()?;
        let used_mass = r.fixed32()?;
        let slot_count = r.u16()?;
        let mut slots = Vec::with_capacity(usize::from(slot_count));
        for _ in 0..slot_count {
            slots.push(ContainerSlot { item_id: ItemId(r.u32()?), count: r.u32()? });
        }
        Ok(Self { proto_id, used_volume, used_mass, slots })
    }
}
