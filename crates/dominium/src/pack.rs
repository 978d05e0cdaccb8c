// SPDX-License-Identifier: Apache-2.0
//! Pack authoring: deterministic builders for content streams.
//!
//! Thin sugar over the engine's sorted TLV writers. A record builder is a KV
//! payload that always carries the common id field (the record's sort key);
//! a pack builder collects records into one content stream.
//!
//! Output is byte-stable regardless of authoring order, which is what makes
//! packs diffable and cacheable.

use domino_core::content::tags;
use domino_core::tlv::{TlvKvWriter, TlvStreamWriter};
use domino_core::{Fixed32, Fixed64};

/// Builder for one proto record payload.
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    id: u32,
    kv: TlvKvWriter,
}

impl RecordBuilder {
    /// Starts a record with the common id and name fields.
    #[must_use]
    pub fn new(id: u32, name: &str) -> Self {
        let mut kv = TlvKvWriter::new();
        kv.field_u32(tags::common::ID, id);
        kv.field_str(tags::common::NAME, name);
        Self { id, kv }
    }

    /// Sets the common tag mask field.
    #[must_use]
    pub fn tags(mut self, mask: u32) -> Self {
        self.kv.field_u32(tags::common::TAGS, mask);
        self
    }

    /// Adds a `u16` field.
    #[must_use]
    pub fn u16(mut self, tag: u32, v: u16) -> Self {
        self.kv.field_u16(tag, v);
        self
    }

    /// Adds a `u32` field.
    #[must_use]
    pub fn u32(mut self, tag: u32, v: u32) -> Self {
        self.kv.field_u32(tag, v);
        self
    }

    /// Adds a Q16.16 field.
    #[must_use]
    pub fn fixed32(mut self, tag: u32, v: Fixed32) -> Self {
        self.kv.field_fixed32(tag, v);
        self
    }

    /// Adds a Q32.32 field.
    #[must_use]
    pub fn fixed64(mut self, tag: u32, v: Fixed64) -> Self {
        self.kv.field_fixed64(tag, v);
        self
    }

    /// Adds a raw blob field.
    #[must_use]
    pub fn blob(mut self, tag: u32, bytes: &[u8]) -> Self {
        self.kv.field_bytes(tag, bytes);
        self
    }

    /// Adds a nested KV body built in place.
    #[must_use]
    pub fn sub(mut self, tag: u32, build: impl FnOnce(&mut TlvKvWriter)) -> Self {
        let mut kv = TlvKvWriter::new();
        build(&mut kv);
        self.kv.field_bytes(tag, &kv.finish());
        self
    }

    fn finish(self) -> (u32, Vec<u8>) {
        (self.id, self.kv.finish())
    }
}

/// Builder for a whole content pack.
#[derive(Debug, Clone, Default)]
pub struct PackBuilder {
    stream: TlvStreamWriter,
}

impl PackBuilder {
    /// Starts an empty pack.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a record under a proto kind tag (see
    /// [`domino_core::content::tags::record`]).
    #[must_use]
    pub fn record(mut self, kind: u32, record: RecordBuilder) -> Self {
        let (id, payload) = record.finish();
        self.stream.push(kind, id, payload);
        self
    }

    /// Emits the sorted content stream.
    #[must_use]
    pub fn finish(self) -> Vec<u8> {
        self.stream.finish()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use domino_core::ident::ItemId;
    use domino_core::ContentCatalog;

    #[test]
    fn authoring_order_does_not_change_bytes() {
        let a = PackBuilder::new()
            .record(tags::record::ITEM, RecordBuilder::new(2, "plank"))
            .record(tags::record::ITEM, RecordBuilder::new(1, "log"))
            .finish();
        let b = PackBuilder::new()
            .record(tags::record::ITEM, RecordBuilder::new(1, "log"))
            .record(tags::record::ITEM, RecordBuilder::new(2, "plank"))
            .finish();
        assert_eq!(a, b);
    }

    #[test]
    fn built_packs_load_into_a_catalog() {
        let pack = PackBuilder::new()
            .record(
                tags::record::ITEM,
                RecordBuilder::new(7, "ore")
                    .tags(1)
                    .fixed32(tags::item::BASE_VALUE, Fixed32::from_int(5)),
            )
            .finish();
        let mut catalog = ContentCatalog::new();
        catalog.load_pack(&pack).unwrap();
        let item = catalog.item(ItemId(7)).unwrap();
        assert_eq!(item.name, "ore");
        assert_eq!(item.base_value, Fixed32::from_int(5));
    }
}
