// SPDX-License-Identifier: Apache-2.0
//! Content registry: layers packs and mods into one catalog.
//!
//! Packs form the base content; mods apply afterwards and may override
//! records by id. Validation runs over the final layered catalog, never per
//! input, so a mod can legally patch a dangling reference a pack left open.

use domino_core::ContentCatalog;

use crate::error::SessionError;

/// Accumulates content streams into a catalog.
#[derive(Debug, Clone, Default)]
pub struct ContentRegistry {
    catalog: ContentCatalog,
    pack_count: usize,
    mod_count: usize,
}

impl ContentRegistry {
    /// Starts an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops all loaded content.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Loads a base pack stream.
    pub fn load_as_pack(&mut self, bytes: &[u8]) -> Result<(), SessionError> {
        self.catalog.load_pack(bytes)?;
        self.pack_count += 1;
        Ok(())
    }

    /// Loads a mod stream on top of the packs.
    pub fn load_as_mod(&mut self, bytes: &[u8]) -> Result<(), SessionError> {
        self.catalog.load_pack(bytes)?;
        self.mod_count += 1;
        Ok(())
    }

    /// Validates the layered catalog.
    pub fn validate_all(&self) -> Result<(), SessionError> {
        self.catalog.validate()?;
        Ok(())
    }

    /// Number of packs loaded.
    #[must_use]
    pub fn pack_count(&self) -> usize {
        self.pack_count
    }

    /// Number of mods loaded.
    #[must_use]
    pub fn mod_count(&self) -> usize {
        self.mod_count
    }

    /// Borrows the layered catalog.
    #[must_use]
    pub fn catalog(&self) -> &ContentCatalog {
        &self.catalog
    }

    /// Consumes the registry, yielding the catalog for world creation.
    #[must_use]
    pub fn into_catalog(self) -> ContentCatalog {
        self.catalog
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::pack::{PackBuilder, RecordBuilder};
    use domino_core::content::tags;
    use domino_core::ident::ItemId;
    use domino_core::Fixed32;

    fn item_pack(id: u32, value: i32) -> Vec<u8> {
        PackBuilder::new()
            .record(
                tags::record::ITEM,
                RecordBuilder::new(id, "thing")
                    .fixed32(tags::item::BASE_VALUE, Fixed32::from_int(value)),
            )
            .finish()
    }

    #[test]
    fn mods_override_packs_by_id() {
        let mut reg = ContentRegistry::new();
        reg.load_as_pack(&item_pack(1, 5)).unwrap();
        reg.load_as_mod(&item_pack(1, 9)).unwrap();
        reg.validate_all().unwrap();
        assert_eq!(reg.catalog().item(ItemId(1)).unwrap().base_value, Fixed32::from_int(9));
        assert_eq!(reg.pack_count(), 1);
        assert_eq!(reg.mod_count(), 1);
    }
}
