// SPDX-License-Identifier: Apache-2.0
//! Model registry: `(family, id) → descriptor` for behavior modules.
//!
//! The closed behavior sets themselves (resource, environment, hydrology
//! models) are enums with dispatch methods in their subsystems; the registry
//! records which ids are live so cells referencing an unregistered model fall
//! back to the default path instead of dispatching blind.

use thiserror::Error;

/// Behavior families with registered models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ModelFamily {
    /// Resource channel models.
    Resource,
    /// Environment field models.
    Environment,
    /// Hydrology models.
    Hydrology,
}

impl ModelFamily {
    /// Stable wire code.
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::Resource => 1,
            Self::Environment => 2,
            Self::Hydrology => 9,
        }
    }

    /// Parses a wire code.
    #[must_use]
    pub const fn from_code(code: u16) -> Option<Self> {
        match code {
            1 => Some(Self::Resource),
            2 => Some(Self::Environment),
            9 => Some(Self::Hydrology),
            _ => None,
        }
    }
}

/// Registered model metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelDescriptor {
    /// Family this model belongs to.
    pub family: ModelFamily,
    /// Model id within the family; zero is invalid.
    pub id: u16,
    /// Human-readable name.
    pub name: &'static str,
    /// Model-specific schema version.
    pub version: u32,
}

/// Errors from model registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ModelError {
    /// `(family, id)` was already registered.
    #[error("duplicate model ({family:?}, {id})")]
    Duplicate {
        /// Family of the colliding registration.
        family: ModelFamily,
        /// Model id of the colliding registration.
        id: u16,
    },

    /// Model id zero is reserved as "none".
    #[error("model id 0 is reserved")]
    ZeroId,
}

/// Registry of behavior models, linear over small tables.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: Vec<ModelDescriptor>,
}

impl ModelRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a model; duplicate `(family, id)` is rejected.
    pub fn register(&mut self, desc: ModelDescriptor) -> Result<(), ModelError> {
        if desc.id == 0 {
            return Err(ModelError::ZeroId);
        }
        if self.get(desc.family, desc.id).is_some() {
            return Err(ModelError::Duplicate { family: desc.family, id: desc.id });
        }
        self.models.push(desc);
        Ok(())
    }

    /// Number of models in a family.
    #[must_use]
    pub fn count(&self, family: ModelFamily) -> usize {
        self.models.iter().filter(|m| m.family == family).count()
    }

    /// Model by `(family, id)`.
    #[must_use]
    pub fn get(&self, family: ModelFamily, id: u16) -> Option<&ModelDescriptor> {
        self.models.iter().find(|m| m.family == family && m.id == id)
    }

    /// Model by family and registration index.
    #[must_use]
    pub fn get_by_index(&self, family: ModelFamily, index: usize) -> Option<&ModelDescriptor> {
        self.models.iter().filter(|m| m.family == family).nth(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(id: u16) -> ModelDescriptor {
        ModelDescriptor { family: ModelFamily::Resource, id, name: "m", version: 1 }
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut reg = ModelRegistry::new();
        assert!(reg.register(desc(1)).is_ok());
        assert_eq!(
            reg.register(desc(1)),
            Err(ModelError::Duplicate { family: ModelFamily::Resource, id: 1 })
        );
        assert_eq!(reg.count(ModelFamily::Resource), 1);
    }

    #[test]
    fn zero_id_is_rejected() {
        let mut reg = ModelRegistry::new();
        assert_eq!(reg.register(desc(0)), Err(ModelError::ZeroId));
    }

    #[test]
    fn families_do_not_collide() {
        let mut reg = ModelRegistry::new();
        assert!(reg.register(desc(1)).is_ok());
        assert!(reg
            .register(ModelDescriptor {
                family: ModelFamily::Hydrology,
                id: 1,
                name: "h",
                version: 1
            })
            .is_ok());
        assert_eq!(reg.count(ModelFamily::Hydrology), 1);
    }
}
