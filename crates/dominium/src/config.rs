// SPDX-License-Identifier: Apache-2.0
//! Session configuration.
//!
//! JSON lives here, on the product side only; the engine never sees it. A
//! config names the seed, the packs to layer, and the replay/determinism
//! modes to start the session in.

use serde::{Deserialize, Serialize};

use domino_core::{DeterminismMode, ReplayMode};

use crate::error::SessionError;

/// Declarative session setup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// World seed.
    pub seed: u64,
    /// Pack file names (resolved by the caller), applied in order.
    #[serde(default)]
    pub packs: Vec<String>,
    /// Mod file names, applied after the packs.
    #[serde(default)]
    pub mods: Vec<String>,
    /// Replay mode to start in.
    #[serde(default)]
    pub replay: ReplayModeConfig,
    /// Determinism auditing mode.
    #[serde(default)]
    pub determinism: DeterminismModeConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            packs: Vec::new(),
            mods: Vec::new(),
            replay: ReplayModeConfig::Off,
            determinism: DeterminismModeConfig::Off,
        }
    }
}

impl SessionConfig {
    /// Parses a config from JSON; unknown fields are rejected.
    pub fn from_json(bytes: &[u8]) -> Result<Self, SessionError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Serializes the config to pretty JSON.
    pub fn to_json(&self) -> Result<Vec<u8>, SessionError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }
}

/// Replay mode, config-file spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayModeConfig {
    /// No recording.
    #[default]
    Off,
    /// Record input frames.
    Record,
}

impl From<ReplayModeConfig> for ReplayMode {
    fn from(v: ReplayModeConfig) -> Self {
        match v {
            ReplayModeConfig::Off => Self::Off,
            ReplayModeConfig::Record => Self::Record,
        }
    }
}

/// Determinism mode, config-file spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeterminismModeConfig {
    /// No digest tracking.
    #[default]
    Off,
    /// Remember digests.
    Record,
    /// Compare digests while replaying.
    Playback,
    /// Compare only.
    AssertOnly,
}

impl From<DeterminismModeConfig> for DeterminismMode {
    fn from(v: DeterminismModeConfig) -> Self {
        match v {
            DeterminismModeConfig::Off => Self::Off,
            DeterminismModeConfig::Record => Self::Record,
            DeterminismModeConfig::Playback => Self::Playback,
            DeterminismModeConfig::AssertOnly => Self::AssertOnly,
        }
    }
}
