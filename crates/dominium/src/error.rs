// SPDX-License-Identifier: Apache-2.0
//! Product-side error type.
//!
//! The engine reports through its own typed errors; everything callers see
//! from this crate is a [`SessionError`].

use thiserror::Error;

/// Errors surfaced by the Dominium layer.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Content failed to load or validate.
    #[error("content error: {0}")]
    Content(#[from] domino_core::ContentError),

    /// World construction, load, or validation failed.
    #[error("world error: {0}")]
    World(#[from] domino_core::WorldError),

    /// Replay recording or playback failed.
    #[error("replay error: {0}")]
    Replay(#[from] domino_core::ReplayError),

    /// Session config was malformed.
    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),

    /// The operation does not apply to the session's current mode.
    #[error("session is not in a state that allows {operation}")]
    BadState {
        /// What was attempted.
        operation: &'static str,
    },
}
