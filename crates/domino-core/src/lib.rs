// SPDX-License-Identifier: Apache-2.0
//! domino-core: deterministic tick-based world simulation engine.
//!
//! The engine drives a virtual world in which heterogeneous subsystems
//! (resources, environment, hydrology, structures, transport, jobs, policy,
//! research, economy) advance in lockstep and produce bit-identical results
//! across runs, machines, and record/playback sessions.
//!
//! Determinism ground rules, everywhere in this crate:
//! - fixed-point arithmetic only ([`fixed`]); no floats in the sim path,
//! - every observable iteration runs in sorted-id order,
//! - all randomness derives from `(world seed, subsystem salts)` through the
//!   integer mixers in [`rng`],
//! - every byte that leaves the engine goes through the sorted TLV writers
//!   in [`tlv`].
#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
#![allow(
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::unreadable_literal,
    clippy::missing_const_for_fn,
    clippy::redundant_pub_crate,
    clippy::many_single_char_names,
    clippy::module_name_repetitions,
    clippy::use_self,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::cast_lossless
)]

pub mod content;
pub mod econ;
pub mod env;
pub mod fixed;
pub mod hydro;
pub mod ident;
pub mod job;
pub mod litho;
pub mod model;
pub mod org;
pub mod policy;
pub mod replay;
pub mod res;
pub mod research;
pub mod rng;
pub mod structure;
pub mod subsystem;
mod telemetry;
pub mod tlv;
pub mod trans;
pub mod world;
pub mod worldgen;

// Re-exports for the common surface.
/// Fixed-point scalars used by everything.
pub use fixed::{Fixed32, Fixed64};
/// Content catalog and its error type.
pub use content::{ContentCatalog, ContentError};
/// Subsystem registry and lifecycle trait.
pub use subsystem::{Subsystem, SubsystemId, ValidateError};
/// The world carrier and its digest.
pub use world::{World, WorldDigest, WorldError};
/// Replay context and modes.
pub use replay::{DeterminismMode, InputFrame, ReplayContext, ReplayError, ReplayMode};
