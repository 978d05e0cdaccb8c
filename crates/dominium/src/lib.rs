// SPDX-License-Identifier: Apache-2.0
//! Dominium: the thin product layer over the Domino engine.
//!
//! Keeps the engine free of product concerns: sessions bundle a world with a
//! replay context, content registries layer packs and mods, pack builders
//! author proto records, and JSON config stays strictly on this side of the
//! boundary (the engine's canonical format is its own TLV dialect).
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
    clippy::module_name_repetitions,
    clippy::missing_const_for_fn,
    clippy::use_self
)]

pub mod config;
pub mod error;
pub mod pack;
pub mod registry;
pub mod session;

pub use config::SessionConfig;
pub use error::SessionError;
pub use pack::{PackBuilder, RecordBuilder};
pub use registry::ContentRegistry;
pub use session::Session;
