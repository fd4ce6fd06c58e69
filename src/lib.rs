//! Playback - deterministic record/replay of end-to-end test network traffic
//!
//! Tests declare which requests they expect. Live responses are recorded per
//! request fingerprint and later replayed in recording order, so a suite can
//! run without its backend.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::cargo)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::field_reassign_with_default,
    clippy::multiple_crate_versions
)]

pub mod config;
pub mod error;
pub mod exchange;
pub mod fingerprint;
pub mod logging;
pub mod playback;
pub mod session;
pub mod storage;

pub use error::{PlaybackError, Result};
