// SPDX-License-Identifier: Apache-2.0

//! # matrix
//!
//! Public facade over the runtime fabric that lets Matrix components
//! (telescope instrumentation) run concurrently and exchange typed data
//! streams, orchestrated through a hierarchical configuration/state store.
//!
//! Each concern lives in its own crate and is re-exported here so a
//! component author depends on one crate:
//!
//! - [`fsm`] — the data-driven state machine ([`matrix_fsm`]).
//! - [`sync`] — bounded semaphore FIFO and condition cell ([`matrix_sync`]).
//! - [`keystore`] — the hierarchical document model ([`matrix_keystore`]).
//! - [`transport`] — the pluggable transport registry ([`matrix_transport`]).
//! - [`keymaster`] — the Keymaster server and client ([`matrix_keymaster`]).
//! - [`data`] — DataSource/DataSink, poller, reconnect helper ([`matrix_data`]).
//! - [`component`] — the Component lifecycle ([`matrix_component`]).
//!
//! The `Architect` orchestrator that drives every component through the
//! same operational mode, the `keychain` CLI, and the `slogger` binary are
//! collaborators at the boundary of this crate, not part of it. This
//! crate's own binary, `keymasterd`, is the minimal host process: it reads
//! a YAML configuration document and serves it as a Keymaster.
//!
//! Observability follows the same division of responsibility the
//! underlying crates use: library code emits `tracing` events without
//! installing a subscriber; only `keymasterd` installs one, at the process
//! boundary.

pub use matrix_component as component;
pub use matrix_data as data;
pub use matrix_fsm as fsm;
pub use matrix_keymaster as keymaster;
pub use matrix_keystore as keystore;
pub use matrix_sync as sync;
pub use matrix_transport as transport;
