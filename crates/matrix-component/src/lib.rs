// SPDX-License-Identifier: Apache-2.0

//! Component lifecycle (spec.md §4.9): ties the FSM, the Keymaster client,
//! and DataSource/DataSink wiring together behind the fixed
//! Created→Standby→Ready→Running state machine every component shares.
//!
//! A concrete component implements [`Component`]'s hooks and is driven by
//! [`ComponentRuntime::start`], which subscribes to
//! `components.<name>.command` and republishes `components.<name>.state`
//! after every command. [`registry::SharedRegistry`] is the strongly-typed
//! replacement for the original's raw-pointer-as-hex-string object
//! exchange (spec.md §9 REDESIGN FLAGS).

mod error;
mod lifecycle;
mod registry;
mod runtime;

pub use error::ComponentError;
pub use lifecycle::{LifecycleCommand, LifecycleState};
pub use registry::{AnyRegistry, RegistryHandle, SharedRegistry};
pub use runtime::{Component, ComponentRuntime};
