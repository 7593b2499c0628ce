// SPDX-License-Identifier: Apache-2.0

//! In-memory hierarchical document used by the Keymaster.
//!
//! A [`Node`] is exactly one of: scalar (string), sequence, mapping, null,
//! or undefined. A *keychain* is a dotted path (`"a.b.c"`) from the root;
//! the empty keychain denotes the root itself. [`get`], [`put`], and
//! [`delete`] are pure functions over a root node and a keychain — no
//! partial mutation is ever observed on failure.

mod keychain;
mod node;
mod ops;

pub use keychain::{Keychain, KeychainError};
pub use node::Node;
pub use ops::{delete, get, put, KmResult};
