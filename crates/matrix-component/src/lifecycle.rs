// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::str::FromStr;

use crate::error::ComponentError;

/// The fixed set of lifecycle states every [`crate::Component`] passes
/// through (spec.md §3 "Component lifecycle states").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Created,
    Standby,
    Ready,
    Running,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Created => "Created",
            LifecycleState::Standby => "Standby",
            LifecycleState::Ready => "Ready",
            LifecycleState::Running => "Running",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The fixed set of commands published to `components.<name>.command` that
/// drive [`LifecycleState`] transitions (spec.md §4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleCommand {
    DoRegister,
    DoInit,
    DoStart,
    DoStop,
    DoStandby,
    Error,
}

impl LifecycleCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleCommand::DoRegister => "do_register",
            LifecycleCommand::DoInit => "do_init",
            LifecycleCommand::DoStart => "do_start",
            LifecycleCommand::DoStop => "do_stop",
            LifecycleCommand::DoStandby => "do_standby",
            LifecycleCommand::Error => "error",
        }
    }
}

impl fmt::Display for LifecycleCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleCommand {
    type Err = ComponentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "do_register" => Ok(LifecycleCommand::DoRegister),
            "do_init" => Ok(LifecycleCommand::DoInit),
            "do_start" => Ok(LifecycleCommand::DoStart),
            "do_stop" => Ok(LifecycleCommand::DoStop),
            "do_standby" => Ok(LifecycleCommand::DoStandby),
            "error" => Ok(LifecycleCommand::Error),
            other => Err(ComponentError::UnknownCommand(other.to_string())),
        }
    }
}
