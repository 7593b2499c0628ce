// SPDX-License-Identifier: Apache-2.0

//! Policies for resolving a logical transport's `AsConfigured` URN list
//! (as read from the Keymaster) down to the single URN a sink connects to.

use matrix_transport::{Scheme, Urn};

use crate::error::DataError;

/// Resolves a producer's `AsConfigured` URN list down to the single URN a
/// sink connects to. `hint`, when present, is the caller-supplied scheme
/// (from the `connect(component, data-name, transport?)` call).
pub trait TransportSelector {
    fn select(configured: &[Urn], hint: Option<Scheme>) -> Result<Urn, DataError>;
}

/// There must be exactly one configured URN; fails otherwise. The default
/// policy for sinks that don't care which scheme backs their transport.
/// Ignores `hint`.
pub struct SelectOnly;

impl TransportSelector for SelectOnly {
    fn select(configured: &[Urn], _hint: Option<Scheme>) -> Result<Urn, DataError> {
        match configured {
            [single] => Ok(single.clone()),
            [] => Err(DataError::SelectionFailed(
                "no configured transports".to_string(),
            )),
            many => Err(DataError::SelectionFailed(format!(
                "{} configured transports, expected exactly one",
                many.len()
            ))),
        }
    }
}

/// Selects the configured URN whose scheme matches the caller-supplied
/// `hint`, for sinks that must pin a specific transport (e.g. `rtinproc`
/// for the real-time hot path). Fails if no hint was given.
pub struct SelectSpecified;

impl TransportSelector for SelectSpecified {
    fn select(configured: &[Urn], hint: Option<Scheme>) -> Result<Urn, DataError> {
        let scheme = hint.ok_or_else(|| {
            DataError::SelectionFailed("select-specified requires a scheme hint".to_string())
        })?;
        configured
            .iter()
            .find(|urn| urn.scheme == scheme)
            .cloned()
            .ok_or_else(|| {
                DataError::SelectionFailed(format!(
                    "no configured transport with scheme '{}'",
                    scheme.as_str()
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urn(scheme: Scheme, addr: &str) -> Urn {
        Urn::new(scheme, addr)
    }

    #[test]
    fn select_only_requires_exactly_one() {
        let configured = vec![urn(Scheme::Inproc, "a"), urn(Scheme::Tcp, "b")];
        assert!(SelectOnly::select(&configured, None).is_err());
        assert!(SelectOnly::select(&[], None).is_err());

        let single = vec![urn(Scheme::Inproc, "a")];
        assert_eq!(SelectOnly::select(&single, None).unwrap(), single[0]);
    }

    #[test]
    fn select_specified_matches_scheme() {
        let configured = vec![urn(Scheme::Inproc, "a"), urn(Scheme::Tcp, "b")];
        let selected = SelectSpecified::select(&configured, Some(Scheme::Tcp)).unwrap();
        assert_eq!(selected.scheme, Scheme::Tcp);
    }

    #[test]
    fn select_specified_fails_when_scheme_absent() {
        let configured = vec![urn(Scheme::Inproc, "a")];
        assert!(SelectSpecified::select(&configured, Some(Scheme::Tcp)).is_err());
    }

    #[test]
    fn select_specified_fails_without_hint() {
        let configured = vec![urn(Scheme::Inproc, "a")];
        assert!(SelectSpecified::select(&configured, None).is_err());
    }
}
