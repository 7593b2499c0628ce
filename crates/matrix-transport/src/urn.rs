// SPDX-License-Identifier: Apache-2.0

use std::fmt;

use crate::error::TransportError;

/// The schemes a [`Urn`] can name. `Inproc`/`Ipc`/`Tcp` are backed by
/// ZeroMQ; `RtInproc` is resolved by process-local lookup, never touching
/// the message-passing library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Inproc,
    Ipc,
    Tcp,
    RtInproc,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Inproc => "inproc",
            Scheme::Ipc => "ipc",
            Scheme::Tcp => "tcp",
            Scheme::RtInproc => "rtinproc",
        }
    }

    pub fn parse(s: &str) -> Result<Self, TransportError> {
        match s {
            "inproc" => Ok(Scheme::Inproc),
            "ipc" => Ok(Scheme::Ipc),
            "tcp" => Ok(Scheme::Tcp),
            "rtinproc" => Ok(Scheme::RtInproc),
            other => Err(TransportError::UnknownScheme(other.to_string())),
        }
    }
}

/// A transport endpoint identifier, `scheme://address`.
///
/// A URN may be *partial*: scheme-only (empty address) or an address ending
/// in the literal placeholder `XXXXX`, meaning "assign me a fresh address at
/// bind time." [`Urn::complete`] resolves a partial URN into a concrete one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Urn {
    pub scheme: Scheme,
    pub address: String,
}

const PARTIAL_SUFFIX: &str = "XXXXX";

impl Urn {
    pub fn new(scheme: Scheme, address: impl Into<String>) -> Self {
        Self {
            scheme,
            address: address.into(),
        }
    }

    pub fn parse(s: &str) -> Result<Self, TransportError> {
        let (scheme_str, address) = s
            .split_once("://")
            .ok_or_else(|| TransportError::MalformedUrn(s.to_string()))?;
        Ok(Self {
            scheme: Scheme::parse(scheme_str)?,
            address: address.to_string(),
        })
    }

    pub fn is_partial(&self) -> bool {
        self.address.is_empty() || self.address.ends_with(PARTIAL_SUFFIX)
    }

    /// Resolves a partial URN to a concrete one. Ephemeral TCP ports are
    /// left as `*` for the caller's ZeroMQ socket to bind and then replaced
    /// with the socket's last-endpoint; everything else gets a random
    /// suffix generated locally.
    pub fn complete(&self) -> Urn {
        if !self.is_partial() {
            return self.clone();
        }
        match self.scheme {
            Scheme::Tcp => Urn::new(Scheme::Tcp, "*:*"),
            Scheme::Inproc | Scheme::Ipc => {
                let suffix = uuid::Uuid::new_v4().simple().to_string();
                Urn::new(self.scheme, format!("matrix-{suffix}"))
            }
            Scheme::RtInproc => {
                use rand::Rng;
                let mut rng = rand::thread_rng();
                let suffix: String = (0..20)
                    .map(|_| {
                        const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
                        CHARSET[rng.gen_range(0..CHARSET.len())] as char
                    })
                    .collect();
                Urn::new(Scheme::RtInproc, suffix)
            }
        }
    }
}

impl fmt::Display for Urn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme.as_str(), self.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scheme_and_address() {
        let urn = Urn::parse("tcp://*:5555").unwrap();
        assert_eq!(urn.scheme, Scheme::Tcp);
        assert_eq!(urn.address, "*:5555");
    }

    #[test]
    fn rejects_unknown_scheme() {
        assert!(matches!(
            Urn::parse("carrier-pigeon://nest"),
            Err(TransportError::UnknownScheme(_))
        ));
    }

    #[test]
    fn scheme_only_urn_is_partial() {
        let urn = Urn::new(Scheme::Inproc, "");
        assert!(urn.is_partial());
    }

    #[test]
    fn rtinproc_completion_has_twenty_char_suffix() {
        let urn = Urn::new(Scheme::RtInproc, "XXXXX").complete();
        assert_eq!(urn.address.len(), 20);
    }

    #[test]
    fn fully_specified_urn_completes_to_itself() {
        let urn = Urn::new(Scheme::Ipc, "/tmp/matrix.sock");
        assert_eq!(urn.complete(), urn);
    }
}
