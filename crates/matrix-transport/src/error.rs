// SPDX-License-Identifier: Apache-2.0

/// Errors surfaced by transport construction, bind, and I/O.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("unknown transport scheme '{0}'")]
    UnknownScheme(String),

    #[error("malformed urn '{0}', expected scheme://address")]
    MalformedUrn(String),

    #[error("zeromq error: {0}")]
    Zmq(#[from] zmq::Error),

    #[error("bind failed for {urn}: {source}")]
    BindFailed { urn: String, source: zmq::Error },

    #[error("connect failed for {urn}: {source}")]
    ConnectFailed { urn: String, source: zmq::Error },

    #[error("transport already released")]
    AlreadyReleased,
}
