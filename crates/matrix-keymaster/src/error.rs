// SPDX-License-Identifier: Apache-2.0

use matrix_keystore::{KmResult, Node};

/// Errors raised by the Keymaster client. Transport and protocol failures
/// both escape the call that triggered them; nothing above this layer
/// catches them silently.
#[derive(Debug, thiserror::Error)]
pub enum KeymasterError {
    /// A GET/PUT/DEL transaction completed but `result.ok` was false.
    #[error("keymaster protocol error: {}", .result.error_message)]
    Protocol { result: KmResult },

    /// The control socket was unreachable or the reply did not arrive
    /// within the configured timeout.
    #[error("keymaster transport failure: {0}")]
    Transport(String),

    /// The reply could not be decoded as the expected shape.
    #[error("keymaster decode failure: {0}")]
    Decode(String),

    #[error("keymaster construction failed: {0}")]
    Construction(#[from] matrix_transport::TransportError),
}

impl KeymasterError {
    pub fn protocol(result: KmResult) -> Self {
        Self::Protocol { result }
    }
}

pub(crate) fn node_to_yaml(node: &Node) -> Result<String, KeymasterError> {
    serde_yaml::to_string(node).map_err(|e| KeymasterError::Decode(e.to_string()))
}

pub(crate) fn yaml_to_node(text: &str) -> Result<Node, KeymasterError> {
    serde_yaml::from_str(text).map_err(|e| KeymasterError::Decode(e.to_string()))
}
