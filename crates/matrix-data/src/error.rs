// SPDX-License-Identifier: Apache-2.0

#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("keymaster: {0}")]
    Keymaster(#[from] matrix_keymaster::KeymasterError),

    #[error("transport: {0}")]
    Transport(#[from] matrix_transport::TransportError),

    #[error("no transport selected: {0}")]
    SelectionFailed(String),

    #[error("sink type mismatch: expected {expected} bytes, got {got}")]
    TypeMismatch { expected: usize, got: usize },
}
