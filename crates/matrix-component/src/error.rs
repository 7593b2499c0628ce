// SPDX-License-Identifier: Apache-2.0

#[derive(Debug, thiserror::Error)]
pub enum ComponentError {
    #[error("keymaster: {0}")]
    Keymaster(#[from] matrix_keymaster::KeymasterError),

    #[error("data: {0}")]
    Data(#[from] matrix_data::DataError),

    #[error("transport: {0}")]
    Transport(#[from] matrix_transport::TransportError),

    #[error("unknown lifecycle command: '{0}'")]
    UnknownCommand(String),

    #[error(
        "no connection entry for consumer '{consumer}' sink '{sink_name}' in connections.{mode}"
    )]
    NoConnection {
        mode: String,
        consumer: String,
        sink_name: String,
    },

    #[error("malformed connections.{mode} entry: {detail}")]
    MalformedConnection { mode: String, detail: String },
}
