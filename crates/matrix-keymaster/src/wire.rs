// SPDX-License-Identifier: Apache-2.0

//! The control-socket wire format: one request is a multi-frame message
//! (frame 0 the verb, the rest string arguments); one reply is a single
//! frame holding the serialized result document. The publish socket sends
//! two frames per publication: the keychain and the serialized subtree.

use std::str::FromStr;

use matrix_keystore::{KmResult, Keychain, Node};
use serde::{Deserialize, Serialize};

use crate::error::KeymasterError;

pub const PING_TOKEN: &str = "PONG";
pub const HEARTBEAT_KEY: &str = "Keymaster.Heartbeat";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verb {
    Ping,
    Get { keychain: String },
    Put { keychain: String, value: String, create: bool },
    Del { keychain: String },
}

impl Verb {
    /// Encodes into the frames a REQ socket should send: frame 0 is the
    /// verb name, the rest are string arguments.
    pub fn into_frames(self) -> Vec<String> {
        match self {
            Verb::Ping => vec!["PING".to_string()],
            Verb::Get { keychain } => vec!["GET".to_string(), keychain],
            Verb::Put {
                keychain,
                value,
                create,
            } => vec!["PUT".to_string(), keychain, value, create.to_string()],
            Verb::Del { keychain } => vec!["DEL".to_string(), keychain],
        }
    }

    pub fn from_frames(frames: &[String]) -> Result<Self, String> {
        match frames.first().map(String::as_str) {
            Some("PING") => Ok(Verb::Ping),
            Some("GET") => {
                let keychain = frames.get(1).cloned().unwrap_or_default();
                Ok(Verb::Get { keychain })
            }
            Some("PUT") => {
                let keychain = frames.get(1).cloned().unwrap_or_default();
                let value = frames.get(2).cloned().unwrap_or_default();
                let create = frames
                    .get(3)
                    .map(|s| s == "true")
                    .unwrap_or(false);
                Ok(Verb::Put {
                    keychain,
                    value,
                    create,
                })
            }
            Some("DEL") => {
                let keychain = frames.get(1).cloned().unwrap_or_default();
                Ok(Verb::Del { keychain })
            }
            Some(other) => Err(format!("unknown verb '{other}'")),
            None => Err("empty request".to_string()),
        }
    }
}

/// Wire representation of a [`KmResult`]: `{ok, last-good-key, error, node}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ResultDoc {
    pub ok: bool,
    #[serde(rename = "last-good-key")]
    pub last_good_key: String,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub node: Node,
}

impl From<&KmResult> for ResultDoc {
    fn from(result: &KmResult) -> Self {
        Self {
            ok: result.ok,
            last_good_key: result.last_good_key.to_string(),
            error: result.error_message.clone(),
            node: result.returned_node.clone(),
        }
    }
}

impl ResultDoc {
    pub fn to_km_result(&self) -> Result<KmResult, KeymasterError> {
        let last_good_key = Keychain::from_str(&self.last_good_key)
            .map_err(|e| KeymasterError::Decode(e.to_string()))?;
        Ok(KmResult {
            ok: self.ok,
            last_good_key,
            error_message: self.error.clone(),
            returned_node: self.node.clone(),
        })
    }
}

pub fn encode_result(result: &KmResult) -> Result<String, KeymasterError> {
    let doc = ResultDoc::from(result);
    serde_yaml::to_string(&doc).map_err(|e| KeymasterError::Decode(e.to_string()))
}

pub fn decode_result(text: &str) -> Result<KmResult, KeymasterError> {
    let doc: ResultDoc =
        serde_yaml::from_str(text).map_err(|e| KeymasterError::Decode(e.to_string()))?;
    doc.to_km_result()
}

/// Decodes a publish-socket payload. The heartbeat key carries a bare
/// timestamp string rather than a serialized [`Node`], so it is wrapped
/// directly into a scalar instead of being run through the YAML decoder.
pub fn decode_heartbeat_or_node(key: &str, payload: &str) -> Result<Node, KeymasterError> {
    if key == HEARTBEAT_KEY {
        return Ok(Node::scalar(payload));
    }
    serde_yaml::from_str(payload).map_err(|e| KeymasterError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_verb_round_trips_through_frames() {
        let verb = Verb::Put {
            keychain: "a.b".to_string(),
            value: "42".to_string(),
            create: true,
        };
        let frames = verb.clone().into_frames();
        let parsed = Verb::from_frames(&frames).unwrap();
        assert_eq!(parsed, verb);
    }

    #[test]
    fn unknown_verb_is_rejected() {
        let frames = vec!["FROB".to_string()];
        assert!(Verb::from_frames(&frames).is_err());
    }

    #[test]
    fn result_doc_round_trips_ok_result() {
        let result = KmResult {
            ok: true,
            last_good_key: Keychain::parse("a.b").unwrap(),
            error_message: String::new(),
            returned_node: Node::scalar("42"),
        };
        let encoded = encode_result(&result).unwrap();
        let decoded = decode_result(&encoded).unwrap();
        assert_eq!(decoded, result);
    }
}
