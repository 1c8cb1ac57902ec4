//! Typed messages exchanged with workers
//!
//! A request travels as an `Envelope`: the `kind` discriminator plus a
//! bincode payload whose shape depends on the kind. Decoding an envelope
//! never fails on an unfamiliar kind; it yields `Request::Unknown` so the
//! dispatcher can log and drop it.

use crate::error::ProtocolError;
use crate::production::{ParameterTriple, RuntimeConfig};
use crate::storage::LogBatch;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub const KIND_GET_PARAM: &str = "get_param";
pub const KIND_SUBMIT_REPLAY: &str = "submit_replay";
pub const KIND_SUBMIT_PARAM: &str = "submit_param";
pub const KIND_DRAIN: &str = "drain";
pub const KIND_SET_CONFIG: &str = "set_config";

pub const STATUS_OK: &str = "ok";
pub const STATUS_UNAVAILABLE: &str = "empty param or log overflow";

/// Wire form of every request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub kind: String,
    pub payload: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct SubmitReplayPayload {
    /// Repeated names on the wire collapse on decode, last one wins
    logs: LogBatch,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    GetParam,
    /// Logs keyed by filename
    SubmitReplay { logs: LogBatch },
    SubmitParam(ParameterTriple),
    Drain,
    SetConfig(RuntimeConfig),
    /// Kind not understood by this server
    Unknown(String),
}

impl Request {
    pub fn kind(&self) -> &str {
        match self {
            Request::GetParam => KIND_GET_PARAM,
            Request::SubmitReplay { .. } => KIND_SUBMIT_REPLAY,
            Request::SubmitParam(_) => KIND_SUBMIT_PARAM,
            Request::Drain => KIND_DRAIN,
            Request::SetConfig(_) => KIND_SET_CONFIG,
            Request::Unknown(kind) => kind,
        }
    }

    /// Whether the server writes a response for this request.
    /// Clients must not wait on anything else.
    pub fn expects_reply(&self) -> bool {
        matches!(self, Request::GetParam | Request::Drain)
    }

    pub fn to_envelope(&self) -> Result<Envelope, ProtocolError> {
        let payload = match self {
            Request::GetParam | Request::Drain | Request::Unknown(_) => Bytes::new(),
            Request::SubmitReplay { logs } => {
                to_bytes(&SubmitReplayPayload { logs: logs.clone() })?
            }
            Request::SubmitParam(triple) => to_bytes(triple)?,
            Request::SetConfig(config) => to_bytes(config)?,
        };
        Ok(Envelope {
            kind: self.kind().to_string(),
            payload,
        })
    }

    pub fn from_envelope(envelope: Envelope) -> Result<Request, ProtocolError> {
        let Envelope { kind, payload } = envelope;
        let request = match kind.as_str() {
            KIND_GET_PARAM => Request::GetParam,
            KIND_SUBMIT_REPLAY => {
                let SubmitReplayPayload { logs } = from_bytes(&payload)?;
                Request::SubmitReplay { logs }
            }
            KIND_SUBMIT_PARAM => Request::SubmitParam(from_bytes(&payload)?),
            KIND_DRAIN => Request::Drain,
            KIND_SET_CONFIG => Request::SetConfig(from_bytes(&payload)?),
            _ => Request::Unknown(kind),
        };
        Ok(request)
    }
}

/// Response to `get_param`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamReply {
    Ok(ParameterTriple),
    /// Parameters not yet submitted, or the buffer is at capacity
    Unavailable,
}

impl ParamReply {
    pub fn status(&self) -> &'static str {
        match self {
            ParamReply::Ok(_) => STATUS_OK,
            ParamReply::Unavailable => STATUS_UNAVAILABLE,
        }
    }

    pub fn into_params(self) -> Option<ParameterTriple> {
        match self {
            ParamReply::Ok(triple) => Some(triple),
            ParamReply::Unavailable => None,
        }
    }
}

/// Response to `drain`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrainReply {
    /// Logs moved into the pool; 0 when the buffer was empty
    pub count: u64,
    pub drain_dir: String,
}

pub(crate) fn to_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Bytes, ProtocolError> {
    bincode::serialize(value)
        .map(Bytes::from)
        .map_err(|e| ProtocolError::encode(e.to_string()))
}

pub(crate) fn from_bytes<T: DeserializeOwned>(data: &[u8]) -> Result<T, ProtocolError> {
    bincode::deserialize(data).map_err(|e| ProtocolError::decode(e.to_string()))
}
