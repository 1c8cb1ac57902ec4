//! Worker wire protocol: typed messages over length-prefixed frames

pub mod codec;
pub mod message;

pub use codec::{Frame, MessageCodec};
pub use message::{
    DrainReply, Envelope, ParamReply, Request, KIND_DRAIN, KIND_GET_PARAM, KIND_SET_CONFIG,
    KIND_SUBMIT_PARAM, KIND_SUBMIT_REPLAY, STATUS_OK, STATUS_UNAVAILABLE,
};
