pub mod client;
pub mod error;
pub mod observability;
pub mod production;
pub mod protocol;
pub mod storage;

pub use client::WorkerClient;
pub use error::{ConfigError, ProtocolError, ServerError, StoreError};
pub use production::{CoordinatorServer, ParameterTriple, RuntimeConfig, ServerConfig, ServerState};
pub use protocol::{DrainReply, ParamReply, Request};
