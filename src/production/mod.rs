mod connection;
mod connection_pool;
mod params;
mod runtime_config;
mod server;
mod server_config;
mod shared_state;

pub use connection::{dispatch, ConnectionHandler};
pub use connection_pool::ConnectionLimiter;
pub use params::{ParameterStore, ParameterTriple};
pub use runtime_config::RuntimeConfig;
pub use server::CoordinatorServer;
pub use server_config::{
    ServerConfig, DEFAULT_HOST, DEFAULT_MAX_CONNECTIONS, DEFAULT_MAX_FRAME_BYTES, DEFAULT_PORT,
};
pub use shared_state::{ServerState, StateStats};
