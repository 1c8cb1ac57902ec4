use super::{ConnectionHandler, ConnectionLimiter, ServerConfig, ServerState};
use crate::error::ServerError;
use std::future::Future;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// Accept loop of the coordination server: one task per connection, at
/// most `max_connections` at a time.
pub struct CoordinatorServer {
    state: ServerState,
    limiter: ConnectionLimiter,
    max_frame_bytes: usize,
}

impl CoordinatorServer {
    pub fn new(state: ServerState, config: &ServerConfig) -> Self {
        CoordinatorServer {
            state,
            limiter: ConnectionLimiter::new(config.max_connections),
            max_frame_bytes: config.max_frame_bytes,
        }
    }

    pub async fn bind(config: &ServerConfig) -> Result<TcpListener, ServerError> {
        let listener = TcpListener::bind(config.bind_addr()).await?;
        Ok(listener)
    }

    /// Serve until `shutdown` resolves. Connections already accepted keep
    /// running to completion on their own tasks.
    pub async fn run_until<F>(self, listener: TcpListener, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!(
            "listening on {} (max {} connections)",
            listener.local_addr()?,
            self.limiter.limit()
        );

        loop {
            // Hold a slot before accepting; while all slots are busy new
            // connections wait in the listen backlog
            let permit = tokio::select! {
                _ = &mut shutdown => break,
                permit = self.limiter.acquire_permit() => match permit {
                    Ok(permit) => permit,
                    Err(e) => {
                        warn!("connection limiter closed: {}", e);
                        break;
                    }
                },
            };

            let accepted = tokio::select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, addr)) => {
                    let handler = ConnectionHandler::new(
                        stream,
                        self.state.clone(),
                        addr.to_string(),
                        self.max_frame_bytes,
                    );
                    tokio::spawn(async move {
                        handler.run().await;
                        drop(permit);
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }

        info!("shutting down");
        Ok(())
    }
}
