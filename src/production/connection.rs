use super::ServerState;
use crate::error::ServerError;
use crate::protocol::{DrainReply, Envelope, Frame, MessageCodec, ParamReply, Request};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::spawn_blocking;
use tokio_util::codec::Framed;
use tracing::{debug, error, info_span, warn, Instrument};

/// Serves exactly one request on one connection, then closes it.
pub struct ConnectionHandler<S> {
    framed: Framed<S, MessageCodec>,
    state: ServerState,
    client_addr: String,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, state: ServerState, client_addr: String, max_frame_bytes: usize) -> Self {
        ConnectionHandler {
            framed: Framed::new(stream, MessageCodec::new(max_frame_bytes)),
            state,
            client_addr,
        }
    }

    /// Failures end this connection only. Peer disconnects are not errors.
    pub async fn run(self) {
        let span = info_span!("connection", peer = %self.client_addr);
        async move {
            let client_addr = self.client_addr.clone();
            match self.serve_one().await {
                Ok(()) => debug!("connection closed"),
                Err(e) if e.is_benign_disconnect() => debug!("peer disconnected"),
                Err(e) => {
                    error!("error handling request from {}: {}", client_addr, e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn serve_one(mut self) -> Result<(), ServerError> {
        let frame = match self.framed.next().await {
            Some(frame) => frame?,
            None => return Err(ServerError::Disconnected),
        };
        let envelope: Envelope = frame.decode_record()?;
        let request = Request::from_envelope(envelope)?;
        debug!(kind = request.kind(), "request received");

        if let Some(reply) = dispatch(&self.state, request).await? {
            self.framed.send(reply).await?;
        }
        Ok(())
    }
}

/// Route one request to the server state and build the reply frame, if the
/// request kind has one.
///
/// Directory-lock work runs on the blocking pool: a drain holds the lock
/// across synchronous file moves.
pub async fn dispatch(state: &ServerState, request: Request) -> Result<Option<Frame>, ServerError> {
    match request {
        Request::GetParam => {
            let state = state.clone();
            let reply = match spawn_blocking(move || state.fetch_params()).await? {
                Some(triple) => Frame::packed(&ParamReply::Ok(triple))?,
                None => Frame::record(&ParamReply::Unavailable)?,
            };
            Ok(Some(reply))
        }
        Request::SubmitReplay { logs } => {
            let state = state.clone();
            spawn_blocking(move || state.submit(&logs)).await??;
            Ok(None)
        }
        Request::SubmitParam(triple) => {
            state.replace_params(triple);
            Ok(None)
        }
        Request::Drain => {
            let state = state.clone();
            let outcome = spawn_blocking(move || state.drain()).await??;
            let reply = DrainReply {
                count: outcome.count as u64,
                drain_dir: outcome.drain_location,
            };
            Ok(Some(Frame::record(&reply)?))
        }
        Request::SetConfig(config) => {
            let state = state.clone();
            let result = spawn_blocking(move || state.set_config(config)).await?;
            if let Err(e) = result {
                warn!("ignoring set_config {:?}: {}", config, e);
            }
            Ok(None)
        }
        Request::Unknown(kind) => {
            // No reply: a client waiting on one will hang until it gives up
            error!("unknown message type: {:?}", kind);
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::production::{ParameterTriple, RuntimeConfig};
    use crate::storage::{Area, InMemoryLogStore, LogBatch};
    use bytes::Bytes;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    fn state(capacity: u64) -> (ServerState, InMemoryLogStore) {
        let store = InMemoryLogStore::new();
        let config = RuntimeConfig::new(0.5, 0.8, capacity);
        let state = ServerState::with_seed(store.clone(), config, 3);
        (state, store)
    }

    #[tokio::test]
    async fn test_get_param_before_submit() {
        let (state, _) = state(10);
        let frame = dispatch(&state, Request::GetParam).await.unwrap().unwrap();
        assert!(!frame.is_packed());
        assert_eq!(frame.decode_record::<ParamReply>().unwrap(), ParamReply::Unavailable);
    }

    #[tokio::test]
    async fn test_submit_param_then_get_param_is_packed() {
        let (state, _) = state(10);
        let triple = ParameterTriple::new(&b"A"[..], &b"B"[..], &b"C"[..]);
        assert!(dispatch(&state, Request::SubmitParam(triple.clone()))
            .await
            .unwrap()
            .is_none());

        let frame = dispatch(&state, Request::GetParam).await.unwrap().unwrap();
        assert!(frame.is_packed());
        assert_eq!(frame.decode_any::<ParamReply>().unwrap(), ParamReply::Ok(triple));
    }

    #[tokio::test]
    async fn test_submit_replay_and_drain() {
        let (state, store) = state(10);
        let logs = LogBatch::from([
            ("a".to_string(), Bytes::from_static(b"1")),
            ("b".to_string(), Bytes::from_static(b"2")),
        ]);
        assert!(dispatch(&state, Request::SubmitReplay { logs }).await.unwrap().is_none());
        assert_eq!(state.buffer_count(), 2);

        let frame = dispatch(&state, Request::Drain).await.unwrap().unwrap();
        let reply: DrainReply = frame.decode_record().unwrap();
        assert_eq!(reply.count, 2);
        assert_eq!(reply.drain_dir, "memory://drain");
        assert_eq!(store.count(Area::Drain), 2);
        assert_eq!(state.buffer_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_set_config_is_dropped() {
        let (state, _) = state(10);
        let before = state.runtime_config();
        let reply = dispatch(&state, Request::SetConfig(RuntimeConfig::new(2.0, 0.1, 1)))
            .await
            .unwrap();
        assert!(reply.is_none());
        assert_eq!(state.runtime_config(), before);
    }

    #[tokio::test]
    async fn test_unknown_kind_has_no_reply() {
        let (state, _) = state(10);
        let reply = dispatch(&state, Request::Unknown("mystery".to_string())).await.unwrap();
        assert!(reply.is_none());
        assert_eq!(state.buffer_count(), 0);
    }

    #[tokio::test]
    async fn test_handler_survives_half_sent_frame() {
        let (state, _) = state(10);
        let (mut client, server) = duplex(1024);
        let handler = ConnectionHandler::new(server, state.clone(), "test".to_string(), 1024);
        let task = tokio::spawn(handler.run());

        client.write_all(&[0, 0, 0, 9, 0, 1]).await.unwrap();
        drop(client);

        // Returns without panicking; nothing mutated
        task.await.unwrap();
        assert_eq!(state.buffer_count(), 0);
    }

    #[tokio::test]
    async fn test_handler_writes_nothing_for_fire_and_forget() {
        let (state, _) = state(10);
        let (client, server) = duplex(4096);
        let handler = ConnectionHandler::new(server, state.clone(), "test".to_string(), 4096);
        let task = tokio::spawn(handler.run());

        let mut framed = Framed::new(client, MessageCodec::new(4096));
        let envelope = Request::SetConfig(RuntimeConfig::new(0.1, 0.2, 30))
            .to_envelope()
            .unwrap();
        framed.send(Frame::record(&envelope).unwrap()).await.unwrap();
        task.await.unwrap();

        let mut client = framed.into_inner();
        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
        assert_eq!(state.runtime_config(), RuntimeConfig::new(0.1, 0.2, 30));
    }
}
