//! Worker-side client
//!
//! Opens a fresh connection per call, mirroring the server's one message
//! per connection rule. Calls without a reply resolve once the server has
//! handled the request and closed the connection.

use crate::error::ProtocolError;
use crate::production::{ParameterTriple, RuntimeConfig, DEFAULT_MAX_FRAME_BYTES};
use crate::protocol::{DrainReply, Frame, MessageCodec, ParamReply, Request};
use crate::storage::LogBatch;
use futures::{SinkExt, StreamExt};
use std::io;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

type Connection = Framed<TcpStream, MessageCodec>;

#[derive(Debug, Clone)]
pub struct WorkerClient {
    addr: String,
    max_frame_bytes: usize,
}

impl WorkerClient {
    pub fn new(addr: impl Into<String>) -> Self {
        WorkerClient {
            addr: addr.into(),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }

    pub fn with_max_frame_bytes(mut self, max_frame_bytes: usize) -> Self {
        self.max_frame_bytes = max_frame_bytes;
        self
    }

    /// Latest parameters, or `None` while the server is applying
    /// backpressure or has none yet
    pub async fn get_param(&self) -> Result<Option<ParameterTriple>, ProtocolError> {
        let reply: ParamReply = self.call_with_reply(&Request::GetParam).await?.decode_any()?;
        Ok(reply.into_params())
    }

    pub async fn submit_replay(&self, logs: LogBatch) -> Result<(), ProtocolError> {
        self.call(&Request::SubmitReplay { logs }).await.map(drop)
    }

    pub async fn submit_param(&self, triple: ParameterTriple) -> Result<(), ProtocolError> {
        self.call(&Request::SubmitParam(triple)).await.map(drop)
    }

    pub async fn drain(&self) -> Result<DrainReply, ProtocolError> {
        self.call_with_reply(&Request::Drain).await?.decode_record()
    }

    pub async fn set_config(&self, config: RuntimeConfig) -> Result<(), ProtocolError> {
        self.call(&Request::SetConfig(config)).await.map(drop)
    }

    /// Send one request on a fresh connection. Kinds with a reply return
    /// its frame; the rest (including kinds the server does not know)
    /// resolve once the server closes the connection.
    pub async fn call(&self, request: &Request) -> Result<Option<Frame>, ProtocolError> {
        let stream = TcpStream::connect(self.addr.as_str()).await?;
        let mut conn = Framed::new(stream, MessageCodec::new(self.max_frame_bytes));
        conn.send(Frame::record(&request.to_envelope()?)?).await?;

        if request.expects_reply() {
            read_reply(&mut conn).await.map(Some)
        } else {
            wait_for_close(conn).await.map(|()| None)
        }
    }

    async fn call_with_reply(&self, request: &Request) -> Result<Frame, ProtocolError> {
        self.call(request)
            .await?
            .ok_or_else(|| ProtocolError::decode(format!("no reply to {}", request.kind())))
    }
}

async fn read_reply(conn: &mut Connection) -> Result<Frame, ProtocolError> {
    match conn.next().await {
        Some(frame) => frame,
        None => Err(ProtocolError::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "server closed the connection without replying",
        ))),
    }
}

async fn wait_for_close(mut conn: Connection) -> Result<(), ProtocolError> {
    match conn.next().await {
        None => Ok(()),
        Some(Ok(_)) => Err(ProtocolError::decode("unexpected reply to a one-way request")),
        Some(Err(e)) => Err(e),
    }
}
