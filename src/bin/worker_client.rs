//! Operator client for the coordination server
//!
//! ```text
//! worker-client status
//! worker-client drain
//! worker-client set-config <reuse_rate> <reuse_threshold> <capacity>
//! worker-client submit-param <oracle_file> <mortal_file> <dqn_file>
//! worker-client submit-logs <file>...
//! ```
//!
//! The server address comes from `MORTAL_ADDR` (default 127.0.0.1:5000);
//! `MORTAL_MAX_FRAME_BYTES` must match the server's limit when changed.

use bytes::Bytes;
use mortal_server::production::DEFAULT_MAX_FRAME_BYTES;
use mortal_server::storage::LogBatch;
use mortal_server::{ParameterTriple, RuntimeConfig, WorkerClient};
use std::path::Path;

const USAGE: &str = "usage: worker-client <status | drain \
    | set-config RATE THRESHOLD CAPACITY | submit-param ORACLE MORTAL DQN | submit-logs FILE...>";

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let addr = std::env::var("MORTAL_ADDR").unwrap_or_else(|_| "127.0.0.1:5000".to_string());
    let max_frame_bytes = match std::env::var("MORTAL_MAX_FRAME_BYTES") {
        Ok(raw) => raw.parse()?,
        Err(_) => DEFAULT_MAX_FRAME_BYTES,
    };
    let client = WorkerClient::new(addr).with_max_frame_bytes(max_frame_bytes);
    let args: Vec<String> = std::env::args().skip(1).collect();

    match args.first().map(String::as_str) {
        Some("status") => {
            let status = match client.get_param().await? {
                Some(triple) => serde_json::json!({
                    "status": "ok",
                    "oracle_bytes": triple.oracle.len(),
                    "mortal_bytes": triple.mortal.len(),
                    "dqn_bytes": triple.dqn.len(),
                }),
                None => serde_json::json!({ "status": "empty param or log overflow" }),
            };
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Some("drain") => {
            let reply = client.drain().await?;
            println!("drained {} logs into {}", reply.count, reply.drain_dir);
        }
        Some("set-config") if args.len() == 4 => {
            let config = RuntimeConfig::new(args[1].parse()?, args[2].parse()?, args[3].parse()?);
            config.validate()?;
            client.set_config(config).await?;
            println!("sent {:?}", config);
        }
        Some("submit-param") if args.len() == 4 => {
            let triple = ParameterTriple::new(
                std::fs::read(&args[1])?,
                std::fs::read(&args[2])?,
                std::fs::read(&args[3])?,
            );
            client.submit_param(triple).await?;
            println!("parameters submitted");
        }
        Some("submit-logs") if args.len() > 1 => {
            let mut logs = LogBatch::new();
            for path in &args[1..] {
                let name = Path::new(path)
                    .file_name()
                    .and_then(|n| n.to_str())
                    .ok_or_else(|| format!("not a file path: {}", path))?
                    .to_string();
                logs.insert(name, Bytes::from(std::fs::read(path)?));
            }
            let count = logs.len();
            client.submit_replay(logs).await?;
            println!("submitted {} logs", count);
        }
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    }

    Ok(())
}
