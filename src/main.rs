//! Native-messaging host: JSON lines in on stdin, JSON lines out on stdout.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{broadcast, mpsc};

use autoflattr_lib::browser::BrowserEvent;
use autoflattr_lib::commands::{Request, Response};
use autoflattr_lib::events::FlattrEvent;
use autoflattr_lib::flattrs::{FlattrApi, OutboundFlattr, SubmitOutcome};
use autoflattr_lib::{default_data_dir, AppOptions, AppState};

#[derive(Debug, Deserialize)]
struct RequestEnvelope {
    #[serde(default)]
    id: Option<serde_json::Value>,
    #[serde(flatten)]
    request: Request,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Inbound {
    Request(RequestEnvelope),
    Event(BrowserEvent),
}

#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
enum Outbound {
    Response {
        id: Option<serde_json::Value>,
        #[serde(flatten)]
        response: Response,
    },
    Event {
        event: FlattrEvent,
    },
    Submit {
        flattrs: Vec<OutboundFlattr>,
    },
}

/// Hands batches to the extension, which owns the network session.
struct StdoutApi {
    out: mpsc::UnboundedSender<Outbound>,
}

#[async_trait]
impl FlattrApi for StdoutApi {
    async fn submit(&self, batch: &[OutboundFlattr]) -> SubmitOutcome {
        let message = Outbound::Submit {
            flattrs: batch.to_vec(),
        };
        match self.out.send(message) {
            Ok(()) => SubmitOutcome::Success,
            Err(_) => SubmitOutcome::Retryable,
        }
    }
}

fn init_logging() {
    let level = match std::env::var("AUTOFLATTR_DEBUG").as_deref() {
        Ok("1") | Ok("true") => log::LevelFilter::Debug,
        _ => log::LevelFilter::Info,
    };
    // stdout carries the protocol; logs go to stderr.
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .init();
}

async fn write_lines(mut rx: mpsc::UnboundedReceiver<Outbound>) {
    let mut stdout = tokio::io::stdout();
    while let Some(message) = rx.recv().await {
        let mut line = match serde_json::to_vec(&message) {
            Ok(line) => line,
            Err(err) => {
                error!("Failed to serialize outbound message: {err}");
                continue;
            }
        };
        line.push(b'\n');
        if let Err(err) = stdout.write_all(&line).await {
            error!("Failed to write to stdout: {err}");
            break;
        }
        if let Err(err) = stdout.flush().await {
            error!("Failed to flush stdout: {err}");
            break;
        }
    }
}

async fn forward_events(
    mut events: broadcast::Receiver<FlattrEvent>,
    out: mpsc::UnboundedSender<Outbound>,
) {
    loop {
        match events.recv().await {
            Ok(event) => {
                if out.send(Outbound::Event { event }).is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Event forwarder lagged; {skipped} events dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    info!("autoflattr starting up...");

    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_lines(out_rx));

    let state = AppState::start(AppOptions {
        data_dir: Some(default_data_dir()?),
        api: Some(Arc::new(StdoutApi {
            out: out_tx.clone(),
        })),
        run_scheduler: true,
        ..AppOptions::default()
    })
    .await?;
    let forwarder = tokio::spawn(forward_events(state.events.subscribe(), out_tx.clone()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Inbound>(line) {
            Ok(Inbound::Event(event)) => state.router.handle(event).await,
            Ok(Inbound::Request(RequestEnvelope { id, request })) => {
                let response = state.handle_request(request).await;
                if out_tx.send(Outbound::Response { id, response }).is_err() {
                    break;
                }
            }
            Err(err) => warn!("Ignoring malformed message: {err}"),
        }
    }

    info!("stdin closed; shutting down");
    state.shutdown().await;
    forwarder.abort();
    drop(state);
    drop(out_tx);
    if let Err(err) = writer.await {
        error!("Output writer failed to join: {err}");
    }
    Ok(())
}
