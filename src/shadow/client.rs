//! Shadow transport binding: line-delimited JSON with automatic reconnection
//!
//! Stands in for the real shadow RPC. The core only depends on the event and
//! writer contracts in the parent module; this binding delivers status/delta
//! frames over a persistent TCP connection and pushes reported-state frames
//! back on the same stream.

use super::{Connectivity, Reported, ShadowEvent, ShadowMetadata, ShadowState, ShadowWriter};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Configuration for the shadow connection loop.
#[derive(Debug, Clone)]
pub struct ShadowClientConfig {
    /// Unique device/thing identifier.
    pub thing_name: String,
    /// Shadow endpoint address (host:port).
    pub host: String,
    /// Reconnection delay (initial).
    pub reconnect_delay: Duration,
    /// Maximum reconnection delay.
    pub max_reconnect_delay: Duration,
    /// Connection timeout.
    pub connect_timeout: Duration,
}

impl Default for ShadowClientConfig {
    fn default() -> Self {
        Self {
            thing_name: "device-001".into(),
            host: "127.0.0.1:8883".into(),
            reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// Incoming wire frames, one JSON document per line.
#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum WireMessage {
    Status {
        state: DesiredSection,
        #[serde(default)]
        metadata: DesiredMetaSection,
    },
    Delta {
        state: ShadowState,
        #[serde(default)]
        metadata: ShadowMetadata,
    },
}

#[derive(Default, Deserialize)]
struct DesiredSection {
    #[serde(default)]
    desired: ShadowState,
}

#[derive(Default, Deserialize)]
struct DesiredMetaSection {
    #[serde(default)]
    desired: ShadowMetadata,
}

#[derive(Serialize)]
struct ReportFrame<'a> {
    thing: &'a str,
    state: ReportState,
}

#[derive(Serialize)]
struct ReportState {
    reported: Reported,
}

/// Maintains the shadow connection and delivers events to the run loop.
pub struct ShadowClient {
    thing_name: String,
    report_tx: mpsc::Sender<String>,
    event_rx: mpsc::Receiver<ShadowEvent>,
}

impl ShadowClient {
    /// Spawn the connection loop and return the client handle.
    pub fn connect(config: ShadowClientConfig) -> Self {
        let (report_tx, report_rx) = mpsc::channel::<String>(100);
        let (event_tx, event_rx) = mpsc::channel::<ShadowEvent>(100);
        let thing_name = config.thing_name.clone();

        tokio::spawn(async move {
            connection_loop(config, report_rx, event_tx).await;
        });

        Self {
            thing_name,
            report_tx,
            event_rx,
        }
    }

    /// Receive the next shadow event, in delivery order.
    pub async fn recv(&mut self) -> Option<ShadowEvent> {
        self.event_rx.recv().await
    }

    /// Handle used by the reconciler to push reported-state updates.
    pub fn writer(&self) -> ReportHandle {
        ReportHandle {
            thing_name: self.thing_name.clone(),
            tx: self.report_tx.clone(),
        }
    }
}

/// Cloneable reported-state sink backed by the connection's outbound queue.
#[derive(Clone)]
pub struct ReportHandle {
    thing_name: String,
    tx: mpsc::Sender<String>,
}

#[async_trait]
impl ShadowWriter for ReportHandle {
    async fn report(&self, reported: Reported) -> Result<()> {
        let frame = ReportFrame {
            thing: &self.thing_name,
            state: ReportState { reported },
        };
        let line = serde_json::to_string(&frame)?;
        self.tx
            .send(line)
            .await
            .map_err(|_| anyhow!("shadow connection closed"))
    }
}

/// Connection loop with exponential reconnect backoff. Emits `Connected` on
/// the first successful connect, `Reconnected` on later ones, `Closed` when an
/// established connection drops, and `Offline` when a connect attempt fails.
async fn connection_loop(
    config: ShadowClientConfig,
    mut report_rx: mpsc::Receiver<String>,
    event_tx: mpsc::Sender<ShadowEvent>,
) {
    let mut reconnect_delay = config.reconnect_delay;
    let mut connected_before = false;

    loop {
        match timeout(config.connect_timeout, TcpStream::connect(&config.host)).await {
            Ok(Ok(stream)) => {
                reconnect_delay = config.reconnect_delay;

                let kind = if connected_before {
                    Connectivity::Reconnected
                } else {
                    Connectivity::Connected
                };
                connected_before = true;
                if event_tx
                    .send(ShadowEvent::Connectivity(kind))
                    .await
                    .is_err()
                {
                    return;
                }

                if let Err(reason) = serve_connection(stream, &mut report_rx, &event_tx).await {
                    warn!("shadow connection lost: {:#}", reason);
                }
                if event_tx
                    .send(ShadowEvent::Connectivity(Connectivity::Closed))
                    .await
                    .is_err()
                {
                    return;
                }
            }
            Ok(Err(e)) => {
                debug!("shadow connect failed: {}", e);
                if event_tx
                    .send(ShadowEvent::Connectivity(Connectivity::Offline))
                    .await
                    .is_err()
                {
                    return;
                }
            }
            Err(_) => {
                debug!("shadow connect timed out");
                if event_tx
                    .send(ShadowEvent::Connectivity(Connectivity::Offline))
                    .await
                    .is_err()
                {
                    return;
                }
            }
        }

        tokio::time::sleep(reconnect_delay).await;
        reconnect_delay = std::cmp::min(reconnect_delay * 2, config.max_reconnect_delay);
    }
}

/// Serve one established connection until it drops.
async fn serve_connection(
    stream: TcpStream,
    report_rx: &mut mpsc::Receiver<String>,
    event_tx: &mpsc::Sender<ShadowEvent>,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    let mut status_seen = false;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        if let Some(event) = parse_frame(&line, &mut status_seen) {
                            event_tx
                                .send(event)
                                .await
                                .map_err(|_| anyhow!("event channel closed"))?;
                        }
                    }
                    None => return Err(anyhow!("shadow endpoint closed the stream")),
                }
            }

            Some(line) = report_rx.recv() => {
                writer.write_all(line.as_bytes()).await?;
                writer.write_all(b"\n").await?;
            }
        }
    }
}

/// Parse one incoming frame. Malformed frames are logged and skipped; only the
/// first status snapshot per connection is forwarded.
fn parse_frame(line: &str, status_seen: &mut bool) -> Option<ShadowEvent> {
    match serde_json::from_str::<WireMessage>(line) {
        Ok(WireMessage::Status { state, metadata }) => {
            if *status_seen {
                debug!("duplicate status snapshot ignored");
                return None;
            }
            *status_seen = true;
            Some(ShadowEvent::Status {
                state: state.desired,
                meta: metadata.desired,
            })
        }
        Ok(WireMessage::Delta { state, metadata }) => Some(ShadowEvent::Delta {
            state,
            meta: metadata,
        }),
        Err(e) => {
            warn!("malformed shadow frame: {}", e);
            None
        }
    }
}
