use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{ChangeEvent, ChangeFeed};
use crate::error::{RebanhoError, Result};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const CHANNEL_CAPACITY: usize = 64;

type Channels = Arc<Mutex<HashMap<String, broadcast::Sender<ChangeEvent>>>>;

/// Change notifications over the hosted realtime websocket.
///
/// One socket serves every table; each table gets its own broadcast
/// channel the first time it is subscribed. When the socket closes all
/// channels are dropped, which ends every subscriber. There is no
/// reconnect.
pub struct RealtimeFeed {
    outgoing: mpsc::UnboundedSender<String>,
    channels: Channels,
    next_ref: AtomicU64,
    cancel: CancellationToken,
}

/// Websocket endpoint for a REST base URL (`https://x` → `wss://x/realtime/v1/websocket`).
pub fn websocket_url(base_url: &str, api_key: &str) -> Result<String> {
    let base = base_url.trim_end_matches('/');
    let host = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        return Err(RebanhoError::Config(format!(
            "remote URL must start with http:// or https://: {}",
            base_url
        )));
    };
    Ok(format!(
        "{}/realtime/v1/websocket?apikey={}&vsn=1.0.0",
        host, api_key
    ))
}

fn join_frame(table: &str, reference: u64) -> String {
    json!({
        "topic": format!("realtime:{}", table),
        "event": "phx_join",
        "payload": {
            "config": {
                "postgres_changes": [
                    {"event": "*", "schema": "public", "table": table}
                ]
            }
        },
        "ref": reference.to_string(),
    })
    .to_string()
}

fn heartbeat_frame(reference: u64) -> String {
    json!({
        "topic": "phoenix",
        "event": "heartbeat",
        "payload": {},
        "ref": reference.to_string(),
    })
    .to_string()
}

/// Extract a change notification from a realtime frame. Replies,
/// heartbeats and presence traffic yield `None`.
pub fn parse_change_frame(text: &str) -> Option<ChangeEvent> {
    let frame: Value = serde_json::from_str(text).ok()?;
    if frame.get("event").and_then(Value::as_str) != Some("postgres_changes") {
        return None;
    }
    let data = frame.get("payload")?.get("data")?;
    let table = data.get("table").and_then(Value::as_str)?;
    let kind = data.get("type").and_then(Value::as_str)?.parse().ok()?;
    Some(ChangeEvent {
        table: table.to_string(),
        kind,
    })
}

fn dispatch(channels: &Channels, event: ChangeEvent) {
    if let Ok(channels) = channels.lock() {
        if let Some(tx) = channels.get(&event.table) {
            let _ = tx.send(event);
        }
    }
}

fn close_all(channels: &Channels) {
    if let Ok(mut channels) = channels.lock() {
        channels.clear();
    }
}

impl RealtimeFeed {
    pub async fn connect(base_url: &str, api_key: &str) -> Result<Self> {
        let url = websocket_url(base_url, api_key)?;
        let (stream, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| RebanhoError::Unreachable(format!("realtime connect failed: {}", e)))?;
        let (mut write, mut read) = stream.split();

        let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<String>();
        let channels: Channels = Arc::new(Mutex::new(HashMap::new()));
        let cancel = CancellationToken::new();

        let task_channels = channels.clone();
        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
            let mut heartbeat_ref = 0u64;

            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => {
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                    _ = heartbeat.tick() => {
                        heartbeat_ref += 1;
                        if write.send(Message::Text(heartbeat_frame(heartbeat_ref))).await.is_err() {
                            warn!("realtime heartbeat failed");
                            break;
                        }
                    }
                    Some(frame) = outgoing_rx.recv() => {
                        if let Err(e) = write.send(Message::Text(frame)).await {
                            warn!(error = %e, "realtime send failed");
                            break;
                        }
                    }
                    incoming = read.next() => {
                        match incoming {
                            Some(Ok(Message::Text(text))) => {
                                if let Some(event) = parse_change_frame(&text) {
                                    debug!(table = %event.table, kind = ?event.kind, "change notification");
                                    dispatch(&task_channels, event);
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                info!("realtime socket closed");
                                break;
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                warn!(error = %e, "realtime socket error");
                                break;
                            }
                        }
                    }
                }
            }

            close_all(&task_channels);
        });

        Ok(Self {
            outgoing,
            channels,
            next_ref: AtomicU64::new(1),
            cancel,
        })
    }
}

impl Drop for RealtimeFeed {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[async_trait]
impl ChangeFeed for RealtimeFeed {
    async fn subscribe(&self, table: &str) -> Result<broadcast::Receiver<ChangeEvent>> {
        let mut channels = self
            .channels
            .lock()
            .map_err(|_| RebanhoError::Realtime("channel registry poisoned".to_string()))?;

        if let Some(tx) = channels.get(table) {
            return Ok(tx.subscribe());
        }

        let reference = self.next_ref.fetch_add(1, Ordering::Relaxed);
        self.outgoing
            .send(join_frame(table, reference))
            .map_err(|_| RebanhoError::Realtime("realtime socket is closed".to_string()))?;

        let (tx, rx) = broadcast::channel(CHANNEL_CAPACITY);
        channels.insert(table.to_string(), tx);
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::ChangeKind;

    #[test]
    fn test_websocket_url() {
        assert_eq!(
            websocket_url("https://farm.example.co/", "key").unwrap(),
            "wss://farm.example.co/realtime/v1/websocket?apikey=key&vsn=1.0.0"
        );
        assert_eq!(
            websocket_url("http://localhost:54321", "key").unwrap(),
            "ws://localhost:54321/realtime/v1/websocket?apikey=key&vsn=1.0.0"
        );
        assert!(websocket_url("ftp://farm", "key").is_err());
    }

    #[test]
    fn test_join_frame_shape() {
        let frame: Value = serde_json::from_str(&join_frame("avisos", 7)).unwrap();
        assert_eq!(frame["topic"], "realtime:avisos");
        assert_eq!(frame["event"], "phx_join");
        assert_eq!(frame["ref"], "7");
        assert_eq!(
            frame["payload"]["config"]["postgres_changes"][0]["table"],
            "avisos"
        );
    }

    #[test]
    fn test_parse_change_frame() {
        let text = r#"{
            "topic": "realtime:avisos",
            "event": "postgres_changes",
            "payload": {"data": {"table": "avisos", "type": "UPDATE", "record": {"id": 1}}},
            "ref": null
        }"#;
        assert_eq!(
            parse_change_frame(text),
            Some(ChangeEvent {
                table: "avisos".to_string(),
                kind: ChangeKind::Update,
            })
        );
    }

    #[test]
    fn test_parse_ignores_other_frames() {
        assert_eq!(
            parse_change_frame(r#"{"topic":"phoenix","event":"phx_reply","payload":{"status":"ok"},"ref":"1"}"#),
            None
        );
        assert_eq!(parse_change_frame("not json"), None);
        assert_eq!(
            parse_change_frame(r#"{"event":"postgres_changes","payload":{"data":{"table":"avisos","type":"TRUNCATE"}}}"#),
            None
        );
    }
}
