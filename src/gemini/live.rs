//! Gemini Live WebSocket client.
//!
//! The handshake runs on the unsplit stream: send the setup frame and wait
//! (bounded) for `setupComplete`. Only then is the socket split into a writer
//! task fed by a bounded queue and a reader task that turns server frames into
//! [`LiveEvent`]s. Gemini may send JSON as text or as binary frames.
//!
//! Closing goes through its own signal, never through the frame queue, so a
//! backed-up queue cannot hold back the close frame.

use crate::audio::codec::MediaBlob;
use crate::error::VoiceLinkError;
use crate::gemini::{build_media_message, build_setup_message, build_text_message, parse_server_message};
use crate::voice::live::{LiveChannel, LiveConnector, LiveEvent, LiveSender, LiveSetup};
use async_trait::async_trait;
use futures_util::{Sink, SinkExt, StreamExt};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

/// Public Gemini Live endpoint.
pub const DEFAULT_LIVE_ENDPOINT: &str =
    "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Opens Gemini Live sessions.
#[derive(Debug, Clone)]
pub struct GeminiLiveConnector {
    endpoint: String,
    api_key: String,
    handshake_timeout: Duration,
    outbound_capacity: usize,
    inbound_capacity: usize,
}

impl GeminiLiveConnector {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            handshake_timeout: Duration::from_secs(15),
            outbound_capacity: 64,
            inbound_capacity: 256,
        }
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Queue sizes for outbound frames and inbound events.
    pub fn with_capacities(mut self, outbound: usize, inbound: usize) -> Self {
        self.outbound_capacity = outbound.max(1);
        self.inbound_capacity = inbound.max(1);
        self
    }

    fn url(&self) -> String {
        format!("{}?key={}", self.endpoint, self.api_key)
    }
}

/// Text of a frame that may carry JSON, regardless of frame type.
fn frame_text(message: &WsMessage) -> Option<&str> {
    match message {
        WsMessage::Text(text) => Some(text.as_str()),
        WsMessage::Binary(data) if data.first() == Some(&b'{') => std::str::from_utf8(data).ok(),
        _ => None,
    }
}

#[async_trait]
impl LiveConnector for GeminiLiveConnector {
    async fn connect(&self, setup: &LiveSetup) -> Result<LiveChannel, VoiceLinkError> {
        if self.api_key.is_empty() {
            return Err(VoiceLinkError::HandshakeFailure("no API key configured".to_string()));
        }

        info!(model = %setup.model, voice = %setup.voice_name, "Connecting to Gemini Live");

        let (mut stream, _response) = tokio_tungstenite::connect_async(self.url())
            .await
            .map_err(|e| VoiceLinkError::HandshakeFailure(format!("failed to connect: {}", e)))?;

        let setup_json = serde_json::to_string(&build_setup_message(setup))
            .map_err(|e| VoiceLinkError::HandshakeFailure(e.to_string()))?;
        stream
            .send(WsMessage::Text(setup_json))
            .await
            .map_err(|e| VoiceLinkError::HandshakeFailure(format!("failed to send setup: {}", e)))?;

        let handshake = tokio::time::timeout(self.handshake_timeout, async {
            while let Some(frame) = stream.next().await {
                let frame = match frame {
                    Ok(frame) => frame,
                    Err(e) => return Err(e.to_string()),
                };
                if let WsMessage::Close(close) = &frame {
                    return Err(format!("closed before setupComplete: {:?}", close));
                }
                if let Some(text) = frame_text(&frame) {
                    let message = parse_server_message(text);
                    if message.setup_complete {
                        return Ok(());
                    }
                    if let Some(LiveEvent::Error(cause)) = message.events.into_iter().next() {
                        return Err(cause);
                    }
                }
            }
            Err("stream ended before setupComplete".to_string())
        })
        .await;

        match handshake {
            Ok(Ok(())) => info!("Gemini Live setup complete"),
            Ok(Err(cause)) => return Err(VoiceLinkError::HandshakeFailure(cause)),
            Err(_) => {
                return Err(VoiceLinkError::HandshakeFailure(format!(
                    "no setupComplete within {}s",
                    self.handshake_timeout.as_secs()
                )))
            }
        }

        let (sink, mut source) = stream.split();
        let (outbound_tx, outbound_rx) = mpsc::channel::<String>(self.outbound_capacity);
        let (close_tx, close_rx) = oneshot::channel();
        let (event_tx, event_rx) = mpsc::channel::<LiveEvent>(self.inbound_capacity);

        tokio::spawn(write_frames(sink, outbound_rx, close_rx, event_tx.clone()));

        let reader = tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                let frame = match frame {
                    Ok(frame) => frame,
                    Err(e) => {
                        let _ = event_tx.send(LiveEvent::Error(format!("WebSocket error: {}", e))).await;
                        return;
                    }
                };

                if let WsMessage::Close(close) = &frame {
                    debug!(close_frame = ?close, "Gemini Live closed the connection");
                    break;
                }

                let Some(text) = frame_text(&frame) else {
                    continue;
                };
                for event in parse_server_message(text).events {
                    if event_tx.send(event).await.is_err() {
                        return;
                    }
                }
            }
            let _ = event_tx.send(LiveEvent::Closed).await;
        });

        let sender = Arc::new(GeminiLiveSender {
            outbound: outbound_tx,
            closing: Mutex::new(Some(close_tx)),
            reader: Mutex::new(Some(reader)),
        });

        Ok(LiveChannel { sender, events: event_rx })
    }
}

/// Writer task: forward queued frames until closed, then send a close frame.
///
/// Dropping the close signal's sender counts as a close.
async fn write_frames<S>(
    mut sink: S,
    mut frames: mpsc::Receiver<String>,
    mut closing: oneshot::Receiver<()>,
    events: mpsc::Sender<LiveEvent>,
) where
    S: Sink<WsMessage> + Unpin,
    S::Error: std::fmt::Display,
{
    loop {
        tokio::select! {
            biased;
            _ = &mut closing => {
                let _ = sink.send(WsMessage::Close(None)).await;
                break;
            }
            frame = frames.recv() => {
                let Some(json) = frame else {
                    let _ = sink.send(WsMessage::Close(None)).await;
                    break;
                };
                if let Err(e) = sink.send(WsMessage::Text(json)).await {
                    warn!(error = %e, "Gemini Live send failed");
                    let _ = events.send(LiveEvent::Error(format!("send failed: {}", e))).await;
                    break;
                }
            }
        }
    }
    debug!("Gemini Live writer finished");
}

/// Outbound half of a Gemini Live session.
pub struct GeminiLiveSender {
    outbound: mpsc::Sender<String>,
    closing: Mutex<Option<oneshot::Sender<()>>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl GeminiLiveSender {
    fn enqueue(&self, json: String) -> Result<(), VoiceLinkError> {
        match self.outbound.try_send(json) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                Err(VoiceLinkError::TransportError("outbound queue full".to_string()))
            }
            Err(TrySendError::Closed(_)) => {
                Err(VoiceLinkError::TransportError("session closed".to_string()))
            }
        }
    }
}

#[async_trait]
impl LiveSender for GeminiLiveSender {
    async fn send_media(&self, blob: MediaBlob) -> Result<(), VoiceLinkError> {
        let json = serde_json::to_string(&build_media_message(blob))
            .map_err(|e| VoiceLinkError::TransportError(e.to_string()))?;
        self.enqueue(json)
    }

    async fn send_text(&self, text: String) -> Result<(), VoiceLinkError> {
        let json = serde_json::to_string(&build_text_message(text))
            .map_err(|e| VoiceLinkError::TransportError(e.to_string()))?;
        self.outbound
            .send(json)
            .await
            .map_err(|_| VoiceLinkError::TransportError("session closed".to_string()))
    }

    fn close(&self) {
        let closing = self.closing.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(closing) = closing {
            let _ = closing.send(());
        }

        let reader = self.reader.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(reader) = reader {
            reader.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_json_frames_are_read_as_text() {
        let binary = WsMessage::Binary(br#"{"setupComplete":{}}"#.to_vec());
        assert_eq!(frame_text(&binary), Some(r#"{"setupComplete":{}}"#));

        let text = WsMessage::Text("{}".to_string());
        assert_eq!(frame_text(&text), Some("{}"));

        assert_eq!(frame_text(&WsMessage::Binary(vec![0, 1, 2])), None);
        assert_eq!(frame_text(&WsMessage::Ping(vec![])), None);
    }

    #[test]
    fn test_url_carries_key() {
        let connector = GeminiLiveConnector::new("wss://example.test/live", "secret");
        assert_eq!(connector.url(), "wss://example.test/live?key=secret");
    }

    #[tokio::test]
    async fn test_missing_key_fails_handshake() {
        let connector = GeminiLiveConnector::new(DEFAULT_LIVE_ENDPOINT, "");
        let result = connector.connect(&crate::voice::testing::test_setup()).await;
        assert!(matches!(result, Err(VoiceLinkError::HandshakeFailure(_))));
    }

    #[tokio::test]
    async fn test_sender_after_close_reports_transport_error() {
        let (outbound, rx) = mpsc::channel(1);
        drop(rx);
        let sender = GeminiLiveSender {
            outbound,
            closing: Mutex::new(None),
            reader: Mutex::new(None),
        };

        sender.close();
        let result = sender.send_text("hello".to_string()).await;
        assert!(matches!(result, Err(VoiceLinkError::TransportError(_))));
    }

    #[tokio::test]
    async fn test_full_queue_drops_media() {
        let (outbound, _rx) = mpsc::channel(1);
        let sender = GeminiLiveSender {
            outbound,
            closing: Mutex::new(None),
            reader: Mutex::new(None),
        };
        let blob = MediaBlob {
            data: String::new(),
            mime_type: "audio/pcm;rate=16000".to_string(),
        };

        assert!(sender.send_media(blob.clone()).await.is_ok());
        assert!(sender.send_media(blob).await.is_err());
    }

    type Written = Arc<std::sync::Mutex<Vec<WsMessage>>>;

    /// Sink that records every frame the writer sends.
    fn recording_sink() -> (impl Sink<WsMessage, Error = std::convert::Infallible> + Unpin, Written) {
        let written: Written = Arc::new(std::sync::Mutex::new(Vec::new()));
        let log = written.clone();
        let sink = futures_util::sink::unfold(log, |log: Written, frame: WsMessage| async move {
            log.lock().unwrap().push(frame);
            Ok::<_, std::convert::Infallible>(log)
        });
        (Box::pin(sink), written)
    }

    #[tokio::test]
    async fn test_close_reaches_writer_when_queue_is_full() {
        let (outbound, frames) = mpsc::channel(1);
        let (close_tx, close_rx) = oneshot::channel();
        let (events, _events_rx) = mpsc::channel(1);
        let sender = GeminiLiveSender {
            outbound,
            closing: Mutex::new(Some(close_tx)),
            reader: Mutex::new(None),
        };
        let blob = MediaBlob {
            data: String::new(),
            mime_type: "audio/pcm;rate=16000".to_string(),
        };

        sender.send_media(blob.clone()).await.unwrap();
        assert!(sender.send_media(blob).await.is_err());
        sender.close();
        sender.close();

        let (sink, written) = recording_sink();
        write_frames(sink, frames, close_rx, events).await;

        let written = written.lock().unwrap().clone();
        assert_eq!(written.last(), Some(&WsMessage::Close(None)));
        assert_eq!(written.iter().filter(|m| matches!(m, WsMessage::Close(_))).count(), 1);
    }

    #[tokio::test]
    async fn test_writer_forwards_frames_then_closes() {
        let (outbound, frames) = mpsc::channel(4);
        let (close_tx, close_rx) = oneshot::channel::<()>();
        let (events, _events_rx) = mpsc::channel(1);

        outbound.send("{\"a\":1}".to_string()).await.unwrap();
        drop(outbound);

        let (sink, written) = recording_sink();
        let writer = tokio::spawn(write_frames(sink, frames, close_rx, events));
        writer.await.unwrap();
        drop(close_tx);

        let written = written.lock().unwrap().clone();
        assert_eq!(
            written,
            vec![WsMessage::Text("{\"a\":1}".to_string()), WsMessage::Close(None)]
        );
    }
}
