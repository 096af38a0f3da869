//! # Voice WebSocket Handler
//!
//! Browsers connect to `/ws/voice` to drive the voice link. Each connection is
//! an actor that:
//!
//! 1. **Bridges audio**: exposes the browser's microphone and speakers to the
//!    link as a [`BrowserAudio`] backend
//! 2. **Relays commands**: `connect`, `disconnect` and `send_message` go
//!    straight to the shared [`VoiceLink`]
//! 3. **Reports back**: status changes and volume levels are pushed to the
//!    browser as JSON messages
//!
//! The link is shared by every socket. A socket that goes away tears the link
//! down only if the current session is still the one it started.
//!
//! See [`crate::protocol`] for the message format.

use crate::bridge::BrowserAudio;
use crate::protocol::{now_millis, ClientMessage, Push, ServerMessage};
use crate::state::AppState;
use crate::error::VoiceLinkError;
use crate::voice::{LinkStatus, StatusCallback, VoiceLink, VolumeCallback};

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// How often the server pings the browser.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Connection is dropped after this long without hearing from the browser.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

/// WebSocket actor for one browser tab.
///
/// ## Actor Model:
/// Uses Actix's actor system where each WebSocket connection is an independent actor.
/// Link callbacks run on background tasks, so they never touch the actor directly;
/// they send it messages through its address instead.
pub struct VoiceSocket {
    /// The shared voice link
    link: Arc<VoiceLink>,

    /// Audio devices of this browser, created once the actor has an address
    audio: Option<Arc<BrowserAudio>>,

    /// Session started by this socket, if any
    session_id: Option<Uuid>,

    /// Last time the browser showed signs of life
    last_heartbeat: Instant,
}

/// Status change reported by the link for a session this socket started.
#[derive(Message)]
#[rtype(result = "()")]
struct LinkNotice {
    status: LinkStatus,
    error: Option<VoiceLinkError>,
}

impl VoiceSocket {
    pub fn new(link: Arc<VoiceLink>) -> Self {
        Self {
            link,
            audio: None,
            session_id: None,
            last_heartbeat: Instant::now(),
        }
    }

    fn send(&self, ctx: &mut ws::WebsocketContext<Self>, message: &ServerMessage) {
        match serde_json::to_string(message) {
            Ok(json) => ctx.text(json),
            Err(err) => error!("Failed to serialize server message: {}", err),
        }
    }

    fn send_error(&self, ctx: &mut ws::WebsocketContext<Self>, code: &str, message: &str) {
        self.send(ctx, &ServerMessage::error(code, message));
        warn!("WebSocket error {}: {}", code, message);
    }

    fn status_message(&self, notice: &LinkNotice) -> ServerMessage {
        ServerMessage::status(notice.status, notice.error.as_ref(), self.session_id)
    }

    fn handle_connect(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        let Some(audio) = self.audio.clone() else {
            self.send_error(ctx, "not_ready", "Socket is still starting");
            return;
        };

        let notices = ctx.address();
        let on_status: StatusCallback = Arc::new(move |status, error| {
            notices.do_send(LinkNotice { status, error });
        });

        let volumes = ctx.address();
        let on_volume: VolumeCallback = Arc::new(move |level| {
            volumes.do_send(Push(ServerMessage::Volume { level }));
        });

        let session_id = self.link.connect(audio, on_status, on_volume);
        self.session_id = Some(session_id);
        info!(%session_id, "Voice session requested by browser");
    }

    fn handle_disconnect(&mut self) {
        self.link.disconnect();
        self.session_id = None;
    }

    /// Whether the link's current session was started by this socket.
    fn owns_session(&self) -> bool {
        self.session_id.is_some() && self.session_id == self.link.session_id()
    }

    fn handle_text(&mut self, text: &str, ctx: &mut ws::WebsocketContext<Self>) {
        let message = match serde_json::from_str::<ClientMessage>(text) {
            Ok(message) => message,
            Err(err) => {
                self.send_error(ctx, "invalid_json", &format!("Invalid JSON: {}", err));
                return;
            }
        };

        match message {
            ClientMessage::Connect => self.handle_connect(ctx),
            ClientMessage::Disconnect => self.handle_disconnect(),
            ClientMessage::SendMessage { text } => {
                if !self.link.send_message(text) {
                    self.send_error(ctx, "not_connected", "No active voice session");
                }
            }
            ClientMessage::Microphone { granted, reason } => {
                if let Some(audio) = &self.audio {
                    audio.resolve_permission(granted, reason);
                }
            }
            ClientMessage::PlaybackEnded { source_id } => {
                if let Some(audio) = &self.audio {
                    audio.playback_ended(source_id);
                }
            }
            ClientMessage::Pong { timestamp } => {
                debug!(latency_ms = now_millis().saturating_sub(timestamp), "Heartbeat");
            }
        }
    }
}

/// Implement Actor trait for WebSocket handling.
impl Actor for VoiceSocket {
    type Context = ws::WebsocketContext<Self>;

    /// Called when the WebSocket connection starts.
    fn started(&mut self, ctx: &mut Self::Context) {
        info!("Voice WebSocket connection started");
        self.audio = Some(Arc::new(BrowserAudio::new(ctx.address().recipient())));

        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > CLIENT_TIMEOUT {
                warn!("WebSocket heartbeat timeout, closing connection");
                ctx.stop();
                return;
            }
            act.send(ctx, &ServerMessage::Ping { timestamp: now_millis() });
        });
    }

    /// Called when the WebSocket connection stops.
    fn stopped(&mut self, _ctx: &mut Self::Context) {
        info!("Voice WebSocket connection stopped");

        if let Some(audio) = &self.audio {
            audio.detach();
        }
        if self.owns_session() {
            self.link.disconnect();
        }
    }
}

/// Handle incoming WebSocket messages.
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for VoiceSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => {
                self.last_heartbeat = Instant::now();
                self.handle_text(&text, ctx);
            }
            Ok(ws::Message::Binary(data)) => {
                self.last_heartbeat = Instant::now();
                if let Some(audio) = &self.audio {
                    if let Err(err) = audio.push_block(&data) {
                        self.send_error(ctx, "invalid_audio", &err.to_string());
                    }
                }
            }
            Ok(ws::Message::Ping(data)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&data);
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                info!("WebSocket closed: {:?}", reason);
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!("Received unexpected continuation frame");
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                error!("WebSocket protocol error: {}", err);
                ctx.stop();
            }
        }
    }
}

impl Handler<Push> for VoiceSocket {
    type Result = ();

    fn handle(&mut self, msg: Push, ctx: &mut Self::Context) {
        self.send(ctx, &msg.0);
    }
}

impl Handler<LinkNotice> for VoiceSocket {
    type Result = ();

    fn handle(&mut self, notice: LinkNotice, ctx: &mut Self::Context) {
        let message = self.status_message(&notice);
        self.send(ctx, &message);
    }
}

/// WebSocket endpoint handler.
///
/// ## HTTP to WebSocket Upgrade:
/// This function handles the initial HTTP request and upgrades it to a WebSocket connection.
/// The actual WebSocket communication is handled by the VoiceSocket actor.
pub async fn voice_websocket(
    req: HttpRequest,
    stream: web::Payload,
    app_state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    info!("New voice WebSocket connection from: {:?}", req.connection_info().peer_addr());
    ws::start(VoiceSocket::new(app_state.voice_link.clone()), &req, stream)
}
