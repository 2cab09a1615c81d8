use std::fmt;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use uuid::Uuid;

use super::models::{Message, Role, Transcript};
use super::prefill::OpenRequest;
use super::protocol::{self, Inbound, OutboundMessage};

pub const MAX_RECONNECT_ATTEMPTS: u32 = 3;
const BASE_RECONNECT_DELAY_MS: u64 = 1000;
const MAX_RECONNECT_DELAY_MS: u64 = 5000;
pub const DEFAULT_PREFILL_DELAY: Duration = Duration::from_millis(1500);

const NOT_CONNECTED: &str = "Error: No conectado";
const CONVERSATION_ENDED: &str = "La conversación ha finalizado";
const EMPTY_MESSAGE: &str = "No se puede enviar un mensaje vacío";
const SEND_FAILED: &str = "Error al enviar mensaje";

/// Delay before the given reconnect attempt (1-based): 2s, 4s, then
/// capped at 5s.
pub fn reconnect_delay(attempt: u32) -> Duration {
    let ms = BASE_RECONNECT_DELAY_MS
        .saturating_mul(1_u64 << attempt.min(16))
        .min(MAX_RECONNECT_DELAY_MS);
    Duration::from_millis(ms)
}

/// Mint a fresh session identity: `ws_<unix millis>_<9 alphanumerics>`.
pub fn new_session_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("ws_{}_{}", Utc::now().timestamp_millis(), &suffix[..9])
}

/// Identifies one channel opened by the session. Events tagged with an
/// id that is no longer the current channel are stale and ignored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConnId(pub u64);

/// Lifecycle events reported by a [`Transport`] for a channel it opened.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    Opened(ConnId),
    Closed(ConnId),
    Error(ConnId, String),
    Frame(ConnId, String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Timer {
    Reconnect,
    Prefill(String),
}

/// A bidirectional, message oriented channel to the chat service.
///
/// `open` only starts connecting. Whether it worked is reported later as
/// a [`TransportEvent`] handed to [`ChatSession::handle`].
pub trait Transport {
    fn open(&mut self, id: ConnId, url: &str) -> Result<()>;
    fn send(&mut self, id: ConnId, frame: &str) -> Result<()>;
    fn close(&mut self, id: ConnId);
}

/// Delivers [`Timer`]s back to [`ChatSession::timer_fired`] after a delay.
/// At most one reconnect timer is pending at a time; prefill timers can
/// not be cancelled.
pub trait Scheduler {
    fn schedule(&mut self, delay: Duration, timer: Timer);
    fn cancel_reconnect(&mut self);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionError {
    ConnectFailed,
    Lost,
    Transport,
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            ConnectionError::ConnectFailed => "no se pudo conectar",
            ConnectionError::Lost => "conexión perdida",
            ConnectionError::Transport => "error de conexión",
        };
        f.write_str(reason)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Error(ConnectionError),
    Ended,
}

impl ConnectionStatus {
    /// Text shown in the widget header.
    pub fn label(&self) -> String {
        match self {
            ConnectionStatus::Connecting => String::from("Conectando..."),
            ConnectionStatus::Connected => String::from("En línea"),
            ConnectionStatus::Ended => String::from("Finalizado"),
            ConnectionStatus::Error(err) => err.to_string(),
            ConnectionStatus::Disconnected => String::from("Desconectado"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Connecting,
    Open,
    Failed,
}

#[derive(Debug)]
struct Channel {
    id: ConnId,
    phase: Phase,
}

/// What a UI layer needs to render the widget.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    pub status: ConnectionStatus,
    pub messages: Vec<Message>,
    pub visible: bool,
    pub notification: bool,
    pub input: String,
    pub session_id: Option<String>,
}

/// One logical conversation with the sales assistant.
///
/// All transitions are synchronous and driven from the outside: user
/// actions call the public methods, channel lifecycle goes through
/// [`ChatSession::handle`] and timers through
/// [`ChatSession::timer_fired`]. Side effects only happen through the
/// injected [`Transport`] and [`Scheduler`].
///
/// Use `ChatSessionBuilder` to construct a `ChatSession`.
pub struct ChatSession<T: Transport, S: Scheduler> {
    transport: T,
    scheduler: S,
    ws_base_url: String,
    prefill_delay: Duration,
    session_id: Option<String>,
    channel: Option<Channel>,
    next_conn: u64,
    transcript: Transcript,
    input: String,
    visible: bool,
    notification: bool,
    ended: bool,
    last_error: Option<ConnectionError>,
    reconnect_attempts: u32,
    reconnect_pending: bool,
}

impl<T: Transport, S: Scheduler> ChatSession<T, S> {
    pub fn status(&self) -> ConnectionStatus {
        if self.ended {
            return ConnectionStatus::Ended;
        }
        match self.channel.as_ref().map(|c| c.phase) {
            Some(Phase::Connecting) => ConnectionStatus::Connecting,
            Some(Phase::Open) => ConnectionStatus::Connected,
            Some(Phase::Failed) | None => match self.last_error {
                Some(err) => ConnectionStatus::Error(err),
                None => ConnectionStatus::Disconnected,
            },
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn has_notification(&self) -> bool {
        self.notification
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn set_input(&mut self, text: &str) {
        self.input = text.to_string();
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            status: self.status(),
            messages: self.transcript.messages().to_vec(),
            visible: self.visible,
            notification: self.notification,
            input: self.input.clone(),
            session_id: self.session_id.clone(),
        }
    }

    /// Show the widget, connecting if there is no live channel.
    pub fn open(&mut self) {
        self.visible = true;
        self.notification = false;

        if self.ended {
            tracing::debug!("Conversation ended, not connecting");
            return;
        }
        if !self.has_live_channel() {
            self.connect();
        }
    }

    pub fn hide(&mut self) {
        self.visible = false;
    }

    /// The widget's toggle button. After the conversation ended the user
    /// has to confirm starting a new one before anything happens.
    pub fn toggle(&mut self, confirm_reset: impl FnOnce() -> bool) {
        if self.ended {
            if self.reset(confirm_reset()) {
                self.open();
            }
            return;
        }

        if self.visible {
            self.hide();
        } else {
            self.open();
        }
    }

    pub fn connect(&mut self) {
        if self.ended {
            tracing::debug!("Ignoring connect on an ended conversation");
            return;
        }
        if self.has_live_channel() {
            return;
        }

        self.cancel_reconnect();
        if let Some(stale) = self.channel.take() {
            self.transport.close(stale.id);
        }

        let session_id = self
            .session_id
            .get_or_insert_with(new_session_id)
            .clone();
        let url = self.channel_url(&session_id);

        self.next_conn += 1;
        let id = ConnId(self.next_conn);
        self.last_error = None;

        tracing::info!("Connecting {:?} to {}", id, url);
        match self.transport.open(id, &url) {
            Ok(()) => {
                self.channel = Some(Channel {
                    id,
                    phase: Phase::Connecting,
                })
            }
            Err(err) => {
                tracing::warn!("Failed to open chat channel: {}", err);
                self.last_error = Some(ConnectionError::ConnectFailed);
            }
        }
    }

    pub fn handle(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Opened(id) => {
                let Some(channel) = self.current(id) else {
                    tracing::debug!("Ignoring open of stale channel {:?}", id);
                    return;
                };
                channel.phase = Phase::Open;
                self.reconnect_attempts = 0;
                self.last_error = None;
                tracing::info!("Chat channel {:?} connected", id);
            }
            TransportEvent::Closed(id) => {
                if self.current(id).is_none() {
                    tracing::debug!("Ignoring close of stale channel {:?}", id);
                    return;
                }
                self.channel = None;
                self.on_unintended_close();
            }
            TransportEvent::Error(id, reason) => {
                let Some(channel) = self.current(id) else {
                    return;
                };
                channel.phase = Phase::Failed;
                self.last_error = Some(ConnectionError::Transport);
                tracing::warn!("Chat channel {:?} error: {}", id, reason);
            }
            TransportEvent::Frame(id, raw) => {
                if self.current(id).is_none() {
                    tracing::debug!("Dropping frame from stale channel {:?}", id);
                    return;
                }
                self.receive(&raw);
            }
        }
    }

    pub fn timer_fired(&mut self, timer: Timer) {
        match timer {
            Timer::Reconnect => {
                if !self.reconnect_pending {
                    return;
                }
                self.reconnect_pending = false;
                self.connect();
            }
            Timer::Prefill(text) => {
                if self.open_channel().is_some() {
                    self.send(&text);
                } else {
                    tracing::debug!("Channel not open yet, dropping prefilled message");
                }
            }
        }
    }

    pub fn receive(&mut self, raw: &str) {
        match protocol::parse(raw) {
            Inbound::Pong => {}
            Inbound::Greeting(text) => self.render(Role::Assistant, &text),
            Inbound::Message { text, closes } => {
                self.render(Role::Assistant, &text);
                if closes {
                    self.end();
                }
            }
            Inbound::Close(text) => {
                self.ended = true;
                if let Some(text) = text {
                    self.render(Role::System, &text);
                }
                self.end();
            }
            Inbound::Error(text) => self.render(Role::System, &text),
            Inbound::Proactive(text) => {
                self.render(Role::Assistant, &text);
                if !self.visible {
                    self.notification = true;
                }
            }
            Inbound::Unknown(kind) => {
                tracing::debug!("Ignoring frame with unrecognized type {:?}", kind);
            }
            Inbound::Raw(text) => self.render(Role::Assistant, &text),
        }
    }

    /// Send user text. Returns whether a frame was written to the channel;
    /// rejections are reported in the transcript instead.
    pub fn send(&mut self, text: &str) -> bool {
        let Some(id) = self.open_channel() else {
            self.render(Role::System, NOT_CONNECTED);
            return false;
        };
        // Ending tears the channel down, so this only triggers if a channel
        // is ever kept open past the end of the conversation
        if self.ended {
            self.render(Role::System, CONVERSATION_ENDED);
            return false;
        }

        let text = text.trim();
        if text.is_empty() {
            self.render(Role::System, EMPTY_MESSAGE);
            return false;
        }

        let written = OutboundMessage::new(text)
            .to_json()
            .map_err(anyhow::Error::from)
            .and_then(|frame| self.transport.send(id, &frame));

        match written {
            Ok(()) => {
                self.render(Role::User, text);
                self.input.clear();
                true
            }
            Err(err) => {
                tracing::warn!("Failed to send chat message: {}", err);
                self.render(Role::System, SEND_FAILED);
                false
            }
        }
    }

    /// Send whatever is in the input buffer.
    pub fn submit(&mut self) -> bool {
        let text = self.input.clone();
        self.send(&text)
    }

    /// Tear down the channel and any pending reconnect. Safe to call
    /// repeatedly. Does not end the conversation.
    pub fn terminate(&mut self) {
        self.cancel_reconnect();
        if let Some(channel) = self.channel.take() {
            tracing::debug!("Closing chat channel {:?}", channel.id);
            self.transport.close(channel.id);
        }
    }

    /// Start over after an ended conversation. Only proceeds when the
    /// conversation has ended and the user confirmed.
    pub fn reset(&mut self, confirmed: bool) -> bool {
        if !self.ended || !confirmed {
            return false;
        }

        self.terminate();
        self.session_id = None;
        self.transcript = Transcript::new();
        self.input.clear();
        self.notification = false;
        self.ended = false;
        self.last_error = None;
        self.reconnect_attempts = 0;
        tracing::info!("Starting a new conversation");
        true
    }

    /// Open the widget on behalf of another component and, after the
    /// prefill delay, send the composed message if the channel is open
    /// by then.
    pub fn request_open(&mut self, request: &OpenRequest) {
        if !self.ended {
            self.reconnect_attempts = 0;
        }
        self.open();
        self.scheduler
            .schedule(self.prefill_delay, Timer::Prefill(request.compose()));
    }

    fn end(&mut self) {
        self.ended = true;
        self.input.clear();
        self.terminate();
    }

    fn on_unintended_close(&mut self) {
        if self.ended {
            return;
        }

        if self.reconnect_attempts < MAX_RECONNECT_ATTEMPTS {
            self.reconnect_attempts += 1;
            let delay = reconnect_delay(self.reconnect_attempts);
            self.last_error = None;
            self.cancel_reconnect();
            self.scheduler.schedule(delay, Timer::Reconnect);
            self.reconnect_pending = true;
            tracing::info!(
                "Chat channel closed, reconnect attempt {} in {:?}",
                self.reconnect_attempts,
                delay
            );
        } else {
            self.last_error = Some(ConnectionError::Lost);
            tracing::warn!(
                "Chat channel closed after {} reconnect attempts, giving up",
                self.reconnect_attempts
            );
        }
    }

    fn cancel_reconnect(&mut self) {
        self.scheduler.cancel_reconnect();
        self.reconnect_pending = false;
    }

    fn render(&mut self, role: Role, text: &str) {
        self.transcript.push(Message::new(role, text));
    }

    fn current(&mut self, id: ConnId) -> Option<&mut Channel> {
        self.channel.as_mut().filter(|c| c.id == id)
    }

    fn has_live_channel(&self) -> bool {
        matches!(
            self.channel.as_ref().map(|c| c.phase),
            Some(Phase::Connecting) | Some(Phase::Open)
        )
    }

    fn open_channel(&self) -> Option<ConnId> {
        self.channel
            .as_ref()
            .filter(|c| c.phase == Phase::Open)
            .map(|c| c.id)
    }

    fn channel_url(&self, session_id: &str) -> String {
        format!(
            "{}/api/v1/chat/ws/{}",
            self.ws_base_url.trim_end_matches('/'),
            urlencoding::encode(session_id)
        )
    }
}

pub struct ChatSessionBuilder {
    ws_base_url: String,
    prefill_delay: Duration,
    session_id: Option<String>,
}

impl ChatSessionBuilder {
    pub fn new(ws_base_url: &str) -> Self {
        Self {
            ws_base_url: ws_base_url.to_string(),
            prefill_delay: DEFAULT_PREFILL_DELAY,
            session_id: None,
        }
    }

    pub fn prefill_delay(mut self, delay: Duration) -> Self {
        self.prefill_delay = delay;
        self
    }

    /// Resume a known conversation instead of minting an identity on the
    /// first connection attempt.
    pub fn session_id(mut self, session_id: &str) -> Self {
        self.session_id = Some(session_id.to_string());
        self
    }

    pub fn build<T: Transport, S: Scheduler>(self, transport: T, scheduler: S) -> ChatSession<T, S> {
        ChatSession {
            transport,
            scheduler,
            ws_base_url: self.ws_base_url,
            prefill_delay: self.prefill_delay,
            session_id: self.session_id,
            channel: None,
            next_conn: 0,
            transcript: Transcript::new(),
            input: String::new(),
            visible: false,
            notification: false,
            ended: false,
            last_error: None,
            reconnect_attempts: 0,
            reconnect_pending: false,
        }
    }
}
