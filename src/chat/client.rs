//! Runs a [`ChatSession`] against a real WebSocket.
//!
//! `ChatClient::run` owns the session and serializes every input into it
//! from a single task: user commands from any number of [`ChatHandle`]s,
//! channel lifecycle events and timer firings. After each one it
//! publishes a fresh [`Snapshot`] for UI layers to render.
use anyhow::{Result, anyhow};
use tokio::sync::{mpsc, watch};

use super::prefill::{OpenRequest, OpenRequestSink};
use super::session::{ChatSession, ChatSessionBuilder, Snapshot};
use super::transport::{DriverEvent, TokioScheduler, WsTransport};
use crate::core::AppConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Open,
    Hide,
    SetInput(String),
    Submit,
    Send(String),
    NewConversation { confirmed: bool },
    RequestOpen(OpenRequest),
    Shutdown,
}

pub struct ChatClient {
    session: ChatSession<WsTransport, TokioScheduler>,
    events: mpsc::UnboundedReceiver<DriverEvent>,
    commands: mpsc::UnboundedReceiver<Command>,
    snapshots: watch::Sender<Snapshot>,
}

impl ChatClient {
    pub fn new(config: &AppConfig) -> (Self, ChatHandle) {
        let (events_tx, events) = mpsc::unbounded_channel();
        let (commands_tx, commands) = mpsc::unbounded_channel();

        let session = ChatSessionBuilder::new(&config.ws_base_url)
            .prefill_delay(config.prefill_delay)
            .build(
                WsTransport::new(events_tx.clone(), config.keepalive_interval),
                TokioScheduler::new(events_tx),
            );
        let (snapshots, snapshots_rx) = watch::channel(session.snapshot());

        let client = Self {
            session,
            events,
            commands,
            snapshots,
        };
        let handle = ChatHandle {
            commands: commands_tx,
            snapshots: snapshots_rx,
        };
        (client, handle)
    }

    /// Process events until a `Shutdown` command arrives or every handle
    /// has been dropped, then tear the channel down.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                Some(event) = self.events.recv() => match event {
                    DriverEvent::Transport(event) => self.session.handle(event),
                    DriverEvent::Timer(timer) => self.session.timer_fired(timer),
                },
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.apply(command),
                },
            }
            self.snapshots.send_replace(self.session.snapshot());
        }

        self.session.terminate();
        self.snapshots.send_replace(self.session.snapshot());
        tracing::debug!("Chat client stopped");
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::Open => self.session.open(),
            Command::Hide => self.session.hide(),
            Command::SetInput(text) => self.session.set_input(&text),
            Command::Submit => {
                self.session.submit();
            }
            Command::Send(text) => {
                self.session.send(&text);
            }
            Command::NewConversation { confirmed } => {
                if self.session.reset(confirmed) {
                    self.session.open();
                }
            }
            Command::RequestOpen(request) => self.session.request_open(&request),
            Command::Shutdown => {}
        }
    }
}

/// Cheap, cloneable access to a running [`ChatClient`].
#[derive(Clone)]
pub struct ChatHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<Snapshot>,
}

impl ChatHandle {
    pub fn command(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| anyhow!("Chat client is not running"))
    }

    pub fn open(&self) -> Result<()> {
        self.command(Command::Open)
    }

    pub fn send(&self, text: &str) -> Result<()> {
        self.command(Command::Send(text.to_string()))
    }

    pub fn new_conversation(&self, confirmed: bool) -> Result<()> {
        self.command(Command::NewConversation { confirmed })
    }

    pub fn shutdown(&self) -> Result<()> {
        self.command(Command::Shutdown)
    }

    /// The most recently published state.
    pub fn snapshot(&self) -> Snapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.clone()
    }
}

impl OpenRequestSink for ChatHandle {
    fn request_open(&self, request: OpenRequest) -> Result<()> {
        self.command(Command::RequestOpen(request))
    }
}
