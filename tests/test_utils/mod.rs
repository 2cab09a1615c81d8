//! Test utilities for integration tests
#![allow(dead_code)]
use std::time::Duration;

use anyhow::{Result, anyhow};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

use landing_chat::chat::{
    ChatSession, ChatSessionBuilder, ConnId, Scheduler, Timer, Transport, TransportEvent,
};
use landing_chat::core::AppConfig;

/// Records everything the session asks of the channel. Opens can be made
/// to fail synchronously by setting `refuse_open`.
#[derive(Default)]
pub struct ScriptedTransport {
    pub opened: Vec<(ConnId, String)>,
    pub sent: Vec<(ConnId, String)>,
    pub closed: Vec<ConnId>,
    pub refuse_open: bool,
}

impl Transport for ScriptedTransport {
    fn open(&mut self, id: ConnId, url: &str) -> Result<()> {
        if self.refuse_open {
            return Err(anyhow!("Invalid URL {}", url));
        }
        self.opened.push((id, url.to_string()));
        Ok(())
    }

    fn send(&mut self, id: ConnId, frame: &str) -> Result<()> {
        self.sent.push((id, frame.to_string()));
        Ok(())
    }

    fn close(&mut self, id: ConnId) {
        self.closed.push(id);
    }
}

#[derive(Default)]
pub struct ManualScheduler {
    pub scheduled: Vec<(Duration, Timer)>,
    pub cancelled: usize,
}

impl Scheduler for ManualScheduler {
    fn schedule(&mut self, delay: Duration, timer: Timer) {
        self.scheduled.push((delay, timer));
    }

    fn cancel_reconnect(&mut self) {
        self.cancelled += 1;
    }
}

pub type TestSession = ChatSession<ScriptedTransport, ManualScheduler>;

pub fn test_session() -> TestSession {
    ChatSessionBuilder::new("ws://chat.test").build(
        ScriptedTransport::default(),
        ManualScheduler::default(),
    )
}

/// Id of the most recently opened channel.
pub fn last_conn(session: &TestSession) -> ConnId {
    session
        .transport()
        .opened
        .last()
        .map(|(id, _)| *id)
        .expect("No channel was opened")
}

/// A visible session with an open channel.
pub fn connected_session() -> TestSession {
    let mut session = test_session();
    session.open();
    let id = last_conn(&session);
    session.handle(TransportEvent::Opened(id));
    session
}

pub const FAREWELL: &str = "Gracias por tu tiempo";

/// A loopback chat server. Greets every connection, echoes user messages
/// as `Eco: <text>`, closes the conversation on `adios` and drops the
/// socket on `desconectar`.
pub struct ChatServer {
    pub ws_base_url: String,
    /// Request path of every accepted connection
    pub paths: mpsc::UnboundedReceiver<String>,
    /// Every text frame received from clients
    pub frames: mpsc::UnboundedReceiver<String>,
}

pub async fn spawn_chat_server() -> ChatServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (paths_tx, paths) = mpsc::unbounded_channel();
    let (frames_tx, frames) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let paths_tx = paths_tx.clone();
            let frames_tx = frames_tx.clone();
            tokio::spawn(async move {
                let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                    let _ = paths_tx.send(req.uri().path().to_string());
                    Ok(resp)
                };
                let Ok(mut ws) = accept_hdr_async(stream, callback).await else {
                    return;
                };

                let greeting = json!({"type": "greeting", "data": {"response": "¡Hola! ¿En qué puedo ayudarte?"}});
                if ws.send(WsMessage::Text(greeting.to_string())).await.is_err() {
                    return;
                }

                while let Some(Ok(msg)) = ws.next().await {
                    let WsMessage::Text(text) = msg else {
                        continue;
                    };
                    let _ = frames_tx.send(text.clone());

                    let value: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
                    if value["type"] == "ping" {
                        let _ = ws.send(WsMessage::Text(json!({"type": "pong"}).to_string())).await;
                        continue;
                    }

                    let message = value["message"].as_str().unwrap_or_default().to_string();
                    match message.as_str() {
                        "adios" => {
                            let close = json!({"type": "close", "data": {"message": FAREWELL}});
                            let _ = ws.send(WsMessage::Text(close.to_string())).await;
                            let _ = ws.close(None).await;
                            return;
                        }
                        "desconectar" => return,
                        _ => {
                            let reply = json!({"type": "message", "data": {"response": format!("Eco: {}", message)}});
                            let _ = ws.send(WsMessage::Text(reply.to_string())).await;
                        }
                    }
                }
            });
        }
    });

    ChatServer {
        ws_base_url: format!("ws://{}", addr),
        paths,
        frames,
    }
}

/// Config pointing at a loopback chat server with a short prefill delay.
pub fn test_config(ws_base_url: &str) -> AppConfig {
    AppConfig {
        api_base_url: String::from("http://127.0.0.1:9"),
        ws_base_url: ws_base_url.to_string(),
        utm_source: None,
        prefill_delay: Duration::from_millis(300),
        keepalive_interval: Duration::from_secs(30),
    }
}
