//! Binds the chat session to a real WebSocket and to tokio timers.
//!
//! Each channel runs in its own task and reports its lifecycle back as
//! [`DriverEvent`]s. Timers are spawned sleeps that post a
//! [`DriverEvent::Timer`] when they elapse.
use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Result, anyhow};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;

use super::protocol;
use super::session::{ConnId, Scheduler, Timer, Transport, TransportEvent};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverEvent {
    Transport(TransportEvent),
    Timer(Timer),
}

struct Connection {
    outbound: mpsc::UnboundedSender<WsMessage>,
    task: JoinHandle<()>,
}

pub struct WsTransport {
    events: mpsc::UnboundedSender<DriverEvent>,
    keepalive: Duration,
    connections: HashMap<ConnId, Connection>,
}

impl WsTransport {
    pub fn new(events: mpsc::UnboundedSender<DriverEvent>, keepalive: Duration) -> Self {
        Self {
            events,
            keepalive,
            connections: HashMap::new(),
        }
    }
}

impl Transport for WsTransport {
    fn open(&mut self, id: ConnId, url: &str) -> Result<()> {
        let request = url.into_client_request()?;

        self.connections.retain(|_, conn| !conn.task.is_finished());

        let (outbound, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_connection(
            id,
            request,
            rx,
            self.events.clone(),
            self.keepalive,
        ));
        self.connections.insert(id, Connection { outbound, task });
        Ok(())
    }

    fn send(&mut self, id: ConnId, frame: &str) -> Result<()> {
        let conn = self
            .connections
            .get(&id)
            .ok_or_else(|| anyhow!("No chat channel {:?}", id))?;
        conn.outbound
            .send(WsMessage::Text(frame.to_string()))
            .map_err(|_| anyhow!("Chat channel {:?} is closed", id))
    }

    fn close(&mut self, id: ConnId) {
        // Dropping the sender tells the connection task to send a close
        // frame and stop.
        if self.connections.remove(&id).is_none() {
            tracing::debug!("Chat channel {:?} already gone", id);
        }
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        for (_, conn) in self.connections.drain() {
            conn.task.abort();
        }
    }
}

fn emit(events: &mpsc::UnboundedSender<DriverEvent>, event: TransportEvent) {
    // The driver is gone when this fails, nothing left to notify
    let _ = events.send(DriverEvent::Transport(event));
}

async fn run_connection(
    id: ConnId,
    request: Request,
    mut outbound: mpsc::UnboundedReceiver<WsMessage>,
    events: mpsc::UnboundedSender<DriverEvent>,
    keepalive: Duration,
) {
    let stream = match connect_async(request).await {
        Ok((stream, _response)) => stream,
        Err(err) => {
            emit(&events, TransportEvent::Error(id, err.to_string()));
            emit(&events, TransportEvent::Closed(id));
            return;
        }
    };
    emit(&events, TransportEvent::Opened(id));

    let (mut sink, mut source) = stream.split();
    let mut keepalive = interval_at(Instant::now() + keepalive, keepalive);

    loop {
        tokio::select! {
            outgoing = outbound.recv() => match outgoing {
                Some(msg) => {
                    if let Err(err) = sink.send(msg).await {
                        emit(&events, TransportEvent::Error(id, err.to_string()));
                        break;
                    }
                }
                None => {
                    let _ = sink.close().await;
                    break;
                }
            },
            incoming = source.next() => match incoming {
                Some(Ok(WsMessage::Text(text))) => {
                    emit(&events, TransportEvent::Frame(id, text));
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    tracing::debug!("Server closed chat channel {:?}: {:?}", id, frame);
                    break;
                }
                // Pings are answered by tungstenite, binary frames are not
                // part of the protocol
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    emit(&events, TransportEvent::Error(id, err.to_string()));
                    break;
                }
                None => break,
            },
            _ = keepalive.tick() => {
                if let Err(err) = sink.send(WsMessage::Text(protocol::ping_frame())).await {
                    emit(&events, TransportEvent::Error(id, err.to_string()));
                    break;
                }
            }
        }
    }

    emit(&events, TransportEvent::Closed(id));
}

pub struct TokioScheduler {
    events: mpsc::UnboundedSender<DriverEvent>,
    reconnect: Option<JoinHandle<()>>,
}

impl TokioScheduler {
    pub fn new(events: mpsc::UnboundedSender<DriverEvent>) -> Self {
        Self {
            events,
            reconnect: None,
        }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&mut self, delay: Duration, timer: Timer) {
        let is_reconnect = timer == Timer::Reconnect;
        let events = self.events.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(DriverEvent::Timer(timer));
        });

        if is_reconnect {
            if let Some(previous) = self.reconnect.replace(handle) {
                previous.abort();
            }
        }
    }

    fn cancel_reconnect(&mut self) {
        if let Some(handle) = self.reconnect.take() {
            handle.abort();
        }
    }
}
