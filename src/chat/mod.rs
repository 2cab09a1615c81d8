pub mod client;
pub mod models;
pub mod prefill;
pub mod protocol;
pub mod session;
pub mod transport;

pub use client::{ChatClient, ChatHandle, Command};
pub use models::{Message, Role, Transcript};
pub use prefill::{OpenRequest, OpenRequestSink};
pub use session::{
    ChatSession, ChatSessionBuilder, ConnId, ConnectionError, ConnectionStatus, Scheduler,
    Snapshot, Timer, Transport, TransportEvent,
};
