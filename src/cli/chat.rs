use anyhow::Result;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::chat::{
    ChatClient, ChatHandle, Command, ConnectionStatus, Message, OpenRequest, OpenRequestSink,
    Role, Snapshot,
};
use crate::core::AppConfig;

const CONFIRM_NEW: &str = "La conversación anterior ha finalizado. ¿Deseas iniciar una nueva? [s/N] ";

/// Spawn the chat client in the background.
pub fn start(config: &AppConfig) -> (ChatHandle, JoinHandle<()>) {
    let (client, handle) = ChatClient::new(config);
    let task = tokio::spawn(client.run());
    (handle, task)
}

pub async fn run(config: &AppConfig, request: Option<OpenRequest>) -> Result<()> {
    let (handle, client) = start(config);
    match request {
        Some(request) => handle.request_open(request)?,
        None => handle.open()?,
    }
    interact(handle, client).await
}

/// Read user input until they quit, printing the conversation as it
/// changes.
pub async fn interact(handle: ChatHandle, client: JoinHandle<()>) -> Result<()> {
    let renderer = tokio::spawn(render(handle.subscribe()));

    let input = handle.clone();
    let result = tokio::task::spawn_blocking(move || read_input(input)).await?;

    if let Err(err) = handle.shutdown() {
        tracing::debug!("{}", err);
    }
    client.await?;
    renderer.await?;

    result
}

fn read_input(handle: ChatHandle) -> Result<()> {
    let mut rl = DefaultEditor::new()?;

    loop {
        let readline = rl.readline(">>> ");
        match readline {
            Ok(line) => match line.trim() {
                "" => continue,
                "/quit" | "/exit" => break,
                "/new" => {
                    if handle.snapshot().status != ConnectionStatus::Ended {
                        println!("La conversación sigue activa");
                        continue;
                    }
                    let answer = rl.readline(CONFIRM_NEW)?;
                    handle.new_conversation(is_yes(&answer))?;
                }
                text => {
                    rl.add_history_entry(text)?;
                    handle.command(Command::SetInput(text.to_string()))?;
                    handle.command(Command::Submit)?;
                }
            },
            Err(ReadlineError::Interrupted) => break,
            Err(ReadlineError::Eof) => break,
            Err(err) => return Err(err.into()),
        }
    }

    Ok(())
}

fn is_yes(answer: &str) -> bool {
    matches!(
        answer.trim().to_lowercase().as_str(),
        "s" | "si" | "sí" | "y" | "yes"
    )
}

/// Tracks what has been printed so each snapshot only prints what is new.
#[derive(Default)]
struct Printer {
    seen: usize,
    status: Option<ConnectionStatus>,
    session_id: Option<String>,
}

impl Printer {
    fn lines(&mut self, snapshot: &Snapshot) -> Vec<String> {
        let mut lines = Vec::new();
        if self.status != Some(snapshot.status) {
            lines.push(format!("[{}]", snapshot.status.label()));
            self.status = Some(snapshot.status);
        }

        // A new conversation starts with a new identity and an empty
        // transcript. Snapshots coalesce, so either can be the signal.
        if snapshot.session_id.is_some() && snapshot.session_id != self.session_id {
            if self.session_id.is_some() {
                self.seen = 0;
            }
            self.session_id = snapshot.session_id.clone();
        }
        if snapshot.messages.len() < self.seen {
            self.seen = 0;
        }

        lines.extend(snapshot.messages[self.seen..].iter().map(format_message));
        self.seen = snapshot.messages.len();
        lines
    }
}

async fn render(mut snapshots: watch::Receiver<Snapshot>) {
    let mut printer = Printer::default();

    loop {
        let lines = printer.lines(&snapshots.borrow_and_update());
        for line in lines {
            println!("{}", line);
        }

        if snapshots.changed().await.is_err() {
            break;
        }
    }
}

fn format_message(msg: &Message) -> String {
    match msg.role {
        Role::Assistant => format!("asistente> {}", msg.text),
        Role::User => format!("tú> {}", msg.text),
        Role::System => format!("* {}", msg.text),
    }
}
