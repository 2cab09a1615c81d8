use anyhow::Result;

use super::chat;
use crate::backend::{ContactForm, HttpBackend, submit_contact};
use crate::chat::{OpenRequest, OpenRequestSink};
use crate::core::AppConfig;

pub const SUBMITTED: &str = "¡Enviado con éxito! Te contactaremos muy pronto.";

/// Used when the visitor only wants to leave their details.
struct NoChat;

impl OpenRequestSink for NoChat {
    fn request_open(&self, request: OpenRequest) -> Result<()> {
        tracing::debug!("Chat disabled, dropping {:?}", request);
        Ok(())
    }
}

pub async fn run(config: &AppConfig, form: ContactForm, with_chat: bool) -> Result<()> {
    let backend = HttpBackend::new(&config.api_base_url);

    if !with_chat {
        submit_contact(&backend, &form, &NoChat).await?;
        println!("{}", SUBMITTED);
        return Ok(());
    }

    let (handle, client) = chat::start(config);
    match submit_contact(&backend, &form, &handle).await {
        Ok(_) => println!("{}", SUBMITTED),
        Err(err) => {
            if let Err(err) = handle.shutdown() {
                tracing::debug!("{}", err);
            }
            client.await?;
            return Err(err);
        }
    }

    chat::interact(handle, client).await
}
