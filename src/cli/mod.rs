use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod chat;
pub mod contact;
pub mod products;

use crate::backend::ContactForm;
use crate::chat::OpenRequest;
use crate::core::AppConfig;

#[derive(Subcommand)]
enum Command {
    /// Chat with the sales assistant
    Chat {
        /// Open the chat asking about this product
        #[arg(long)]
        product: Option<String>,

        /// Plan of the product to ask about
        #[arg(long, requires = "product")]
        plan: Option<String>,
    },
    /// List the active products and their plans
    Products {},
    /// Submit the contact form and continue in the chat
    Contact {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        message: String,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        utm_source: Option<String>,
        /// Only submit the form
        #[arg(long, action, default_value = "false")]
        no_chat: bool,
    },
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

fn init_tracing() {
    // Logs go to stderr so they don't interleave with the conversation
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=warn", env!("CARGO_CRATE_NAME")).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

pub async fn run() -> Result<()> {
    let args = Cli::parse();
    init_tracing();

    let config = AppConfig::default();

    // Handle each sub command
    match args.command {
        Some(Command::Chat { product, plan }) => {
            let request = product.map(|p| OpenRequest::product(&p, plan.as_deref()));
            chat::run(&config, request).await?;
        }
        Some(Command::Products {}) => {
            products::run(&config).await?;
        }
        Some(Command::Contact {
            name,
            email,
            message,
            phone,
            utm_source,
            no_chat,
        }) => {
            let form = ContactForm {
                nombre_completo: name,
                email,
                telefono: phone,
                mensaje: message,
                utm_source: utm_source.or_else(|| config.utm_source.clone()),
            };
            contact::run(&config, form, !no_chat).await?;
        }
        None => {}
    }

    Ok(())
}
