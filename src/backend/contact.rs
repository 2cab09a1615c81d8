//! The contact form: validate, submit as a lead, then hand the
//! conversation over to the chat widget.
use std::sync::LazyLock;

use anyhow::{Result, bail};
use regex::Regex;

use super::client::Backend;
use super::public::LeadRequest;
use crate::chat::{OpenRequest, OpenRequestSink};

pub const MISSING_FIELDS: &str = "Completa los campos obligatorios";
pub const INVALID_EMAIL: &str = "Email inválido";

const DEFAULT_UTM_SOURCE: &str = "directo";
const UTM_CAMPAIGN: &str = "contacto";
const ORIGIN: &str = "api";

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("Invalid email regex"));

#[derive(Debug, Clone, Default)]
pub struct ContactForm {
    pub nombre_completo: String,
    pub email: String,
    pub telefono: Option<String>,
    pub mensaje: String,
    pub utm_source: Option<String>,
}

impl ContactForm {
    /// Check the form and build the lead payload from the trimmed values.
    pub fn to_lead(&self) -> Result<LeadRequest> {
        let nombre = self.nombre_completo.trim();
        let email = self.email.trim();
        let mensaje = self.mensaje.trim();

        if nombre.is_empty() || email.is_empty() || mensaje.is_empty() {
            bail!(MISSING_FIELDS);
        }
        if !EMAIL_RE.is_match(email) {
            bail!(INVALID_EMAIL);
        }

        let telefono = self
            .telefono
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        let utm_source = self
            .utm_source
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_UTM_SOURCE);

        Ok(LeadRequest {
            nombre_completo: nombre.to_string(),
            email: email.to_string(),
            telefono,
            empresa: None,
            origen: ORIGIN.to_string(),
            utm_source: utm_source.to_string(),
            utm_campaign: UTM_CAMPAIGN.to_string(),
        })
    }
}

/// Submit the form and ask the chat to open with the visitor's message.
/// Returns the new lead id.
pub async fn submit_contact(
    backend: &dyn Backend,
    form: &ContactForm,
    chat: &dyn OpenRequestSink,
) -> Result<String> {
    let lead = form.to_lead()?;
    let created = backend.create_lead(&lead).await?;

    let request = OpenRequest::lead(&created.id, &lead.nombre_completo, form.mensaje.trim());
    if let Err(err) = chat.request_open(request) {
        // The lead is saved either way, the chat handoff is best effort
        tracing::warn!("Could not hand lead {} over to the chat: {}", created.id, err);
    }

    Ok(created.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::public::{LeadCreated, Producto};
    use anyhow::Error;
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn form() -> ContactForm {
        ContactForm {
            nombre_completo: String::from(" Ana Díaz "),
            email: String::from("ana@empresa.com"),
            telefono: Some(String::from("  ")),
            mensaje: String::from("Quiero una demo "),
            utm_source: None,
        }
    }

    #[derive(Default)]
    struct FakeBackend {
        leads: Mutex<Vec<LeadRequest>>,
    }

    #[async_trait]
    impl Backend for FakeBackend {
        async fn create_lead(&self, lead: &LeadRequest) -> Result<LeadCreated, Error> {
            self.leads.lock().unwrap().push(lead.clone());
            Ok(LeadCreated {
                id: String::from("lead-1"),
                estado: None,
            })
        }

        async fn list_products(&self) -> Result<Vec<Producto>, Error> {
            Ok(vec![])
        }
    }

    #[derive(Default)]
    struct RecordingSink(Mutex<Vec<OpenRequest>>);

    impl OpenRequestSink for RecordingSink {
        fn request_open(&self, request: OpenRequest) -> Result<()> {
            self.0.lock().unwrap().push(request);
            Ok(())
        }
    }

    #[test]
    fn it_builds_the_lead_payload() {
        let lead = form().to_lead().unwrap();
        assert_eq!(lead.nombre_completo, "Ana Díaz");
        assert_eq!(lead.telefono, None);
        assert_eq!(lead.empresa, None);
        assert_eq!(lead.origen, "api");
        assert_eq!(lead.utm_source, "directo");
        assert_eq!(lead.utm_campaign, "contacto");

        let with_source = ContactForm {
            telefono: Some(String::from("+51 999 888 777")),
            utm_source: Some(String::from("google")),
            ..form()
        };
        let lead = with_source.to_lead().unwrap();
        assert_eq!(lead.telefono.as_deref(), Some("+51 999 888 777"));
        assert_eq!(lead.utm_source, "google");
    }

    #[test]
    fn it_requires_name_email_and_message() {
        let missing = ContactForm {
            mensaje: String::from("   "),
            ..form()
        };
        assert_eq!(missing.to_lead().unwrap_err().to_string(), MISSING_FIELDS);
    }

    #[test]
    fn it_validates_the_email() {
        for email in ["ana", "ana@empresa", "ana @empresa.com", "@empresa.com"] {
            let invalid = ContactForm {
                email: email.to_string(),
                ..form()
            };
            assert_eq!(invalid.to_lead().unwrap_err().to_string(), INVALID_EMAIL);
        }
    }

    #[tokio::test]
    async fn it_submits_and_opens_the_chat() {
        let backend = FakeBackend::default();
        let sink = RecordingSink::default();

        let id = submit_contact(&backend, &form(), &sink).await.unwrap();

        assert_eq!(id, "lead-1");
        assert_eq!(backend.leads.lock().unwrap().len(), 1);
        assert_eq!(
            sink.0.lock().unwrap().as_slice(),
            &[OpenRequest::lead("lead-1", "Ana Díaz", "Quiero una demo")]
        );
    }

    #[tokio::test]
    async fn it_does_not_submit_invalid_forms() {
        let backend = FakeBackend::default();
        let sink = RecordingSink::default();
        let invalid = ContactForm {
            email: String::from("nope"),
            ..form()
        };

        assert!(submit_contact(&backend, &invalid, &sink).await.is_err());
        assert!(backend.leads.lock().unwrap().is_empty());
        assert!(sink.0.lock().unwrap().is_empty());
    }
}
