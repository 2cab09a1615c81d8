//! Requests from other parts of the page to open the chat with a
//! message already composed, e.g. after picking a plan in the product
//! catalog or submitting the contact form.
use anyhow::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenRequest {
    /// `openChatWithProduct`
    Product {
        producto: String,
        paquete: Option<String>,
    },
    /// `openChatWithLead`
    Lead {
        lead_id: String,
        nombre: String,
        mensaje: String,
    },
}

impl OpenRequest {
    pub fn product(producto: &str, paquete: Option<&str>) -> Self {
        OpenRequest::Product {
            producto: producto.to_string(),
            paquete: paquete.map(|p| p.to_string()),
        }
    }

    pub fn lead(lead_id: &str, nombre: &str, mensaje: &str) -> Self {
        OpenRequest::Lead {
            lead_id: lead_id.to_string(),
            nombre: nombre.to_string(),
            mensaje: mensaje.to_string(),
        }
    }

    /// The human readable message sent on the user's behalf. Identifiers
    /// are only used to build this string.
    pub fn compose(&self) -> String {
        match self {
            OpenRequest::Product {
                producto,
                paquete: Some(paquete),
            } => format!("Estoy interesado en {} - Plan {}", producto, paquete),
            OpenRequest::Product {
                producto,
                paquete: None,
            } => format!("Estoy interesado en {}", producto),
            OpenRequest::Lead {
                nombre, mensaje, ..
            } => format!("Hola, soy {}. {}", nombre, mensaje),
        }
    }
}

/// Anything that can take an open-and-prefill request on behalf of the
/// chat widget. Delivery is best effort.
pub trait OpenRequestSink {
    fn request_open(&self, request: OpenRequest) -> Result<()>;
}
