use anyhow::{Context, Error, Result, bail};
use async_trait::async_trait;
use reqwest;

use super::public::{ErrorResponse, LeadCreated, LeadRequest, Producto, ProductosResponse};

pub const LEAD_FALLBACK_ERROR: &str = "Error al enviar";
pub const PRODUCTS_ERROR: &str = "Error al cargar productos";

/// The REST endpoints the landing page consumes.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn create_lead(&self, lead: &LeadRequest) -> Result<LeadCreated, Error>;
    async fn list_products(&self) -> Result<Vec<Producto>, Error>;
}

pub struct HttpBackend {
    api_base_url: String,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(api_base_url: &str) -> Self {
        Self {
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn create_lead(&self, lead: &LeadRequest) -> Result<LeadCreated, Error> {
        let url = format!("{}/api/v1/leads/", self.api_base_url);
        let resp = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(lead)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            let detail = serde_json::from_str::<ErrorResponse>(&body)
                .ok()
                .and_then(|err| err.message().map(str::to_string));
            tracing::warn!("Lead submission failed with {}: {}", status, body);
            bail!("{}", detail.unwrap_or_else(|| LEAD_FALLBACK_ERROR.to_string()));
        }

        let created: LeadCreated =
            serde_json::from_str(&body).with_context(|| "Attempted to parse lead from json")?;
        tracing::info!("Created lead {}", created.id);
        Ok(created)
    }

    async fn list_products(&self) -> Result<Vec<Producto>, Error> {
        let mut url = reqwest::Url::parse(&format!("{}/api/v1/productos/", self.api_base_url))
            .with_context(|| format!("Invalid API base URL {}", self.api_base_url))?;
        url.query_pairs_mut().append_pair("activo", "true");

        let resp = self
            .client
            .get(url.as_str())
            .header("Content-Type", "application/json")
            .send()
            .await?;

        if !resp.status().is_success() {
            tracing::warn!("Product listing failed with {}", resp.status());
            bail!(PRODUCTS_ERROR);
        }

        let body: ProductosResponse = resp.json().await?;
        Ok(body.productos)
    }
}
