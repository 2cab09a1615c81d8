//! Public types for the landing page REST API
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct LeadRequest {
    pub nombre_completo: String,
    pub email: String,
    pub telefono: Option<String>,
    pub empresa: Option<String>,
    pub origen: String,
    pub utm_source: String,
    pub utm_campaign: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct LeadCreated {
    pub id: String,
    #[serde(default)]
    pub estado: Option<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Paquete {
    #[serde(default)]
    pub id: Option<String>,
    pub nombre: String,
    #[serde(default)]
    pub slug: Option<String>,
    pub precio_mensual: f64,
    #[serde(default)]
    pub precio_anual: Option<f64>,
    #[serde(default)]
    pub ideal_para: Vec<String>,
    #[serde(default)]
    pub limites: Option<Value>,
    #[serde(default)]
    pub destacado: bool,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Producto {
    #[serde(default)]
    pub id: Option<String>,
    pub nombre: String,
    #[serde(default)]
    pub slug: Option<String>,
    pub descripcion_corta: String,
    pub precio_base: f64,
    #[serde(default)]
    pub sectores: Vec<String>,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub paquetes: Vec<Paquete>,
}

#[derive(Deserialize, Debug)]
pub struct ProductosResponse {
    #[serde(default)]
    pub total: Option<usize>,
    #[serde(default)]
    pub productos: Vec<Producto>,
}

/// FastAPI style error body. `detail` is a string for handled errors and
/// a list for validation errors.
#[derive(Deserialize, Debug)]
pub struct ErrorResponse {
    #[serde(default)]
    pub detail: Option<Value>,
}

impl ErrorResponse {
    pub fn message(&self) -> Option<&str> {
        self.detail
            .as_ref()
            .and_then(Value::as_str)
            .filter(|d| !d.is_empty())
    }
}

/// Format a price with two decimals and `,` thousands grouping, e.g.
/// `1,234.50`.
pub fn format_price(price: f64) -> String {
    let cents = (price * 100.0).round() as i64;
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.unsigned_abs();

    let units = (cents / 100).to_string();
    let mut grouped = String::with_capacity(units.len() + units.len() / 3);
    for (i, c) in units.chars().enumerate() {
        if i > 0 && (units.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    format!("{}{}.{:02}", sign, grouped, cents % 100)
}
