use anyhow::Result;

use crate::backend::public::{Paquete, Producto, format_price};
use crate::backend::{Backend, HttpBackend};
use crate::core::AppConfig;

pub async fn run(config: &AppConfig) -> Result<()> {
    let backend = HttpBackend::new(&config.api_base_url);
    let productos = backend.list_products().await?;

    if productos.is_empty() {
        println!("No hay productos disponibles");
        return Ok(());
    }

    for producto in &productos {
        println!("{}", format_product(producto));
    }

    Ok(())
}

fn format_plan(paquete: &Paquete) -> String {
    let mut line = format!("  - {}: ${}/mes", paquete.nombre, format_price(paquete.precio_mensual));
    if let Some(anual) = paquete.precio_anual {
        line.push_str(&format!(" (${}/año)", format_price(anual)));
    }
    if paquete.destacado {
        line.push_str(" ★");
    }
    line
}

fn format_product(producto: &Producto) -> String {
    let mut out = format!(
        "{} desde ${}/mes\n  {}",
        producto.nombre,
        format_price(producto.precio_base),
        producto.descripcion_corta
    );
    for paquete in &producto.paquetes {
        out.push('\n');
        out.push_str(&format_plan(paquete));
    }
    out
}
