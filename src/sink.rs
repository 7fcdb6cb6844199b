//! Sink de respuestas salientes: el contrato hacia el proveedor de
//! mensajería. Las llamadas por mensaje entrante se entregan en orden.

use async_trait::async_trait;

use crate::models::Reply;

#[async_trait]
pub trait ReplySink: Send + Sync {
    /// Entrega una respuesta al destinatario. El sink real (el proveedor de
    /// mensajería) aporta su propia política de reintentos y timeouts.
    async fn deliver(&self, to: &str, reply: &Reply) -> anyhow::Result<()>;
}

/// Sink de desarrollo: escribe cada salida en el log en lugar de enviarla.
#[derive(Debug, Default)]
pub struct LoggingSink;

#[async_trait]
impl ReplySink for LoggingSink {
    async fn deliver(&self, to: &str, reply: &Reply) -> anyhow::Result<()> {
        match &reply.media {
            Some(media) => tracing::info!("📤 [{to}] {} (media: {media})", reply.text),
            None => tracing::info!("📤 [{to}] {}", reply.text),
        }
        Ok(())
    }
}
