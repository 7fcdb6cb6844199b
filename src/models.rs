//! Modelos de dominio (mensajes entrantes/salientes y estado de sesión).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Evento de mensaje entrante tal como lo entrega el proveedor de mensajería.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    /// Identidad del remitente; también es la clave de sesión.
    pub from: String,
    pub body: String,
    /// Adjuntos que acompañan al mensaje. El motor no los consume hoy;
    /// viajan por si algún flujo futuro los necesita.
    #[serde(default)]
    pub attachments: Option<Vec<String>>,
}

/// Respuesta saliente: texto más un adjunto opcional (ruta local o URL).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reply {
    pub text: String,
    pub media: Option<String>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: text.into(), media: None }
    }

    pub fn with_media(text: impl Into<String>, media: impl Into<String>) -> Self {
        Self { text: text.into(), media: Some(media.into()) }
    }
}

/// Posición dentro de un flujo en curso: qué flujo y en qué paso espera
/// la siguiente respuesta del usuario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveFlow {
    pub flow_id: String,
    pub step_index: usize,
}

/// Estado de conversación de un usuario. Una instancia por remitente,
/// creada con su primer mensaje y mutada sólo por el dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    /// Como máximo un flujo activo por sesión: o está en reposo (acepta
    /// triggers y texto libre) o está dentro de un flujo en un paso conocido.
    pub active_flow: Option<ActiveFlow>,
    /// Variables capturadas por los pasos del flujo (p. ej. nombre, programa).
    pub variables: HashMap<String, String>,
    pub updated_at: DateTime<Utc>,
}

impl SessionState {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            active_flow: None,
            variables: HashMap::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.active_flow.is_none()
    }
}
