//! Superficie HTTP del bot: webhook de mensajes entrantes, API
//! administrativa de envío y endpoints de estado/apagado.

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};
use url::Url;

use crate::{app_state::AppState, error::BotError, models::{InboundMessage, Reply}};

// --- Payloads de la API ---

/// Inyección de un mensaje saliente arbitrario (llamador administrativo).
#[derive(Deserialize)]
pub struct SendMessagePayload {
    number: String,
    message: String,
    #[serde(rename = "urlMedia")]
    url_media: Option<String>,
}

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/v1/inbound", post(inbound_handler))
        .route("/v1/messages", post(send_message_handler))
        .route("/api/status", get(status_handler))
        .route("/api/shutdown", post(shutdown_handler))
        .with_state(app_state)
}

// --- Handlers ---

/// Webhook del proveedor de mensajería: un mensaje entrante por petición.
/// Si el almacén de sesiones no responde se contesta 503 para que el
/// transporte reintente; el mensaje nunca se descarta en silencio.
#[axum::debug_handler]
async fn inbound_handler(
    State(state): State<AppState>,
    Json(msg): Json<InboundMessage>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    match state.dispatcher.handle_inbound(&msg).await {
        Ok(()) => Ok((StatusCode::OK, Json(json!({ "status": "ok" })))),
        Err(err @ BotError::StoreUnavailable(_)) => {
            error!("Error de almacén procesando mensaje entrante: {err}");
            Err((
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": err.to_string() })),
            ))
        }
        Err(err) => {
            error!("Error inesperado procesando mensaje entrante: {err}");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": err.to_string() })),
            ))
        }
    }
}

/// Envío administrativo hacia un destinatario arbitrario (no originado en
/// una sesión): valida el adjunto y lo reenvía al sink de salida.
#[axum::debug_handler]
async fn send_message_handler(
    State(state): State<AppState>,
    Json(payload): Json<SendMessagePayload>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    info!("📩 [API MESSAGE] → {}: \"{}\"", payload.number, payload.message);

    if let Some(media) = &payload.url_media {
        if Url::parse(media).is_err() {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "urlMedia no es una URL válida." })),
            ));
        }
    }

    let reply = match payload.url_media {
        Some(media) => Reply::with_media(payload.message, media),
        None => Reply::text(payload.message),
    };

    match state.sink.deliver(&payload.number, &reply).await {
        Ok(()) => Ok((StatusCode::OK, Json(json!({ "status": "sended" })))),
        Err(e) => {
            error!("Error entregando mensaje administrativo: {e}");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": format!("No se pudo entregar el mensaje: {e}") })),
            ))
        }
    }
}

#[axum::debug_handler]
async fn status_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "flujos": state.registry.len(),
        "entradas_corpus": state.corpus_entries,
    }))
}

#[axum::debug_handler]
async fn shutdown_handler(State(state): State<AppState>) -> impl IntoResponse {
    info!("Petición de apagado recibida.");
    if let Some(sender) = state.shutdown_sender.lock().unwrap().take() {
        let _ = sender.send(());
    }
    StatusCode::OK
}
