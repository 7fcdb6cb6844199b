use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

use crate::{config::AppConfig, dispatcher::Dispatcher, flow::FlowRegistry, sink::ReplySink};

/// Estado compartido de la aplicación, clonable entre handlers de axum.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub dispatcher: Arc<Dispatcher>,
    pub registry: Arc<FlowRegistry>,
    pub sink: Arc<dyn ReplySink>,
    /// Entradas del índice del corpus (para el endpoint de estado).
    pub corpus_entries: usize,
    pub shutdown_sender: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}
