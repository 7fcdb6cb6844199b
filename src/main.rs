use std::sync::{Arc, Mutex};

use axum::Router;
use tokio::sync::oneshot;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

use clara_bot::{
    api, app_state::AppState, config::AppConfig, corpus, dispatcher::Dispatcher, flows,
    session::MemoryStore, sink::LoggingSink,
};

#[tokio::main]
async fn main() {
    // 1. Cargar .env e inicializar logging
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // 2. Cargar configuración
    let cfg = AppConfig::from_env().expect("Error al cargar la configuración");

    // 3. Cargar el documento de conocimiento y construir el índice.
    //    Un corpus ilegible es fatal: el bot no sirve tráfico sin él.
    let doc = Arc::new(
        corpus::load_document(&cfg.corpus_path).expect("Error cargando el corpus de conocimiento"),
    );
    let index = Arc::new(corpus::build_index(&doc));
    info!(
        "📚 Corpus cargado: {} entradas desde {}",
        index.len(),
        cfg.corpus_path.display()
    );

    // 4. Construir el catálogo de flujos y el dispatcher
    let registry = Arc::new(flows::build_registry(doc, index.clone(), &cfg.assets_dir));
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(LoggingSink);
    let dispatcher = Arc::new(Dispatcher::new(
        registry.clone(),
        index.clone(),
        store,
        sink.clone(),
    ));

    // Crear canal para la señal de apagado.
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    // 5. Crear estado compartido de la aplicación
    let app_state = AppState {
        config: cfg.clone(),
        dispatcher,
        registry,
        sink,
        corpus_entries: index.len(),
        shutdown_sender: Arc::new(Mutex::new(Some(shutdown_tx))),
    };

    // 6. Configurar el router de la API
    let app = Router::new()
        .merge(api::create_router(app_state))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    // 7. Iniciar el servidor
    let listener = tokio::net::TcpListener::bind(&cfg.server_addr)
        .await
        .unwrap();
    info!("🚀 Bot escuchando en http://{}", cfg.server_addr);

    // Configurar el apagado ordenado.
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            info!("Señal de apagado recibida, iniciando cierre del servidor.");
        })
        .await
        .unwrap();

    info!("✅ Servidor cerrado correctamente.");
}
