//! Dispatcher de mensajes: la máquina de estados de la conversación.
//!
//! Cada mensaje entrante sigue una de tres rutas:
//!   1. Coincide con un trigger registrado → arranca ese flujo en el paso 0.
//!      Un trigger siempre gana, incluso con una captura pendiente: el flujo
//!      anterior se descarta.
//!   2. La sesión tiene un flujo suspendido esperando captura → el cuerpo del
//!      mensaje se entrega al manejador de ese paso y el flujo continúa.
//!   3. Nada de lo anterior → el texto se trata como pregunta libre contra el
//!      índice del corpus.
//!
//! La suspensión en una captura no bloquea ningún hilo: es una transición
//! durable que se escribe en el almacén antes de emitir la pregunta, de modo
//! que un reinicio del proceso entre pregunta y respuesta no pierde la
//! posición de la conversación.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::corpus::CorpusEntry;
use crate::error::BotError;
use crate::flow::{FlowDefinition, FlowRegistry, FlowStep, Outbox};
use crate::models::{ActiveFlow, InboundMessage, SessionState};
use crate::search;
use crate::session::SessionStore;
use crate::sink::ReplySink;

/// Respuesta genérica cuando la búsqueda libre no encuentra nada.
pub const NO_MATCH_REPLY: &str =
    "❌ No encontré nada relacionado. Intenta con otras palabras más simples.";

/// Respuesta genérica cuando un paso del flujo falla.
pub const APOLOGY_REPLY: &str = "😔 Lo siento, algo salió mal. Intenta de nuevo en un momento.";

pub struct Dispatcher {
    registry: Arc<FlowRegistry>,
    index: Arc<Vec<CorpusEntry>>,
    store: Arc<dyn SessionStore>,
    sink: Arc<dyn ReplySink>,
    /// Un candado por sesión: como máximo un mensaje en proceso por usuario.
    /// Sesiones distintas avanzan en paralelo sin estado mutable compartido.
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<FlowRegistry>,
        index: Arc<Vec<CorpusEntry>>,
        store: Arc<dyn SessionStore>,
        sink: Arc<dyn ReplySink>,
    ) -> Self {
        Self {
            registry,
            index,
            store,
            sink,
            locks: DashMap::new(),
        }
    }

    /// Procesa un mensaje entrante de principio a fin. Los fallos de los
    /// manejadores de paso se recuperan aquí mismo; sólo los fallos del
    /// almacén se propagan, para que el transporte pueda reintentar.
    pub async fn handle_inbound(&self, msg: &InboundMessage) -> Result<(), BotError> {
        let lock = self
            .locks
            .entry(msg.from.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let mut session = self
            .store
            .get(&msg.from)
            .await?
            .unwrap_or_else(|| SessionState::new(&msg.from));

        let body = msg.body.trim();

        // Un trigger nuevo siempre gana sobre una captura en curso.
        if let Some(flow) = self.registry.match_trigger(body) {
            if let Some(active) = &session.active_flow {
                info!(
                    usuario = %session.session_id,
                    abandonado = %active.flow_id,
                    nuevo = %flow.id,
                    "🔁 [FLOW] Trigger nuevo descarta el flujo en curso"
                );
            }
            session.active_flow = None;
            return self.run_flow(flow, 0, None, &mut session).await;
        }

        if let Some(active) = session.active_flow.clone() {
            match self.registry.get(&active.flow_id) {
                Some(flow)
                    if active.step_index < flow.steps.len()
                        && flow.steps[active.step_index].awaits_capture() =>
                {
                    return self
                        .run_flow(flow, active.step_index, Some(body), &mut session)
                        .await;
                }
                _ => {
                    // Estado suspendido que ya no casa con el registro
                    // (p. ej. catálogo de flujos cambiado entre reinicios).
                    warn!(
                        usuario = %session.session_id,
                        flujo = %active.flow_id,
                        paso = active.step_index,
                        "⚠️ [FLOW] Flujo suspendido irreconocible; la sesión vuelve a reposo"
                    );
                    session.active_flow = None;
                }
            }
        }

        self.answer_free_text(body, &mut session).await
    }

    /// Ejecuta pasos desde `start`. Si `capture_input` viene, el paso
    /// `start` es la captura suspendida y consume ese mensaje; la ejecución
    /// continúa en el paso siguiente. Se detiene al suspender en la próxima
    /// captura o al agotar los pasos.
    async fn run_flow(
        &self,
        flow: &FlowDefinition,
        start: usize,
        capture_input: Option<&str>,
        session: &mut SessionState,
    ) -> Result<(), BotError> {
        let mut out = Outbox::default();
        let mut i = start;

        if let Some(input) = capture_input {
            // La suspensión sólo se persiste sobre pasos de captura; si el
            // estado guardado no casa, se resetea en vez de caerse.
            let FlowStep::Capture { handler, .. } = &flow.steps[i] else {
                warn!(
                    usuario = %session.session_id,
                    flujo = %flow.id,
                    paso = i,
                    "⚠️ [FLOW] Suspensión sobre un paso que no captura; la sesión vuelve a reposo"
                );
                session.active_flow = None;
                return self.persist(session).await;
            };
            if let Err(source) = handler(input, session, &mut out) {
                return self.abort_flow(flow, i, source, session).await;
            }
            info!(
                usuario = %session.session_id,
                flujo = %flow.id,
                paso = i,
                "🟢 [CAPTURA] Respuesta del usuario procesada"
            );
            i += 1;
        }

        while i < flow.steps.len() {
            match &flow.steps[i] {
                FlowStep::Answer { text, media } => match media {
                    Some(media) => out.say_with_media(text.clone(), media.clone()),
                    None => out.say(text.clone()),
                },
                FlowStep::Capture { prompt, media, .. } => {
                    match media {
                        Some(media) => out.say_with_media(prompt.clone(), media.clone()),
                        None => out.say(prompt.clone()),
                    }
                    session.active_flow = Some(ActiveFlow {
                        flow_id: flow.id.clone(),
                        step_index: i,
                    });
                    self.persist(session).await?;
                    self.flush(&session.session_id, &mut out).await;
                    return Ok(());
                }
                FlowStep::Action { handler } => {
                    if let Err(source) = handler(session, &mut out) {
                        return self.abort_flow(flow, i, source, session).await;
                    }
                }
            }
            i += 1;
        }

        session.active_flow = None;
        self.persist(session).await?;
        self.flush(&session.session_id, &mut out).await;
        info!(usuario = %session.session_id, flujo = %flow.id, "✅ [FLOW] Flujo completado");
        Ok(())
    }

    /// Un paso falló: se registra, la sesión vuelve a reposo y el usuario
    /// recibe una disculpa genérica. El fallo nunca toca otras sesiones ni
    /// tumba el dispatcher.
    async fn abort_flow(
        &self,
        flow: &FlowDefinition,
        step: usize,
        source: anyhow::Error,
        session: &mut SessionState,
    ) -> Result<(), BotError> {
        let err = BotError::CaptureHandler {
            flow: flow.id.clone(),
            step,
            source,
        };
        error!(usuario = %session.session_id, error = %err, "💥 [FLOW] Paso fallido; se aborta el flujo");

        session.active_flow = None;
        self.persist(session).await?;

        let mut out = Outbox::default();
        out.say(APOLOGY_REPLY);
        self.flush(&session.session_id, &mut out).await;
        Ok(())
    }

    /// Ruta de texto libre: búsqueda sobre el índice del corpus.
    async fn answer_free_text(
        &self,
        query: &str,
        session: &mut SessionState,
    ) -> Result<(), BotError> {
        let query_id = Uuid::new_v4();
        info!(
            %query_id,
            usuario = %session.session_id,
            consulta = %query,
            "🟢 [SEARCH] Pregunta libre"
        );

        let results = search::search(&self.index, query);
        let mut out = Outbox::default();

        if results.is_empty() {
            info!(%query_id, "❌ [SEARCH] Sin resultados");
            out.say(NO_MATCH_REPLY);
        } else {
            info!(%query_id, encontrados = results.len(), "✅ [SEARCH] Resultados");
            for r in results {
                out.say(format!("📌 *{}*\n{}", r.category, r.text));
            }
        }

        self.persist(session).await?;
        self.flush(&session.session_id, &mut out).await;
        Ok(())
    }

    async fn persist(&self, session: &mut SessionState) -> Result<(), BotError> {
        session.updated_at = chrono::Utc::now();
        self.store.put(session).await?;
        Ok(())
    }

    /// Entrega las respuestas acumuladas en orden. Un fallo de entrega se
    /// registra y no revierte la transición ya persistida: la política de
    /// reintentos es del proveedor de mensajería.
    async fn flush(&self, to: &str, out: &mut Outbox) {
        for reply in out.drain() {
            if let Err(e) = self.sink.deliver(to, &reply).await {
                error!(destino = %to, error = %e, "📪 [SINK] No se pudo entregar la respuesta");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Reply;
    use crate::session::{MemoryStore, StoreError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Sink que acumula las entregas para inspección.
    #[derive(Default)]
    struct RecordingSink {
        sent: std::sync::Mutex<Vec<(String, Reply)>>,
    }

    impl RecordingSink {
        fn texts_for(&self, to: &str) -> Vec<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .filter(|(t, _)| t == to)
                .map(|(_, r)| r.text.clone())
                .collect()
        }
    }

    #[async_trait]
    impl ReplySink for RecordingSink {
        async fn deliver(&self, to: &str, reply: &Reply) -> anyhow::Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push((to.to_string(), reply.clone()));
            Ok(())
        }
    }

    /// Almacén que siempre falla, para probar la propagación hacia arriba.
    struct BrokenStore;

    #[async_trait]
    impl SessionStore for BrokenStore {
        async fn get(&self, _: &str) -> Result<Option<SessionState>, StoreError> {
            Err(StoreError::Unavailable("conexión rechazada".into()))
        }
        async fn put(&self, _: &SessionState) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("conexión rechazada".into()))
        }
    }

    /// Almacén con latencia artificial para forzar solapamiento de mensajes
    /// concurrentes de la misma sesión.
    struct SlowStore {
        inner: MemoryStore,
    }

    #[async_trait]
    impl SessionStore for SlowStore {
        async fn get(&self, id: &str) -> Result<Option<SessionState>, StoreError> {
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.inner.get(id).await
        }
        async fn put(&self, s: &SessionState) -> Result<(), StoreError> {
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.inner.put(s).await
        }
    }

    fn sample_index() -> Vec<CorpusEntry> {
        vec![CorpusEntry {
            category: "Definición: Innovación social".into(),
            text: "Innovación social: X".into(),
        }]
    }

    fn sample_registry(action_runs: Arc<AtomicUsize>) -> FlowRegistry {
        let registro = FlowDefinition::new("registro", &["registro", "registrar"])
            .capture_into("¿Cuál es tu *nombre*?", "nombre")
            .capture_into("¿De qué *programa académico* eres?", "programa")
            .action(move |session, out| {
                action_runs.fetch_add(1, Ordering::SeqCst);
                out.say(format!(
                    "✅ Registro completado.\n👤 Nombre: {}\n🏫 Programa: {}",
                    session.variables.get("nombre").map(String::as_str).unwrap_or("—"),
                    session.variables.get("programa").map(String::as_str).unwrap_or("—"),
                ));
                Ok(())
            });

        let welcome = FlowDefinition::new("welcome", &["hola"]).answer("🦉 Hola, soy Clara.");

        let roto = FlowDefinition::new("roto", &["romper"])
            .capture("dime algo:", |_, _, _| anyhow::bail!("handler averiado"));

        FlowRegistry::new(vec![registro, welcome, roto])
    }

    fn dispatcher_with(
        store: Arc<dyn SessionStore>,
        action_runs: Arc<AtomicUsize>,
    ) -> (Dispatcher, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let dispatcher = Dispatcher::new(
            Arc::new(sample_registry(action_runs)),
            Arc::new(sample_index()),
            store,
            sink.clone(),
        );
        (dispatcher, sink)
    }

    fn msg(from: &str, body: &str) -> InboundMessage {
        InboundMessage {
            from: from.to_string(),
            body: body.to_string(),
            attachments: None,
        }
    }

    #[tokio::test]
    async fn multi_capture_flow_runs_to_completion() {
        let store = Arc::new(MemoryStore::new());
        let runs = Arc::new(AtomicUsize::new(0));
        let (dispatcher, sink) = dispatcher_with(store.clone(), runs.clone());

        dispatcher.handle_inbound(&msg("u1", "registro")).await.unwrap();
        dispatcher.handle_inbound(&msg("u1", "Ana")).await.unwrap();
        dispatcher.handle_inbound(&msg("u1", "Ingeniería")).await.unwrap();

        let session = store.get("u1").await.unwrap().unwrap();
        assert!(session.is_idle());
        assert_eq!(session.variables.len(), 2);
        assert_eq!(session.variables.get("nombre").unwrap(), "Ana");
        assert_eq!(session.variables.get("programa").unwrap(), "Ingeniería");
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        let texts = sink.texts_for("u1");
        assert_eq!(texts.len(), 3);
        assert!(texts[2].contains("👤 Nombre: Ana"));
        assert!(texts[2].contains("🏫 Programa: Ingeniería"));
    }

    #[tokio::test]
    async fn fresh_trigger_discards_pending_capture() {
        let store = Arc::new(MemoryStore::new());
        let runs = Arc::new(AtomicUsize::new(0));
        let (dispatcher, sink) = dispatcher_with(store.clone(), runs.clone());

        dispatcher.handle_inbound(&msg("u1", "registro")).await.unwrap();
        dispatcher.handle_inbound(&msg("u1", "hola")).await.unwrap();

        let session = store.get("u1").await.unwrap().unwrap();
        assert!(session.is_idle());
        // La captura del nombre nunca llegó a ejecutarse.
        assert!(session.variables.is_empty());
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        let texts = sink.texts_for("u1");
        assert_eq!(texts.last().unwrap(), "🦉 Hola, soy Clara.");
    }

    #[tokio::test]
    async fn failed_handler_apologizes_and_resets_only_that_session() {
        let store = Arc::new(MemoryStore::new());
        let runs = Arc::new(AtomicUsize::new(0));
        let (dispatcher, sink) = dispatcher_with(store.clone(), runs.clone());

        // u2 queda a mitad de registro; u1 rompe su propio flujo.
        dispatcher.handle_inbound(&msg("u2", "registro")).await.unwrap();
        dispatcher.handle_inbound(&msg("u1", "romper")).await.unwrap();
        dispatcher.handle_inbound(&msg("u1", "lo que sea")).await.unwrap();

        let u1 = store.get("u1").await.unwrap().unwrap();
        assert!(u1.is_idle());
        assert_eq!(sink.texts_for("u1").last().unwrap(), APOLOGY_REPLY);

        // La sesión de u2 sigue suspendida donde estaba.
        let u2 = store.get("u2").await.unwrap().unwrap();
        assert_eq!(
            u2.active_flow,
            Some(ActiveFlow { flow_id: "registro".into(), step_index: 0 })
        );
    }

    #[tokio::test]
    async fn free_text_falls_back_to_corpus_search() {
        let store = Arc::new(MemoryStore::new());
        let runs = Arc::new(AtomicUsize::new(0));
        let (dispatcher, sink) = dispatcher_with(store.clone(), runs.clone());

        dispatcher
            .handle_inbound(&msg("u1", "qué es innovación social"))
            .await
            .unwrap();
        let texts = sink.texts_for("u1");
        assert_eq!(texts.len(), 1);
        assert!(texts[0].contains("Innovación social: X"));

        dispatcher.handle_inbound(&msg("u1", "zzz inexistente")).await.unwrap();
        assert_eq!(sink.texts_for("u1").last().unwrap(), NO_MATCH_REPLY);
    }

    #[tokio::test]
    async fn store_failure_propagates_instead_of_dropping_the_message() {
        let runs = Arc::new(AtomicUsize::new(0));
        let (dispatcher, _sink) = dispatcher_with(Arc::new(BrokenStore), runs);

        let err = dispatcher.handle_inbound(&msg("u1", "hola")).await.unwrap_err();
        assert!(matches!(err, BotError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn concurrent_messages_for_one_session_are_serialized() {
        let store = Arc::new(SlowStore { inner: MemoryStore::new() });
        let runs = Arc::new(AtomicUsize::new(0));
        let (dispatcher, _sink) = dispatcher_with(store.clone(), runs.clone());

        dispatcher.handle_inbound(&msg("u1", "registro")).await.unwrap();

        // Dos respuestas llegan a la vez: el candado por sesión obliga a
        // procesarlas en orden, cada una consume exactamente una captura.
        let m1 = msg("u1", "Ana");
        let m2 = msg("u1", "Ana");
        let (a, b) = tokio::join!(
            dispatcher.handle_inbound(&m1),
            dispatcher.handle_inbound(&m2),
        );
        a.unwrap();
        b.unwrap();

        let session = store.get("u1").await.unwrap().unwrap();
        assert!(session.is_idle());
        assert_eq!(session.variables.get("nombre").unwrap(), "Ana");
        assert_eq!(session.variables.get("programa").unwrap(), "Ana");
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}
