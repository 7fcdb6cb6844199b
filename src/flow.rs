//! Modelo de flujos de diálogo: pasos, definiciones y registro de triggers.
//!
//! Un flujo es una secuencia ordenada de pasos guardada tras un conjunto de
//! palabras clave. Cada paso o bien emite una respuesta, o emite una pregunta
//! y espera el siguiente mensaje del usuario (captura), o ejecuta una acción
//! sin texto propio. El avance paso a paso lo gobierna el dispatcher; aquí
//! sólo viven los datos y los manejadores.

use std::sync::Arc;

use crate::models::{Reply, SessionState};

/// Búfer ordenado de respuestas generadas durante la ejecución de pasos.
/// El dispatcher lo vacía hacia el sink conservando el orden de emisión.
#[derive(Debug, Default)]
pub struct Outbox {
    replies: Vec<Reply>,
}

impl Outbox {
    pub fn say(&mut self, text: impl Into<String>) {
        self.replies.push(Reply::text(text));
    }

    pub fn say_with_media(&mut self, text: impl Into<String>, media: impl Into<String>) {
        self.replies.push(Reply::with_media(text, media));
    }

    pub fn drain(&mut self) -> Vec<Reply> {
        std::mem::take(&mut self.replies)
    }

    pub fn is_empty(&self) -> bool {
        self.replies.is_empty()
    }
}

/// Manejador de captura: recibe el cuerpo crudo del mensaje del usuario,
/// el estado de la sesión y el búfer de salida.
pub type CaptureHandler =
    Arc<dyn Fn(&str, &mut SessionState, &mut Outbox) -> anyhow::Result<()> + Send + Sync>;

/// Acción sin texto propio: sólo estado de sesión y salida.
pub type ActionHandler =
    Arc<dyn Fn(&mut SessionState, &mut Outbox) -> anyhow::Result<()> + Send + Sync>;

/// Un paso del diálogo.
pub enum FlowStep {
    /// Emite una respuesta y continúa con el siguiente paso.
    Answer { text: String, media: Option<String> },
    /// Emite una pregunta y suspende el flujo hasta el próximo mensaje del
    /// usuario, que se entrega al manejador.
    Capture {
        prompt: String,
        media: Option<String>,
        handler: CaptureHandler,
    },
    /// Ejecuta una acción con efectos (escribir variables, responder).
    Action { handler: ActionHandler },
}

impl FlowStep {
    pub fn awaits_capture(&self) -> bool {
        matches!(self, FlowStep::Capture { .. })
    }
}

impl std::fmt::Debug for FlowStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlowStep::Answer { text, media } => f
                .debug_struct("Answer")
                .field("text", text)
                .field("media", media)
                .finish(),
            FlowStep::Capture { prompt, media, .. } => f
                .debug_struct("Capture")
                .field("prompt", prompt)
                .field("media", media)
                .finish_non_exhaustive(),
            FlowStep::Action { .. } => f.debug_struct("Action").finish_non_exhaustive(),
        }
    }
}

/// Secuencia de pasos tras un conjunto de triggers. Inmutable una vez
/// registrada en el `FlowRegistry`.
#[derive(Debug)]
pub struct FlowDefinition {
    pub id: String,
    pub triggers: Vec<String>,
    pub steps: Vec<FlowStep>,
}

impl FlowDefinition {
    pub fn new(id: impl Into<String>, triggers: &[&str]) -> Self {
        Self {
            id: id.into(),
            triggers: triggers.iter().map(|t| t.to_lowercase()).collect(),
            steps: Vec::new(),
        }
    }

    pub fn answer(mut self, text: impl Into<String>) -> Self {
        self.steps.push(FlowStep::Answer { text: text.into(), media: None });
        self
    }

    pub fn answer_with_media(mut self, text: impl Into<String>, media: impl Into<String>) -> Self {
        self.steps.push(FlowStep::Answer {
            text: text.into(),
            media: Some(media.into()),
        });
        self
    }

    pub fn capture<F>(mut self, prompt: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&str, &mut SessionState, &mut Outbox) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.steps.push(FlowStep::Capture {
            prompt: prompt.into(),
            media: None,
            handler: Arc::new(handler),
        });
        self
    }

    /// Captura que guarda el cuerpo del mensaje tal cual bajo `key`.
    pub fn capture_into(self, prompt: impl Into<String>, key: &str) -> Self {
        let key = key.to_string();
        self.capture(prompt, move |input, session, _out| {
            session.variables.insert(key.clone(), input.to_string());
            Ok(())
        })
    }

    pub fn action<F>(mut self, handler: F) -> Self
    where
        F: Fn(&mut SessionState, &mut Outbox) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.steps.push(FlowStep::Action { handler: Arc::new(handler) });
        self
    }
}

/// Registro inmutable de flujos. El orden de registro desempata: el primer
/// flujo cuyo trigger coincide con el mensaje gana.
#[derive(Debug, Default)]
pub struct FlowRegistry {
    flows: Vec<FlowDefinition>,
}

impl FlowRegistry {
    pub fn new(flows: Vec<FlowDefinition>) -> Self {
        Self { flows }
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    pub fn get(&self, flow_id: &str) -> Option<&FlowDefinition> {
        self.flows.iter().find(|f| f.id == flow_id)
    }

    /// Busca el flujo que arranca con este mensaje. Coincidencia exacta del
    /// mensaje completo normalizado contra cada trigger, o prefijo seguido de
    /// espacio (estricta a propósito: evita entrar a un flujo por accidente
    /// con texto libre que sólo contiene la palabra en medio).
    pub fn match_trigger(&self, message: &str) -> Option<&FlowDefinition> {
        let normalized = message.trim().to_lowercase();
        if normalized.is_empty() {
            return None;
        }
        self.flows.iter().find(|flow| {
            flow.triggers.iter().any(|kw| {
                normalized == *kw
                    || normalized
                        .strip_prefix(kw.as_str())
                        .is_some_and(|rest| rest.starts_with(char::is_whitespace))
            })
        })
    }
}
