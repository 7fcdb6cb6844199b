//! Taxonomía de errores del asistente.
//!
//! Sólo `MalformedCorpus` puede tumbar el proceso, y únicamente durante el
//! arranque: el bot nunca debe servir tráfico con un corpus ilegible.

use thiserror::Error;

use crate::session::StoreError;

#[derive(Debug, Error)]
pub enum BotError {
    /// El documento de conocimiento no se pudo leer o le faltan campos
    /// obligatorios. Fatal en el arranque, nunca por consulta.
    #[error("Corpus malformado: {0}")]
    MalformedCorpus(String),

    /// El almacén de sesiones no respondió. Se propaga al transporte para
    /// que reintente; el mensaje entrante nunca se descarta en silencio.
    #[error("Almacén de sesiones no disponible")]
    StoreUnavailable(#[from] StoreError),

    /// Un manejador de captura o una acción de flujo falló. Se recupera
    /// localmente: la sesión vuelve a reposo y el resto sigue operando.
    #[error("Fallo en el paso {step} del flujo '{flow}'")]
    CaptureHandler {
        flow: String,
        step: usize,
        #[source]
        source: anyhow::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_corpus_display() {
        let err = BotError::MalformedCorpus("falta el campo `objetivo`".into());
        assert_eq!(
            err.to_string(),
            "Corpus malformado: falta el campo `objetivo`"
        );
    }

    #[test]
    fn capture_handler_display_names_flow_and_step() {
        let err = BotError::CaptureHandler {
            flow: "registro".into(),
            step: 1,
            source: anyhow::anyhow!("boom"),
        };
        assert_eq!(err.to_string(), "Fallo en el paso 1 del flujo 'registro'");
    }
}
