//! Carga del documento de conocimiento y construcción del índice de búsqueda.
//!
//! El documento JSON (objetivo, alcance, definiciones, condiciones generales,
//! procedimiento y anexos) se lee una sola vez en el arranque y se aplana en
//! una lista de entradas buscables que conserva el orden del documento.

use std::fmt;
use std::path::Path;

use serde::Deserialize;

use crate::error::BotError;

/// Entrada buscable del corpus: una etiqueta legible y el texto completo.
#[derive(Debug, Clone, PartialEq)]
pub struct CorpusEntry {
    pub category: String,
    pub text: String,
}

/// Término definido en el documento.
#[derive(Debug, Clone, Deserialize)]
pub struct Definicion {
    pub term: String,
    pub descripcion: String,
}

/// Número de paso del procedimiento. El documento lo trae a veces como
/// número JSON y a veces como texto (incluso con punto final: "3.").
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum NumeroPaso {
    Entero(i64),
    Texto(String),
}

impl fmt::Display for NumeroPaso {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NumeroPaso::Entero(n) => write!(f, "{n}"),
            NumeroPaso::Texto(s) => write!(f, "{s}"),
        }
    }
}

impl NumeroPaso {
    /// Compara contra la entrada del usuario tolerando el punto final.
    pub fn matches(&self, input: &str) -> bool {
        let raw = self.to_string();
        let input = input.trim();
        raw == input || raw.trim_end_matches('.') == input
    }
}

/// Paso del procedimiento documentado.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Paso {
    pub no: NumeroPaso,
    pub actividad: String,
    pub responsable: Option<String>,
    pub producto: Option<String>,
}

/// Documento de conocimiento completo. Inmutable tras la carga; los campos
/// de primer nivel son obligatorios y su ausencia es un error fatal.
#[derive(Debug, Clone, Deserialize)]
pub struct KnowledgeDocument {
    pub objetivo: String,
    pub alcance: String,
    pub definiciones: Vec<Definicion>,
    pub condiciones_generales: Vec<String>,
    pub procedimiento: Vec<Paso>,
    pub anexos: Vec<String>,
}

/// Lee y valida el documento de conocimiento desde disco.
pub fn load_document(path: &Path) -> Result<KnowledgeDocument, BotError> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        BotError::MalformedCorpus(format!("no se pudo leer {}: {e}", path.display()))
    })?;
    parse_document(&raw)
}

/// Valida el JSON del documento; falla con `MalformedCorpus` si faltan
/// campos obligatorios o la estructura no coincide.
pub fn parse_document(raw: &str) -> Result<KnowledgeDocument, BotError> {
    serde_json::from_str(raw).map_err(|e| BotError::MalformedCorpus(e.to_string()))
}

/// Aplana el documento en entradas buscables, una por unidad de contenido,
/// en el orden del documento (ese orden es la prioridad de presentación).
pub fn build_index(doc: &KnowledgeDocument) -> Vec<CorpusEntry> {
    let mut entries = Vec::new();

    entries.push(CorpusEntry {
        category: "Objetivo".to_string(),
        text: doc.objetivo.clone(),
    });
    entries.push(CorpusEntry {
        category: "Alcance".to_string(),
        text: doc.alcance.clone(),
    });

    for d in &doc.definiciones {
        entries.push(CorpusEntry {
            category: format!("Definición: {}", d.term),
            text: format!("{}: {}", d.term, d.descripcion),
        });
    }

    for (i, c) in doc.condiciones_generales.iter().enumerate() {
        entries.push(CorpusEntry {
            category: format!("Condición {}", i + 1),
            text: c.clone(),
        });
    }

    for p in &doc.procedimiento {
        entries.push(CorpusEntry {
            category: format!("Paso {}", p.no),
            text: format!(
                "Actividad: {}. Responsable: {}. Producto: {}",
                p.actividad,
                p.responsable.as_deref().unwrap_or("—"),
                p.producto.as_deref().unwrap_or("—"),
            ),
        });
    }

    for (i, a) in doc.anexos.iter().enumerate() {
        entries.push(CorpusEntry {
            category: format!("Anexo {}", i + 1),
            text: a.clone(),
        });
    }

    entries
}
