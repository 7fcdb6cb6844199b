//! Búsqueda de texto libre sobre el índice del corpus.
//!
//! Algoritmo en dos fases, sin distinción de mayúsculas y sin stemming:
//!   1. Subcadena exacta: entradas cuyo texto contiene la consulta completa.
//!   2. Si la fase 1 no devuelve nada, palabras clave: se tokeniza por
//!      espacios, se descartan tokens de longitud <= 3 (señal demasiado
//!      débil) y vale cualquier token contenido como subcadena.
//! En ambas fases se conserva el orden del corpus y se devuelven como mucho
//! `MAX_RESULTS` entradas. Sin coincidencias no es un error: es un resultado
//! negativo normal que el llamador convierte en un mensaje de "no encontrado".

use crate::corpus::CorpusEntry;

/// Máximo de coincidencias presentadas al usuario.
pub const MAX_RESULTS: usize = 3;

/// Tokens de esta longitud o menos no participan en la fase de palabras clave.
const MIN_TOKEN_LEN: usize = 4;

pub fn search<'a>(index: &'a [CorpusEntry], query: &str) -> Vec<&'a CorpusEntry> {
    let q = query.trim().to_lowercase();
    if q.is_empty() {
        return Vec::new();
    }

    // Fase 1: la consulta completa como subcadena contigua.
    let mut results: Vec<&CorpusEntry> = index
        .iter()
        .filter(|e| e.text.to_lowercase().contains(&q))
        .collect();

    // Fase 2: palabras clave sueltas. Si todos los tokens son cortos no hay
    // candidatos y el resultado queda vacío, sin fallar.
    if results.is_empty() {
        let words: Vec<&str> = q
            .split_whitespace()
            .filter(|w| w.chars().count() >= MIN_TOKEN_LEN)
            .collect();
        if !words.is_empty() {
            results = index
                .iter()
                .filter(|e| {
                    let text = e.text.to_lowercase();
                    words.iter().any(|w| text.contains(w))
                })
                .collect();
        }
    }

    results.truncate(MAX_RESULTS);
    results
}
