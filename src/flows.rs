//! Catálogo de flujos del asistente "Clara" (gestión de proyectos de
//! investigación de la Universidad Mariana), construido sobre el documento
//! de conocimiento y el índice de búsqueda compartidos.
//!
//! El orden de registro importa: es el orden de resolución de triggers.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::corpus::{CorpusEntry, KnowledgeDocument};
use crate::dispatcher::NO_MATCH_REPLY;
use crate::flow::{FlowDefinition, FlowRegistry};
use crate::search;

/// Construye el registro completo de flujos.
pub fn build_registry(
    doc: Arc<KnowledgeDocument>,
    index: Arc<Vec<CorpusEntry>>,
    assets_dir: &Path,
) -> FlowRegistry {
    FlowRegistry::new(vec![
        welcome_flow(assets_dir),
        proyectos_flow(),
        objetivo_flow(&doc),
        definicion_flow(doc.clone()),
        condiciones_flow(&doc),
        procedimiento_flow(doc.clone()),
        anexos_flow(&doc),
        search_flow(index),
        registro_flow(),
    ])
}

/// Saludo inicial con el logo de Clara.
fn welcome_flow(assets_dir: &Path) -> FlowDefinition {
    let logo = assets_dir.join("clara_logo.jpeg");
    FlowDefinition::new("welcome", &["hola", "buenas", "hi", "hello"])
        .answer_with_media(
            "🦉 Hola, soy *Clara*, tu guía en investigaciones de la Universidad Mariana.",
            logo.display().to_string(),
        )
        .answer(
            [
                "Estoy aquí para ayudarte a entender la gestión de proyectos de investigación.",
                "👉 Escribe *proyecto* para comenzar.",
                "👉 O escribe *registro* para guardar tu información.",
            ]
            .join("\n"),
        )
}

/// Menú principal.
fn proyectos_flow() -> FlowDefinition {
    FlowDefinition::new("proyectos", &["proyecto", "convocatoria"])
        .answer("📑 Bienvenido al asistente de *Gestión de Proyectos* de la Universidad Mariana")
        .answer(
            [
                "Selecciona qué deseas consultar:",
                "👉 *objetivo* — Objetivo y Alcance",
                "👉 *definicion* — Consultar definiciones",
                "👉 *condiciones* — Condiciones Generales",
                "👉 *paso* — Procedimiento (1-50)",
                "👉 *anexos* — Documentos y recursos",
                "👉 *pregunta* — Búsqueda libre",
                "👉 *registro* — Guardar tus datos",
            ]
            .join("\n"),
        )
}

fn objetivo_flow(doc: &KnowledgeDocument) -> FlowDefinition {
    FlowDefinition::new("objetivo", &["objetivo"])
        .answer(format!("🎯 *Objetivo:* {}", doc.objetivo))
        .answer(format!("📌 *Alcance:* {}", doc.alcance))
}

/// Consulta de definiciones por término (subcadena, sin mayúsculas).
fn definicion_flow(doc: Arc<KnowledgeDocument>) -> FlowDefinition {
    FlowDefinition::new("definicion", &["definicion", "definición"]).capture(
        "Escribe el término que quieres consultar (ej: \"Innovación social\")",
        move |input, session, out| {
            let q = input.trim().to_lowercase();
            match doc
                .definiciones
                .iter()
                .find(|d| d.term.to_lowercase().contains(&q))
            {
                Some(hit) => {
                    info!(
                        usuario = %session.session_id,
                        termino = %hit.term,
                        "✅ [DEFINICION] Término encontrado"
                    );
                    out.say(format!("*{}:* {}", hit.term, hit.descripcion));
                }
                None => {
                    info!(
                        usuario = %session.session_id,
                        consulta = %q,
                        "❌ [DEFINICION] Término no encontrado"
                    );
                    out.say("❌ No encontré ese término.");
                }
            }
            Ok(())
        },
    )
}

fn condiciones_flow(doc: &KnowledgeDocument) -> FlowDefinition {
    let listado = doc
        .condiciones_generales
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{}. {}", i + 1, c))
        .collect::<Vec<_>>()
        .join("\n");
    FlowDefinition::new("condiciones", &["condiciones"])
        .answer("⚖️ *Condiciones Generales:*")
        .answer(listado)
}

/// Consulta de un paso del procedimiento por número.
fn procedimiento_flow(doc: Arc<KnowledgeDocument>) -> FlowDefinition {
    FlowDefinition::new("paso", &["paso"]).capture(
        "Escribe el número de paso (1-50):",
        move |input, session, out| {
            let n = input.trim();
            match doc.procedimiento.iter().find(|p| p.no.matches(n)) {
                Some(hit) => {
                    info!(usuario = %session.session_id, paso = %hit.no, "✅ [PASO] Paso encontrado");
                    out.say(format!(
                        "*Paso {}*\n📌 Actividad: {}\n👤 Responsable: {}\n📄 Producto: {}",
                        hit.no,
                        hit.actividad,
                        hit.responsable.as_deref().unwrap_or("—"),
                        hit.producto.as_deref().unwrap_or("—"),
                    ));
                }
                None => {
                    info!(usuario = %session.session_id, consulta = %n, "❌ [PASO] Paso no encontrado");
                    out.say("❌ No encontré ese paso. Prueba entre 1 y 50.");
                }
            }
            Ok(())
        },
    )
}

fn anexos_flow(doc: &KnowledgeDocument) -> FlowDefinition {
    let listado = doc
        .anexos
        .iter()
        .enumerate()
        .map(|(i, a)| format!("{}. {}", i + 1, a))
        .collect::<Vec<_>>()
        .join("\n");
    FlowDefinition::new("anexos", &["anexos"])
        .answer("📎 *Anexos y recursos:*")
        .answer(listado)
}

/// Búsqueda libre guiada: pregunta y responde con las mejores coincidencias.
fn search_flow(index: Arc<Vec<CorpusEntry>>) -> FlowDefinition {
    FlowDefinition::new("pregunta", &["pregunta", "buscar", "consulta"]).capture(
        "🔎 Escribe tu pregunta sobre gestión de proyectos:",
        move |input, session, out| {
            info!(usuario = %session.session_id, pregunta = %input, "🟢 [SEARCH] Pregunta guiada");
            let results = search::search(&index, input);
            if results.is_empty() {
                info!(usuario = %session.session_id, "❌ [SEARCH] Sin resultados");
                out.say(NO_MATCH_REPLY);
                return Ok(());
            }
            info!(
                usuario = %session.session_id,
                encontrados = results.len(),
                "✅ [SEARCH] Resultados"
            );
            for r in results {
                out.say(format!("📌 *{}*\n{}", r.category, r.text));
            }
            Ok(())
        },
    )
}

/// Registro del usuario: dos capturas encadenadas y un resumen final.
fn registro_flow() -> FlowDefinition {
    FlowDefinition::new("registro", &["registro", "registrar"])
        .capture_into(
            "📝 Para comenzar necesito algunos datos.\n¿Cuál es tu *nombre*?",
            "nombre",
        )
        .capture_into("¿De qué *programa académico* eres?", "programa")
        .action(|session, out| {
            let nombre = session.variables.get("nombre").map(String::as_str).unwrap_or("—");
            let programa = session.variables.get("programa").map(String::as_str).unwrap_or("—");
            info!(
                usuario = %session.session_id,
                nombre = %nombre,
                programa = %programa,
                "✅ [REGISTRO COMPLETO]"
            );
            out.say(format!(
                "✅ Registro completado.\n👤 Nombre: {nombre}\n🏫 Programa: {programa}"
            ));
            Ok(())
        })
}
