//! Almacén de sesiones: interfaz y la implementación en memoria.
//!
//! El almacén es un colaborador externo (Redis, base de datos, etc.); aquí
//! sólo se fija el contrato: lecturas y escrituras atómicas por clave de
//! sesión. `MemoryStore` cubre desarrollo y pruebas.

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;

use crate::models::SessionState;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("el almacén de sesiones no respondió: {0}")]
    Unavailable(String),
}

/// Memoria clave/valor por conversación. Ambas operaciones deben ser
/// atómicas por clave; la serialización de mensajes concurrentes de una
/// misma sesión la garantiza el dispatcher, no el almacén.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, session_id: &str) -> Result<Option<SessionState>, StoreError>;
    async fn put(&self, session: &SessionState) -> Result<(), StoreError>;
}

/// Implementación en memoria sobre `DashMap`. Sin política de expiración:
/// la limpieza de sesiones viejas es responsabilidad del almacén real.
#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: DashMap<String, SessionState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn get(&self, session_id: &str) -> Result<Option<SessionState>, StoreError> {
        Ok(self.sessions.get(session_id).map(|s| s.value().clone()))
    }

    async fn put(&self, session: &SessionState) -> Result<(), StoreError> {
        self.sessions
            .insert(session.session_id.clone(), session.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_missing_session_is_none() {
        let store = MemoryStore::new();
        assert!(store.get("573001112233").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = MemoryStore::new();
        let mut session = SessionState::new("573001112233");
        session.variables.insert("nombre".into(), "Ana".into());
        store.put(&session).await.unwrap();

        let loaded = store.get("573001112233").await.unwrap().unwrap();
        assert_eq!(loaded.variables.get("nombre").unwrap(), "Ana");
        assert!(loaded.is_idle());
        assert_eq!(store.len(), 1);
    }
}
