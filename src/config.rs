//! Carga y gestión de configuración de la aplicación.

use std::env;
use std::path::PathBuf;

use anyhow::Result;

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_addr: String,
    /// Ruta del documento de conocimiento (JSON estructurado).
    pub corpus_path: PathBuf,
    /// Directorio de recursos estáticos (logo del bot, etc.).
    pub assets_dir: PathBuf,
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si
    /// existe). Todas las claves tienen un valor por defecto razonable.
    pub fn from_env() -> Result<Self> {
        let server_addr =
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:3008".to_string());

        let corpus_path = env::var("CORPUS_PATH")
            .unwrap_or_else(|_| "./data/proyectos_estructurado_from_doc.json".to_string());

        let assets_dir = env::var("ASSETS_DIR").unwrap_or_else(|_| "./assets".to_string());

        Ok(Self {
            server_addr,
            corpus_path: PathBuf::from(corpus_path),
            assets_dir: PathBuf::from(assets_dir),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_key() {
        // Sin variables de entorno la configuración sigue siendo válida.
        let cfg = AppConfig::from_env().expect("configuración por defecto");
        assert!(cfg.server_addr.contains(':'));
        assert!(!cfg.corpus_path.as_os_str().is_empty());
        assert!(!cfg.assets_dir.as_os_str().is_empty());
    }
}
