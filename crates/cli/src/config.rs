//! Server configuration file.
//!
//! ```toml
//! port = 8080
//!
//! [query]
//! default_limit = 100
//! max_limit = 1000
//!
//! [[identities]]
//! token = "secret-alice"
//! subject = "alice"
//! claims = ["correlation:read_all"]
//! ```
//!
//! The engine tables (`[query]`, `[store]`, `[authorization]`) sit at the top
//! level next to `port`. Every field is optional.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use correlation_core::{EngineConfig, Identity};
use serde::{Deserialize, Serialize};

pub(crate) const DEFAULT_PORT: u16 = 8080;

/// Environment variable overriding the configured port.
pub(crate) const PORT_ENV: &str = "CORRELATION_PORT";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct ServerConfig {
    pub(crate) port: u16,
    #[serde(flatten)]
    pub(crate) engine: EngineConfig,
    /// Bearer tokens accepted by the server. Tokens are never serialized.
    pub(crate) identities: Vec<Identity>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            port: DEFAULT_PORT,
            engine: EngineConfig::default(),
            identities: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Read `path` if given, otherwise start from defaults, then apply the
    /// `CORRELATION_PORT` override and validate.
    pub(crate) fn load(path: Option<&Path>) -> Result<ServerConfig, String> {
        let mut config = match path {
            Some(path) => read_config(path)?,
            None => ServerConfig::default(),
        };
        if let Ok(port) = std::env::var(PORT_ENV) {
            config.port = port
                .parse()
                .map_err(|e| format!("invalid {PORT_ENV} '{port}': {e}"))?;
        }
        config.validate()?;
        Ok(config)
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        self.engine.validate().map_err(|e| e.to_string())?;
        let mut seen = HashSet::new();
        for identity in &self.identities {
            if identity.token.is_empty() {
                return Err(format!("identity '{}' has an empty token", identity.subject));
            }
            if identity.is_anonymous() {
                return Err("identity with an empty subject".to_string());
            }
            if !seen.insert(identity.token.as_str()) {
                return Err(format!(
                    "token of identity '{}' is already assigned",
                    identity.subject
                ));
            }
        }
        Ok(())
    }

    /// Bearer token -> identity lookup table.
    pub(crate) fn token_table(&self) -> HashMap<String, Identity> {
        self.identities
            .iter()
            .map(|identity| (identity.token.clone(), identity.clone()))
            .collect()
    }
}

fn read_config(path: &Path) -> Result<ServerConfig, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("could not read '{}': {}", path.display(), e))?;
    toml::from_str(&content).map_err(|e| format!("could not parse '{}': {}", path.display(), e))
}
