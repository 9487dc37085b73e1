//! Shared gateway state.

use std::sync::Arc;

use crate::auth::AuthConfig;
use crate::capabilities::build_registry;
use crate::config::Config;
use crate::mcp::{CapabilityRegistry, EngineContext, EngineSettings, SessionManager};
use crate::plantuml::PlantUmlClient;

/// Paths and origin policy of the HTTP transports.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub sse_path: String,
    pub messages_path: String,
    pub mcp_path: String,
    pub allowed_origins: Vec<String>,
}

impl HttpSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            sse_path: config.sse_path.clone(),
            messages_path: config.messages_path.clone(),
            mcp_path: config.mcp_path.clone(),
            allowed_origins: config.allowed_origins.clone(),
        }
    }
}

/// Shared gateway state.
#[derive(Clone)]
pub struct GatewayState {
    inner: Arc<GatewayStateInner>,
}

struct GatewayStateInner {
    /// Session index and engine context
    sessions: SessionManager,
    /// Authorization gate shared with every engine
    auth: Arc<AuthConfig>,
    /// HTTP transport settings
    http: HttpSettings,
    /// Credential attributed to the stdio client
    client_token: Option<String>,
}

impl GatewayState {
    /// Build the full gateway: PlantUML client, capability registry, sessions.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let client = Arc::new(PlantUmlClient::new(
            config.plantuml_server.clone(),
            config.plantuml_timeout,
        )?);
        let registry = build_registry(client)?;
        Ok(Self::with_registry(config, registry))
    }

    /// Build the gateway around an already assembled registry.
    pub fn with_registry(config: &Config, registry: CapabilityRegistry) -> Self {
        let auth = Arc::new(AuthConfig::new(config.api_key.clone()));
        auth.log_mode();

        let context = Arc::new(EngineContext {
            registry: Arc::new(registry),
            auth: auth.clone(),
            settings: EngineSettings::from_config(config),
        });

        Self {
            inner: Arc::new(GatewayStateInner {
                sessions: SessionManager::new(context),
                auth,
                http: HttpSettings::from_config(config),
                client_token: config.client_token.clone(),
            }),
        }
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.inner.sessions
    }

    pub fn auth(&self) -> &AuthConfig {
        &self.inner.auth
    }

    pub fn http(&self) -> &HttpSettings {
        &self.inner.http
    }

    /// The stdio pipe carries no per-message credentials; the configured
    /// client token stands in for them.
    pub fn stdio_credential(&self) -> Option<&str> {
        self.inner.client_token.as_deref()
    }
}
