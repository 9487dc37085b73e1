//! Configuration management.

use crate::transport::Transport;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Public PlantUML rendering server used when none is configured.
pub const DEFAULT_PLANTUML_SERVER: &str = "https://www.plantuml.com/plantuml";

/// Configuration structure that matches the TOML file format.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    server: ServerConfig,
    #[serde(default)]
    auth: AuthSection,
    #[serde(default)]
    capabilities: CapabilityToggles,
    #[serde(default)]
    plantuml: PlantUmlConfig,
    #[serde(default)]
    logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ServerConfig {
    #[serde(default)]
    transport: Transport,
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_sse_path")]
    sse_path: String,
    #[serde(default = "default_messages_path")]
    messages_path: String,
    #[serde(default = "default_mcp_path")]
    mcp_path: String,
    #[serde(default)]
    allowed_origins: Vec<String>,
    #[serde(default = "default_handler_timeout")]
    handler_timeout_secs: u64,
    #[serde(default = "default_session_idle")]
    session_idle_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: Transport::default(),
            host: default_host(),
            port: default_port(),
            sse_path: default_sse_path(),
            messages_path: default_messages_path(),
            mcp_path: default_mcp_path(),
            allowed_origins: Vec::new(),
            handler_timeout_secs: default_handler_timeout(),
            session_idle_secs: default_session_idle(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct AuthSection {
    /// Shared secret required from HTTP clients. Unset means open mode.
    api_key: Option<String>,
    /// Credential presented on behalf of the stdio client.
    client_token: Option<String>,
}

/// Capability categories offered at negotiation. All on by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityToggles {
    #[serde(default = "enabled")]
    pub tools: bool,
    #[serde(default = "enabled")]
    pub prompts: bool,
    #[serde(default = "enabled")]
    pub resources: bool,
    #[serde(default = "enabled")]
    pub logging: bool,
}

impl Default for CapabilityToggles {
    fn default() -> Self {
        Self {
            tools: true,
            prompts: true,
            resources: true,
            logging: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PlantUmlConfig {
    #[serde(default = "default_plantuml_server")]
    server_url: String,
    #[serde(default = "default_plantuml_timeout")]
    timeout_secs: u64,
}

impl Default for PlantUmlConfig {
    fn default() -> Self {
        Self {
            server_url: default_plantuml_server(),
            timeout_secs: default_plantuml_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct LoggingConfig {
    /// Path to log file (if set, logs are written to the file in addition to stderr)
    log_file: Option<PathBuf>,
    /// Log level (trace, debug, info, warn, error)
    /// If not set, uses RUST_LOG environment variable or defaults to "info"
    log_level: Option<String>,
}

fn enabled() -> bool {
    true
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    plantuml_mcp_types::DEFAULT_PORT
}

fn default_sse_path() -> String {
    "/sse".to_string()
}

fn default_messages_path() -> String {
    "/messages".to_string()
}

fn default_mcp_path() -> String {
    "/mcp".to_string()
}

fn default_handler_timeout() -> u64 {
    120
}

fn default_session_idle() -> u64 {
    3600
}

fn default_plantuml_server() -> String {
    DEFAULT_PLANTUML_SERVER.to_string()
}

fn default_plantuml_timeout() -> u64 {
    30
}

/// Values taken from the command line. `None` leaves the lower layers alone.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub transport: Option<Transport>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub api_key: Option<String>,
    pub plantuml_server: Option<String>,
    pub log_level: Option<String>,
    /// Extra TOML file merged above the discovered ones.
    pub config_file: Option<PathBuf>,
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Transport to serve
    pub transport: Transport,
    /// Interface the HTTP transports bind to
    pub host: String,
    /// Port the HTTP transports listen on
    pub port: u16,
    /// Legacy SSE stream path
    pub sse_path: String,
    /// Legacy SSE message post path
    pub messages_path: String,
    /// Streamable HTTP endpoint path
    pub mcp_path: String,
    /// Non-localhost origins accepted by the HTTP transports
    pub allowed_origins: Vec<String>,
    /// Upper bound on a single tool invocation
    pub handler_timeout: Duration,
    /// Unbound HTTP sessions idle longer than this are closed
    pub session_idle: Duration,
    /// Shared secret; `None` means open mode
    pub api_key: Option<String>,
    /// Credential attributed to the stdio client
    pub client_token: Option<String>,
    /// Capability categories offered at negotiation
    pub capabilities: CapabilityToggles,
    /// Base URL of the PlantUML rendering server
    pub plantuml_server: String,
    /// Request timeout towards the PlantUML server
    pub plantuml_timeout: Duration,
    /// Path to log file (if set, logs are written to the file in addition to stderr)
    pub log_file: Option<PathBuf>,
    /// Log level (if set, overrides RUST_LOG environment variable)
    pub log_level: Option<String>,
}

impl Config {
    /// Load configuration with full priority chain: CLI args > env vars > config files > defaults.
    ///
    /// Config files are searched in this order:
    /// 1. `config.toml` in user config directory (~/.config/plantuml-mcp/ on Linux)
    /// 2. `.plantuml-mcp.toml` in current directory
    /// 3. the file passed with `--config`
    pub fn from_figment(overrides: &ConfigOverrides) -> anyhow::Result<Self> {
        let local_config = std::env::current_dir()
            .ok()
            .map(|d| d.join(".plantuml-mcp.toml"));
        let user_config = directories::ProjectDirs::from("", "", "plantuml-mcp")
            .map(|dirs| dirs.config_dir().join("config.toml"));

        // Build figment with priority: defaults < user config < local config < env vars < CLI args
        let mut figment = Figment::new();

        // 1. Start with defaults
        figment = figment.merge(Serialized::defaults(ConfigFile {
            server: ServerConfig::default(),
            auth: AuthSection::default(),
            capabilities: CapabilityToggles::default(),
            plantuml: PlantUmlConfig::default(),
            logging: LoggingConfig::default(),
        }));

        // 2. Merge user config file if it exists
        if let Some(ref path) = user_config {
            if path.exists() {
                figment = figment.merge(Toml::file(path));
            }
        }

        // 3. Merge local config file if it exists
        if let Some(ref path) = local_config {
            if path.exists() {
                figment = figment.merge(Toml::file(path));
            }
        }

        // 4. Explicit config file
        if let Some(ref path) = overrides.config_file {
            if !path.exists() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            figment = figment.merge(Toml::file(path));
        }

        // 5. Legacy MCP_API_KEY, then PLANTUML_MCP_* (section__key, e.g. PLANTUML_MCP_SERVER__PORT)
        figment = figment.merge(
            Env::raw()
                .only(&["MCP_API_KEY"])
                .map(|_| "auth.api_key".into()),
        );
        figment = figment.merge(Env::prefixed("PLANTUML_MCP_").split("__"));

        // 6. Merge CLI arguments (highest priority)
        if let Some(t) = overrides.transport {
            figment = figment.merge(Serialized::default("server.transport", t));
        }
        if let Some(ref h) = overrides.host {
            figment = figment.merge(Serialized::default("server.host", h));
        }
        if let Some(p) = overrides.port {
            figment = figment.merge(Serialized::default("server.port", p));
        }
        if let Some(ref k) = overrides.api_key {
            figment = figment.merge(Serialized::default("auth.api_key", k));
        }
        if let Some(ref s) = overrides.plantuml_server {
            figment = figment.merge(Serialized::default("plantuml.server_url", s));
        }
        if let Some(ref l) = overrides.log_level {
            figment = figment.merge(Serialized::default("logging.log_level", l));
        }

        // Extract the configuration
        let config_file: ConfigFile = figment.extract()?;
        Ok(Self::from(config_file))
    }

    /// Socket address for the HTTP transports.
    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        let addr = format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid listen address {}:{}: {}", self.host, self.port, e))?;
        Ok(addr)
    }
}

impl From<ConfigFile> for Config {
    fn from(file: ConfigFile) -> Self {
        Self {
            transport: file.server.transport,
            host: file.server.host,
            port: file.server.port,
            sse_path: file.server.sse_path,
            messages_path: file.server.messages_path,
            mcp_path: file.server.mcp_path,
            allowed_origins: file.server.allowed_origins,
            handler_timeout: Duration::from_secs(file.server.handler_timeout_secs),
            session_idle: Duration::from_secs(file.server.session_idle_secs),
            api_key: file.auth.api_key.filter(|k| !k.is_empty()),
            client_token: file.auth.client_token,
            capabilities: file.capabilities,
            plantuml_server: file.plantuml.server_url.trim_end_matches('/').to_string(),
            plantuml_timeout: Duration::from_secs(file.plantuml.timeout_secs),
            log_file: file.logging.log_file,
            log_level: file.logging.log_level,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from(ConfigFile {
            server: ServerConfig::default(),
            auth: AuthSection::default(),
            capabilities: CapabilityToggles::default(),
            plantuml: PlantUmlConfig::default(),
            logging: LoggingConfig::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    const ENV_VARS: [&str; 5] = [
        "PLANTUML_MCP_SERVER__PORT",
        "PLANTUML_MCP_SERVER__TRANSPORT",
        "PLANTUML_MCP_AUTH__API_KEY",
        "PLANTUML_MCP_PLANTUML__SERVER_URL",
        "MCP_API_KEY",
    ];

    fn clear_env() {
        for var in ENV_VARS {
            std::env::remove_var(var);
        }
    }

    /// Run `f` with the current directory set to a fresh temp dir holding
    /// `.plantuml-mcp.toml` (if given).
    fn in_temp_dir<T>(local_config: Option<&str>, f: impl FnOnce() -> T) -> T {
        let temp_dir = TempDir::new().unwrap();
        if let Some(content) = local_config {
            fs::write(temp_dir.path().join(".plantuml-mcp.toml"), content).unwrap();
        }
        let original_dir = std::env::current_dir().unwrap();
        std::env::set_current_dir(&temp_dir).unwrap();

        let result = f();

        // Restore (restore dir before temp_dir is dropped, ignore errors)
        let _ = std::env::set_current_dir(&original_dir);
        result
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();

        assert_eq!(config.transport, Transport::Stdio);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, plantuml_mcp_types::DEFAULT_PORT);
        assert_eq!(config.sse_path, "/sse");
        assert_eq!(config.messages_path, "/messages");
        assert_eq!(config.mcp_path, "/mcp");
        assert_eq!(config.handler_timeout, Duration::from_secs(120));
        assert_eq!(config.plantuml_server, DEFAULT_PLANTUML_SERVER);
        assert!(config.api_key.is_none());
        assert_eq!(config.capabilities, CapabilityToggles::default());
    }

    #[test]
    #[serial]
    fn test_from_figment_defaults() {
        clear_env();

        let config = in_temp_dir(None, || Config::from_figment(&ConfigOverrides::default()))
            .unwrap();

        assert_eq!(config.port, plantuml_mcp_types::DEFAULT_PORT);
        assert_eq!(config.transport, Transport::Stdio);
        assert!(config.api_key.is_none());
    }

    #[test]
    #[serial]
    fn test_from_figment_config_file() {
        clear_env();

        let content = r#"
[server]
transport = "http"
port = 7777
allowed_origins = ["https://studio.example.com"]

[capabilities]
prompts = false

[plantuml]
server_url = "http://localhost:8080/plantuml/"
"#;
        let config = in_temp_dir(Some(content), || {
            Config::from_figment(&ConfigOverrides::default())
        })
        .unwrap();

        assert_eq!(config.transport, Transport::Http);
        assert_eq!(config.port, 7777);
        assert_eq!(config.allowed_origins, vec!["https://studio.example.com"]);
        assert!(!config.capabilities.prompts);
        assert!(config.capabilities.tools);
        assert_eq!(config.plantuml_server, "http://localhost:8080/plantuml");
    }

    #[test]
    #[serial]
    fn test_from_figment_env_vars_override_config_file() {
        clear_env();
        std::env::set_var("PLANTUML_MCP_SERVER__PORT", "8888");

        let config = in_temp_dir(Some("[server]\nport = 7777"), || {
            Config::from_figment(&ConfigOverrides::default())
        });

        clear_env();
        assert_eq!(config.unwrap().port, 8888);
    }

    #[test]
    #[serial]
    fn test_from_figment_cli_overrides_env_and_config() {
        clear_env();
        std::env::set_var("PLANTUML_MCP_SERVER__PORT", "8888");

        let overrides = ConfigOverrides {
            port: Some(9999),
            transport: Some(Transport::Sse),
            ..Default::default()
        };
        let config = in_temp_dir(Some("[server]\nport = 7777"), || {
            Config::from_figment(&overrides)
        });

        clear_env();
        let config = config.unwrap();
        assert_eq!(config.port, 9999);
        assert_eq!(config.transport, Transport::Sse);
    }

    #[test]
    #[serial]
    fn test_legacy_api_key_env() {
        clear_env();
        std::env::set_var("MCP_API_KEY", "legacy-secret");

        let config = in_temp_dir(None, || Config::from_figment(&ConfigOverrides::default()));

        clear_env();
        assert_eq!(config.unwrap().api_key.as_deref(), Some("legacy-secret"));
    }

    #[test]
    #[serial]
    fn test_prefixed_api_key_beats_legacy() {
        clear_env();
        std::env::set_var("MCP_API_KEY", "legacy-secret");
        std::env::set_var("PLANTUML_MCP_AUTH__API_KEY", "new-secret");

        let config = in_temp_dir(None, || Config::from_figment(&ConfigOverrides::default()));

        clear_env();
        assert_eq!(config.unwrap().api_key.as_deref(), Some("new-secret"));
    }

    #[test]
    #[serial]
    fn test_explicit_config_file() {
        clear_env();
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("custom.toml");
        fs::write(&path, "[auth]\napi_key = \"from-file\"\nclient_token = \"from-file\"").unwrap();

        let overrides = ConfigOverrides {
            config_file: Some(path),
            ..Default::default()
        };
        let config = in_temp_dir(None, || Config::from_figment(&overrides)).unwrap();

        assert_eq!(config.api_key.as_deref(), Some("from-file"));
        assert_eq!(config.client_token.as_deref(), Some("from-file"));
    }

    #[test]
    #[serial]
    fn test_missing_explicit_config_file_is_an_error() {
        clear_env();
        let overrides = ConfigOverrides {
            config_file: Some(PathBuf::from("/nonexistent/plantuml-mcp.toml")),
            ..Default::default()
        };
        assert!(in_temp_dir(None, || Config::from_figment(&overrides)).is_err());
    }

    #[test]
    fn test_addr() {
        let config = Config {
            host: "0.0.0.0".to_string(),
            port: 9000,
            ..Config::default()
        };
        assert_eq!(config.addr().unwrap().port(), 9000);

        let config = Config {
            host: "not a host".to_string(),
            ..Config::default()
        };
        assert!(config.addr().is_err());
    }
}
