//! Process configuration.
//!
//! One [`AppConfig`] is built at startup and shared by reference with the
//! middleware, the backend helpers and the handlers. Sources, lowest priority
//! first: built-in defaults, an optional YAML file, `GATEWAY_` prefixed
//! environment variables, then the deployment variables and CLI flags below.

use clap::Parser;
use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::Path;

/// Config file picked up from the working directory when no path is given.
const CWD_CONFIG_FILE: &str = "config.yaml";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Host to bind
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Base URL of the backend service
    #[arg(long, env = "NEXT_PUBLIC_BACKEND_URL")]
    pub backend_url: Option<String>,

    /// Backend endpoint that receives chat submissions
    #[arg(long, env = "BACKEND_CHAT_ENDPOINT")]
    pub chat_endpoint: Option<String>,

    /// Auth provider base URL
    #[arg(long, env = "NEXT_PUBLIC_SUPABASE_URL")]
    pub supabase_url: Option<String>,

    /// Auth provider public API key
    #[arg(long, env = "NEXT_PUBLIC_SUPABASE_ANON_KEY")]
    pub supabase_anon_key: Option<String>,

    /// Secure mode; only the literal value "true" enables it
    #[arg(long, env = "USE_SECURE_MODE")]
    pub secure_mode: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub backend: BackendConfig,
    pub auth: AuthConfig,
    pub security: SecurityConfig,
    pub chat: ChatConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    /// Absent is allowed at startup; backend calls fail with a
    /// "Missing NEXT_PUBLIC_BACKEND_URL" error instead.
    #[serde(default)]
    pub url: Option<String>,
    pub chat_endpoint: String,
    pub health_endpoint: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub supabase_url: String,
    pub anon_key: String,
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct SecurityConfig {
    pub secure_mode: bool,
}

impl SecurityConfig {
    /// `X-Frame-Options` value applied to every response.
    pub fn frame_options(self) -> &'static str {
        if self.secure_mode {
            "SAMEORIGIN"
        } else {
            "ALLOWALL"
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct ChatConfig {
    pub idle_timeout_secs: u64,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_args(std::env::args())
    }

    pub fn load_from_args<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli = Cli::try_parse_from(args).map_err(|e| ConfigError::Message(e.to_string()))?;

        let mut builder = Config::builder()
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("backend.chat_endpoint", "/chat")?
            .set_default("backend.health_endpoint", "/auth-health-check")?
            .set_default("auth.supabase_url", "")?
            .set_default("auth.anon_key", "")?
            .set_default("security.secure_mode", false)?
            .set_default("chat.idle_timeout_secs", 30 * 60)?;

        if let Some(path) = &cli.config {
            builder = builder.add_source(File::with_name(path).required(true));
        } else if Path::new(CWD_CONFIG_FILE).exists() {
            builder = builder.add_source(File::new(CWD_CONFIG_FILE, FileFormat::Yaml));
        }

        // E.g. GATEWAY_SERVER__PORT=8000
        builder = builder.add_source(
            Environment::with_prefix("GATEWAY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        // Overrides win over every source above, whatever the order.
        if let Some(host) = cli.host {
            builder = builder.set_override("server.host", host)?;
        }
        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", port)?;
        }
        if let Some(url) = cli.backend_url {
            builder = builder.set_override("backend.url", url)?;
        }
        if let Some(endpoint) = cli.chat_endpoint {
            builder = builder.set_override("backend.chat_endpoint", endpoint)?;
        }
        if let Some(url) = cli.supabase_url {
            builder = builder.set_override("auth.supabase_url", url)?;
        }
        if let Some(key) = cli.supabase_anon_key {
            builder = builder.set_override("auth.anon_key", key)?;
        }
        if let Some(flag) = cli.secure_mode {
            builder = builder.set_override("security.secure_mode", flag == "true")?;
        }

        let cfg: AppConfig = builder.build()?.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.supabase_url.trim().is_empty() {
            return Err(ConfigError::Message(
                "Missing required setting: NEXT_PUBLIC_SUPABASE_URL".to_string(),
            ));
        }
        if self.auth.anon_key.trim().is_empty() {
            return Err(ConfigError::Message(
                "Missing required setting: NEXT_PUBLIC_SUPABASE_ANON_KEY".to_string(),
            ));
        }
        Ok(())
    }
}
