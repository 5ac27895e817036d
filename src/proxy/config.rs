use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// How workforce ids are turned into backend addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMode {
    /// Ask the platform's deployment discovery API (cached per process).
    Remote,
    /// Scan on-disk manifests and assign loopback ports.
    Local,
}

impl Default for ResolutionMode {
    fn default() -> Self {
        Self::Remote
    }
}

/// Offline resolution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConfig {
    /// Directory holding one manifest per workforce component
    #[serde(default)]
    pub manifests_dir: Option<PathBuf>,

    /// First backend port; components get `base_port + index`
    #[serde(default = "default_base_port")]
    pub base_port: u16,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            manifests_dir: None,
            base_port: default_base_port(),
        }
    }
}

/// Gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Whether to listen on all interfaces
    /// - false: 127.0.0.1 only (default)
    /// - true: 0.0.0.0
    #[serde(default)]
    pub allow_lan_access: bool,

    /// Authorization authority base URL (project access + deployment discovery)
    #[serde(default = "default_platform_url")]
    pub api_url: String,

    /// OAuth host (authorize, token refresh, magic links)
    #[serde(default = "default_platform_url")]
    pub auth_url: String,

    /// Host advertised to backends inside `platform_config`
    #[serde(default)]
    pub api_host: Option<String>,

    #[serde(default)]
    pub org_id: String,

    #[serde(default)]
    pub project_id: String,

    #[serde(default)]
    pub project_env_id: String,

    /// Scheme used to reach discovered deployment domains
    #[serde(default = "default_backend_scheme")]
    pub backend_scheme: String,

    /// Upper bound for a single authority call (seconds)
    #[serde(default = "default_validation_timeout")]
    pub validation_timeout_secs: u64,

    /// Upper bound for a unary backend call (seconds). Streams are not bounded.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Access token cookie visibility.
    /// - true: HttpOnly, pure server-side sessions (default)
    /// - false: readable by a companion single-page client
    #[serde(default = "default_true")]
    pub access_cookie_http_only: bool,

    #[serde(default)]
    pub resolution: ResolutionMode,

    #[serde(default)]
    pub local: LocalConfig,

    /// Static login/callback/docs pages
    #[serde(default = "default_pages_dir")]
    pub pages_dir: PathBuf,

    #[serde(default)]
    pub log: LogConfig,

    /// OAuth providers accepted by `GET /auth/:provider`
    #[serde(default = "default_oauth_providers")]
    pub oauth_providers: Vec<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            allow_lan_access: false,
            api_url: default_platform_url(),
            auth_url: default_platform_url(),
            api_host: None,
            org_id: String::new(),
            project_id: String::new(),
            project_env_id: String::new(),
            backend_scheme: default_backend_scheme(),
            validation_timeout_secs: default_validation_timeout(),
            request_timeout_secs: default_request_timeout(),
            access_cookie_http_only: true,
            resolution: ResolutionMode::default(),
            local: LocalConfig::default(),
            pages_dir: default_pages_dir(),
            log: LogConfig::default(),
            oauth_providers: default_oauth_providers(),
        }
    }
}

/// Logging output. `RUST_LOG` still wins over `level` when set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Rolling log file directory; console only when unset
    #[serde(default)]
    pub dir: Option<PathBuf>,

    #[serde(default = "default_log_level")]
    pub level: String,

    /// Separate filter for the file output, e.g. `debug` on disk while the console stays at `info`
    #[serde(default)]
    pub file_level: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dir: None,
            level: default_log_level(),
            file_level: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_base_port() -> u16 {
    8100
}

fn default_platform_url() -> String {
    "https://api.timbal.ai".to_string()
}

fn default_backend_scheme() -> String {
    "https".to_string()
}

fn default_validation_timeout() -> u64 {
    5
}

fn default_request_timeout() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

fn default_pages_dir() -> PathBuf {
    PathBuf::from("pages")
}

fn default_oauth_providers() -> Vec<String> {
    vec![
        "github".to_string(),
        "google".to_string(),
        "microsoft".to_string(),
    ]
}

impl GatewayConfig {
    /// Actual listen address
    pub fn get_bind_address(&self) -> &str {
        if self.allow_lan_access {
            "0.0.0.0"
        } else {
            "127.0.0.1"
        }
    }

    pub fn validation_timeout(&self) -> Duration {
        Duration::from_secs(self.validation_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// `<api_url>/orgs/<org>/projects/<project>`
    pub fn project_url(&self) -> String {
        format!(
            "{}/orgs/{}/projects/{}",
            self.api_url.trim_end_matches('/'),
            self.org_id,
            self.project_id
        )
    }

    pub fn is_known_provider(&self, provider: &str) -> bool {
        self.oauth_providers.iter().any(|p| p == provider)
    }

    /// Apply environment overrides on top of file/default values.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        fn flag(value: &str) -> bool {
            matches!(value, "1" | "true" | "yes" | "on")
        }

        if let Some(port) = lookup("PORT").and_then(|v| v.parse().ok()) {
            self.port = port;
        }
        if let Some(value) = lookup("WORKFORCE_ALLOW_LAN") {
            self.allow_lan_access = flag(&value);
        }
        if let Some(url) = lookup("TIMBAL_API_URL") {
            self.api_url = url;
        }
        if let Some(url) = lookup("TIMBAL_AUTH_URL") {
            self.auth_url = url;
        }
        if let Some(host) = lookup("TIMBAL_API_HOST") {
            self.api_host = Some(host);
        }
        if let Some(org) = lookup("TIMBAL_ORG_ID") {
            self.org_id = org;
        }
        if let Some(project) = lookup("TIMBAL_PROJECT_ID") {
            self.project_id = project;
        }
        if let Some(env) = lookup("TIMBAL_PROJECT_ENV_ID") {
            self.project_env_id = env;
        }
        if let Some(dir) = lookup("WORKFORCE_LOCAL_DIR") {
            self.local.manifests_dir = Some(PathBuf::from(dir));
            self.resolution = ResolutionMode::Local;
        }
        if let Some(port) = lookup("WORKFORCE_LOCAL_BASE_PORT").and_then(|v| v.parse().ok()) {
            self.local.base_port = port;
        }
        if let Some(value) = lookup("WORKFORCE_ACCESS_COOKIE_HTTP_ONLY") {
            self.access_cookie_http_only = flag(&value);
        }
        if let Some(dir) = lookup("WORKFORCE_LOG_DIR") {
            self.log.dir = Some(PathBuf::from(dir));
        }
        if let Some(level) = lookup("WORKFORCE_LOG_LEVEL") {
            self.log.level = level;
        }
        if let Some(level) = lookup("WORKFORCE_LOG_FILE_LEVEL") {
            self.log.file_level = Some(level);
        }
    }

    /// Reject configurations the gateway cannot serve with.
    pub fn validate(&self) -> Result<(), String> {
        // Credentials are checked against the project in every mode.
        if self.org_id.is_empty() || self.project_id.is_empty() {
            return Err("org_id and project_id are required".to_string());
        }

        match self.resolution {
            ResolutionMode::Remote => {}
            ResolutionMode::Local => match &self.local.manifests_dir {
                Some(dir) if dir.is_dir() => {}
                Some(dir) => {
                    return Err(format!("local manifests dir {:?} is not a directory", dir));
                }
                None => return Err("local resolution requires local.manifests_dir".to_string()),
            },
        }
        Ok(())
    }
}
