//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The IGDB app credentials are loaded from the IGDB_CLIENT_ID and
//! IGDB_CLIENT_SECRET env vars, never from the TOML, to avoid leaking
//! secrets through config files.

use common::Secret;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub igdb: IgdbConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    pub identity: IdentityConfig,
    pub avatar: AvatarConfig,
}

/// HTTP listener settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Upstream metadata API settings
#[derive(Debug, Deserialize)]
pub struct IgdbConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    /// Durable credential document, shared across restarts
    pub credential_file: PathBuf,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Retries after the initial attempt
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
    /// App credentials, environment only
    #[serde(skip)]
    pub client_id: String,
    #[serde(skip)]
    pub client_secret: Option<Secret<String>>,
}

/// Route-response cache settings
#[derive(Debug, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl_secs(),
        }
    }
}

/// External identity-verification endpoint
#[derive(Debug, Deserialize)]
pub struct IdentityConfig {
    pub verify_url: String,
}

/// Avatar storage settings
#[derive(Debug, Deserialize)]
pub struct AvatarConfig {
    pub storage_dir: PathBuf,
    pub public_base_url: String,
}

fn default_max_connections() -> usize {
    1000
}

fn default_api_base_url() -> String {
    igdb_auth::API_BASE_URL.to_owned()
}

fn default_token_url() -> String {
    igdb_auth::TOKEN_ENDPOINT.to_owned()
}

fn default_request_timeout_ms() -> u64 {
    5000
}

fn default_retry_limit() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

fn default_retry_max_delay_ms() -> u64 {
    5000
}

fn default_cache_ttl_secs() -> u64 {
    3 * 60 * 60
}

impl Config {
    /// Load configuration from a TOML file, then overlay the secret env vars.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        for (name, url) in [
            ("igdb.api_base_url", &config.igdb.api_base_url),
            ("igdb.token_url", &config.igdb.token_url),
            ("identity.verify_url", &config.identity.verify_url),
            ("avatar.public_base_url", &config.avatar.public_base_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(common::Error::Config(format!(
                    "{name} must start with http:// or https://, got: {url}"
                )));
            }
        }

        if config.igdb.request_timeout_ms == 0 {
            return Err(common::Error::Config(
                "request_timeout_ms must be greater than 0".into(),
            ));
        }

        if config.igdb.retry_base_delay_ms == 0
            || config.igdb.retry_max_delay_ms < config.igdb.retry_base_delay_ms
        {
            return Err(common::Error::Config(
                "retry delays must be non-zero and retry_max_delay_ms >= retry_base_delay_ms"
                    .into(),
            ));
        }

        if config.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        if config.cache.ttl_secs == 0 {
            return Err(common::Error::Config(
                "cache ttl_secs must be greater than 0".into(),
            ));
        }

        config.igdb.client_id = std::env::var("IGDB_CLIENT_ID")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| common::Error::Env("IGDB_CLIENT_ID".into()))?;
        config.igdb.client_secret = Some(Secret::from_env("IGDB_CLIENT_SECRET")?);

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("catalog-api.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Mutex to serialize tests that mutate environment variables, preventing
    /// data races when tests run in parallel.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// SAFETY: Callers must hold ENV_MUTEX to prevent concurrent env mutation.
    unsafe fn set_env(key: &str, val: &str) {
        unsafe { std::env::set_var(key, val) };
    }

    unsafe fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) };
    }

    unsafe fn set_secrets() {
        unsafe {
            set_env("IGDB_CLIENT_ID", "client-id-test");
            set_env("IGDB_CLIENT_SECRET", "client-secret-test");
        }
    }

    fn valid_toml() -> &'static str {
        r#"
[server]
listen_addr = "127.0.0.1:8080"

[igdb]
credential_file = "/var/lib/catalog/credential.json"

[identity]
verify_url = "https://identity.example.com/verifyIdToken"

[avatar]
storage_dir = "/var/lib/catalog/uploads"
public_base_url = "https://storage.example.com/mygamelist"
"#
    }

    fn write_config(dir_name: &str, contents: &str) -> (PathBuf, PathBuf) {
        let dir = std::env::temp_dir().join(dir_name);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn load_valid_config_applies_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let (dir, path) = write_config("catalog-api-test-valid", valid_toml());
        unsafe { set_secrets() };

        let config = Config::load(&path).unwrap();
        assert_eq!(config.server.max_connections, 1000);
        assert_eq!(config.igdb.api_base_url, "https://api.igdb.com/v4");
        assert_eq!(config.igdb.token_url, "https://id.twitch.tv/oauth2/token");
        assert_eq!(config.igdb.request_timeout_ms, 5000);
        assert_eq!(config.igdb.retry_limit, 3);
        assert_eq!(config.igdb.retry_base_delay_ms, 1000);
        assert_eq!(config.igdb.retry_max_delay_ms, 5000);
        assert_eq!(config.cache.ttl_secs, 3 * 60 * 60);
        assert_eq!(config.igdb.client_id, "client-id-test");
        assert_eq!(
            config.igdb.client_secret.as_ref().unwrap().expose(),
            "client-secret-test"
        );

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn load_missing_file_errors() {
        let result = Config::load(Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn load_invalid_toml_errors() {
        let (dir, path) = write_config("catalog-api-test-invalid", "not valid {{{{ toml");
        let result = Config::load(&path);
        assert!(result.is_err());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_client_secret_errors() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let (dir, path) = write_config("catalog-api-test-nosecret", valid_toml());
        unsafe {
            set_env("IGDB_CLIENT_ID", "client-id-test");
            remove_env("IGDB_CLIENT_SECRET");
        }

        let result = Config::load(&path);
        assert!(result.is_err());
        assert!(
            result.unwrap_err().to_string().contains("IGDB_CLIENT_SECRET"),
            "error must name the missing variable"
        );

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_client_id_errors() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let (dir, path) = write_config("catalog-api-test-noid", valid_toml());
        unsafe {
            remove_env("IGDB_CLIENT_ID");
            set_env("IGDB_CLIENT_SECRET", "client-secret-test");
        }

        let result = Config::load(&path);
        assert!(result.is_err());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn invalid_api_base_url_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let toml_content = r#"
[server]
listen_addr = "127.0.0.1:8080"

[igdb]
credential_file = "/tmp/credential.json"
api_base_url = "api.igdb.com/v4"

[identity]
verify_url = "https://identity.example.com/verifyIdToken"

[avatar]
storage_dir = "/tmp/uploads"
public_base_url = "https://storage.example.com"
"#;
        let (dir, path) = write_config("catalog-api-test-badurl", toml_content);
        unsafe { set_secrets() };

        let result = Config::load(&path);
        assert!(result.is_err(), "api_base_url without scheme must be rejected");
        let err = result.unwrap_err().to_string();
        assert!(err.contains("api_base_url"), "got: {err}");

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn zero_timeout_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let toml_content = r#"
[server]
listen_addr = "127.0.0.1:8080"

[igdb]
credential_file = "/tmp/credential.json"
request_timeout_ms = 0

[identity]
verify_url = "https://identity.example.com/verifyIdToken"

[avatar]
storage_dir = "/tmp/uploads"
public_base_url = "https://storage.example.com"
"#;
        let (dir, path) = write_config("catalog-api-test-zerotimeout", toml_content);
        unsafe { set_secrets() };

        assert!(Config::load(&path).is_err(), "request_timeout_ms = 0 must be rejected");

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn retry_delay_inversion_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let toml_content = r#"
[server]
listen_addr = "127.0.0.1:8080"

[igdb]
credential_file = "/tmp/credential.json"
retry_base_delay_ms = 2000
retry_max_delay_ms = 1000

[identity]
verify_url = "https://identity.example.com/verifyIdToken"

[avatar]
storage_dir = "/tmp/uploads"
public_base_url = "https://storage.example.com"
"#;
        let (dir, path) = write_config("catalog-api-test-delayinv", toml_content);
        unsafe { set_secrets() };

        assert!(
            Config::load(&path).is_err(),
            "max delay below base delay must be rejected"
        );

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn zero_max_connections_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let toml_content = r#"
[server]
listen_addr = "127.0.0.1:8080"
max_connections = 0

[igdb]
credential_file = "/tmp/credential.json"

[identity]
verify_url = "https://identity.example.com/verifyIdToken"

[avatar]
storage_dir = "/tmp/uploads"
public_base_url = "https://storage.example.com"
"#;
        let (dir, path) = write_config("catalog-api-test-zeroconn", toml_content);
        unsafe { set_secrets() };

        assert!(Config::load(&path).is_err(), "max_connections = 0 must be rejected");

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn resolve_path_cli_arg() {
        let path = Config::resolve_path(Some("/custom/path.toml"));
        assert_eq!(path, PathBuf::from("/custom/path.toml"));
    }

    #[test]
    fn resolve_path_env_var() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CONFIG_PATH", "/env/path.toml") };
        let path = Config::resolve_path(None);
        assert_eq!(path, PathBuf::from("/env/path.toml"));
        unsafe { remove_env("CONFIG_PATH") };
    }

    #[test]
    fn resolve_path_default() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("CONFIG_PATH") };
        let path = Config::resolve_path(None);
        assert_eq!(path, PathBuf::from("catalog-api.toml"));
    }

    #[test]
    fn resolve_path_cli_overrides_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CONFIG_PATH", "/env/should-lose.toml") };
        let path = Config::resolve_path(Some("/cli/wins.toml"));
        assert_eq!(
            path,
            PathBuf::from("/cli/wins.toml"),
            "CLI arg must take precedence over CONFIG_PATH env var"
        );
        unsafe { remove_env("CONFIG_PATH") };
    }
}
